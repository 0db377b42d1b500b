//! Wallet ledger HTTP server binary

use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use wallet_ledger::{handlers, Config, Ledger, RocksStore};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_thread_ids(true)
        .init();

    tracing::info!("Starting wallet ledger server");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let ledger = web::Data::new(Ledger::open(&config).context("Failed to open wallet store")?);
    tracing::info!(
        data_dir = ?config.data_dir,
        listen_addr = %config.http.listen_addr,
        "Ledger opened successfully"
    );

    let mut server = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .wrap(middleware::NormalizePath::trim())
            .app_data(ledger.clone())
            .configure(handlers::configure_routes::<RocksStore>)
    });

    if config.http.workers > 0 {
        server = server.workers(config.http.workers);
    }

    server
        .bind(config.http.listen_addr.as_str())
        .with_context(|| format!("Failed to bind {}", config.http.listen_addr))?
        .run()
        .await?;

    tracing::info!("Shutting down wallet ledger server");
    Ok(())
}
