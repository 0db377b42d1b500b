//! HTTP request layer
//!
//! Thin actix-web shell over [`Ledger`]. Store calls block on record locks,
//! so every ledger call runs on the blocking pool via [`web::block`].

use crate::{
    storage::WalletStore,
    types::{OperationReceipt, OperationRequest, Wallet, WalletId},
    Error, Ledger, Result,
};
use actix_web::{error::JsonPayloadError, web, HttpRequest, HttpResponse};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Wallet as rendered to callers
#[derive(Debug, Serialize)]
pub struct WalletView {
    /// Wallet id
    pub id: String,

    /// Balance as a JSON number
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
}

impl From<Wallet> for WalletView {
    fn from(wallet: Wallet) -> Self {
        Self {
            id: wallet.id.to_string(),
            balance: wallet.balance,
        }
    }
}

/// Successful operation response
#[derive(Debug, Serialize)]
pub struct OperationResponse {
    /// Wallet id
    pub id: String,

    /// Post-operation balance
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,

    /// Applied operation
    pub operation_type: String,

    /// Always `success`
    pub status: String,
}

impl From<OperationReceipt> for OperationResponse {
    fn from(receipt: OperationReceipt) -> Self {
        Self {
            id: receipt.wallet.id.to_string(),
            balance: receipt.wallet.balance,
            operation_type: receipt.operation_type.to_string(),
            status: "success".to_string(),
        }
    }
}

/// Operation request body. Both fields are checked by the engine, so
/// any JSON value is accepted here.
#[derive(Debug, Deserialize)]
pub struct OperationBody {
    #[serde(default)]
    operation_type: serde_json::Value,

    #[serde(default)]
    amount: serde_json::Value,
}

impl From<OperationBody> for OperationRequest {
    fn from(body: OperationBody) -> Self {
        // Non-string types never match an operation name
        let operation_type = match body.operation_type {
            serde_json::Value::String(name) => name,
            other => other.to_string(),
        };
        // Non-numeric amounts become NaN and are rejected as InvalidAmount
        let amount = body.amount.as_f64().unwrap_or(f64::NAN);
        OperationRequest::new(operation_type, amount)
    }
}

/// Body of `DELETE /api/v1/wallets`
#[derive(Debug, Deserialize)]
pub struct DeleteWalletBody {
    #[serde(alias = "wallet_uid")]
    wallet_id: String,
}

/// Report JSON extractor failures in the error envelope
fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    Error::InvalidRequest(err.to_string()).into()
}

/// Health check endpoint
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "wallet-ledger",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Create wallet endpoint
pub async fn create_wallet<S: WalletStore + 'static>(
    ledger: web::Data<Ledger<S>>,
) -> Result<HttpResponse> {
    let ledger = ledger.into_inner();
    let wallet = web::block(move || ledger.create_wallet()).await??;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Wallet created successfully",
        "wallet": WalletView::from(wallet)
    })))
}

/// List wallets endpoint
pub async fn list_wallets<S: WalletStore + 'static>(
    ledger: web::Data<Ledger<S>>,
) -> Result<HttpResponse> {
    let ledger = ledger.into_inner();
    let wallets = web::block(move || ledger.list_wallets()).await??;

    if wallets.is_empty() {
        return Ok(HttpResponse::Ok().json(json!({
            "status": "success",
            "message": "No wallets found",
            "wallets": []
        })));
    }

    let wallets: Vec<WalletView> = wallets.into_iter().map(WalletView::from).collect();
    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "wallets": wallets
    })))
}

/// Get wallet endpoint
pub async fn get_wallet<S: WalletStore + 'static>(
    ledger: web::Data<Ledger<S>>,
    wallet_id: web::Path<String>,
) -> Result<HttpResponse> {
    let ledger = ledger.into_inner();
    let id = WalletId::new(wallet_id.into_inner());
    let wallet = web::block(move || ledger.get_wallet(&id)).await??;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "wallet": WalletView::from(wallet)
    })))
}

/// Delete wallet by path endpoint
pub async fn delete_wallet<S: WalletStore + 'static>(
    ledger: web::Data<Ledger<S>>,
    wallet_id: web::Path<String>,
) -> Result<HttpResponse> {
    remove_wallet(ledger, WalletId::new(wallet_id.into_inner())).await
}

/// Delete wallet by body endpoint
pub async fn delete_wallet_by_body<S: WalletStore + 'static>(
    ledger: web::Data<Ledger<S>>,
    body: web::Json<DeleteWalletBody>,
) -> Result<HttpResponse> {
    remove_wallet(ledger, WalletId::new(body.into_inner().wallet_id)).await
}

async fn remove_wallet<S: WalletStore + 'static>(
    ledger: web::Data<Ledger<S>>,
    id: WalletId,
) -> Result<HttpResponse> {
    let ledger = ledger.into_inner();
    let wallet = web::block(move || ledger.delete_wallet(&id)).await??;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Wallet deleted successfully",
        "wallet": WalletView::from(wallet)
    })))
}

/// Deposit/withdraw endpoint
pub async fn wallet_operation<S: WalletStore + 'static>(
    ledger: web::Data<Ledger<S>>,
    wallet_id: web::Path<String>,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let ledger = ledger.into_inner();
    let id = WalletId::new(wallet_id.into_inner());
    let parsed = serde_json::from_slice::<OperationBody>(&body);

    let receipt = web::block(move || match parsed {
        Ok(body) => ledger.apply_operation(&id, &OperationRequest::from(body)),
        Err(e) => {
            // An unknown wallet is reported ahead of a malformed body
            ledger.get_wallet(&id)?;
            Err(Error::InvalidRequest(e.to_string()))
        }
    })
    .await??;

    Ok(HttpResponse::Ok().json(OperationResponse::from(receipt)))
}

/// Prometheus metrics endpoint
pub async fn metrics_endpoint<S: WalletStore + 'static>(
    ledger: web::Data<Ledger<S>>,
) -> HttpResponse {
    match ledger.metrics().render() {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(body),
        Err(e) => HttpResponse::InternalServerError().json(json!({
            "error": "Failed to gather metrics",
            "details": e.to_string()
        })),
    }
}

/// Configure routes
pub fn configure_routes<S: WalletStore + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/wallets")
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .route("", web::post().to(create_wallet::<S>))
            .route("", web::get().to(list_wallets::<S>))
            .route("", web::delete().to(delete_wallet_by_body::<S>))
            .route("/{wallet_id}", web::get().to(get_wallet::<S>))
            .route("/{wallet_id}", web::delete().to(delete_wallet::<S>))
            .route("/{wallet_id}/operation", web::post().to(wallet_operation::<S>)),
    )
    .route("/metrics", web::get().to(metrics_endpoint::<S>))
    .route("/health", web::get().to(health_check));
}

