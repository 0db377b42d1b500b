//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `wallet_operations_total{operation,outcome}` - Deposit/withdraw attempts by outcome
//! - `wallet_operation_duration_seconds` - Histogram of operation latencies (lock wait included)
//! - `wallets_created_total` - Total number of wallets created
//! - `wallets_deleted_total` - Total number of wallets deleted

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Metrics collector
///
/// Every instance owns its registry, so several ledgers can live in one
/// process without name clashes.
#[derive(Clone, Debug)]
pub struct Metrics {
    /// Operations by type and outcome
    pub operations_total: IntCounterVec,

    /// Operation duration histogram
    pub operation_duration: Histogram,

    /// Wallets created
    pub wallets_created: IntCounter,

    /// Wallets deleted
    pub wallets_deleted: IntCounter,

    registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let operations_total = IntCounterVec::new(
            Opts::new(
                "wallet_operations_total",
                "Deposit and withdraw operations by outcome",
            ),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let operation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "wallet_operation_duration_seconds",
                "Histogram of operation latencies",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.500, 1.0, 5.0]),
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        let wallets_created =
            IntCounter::new("wallets_created_total", "Total number of wallets created")?;
        registry.register(Box::new(wallets_created.clone()))?;

        let wallets_deleted =
            IntCounter::new("wallets_deleted_total", "Total number of wallets deleted")?;
        registry.register(Box::new(wallets_deleted.clone()))?;

        Ok(Self {
            operations_total,
            operation_duration,
            wallets_created,
            wallets_deleted,
            registry,
        })
    }

    /// Record one operation attempt. `outcome` is `success` or an error kind.
    pub fn record_operation(&self, operation: &str, outcome: &str, duration_seconds: f64) {
        self.operations_total
            .with_label_values(&[operation, outcome])
            .inc();
        self.operation_duration.observe(duration_seconds);
    }

    /// Record wallet creation
    pub fn record_wallet_created(&self) {
        self.wallets_created.inc();
    }

    /// Record wallet deletion
    pub fn record_wallet_deleted(&self) {
        self.wallets_deleted.inc();
    }

    /// Render in the Prometheus text exposition format
    pub fn render(&self) -> crate::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| crate::Error::Other(e.to_string()))
    }
}
