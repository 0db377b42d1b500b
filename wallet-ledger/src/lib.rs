//! Wallet Ledger
//!
//! Stores wallets (identifier + balance) and applies deposit/withdraw
//! operations safely under concurrent access.
//!
//! # Architecture
//!
//! - **Wallet Store**: RocksDB pessimistic transactions, one record per wallet
//! - **Row Locks**: `get_for_update` serializes operations on the same wallet
//! - **Operation Engine**: begin → acquire → validate → apply → commit
//! - **Request Layer**: actix-web handlers calling into the engine
//!
//! # Invariants
//!
//! - Non-negativity: a committed balance is never below zero
//! - Atomicity: a rejected or failed operation changes nothing
//! - No lost update: concurrent operations on one wallet apply in lock order

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod types;
pub mod storage;
pub mod ledger;
pub mod error;
pub mod config;
pub mod metrics;
pub mod handlers;

// Re-exports
pub use error::{Error, Result};
pub use types::{OperationReceipt, OperationRequest, OperationType, Wallet, WalletId};
pub use storage::{RocksStore, StoreTransaction, WalletStore};
pub use ledger::Ledger;
pub use config::Config;
