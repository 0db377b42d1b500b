//! Error types for the wallet ledger

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use rust_decimal::Decimal;
use serde_json::json;
use thiserror::Error;

use crate::types::WalletId;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Wallet does not exist (never created or deleted)
    #[error("Wallet not found: {0}")]
    WalletNotFound(WalletId),

    /// Operation type is not DEPOSIT or WITHDRAW
    #[error("Invalid operation_type: {0:?}")]
    InvalidOperation(String),

    /// Amount is not a finite positive number
    #[error("Amount must be a positive number: {0}")]
    InvalidAmount(String),

    /// Request body could not be read as JSON
    #[error("Malformed request body: {0}")]
    InvalidRequest(String),

    /// Withdrawal larger than the current balance
    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        /// Requested withdrawal
        requested: Decimal,
        /// Balance at the time of the request
        available: Decimal,
    },

    /// Infrastructure failure inside an operation scope; nothing was persisted
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Stable tag reported to callers alongside the message
    pub fn kind(&self) -> &'static str {
        match self {
            Error::WalletNotFound(_) => "not_found",
            Error::InvalidOperation(_) => "invalid_operation",
            Error::InvalidAmount(_) => "invalid_amount",
            Error::InvalidRequest(_) => "invalid_request",
            Error::InsufficientFunds { .. } => "insufficient_funds",
            Error::TransactionFailed(_) => "transaction_failed",
            Error::Storage(_) | Error::Serialization(_) | Error::Io(_) => "storage_error",
            Error::Config(_) => "config_error",
            Error::Metrics(_) | Error::Other(_) => "internal_error",
        }
    }

    /// Infrastructure failures leave no partial effect, so the caller may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::TransactionFailed(_)
                | Error::Storage(_)
                | Error::Serialization(_)
                | Error::Io(_)
        )
    }

    /// Expected, locally-reported outcomes of a single operation
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::WalletNotFound(_)
                | Error::InvalidOperation(_)
                | Error::InvalidAmount(_)
                | Error::InvalidRequest(_)
                | Error::InsufficientFunds { .. }
        )
    }

    /// Re-tag an infrastructure failure that happened inside an operation scope.
    /// Rejections pass through untouched.
    pub fn into_transaction_failed(self) -> Self {
        if self.is_rejection() || matches!(self, Error::TransactionFailed(_)) {
            self
        } else {
            Error::TransactionFailed(self.to_string())
        }
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<actix_web::error::BlockingError> for Error {
    fn from(err: actix_web::error::BlockingError) -> Self {
        Error::Other(format!("Blocking task failed: {}", err))
    }
}

impl ResponseError for Error {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();

        HttpResponse::build(status_code).json(json!({
            "status": "error",
            "error": {
                "code": status_code.as_u16(),
                "message": self.to_string(),
                "type": self.kind()
            }
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Error::WalletNotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidOperation(_) => StatusCode::BAD_REQUEST,
            Error::InvalidAmount(_) => StatusCode::BAD_REQUEST,
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::InsufficientFunds { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
