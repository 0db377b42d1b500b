//! Core types for the wallet ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode at rest, JSON at the edge)
//! - Exact arithmetic (Decimal for balances)

use rand::{distributions::Alphanumeric, Rng};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length of generated wallet identifiers
pub const WALLET_ID_LEN: usize = 10;

/// Opaque wallet identifier (fixed-length alphanumeric token)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WalletId(String);

impl WalletId {
    /// Wrap an existing identifier (e.g. taken from a request path)
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random identifier of `len` characters drawn
    /// uniformly from `[A-Za-z0-9]`.
    ///
    /// Uniqueness is not guaranteed here; the store verifies it on insert.
    pub fn generate(len: usize) -> Self {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect();
        Self(token)
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Storage key
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wallet record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    /// Immutable identifier
    pub id: WalletId,

    /// Current balance, never negative once committed
    pub balance: Decimal,
}

impl Wallet {
    /// New wallet with zero balance
    pub fn new(id: WalletId) -> Self {
        Self {
            id,
            balance: Decimal::ZERO,
        }
    }
}

/// Balance mutation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    /// Credit the wallet
    Deposit,
    /// Debit the wallet, rejected if it would go negative
    Withdraw,
}

impl OperationType {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Deposit => "DEPOSIT",
            OperationType::Withdraw => "WITHDRAW",
        }
    }
}

impl FromStr for OperationType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEPOSIT" => Ok(OperationType::Deposit),
            "WITHDRAW" => Ok(OperationType::Withdraw),
            other => Err(crate::Error::InvalidOperation(other.to_string())),
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Raw, unvalidated operation input as supplied by a caller.
///
/// Validation happens inside the engine after the wallet has been locked,
/// so an unknown wallet is reported before malformed input.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationRequest {
    /// Expected to be `DEPOSIT` or `WITHDRAW` (case-sensitive)
    pub operation_type: String,

    /// Expected to be finite and strictly positive
    pub amount: f64,
}

impl OperationRequest {
    /// Create a request
    pub fn new(operation_type: impl Into<String>, amount: f64) -> Self {
        Self {
            operation_type: operation_type.into(),
            amount,
        }
    }

    /// Deposit shorthand
    pub fn deposit(amount: f64) -> Self {
        Self::new(OperationType::Deposit.as_str(), amount)
    }

    /// Withdraw shorthand
    pub fn withdraw(amount: f64) -> Self {
        Self::new(OperationType::Withdraw.as_str(), amount)
    }
}

/// Result of a committed operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationReceipt {
    /// Post-operation snapshot
    pub wallet: Wallet,

    /// Operation that was applied
    pub operation_type: OperationType,
}
