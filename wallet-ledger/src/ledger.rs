//! Ledger operation engine
//!
//! Ties the wallet store and metrics together into the high-level API the
//! request layer calls into.
//!
//! Each deposit/withdraw runs in its own transactional scope:
//!
//! 1. **Begin** - open a scope on the store
//! 2. **Acquire** - `get_for_update` the wallet (exclusive until scope end)
//! 3. **Validate** - operation type, then amount
//! 4. **Apply** - mutate the in-memory balance
//! 5. **Commit** - `save` + `commit`; any failure leaves the record untouched
//!
//! Two operations on the same wallet are serialized by step 2. Operations on
//! different wallets never wait on each other.
//!
//! # Example
//!
//! ```no_run
//! use wallet_ledger::{Config, Ledger, OperationRequest};
//!
//! fn main() -> wallet_ledger::Result<()> {
//!     let ledger = Ledger::open(&Config::default())?;
//!
//!     let wallet = ledger.create_wallet()?;
//!     let receipt = ledger.apply_operation(&wallet.id, &OperationRequest::deposit(1000.0))?;
//!     assert_eq!(receipt.wallet.balance, rust_decimal::Decimal::from(1000));
//!
//!     Ok(())
//! }
//! ```

use crate::{
    metrics::Metrics,
    storage::{RocksStore, StoreTransaction, WalletStore, DEFAULT_MAX_ID_ATTEMPTS},
    types::{OperationReceipt, OperationRequest, OperationType, Wallet, WalletId, WALLET_ID_LEN},
    Config, Error, Result,
};
use rust_decimal::{prelude::FromPrimitive, Decimal};
use std::sync::Arc;
use std::time::Instant;

/// Main ledger interface
#[derive(Debug)]
pub struct Ledger<S = RocksStore> {
    /// Durable wallet storage
    store: Arc<S>,

    /// Engine metrics
    metrics: Metrics,

    /// Id regeneration budget for wallet creation
    max_id_attempts: u32,
}

impl Ledger<RocksStore> {
    /// Open the RocksDB-backed ledger
    pub fn open(config: &Config) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(RocksStore::open(config)?);

        Ok(Self::new(store)?.with_max_id_attempts(config.wallet.max_id_attempts))
    }
}

impl<S: WalletStore> Ledger<S> {
    /// Build a ledger over an existing store
    pub fn new(store: Arc<S>) -> Result<Self> {
        Ok(Self {
            store,
            metrics: Metrics::new()?,
            max_id_attempts: DEFAULT_MAX_ID_ATTEMPTS,
        })
    }

    /// Override the id regeneration budget
    pub fn with_max_id_attempts(mut self, attempts: u32) -> Self {
        self.max_id_attempts = attempts;
        self
    }

    /// Engine metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Create a wallet with a zero balance
    pub fn create_wallet(&self) -> Result<Wallet> {
        let wallet = self
            .store
            .create_with(self.max_id_attempts, || WalletId::generate(WALLET_ID_LEN))?;
        self.metrics.record_wallet_created();
        Ok(wallet)
    }

    /// Current committed snapshot of a wallet
    pub fn get_wallet(&self, id: &WalletId) -> Result<Wallet> {
        self.store
            .get(id)?
            .ok_or_else(|| Error::WalletNotFound(id.clone()))
    }

    /// Every wallet with its current balance
    pub fn list_wallets(&self) -> Result<Vec<Wallet>> {
        self.store.list()
    }

    /// Delete a wallet, returning its pre-deletion snapshot
    pub fn delete_wallet(&self, id: &WalletId) -> Result<Wallet> {
        let wallet = self
            .store
            .delete(id)?
            .ok_or_else(|| Error::WalletNotFound(id.clone()))?;
        self.metrics.record_wallet_deleted();
        Ok(wallet)
    }

    /// Apply a deposit or withdraw atomically.
    ///
    /// Rejections (`WalletNotFound`, `InvalidOperation`, `InvalidAmount`,
    /// `InsufficientFunds`) and `TransactionFailed` all leave the stored
    /// balance exactly as it was.
    pub fn apply_operation(
        &self,
        wallet_id: &WalletId,
        request: &OperationRequest,
    ) -> Result<OperationReceipt> {
        let started = Instant::now();
        let result = self.run_operation(wallet_id, request);

        let operation = request
            .operation_type
            .parse::<OperationType>()
            .map(|op| op.as_str())
            .unwrap_or("unknown");
        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        self.metrics
            .record_operation(operation, outcome, started.elapsed().as_secs_f64());

        match &result {
            Ok(receipt) => tracing::info!(
                wallet_id = %wallet_id,
                operation,
                amount = request.amount,
                balance = %receipt.wallet.balance,
                "Operation committed"
            ),
            Err(e) if e.is_rejection() => tracing::debug!(
                wallet_id = %wallet_id,
                operation = %request.operation_type,
                amount = request.amount,
                error = %e,
                "Operation rejected"
            ),
            Err(e) => tracing::error!(
                wallet_id = %wallet_id,
                operation = %request.operation_type,
                error = %e,
                "Operation failed"
            ),
        }

        result
    }

    fn run_operation(
        &self,
        wallet_id: &WalletId,
        request: &OperationRequest,
    ) -> Result<OperationReceipt> {
        let mut tx = self
            .store
            .begin()
            .map_err(Error::into_transaction_failed)?;

        let staged = Self::stage(&mut tx, wallet_id, request);

        match staged {
            Ok(receipt) => {
                tx.commit().map_err(Error::into_transaction_failed)?;
                Ok(receipt)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    tracing::warn!(
                        wallet_id = %wallet_id,
                        error = %rollback_err,
                        "Rollback failed, scope discarded on drop"
                    );
                }
                Err(e)
            }
        }
    }

    /// Acquire, validate, apply and stage the write. Nothing is durable until
    /// the caller commits.
    fn stage(
        tx: &mut S::Tx<'_>,
        wallet_id: &WalletId,
        request: &OperationRequest,
    ) -> Result<OperationReceipt> {
        let mut wallet = tx
            .get_for_update(wallet_id)
            .map_err(Error::into_transaction_failed)?
            .ok_or_else(|| Error::WalletNotFound(wallet_id.clone()))?;

        let operation_type: OperationType = request.operation_type.parse()?;
        let amount = validate_amount(request.amount)?;

        wallet.balance = apply(operation_type, wallet.balance, amount)?;

        tx.save(&wallet).map_err(Error::into_transaction_failed)?;

        Ok(OperationReceipt {
            wallet,
            operation_type,
        })
    }
}

/// Amounts must be finite, strictly positive and representable as a decimal.
///
/// Conversion keeps at most 28 significant digits: amounts smaller than the
/// decimal precision are rejected and very large ones are rounded.
pub fn validate_amount(amount: f64) -> Result<Decimal> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(Error::InvalidAmount(amount.to_string()));
    }

    match Decimal::from_f64(amount) {
        Some(decimal) if decimal > Decimal::ZERO => Ok(decimal),
        Some(_) => Err(Error::InvalidAmount(format!(
            "{} is below the decimal precision",
            amount
        ))),
        None => Err(Error::InvalidAmount(format!("{} is out of range", amount))),
    }
}

/// New balance after applying `amount`. Withdrawals never go below zero.
pub fn apply(operation_type: OperationType, balance: Decimal, amount: Decimal) -> Result<Decimal> {
    match operation_type {
        OperationType::Deposit => balance
            .checked_add(amount)
            .ok_or_else(|| Error::InvalidAmount(format!("{} overflows the balance", amount))),
        OperationType::Withdraw => {
            if amount > balance {
                return Err(Error::InsufficientFunds {
                    requested: amount,
                    available: balance,
                });
            }
            Ok(balance - amount)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RocksTransaction;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    fn test_config(temp_dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.rocksdb.sync_writes = false;
        config
    }

    fn create_test_ledger() -> (Ledger, TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(&test_config(&temp_dir)).unwrap();
        (ledger, temp_dir)
    }

    /// Store whose commits can be made to fail on demand
    struct FlakyStore {
        inner: RocksStore,
        fail_commits: AtomicBool,
    }

    struct FlakyTransaction<'a> {
        inner: RocksTransaction<'a>,
        fail_commit: bool,
    }

    impl StoreTransaction for FlakyTransaction<'_> {
        fn get_for_update(&mut self, id: &WalletId) -> Result<Option<Wallet>> {
            self.inner.get_for_update(id)
        }

        fn save(&mut self, wallet: &Wallet) -> Result<()> {
            self.inner.save(wallet)
        }

        fn remove(&mut self, id: &WalletId) -> Result<()> {
            self.inner.remove(id)
        }

        fn commit(self) -> Result<()> {
            if self.fail_commit {
                self.inner.rollback()?;
                return Err(Error::Storage("injected commit failure".to_string()));
            }
            self.inner.commit()
        }

        fn rollback(self) -> Result<()> {
            self.inner.rollback()
        }
    }

    impl WalletStore for FlakyStore {
        type Tx<'a> = FlakyTransaction<'a>;

        fn begin(&self) -> Result<FlakyTransaction<'_>> {
            Ok(FlakyTransaction {
                inner: self.inner.begin()?,
                fail_commit: self.fail_commits.load(Ordering::SeqCst),
            })
        }

        fn get(&self, id: &WalletId) -> Result<Option<Wallet>> {
            self.inner.get(id)
        }

        fn list(&self) -> Result<Vec<Wallet>> {
            self.inner.list()
        }
    }

    #[test]
    fn test_round_trip() {
        let (ledger, _temp) = create_test_ledger();
        let wallet = ledger.create_wallet().unwrap();

        let receipt = ledger
            .apply_operation(&wallet.id, &OperationRequest::deposit(1000.0))
            .unwrap();
        assert_eq!(receipt.operation_type, OperationType::Deposit);
        assert_eq!(receipt.wallet.balance, Decimal::from(1000));
        assert_eq!(ledger.get_wallet(&wallet.id).unwrap().balance, Decimal::from(1000));

        let receipt = ledger
            .apply_operation(&wallet.id, &OperationRequest::withdraw(500.0))
            .unwrap();
        assert_eq!(receipt.operation_type, OperationType::Withdraw);
        assert_eq!(ledger.get_wallet(&wallet.id).unwrap().balance, Decimal::from(500));
    }

    #[test]
    fn test_fractional_amounts() {
        let (ledger, _temp) = create_test_ledger();
        let wallet = ledger.create_wallet().unwrap();

        ledger
            .apply_operation(&wallet.id, &OperationRequest::deposit(10.25))
            .unwrap();
        ledger
            .apply_operation(&wallet.id, &OperationRequest::withdraw(0.25))
            .unwrap();

        assert_eq!(ledger.get_wallet(&wallet.id).unwrap().balance, Decimal::from(10));
    }

    #[test]
    fn test_withdraw_entire_balance() {
        let (ledger, _temp) = create_test_ledger();
        let wallet = ledger.create_wallet().unwrap();

        ledger
            .apply_operation(&wallet.id, &OperationRequest::deposit(300.0))
            .unwrap();
        let receipt = ledger
            .apply_operation(&wallet.id, &OperationRequest::withdraw(300.0))
            .unwrap();

        assert_eq!(receipt.wallet.balance, Decimal::ZERO);
    }

    #[test]
    fn test_insufficient_funds() {
        let (ledger, _temp) = create_test_ledger();
        let wallet = ledger.create_wallet().unwrap();

        let result = ledger.apply_operation(&wallet.id, &OperationRequest::withdraw(1000.0));
        assert!(matches!(
            result,
            Err(Error::InsufficientFunds { requested, available })
                if requested == Decimal::from(1000) && available == Decimal::ZERO
        ));
        assert_eq!(ledger.get_wallet(&wallet.id).unwrap().balance, Decimal::ZERO);
    }

    #[test]
    fn test_invalid_operation() {
        let (ledger, _temp) = create_test_ledger();
        let wallet = ledger.create_wallet().unwrap();
        ledger
            .apply_operation(&wallet.id, &OperationRequest::deposit(50.0))
            .unwrap();

        let result = ledger.apply_operation(&wallet.id, &OperationRequest::new("INVALID", 1000.0));
        assert!(matches!(result, Err(Error::InvalidOperation(_))));
        assert_eq!(ledger.get_wallet(&wallet.id).unwrap().balance, Decimal::from(50));
    }

    #[test]
    fn test_invalid_amounts() {
        let (ledger, _temp) = create_test_ledger();
        let wallet = ledger.create_wallet().unwrap();
        ledger
            .apply_operation(&wallet.id, &OperationRequest::deposit(50.0))
            .unwrap();

        for amount in [0.0, -0.0, -10.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 1e300] {
            for request in [OperationRequest::deposit(amount), OperationRequest::withdraw(amount)] {
                let result = ledger.apply_operation(&wallet.id, &request);
                assert!(
                    matches!(result, Err(Error::InvalidAmount(_))),
                    "amount {amount} gave {result:?}"
                );
            }
        }

        assert_eq!(ledger.get_wallet(&wallet.id).unwrap().balance, Decimal::from(50));
    }

    #[test]
    fn test_amount_precision_limits() {
        let err = validate_amount(1e-30).unwrap_err();
        assert!(matches!(err, Error::InvalidAmount(ref msg) if msg.contains("below the decimal precision")));

        let err = validate_amount(1e300).unwrap_err();
        assert!(matches!(err, Error::InvalidAmount(ref msg) if msg.contains("out of range")));

        // Large amounts are accepted at the nearest representable decimal
        let large = validate_amount(1e28).unwrap();
        assert_eq!(large, Decimal::from_f64(1e28).unwrap());
        assert!(large > Decimal::from(10u64.pow(18)));

        assert_eq!(validate_amount(0.01).unwrap(), Decimal::new(1, 2));
    }

    #[test]
    fn test_lock_wait_timeout_is_transaction_failed() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&temp_dir);
        config.locking.lock_timeout_ms = 50;
        let ledger = Ledger::open(&config).unwrap();

        let wallet = ledger.create_wallet().unwrap();
        ledger
            .apply_operation(&wallet.id, &OperationRequest::deposit(100.0))
            .unwrap();

        let store = ledger.store().clone();
        let mut holder = store.begin().unwrap();
        holder.get_for_update(&wallet.id).unwrap().unwrap();

        let result = ledger.apply_operation(&wallet.id, &OperationRequest::withdraw(40.0));
        assert!(matches!(result, Err(Error::TransactionFailed(_))), "{result:?}");
        assert!(result.unwrap_err().is_retryable());

        holder.rollback().unwrap();
        assert_eq!(ledger.get_wallet(&wallet.id).unwrap().balance, Decimal::from(100));
        assert_eq!(
            ledger
                .metrics()
                .operations_total
                .with_label_values(&["WITHDRAW", "transaction_failed"])
                .get(),
            1
        );

        let receipt = ledger
            .apply_operation(&wallet.id, &OperationRequest::withdraw(40.0))
            .unwrap();
        assert_eq!(receipt.wallet.balance, Decimal::from(60));
    }

    #[test]
    fn test_not_found_reported_before_validation() {
        let (ledger, _temp) = create_test_ledger();
        let missing = WalletId::new("missing000");

        let result = ledger.apply_operation(&missing, &OperationRequest::new("INVALID", -1.0));
        assert!(matches!(result, Err(Error::WalletNotFound(ref id)) if *id == missing));
        assert!(ledger.list_wallets().unwrap().is_empty());
    }

    #[test]
    fn test_operation_type_checked_before_amount() {
        let (ledger, _temp) = create_test_ledger();
        let wallet = ledger.create_wallet().unwrap();

        let result = ledger.apply_operation(&wallet.id, &OperationRequest::new("TRANSFER", 0.0));
        assert!(matches!(result, Err(Error::InvalidOperation(_))));
    }

    #[test]
    fn test_delete_then_get() {
        let (ledger, _temp) = create_test_ledger();
        let wallet = ledger.create_wallet().unwrap();
        ledger
            .apply_operation(&wallet.id, &OperationRequest::deposit(75.0))
            .unwrap();

        let deleted = ledger.delete_wallet(&wallet.id).unwrap();
        assert_eq!(deleted.balance, Decimal::from(75));

        assert!(matches!(ledger.get_wallet(&wallet.id), Err(Error::WalletNotFound(_))));
        assert!(matches!(ledger.delete_wallet(&wallet.id), Err(Error::WalletNotFound(_))));
        assert!(matches!(
            ledger.apply_operation(&wallet.id, &OperationRequest::deposit(1.0)),
            Err(Error::WalletNotFound(_))
        ));
    }

    #[test]
    fn test_commit_failure_leaves_balance_unchanged() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FlakyStore {
            inner: RocksStore::open(&test_config(&temp_dir)).unwrap(),
            fail_commits: AtomicBool::new(false),
        });
        let ledger = Ledger::new(store.clone()).unwrap();

        let wallet = ledger.create_wallet().unwrap();
        ledger
            .apply_operation(&wallet.id, &OperationRequest::deposit(1000.0))
            .unwrap();

        store.fail_commits.store(true, Ordering::SeqCst);
        let result = ledger.apply_operation(&wallet.id, &OperationRequest::withdraw(400.0));
        assert!(matches!(result, Err(Error::TransactionFailed(_))));
        assert!(result.unwrap_err().is_retryable());
        assert_eq!(ledger.get_wallet(&wallet.id).unwrap().balance, Decimal::from(1000));

        store.fail_commits.store(false, Ordering::SeqCst);
        let receipt = ledger
            .apply_operation(&wallet.id, &OperationRequest::withdraw(400.0))
            .unwrap();
        assert_eq!(receipt.wallet.balance, Decimal::from(600));
    }

    #[test]
    fn test_metrics_recorded() {
        let (ledger, _temp) = create_test_ledger();
        let wallet = ledger.create_wallet().unwrap();

        ledger
            .apply_operation(&wallet.id, &OperationRequest::deposit(5.0))
            .unwrap();
        let _ = ledger.apply_operation(&wallet.id, &OperationRequest::withdraw(50.0));
        let _ = ledger.apply_operation(&wallet.id, &OperationRequest::new("BOGUS", 1.0));
        ledger.delete_wallet(&wallet.id).unwrap();

        let metrics = ledger.metrics();
        assert_eq!(metrics.wallets_created.get(), 1);
        assert_eq!(metrics.wallets_deleted.get(), 1);
        assert_eq!(
            metrics
                .operations_total
                .with_label_values(&["DEPOSIT", "success"])
                .get(),
            1
        );
        assert_eq!(
            metrics
                .operations_total
                .with_label_values(&["WITHDRAW", "insufficient_funds"])
                .get(),
            1
        );
        assert_eq!(
            metrics
                .operations_total
                .with_label_values(&["unknown", "invalid_operation"])
                .get(),
            1
        );
    }

    #[test]
    fn test_apply_rules() {
        let hundred = Decimal::from(100);
        assert_eq!(
            apply(OperationType::Deposit, hundred, Decimal::from(5)).unwrap(),
            Decimal::from(105)
        );
        assert_eq!(
            apply(OperationType::Withdraw, hundred, hundred).unwrap(),
            Decimal::ZERO
        );
        assert!(apply(OperationType::Withdraw, hundred, Decimal::from(101)).is_err());
        assert!(matches!(
            apply(OperationType::Deposit, Decimal::MAX, Decimal::ONE),
            Err(Error::InvalidAmount(_))
        ));
    }
}
