//! Storage layer
//!
//! The store is the only component touching durable state. Mutations go
//! through a transactional scope ([`StoreTransaction`]) whose
//! [`get_for_update`](StoreTransaction::get_for_update) takes an exclusive
//! lock on one wallet record until the scope commits or rolls back.
//!
//! # Column Families
//!
//! - `wallets` - Wallet records (key: wallet id, value: bincode `Wallet`)

use crate::{
    error::{Error, Result},
    types::{Wallet, WalletId, WALLET_ID_LEN},
    Config,
};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, SingleThreaded, Transaction,
    TransactionDB, TransactionDBOptions, TransactionOptions, WriteOptions,
};

/// Column family names
const CF_WALLETS: &str = "wallets";

/// Id regeneration budget used by [`WalletStore::create`]
pub const DEFAULT_MAX_ID_ATTEMPTS: u32 = 5;

/// A unit of work against the store.
///
/// Dropping a scope without calling [`commit`](Self::commit) discards every
/// write made through it and releases its locks.
pub trait StoreTransaction {
    /// Read a wallet and lock it exclusively until the scope ends.
    /// Blocks while another scope holds the same record.
    fn get_for_update(&mut self, id: &WalletId) -> Result<Option<Wallet>>;

    /// Stage the wallet's current balance.
    fn save(&mut self, wallet: &Wallet) -> Result<()>;

    /// Stage removal of a record.
    fn remove(&mut self, id: &WalletId) -> Result<()>;

    /// Durably apply staged writes and release locks.
    fn commit(self) -> Result<()>;

    /// Discard staged writes and release locks.
    fn rollback(self) -> Result<()>;
}

/// Keyed wallet storage with transactional mutation
pub trait WalletStore: Send + Sync {
    /// Transactional scope type
    type Tx<'a>: StoreTransaction
    where
        Self: 'a;

    /// Open a new transactional scope
    fn begin(&self) -> Result<Self::Tx<'_>>;

    /// Non-locking read
    fn get(&self, id: &WalletId) -> Result<Option<Wallet>>;

    /// Non-locking read of every record
    fn list(&self) -> Result<Vec<Wallet>>;

    /// Insert a zero-balance wallet with a freshly generated id
    fn create(&self) -> Result<Wallet> {
        self.create_with(DEFAULT_MAX_ID_ATTEMPTS, || WalletId::generate(WALLET_ID_LEN))
    }

    /// Insert a zero-balance wallet under the first id from `next_id` that is
    /// not already taken, trying at most `max_attempts` candidates.
    fn create_with<F>(&self, max_attempts: u32, mut next_id: F) -> Result<Wallet>
    where
        F: FnMut() -> WalletId,
    {
        for attempt in 1..=max_attempts {
            let candidate = next_id();
            let mut tx = self.begin()?;

            if tx.get_for_update(&candidate)?.is_some() {
                tx.rollback()?;
                tracing::warn!(
                    wallet_id = %candidate,
                    attempt,
                    "Generated wallet id already taken, regenerating"
                );
                continue;
            }

            let wallet = Wallet::new(candidate);
            tx.save(&wallet)?;
            tx.commit()?;

            tracing::info!(wallet_id = %wallet.id, "Wallet created");
            return Ok(wallet);
        }

        Err(Error::Storage(format!(
            "Could not allocate a unique wallet id after {} attempts",
            max_attempts
        )))
    }

    /// Remove a record, returning its last committed state.
    ///
    /// Takes the record lock, so it waits for any in-flight operation.
    fn delete(&self, id: &WalletId) -> Result<Option<Wallet>> {
        let mut tx = self.begin()?;

        let Some(wallet) = tx.get_for_update(id)? else {
            tx.rollback()?;
            return Ok(None);
        };

        tx.remove(id)?;
        tx.commit()?;

        tracing::info!(wallet_id = %id, balance = %wallet.balance, "Wallet deleted");
        Ok(Some(wallet))
    }
}

/// RocksDB-backed wallet store using pessimistic transactions
pub struct RocksStore {
    db: TransactionDB<SingleThreaded>,
    sync_writes: bool,
    lock_timeout_ms: i64,
}

impl std::fmt::Debug for RocksStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksStore")
            .field("sync_writes", &self.sync_writes)
            .field("lock_timeout_ms", &self.lock_timeout_ms)
            .finish()
    }
}

impl RocksStore {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let mut txn_db_opts = TransactionDBOptions::default();
        txn_db_opts.set_txn_lock_timeout(config.locking.lock_timeout_ms);
        txn_db_opts.set_num_stripes(config.locking.num_stripes);

        let cf_descriptors = vec![ColumnFamilyDescriptor::new(
            CF_WALLETS,
            Self::cf_options_wallets(),
        )];

        let db = TransactionDB::<SingleThreaded>::open_cf_descriptors(
            &db_opts,
            &txn_db_opts,
            path,
            cf_descriptors,
        )?;

        tracing::info!(
            path = ?path,
            sync_writes = config.rocksdb.sync_writes,
            lock_timeout_ms = config.locking.lock_timeout_ms,
            "Opened wallet store"
        );

        Ok(Self {
            db,
            sync_writes: config.rocksdb.sync_writes,
            lock_timeout_ms: config.locking.lock_timeout_ms,
        })
    }

    fn cf_options_wallets() -> Options {
        let mut opts = Options::default();
        // Point lookups dominate
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(CF_WALLETS)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", CF_WALLETS)))
    }
}

impl WalletStore for RocksStore {
    type Tx<'a> = RocksTransaction<'a>;

    fn begin(&self) -> Result<RocksTransaction<'_>> {
        let cf = self.cf_handle()?;

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);

        let mut txn_opts = TransactionOptions::default();
        txn_opts.set_lock_timeout(self.lock_timeout_ms);

        Ok(RocksTransaction {
            txn: self.db.transaction_opt(&write_opts, &txn_opts),
            cf,
        })
    }

    fn get(&self, id: &WalletId) -> Result<Option<Wallet>> {
        let cf = self.cf_handle()?;

        match self.db.get_cf(cf, id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn list(&self) -> Result<Vec<Wallet>> {
        let cf = self.cf_handle()?;

        let mut wallets = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            wallets.push(decode(&value)?);
        }

        Ok(wallets)
    }
}

/// Transactional scope over a [`RocksStore`]
pub struct RocksTransaction<'a> {
    txn: Transaction<'a, TransactionDB<SingleThreaded>>,
    cf: &'a ColumnFamily,
}

impl StoreTransaction for RocksTransaction<'_> {
    fn get_for_update(&mut self, id: &WalletId) -> Result<Option<Wallet>> {
        let bytes = self
            .txn
            .get_for_update_cf(self.cf, id.as_bytes(), true)
            .map_err(|e| Error::Storage(format!("Failed to lock wallet {}: {}", id, e)))?;

        match bytes {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save(&mut self, wallet: &Wallet) -> Result<()> {
        let value = bincode::serialize(wallet)?;
        self.txn.put_cf(self.cf, wallet.id.as_bytes(), value)?;
        Ok(())
    }

    fn remove(&mut self, id: &WalletId) -> Result<()> {
        self.txn.delete_cf(self.cf, id.as_bytes())?;
        Ok(())
    }

    fn commit(self) -> Result<()> {
        self.txn.commit()?;
        Ok(())
    }

    fn rollback(self) -> Result<()> {
        self.txn.rollback()?;
        Ok(())
    }
}

fn decode(bytes: &[u8]) -> Result<Wallet> {
    Ok(bincode::deserialize(bytes)?)
}
