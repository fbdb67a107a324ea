//! Storage layer for the ledger balance engine. Defines the collaborator
//! contracts the engine consumes:
//! - Durable ordered ledger of accounts and entries ([`LedgerStore`])
//! - Durable per-account balance floor ([`SnapshotStore`])
//! - Best-effort expiring balance cache ([`BalanceCache`])
//!
//! and ships in-memory adapters for all three plus a SQLite adapter for the
//! two durable ones.

mod accounts;
mod cache;
mod memory;
mod snapshots;
mod sqlite;
mod transactions;

pub use accounts::AccountsStore;
pub use cache::{CacheStats, InMemoryCache};
pub use memory::{InMemoryLedger, ReplayStats};
pub use snapshots::InMemorySnapshotStore;
pub use sqlite::SqliteStore;
pub use transactions::TransactionsStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::model::{Account, AccountBalance, AccountId, AccountStatus, Transaction, TransactionId, UserId};
use crate::{Error, Result};

/// Append-only ledger of entries, plus the accounts they move money between.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn insert_account(&self, account: &Account) -> Result<()>;

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>>;

    async fn update_account_status(
        &self,
        id: AccountId,
        status: AccountStatus,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// All accounts, newest first.
    async fn list_accounts(&self, limit: usize, offset: usize) -> Result<Vec<Account>>;

    /// Accounts of one owner, active before inactive, newest first within a status.
    async fn list_accounts_by_owner(
        &self,
        owner: UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Account>>;

    /// Persist a new entry. Fails with [`Error::DuplicateTransaction`] if the id exists.
    async fn append(&self, entry: &Transaction) -> Result<()>;

    async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>>;

    /// Entries touching `account` with `from < issued_at <= to`.
    async fn list_by_account_since(
        &self,
        account: AccountId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Transaction>>;

    async fn list_all_by_account(&self, account: AccountId) -> Result<Vec<Transaction>>;

    /// The refund entry pointing at `transfer`, if any.
    async fn find_refund_of(&self, transfer: TransactionId) -> Result<Option<Transaction>>;
}

/// One balance floor row per account, rebuilt wholesale by the snapshot updater.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn load_snapshot(&self, account: AccountId) -> Result<Option<AccountBalance>>;

    /// Upsert every row. On conflict the row with the later `as_of` wins.
    async fn bulk_upsert(&self, snapshots: &[AccountBalance]) -> Result<()>;
}

/// Key-value store with expiry. Entries may vanish at any time.
#[async_trait]
pub trait BalanceCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// Store handles passed into every component at construction.
#[derive(Clone)]
pub struct Stores {
    pub ledger: Arc<dyn LedgerStore>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub cache: Arc<dyn BalanceCache>,
}

impl Stores {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        snapshots: Arc<dyn SnapshotStore>,
        cache: Arc<dyn BalanceCache>,
    ) -> Self {
        Self {
            ledger,
            snapshots,
            cache,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryLedger::new()),
            Arc::new(InMemorySnapshotStore::new()),
            Arc::new(InMemoryCache::new()),
        )
    }

    /// SQLite-backed ledger and snapshots with an in-process cache.
    pub fn sqlite(store: SqliteStore) -> Self {
        let store = Arc::new(store);
        Self::new(store.clone(), store, Arc::new(InMemoryCache::new()))
    }
}

/// Runs a store call under `deadline`. An elapsed call surfaces as
/// [`Error::Unavailable`].
pub(crate) async fn within<T, F>(deadline: Duration, operation: &'static str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::Unavailable(format!(
            "{operation} timed out after {}ms",
            deadline.as_millis()
        ))),
    }
}
