use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{AccountsStore, LedgerStore, TransactionsStore};
use crate::model::{Account, AccountId, AccountStatus, Transaction, TransactionId, UserId};
use crate::Result;

/// Counters of history reads served by [`InMemoryLedger`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub full_replays: u64,
    pub incremental_replays: u64,
    pub entries_returned: u64,
}

#[derive(Debug, Default)]
struct ReplayCounters {
    full: AtomicU64,
    incremental: AtomicU64,
    entries: AtomicU64,
}

/// Process-local ledger. Accounts and entries live behind separate locks;
/// neither lock is held across an await.
#[derive(Default)]
pub struct InMemoryLedger {
    accounts: RwLock<AccountsStore>,
    transactions: RwLock<TransactionsStore>,
    counters: ReplayCounters,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replay_stats(&self) -> ReplayStats {
        ReplayStats {
            full_replays: self.counters.full.load(Ordering::Relaxed),
            incremental_replays: self.counters.incremental.load(Ordering::Relaxed),
            entries_returned: self.counters.entries.load(Ordering::Relaxed),
        }
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.read().len()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn insert_account(&self, account: &Account) -> Result<()> {
        self.accounts.write().insert(account.clone())
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        Ok(self.accounts.read().get(id).cloned())
    }

    async fn update_account_status(
        &self,
        id: AccountId,
        status: AccountStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.accounts.write().set_status(id, status, at)
    }

    async fn list_accounts(&self, limit: usize, offset: usize) -> Result<Vec<Account>> {
        Ok(self.accounts.read().page(limit, offset))
    }

    async fn list_accounts_by_owner(
        &self,
        owner: UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Account>> {
        Ok(self.accounts.read().page_by_owner(owner, limit, offset))
    }

    async fn append(&self, entry: &Transaction) -> Result<()> {
        self.transactions.write().append(entry.clone())
    }

    async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        Ok(self.transactions.read().get(id).cloned())
    }

    async fn list_by_account_since(
        &self,
        account: AccountId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Transaction>> {
        let entries: Vec<Transaction> = self
            .transactions
            .read()
            .for_account_between(account, from, to)
            .cloned()
            .collect();
        self.counters.incremental.fetch_add(1, Ordering::Relaxed);
        self.counters
            .entries
            .fetch_add(entries.len() as u64, Ordering::Relaxed);
        Ok(entries)
    }

    async fn list_all_by_account(&self, account: AccountId) -> Result<Vec<Transaction>> {
        let entries: Vec<Transaction> = self
            .transactions
            .read()
            .for_account(account)
            .cloned()
            .collect();
        self.counters.full.fetch_add(1, Ordering::Relaxed);
        self.counters
            .entries
            .fetch_add(entries.len() as u64, Ordering::Relaxed);
        Ok(entries)
    }

    async fn find_refund_of(&self, transfer: TransactionId) -> Result<Option<Transaction>> {
        Ok(self.transactions.read().refund_of(transfer).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Amount, Movement};
    use crate::Error;
    use rust_decimal_macros::dec;

    fn deposit(to: AccountId, issued_at: DateTime<Utc>) -> Transaction {
        Transaction {
            id: TransactionId::generate(),
            amount: Amount::new(dec!(5)).unwrap(),
            issued_at,
            movement: Movement::Deposit { to },
        }
    }

    #[tokio::test]
    async fn test_account_roundtrip() {
        let ledger = InMemoryLedger::new();
        let account = Account::new(UserId::generate(), "savings", Utc::now());
        ledger.insert_account(&account).await.unwrap();

        assert_eq!(ledger.get_account(account.id).await.unwrap(), Some(account.clone()));
        ledger
            .update_account_status(account.id, AccountStatus::Inactive, Utc::now())
            .await
            .unwrap();
        let stored = ledger.get_account(account.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AccountStatus::Inactive);
    }

    #[tokio::test]
    async fn test_append_and_lookup() {
        let ledger = InMemoryLedger::new();
        let account = AccountId::generate();
        let tx = deposit(account, Utc::now());
        ledger.append(&tx).await.unwrap();

        assert_eq!(ledger.get_transaction(tx.id).await.unwrap(), Some(tx.clone()));
        assert_eq!(ledger.append(&tx).await, Err(Error::DuplicateTransaction));
        assert_eq!(ledger.transaction_count(), 1);
    }

    #[tokio::test]
    async fn test_replay_stats_track_reads() {
        let ledger = InMemoryLedger::new();
        let account = AccountId::generate();
        let start = Utc::now() - chrono::Duration::seconds(1);
        for _ in 0..3 {
            ledger.append(&deposit(account, Utc::now())).await.unwrap();
        }

        assert_eq!(ledger.list_all_by_account(account).await.unwrap().len(), 3);
        let since = ledger
            .list_by_account_since(account, start, Utc::now())
            .await
            .unwrap();
        assert_eq!(since.len(), 3);

        assert_eq!(
            ledger.replay_stats(),
            ReplayStats {
                full_replays: 1,
                incremental_replays: 1,
                entries_returned: 6,
            }
        );
    }
}
