//! Balance derivation.
//!
//! A balance is never stored as a fact. It is folded from the ledger, starting
//! from the best available base:
//! 1. The cached `(balance, as_of)` of the account
//! 2. Otherwise the snapshot row of the account
//! 3. Otherwise zero as of the account's creation
//!
//! A positive base only needs the entries issued after its `as_of`. A zero
//! base replays the whole history. The result is written back to the cache.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::clock::Timeline;
use crate::locks::AccountLocks;
use crate::model::{Account, AccountBalance, AccountId, Movement, Transaction};
use crate::stores::{within, Stores};
use crate::{Error, Result};

/// Store timeout and cache lifetime used by balance reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeriveOptions {
    pub store_timeout: Duration,
    pub cache_ttl: Duration,
}

impl Default for DeriveOptions {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(5),
            cache_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

pub fn cache_key(account: AccountId) -> String {
    format!("balance:{account}")
}

/// Effect of one entry on `account`. Entries not touching it contribute zero.
pub fn signed_effect(account: AccountId, entry: &Transaction) -> Decimal {
    let (credited, debited) = match entry.movement {
        Movement::Deposit { to } => (Some(to), None),
        Movement::Withdrawal { from } => (None, Some(from)),
        Movement::Transfer { from, to } => (Some(to), Some(from)),
        // A refund pays the original sender back out of the original receiver.
        Movement::Refund { from, to, .. } => (Some(from), Some(to)),
    };

    let amount = entry.amount.value();
    let mut effect = Decimal::ZERO;
    if credited == Some(account) {
        effect += amount;
    }
    if debited == Some(account) {
        effect -= amount;
    }
    effect
}

pub fn replay<'a>(
    account: AccountId,
    base: Decimal,
    entries: impl IntoIterator<Item = &'a Transaction>,
) -> Decimal {
    entries
        .into_iter()
        .fold(base, |balance, entry| balance + signed_effect(account, entry))
}

/// Derives balances and owns the synchronization shared with the write path.
pub struct BalanceDeriver {
    stores: Stores,
    locks: Arc<AccountLocks>,
    timeline: Arc<Timeline>,
    options: DeriveOptions,
}

impl BalanceDeriver {
    pub fn new(stores: Stores, options: DeriveOptions) -> Self {
        Self {
            stores,
            locks: Arc::new(AccountLocks::new()),
            timeline: Arc::new(Timeline::new()),
            options,
        }
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn options(&self) -> DeriveOptions {
        self.options
    }

    pub(crate) fn locks(&self) -> &AccountLocks {
        &self.locks
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.timeline.now()
    }

    /// Current balance of `id`. Serialized with writers of the same account.
    pub async fn balance(&self, id: AccountId) -> Result<AccountBalance> {
        let _guard = self.locks.lock(id).await;
        let account = self.account(id).await?;
        self.derive(&account).await
    }

    pub(crate) async fn account(&self, id: AccountId) -> Result<Account> {
        within(
            self.options.store_timeout,
            "get account",
            self.stores.ledger.get_account(id),
        )
        .await?
        .ok_or(Error::AccountNotFound)
    }

    /// Derives the balance of `account`. The caller holds its lock.
    pub(crate) async fn derive(&self, account: &Account) -> Result<AccountBalance> {
        let timeout = self.options.store_timeout;
        let now = self.timeline.now();
        let key = cache_key(account.id);

        let base = match self.cached(account.id, &key).await {
            Some(base) => base,
            None => within(
                timeout,
                "load snapshot",
                self.stores.snapshots.load_snapshot(account.id),
            )
            .await?
            .unwrap_or_else(|| AccountBalance::opening(account)),
        };

        let balance = if base.balance > Decimal::ZERO {
            let entries = within(
                timeout,
                "list entries since",
                self.stores
                    .ledger
                    .list_by_account_since(account.id, base.as_of, now),
            )
            .await?;
            debug!(
                account = %account.id,
                base = %base.balance,
                entries = entries.len(),
                "incremental replay"
            );
            replay(account.id, base.balance, &entries)
        } else {
            let entries = within(
                timeout,
                "list all entries",
                self.stores.ledger.list_all_by_account(account.id),
            )
            .await?;
            debug!(account = %account.id, entries = entries.len(), "full replay");
            replay(account.id, Decimal::ZERO, &entries)
        };

        let derived = AccountBalance {
            account_id: account.id,
            balance,
            as_of: now,
        };
        self.write_back(&key, &derived).await;
        Ok(derived)
    }

    /// Drops the cached balance of every account. Failures are logged.
    pub(crate) async fn invalidate(&self, accounts: &[AccountId]) {
        for &account in accounts {
            let key = cache_key(account);
            if let Err(err) = within(
                self.options.store_timeout,
                "cache delete",
                self.stores.cache.delete(&key),
            )
            .await
            {
                warn!(%account, error = %err, "failed to invalidate cached balance");
            }
        }
    }

    async fn cached(&self, account: AccountId, key: &str) -> Option<AccountBalance> {
        let raw = match within(
            self.options.store_timeout,
            "cache get",
            self.stores.cache.get(key),
        )
        .await
        {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(%account, error = %err, "balance cache read failed");
                return None;
            }
        };
        match serde_json::from_slice::<AccountBalance>(&raw) {
            Ok(cached) if cached.account_id == account => Some(cached),
            Ok(_) => {
                warn!(%account, "cached balance belongs to another account");
                None
            }
            Err(err) => {
                warn!(%account, error = %err, "undecodable cached balance");
                None
            }
        }
    }

    async fn write_back(&self, key: &str, derived: &AccountBalance) {
        let account = derived.account_id;
        let encoded = match serde_json::to_vec(derived) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(%account, error = %err, "failed to encode balance");
                return;
            }
        };
        let timeout = self.options.store_timeout;
        if let Err(err) = within(timeout, "cache delete", self.stores.cache.delete(key)).await {
            warn!(%account, error = %err, "failed to drop stale cached balance");
        }
        if let Err(err) = within(
            timeout,
            "cache set",
            self.stores.cache.set(key, encoded, self.options.cache_ttl),
        )
        .await
        {
            warn!(%account, error = %err, "failed to cache balance");
        }
    }
}
