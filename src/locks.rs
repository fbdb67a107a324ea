//! Per-account write serialization.
//!
//! Balance checks and the append that depends on them run under the lock of
//! every account they touch. Multi-account operations take their locks in
//! ascending id order, so two transfers in opposite directions cannot
//! deadlock.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::model::AccountId;

type Slots = Arc<Mutex<HashMap<AccountId, Arc<AsyncMutex<()>>>>>;

/// Held locks. Released on drop; a slot nobody holds or waits on is removed.
pub struct AccountGuard {
    guards: Vec<(AccountId, OwnedMutexGuard<()>)>,
    slots: Slots,
}

impl Drop for AccountGuard {
    fn drop(&mut self) {
        let held = std::mem::take(&mut self.guards);
        let accounts: Vec<AccountId> = held.iter().map(|(account, _)| *account).collect();
        drop(held);

        let mut slots = self.slots.lock();
        for account in accounts {
            // Waiters clone the slot under this same lock before awaiting it.
            if slots
                .get(&account)
                .is_some_and(|slot| Arc::strong_count(slot) == 1)
            {
                slots.remove(&account);
            }
        }
    }
}

#[derive(Default)]
pub struct AccountLocks {
    slots: Slots,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, account: AccountId) -> AccountGuard {
        self.lock_many(&[account]).await
    }

    pub async fn lock_many(&self, accounts: &[AccountId]) -> AccountGuard {
        let mut ordered = accounts.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut guard = AccountGuard {
            guards: Vec::with_capacity(ordered.len()),
            slots: self.slots.clone(),
        };
        for account in ordered {
            let slot = self.slot(account);
            guard.guards.push((account, slot.lock_owned().await));
        }
        guard
    }

    /// Number of accounts currently locked or waited on.
    pub(crate) fn len(&self) -> usize {
        self.slots.lock().len()
    }

    fn slot(&self, account: AccountId) -> Arc<AsyncMutex<()>> {
        self.slots
            .lock()
            .entry(account)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}
