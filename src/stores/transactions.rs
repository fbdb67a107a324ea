//! Append-only transaction log with the lookups balance replay needs.
//!
//! Maintains:
//! - The entries in append order
//! - An id index for point lookups and duplicate prevention
//! - A per-account index for history and range replay
//! - A refund index enforcing one refund per transfer

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::model::{AccountId, Movement, Transaction, TransactionId};
use crate::{Error, Result};

#[derive(Default)]
pub struct TransactionsStore {
    entries: Vec<Transaction>,
    by_id: HashMap<TransactionId, usize>,
    by_account: HashMap<AccountId, Vec<usize>>,
    /// Transfer id -> position of the refund reversing it
    refunds: HashMap<TransactionId, usize>,
}

impl TransactionsStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn contains(&self, id: TransactionId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Appends an entry. Entries are never mutated or removed afterwards.
    pub fn append(&mut self, entry: Transaction) -> Result<()> {
        if self.contains(entry.id) {
            return Err(Error::DuplicateTransaction);
        }
        if let Movement::Refund { related, .. } = entry.movement {
            if self.refunds.contains_key(&related) {
                return Err(Error::AlreadyRefunded);
            }
        }

        let position = self.entries.len();
        self.by_id.insert(entry.id, position);
        for account in entry.movement.accounts() {
            self.by_account.entry(account).or_default().push(position);
        }
        if let Some(related) = entry.movement.related() {
            self.refunds.insert(related, position);
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn get(&self, id: TransactionId) -> Option<&Transaction> {
        self.by_id.get(&id).map(|&position| &self.entries[position])
    }

    /// Every entry touching `account`, in append order.
    pub fn for_account(&self, account: AccountId) -> impl Iterator<Item = &Transaction> {
        self.by_account
            .get(&account)
            .into_iter()
            .flatten()
            .map(|&position| &self.entries[position])
    }

    /// Entries touching `account` with `from < issued_at <= to`.
    pub fn for_account_between(
        &self,
        account: AccountId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl Iterator<Item = &Transaction> {
        self.for_account(account)
            .filter(move |entry| entry.issued_at > from && entry.issued_at <= to)
    }

    pub fn refund_of(&self, transfer: TransactionId) -> Option<&Transaction> {
        self.refunds
            .get(&transfer)
            .map(|&position| &self.entries[position])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
