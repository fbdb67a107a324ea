use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::model::{Account, AccountId, AccountStatus, UserId};
use crate::{Error, Result};

#[derive(Default)]
pub struct AccountsStore {
    accounts: HashMap<AccountId, Account>,
}

impl AccountsStore {
    pub fn new() -> Self {
        Self {
            accounts: HashMap::new(),
        }
    }

    /// Stores a new account. Account ids are never reused.
    pub fn insert(&mut self, account: Account) -> Result<()> {
        if self.accounts.contains_key(&account.id) {
            return Err(Error::Storage(format!("account {} already exists", account.id)));
        }
        self.accounts.insert(account.id, account);
        Ok(())
    }

    pub fn get(&self, id: AccountId) -> Option<&Account> {
        self.accounts.get(&id)
    }

    /// Flips the status of an existing account. Accounts are never deleted.
    pub fn set_status(
        &mut self,
        id: AccountId,
        status: AccountStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let account = self.accounts.get_mut(&id).ok_or(Error::AccountNotFound)?;
        account.status = status;
        account.updated_at = at;
        Ok(())
    }

    /// Newest first. Ties on creation time fall back to id order.
    pub fn page(&self, limit: usize, offset: usize) -> Vec<Account> {
        let mut accounts: Vec<&Account> = self.accounts.values().collect();
        accounts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        accounts.into_iter().skip(offset).take(limit).cloned().collect()
    }

    pub fn page_by_owner(&self, owner: UserId, limit: usize, offset: usize) -> Vec<Account> {
        let mut accounts: Vec<&Account> = self
            .accounts
            .values()
            .filter(|account| account.owner == owner)
            .collect();
        accounts.sort_by(|a, b| {
            status_rank(a.status)
                .cmp(&status_rank(b.status))
                .then(b.created_at.cmp(&a.created_at))
                .then(b.id.cmp(&a.id))
        });
        accounts.into_iter().skip(offset).take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

fn status_rank(status: AccountStatus) -> u8 {
    match status {
        AccountStatus::Active => 0,
        AccountStatus::Inactive => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn account_at(owner: UserId, name: &str, minutes: i64) -> Account {
        let created = DateTime::<Utc>::UNIX_EPOCH + Duration::minutes(minutes);
        Account::new(owner, name, created)
    }

    #[test]
    fn test_new_store_is_empty() {
        let store = AccountsStore::new();
        assert!(store.is_empty());
        assert!(store.get(AccountId::generate()).is_none());
    }

    #[test]
    fn test_duplicate_insert_fails() {
        let mut store = AccountsStore::new();
        let account = account_at(UserId::generate(), "main", 0);
        store.insert(account.clone()).unwrap();
        assert!(matches!(store.insert(account), Err(Error::Storage(_))));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_page_is_newest_first() {
        let mut store = AccountsStore::new();
        let owner = UserId::generate();
        for minute in 0..5 {
            store.insert(account_at(owner, &format!("acc-{minute}"), minute)).unwrap();
        }

        let first: Vec<String> = store.page(2, 0).into_iter().map(|a| a.name).collect();
        assert_eq!(first, vec!["acc-4", "acc-3"]);
        let last: Vec<String> = store.page(2, 4).into_iter().map(|a| a.name).collect();
        assert_eq!(last, vec!["acc-0"]);
        assert!(store.page(2, 6).is_empty());
    }

    #[test]
    fn test_page_by_owner_puts_inactive_last() {
        let mut store = AccountsStore::new();
        let owner = UserId::generate();
        let stranger = UserId::generate();

        let old = account_at(owner, "old", 0);
        let new = account_at(owner, "new", 10);
        let closed = account_at(owner, "closed", 20);
        let closed_id = closed.id;
        store.insert(old).unwrap();
        store.insert(new).unwrap();
        store.insert(closed).unwrap();
        store.insert(account_at(stranger, "other", 30)).unwrap();
        store
            .set_status(closed_id, AccountStatus::Inactive, Utc::now())
            .unwrap();

        let names: Vec<String> = store
            .page_by_owner(owner, 10, 0)
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["new", "old", "closed"]);
    }

    #[test]
    fn test_set_status_missing_account() {
        let mut store = AccountsStore::new();
        assert_eq!(
            store.set_status(AccountId::generate(), AccountStatus::Inactive, Utc::now()),
            Err(Error::AccountNotFound)
        );
    }
}
