use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use super::SnapshotStore;
use crate::model::{AccountBalance, AccountId};
use crate::Result;

#[derive(Default)]
pub struct InMemorySnapshotStore {
    rows: RwLock<HashMap<AccountId, AccountBalance>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn load_snapshot(&self, account: AccountId) -> Result<Option<AccountBalance>> {
        Ok(self.rows.read().get(&account).cloned())
    }

    async fn bulk_upsert(&self, snapshots: &[AccountBalance]) -> Result<()> {
        let mut rows = self.rows.write();
        for snapshot in snapshots {
            match rows.get(&snapshot.account_id) {
                Some(existing) if existing.as_of > snapshot.as_of => {}
                _ => {
                    rows.insert(snapshot.account_id, snapshot.clone());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_upsert_keeps_latest() {
        let store = InMemorySnapshotStore::new();
        let account = AccountId::generate();
        let now = Utc::now();
        let fresh = AccountBalance {
            account_id: account,
            balance: dec!(20),
            as_of: now,
        };
        let stale = AccountBalance {
            account_id: account,
            balance: dec!(10),
            as_of: now - Duration::minutes(5),
        };

        store.bulk_upsert(&[fresh.clone()]).await.unwrap();
        store.bulk_upsert(&[stale]).await.unwrap();
        assert_eq!(store.load_snapshot(account).await.unwrap(), Some(fresh));

        let newer = AccountBalance {
            account_id: account,
            balance: dec!(30),
            as_of: now + Duration::minutes(5),
        };
        store.bulk_upsert(&[newer.clone()]).await.unwrap();
        assert_eq!(store.load_snapshot(account).await.unwrap(), Some(newer));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_snapshot() {
        let store = InMemorySnapshotStore::new();
        assert!(store.is_empty());
        assert_eq!(store.load_snapshot(AccountId::generate()).await.unwrap(), None);
    }
}
