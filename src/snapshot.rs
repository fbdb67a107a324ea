//! Periodic balance snapshots.
//!
//! The updater walks every account page by page, derives each balance and
//! upserts the page into the snapshot store. Snapshots put a floor under
//! balance replay so that an untouched account only replays entries issued
//! since the last run.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::balance::BalanceDeriver;
use crate::stores::within;
use crate::Result;

/// Outcome of one pass over all accounts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SnapshotRun {
    pub pages: usize,
    pub accounts: usize,
}

pub struct SnapshotUpdater {
    balances: Arc<BalanceDeriver>,
    page_size: usize,
}

impl SnapshotUpdater {
    pub fn new(balances: Arc<BalanceDeriver>, page_size: usize) -> Self {
        Self {
            balances,
            page_size: page_size.max(1),
        }
    }

    /// One full pass. The first error aborts the pass; pages upserted before
    /// it stay in place.
    pub async fn run_once(&self) -> Result<SnapshotRun> {
        let stores = self.balances.stores();
        let timeout = self.balances.options().store_timeout;
        let mut run = SnapshotRun::default();
        let mut offset = 0;

        loop {
            let page = within(
                timeout,
                "list accounts",
                stores.ledger.list_accounts(self.page_size, offset),
            )
            .await?;
            if page.is_empty() {
                break;
            }

            let mut rows = Vec::with_capacity(page.len());
            for account in &page {
                let _guard = self.balances.locks().lock(account.id).await;
                rows.push(self.balances.derive(account).await?);
            }
            within(
                timeout,
                "upsert snapshots",
                stores.snapshots.bulk_upsert(&rows),
            )
            .await?;

            run.pages += 1;
            run.accounts += rows.len();
            if page.len() < self.page_size {
                break;
            }
            offset += self.page_size;
        }
        Ok(run)
    }

    /// Runs a pass every `every` until `shutdown` flips to true or its sender
    /// is dropped. A failed pass is logged and retried at the next tick.
    pub async fn run(self: Arc<Self>, every: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => match self.run_once().await {
                    Ok(run) => info!(pages = run.pages, accounts = run.accounts, "snapshot run finished"),
                    Err(err) => error!(error = %err, "snapshot run failed"),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("snapshot updater stopped");
                        break;
                    }
                }
            }
        }
    }

    pub fn spawn(self: Arc<Self>, every: Duration, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(every, shutdown))
    }
}
