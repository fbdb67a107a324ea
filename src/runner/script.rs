use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::info;

use crate::dto::{BalanceRow, ScriptOp, ScriptRow};
use crate::identity::{IdentityResolver, SessionTable};
use crate::model::{AccountId, TransactionId, UserId};
use crate::snapshot::SnapshotUpdater;
use crate::{Engine, Error, Result};

struct ScriptedAccount {
    id: AccountId,
    owner: String,
}

/// Executes script rows against the engine, translating labels to ids.
///
/// Every user label gets a session on first use; each row acts as the user
/// its session resolves to.
pub(crate) struct Script {
    engine: Arc<Engine>,
    updater: Arc<SnapshotUpdater>,
    sessions: SessionTable,
    tokens: HashMap<String, String>,
    accounts: BTreeMap<String, ScriptedAccount>,
    references: HashMap<String, TransactionId>,
}

impl Script {
    pub(crate) fn new(engine: Arc<Engine>, updater: Arc<SnapshotUpdater>) -> Self {
        Self {
            engine,
            updater,
            sessions: SessionTable::new(),
            tokens: HashMap::new(),
            accounts: BTreeMap::new(),
            references: HashMap::new(),
        }
    }

    pub(crate) async fn apply(&mut self, row: ScriptRow) -> Result<()> {
        let actor = self.actor(&row.user).await?;
        match row.op {
            ScriptOp::Open => {
                let label = required(row.account, "account")?;
                if self.accounts.contains_key(&label) {
                    return Err(Error::InvalidInput(format!("account {label} already opened")));
                }
                let account = self.engine.create_account(actor, &label).await?;
                self.accounts.insert(
                    label,
                    ScriptedAccount {
                        id: account.id,
                        owner: row.user,
                    },
                );
            }
            ScriptOp::Deposit => {
                let to = self.account(row.account)?;
                self.engine
                    .deposit(actor, to, required(row.amount, "amount")?)
                    .await?;
            }
            ScriptOp::Withdraw => {
                let from = self.account(row.account)?;
                self.engine
                    .withdraw(actor, from, required(row.amount, "amount")?)
                    .await?;
            }
            ScriptOp::Transfer => {
                let from = self.account(row.account)?;
                let to = self.account(row.counterparty)?;
                let transfer = self
                    .engine
                    .transfer(actor, from, to, required(row.amount, "amount")?)
                    .await?;
                if let Some(reference) = row.reference {
                    self.references.insert(reference, transfer.id);
                }
            }
            ScriptOp::Refund => {
                let reference = required(row.reference, "reference")?;
                let transfer = self
                    .references
                    .get(&reference)
                    .copied()
                    .ok_or_else(|| Error::InvalidInput(format!("unknown reference {reference}")))?;
                self.engine.refund(actor, transfer).await?;
            }
            ScriptOp::Disable => {
                let id = self.account(row.account)?;
                self.engine.disable_account(actor, id).await?;
            }
            ScriptOp::Snapshot => {
                let run = self.updater.run_once().await?;
                info!(pages = run.pages, accounts = run.accounts, "scripted snapshot run");
            }
        }
        Ok(())
    }

    /// Final balances, ordered by account label.
    pub(crate) async fn balances(&self) -> Result<Vec<BalanceRow>> {
        let mut rows = Vec::with_capacity(self.accounts.len());
        for (label, scripted) in &self.accounts {
            let token = self
                .tokens
                .get(&scripted.owner)
                .ok_or(Error::Unauthenticated)?;
            let owner = self.sessions.resolve(token.as_str()).await?;
            let view = self.engine.get_account(owner, scripted.id).await?;
            rows.push(BalanceRow {
                account: label.clone(),
                owner: scripted.owner.clone(),
                status: view.account.status,
                balance: view.balance.balance.normalize(),
            });
        }
        Ok(rows)
    }

    async fn actor(&mut self, label: &str) -> Result<UserId> {
        let token = match self.tokens.get(label) {
            Some(token) => token.clone(),
            None => {
                let token = self.sessions.open(UserId::generate());
                self.tokens.insert(label.to_string(), token.clone());
                token
            }
        };
        self.sessions.resolve(token.as_str()).await
    }

    fn account(&self, label: Option<String>) -> Result<AccountId> {
        let label = required(label, "account")?;
        self.accounts
            .get(&label)
            .map(|scripted| scripted.id)
            .ok_or_else(|| Error::InvalidInput(format!("unknown account {label}")))
    }
}

fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| Error::InvalidInput(format!("missing {field}")))
}
