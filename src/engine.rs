use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

use crate::balance::{BalanceDeriver, DeriveOptions};
use crate::model::{
    Account, AccountBalance, AccountId, AccountStatus, AccountView, Amount, Movement, Transaction,
    TransactionId, UserId,
};
use crate::stores::{within, Stores};
use crate::{Error, Result};

pub const MAX_NAME_LEN: usize = 100;
pub const DEFAULT_PAGE_LIMIT: usize = 10;
pub const MAX_PAGE_LIMIT: usize = 100;

/// Account lifecycle and the transaction state machine.
///
/// Every check that depends on a balance runs under the locks of the accounts
/// involved, together with the append it guards. Nothing is written to the
/// ledger when a check fails.
pub struct Engine {
    balances: Arc<BalanceDeriver>,
}

impl Engine {
    pub fn new(stores: Stores, options: DeriveOptions) -> Self {
        Self {
            balances: Arc::new(BalanceDeriver::new(stores, options)),
        }
    }

    /// Shared deriver, for the snapshot updater.
    pub fn balances(&self) -> Arc<BalanceDeriver> {
        self.balances.clone()
    }

    pub async fn create_account(&self, actor: UserId, name: &str) -> Result<Account> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("account name is empty".to_string()));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(Error::InvalidInput(format!(
                "account name longer than {MAX_NAME_LEN} characters"
            )));
        }

        let account = Account::new(actor, name, self.balances.now());
        within(
            self.timeout(),
            "insert account",
            self.stores().ledger.insert_account(&account),
        )
        .await?;
        info!(account = %account.id, owner = %actor, "opened account");
        Ok(account)
    }

    pub async fn get_account(&self, actor: UserId, id: AccountId) -> Result<AccountView> {
        let _guard = self.balances.locks().lock(id).await;
        let account = self.balances.account(id).await?;
        ensure_owner(&account, actor)?;
        let balance = self.balances.derive(&account).await?;
        Ok(AccountView { account, balance })
    }

    /// Accounts of `actor`, active first. A zero limit means the default page.
    pub async fn list_accounts(
        &self,
        actor: UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Account>> {
        let limit = match limit {
            0 => DEFAULT_PAGE_LIMIT,
            n => n.min(MAX_PAGE_LIMIT),
        };
        within(
            self.timeout(),
            "list accounts by owner",
            self.stores().ledger.list_accounts_by_owner(actor, limit, offset),
        )
        .await
    }

    /// Marks an empty account inactive. Disabling an inactive account is a no-op.
    pub async fn disable_account(&self, actor: UserId, id: AccountId) -> Result<Account> {
        let _guard = self.balances.locks().lock(id).await;
        let mut account = self.balances.account(id).await?;
        ensure_owner(&account, actor)?;
        if !account.is_active() {
            return Ok(account);
        }

        let balance = self.balances.derive(&account).await?;
        if !balance.balance.is_zero() {
            return Err(Error::HasBalance);
        }

        let now = self.balances.now();
        within(
            self.timeout(),
            "update account status",
            self.stores()
                .ledger
                .update_account_status(id, AccountStatus::Inactive, now),
        )
        .await?;
        account.status = AccountStatus::Inactive;
        account.updated_at = now;
        info!(account = %id, "disabled account");
        Ok(account)
    }

    pub async fn deposit(&self, actor: UserId, to: AccountId, amount: Decimal) -> Result<Transaction> {
        let amount = Amount::new(amount)?;
        let _guard = self.balances.locks().lock(to).await;
        let account = self.balances.account(to).await?;
        ensure_owner(&account, actor)?;
        ensure_active(&account)?;
        self.record(Movement::Deposit { to }, amount).await
    }

    pub async fn withdraw(
        &self,
        actor: UserId,
        from: AccountId,
        amount: Decimal,
    ) -> Result<Transaction> {
        let amount = Amount::new(amount)?;
        let _guard = self.balances.locks().lock(from).await;
        let account = self.balances.account(from).await?;
        ensure_owner(&account, actor)?;
        ensure_active(&account)?;
        self.ensure_covers(&account, amount).await?;
        self.record(Movement::Withdrawal { from }, amount).await
    }

    pub async fn transfer(
        &self,
        actor: UserId,
        from: AccountId,
        to: AccountId,
        amount: Decimal,
    ) -> Result<Transaction> {
        let amount = Amount::new(amount)?;
        if from == to {
            return Err(Error::InvalidInput(
                "cannot transfer to the same account".to_string(),
            ));
        }

        let _guard = self.balances.locks().lock_many(&[from, to]).await;
        let sender = self.balances.account(from).await?;
        let receiver = self.balances.account(to).await?;
        ensure_owner(&sender, actor)?;
        ensure_active(&sender)?;
        ensure_active(&receiver)?;
        self.ensure_covers(&sender, amount).await?;
        self.record(Movement::Transfer { from, to }, amount).await
    }

    /// Reverses a transfer in full: the receiver pays the sender back.
    pub async fn refund(&self, actor: UserId, transfer_id: TransactionId) -> Result<Transaction> {
        let original = self.find_transaction(transfer_id).await?;
        let Movement::Transfer { from, to } = original.movement else {
            return Err(Error::NotRefundable);
        };

        let _guard = self.balances.locks().lock_many(&[from, to]).await;
        let sender = self.balances.account(from).await?;
        let receiver = self.balances.account(to).await?;
        if !sender.is_owned_by(actor) && !receiver.is_owned_by(actor) {
            return Err(Error::NotOwner);
        }
        ensure_active(&sender)?;
        ensure_active(&receiver)?;

        let existing = within(
            self.timeout(),
            "find refund",
            self.stores().ledger.find_refund_of(transfer_id),
        )
        .await?;
        if existing.is_some() {
            return Err(Error::AlreadyRefunded);
        }

        self.ensure_covers(&receiver, original.amount).await?;
        self.record(
            Movement::Refund {
                from,
                to,
                related: transfer_id,
            },
            original.amount,
        )
        .await
    }

    /// A ledger entry, visible to the owner of either side.
    pub async fn get_transaction(&self, actor: UserId, id: TransactionId) -> Result<Transaction> {
        let entry = self.find_transaction(id).await?;
        for account in entry.movement.accounts() {
            let owner = within(
                self.timeout(),
                "get account",
                self.stores().ledger.get_account(account),
            )
            .await?
            .map(|account| account.owner);
            if owner == Some(actor) {
                return Ok(entry);
            }
        }
        Err(Error::NotOwner)
    }

    pub async fn balance(&self, id: AccountId) -> Result<AccountBalance> {
        self.balances.balance(id).await
    }

    fn stores(&self) -> &Stores {
        self.balances.stores()
    }

    fn timeout(&self) -> std::time::Duration {
        self.balances.options().store_timeout
    }

    async fn find_transaction(&self, id: TransactionId) -> Result<Transaction> {
        within(
            self.timeout(),
            "get transaction",
            self.stores().ledger.get_transaction(id),
        )
        .await?
        .ok_or(Error::TransactionNotFound)
    }

    async fn ensure_covers(&self, account: &Account, amount: Amount) -> Result<()> {
        let current = self.balances.derive(account).await?;
        if current.balance < amount.value() {
            return Err(Error::InsufficientBalance);
        }
        Ok(())
    }

    /// Appends a new entry. The caller holds the locks of every account it touches.
    async fn record(&self, movement: Movement, amount: Amount) -> Result<Transaction> {
        let id = TransactionId::generate();
        let clash = within(
            self.timeout(),
            "get transaction",
            self.stores().ledger.get_transaction(id),
        )
        .await?;
        if clash.is_some() {
            return Err(Error::DuplicateTransaction);
        }

        let entry = Transaction {
            id,
            amount,
            issued_at: self.balances.now(),
            movement,
        };
        within(self.timeout(), "append", self.stores().ledger.append(&entry)).await?;
        self.balances.invalidate(&movement.accounts()).await;

        info!(
            id = %entry.id,
            kind = %entry.kind(),
            amount = %entry.amount,
            "recorded transaction"
        );
        Ok(entry)
    }
}

fn ensure_owner(account: &Account, actor: UserId) -> Result<()> {
    if account.is_owned_by(actor) {
        Ok(())
    } else {
        Err(Error::NotOwner)
    }
}

fn ensure_active(account: &Account) -> Result<()> {
    if account.is_active() {
        Ok(())
    } else {
        Err(Error::AccountInactive)
    }
}
