use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, Params, Row};
use rust_decimal::Decimal;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use super::{LedgerStore, SnapshotStore};
use crate::model::{
    Account, AccountBalance, AccountId, AccountStatus, Amount, Movement, Transaction,
    TransactionId, TransactionKind, UserId,
};
use crate::{Error, Result};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    name TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS accounts_idx_owner ON accounts(owner_id);
CREATE INDEX IF NOT EXISTS accounts_idx_created ON accounts(created_at);

CREATE TABLE IF NOT EXISTS transactions (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    from_account_id TEXT,
    to_account_id TEXT,
    amount TEXT NOT NULL,
    issued_at TEXT NOT NULL,
    related_transaction_id TEXT
);
CREATE INDEX IF NOT EXISTS transactions_idx_from ON transactions(from_account_id, issued_at);
CREATE INDEX IF NOT EXISTS transactions_idx_to ON transactions(to_account_id, issued_at);
CREATE UNIQUE INDEX IF NOT EXISTS transactions_idx_refund
    ON transactions(related_transaction_id) WHERE kind = 'refund';

CREATE TABLE IF NOT EXISTS balance_snapshots (
    account_id TEXT PRIMARY KEY,
    balance TEXT NOT NULL,
    as_of TEXT NOT NULL
);
"#;

const ACCOUNT_COLUMNS: &str = "id, owner_id, name, status, created_at, updated_at";
const TRANSACTION_COLUMNS: &str =
    "id, kind, from_account_id, to_account_id, amount, issued_at, related_transaction_id";

/// SQLite-backed ledger and snapshot store. Every call opens its own
/// connection on a blocking worker thread.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self { path: path.into() };
        connect(&store.path)?.execute_batch(SCHEMA)?;
        Ok(store)
    }

    async fn run<T, F>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = connect(&path)?;
            job(&mut conn)
        })
        .await
        .map_err(|err| Error::Unavailable(format!("sqlite worker failed: {err}")))?
    }
}

fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|err| Error::Storage(err.to_string()))?;
        }
    }
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
    Ok(conn)
}

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn insert_account(&self, account: &Account) -> Result<()> {
        let account = account.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO accounts (id, owner_id, name, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    account.id.to_string(),
                    account.owner.to_string(),
                    account.name,
                    account.status.as_str(),
                    timestamp(account.created_at),
                    timestamp(account.updated_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        self.run(move |conn| {
            let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1");
            first(query_all(conn, &sql, params![id.to_string()], row_to_account)?)
        })
        .await
    }

    async fn update_account_status(
        &self,
        id: AccountId,
        status: AccountStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE accounts SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), timestamp(at), id.to_string()],
            )?;
            if changed == 0 {
                return Err(Error::AccountNotFound);
            }
            Ok(())
        })
        .await
    }

    async fn list_accounts(&self, limit: usize, offset: usize) -> Result<Vec<Account>> {
        self.run(move |conn| {
            let sql = format!(
                "SELECT {ACCOUNT_COLUMNS} FROM accounts
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?1 OFFSET ?2"
            );
            query_all(conn, &sql, params![limit as i64, offset as i64], row_to_account)
        })
        .await
    }

    async fn list_accounts_by_owner(
        &self,
        owner: UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Account>> {
        self.run(move |conn| {
            let sql = format!(
                "SELECT {ACCOUNT_COLUMNS} FROM accounts
                 WHERE owner_id = ?1
                 ORDER BY CASE status WHEN 'active' THEN 0 ELSE 1 END, created_at DESC, id DESC
                 LIMIT ?2 OFFSET ?3"
            );
            query_all(
                conn,
                &sql,
                params![owner.to_string(), limit as i64, offset as i64],
                row_to_account,
            )
        })
        .await
    }

    async fn append(&self, entry: &Transaction) -> Result<()> {
        let entry = entry.clone();
        self.run(move |conn| {
            let movement = entry.movement;
            let inserted = conn.execute(
                "INSERT INTO transactions (
                    id, kind, from_account_id, to_account_id, amount, issued_at, related_transaction_id
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    entry.id.to_string(),
                    movement.kind().as_str(),
                    movement.from().map(|id| id.to_string()),
                    movement.to().map(|id| id.to_string()),
                    entry.amount.to_string(),
                    timestamp(entry.issued_at),
                    movement.related().map(|id| id.to_string()),
                ],
            );
            match inserted {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(failure, message))
                    if failure.code == ErrorCode::ConstraintViolation =>
                {
                    let refund_conflict = message
                        .as_deref()
                        .is_some_and(|text| text.contains("related_transaction_id"));
                    if refund_conflict {
                        Err(Error::AlreadyRefunded)
                    } else {
                        Err(Error::DuplicateTransaction)
                    }
                }
                Err(err) => Err(err.into()),
            }
        })
        .await
    }

    async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        self.run(move |conn| {
            let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1");
            first(query_all(conn, &sql, params![id.to_string()], row_to_transaction)?)
        })
        .await
    }

    async fn list_by_account_since(
        &self,
        account: AccountId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Transaction>> {
        self.run(move |conn| {
            let sql = format!(
                "SELECT {TRANSACTION_COLUMNS} FROM transactions
                 WHERE (from_account_id = ?1 OR to_account_id = ?1)
                   AND issued_at > ?2 AND issued_at <= ?3
                 ORDER BY issued_at ASC, id ASC"
            );
            query_all(
                conn,
                &sql,
                params![account.to_string(), timestamp(from), timestamp(to)],
                row_to_transaction,
            )
        })
        .await
    }

    async fn list_all_by_account(&self, account: AccountId) -> Result<Vec<Transaction>> {
        self.run(move |conn| {
            let sql = format!(
                "SELECT {TRANSACTION_COLUMNS} FROM transactions
                 WHERE from_account_id = ?1 OR to_account_id = ?1
                 ORDER BY issued_at ASC, id ASC"
            );
            query_all(conn, &sql, params![account.to_string()], row_to_transaction)
        })
        .await
    }

    async fn find_refund_of(&self, transfer: TransactionId) -> Result<Option<Transaction>> {
        self.run(move |conn| {
            let sql = format!(
                "SELECT {TRANSACTION_COLUMNS} FROM transactions
                 WHERE kind = 'refund' AND related_transaction_id = ?1"
            );
            first(query_all(conn, &sql, params![transfer.to_string()], row_to_transaction)?)
        })
        .await
    }
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    async fn load_snapshot(&self, account: AccountId) -> Result<Option<AccountBalance>> {
        self.run(move |conn| {
            first(query_all(
                conn,
                "SELECT account_id, balance, as_of FROM balance_snapshots WHERE account_id = ?1",
                params![account.to_string()],
                row_to_snapshot,
            )?)
        })
        .await
    }

    async fn bulk_upsert(&self, snapshots: &[AccountBalance]) -> Result<()> {
        if snapshots.is_empty() {
            return Ok(());
        }
        let snapshots = snapshots.to_vec();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            for snapshot in &snapshots {
                tx.execute(
                    "INSERT INTO balance_snapshots (account_id, balance, as_of)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(account_id) DO UPDATE SET
                        balance = excluded.balance,
                        as_of = excluded.as_of
                     WHERE excluded.as_of >= balance_snapshots.as_of",
                    params![
                        snapshot.account_id.to_string(),
                        snapshot.balance.to_string(),
                        timestamp(snapshot.as_of),
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }
}

/// Fixed-width RFC 3339 so that text order matches time order.
fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn query_all<T, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    decode: fn(&Row<'_>) -> Result<T>,
) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut decoded = Vec::new();
    while let Some(row) = rows.next()? {
        decoded.push(decode(row)?);
    }
    Ok(decoded)
}

fn first<T>(rows: Vec<T>) -> Result<Option<T>> {
    Ok(rows.into_iter().next())
}

fn parse_column<T>(value: &str, column: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse()
        .map_err(|err| Error::Storage(format!("invalid {column} {value}: {err}")))
}

fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| Error::Storage(format!("invalid {column} {value}: {err}")))
}

fn parse_optional<T>(value: Option<String>, column: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    value.map(|text| parse_column(&text, column)).transpose()
}

fn row_to_account(row: &Row<'_>) -> Result<Account> {
    let id: String = row.get(0)?;
    let owner: String = row.get(1)?;
    let name: String = row.get(2)?;
    let status: String = row.get(3)?;
    let created_at: String = row.get(4)?;
    let updated_at: String = row.get(5)?;

    Ok(Account {
        id: parse_column(&id, "account id")?,
        owner: parse_column(&owner, "owner id")?,
        name,
        status: parse_column(&status, "account status")?,
        created_at: parse_timestamp(&created_at, "created_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
    })
}

fn row_to_transaction(row: &Row<'_>) -> Result<Transaction> {
    let id: String = row.get(0)?;
    let kind: String = row.get(1)?;
    let from: Option<String> = row.get(2)?;
    let to: Option<String> = row.get(3)?;
    let amount: String = row.get(4)?;
    let issued_at: String = row.get(5)?;
    let related: Option<String> = row.get(6)?;

    let kind = TransactionKind::from_str(&kind)?;
    let amount: Decimal = parse_column(&amount, "amount")?;
    let movement = Movement::from_parts(
        kind,
        parse_optional(from, "from_account_id")?,
        parse_optional(to, "to_account_id")?,
        parse_optional(related, "related_transaction_id")?,
    )?;

    Ok(Transaction {
        id: parse_column(&id, "transaction id")?,
        amount: Amount::new(amount)
            .map_err(|err| Error::Storage(format!("invalid stored amount: {err}")))?,
        issued_at: parse_timestamp(&issued_at, "issued_at")?,
        movement,
    })
}

fn row_to_snapshot(row: &Row<'_>) -> Result<AccountBalance> {
    let account_id: String = row.get(0)?;
    let balance: String = row.get(1)?;
    let as_of: String = row.get(2)?;

    Ok(AccountBalance {
        account_id: parse_column(&account_id, "account id")?,
        balance: parse_column(&balance, "balance")?,
        as_of: parse_timestamp(&as_of, "as_of")?,
    })
}
