//! Domain entities: accounts, ledger entries and derived balances.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{Error, Result};

/// Maximum number of fractional digits an amount may carry.
pub const AMOUNT_SCALE: u32 = 4;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Fresh time-ordered (v7) identifier.
            pub fn generate() -> Self {
                Self(Uuid::now_v7())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|err| Error::InvalidInput(format!("invalid {} {s}: {err}", $label)))
            }
        }
    };
}

uuid_id!(
    /// Identifier of an account, unique and immutable.
    AccountId,
    "account id"
);
uuid_id!(
    /// Identifier of the user owning accounts.
    UserId,
    "user id"
);
uuid_id!(
    /// Ledger entry identifier. v7 ids sort by creation time.
    TransactionId,
    "transaction id"
);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Inactive,
}

impl AccountStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(AccountStatus::Active),
            "inactive" => Ok(AccountStatus::Inactive),
            other => Err(Error::InvalidInput(format!("unknown account status: {other}"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub owner: UserId,
    pub name: String,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(owner: UserId, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: AccountId::generate(),
            owner,
            name: name.into(),
            status: AccountStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.owner == user
    }
}

/// Strictly positive fixed-point amount with at most [`AMOUNT_SCALE`] fractional digits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self> {
        if value <= Decimal::ZERO {
            return Err(Error::InvalidInput(format!(
                "amount must be positive, got {value}"
            )));
        }
        if value.normalize().scale() > AMOUNT_SCALE {
            return Err(Error::InvalidInput(format!(
                "amount {value} has more than {AMOUNT_SCALE} decimal places"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = Error;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Storage tag of a ledger entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    Transfer,
    Refund,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::Transfer => "transfer",
            TransactionKind::Refund => "refund",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "deposit" => Ok(TransactionKind::Deposit),
            "withdrawal" => Ok(TransactionKind::Withdrawal),
            "transfer" => Ok(TransactionKind::Transfer),
            "refund" => Ok(TransactionKind::Refund),
            other => Err(Error::UnknownTransactionKind(other.to_string())),
        }
    }
}

/// Where the money of a ledger entry goes. Each kind carries only the
/// references it needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Movement {
    Deposit {
        to: AccountId,
    },
    Withdrawal {
        from: AccountId,
    },
    Transfer {
        from: AccountId,
        to: AccountId,
    },
    /// Reverses `related`: `from` is the original sender, `to` the original receiver.
    Refund {
        from: AccountId,
        to: AccountId,
        related: TransactionId,
    },
}

impl Movement {
    /// Rebuilds a movement from its flat storage columns.
    pub fn from_parts(
        kind: TransactionKind,
        from: Option<AccountId>,
        to: Option<AccountId>,
        related: Option<TransactionId>,
    ) -> Result<Self> {
        let movement = match (kind, from, to, related) {
            (TransactionKind::Deposit, None, Some(to), None) => Movement::Deposit { to },
            (TransactionKind::Withdrawal, Some(from), None, None) => Movement::Withdrawal { from },
            (TransactionKind::Transfer, Some(from), Some(to), None) => {
                Movement::Transfer { from, to }
            }
            (TransactionKind::Refund, Some(from), Some(to), Some(related)) => Movement::Refund {
                from,
                to,
                related,
            },
            (kind, from, to, related) => {
                return Err(Error::Storage(format!(
                    "malformed {kind} entry: from={from:?} to={to:?} related={related:?}"
                )))
            }
        };
        Ok(movement)
    }

    pub fn kind(&self) -> TransactionKind {
        match self {
            Movement::Deposit { .. } => TransactionKind::Deposit,
            Movement::Withdrawal { .. } => TransactionKind::Withdrawal,
            Movement::Transfer { .. } => TransactionKind::Transfer,
            Movement::Refund { .. } => TransactionKind::Refund,
        }
    }

    pub fn from(&self) -> Option<AccountId> {
        match *self {
            Movement::Deposit { .. } => None,
            Movement::Withdrawal { from }
            | Movement::Transfer { from, .. }
            | Movement::Refund { from, .. } => Some(from),
        }
    }

    pub fn to(&self) -> Option<AccountId> {
        match *self {
            Movement::Withdrawal { .. } => None,
            Movement::Deposit { to } | Movement::Transfer { to, .. } | Movement::Refund { to, .. } => {
                Some(to)
            }
        }
    }

    pub fn related(&self) -> Option<TransactionId> {
        match *self {
            Movement::Refund { related, .. } => Some(related),
            _ => None,
        }
    }

    /// Accounts whose balance this movement changes, deduplicated.
    pub fn accounts(&self) -> Vec<AccountId> {
        let mut accounts: Vec<AccountId> = self.from().into_iter().chain(self.to()).collect();
        accounts.dedup();
        accounts
    }
}

/// Immutable ledger entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub amount: Amount,
    pub issued_at: DateTime<Utc>,
    #[serde(flatten)]
    pub movement: Movement,
}

impl Transaction {
    pub fn kind(&self) -> TransactionKind {
        self.movement.kind()
    }
}

/// Balance of one account as of a point in time. Stored as snapshot rows
/// and as cache entries; never an entity of record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub account_id: AccountId,
    pub balance: Decimal,
    pub as_of: DateTime<Utc>,
}

impl AccountBalance {
    /// Empty-ledger state of a freshly created account.
    pub fn opening(account: &Account) -> Self {
        Self {
            account_id: account.id,
            balance: Decimal::ZERO,
            as_of: account.created_at,
        }
    }
}

/// Account together with its derived balance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AccountView {
    pub account: Account,
    pub balance: AccountBalance,
}
