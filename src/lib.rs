pub mod balance;
mod clock;
pub mod csv_utils;
pub mod dto;
mod engine;
mod error;
pub mod identity;
mod locks;
pub mod model;
mod runner;
mod settings;
mod snapshot;
pub mod stores;

pub use balance::{BalanceDeriver, DeriveOptions};
pub use engine::{Engine, DEFAULT_PAGE_LIMIT, MAX_NAME_LEN, MAX_PAGE_LIMIT};
pub use error::{Error, Result};
pub use identity::{IdentityResolver, SessionTable};
pub use model::{
    Account, AccountBalance, AccountId, AccountStatus, AccountView, Amount, Movement, Transaction,
    TransactionId, TransactionKind, UserId,
};
pub use runner::run;
pub use settings::Settings;
pub use snapshot::{SnapshotRun, SnapshotUpdater};
