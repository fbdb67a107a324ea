//! The runner is responsible for setting up a file stream for reading an
//! operation script from CSV, applying each row to the engine, and writing the
//! final account balances to a writer.
//!
mod async_runner;
mod script;

pub use async_runner::run;
