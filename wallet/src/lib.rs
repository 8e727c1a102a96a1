//! Shielded balance wallet: ledger I/O, account discovery, input assembly and the local cache.

pub mod assembler;
pub mod client;
pub mod config;
pub mod db;
pub mod discovery;
pub mod errors;
pub mod ledger;
pub mod models;
pub mod prover;
pub mod snapshot;
pub mod state;

pub use assembler::Operation;
pub use client::ShieldedClient;
pub use config::WalletConfig;
pub use errors::WalletError;
pub use ledger::{InMemoryLedger, LedgerClient};
