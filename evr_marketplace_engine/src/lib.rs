//! EVR Marketplace Engine
//!
//! The core ledger for a peer-to-peer marketplace priced and paid in on-chain assets. An external chain watcher
//! streams transaction-entry writes at this crate; the engine turns that stream into race-free balance
//! accounting and deterministic order lifecycle progression: pending and confirmed balances per owner and asset,
//! payment-derived order statuses, immutable sale records written exactly once per successful payment, and
//! payout settlement that either finalises a sale or reverses it after terminal failure.
//!
//! The library is divided into two main sections:
//! 1. Database management and control ([`mod@sqlite`]). You should never need to access the database directly;
//!    use the public APIs instead. The exception is the data types used in the database, which are defined in
//!    the [`mod@db_types`] module and are public.
//! 2. The engine public API ([`LedgerFlowApi`] for mutation, [`HistoryApi`] for reads). Backends implement the
//!    traits in [`mod@traits`]; [`SqliteDatabase`] is the shipped implementation.
//!
//! The engine also emits events when orders become paid, sales are recorded, payouts settle or sales are
//! reversed. A simple hook system ([`mod@events`]) lets you subscribe and perform custom actions.
pub mod db_types;
mod eme_api;
pub mod events;
pub mod helpers;
#[cfg(feature = "sqlite")]
mod sqlite;
pub mod traits;

pub use eme_api::{history_api::HistoryApi, ledger_flow_api::LedgerFlowApi};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{LedgerReader, MarketLedgerDatabase, MarketLedgerError};
