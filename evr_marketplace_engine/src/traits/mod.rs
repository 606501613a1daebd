mod data_objects;
mod ledger_database;

pub use data_objects::{BalanceOwner, EntryOutcome, SettlementAction, StatusChange};
pub use ledger_database::{LedgerReader, MarketLedgerDatabase, MarketLedgerError};
