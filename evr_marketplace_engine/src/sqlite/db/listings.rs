use sqlx::SqliteConnection;

use crate::{db_types::Listing, traits::MarketLedgerError};

pub async fn fetch_listing(id: i64, conn: &mut SqliteConnection) -> Result<Option<Listing>, MarketLedgerError> {
    let listing = sqlx::query_as("SELECT * FROM listings WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(listing)
}

/// Resolve the listing owning the given deposit address, if any. Deposit addresses are unique, so at most one
/// listing matches.
pub async fn listing_for_deposit_address(
    address: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Listing>, MarketLedgerError> {
    let listing =
        sqlx::query_as("SELECT * FROM listings WHERE deposit_address = $1").bind(address).fetch_optional(conn).await?;
    Ok(listing)
}
