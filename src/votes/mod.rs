use async_trait::async_trait;
use chrono::Utc;
use log::{debug, warn};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::config::ConfigError;
use crate::models::iso_timestamp;
use crate::sheets::{CellStore, SheetsError};

/// Shown whenever the stored count is missing or unreadable.
pub const FALLBACK_COUNT: u64 = 1248;
pub const COUNT_CELL: &str = "A2";
pub const COUNTER_RANGE: &str = "A2:B2";

#[derive(Debug, Error)]
pub enum VoteError {
    #[error(transparent)]
    Sheets(#[from] SheetsError),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Vote count {0} cannot be incremented further")]
    CounterOverflow(u64),
}

#[async_trait]
pub trait VoteStore: Send + Sync {
    async fn get_count(&self) -> Result<u64, VoteError>;

    /// Records one vote and returns the count after it.
    async fn increment_and_store(&self) -> Result<u64, VoteError>;
}

/// Interprets the raw count cell. Anything that is not a non-negative
/// integer is treated as absent.
pub fn parse_count(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok()
}

/// Counter kept in two adjacent spreadsheet cells: count in `A2`, last
/// update time in `B2`.
///
/// Increments are read-then-write with no locking. Two overlapping
/// increments can both read `n` and both write `n + 1`, so one vote is
/// lost. Use [`crate::db::Database`] when that matters.
pub struct SheetVoteStore {
    cells: Arc<dyn CellStore>,
}

impl SheetVoteStore {
    pub fn new(cells: Arc<dyn CellStore>) -> Self {
        Self { cells }
    }
}

#[async_trait]
impl VoteStore for SheetVoteStore {
    async fn get_count(&self) -> Result<u64, VoteError> {
        let rows = self.cells.read_range(COUNT_CELL).await?;
        let raw = rows.first().and_then(|row| row.first());

        match raw.and_then(|value| parse_count(value)) {
            Some(count) => Ok(count),
            None => {
                if let Some(value) = raw {
                    warn!("Unparsable vote count {:?}, using {}", value, FALLBACK_COUNT);
                } else {
                    debug!("Vote count cell empty, using {}", FALLBACK_COUNT);
                }
                Ok(FALLBACK_COUNT)
            }
        }
    }

    async fn increment_and_store(&self) -> Result<u64, VoteError> {
        let current = self.get_count().await?;
        let new_count = current
            .checked_add(1)
            .ok_or(VoteError::CounterOverflow(current))?;
        let timestamp = iso_timestamp(Utc::now());

        self.cells
            .write_range(COUNTER_RANGE, vec![vec![json!(new_count), json!(timestamp)]])
            .await?;

        Ok(new_count)
    }
}
