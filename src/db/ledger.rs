//! Karma ledger operations
//!
//! The ledger is append-only: rows are inserted and summed, never updated.

use diesel::dsl::sum;
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use super::diesel_schema::karma_ledger;
use super::models::{current_timestamp, LedgerEntry, NewLedgerEntry};
use crate::chakra::Direction;
use crate::error::KarmaError;

/// Input for appending a ledger entry
#[derive(Debug, Clone, Default)]
pub struct AppendLedgerInput {
    pub life_id: String,
    pub affected_id: Option<String>,
    pub interaction_id: Option<String>,
    pub positive_delta: i32,
    pub negative_delta: i32,
    pub note: Option<String>,
    /// Defaults to now
    pub recorded_at: Option<String>,
}

impl AppendLedgerInput {
    /// Entry carrying `units` in the delta column matching `direction`
    pub fn for_direction(life_id: &str, direction: Direction, units: i32) -> Self {
        let (positive_delta, negative_delta) = match direction {
            Direction::Positive => (units, 0),
            Direction::Negative => (0, units),
        };
        Self {
            life_id: life_id.to_string(),
            positive_delta,
            negative_delta,
            ..Default::default()
        }
    }

    /// Link the entry to the life whose claim produced it
    pub fn with_affected(mut self, affected_id: &str) -> Self {
        self.affected_id = Some(affected_id.to_string());
        self
    }

    pub fn with_interaction(mut self, interaction_id: &str) -> Self {
        self.interaction_id = Some(interaction_id.to_string());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Summed ledger totals for one life
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LedgerTotals {
    pub positive: i64,
    pub negative: i64,
}

impl LedgerTotals {
    pub fn net(&self) -> i64 {
        self.positive - self.negative
    }
}

pub fn append_entry(
    conn: &mut SqliteConnection,
    input: AppendLedgerInput,
) -> Result<LedgerEntry, KarmaError> {
    let id = Uuid::new_v4().to_string();
    let recorded_at = input.recorded_at.unwrap_or_else(current_timestamp);

    let new_entry = NewLedgerEntry {
        id: &id,
        life_id: &input.life_id,
        affected_id: input.affected_id.as_deref(),
        interaction_id: input.interaction_id.as_deref(),
        positive_delta: input.positive_delta,
        negative_delta: input.negative_delta,
        note: input.note.as_deref(),
        recorded_at: &recorded_at,
    };

    diesel::insert_into(karma_ledger::table)
        .values(&new_entry)
        .execute(conn)?;

    karma_ledger::table
        .filter(karma_ledger::id.eq(&id))
        .first(conn)
        .optional()?
        .ok_or_else(|| KarmaError::Internal("Failed to retrieve ledger entry".into()))
}

/// Entries for a life, newest first
pub fn entries_for_life(
    conn: &mut SqliteConnection,
    life_id: &str,
    limit: i64,
) -> Result<Vec<LedgerEntry>, KarmaError> {
    Ok(karma_ledger::table
        .filter(karma_ledger::life_id.eq(life_id))
        .order(karma_ledger::recorded_at.desc())
        .limit(limit)
        .load(conn)?)
}

/// Sum all deltas for a life
pub fn totals_for_life(conn: &mut SqliteConnection, life_id: &str) -> Result<LedgerTotals, KarmaError> {
    let (positive, negative): (Option<i64>, Option<i64>) = karma_ledger::table
        .filter(karma_ledger::life_id.eq(life_id))
        .select((sum(karma_ledger::positive_delta), sum(karma_ledger::negative_delta)))
        .first(conn)?;

    Ok(LedgerTotals {
        positive: positive.unwrap_or(0),
        negative: negative.unwrap_or(0),
    })
}
