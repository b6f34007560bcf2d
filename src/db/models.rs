//! Diesel model definitions for database tables
//!
//! - Queryable structs: for SELECT queries (reading data)
//! - Insertable structs: for INSERT queries (writing data)
//!
//! Enumerated columns (chakra, direction, status) are stored as TEXT and
//! parsed back through the accessors on each row type.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::diesel_schema::*;
use crate::chakra::{Chakra, Direction};
use crate::error::KarmaError;

// ============================================================================
// Timestamp Helpers (SQLite stores timestamps as TEXT)
// ============================================================================

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Format a UTC instant for a SQLite TEXT column
///
/// Fixed-width, so lexicographic order matches chronological order.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a timestamp written by [`format_timestamp`]
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, KarmaError> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| KarmaError::Internal(format!("Bad timestamp '{}': {}", value, e)))
}

/// Get current UTC timestamp as a SQLite TEXT value
pub fn current_timestamp() -> String {
    format_timestamp(Utc::now())
}

// ============================================================================
// Life Models
// ============================================================================

/// Life (account) row from SELECT query
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = lives)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Life {
    pub id: String,
    pub display_name: String,
    pub email: String,
    pub billing_customer_id: Option<String>,
    pub registered: i32,
    pub created_at: String,
    pub updated_at: String,
}

impl Life {
    pub fn is_registered(&self) -> bool {
        self.registered != 0
    }
}

/// New life for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = lives)]
pub struct NewLife<'a> {
    pub id: &'a str,
    pub display_name: &'a str,
    pub email: &'a str,
    pub billing_customer_id: Option<&'a str>,
    pub registered: i32,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

// ============================================================================
// Ledger Models
// ============================================================================

/// Karma ledger entry from SELECT query
///
/// There is no stored net column; see [`LedgerEntry::net`].
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = karma_ledger)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct LedgerEntry {
    pub id: String,
    pub life_id: String,
    /// Life whose claim the entry relates to
    pub affected_id: Option<String>,
    pub interaction_id: Option<String>,
    pub positive_delta: i32,
    pub negative_delta: i32,
    pub note: Option<String>,
    pub recorded_at: String,
}

impl LedgerEntry {
    pub fn net(&self) -> i64 {
        self.positive_delta as i64 - self.negative_delta as i64
    }
}

/// New ledger entry for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = karma_ledger)]
pub struct NewLedgerEntry<'a> {
    pub id: &'a str,
    pub life_id: &'a str,
    pub affected_id: Option<&'a str>,
    pub interaction_id: Option<&'a str>,
    pub positive_delta: i32,
    pub negative_delta: i32,
    pub note: Option<&'a str>,
    pub recorded_at: &'a str,
}

// ============================================================================
// Chakra Profile Models
// ============================================================================

/// Chakra-state profile row from SELECT query
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = chakra_profiles)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ChakraProfile {
    pub id: String,
    pub life_id: String,
    pub chakra: String,
    pub opened_by_json: String,
    pub closed_by_json: String,
    pub updated_at: String,
}

impl ChakraProfile {
    pub fn chakra(&self) -> Result<Chakra, KarmaError> {
        self.chakra.parse()
    }

    /// Lives that claim to have opened this chakra
    pub fn opened_by(&self) -> Result<BTreeSet<String>, KarmaError> {
        Ok(serde_json::from_str(&self.opened_by_json)?)
    }

    /// Lives that claim to have closed this chakra
    pub fn closed_by(&self) -> Result<BTreeSet<String>, KarmaError> {
        Ok(serde_json::from_str(&self.closed_by_json)?)
    }

    /// Claim set matching a direction (opened for positive, closed for negative)
    pub fn claimants(&self, direction: Direction) -> Result<BTreeSet<String>, KarmaError> {
        match direction {
            Direction::Positive => self.opened_by(),
            Direction::Negative => self.closed_by(),
        }
    }
}

/// New chakra profile for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = chakra_profiles)]
pub struct NewChakraProfile<'a> {
    pub id: &'a str,
    pub life_id: &'a str,
    pub chakra: &'a str,
    pub opened_by_json: &'a str,
    pub closed_by_json: &'a str,
    pub updated_at: &'a str,
}

// ============================================================================
// Interaction Models
// ============================================================================

/// Karma interaction row from SELECT query
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = karma_interactions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Interaction {
    pub id: String,
    pub influencer_id: String,
    pub affected_id: String,
    pub chakra: String,
    pub direction: String,
    pub original_direction: String,
    pub positive_accrued: i32,
    pub negative_accrued: i32,
    pub status: String,
    pub created_at: String,
    pub last_accrued_at: String,
    pub last_reminded_at: Option<String>,
}

impl Interaction {
    pub fn chakra(&self) -> Result<Chakra, KarmaError> {
        self.chakra.parse()
    }

    pub fn direction(&self) -> Result<Direction, KarmaError> {
        self.direction.parse()
    }

    pub fn is_active(&self) -> bool {
        self.status == interaction_status::ACTIVE
    }

    /// Units accrued in the given direction
    pub fn accrued(&self, direction: Direction) -> i32 {
        match direction {
            Direction::Positive => self.positive_accrued,
            Direction::Negative => self.negative_accrued,
        }
    }

    pub fn last_accrued(&self) -> Result<DateTime<Utc>, KarmaError> {
        parse_timestamp(&self.last_accrued_at)
    }

    pub fn last_reminded(&self) -> Result<Option<DateTime<Utc>>, KarmaError> {
        self.last_reminded_at.as_deref().map(parse_timestamp).transpose()
    }
}

/// New interaction for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = karma_interactions)]
pub struct NewInteraction<'a> {
    pub id: &'a str,
    pub influencer_id: &'a str,
    pub affected_id: &'a str,
    pub chakra: &'a str,
    pub direction: &'a str,
    pub original_direction: &'a str,
    pub positive_accrued: i32,
    pub negative_accrued: i32,
    pub status: &'a str,
    pub created_at: &'a str,
    pub last_accrued_at: &'a str,
}

// ============================================================================
// Constants
// ============================================================================

/// Interaction lifecycle states
pub mod interaction_status {
    pub const ACTIVE: &str = "active";
    pub const SUPERSEDED: &str = "superseded";
    pub const RESOLVED: &str = "resolved";
}
