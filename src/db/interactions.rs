//! Karma interaction operations
//!
//! Interactions are never deleted; they move from `active` to `superseded`
//! or `resolved`. A partial unique index keeps at most one active row per
//! (influencer, affected, chakra).

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use super::diesel_schema::karma_interactions;
use super::models::{format_timestamp, interaction_status, Interaction, NewInteraction};
use crate::chakra::{Chakra, Direction};
use crate::error::KarmaError;

/// Input for inserting a new active interaction
#[derive(Debug, Clone)]
pub struct CreateInteractionInput<'a> {
    pub influencer_id: &'a str,
    pub affected_id: &'a str,
    pub chakra: Chakra,
    pub direction: Direction,
    /// Units already credited in `direction` (carried forward plus the first)
    pub initial_units: i32,
    pub now: DateTime<Utc>,
}

// ============================================================================
// Read Operations
// ============================================================================

pub fn get_interaction(conn: &mut SqliteConnection, id: &str) -> Result<Option<Interaction>, KarmaError> {
    Ok(karma_interactions::table
        .filter(karma_interactions::id.eq(id))
        .first(conn)
        .optional()?)
}

/// The active interaction for a tuple, if any
pub fn find_active(
    conn: &mut SqliteConnection,
    influencer_id: &str,
    affected_id: &str,
    chakra: Chakra,
) -> Result<Option<Interaction>, KarmaError> {
    Ok(karma_interactions::table
        .filter(karma_interactions::influencer_id.eq(influencer_id))
        .filter(karma_interactions::affected_id.eq(affected_id))
        .filter(karma_interactions::chakra.eq(chakra.as_str()))
        .filter(karma_interactions::status.eq(interaction_status::ACTIVE))
        .first(conn)
        .optional()?)
}

/// All active interactions, oldest first
pub fn list_active(conn: &mut SqliteConnection) -> Result<Vec<Interaction>, KarmaError> {
    Ok(karma_interactions::table
        .filter(karma_interactions::status.eq(interaction_status::ACTIVE))
        .order((karma_interactions::created_at.asc(), karma_interactions::id.asc()))
        .load(conn)?)
}

/// Full history for a tuple, newest first
pub fn history_for_tuple(
    conn: &mut SqliteConnection,
    influencer_id: &str,
    affected_id: &str,
    chakra: Chakra,
) -> Result<Vec<Interaction>, KarmaError> {
    Ok(karma_interactions::table
        .filter(karma_interactions::influencer_id.eq(influencer_id))
        .filter(karma_interactions::affected_id.eq(affected_id))
        .filter(karma_interactions::chakra.eq(chakra.as_str()))
        .order(karma_interactions::created_at.desc())
        .load(conn)?)
}

/// Active negative interactions with accrued negative karma, grouped by
/// influencer
pub fn list_outstanding_negative(conn: &mut SqliteConnection) -> Result<Vec<Interaction>, KarmaError> {
    Ok(karma_interactions::table
        .filter(karma_interactions::status.eq(interaction_status::ACTIVE))
        .filter(karma_interactions::direction.eq(Direction::Negative.as_str()))
        .filter(karma_interactions::negative_accrued.gt(0))
        .order((karma_interactions::influencer_id.asc(), karma_interactions::created_at.asc()))
        .load(conn)?)
}

// ============================================================================
// Write Operations
// ============================================================================

pub fn create_interaction(
    conn: &mut SqliteConnection,
    input: CreateInteractionInput<'_>,
) -> Result<Interaction, KarmaError> {
    let id = Uuid::new_v4().to_string();
    let now = format_timestamp(input.now);
    let (positive_accrued, negative_accrued) = match input.direction {
        Direction::Positive => (input.initial_units, 0),
        Direction::Negative => (0, input.initial_units),
    };

    let new_interaction = NewInteraction {
        id: &id,
        influencer_id: input.influencer_id,
        affected_id: input.affected_id,
        chakra: input.chakra.as_str(),
        direction: input.direction.as_str(),
        original_direction: input.direction.as_str(),
        positive_accrued,
        negative_accrued,
        status: interaction_status::ACTIVE,
        created_at: &now,
        last_accrued_at: &now,
    };

    diesel::insert_into(karma_interactions::table)
        .values(&new_interaction)
        .execute(conn)?;

    get_interaction(conn, &id)?
        .ok_or_else(|| KarmaError::Internal("Failed to retrieve created interaction".into()))
}

/// Retire an interaction replaced by a newer same-direction claim
pub fn mark_superseded(conn: &mut SqliteConnection, id: &str) -> Result<(), KarmaError> {
    diesel::update(karma_interactions::table.filter(karma_interactions::id.eq(id)))
        .set(karma_interactions::status.eq(interaction_status::SUPERSEDED))
        .execute(conn)?;
    Ok(())
}

/// Resolve an interaction: zero both counters and stamp `at`
pub fn mark_resolved(conn: &mut SqliteConnection, id: &str, at: DateTime<Utc>) -> Result<(), KarmaError> {
    diesel::update(karma_interactions::table.filter(karma_interactions::id.eq(id)))
        .set((
            karma_interactions::status.eq(interaction_status::RESOLVED),
            karma_interactions::positive_accrued.eq(0),
            karma_interactions::negative_accrued.eq(0),
            karma_interactions::last_accrued_at.eq(format_timestamp(at)),
        ))
        .execute(conn)?;
    Ok(())
}

/// Add `units` to the counter for `direction` and move the accrual mark
pub fn add_accrued(
    conn: &mut SqliteConnection,
    id: &str,
    direction: Direction,
    units: i32,
    accrued_through: DateTime<Utc>,
) -> Result<(), KarmaError> {
    let target = karma_interactions::table.filter(karma_interactions::id.eq(id));
    let accrued_through = format_timestamp(accrued_through);

    match direction {
        Direction::Positive => diesel::update(target)
            .set((
                karma_interactions::positive_accrued.eq(karma_interactions::positive_accrued + units),
                karma_interactions::last_accrued_at.eq(accrued_through),
            ))
            .execute(conn)?,
        Direction::Negative => diesel::update(target)
            .set((
                karma_interactions::negative_accrued.eq(karma_interactions::negative_accrued + units),
                karma_interactions::last_accrued_at.eq(accrued_through),
            ))
            .execute(conn)?,
    };
    Ok(())
}

pub fn stamp_reminder(conn: &mut SqliteConnection, id: &str, at: DateTime<Utc>) -> Result<(), KarmaError> {
    diesel::update(karma_interactions::table.filter(karma_interactions::id.eq(id)))
        .set(karma_interactions::last_reminded_at.eq(format_timestamp(at)))
        .execute(conn)?;
    Ok(())
}
