//! Chakra-state profile operations
//!
//! Each (life, chakra) pair has at most one profile holding the lives that
//! claim to have opened it and the lives that claim to have closed it. A
//! claimant is kept in at most one of the two sets.

use std::collections::BTreeSet;

use diesel::prelude::*;
use uuid::Uuid;

use super::diesel_schema::chakra_profiles;
use super::models::{current_timestamp, ChakraProfile, NewChakraProfile};
use crate::chakra::{Chakra, Direction};
use crate::error::KarmaError;

// ============================================================================
// Read Operations
// ============================================================================

pub fn get_profile(
    conn: &mut SqliteConnection,
    life_id: &str,
    chakra: Chakra,
) -> Result<Option<ChakraProfile>, KarmaError> {
    Ok(chakra_profiles::table
        .filter(chakra_profiles::life_id.eq(life_id))
        .filter(chakra_profiles::chakra.eq(chakra.as_str()))
        .first(conn)
        .optional()?)
}

pub fn profiles_for_life(
    conn: &mut SqliteConnection,
    life_id: &str,
) -> Result<Vec<ChakraProfile>, KarmaError> {
    Ok(chakra_profiles::table
        .filter(chakra_profiles::life_id.eq(life_id))
        .order(chakra_profiles::chakra.asc())
        .load(conn)?)
}

/// Profiles of other lives in which `claimant_id` sits in the set for
/// `direction` (opened_by for positive, closed_by for negative)
pub fn profiles_claimed_by(
    conn: &mut SqliteConnection,
    claimant_id: &str,
    direction: Direction,
) -> Result<Vec<ChakraProfile>, KarmaError> {
    // Ids are stored as quoted JSON strings; LIKE narrows, the parse confirms
    let pattern = format!("%\"{}\"%", claimant_id);
    let candidates: Vec<ChakraProfile> = match direction {
        Direction::Positive => chakra_profiles::table
            .filter(chakra_profiles::opened_by_json.like(&pattern))
            .load(conn)?,
        Direction::Negative => chakra_profiles::table
            .filter(chakra_profiles::closed_by_json.like(&pattern))
            .load(conn)?,
    };

    let mut matched = Vec::with_capacity(candidates.len());
    for profile in candidates {
        if profile.claimants(direction)?.contains(claimant_id) {
            matched.push(profile);
        }
    }
    Ok(matched)
}

// ============================================================================
// Write Operations
// ============================================================================

/// Get the profile, creating an empty one on first use
pub fn get_or_create_profile(
    conn: &mut SqliteConnection,
    life_id: &str,
    chakra: Chakra,
) -> Result<ChakraProfile, KarmaError> {
    if let Some(profile) = get_profile(conn, life_id, chakra)? {
        return Ok(profile);
    }

    let id = Uuid::new_v4().to_string();
    let now = current_timestamp();
    let new_profile = NewChakraProfile {
        id: &id,
        life_id,
        chakra: chakra.as_str(),
        opened_by_json: "[]",
        closed_by_json: "[]",
        updated_at: &now,
    };

    diesel::insert_into(chakra_profiles::table)
        .values(&new_profile)
        .execute(conn)?;

    get_profile(conn, life_id, chakra)?
        .ok_or_else(|| KarmaError::Internal("Failed to retrieve created profile".into()))
}

/// Record that `claimant_id` drove this chakra in `direction`
///
/// Adds the claimant to the matching set and removes it from the opposite
/// one.
pub fn record_claimant(
    conn: &mut SqliteConnection,
    life_id: &str,
    chakra: Chakra,
    claimant_id: &str,
    direction: Direction,
) -> Result<ChakraProfile, KarmaError> {
    let profile = get_or_create_profile(conn, life_id, chakra)?;
    let mut opened = profile.opened_by()?;
    let mut closed = profile.closed_by()?;

    match direction {
        Direction::Positive => {
            opened.insert(claimant_id.to_string());
            closed.remove(claimant_id);
        }
        Direction::Negative => {
            closed.insert(claimant_id.to_string());
            opened.remove(claimant_id);
        }
    }

    write_sets(conn, &profile.id, &opened, &closed)
}

/// Remove `claimant_id` from both sets
///
/// Returns None, writing nothing, when there is no profile or the claimant
/// is in neither set.
pub fn withdraw_claimant(
    conn: &mut SqliteConnection,
    life_id: &str,
    chakra: Chakra,
    claimant_id: &str,
) -> Result<Option<ChakraProfile>, KarmaError> {
    let Some(profile) = get_profile(conn, life_id, chakra)? else {
        return Ok(None);
    };

    let mut opened = profile.opened_by()?;
    let mut closed = profile.closed_by()?;
    let removed_opened = opened.remove(claimant_id);
    let removed_closed = closed.remove(claimant_id);
    if !removed_opened && !removed_closed {
        return Ok(None);
    }

    write_sets(conn, &profile.id, &opened, &closed).map(Some)
}

fn write_sets(
    conn: &mut SqliteConnection,
    profile_id: &str,
    opened: &BTreeSet<String>,
    closed: &BTreeSet<String>,
) -> Result<ChakraProfile, KarmaError> {
    diesel::update(chakra_profiles::table.filter(chakra_profiles::id.eq(profile_id)))
        .set((
            chakra_profiles::opened_by_json.eq(serde_json::to_string(opened)?),
            chakra_profiles::closed_by_json.eq(serde_json::to_string(closed)?),
            chakra_profiles::updated_at.eq(current_timestamp()),
        ))
        .execute(conn)?;

    chakra_profiles::table
        .filter(chakra_profiles::id.eq(profile_id))
        .first(conn)
        .optional()?
        .ok_or_else(|| KarmaError::Internal("Failed to retrieve updated profile".into()))
}
