//! Life (account) CRUD operations using Diesel

use diesel::prelude::*;
use uuid::Uuid;

use super::diesel_schema::lives;
use super::models::{current_timestamp, Life, NewLife};
use crate::error::KarmaError;

/// Display name given to lives created on first mention as an influencer
pub const UNKNOWN_DISPLAY_NAME: &str = "Unknown";

// ============================================================================
// Read Operations
// ============================================================================

pub fn get_life(conn: &mut SqliteConnection, id: &str) -> Result<Option<Life>, KarmaError> {
    Ok(lives::table
        .filter(lives::id.eq(id))
        .first(conn)
        .optional()?)
}

pub fn find_by_email(conn: &mut SqliteConnection, email: &str) -> Result<Option<Life>, KarmaError> {
    Ok(lives::table
        .filter(lives::email.eq(normalize_email(email)))
        .first(conn)
        .optional()?)
}

/// List lives, oldest first
pub fn list_lives(
    conn: &mut SqliteConnection,
    limit: i64,
    offset: i64,
) -> Result<Vec<Life>, KarmaError> {
    Ok(lives::table
        .order(lives::created_at.asc())
        .limit(limit)
        .offset(offset)
        .load(conn)?)
}

// ============================================================================
// Write Operations
// ============================================================================

/// Create a life; fails on duplicate email through the unique index
pub fn create_life(
    conn: &mut SqliteConnection,
    display_name: &str,
    email: &str,
    registered: bool,
) -> Result<Life, KarmaError> {
    let id = Uuid::new_v4().to_string();
    let email = normalize_email(email);
    let now = current_timestamp();

    let new_life = NewLife {
        id: &id,
        display_name,
        email: &email,
        billing_customer_id: None,
        registered: if registered { 1 } else { 0 },
        created_at: &now,
        updated_at: &now,
    };

    diesel::insert_into(lives::table)
        .values(&new_life)
        .execute(conn)?;

    get_life(conn, &id)?
        .ok_or_else(|| KarmaError::Internal("Failed to retrieve created life".into()))
}

/// Find a life by email, creating an unregistered placeholder if absent
pub fn find_or_create_by_email(conn: &mut SqliteConnection, email: &str) -> Result<Life, KarmaError> {
    match find_by_email(conn, email)? {
        Some(life) => Ok(life),
        None => create_life(conn, UNKNOWN_DISPLAY_NAME, email, false),
    }
}

/// Mark a life as registered under the given display name
pub fn claim_life(
    conn: &mut SqliteConnection,
    id: &str,
    display_name: &str,
) -> Result<Life, KarmaError> {
    let updated = diesel::update(lives::table.filter(lives::id.eq(id)))
        .set((
            lives::display_name.eq(display_name),
            lives::registered.eq(1),
            lives::updated_at.eq(current_timestamp()),
        ))
        .execute(conn)?;

    if updated == 0 {
        return Err(KarmaError::NotFound(format!("Life {}", id)));
    }

    get_life(conn, id)?
        .ok_or_else(|| KarmaError::Internal("Failed to retrieve claimed life".into()))
}

pub fn set_billing_customer(
    conn: &mut SqliteConnection,
    id: &str,
    customer_id: &str,
) -> Result<(), KarmaError> {
    diesel::update(lives::table.filter(lives::id.eq(id)))
        .set((
            lives::billing_customer_id.eq(customer_id),
            lives::updated_at.eq(current_timestamp()),
        ))
        .execute(conn)?;
    Ok(())
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}
