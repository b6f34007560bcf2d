//! Database schema definitions

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use tracing::info;

use super::diesel_schema::schema_version;
use crate::error::KarmaError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &mut SqliteConnection) -> Result<(), KarmaError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        migrate_schema(conn, current_version)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &mut SqliteConnection) -> Result<i32, KarmaError> {
    conn.batch_execute("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL PRIMARY KEY)")?;

    let version = schema_version::table
        .select(schema_version::version)
        .first::<i32>(conn)
        .optional()?;

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &mut SqliteConnection, version: i32) -> Result<(), KarmaError> {
    diesel::delete(schema_version::table).execute(conn)?;
    diesel::insert_into(schema_version::table)
        .values(schema_version::version.eq(version))
        .execute(conn)?;
    Ok(())
}

fn create_tables(conn: &mut SqliteConnection) -> Result<(), KarmaError> {
    conn.transaction(|conn| {
        conn.batch_execute(LIVES_SCHEMA)?;
        conn.batch_execute(PROFILES_SCHEMA)?;
        conn.batch_execute(INTERACTIONS_SCHEMA)?;
        conn.batch_execute(LEDGER_SCHEMA)?;
        Ok(())
    })
}

fn migrate_schema(conn: &mut SqliteConnection, from_version: i32) -> Result<(), KarmaError> {
    info!(from_version, "No migration steps registered");
    set_schema_version(conn, SCHEMA_VERSION)
}

const LIVES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS lives (
    id TEXT PRIMARY KEY NOT NULL,
    display_name TEXT NOT NULL,
    email TEXT NOT NULL,
    billing_customer_id TEXT,
    registered INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_lives_email ON lives(email);
"#;

const LEDGER_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS karma_ledger (
    id TEXT PRIMARY KEY NOT NULL,
    life_id TEXT NOT NULL REFERENCES lives(id),
    affected_id TEXT REFERENCES lives(id),
    interaction_id TEXT REFERENCES karma_interactions(id),
    positive_delta INTEGER NOT NULL DEFAULT 0,
    negative_delta INTEGER NOT NULL DEFAULT 0,
    note TEXT,
    recorded_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_ledger_life ON karma_ledger(life_id, recorded_at);
"#;

const PROFILES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS chakra_profiles (
    id TEXT PRIMARY KEY NOT NULL,
    life_id TEXT NOT NULL REFERENCES lives(id),
    chakra TEXT NOT NULL,
    opened_by_json TEXT NOT NULL DEFAULT '[]',
    closed_by_json TEXT NOT NULL DEFAULT '[]',
    updated_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_profiles_life_chakra ON chakra_profiles(life_id, chakra);
"#;

const INTERACTIONS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS karma_interactions (
    id TEXT PRIMARY KEY NOT NULL,
    influencer_id TEXT NOT NULL REFERENCES lives(id),
    affected_id TEXT NOT NULL REFERENCES lives(id),
    chakra TEXT NOT NULL,
    direction TEXT NOT NULL CHECK (direction IN ('positive', 'negative')),
    original_direction TEXT NOT NULL CHECK (original_direction IN ('positive', 'negative')),
    positive_accrued INTEGER NOT NULL DEFAULT 0,
    negative_accrued INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'superseded', 'resolved')),
    created_at TEXT NOT NULL,
    last_accrued_at TEXT NOT NULL,
    last_reminded_at TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS unique_active_karma_interaction
    ON karma_interactions(influencer_id, affected_id, chakra)
    WHERE status = 'active';
CREATE INDEX IF NOT EXISTS idx_interactions_status ON karma_interactions(status);
CREATE INDEX IF NOT EXISTS idx_interactions_influencer ON karma_interactions(influencer_id, status);
"#;
