//! SQLite record store for lives, ledger entries, chakra profiles and
//! karma interactions
//!
//! ## Tables
//!
//! - `lives` - Accounts (id, display name, unique email, registration flag)
//! - `karma_ledger` - Append-only karma deltas per life
//! - `chakra_profiles` - Per (life, chakra) opened_by / closed_by claim sets
//! - `karma_interactions` - Influence claims with accrual history
//!
//! Repository functions in the submodules take `&mut SqliteConnection` so
//! callers can compose them inside a single transaction.

pub mod diesel_schema;
pub mod interactions;
pub mod ledger;
pub mod lives;
pub mod models;
pub mod profiles;
pub mod schema;

use std::path::Path;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use tracing::{debug, info};

use crate::error::KarmaError;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

const DEFAULT_POOL_SIZE: u32 = 4;

/// Per-connection PRAGMAs applied when the pool hands out a connection
#[derive(Debug)]
struct SqlitePragmas {
    wal: bool,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        let pragmas = if self.wal {
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA busy_timeout=5000; PRAGMA foreign_keys=ON;"
        } else {
            "PRAGMA foreign_keys=ON;"
        };
        conn.batch_execute(pragmas)
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Pooled SQLite database for the karma economy
#[derive(Clone)]
pub struct KarmaDb {
    pool: DbPool,
}

impl KarmaDb {
    /// Open or create the database file
    pub fn open(db_path: &Path) -> Result<Self, KarmaError> {
        info!("Opening SQLite database at {:?}", db_path);

        let manager = ConnectionManager::<SqliteConnection>::new(db_path.to_string_lossy());
        let pool = Pool::builder()
            .max_size(DEFAULT_POOL_SIZE)
            .connection_customizer(Box::new(SqlitePragmas { wal: true }))
            .build(manager)?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    ///
    /// A single long-lived connection, since every SQLite `:memory:`
    /// connection is a separate database.
    pub fn open_in_memory() -> Result<Self, KarmaError> {
        debug!("Opening in-memory SQLite database");

        let manager = ConnectionManager::<SqliteConnection>::new(":memory:");
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connection_customizer(Box::new(SqlitePragmas { wal: false }))
            .build(manager)?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), KarmaError> {
        self.with_conn(schema::init_schema)
    }

    /// Check out a pooled connection
    pub fn conn(&self) -> Result<DbConn, KarmaError> {
        Ok(self.pool.get()?)
    }

    /// Run a closure against a pooled connection, without a transaction
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, KarmaError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, KarmaError>,
    {
        let mut pooled = self.conn()?;
        let conn: &mut SqliteConnection = &mut pooled;
        f(conn)
    }

    /// Run a closure inside one transaction; any error rolls everything back
    ///
    /// Opened with `BEGIN IMMEDIATE`: the write lock is held from the start,
    /// so a writer on another pooled connection waits on `busy_timeout`
    /// instead of invalidating this transaction's read snapshot.
    pub fn transaction<F, T>(&self, f: F) -> Result<T, KarmaError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, KarmaError>,
    {
        let mut pooled = self.conn()?;
        let conn: &mut SqliteConnection = &mut pooled;
        conn.immediate_transaction(f)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, KarmaError> {
        use diesel_schema::{chakra_profiles, karma_interactions, karma_ledger, lives};

        self.with_conn(|conn| {
            let life_count: i64 = lives::table.count().get_result(conn)?;
            let ledger_entries: i64 = karma_ledger::table.count().get_result(conn)?;
            let profile_count: i64 = chakra_profiles::table.count().get_result(conn)?;
            let active_interactions: i64 = karma_interactions::table
                .filter(karma_interactions::status.eq(models::interaction_status::ACTIVE))
                .count()
                .get_result(conn)?;

            Ok(DbStats {
                life_count: life_count as u64,
                ledger_entries: ledger_entries as u64,
                profile_count: profile_count as u64,
                active_interactions: active_interactions as u64,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub life_count: u64,
    pub ledger_entries: u64,
    pub profile_count: u64,
    pub active_interactions: u64,
}

// Re-exports
pub use models::{ChakraProfile, Interaction, LedgerEntry, Life};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory_creates_schema() {
        let db = KarmaDb::open_in_memory().unwrap();
        let stats = db.stats().unwrap();
        assert_eq!(stats.life_count, 0);
        assert_eq!(stats.active_interactions, 0);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = KarmaDb::open_in_memory().unwrap();

        let result: Result<(), KarmaError> = db.transaction(|conn| {
            lives::create_life(conn, "Ada Lovelace", "ada@example.com", true)?;
            Err(KarmaError::Internal("boom".into()))
        });
        assert!(result.is_err());

        assert_eq!(db.stats().unwrap().life_count, 0);
    }

    #[test]
    fn test_transaction_survives_concurrent_writer() {
        use std::sync::mpsc;
        use std::thread;
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let db = KarmaDb::open(&dir.path().join("karma.db")).unwrap();
        db.with_conn(|conn| lives::create_life(conn, "Ada", "ada@example.com", false))
            .unwrap();

        let (read_done, wait_for_read) = mpsc::channel();
        let writer_db = db.clone();
        let writer = thread::spawn(move || {
            wait_for_read.recv().unwrap();
            writer_db.with_conn(|conn| lives::create_life(conn, "Grace", "grace@example.com", false))
        });

        // Read, let the other connection try to write, then write
        let result = db.transaction(|conn| {
            let seen = lives::list_lives(conn, 10, 0)?;
            read_done.send(()).unwrap();
            thread::sleep(Duration::from_millis(200));
            lives::claim_life(conn, &seen[0].id, "Ada Lovelace")?;
            Ok(seen.len())
        });

        assert_eq!(result.unwrap(), 1);
        writer.join().unwrap().unwrap();

        let stats = db.stats().unwrap();
        assert_eq!(stats.life_count, 2);
        let ada = db
            .with_conn(|conn| lives::find_by_email(conn, "ada@example.com"))
            .unwrap()
            .unwrap();
        assert!(ada.is_registered());
    }

    #[test]
    fn test_reopen_file_database_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("karma.db");

        {
            let db = KarmaDb::open(&path).unwrap();
            db.with_conn(|conn| lives::create_life(conn, "Ada", "ada@example.com", true))
                .unwrap();
        }

        let db = KarmaDb::open(&path).unwrap();
        assert_eq!(db.stats().unwrap().life_count, 1);
    }
}
