//! Moksha Karma - karma accrual and reconciliation for the Moksha Protocol
//!
//! Lives tag each other as having opened or closed one of seven chakras.
//! Each tag becomes an interaction that accrues one unit of karma per hour
//! for the influencer while the affected life's profile still lists them.
//!
//! ## Architecture
//!
//! - **db**: SQLite record store (lives, ledger, chakra profiles, interactions)
//! - **chakra**: the seven chakras and their label pairs
//! - **services**: claims, accrual, reminders, balance projection, mail
//! - **scheduler**: interval loops driving accrual (hourly) and reminders (weekly)
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/moksha-karma/
//! ├── karma.db               # SQLite database (WAL mode)
//! └── config.toml            # Configuration
//! ```

pub mod chakra;
pub mod config;
pub mod db;
pub mod error;
pub mod scheduler;
pub mod services;

// Re-exports
pub use chakra::{Chakra, Direction};
pub use config::{Config, SmtpConfig};
pub use db::KarmaDb;
pub use error::KarmaError;
pub use scheduler::{spawn_periodic, PeriodicJob};
pub use services::{
    AccrualEngine, AccrualReport, ClaimInput, ClaimOutcome, ClaimService, ReminderNotifier,
    ReminderReport, Services,
};
