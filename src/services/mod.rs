//! Service layer for moksha-karma
//!
//! Services encapsulate business logic between callers (CLI, scheduler,
//! request handlers) and repositories. Each service wraps database
//! operations with:
//! - Input validation
//! - Transaction boundaries
//! - Event emission after commit
//! - Best-effort outbound mail
//!
//! ## Architecture
//!
//! ```text
//! Scheduler / CLI
//!     ↓
//! Service Layer (claims, accrual, reminders, projector)
//!     ↓
//! Repository Layer (db/*.rs)
//!     ↓
//! SQLite Database
//! ```

pub mod accrual;
pub mod claims;
pub mod events;
pub mod lives;
pub mod mail;
pub mod projector;
pub mod reminders;
pub mod validator;

// Re-exports
pub use accrual::{AccrualEngine, AccrualReport};
pub use claims::{BurnedClaim, ClaimInput, ClaimOutcome, ClaimService};
pub use events::{EventBus, EventListener, KarmaEvent};
pub use lives::LifeService;
pub use mail::{MailDispatcher, MailMessage};
pub use projector::{BalanceProjector, KarmaBalance};
pub use reminders::{ReminderNotifier, ReminderReport};

use std::sync::Arc;

use crate::config::Config;
use crate::db::KarmaDb;
use crate::error::KarmaError;

/// Service container for dependency injection
///
/// Holds all services with a shared database, event bus and mailer.
pub struct Services {
    pub lives: Arc<LifeService>,
    pub claims: Arc<ClaimService>,
    pub projector: Arc<BalanceProjector>,
    pub accrual: Arc<AccrualEngine>,
    pub reminders: Arc<ReminderNotifier>,
    pub events: Arc<EventBus>,
}

impl Services {
    /// Create all services with shared database
    pub fn new(db: Arc<KarmaDb>, mailer: Arc<dyn MailDispatcher>, config: &Config) -> Self {
        let events = Arc::new(EventBus::new());

        Self {
            lives: Arc::new(LifeService::new(db.clone())),
            claims: Arc::new(ClaimService::new(
                db.clone(),
                events.clone(),
                mailer.clone(),
                config.site_url.clone(),
            )),
            projector: Arc::new(BalanceProjector::new(db.clone())),
            accrual: Arc::new(AccrualEngine::new(db.clone(), events.clone())),
            reminders: Arc::new(ReminderNotifier::new(
                db,
                events.clone(),
                mailer,
                config.reminder_window(),
                config.site_url.clone(),
            )),
            events,
        }
    }
}

/// Run database work on the blocking pool
pub(crate) async fn run_blocking<F, T>(db: &Arc<KarmaDb>, f: F) -> Result<T, KarmaError>
where
    F: FnOnce(&KarmaDb) -> Result<T, KarmaError> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| KarmaError::Internal(format!("Blocking task failed: {}", e)))?
}
