//! Accrual engine
//!
//! Walks every active interaction once per run. Whole hours elapsed since
//! the last accrual are credited in one step while the affected profile
//! still supports the claim; otherwise the interaction is resolved. The
//! whole scan is a single transaction, so a store error leaves nothing
//! half-applied and the next run repeats the batch.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use diesel::SqliteConnection;
use serde::Serialize;
use tracing::{debug, info};

use crate::db::interactions;
use crate::db::ledger::{self, AppendLedgerInput};
use crate::db::models::format_timestamp;
use crate::db::KarmaDb;
use crate::error::KarmaError;

use super::events::{EventBus, KarmaEvent};
use super::{run_blocking, validator};

/// Outcome of one accrual run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AccrualReport {
    /// Active interactions examined
    pub scanned: usize,
    /// Less than one hour since the last accrual
    pub skipped: usize,
    pub accrued: usize,
    pub resolved: usize,
    /// Units credited across all interactions
    pub units: i64,
}

/// Periodic accrual job
pub struct AccrualEngine {
    db: Arc<KarmaDb>,
    events: Arc<EventBus>,
}

impl AccrualEngine {
    pub fn new(db: Arc<KarmaDb>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    pub async fn run(&self) -> Result<AccrualReport, KarmaError> {
        self.run_at(Utc::now()).await
    }

    /// Run as of `now`
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<AccrualReport, KarmaError> {
        let (report, events) = run_blocking(&self.db, move |db| {
            db.transaction(|conn| accrue_all(conn, now))
        })
        .await?;

        self.events.emit_all(events);

        info!(
            scanned = report.scanned,
            skipped = report.skipped,
            accrued = report.accrued,
            resolved = report.resolved,
            units = report.units,
            "Accrual run complete"
        );
        Ok(report)
    }
}

/// Accrue every active interaction as of `now`
///
/// Callers own the transaction.
pub fn accrue_all(
    conn: &mut SqliteConnection,
    now: DateTime<Utc>,
) -> Result<(AccrualReport, Vec<KarmaEvent>), KarmaError> {
    let mut report = AccrualReport::default();
    let mut events = Vec::new();
    let recorded_at = format_timestamp(now);

    for interaction in interactions::list_active(conn)? {
        report.scanned += 1;

        let last = interaction.last_accrued()?;
        let hours = (now - last).num_hours();
        if hours < 1 {
            report.skipped += 1;
            continue;
        }

        if !validator::validate_interaction(conn, &interaction)? {
            interactions::mark_resolved(conn, &interaction.id, now)?;
            debug!(id = %interaction.id, "Claim no longer supported, resolved");
            report.resolved += 1;
            events.push(KarmaEvent::InteractionResolved {
                id: interaction.id,
                influencer_id: interaction.influencer_id,
            });
            continue;
        }

        let units = i32::try_from(hours)
            .map_err(|_| KarmaError::Internal(format!("{} hours overflows accrual units", hours)))?;
        let direction = interaction.direction()?;

        interactions::add_accrued(conn, &interaction.id, direction, units, last + Duration::hours(hours))?;
        ledger::append_entry(
            conn,
            AppendLedgerInput {
                recorded_at: Some(recorded_at.clone()),
                ..AppendLedgerInput::for_direction(&interaction.influencer_id, direction, units)
                    .with_affected(&interaction.affected_id)
                    .with_interaction(&interaction.id)
                    .with_note("accrual")
            },
        )?;

        report.accrued += 1;
        report.units += i64::from(units);
        events.push(KarmaEvent::InteractionAccrued {
            id: interaction.id,
            influencer_id: interaction.influencer_id,
            direction,
            units,
        });
    }

    Ok((report, events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chakra::{Chakra, Direction};
    use crate::db::interactions::CreateInteractionInput;
    use crate::db::{lives, profiles, Interaction};
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 2, 10, 0, 0).unwrap()
    }

    /// Ada says Grace closed her Root chakra
    fn seed(db: &KarmaDb) -> Interaction {
        db.with_conn(|conn| {
            let ada = lives::create_life(conn, "Ada", "ada@example.com", true)?;
            let grace = lives::create_life(conn, "Grace", "grace@example.com", true)?;
            profiles::record_claimant(conn, &ada.id, Chakra::Muladhara, &grace.id, Direction::Negative)?;
            interactions::create_interaction(conn, CreateInteractionInput {
                influencer_id: &grace.id,
                affected_id: &ada.id,
                chakra: Chakra::Muladhara,
                direction: Direction::Negative,
                initial_units: 1,
                now: start(),
            })
        })
        .unwrap()
    }

    fn reload(db: &KarmaDb, id: &str) -> Interaction {
        db.with_conn(|conn| interactions::get_interaction(conn, id))
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_partial_hours_round_down() {
        let db = Arc::new(KarmaDb::open_in_memory().unwrap());
        let engine = AccrualEngine::new(db.clone(), Arc::new(EventBus::new()));
        let seeded = seed(&db);

        let report = engine
            .run_at(start() + Duration::minutes(150))
            .await
            .unwrap();
        assert_eq!(report.units, 2);

        let row = reload(&db, &seeded.id);
        assert_eq!(row.negative_accrued, 3);
        // Leftover 30 minutes count toward the next unit
        assert_eq!(row.last_accrued().unwrap(), start() + Duration::hours(2));

        let report = engine.run_at(start() + Duration::minutes(185)).await.unwrap();
        assert_eq!(report.accrued, 1);
        assert_eq!(reload(&db, &seeded.id).negative_accrued, 4);
    }

    #[tokio::test]
    async fn test_clock_behind_last_accrual_skips() {
        let db = Arc::new(KarmaDb::open_in_memory().unwrap());
        let engine = AccrualEngine::new(db.clone(), Arc::new(EventBus::new()));
        let seeded = seed(&db);

        let report = engine.run_at(start() - Duration::hours(5)).await.unwrap();
        assert_eq!(report, AccrualReport { scanned: 1, skipped: 1, ..Default::default() });
        assert_eq!(reload(&db, &seeded.id).negative_accrued, 1);
    }

    #[tokio::test]
    async fn test_events_emitted_after_commit() {
        let db = Arc::new(KarmaDb::open_in_memory().unwrap());
        let bus = Arc::new(EventBus::new());
        let mut receiver = bus.subscribe();
        let engine = AccrualEngine::new(db.clone(), bus);
        let seeded = seed(&db);

        engine.run_at(start() + Duration::hours(1)).await.unwrap();

        match receiver.try_recv().unwrap() {
            KarmaEvent::InteractionAccrued { id, units, direction, .. } => {
                assert_eq!(id, seeded.id);
                assert_eq!(units, 1);
                assert_eq!(direction, Direction::Negative);
            }
            other => panic!("Wrong event type: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failure_mid_scan_rolls_back_whole_run() {
        use crate::db::diesel_schema::karma_interactions;
        use diesel::prelude::*;

        let db = Arc::new(KarmaDb::open_in_memory().unwrap());
        let bus = Arc::new(EventBus::new());
        let mut receiver = bus.subscribe();
        let engine = AccrualEngine::new(db.clone(), bus);
        let first = seed(&db);

        // A later row the scan reaches after `first`, with an unreadable chakra
        db.with_conn(|conn| {
            let linus = lives::create_life(conn, "Linus", "linus@example.com", true)?;
            profiles::record_claimant(conn, &first.affected_id, Chakra::Anahata, &linus.id, Direction::Negative)?;
            let second = interactions::create_interaction(conn, CreateInteractionInput {
                influencer_id: &linus.id,
                affected_id: &first.affected_id,
                chakra: Chakra::Anahata,
                direction: Direction::Negative,
                initial_units: 1,
                now: start() + Duration::minutes(1),
            })?;
            diesel::update(karma_interactions::table.filter(karma_interactions::id.eq(&second.id)))
                .set(karma_interactions::chakra.eq("Bogus"))
                .execute(conn)?;
            Ok(())
        })
        .unwrap();

        let err = engine.run_at(start() + Duration::hours(3)).await.unwrap_err();
        assert!(matches!(err, KarmaError::InvalidInput(_)));

        let row = reload(&db, &first.id);
        assert_eq!(row.negative_accrued, 1);
        assert_eq!(row.last_accrued().unwrap(), start());

        let totals = db
            .with_conn(|conn| ledger::totals_for_life(conn, &first.influencer_id))
            .unwrap();
        assert_eq!(totals, ledger::LedgerTotals::default());
        assert_eq!(db.stats().unwrap().ledger_entries, 0);
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_accrual_entry_links_affected_life() {
        let db = Arc::new(KarmaDb::open_in_memory().unwrap());
        let engine = AccrualEngine::new(db.clone(), Arc::new(EventBus::new()));
        let seeded = seed(&db);

        engine.run_at(start() + Duration::hours(2)).await.unwrap();

        let entries = db
            .with_conn(|conn| ledger::entries_for_life(conn, &seeded.influencer_id, 10))
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].negative_delta, 2);
        assert_eq!(entries[0].affected_id.as_deref(), Some(seeded.affected_id.as_str()));
        assert_eq!(entries[0].interaction_id.as_deref(), Some(seeded.id.as_str()));
    }

    #[tokio::test]
    async fn test_empty_store() {
        let db = Arc::new(KarmaDb::open_in_memory().unwrap());
        let engine = AccrualEngine::new(db, Arc::new(EventBus::new()));
        assert_eq!(engine.run().await.unwrap(), AccrualReport::default());
    }
}
