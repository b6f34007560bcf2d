//! Claim service - the write path for influence claims
//!
//! A claim says "the life behind this email opened (positive) or closed
//! (negative) this chakra of mine". Recording one updates the affected
//! profile, retires any active interaction for the same tuple and starts a
//! new one, all in one transaction. The influencer is told by mail after
//! commit.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use diesel::SqliteConnection;
use serde::Serialize;
use tracing::{info, warn};

use crate::chakra::{Chakra, Direction};
use crate::db::interactions::{self, CreateInteractionInput};
use crate::db::ledger::{self, AppendLedgerInput};
use crate::db::models::format_timestamp;
use crate::db::{lives, profiles, ChakraProfile, Interaction, KarmaDb, Life};
use crate::error::KarmaError;

use super::events::{EventBus, KarmaEvent};
use super::lives::{validate_email, validate_life_id};
use super::mail::{MailDispatcher, MailMessage};
use super::{projector, run_blocking};

/// Raw claim as submitted by the affected life
#[derive(Debug, Clone)]
pub struct ClaimInput {
    pub affected_id: String,
    pub influencer_email: String,
    /// Sanskrit or common name, any case
    pub chakra: String,
    /// `positive` or `negative`
    pub direction: String,
}

/// A previous interaction burned by an opposite claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BurnedClaim {
    pub interaction_id: String,
    pub direction: Direction,
    pub units: i32,
}

/// Result of recording a claim
#[derive(Debug, Clone)]
pub struct ClaimOutcome {
    pub interaction: Interaction,
    pub influencer: Life,
    pub superseded_id: Option<String>,
    pub burned: Option<BurnedClaim>,
    /// Whether the tag notification went out
    pub notified: bool,
}

#[derive(Debug, Clone)]
struct ValidClaim {
    affected_id: String,
    influencer_email: String,
    chakra: Chakra,
    direction: Direction,
}

impl ValidClaim {
    fn parse(input: &ClaimInput) -> Result<Self, KarmaError> {
        validate_life_id(&input.affected_id)?;
        validate_email(&input.influencer_email)?;

        Ok(Self {
            affected_id: input.affected_id.clone(),
            influencer_email: input.influencer_email.trim().to_string(),
            chakra: input.chakra.parse()?,
            direction: input.direction.parse()?,
        })
    }
}

struct Recorded {
    affected: Life,
    outcome: ClaimOutcome,
    events: Vec<KarmaEvent>,
}

/// Claim service
pub struct ClaimService {
    db: Arc<KarmaDb>,
    events: Arc<EventBus>,
    mailer: Arc<dyn MailDispatcher>,
    site_url: String,
}

impl ClaimService {
    pub fn new(
        db: Arc<KarmaDb>,
        events: Arc<EventBus>,
        mailer: Arc<dyn MailDispatcher>,
        site_url: String,
    ) -> Self {
        Self {
            db,
            events,
            mailer,
            site_url,
        }
    }

    /// Record a claim now
    pub async fn submit(&self, input: ClaimInput) -> Result<ClaimOutcome, KarmaError> {
        self.submit_at(input, Utc::now()).await
    }

    /// Record a claim as of `now`
    pub async fn submit_at(
        &self,
        input: ClaimInput,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, KarmaError> {
        let claim = ValidClaim::parse(&input)?;

        let Recorded {
            affected,
            mut outcome,
            events,
        } = run_blocking(&self.db, move |db| {
            db.transaction(|conn| record_claim(conn, &claim, now))
        })
        .await?;

        self.events.emit_all(events);

        info!(
            interaction = %outcome.interaction.id,
            influencer = %outcome.influencer.id,
            affected = %affected.id,
            chakra = %outcome.interaction.chakra,
            direction = %outcome.interaction.direction,
            "Claim recorded"
        );

        outcome.notified = self.notify_influencer(&affected, &outcome).await;
        Ok(outcome)
    }

    /// Drop the influencer from both claim sets of the affected profile
    ///
    /// Returns None, with no event, when the influencer held no claim there.
    /// The active interaction stays until the next accrual run resolves it.
    pub fn withdraw(
        &self,
        affected_id: &str,
        influencer_id: &str,
        chakra: &str,
    ) -> Result<Option<ChakraProfile>, KarmaError> {
        validate_life_id(affected_id)?;
        validate_life_id(influencer_id)?;
        let chakra: Chakra = chakra.parse()?;

        let profile = self.db.transaction(|conn| {
            profiles::withdraw_claimant(conn, affected_id, chakra, influencer_id)
        })?;

        if profile.is_some() {
            self.events.emit(KarmaEvent::ClaimWithdrawn {
                affected_id: affected_id.to_string(),
                influencer_id: influencer_id.to_string(),
                chakra,
            });
        }
        Ok(profile)
    }

    async fn notify_influencer(&self, affected: &Life, outcome: &ClaimOutcome) -> bool {
        let (chakra, direction) = match (outcome.interaction.chakra(), outcome.interaction.direction()) {
            (Ok(chakra), Ok(direction)) => (chakra, direction),
            _ => return false,
        };

        let message = MailMessage::tag_notification(
            &outcome.influencer.email,
            &affected.display_name,
            chakra,
            direction,
            &self.site_url,
        );

        match self.mailer.send(&message).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    to = %message.to,
                    mailer = self.mailer.name(),
                    error = %e,
                    "Failed to send tag notification"
                );
                false
            }
        }
    }
}

fn record_claim(
    conn: &mut SqliteConnection,
    claim: &ValidClaim,
    now: DateTime<Utc>,
) -> Result<Recorded, KarmaError> {
    let affected = lives::get_life(conn, &claim.affected_id)?
        .ok_or_else(|| KarmaError::NotFound(format!("Life {}", claim.affected_id)))?;

    if claim.direction == Direction::Positive {
        projector::ensure_may_claim_positive(conn, &affected.id)?;
    }

    let influencer = lives::find_or_create_by_email(conn, &claim.influencer_email)?;
    if influencer.id == affected.id {
        return Err(KarmaError::InvalidInput("A life cannot claim about itself".into()));
    }

    profiles::record_claimant(conn, &affected.id, claim.chakra, &influencer.id, claim.direction)?;

    let recorded_at = format_timestamp(now);
    let mut events = Vec::new();
    let mut carried = 0;
    let mut superseded_id = None;
    let mut burned = None;

    if let Some(existing) = interactions::find_active(conn, &influencer.id, &affected.id, claim.chakra)? {
        let existing_direction = existing.direction()?;
        let units = existing.accrued(existing_direction);

        if existing_direction == claim.direction {
            interactions::mark_superseded(conn, &existing.id)?;
            carried = units;
            superseded_id = Some(existing.id);
        } else {
            interactions::mark_resolved(conn, &existing.id, now)?;
            if units != 0 {
                ledger::append_entry(
                    conn,
                    AppendLedgerInput {
                        recorded_at: Some(recorded_at.clone()),
                        ..AppendLedgerInput::for_direction(&influencer.id, existing_direction, -units)
                            .with_affected(&affected.id)
                            .with_interaction(&existing.id)
                            .with_note("burn")
                    },
                )?;
            }
            events.push(KarmaEvent::KarmaBurned {
                interaction_id: existing.id.clone(),
                influencer_id: influencer.id.clone(),
                direction: existing_direction,
                units,
            });
            burned = Some(BurnedClaim {
                interaction_id: existing.id,
                direction: existing_direction,
                units,
            });
        }
    }

    let interaction = interactions::create_interaction(
        conn,
        CreateInteractionInput {
            influencer_id: &influencer.id,
            affected_id: &affected.id,
            chakra: claim.chakra,
            direction: claim.direction,
            initial_units: carried + 1,
            now,
        },
    )?;

    ledger::append_entry(
        conn,
        AppendLedgerInput {
            recorded_at: Some(recorded_at),
            ..AppendLedgerInput::for_direction(&influencer.id, claim.direction, 1)
                .with_affected(&affected.id)
                .with_interaction(&interaction.id)
                .with_note("claim")
        },
    )?;

    if let Some(id) = &superseded_id {
        events.push(KarmaEvent::InteractionSuperseded {
            id: id.clone(),
            replaced_by: interaction.id.clone(),
            carried_units: carried,
        });
    }
    events.push(KarmaEvent::ClaimRecorded {
        interaction_id: interaction.id.clone(),
        influencer_id: influencer.id.clone(),
        affected_id: affected.id.clone(),
        chakra: claim.chakra,
        direction: claim.direction,
        initial_units: carried + 1,
    });

    Ok(Recorded {
        affected,
        outcome: ClaimOutcome {
            interaction,
            influencer,
            superseded_id,
            burned,
            notified: false,
        },
        events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::mail::MemoryMailer;
    use chrono::TimeZone;

    struct Fixture {
        db: Arc<KarmaDb>,
        mailer: Arc<MemoryMailer>,
        events: Arc<EventBus>,
        claims: ClaimService,
        ada: Life,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(KarmaDb::open_in_memory().unwrap());
        let mailer = Arc::new(MemoryMailer::new());
        let events = Arc::new(EventBus::new());
        let claims = ClaimService::new(
            db.clone(),
            events.clone(),
            mailer.clone(),
            "https://moksha.example".into(),
        );
        let ada = db
            .with_conn(|conn| lives::create_life(conn, "Ada Lovelace", "ada@example.com", true))
            .unwrap();
        Fixture { db, mailer, events, claims, ada }
    }

    fn claim(affected: &Life, email: &str, chakra: &str, direction: &str) -> ClaimInput {
        ClaimInput {
            affected_id: affected.id.clone(),
            influencer_email: email.into(),
            chakra: chakra.into(),
            direction: direction.into(),
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_negative_claim_creates_placeholder_and_notifies() {
        let f = fixture();
        let outcome = f
            .claims
            .submit_at(claim(&f.ada, "grace@example.com", "root", "negative"), start())
            .await
            .unwrap();

        assert_eq!(outcome.influencer.display_name, lives::UNKNOWN_DISPLAY_NAME);
        assert_eq!(outcome.interaction.negative_accrued, 1);
        assert_eq!(outcome.interaction.chakra, "Muladhara");
        assert!(outcome.notified);

        let sent = f.mailer.sent_to("grace@example.com").await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].subject.starts_with("Ada Lovelace tagged you as putting Fear"));

        let totals = f
            .db
            .with_conn(|conn| ledger::totals_for_life(conn, &outcome.influencer.id))
            .unwrap();
        assert_eq!(totals.negative, 1);
    }

    #[tokio::test]
    async fn test_rejects_bad_input_before_mutation() {
        let f = fixture();
        let bad = [
            ClaimInput { affected_id: "42".into(), ..claim(&f.ada, "g@example.com", "Root", "negative") },
            claim(&f.ada, "", "Root", "negative"),
            claim(&f.ada, "g@example.com", "Spleen", "negative"),
            claim(&f.ada, "g@example.com", "Root", "sideways"),
        ];
        for input in bad {
            let err = f.claims.submit_at(input, start()).await.unwrap_err();
            assert!(matches!(err, KarmaError::InvalidInput(_)));
        }
        assert_eq!(f.db.stats().unwrap().life_count, 1);
        assert!(f.mailer.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_self_claim_rejected() {
        let f = fixture();
        let err = f
            .claims
            .submit_at(claim(&f.ada, "ADA@example.com", "Heart", "negative"), start())
            .await
            .unwrap_err();
        assert!(matches!(err, KarmaError::InvalidInput(_)));
        assert_eq!(f.db.stats().unwrap().profile_count, 0);
    }

    #[tokio::test]
    async fn test_unknown_affected_life() {
        let f = fixture();
        let input = ClaimInput {
            affected_id: uuid::Uuid::new_v4().to_string(),
            ..claim(&f.ada, "grace@example.com", "Root", "negative")
        };
        let err = f.claims.submit_at(input, start()).await.unwrap_err();
        assert!(matches!(err, KarmaError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_positive_claim_gated_on_affected_balance() {
        let f = fixture();
        let err = f
            .claims
            .submit_at(claim(&f.ada, "grace@example.com", "Heart", "positive"), start())
            .await
            .unwrap_err();
        assert!(matches!(err, KarmaError::PositiveClaimDenied { net: 0, .. }));
        // Rolled back: no placeholder for grace
        assert_eq!(f.db.stats().unwrap().life_count, 1);

        f.db.with_conn(|conn| {
            ledger::append_entry(conn, AppendLedgerInput::for_direction(&f.ada.id, Direction::Positive, 3))
        })
        .unwrap();
        let outcome = f
            .claims
            .submit_at(claim(&f.ada, "grace@example.com", "Heart", "positive"), start())
            .await
            .unwrap();
        assert_eq!(outcome.interaction.positive_accrued, 1);
    }

    #[tokio::test]
    async fn test_withdraw_removes_claimant() {
        let f = fixture();
        let outcome = f
            .claims
            .submit_at(claim(&f.ada, "grace@example.com", "Throat", "negative"), start())
            .await
            .unwrap();

        let mut receiver = f.events.subscribe();
        let profile = f
            .claims
            .withdraw(&f.ada.id, &outcome.influencer.id, "Vishuddhi")
            .unwrap()
            .unwrap();
        assert!(profile.closed_by().unwrap().is_empty());
        match receiver.try_recv().unwrap() {
            KarmaEvent::ClaimWithdrawn { influencer_id, chakra, .. } => {
                assert_eq!(influencer_id, outcome.influencer.id);
                assert_eq!(chakra, Chakra::Vishuddhi);
            }
            other => panic!("Wrong event type: {:?}", other),
        }

        let other = uuid::Uuid::new_v4().to_string();
        assert!(f.claims.withdraw(&f.ada.id, &other, "Crown").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_withdraw_without_claim_emits_nothing() {
        let f = fixture();
        let outcome = f
            .claims
            .submit_at(claim(&f.ada, "grace@example.com", "Heart", "negative"), start())
            .await
            .unwrap();
        let bystander = f
            .db
            .with_conn(|conn| lives::create_life(conn, "Linus", "linus@example.com", true))
            .unwrap();

        let mut receiver = f.events.subscribe();
        // Profile exists but Linus never claimed it
        assert!(f.claims.withdraw(&f.ada.id, &bystander.id, "Anahata").unwrap().is_none());
        // Already withdrawn once
        f.claims.withdraw(&f.ada.id, &outcome.influencer.id, "Anahata").unwrap().unwrap();
        assert!(f.claims.withdraw(&f.ada.id, &outcome.influencer.id, "Anahata").unwrap().is_none());

        assert!(matches!(receiver.try_recv().unwrap(), KarmaEvent::ClaimWithdrawn { .. }));
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_mail_failure_does_not_fail_claim() {
        let f = fixture();
        f.mailer.fail_for("grace@example.com").await;
        let outcome = f
            .claims
            .submit_at(claim(&f.ada, "grace@example.com", "Sacral", "negative"), start())
            .await
            .unwrap();
        assert!(!outcome.notified);
        assert_eq!(f.db.stats().unwrap().active_interactions, 1);
    }
}
