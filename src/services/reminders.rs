//! Reminder notifier
//!
//! Reminds influencers of negative karma they are still accruing. A life
//! is reminded at most once per window: if any of its outstanding
//! interactions was reminded inside the window, the whole life is skipped.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::db::{interactions, lives, Interaction, KarmaDb, Life};
use crate::error::KarmaError;

use super::events::{EventBus, KarmaEvent};
use super::mail::{MailDispatcher, MailMessage};
use super::run_blocking;

/// Outcome of one reminder run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReminderReport {
    pub lives_considered: usize,
    pub reminders_sent: usize,
    /// Reminded within the window
    pub lives_skipped: usize,
    /// Lives whose run stopped on an error
    pub failures: usize,
}

/// A life and its outstanding negative interactions
#[derive(Debug, Clone)]
pub struct OutstandingKarma {
    pub life: Life,
    pub interactions: Vec<Interaction>,
}

impl OutstandingKarma {
    /// Whether any interaction was reminded after `since`
    fn reminded_since(&self, since: DateTime<Utc>) -> Result<bool, KarmaError> {
        for interaction in &self.interactions {
            if let Some(at) = interaction.last_reminded()? {
                if at > since {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

/// Periodic reminder job
pub struct ReminderNotifier {
    db: Arc<KarmaDb>,
    events: Arc<EventBus>,
    mailer: Arc<dyn MailDispatcher>,
    window: Duration,
    site_url: String,
}

impl ReminderNotifier {
    pub fn new(
        db: Arc<KarmaDb>,
        events: Arc<EventBus>,
        mailer: Arc<dyn MailDispatcher>,
        window: Duration,
        site_url: String,
    ) -> Self {
        Self {
            db,
            events,
            mailer,
            window,
            site_url,
        }
    }

    pub async fn run(&self) -> Result<ReminderReport, KarmaError> {
        self.run_at(Utc::now()).await
    }

    /// Run as of `now`
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<ReminderReport, KarmaError> {
        let outstanding = run_blocking(&self.db, |db| db.with_conn(load_outstanding)).await?;
        let since = now - self.window;
        let mut report = ReminderReport::default();

        for entry in &outstanding {
            report.lives_considered += 1;

            match entry.reminded_since(since) {
                Ok(true) => {
                    report.lives_skipped += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(life = %entry.life.id, error = %e, "Unreadable reminder timestamp");
                    report.failures += 1;
                    continue;
                }
            }

            if let Err(e) = self.remind_life(entry, now, &mut report).await {
                warn!(
                    life = %entry.life.id,
                    email = %entry.life.email,
                    error = %e,
                    "Reminder failed, moving on"
                );
                report.failures += 1;
            }
        }

        info!(
            lives = report.lives_considered,
            sent = report.reminders_sent,
            skipped = report.lives_skipped,
            failures = report.failures,
            mailer = self.mailer.name(),
            "Reminder run complete"
        );
        Ok(report)
    }

    /// One message per interaction; each is stamped right after its send
    async fn remind_life(
        &self,
        entry: &OutstandingKarma,
        now: DateTime<Utc>,
        report: &mut ReminderReport,
    ) -> Result<(), KarmaError> {
        for interaction in &entry.interactions {
            let message = MailMessage::karma_reminder(
                &entry.life.email,
                interaction.negative_accrued,
                interaction.chakra()?,
                &self.site_url,
            );
            self.mailer.send(&message).await?;

            let id = interaction.id.clone();
            run_blocking(&self.db, move |db| {
                db.with_conn(|conn| interactions::stamp_reminder(conn, &id, now))
            })
            .await?;

            report.reminders_sent += 1;
            self.events.emit(KarmaEvent::ReminderSent {
                life_id: entry.life.id.clone(),
                interaction_id: interaction.id.clone(),
                units: interaction.negative_accrued,
            });
        }
        Ok(())
    }
}

/// Outstanding negative interactions grouped by influencer
pub fn load_outstanding(
    conn: &mut diesel::SqliteConnection,
) -> Result<Vec<OutstandingKarma>, KarmaError> {
    let mut grouped: BTreeMap<String, Vec<Interaction>> = BTreeMap::new();
    for interaction in interactions::list_outstanding_negative(conn)? {
        grouped
            .entry(interaction.influencer_id.clone())
            .or_default()
            .push(interaction);
    }

    let mut outstanding = Vec::with_capacity(grouped.len());
    for (life_id, pending) in grouped {
        match lives::get_life(conn, &life_id)? {
            Some(life) => outstanding.push(OutstandingKarma { life, interactions: pending }),
            None => warn!(life = %life_id, "Influencer missing, skipping reminders"),
        }
    }
    Ok(outstanding)
}
