//! Balance projector
//!
//! Derives karma balances from stored rows. Nothing here writes.

use std::sync::Arc;

use diesel::prelude::*;
use diesel::SqliteConnection;
use serde::Serialize;

use crate::db::diesel_schema::karma_interactions;
use crate::db::models::interaction_status;
use crate::db::{ledger, KarmaDb};
use crate::error::KarmaError;

/// Karma balance for one life
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KarmaBalance {
    pub life_id: String,
    pub positive: i64,
    pub negative: i64,
    pub net: i64,
}

impl KarmaBalance {
    fn new(life_id: &str, positive: i64, negative: i64) -> Self {
        Self {
            life_id: life_id.to_string(),
            positive,
            negative,
            net: positive - negative,
        }
    }
}

/// Ledger-based balance: sums every delta recorded for the life
pub fn ledger_balance(conn: &mut SqliteConnection, life_id: &str) -> Result<KarmaBalance, KarmaError> {
    let totals = ledger::totals_for_life(conn, life_id)?;
    Ok(KarmaBalance::new(life_id, totals.positive, totals.negative))
}

/// Accrued balance over the life's active interactions as influencer
pub fn accrued_balance(conn: &mut SqliteConnection, life_id: &str) -> Result<KarmaBalance, KarmaError> {
    let rows: Vec<(i32, i32)> = karma_interactions::table
        .filter(karma_interactions::influencer_id.eq(life_id))
        .filter(karma_interactions::status.eq(interaction_status::ACTIVE))
        .select((karma_interactions::positive_accrued, karma_interactions::negative_accrued))
        .load(conn)?;

    let (positive, negative) = rows.iter().fold((0i64, 0i64), |(p, n), (rp, rn)| {
        (p + i64::from(*rp), n + i64::from(*rn))
    });
    Ok(KarmaBalance::new(life_id, positive, negative))
}

/// Reject a positive claim from a life whose ledger net is not above zero
pub fn ensure_may_claim_positive(conn: &mut SqliteConnection, life_id: &str) -> Result<i64, KarmaError> {
    let net = ledger::totals_for_life(conn, life_id)?.net();
    if net <= 0 {
        return Err(KarmaError::PositiveClaimDenied {
            life_id: life_id.to_string(),
            net,
        });
    }
    Ok(net)
}

/// Read-side facade over a shared database
pub struct BalanceProjector {
    db: Arc<KarmaDb>,
}

impl BalanceProjector {
    pub fn new(db: Arc<KarmaDb>) -> Self {
        Self { db }
    }

    pub fn ledger_balance(&self, life_id: &str) -> Result<KarmaBalance, KarmaError> {
        self.db.with_conn(|conn| ledger_balance(conn, life_id))
    }

    pub fn accrued_balance(&self, life_id: &str) -> Result<KarmaBalance, KarmaError> {
        self.db.with_conn(|conn| accrued_balance(conn, life_id))
    }

    /// Gate check; returns the current net when allowed
    pub fn ensure_may_claim_positive(&self, life_id: &str) -> Result<i64, KarmaError> {
        self.db.with_conn(|conn| ensure_may_claim_positive(conn, life_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chakra::{Chakra, Direction};
    use crate::db::interactions::{self, CreateInteractionInput};
    use crate::db::ledger::AppendLedgerInput;
    use crate::db::lives;
    use chrono::Utc;

    #[test]
    fn test_gate_rejects_non_positive_net() {
        let db = Arc::new(KarmaDb::open_in_memory().unwrap());
        let life = db
            .with_conn(|conn| lives::create_life(conn, "Ada", "ada@example.com", true))
            .unwrap();
        let projector = BalanceProjector::new(db.clone());

        let err = projector.ensure_may_claim_positive(&life.id).unwrap_err();
        assert!(matches!(err, KarmaError::PositiveClaimDenied { net: 0, .. }));

        db.with_conn(|conn| {
            ledger::append_entry(conn, AppendLedgerInput::for_direction(&life.id, Direction::Positive, 2))
        })
        .unwrap();
        assert_eq!(projector.ensure_may_claim_positive(&life.id).unwrap(), 2);

        db.with_conn(|conn| {
            ledger::append_entry(conn, AppendLedgerInput::for_direction(&life.id, Direction::Negative, 2))
        })
        .unwrap();
        let err = projector.ensure_may_claim_positive(&life.id).unwrap_err();
        assert!(matches!(err, KarmaError::PositiveClaimDenied { net: 0, .. }));
    }

    #[test]
    fn test_accrued_balance_counts_active_only() {
        let db = Arc::new(KarmaDb::open_in_memory().unwrap());
        let projector = BalanceProjector::new(db.clone());

        let grace_id = db
            .with_conn(|conn| {
                let ada = lives::create_life(conn, "Ada", "ada@example.com", true)?;
                let grace = lives::create_life(conn, "Grace", "grace@example.com", true)?;
                let base = CreateInteractionInput {
                    influencer_id: &grace.id,
                    affected_id: &ada.id,
                    chakra: Chakra::Anahata,
                    direction: Direction::Positive,
                    initial_units: 5,
                    now: Utc::now(),
                };
                interactions::create_interaction(conn, base.clone())?;
                interactions::create_interaction(conn, CreateInteractionInput {
                    chakra: Chakra::Ajna,
                    direction: Direction::Negative,
                    initial_units: 2,
                    ..base.clone()
                })?;
                let retired = interactions::create_interaction(conn, CreateInteractionInput {
                    chakra: Chakra::Sahasrara,
                    initial_units: 40,
                    ..base
                })?;
                interactions::mark_superseded(conn, &retired.id)?;
                Ok(grace.id)
            })
            .unwrap();

        let balance = projector.accrued_balance(&grace_id).unwrap();
        assert_eq!(balance.positive, 5);
        assert_eq!(balance.negative, 2);
        assert_eq!(balance.net, 3);

        // Nothing was appended to the ledger
        assert_eq!(projector.ledger_balance(&grace_id).unwrap().net, 0);
    }
}
