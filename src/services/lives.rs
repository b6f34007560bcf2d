//! Life service - accounts and the chakra profiles around them

use std::sync::Arc;

use uuid::Uuid;

use crate::chakra::Direction;
use crate::db::{lives, profiles, ChakraProfile, KarmaDb, Life};
use crate::error::KarmaError;

const MAX_LIST_LIMIT: i64 = 500;

/// Reject ids that are not UUIDs before they reach a query
pub fn validate_life_id(id: &str) -> Result<(), KarmaError> {
    Uuid::parse_str(id)
        .map(|_| ())
        .map_err(|_| KarmaError::InvalidInput(format!("Malformed life id: {}", id)))
}

pub fn validate_email(email: &str) -> Result<(), KarmaError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(KarmaError::InvalidInput("Email is required".into()));
    }
    if !email.contains('@') {
        return Err(KarmaError::InvalidInput(format!("Invalid email: {}", email)));
    }
    Ok(())
}

/// Life service for account operations
pub struct LifeService {
    db: Arc<KarmaDb>,
}

impl LifeService {
    pub fn new(db: Arc<KarmaDb>) -> Self {
        Self { db }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub fn get(&self, id: &str) -> Result<Option<Life>, KarmaError> {
        validate_life_id(id)?;
        self.db.with_conn(|conn| lives::get_life(conn, id))
    }

    pub fn list(&self, limit: i64, offset: i64) -> Result<Vec<Life>, KarmaError> {
        let limit = limit.clamp(1, MAX_LIST_LIMIT);
        let offset = offset.max(0);
        self.db.with_conn(|conn| lives::list_lives(conn, limit, offset))
    }

    /// All chakra profiles of a life
    pub fn profiles_for(&self, life_id: &str) -> Result<Vec<ChakraProfile>, KarmaError> {
        validate_life_id(life_id)?;
        self.db.with_conn(|conn| profiles::profiles_for_life(conn, life_id))
    }

    /// Profiles of other lives that `life_id` is listed as opening
    pub fn opening_for_others(&self, life_id: &str) -> Result<Vec<ChakraProfile>, KarmaError> {
        validate_life_id(life_id)?;
        self.db
            .with_conn(|conn| profiles::profiles_claimed_by(conn, life_id, Direction::Positive))
    }

    /// Profiles of other lives that `life_id` is listed as closing
    pub fn closing_for_others(&self, life_id: &str) -> Result<Vec<ChakraProfile>, KarmaError> {
        validate_life_id(life_id)?;
        self.db
            .with_conn(|conn| profiles::profiles_claimed_by(conn, life_id, Direction::Negative))
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Sign up a new registered life
    ///
    /// If the email already belongs to an unregistered placeholder, that
    /// placeholder is claimed instead of creating a second row.
    pub fn register(&self, display_name: &str, email: &str) -> Result<Life, KarmaError> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(KarmaError::InvalidInput("Display name is required".into()));
        }
        validate_email(email)?;

        self.db.transaction(|conn| match lives::find_by_email(conn, email)? {
            Some(existing) if existing.is_registered() => Err(KarmaError::InvalidInput(format!(
                "Email already registered: {}",
                existing.email
            ))),
            Some(placeholder) => lives::claim_life(conn, &placeholder.id, display_name),
            None => lives::create_life(conn, display_name, email, true),
        })
    }

    pub fn find_or_create_by_email(&self, email: &str) -> Result<Life, KarmaError> {
        validate_email(email)?;
        self.db
            .transaction(|conn| lives::find_or_create_by_email(conn, email))
    }

    /// Take ownership of an account: set the display name and mark it
    /// registered
    pub fn claim_account(&self, id: &str, display_name: &str) -> Result<Life, KarmaError> {
        validate_life_id(id)?;
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(KarmaError::InvalidInput("Display name is required".into()));
        }
        self.db.with_conn(|conn| lives::claim_life(conn, id, display_name))
    }

    /// Record the billing provider's customer reference
    pub fn link_billing_customer(&self, id: &str, customer_id: &str) -> Result<(), KarmaError> {
        validate_life_id(id)?;
        if customer_id.trim().is_empty() {
            return Err(KarmaError::InvalidInput("Customer id is required".into()));
        }
        self.db.with_conn(|conn| {
            if lives::get_life(conn, id)?.is_none() {
                return Err(KarmaError::NotFound(format!("Life {}", id)));
            }
            lives::set_billing_customer(conn, id, customer_id.trim())
        })
    }
}
