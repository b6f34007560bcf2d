//! Interaction validator
//!
//! A claim stays valid while the affected life's profile for that chakra
//! still lists the influencer in the set matching the claim's direction.

use diesel::SqliteConnection;

use crate::db::{profiles, ChakraProfile, Interaction};
use crate::error::KarmaError;

/// Whether `profile` still supports `interaction`
///
/// A missing profile never supports a claim.
pub fn claim_still_supported(
    interaction: &Interaction,
    profile: Option<&ChakraProfile>,
) -> Result<bool, KarmaError> {
    let Some(profile) = profile else {
        return Ok(false);
    };

    let direction = interaction.direction()?;
    Ok(profile.claimants(direction)?.contains(&interaction.influencer_id))
}

/// Load the affected life's profile and check the interaction against it
pub fn validate_interaction(
    conn: &mut SqliteConnection,
    interaction: &Interaction,
) -> Result<bool, KarmaError> {
    let profile = profiles::get_profile(conn, &interaction.affected_id, interaction.chakra()?)?;
    claim_still_supported(interaction, profile.as_ref())
}
