//! Chakra taxonomy
//!
//! Seven fixed categories, each with a negative and a positive label.
//! Stored in the database by Sanskrit name; parsing also accepts the
//! common English name ("Root", "Heart", "Third Eye", ...).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::KarmaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Chakra {
    Muladhara,
    Svadhisthana,
    Manipura,
    Anahata,
    Vishuddhi,
    Ajna,
    Sahasrara,
}

/// Direction of an influence claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Positive,
    Negative,
}

impl Chakra {
    /// All chakras, root to crown
    pub const ALL: [Chakra; 7] = [
        Chakra::Muladhara,
        Chakra::Svadhisthana,
        Chakra::Manipura,
        Chakra::Anahata,
        Chakra::Vishuddhi,
        Chakra::Ajna,
        Chakra::Sahasrara,
    ];

    /// Sanskrit name, used as the stored value
    pub fn as_str(&self) -> &'static str {
        match self {
            Chakra::Muladhara => "Muladhara",
            Chakra::Svadhisthana => "Svadhisthana",
            Chakra::Manipura => "Manipura",
            Chakra::Anahata => "Anahata",
            Chakra::Vishuddhi => "Vishuddhi",
            Chakra::Ajna => "Ajna",
            Chakra::Sahasrara => "Sahasrara",
        }
    }

    pub fn common_name(&self) -> &'static str {
        match self {
            Chakra::Muladhara => "Root",
            Chakra::Svadhisthana => "Sacral",
            Chakra::Manipura => "Solar Plexus",
            Chakra::Anahata => "Heart",
            Chakra::Vishuddhi => "Throat",
            Chakra::Ajna => "Third Eye",
            Chakra::Sahasrara => "Crown",
        }
    }

    /// Label for the closed (negative) state
    pub fn negative_label(&self) -> &'static str {
        match self {
            Chakra::Muladhara => "Fear",
            Chakra::Svadhisthana => "Shame",
            Chakra::Manipura => "Powerlessness",
            Chakra::Anahata => "Grief",
            Chakra::Vishuddhi => "Censorship",
            Chakra::Ajna => "Illusion",
            Chakra::Sahasrara => "Division",
        }
    }

    /// Label for the opened (positive) state
    pub fn positive_label(&self) -> &'static str {
        match self {
            Chakra::Muladhara => "Groundedness",
            Chakra::Svadhisthana => "Joy",
            Chakra::Manipura => "Autonomy",
            Chakra::Anahata => "Gratitude",
            Chakra::Vishuddhi => "Vocality",
            Chakra::Ajna => "Insight",
            Chakra::Sahasrara => "Connectedness",
        }
    }

    pub fn label(&self, direction: Direction) -> &'static str {
        match direction {
            Direction::Positive => self.positive_label(),
            Direction::Negative => self.negative_label(),
        }
    }
}

impl fmt::Display for Chakra {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chakra {
    type Err = KarmaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Chakra::ALL
            .iter()
            .copied()
            .find(|c| {
                c.as_str().eq_ignore_ascii_case(wanted)
                    || c.common_name().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| KarmaError::InvalidInput(format!("Unknown chakra: {}", s)))
    }
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Positive => "positive",
            Direction::Negative => "negative",
        }
    }

    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Positive => Direction::Negative,
            Direction::Negative => Direction::Positive,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = KarmaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Ok(Direction::Positive),
            "negative" => Ok(Direction::Negative),
            other => Err(KarmaError::InvalidInput(format!("Unknown direction: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sanskrit_and_common_names() {
        assert_eq!("Muladhara".parse::<Chakra>().unwrap(), Chakra::Muladhara);
        assert_eq!("root".parse::<Chakra>().unwrap(), Chakra::Muladhara);
        assert_eq!("Third Eye".parse::<Chakra>().unwrap(), Chakra::Ajna);
        assert_eq!("  anahata ".parse::<Chakra>().unwrap(), Chakra::Anahata);
    }

    #[test]
    fn test_unknown_chakra_rejected() {
        let err = "Spleen".parse::<Chakra>().unwrap_err();
        assert!(matches!(err, KarmaError::InvalidInput(_)));
    }

    #[test]
    fn test_label_pairs() {
        assert_eq!(Chakra::Muladhara.label(Direction::Negative), "Fear");
        assert_eq!(Chakra::Muladhara.label(Direction::Positive), "Groundedness");
        assert_eq!(Chakra::Vishuddhi.label(Direction::Positive), "Vocality");
        assert_eq!(Chakra::Sahasrara.label(Direction::Negative), "Division");
    }

    #[test]
    fn test_stored_names_round_trip() {
        for chakra in Chakra::ALL {
            assert_eq!(chakra.as_str().parse::<Chakra>().unwrap(), chakra);
        }
    }

    #[test]
    fn test_direction() {
        assert_eq!("Positive".parse::<Direction>().unwrap(), Direction::Positive);
        assert_eq!(Direction::Negative.opposite(), Direction::Positive);
        assert!("resolved".parse::<Direction>().is_err());
    }
}
