//! The closed rating vocabulary
//!
//! The remote site rates on a five-star scale. Every stored record carries one
//! of these levels or [`Rating::Unrated`]; raw strings never reach the store.

use serde::Serialize;
use std::fmt;

/// A star rating, or the absence of one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Unrated,
    OneStar,
    TwoStars,
    ThreeStars,
    FourStars,
    FiveStars,
}

impl Rating {
    /// The five star levels, lowest first
    pub const STARS: [Rating; 5] = [
        Rating::OneStar,
        Rating::TwoStars,
        Rating::ThreeStars,
        Rating::FourStars,
        Rating::FiveStars,
    ];

    /// Maps a star count (1-5) onto the vocabulary
    pub fn from_stars(stars: u32) -> Option<Self> {
        match stars {
            1 => Some(Self::OneStar),
            2 => Some(Self::TwoStars),
            3 => Some(Self::ThreeStars),
            4 => Some(Self::FourStars),
            5 => Some(Self::FiveStars),
            _ => None,
        }
    }

    /// Number of stars, or None when unrated
    pub fn stars(&self) -> Option<u32> {
        match self {
            Self::Unrated => None,
            Self::OneStar => Some(1),
            Self::TwoStars => Some(2),
            Self::ThreeStars => Some(3),
            Self::FourStars => Some(4),
            Self::FiveStars => Some(5),
        }
    }

    pub fn is_rated(&self) -> bool {
        !matches!(self, Self::Unrated)
    }

    /// Normalizes a loosely formatted rating found in page markup
    ///
    /// Accepts a bare star count ("4"), the ten-point scale the site uses in
    /// `star-rating-NN` classes ("40", "4.0"), and a trailing unit ("4分", "4星").
    /// Anything else yields None so the caller can fall back to another source.
    pub fn normalize(raw: &str) -> Option<Self> {
        let trimmed = raw
            .trim()
            .trim_end_matches(|c: char| !c.is_ascii_digit() && c != '.');
        if trimmed.is_empty() {
            return None;
        }

        let value: f64 = trimmed.parse().ok()?;
        let stars = if value > 5.0 { value / 10.0 } else { value };
        if stars.fract() != 0.0 {
            return None;
        }

        Self::from_stars(stars as u32)
    }

    /// Converts the rating to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Unrated => "unrated",
            Self::OneStar => "1",
            Self::TwoStars => "2",
            Self::ThreeStars => "3",
            Self::FourStars => "4",
            Self::FiveStars => "5",
        }
    }

    /// Parses a rating from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "unrated" => Some(Self::Unrated),
            "1" => Some(Self::OneStar),
            "2" => Some(Self::TwoStars),
            "3" => Some(Self::ThreeStars),
            "4" => Some(Self::FourStars),
            "5" => Some(Self::FiveStars),
            _ => None,
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stars() {
            Some(n) => write!(f, "{}", "★".repeat(n as usize)),
            None => write!(f, "unrated"),
        }
    }
}
