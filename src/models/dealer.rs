//! # models::dealer
//!
//! Delivery-notice activity of one clearing firm for one commodity.

use std::fmt;

use serde::Serialize;

/// Which side of a delivery notice the firm was on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Direction {
    /// Firm delivered metal out.
    Issued,
    /// Firm took delivery.
    Stopped,
    /// Row appeared before any Issued/Stopped sub-header.
    Unknown,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Issued  => "Issued",
            Direction::Stopped => "Stopped",
            Direction::Unknown => "Unknown",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DealerActivity {
    /// Whitespace-collapsed and trimmed; never a total/header label.
    pub firm_name: String,
    /// Contracts; always > 0.
    pub volume:    u64,
    pub direction: Direction,
}

impl DealerActivity {
    pub fn new(firm_name: impl Into<String>, volume: u64, direction: Direction) -> Self {
        Self { firm_name: firm_name.into(), volume, direction }
    }
}

impl fmt::Display for DealerActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.firm_name, self.volume, self.direction)
    }
}
