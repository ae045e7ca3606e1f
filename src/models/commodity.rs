//! # models::commodity
//!
//! The closed set of tracked metals. Everything that varies per metal and
//! drifts between report revisions (file names, cell coordinates, tickers)
//! lives in the layout table, not here.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Commodity {
    Gold,
    Silver,
    Copper,
    Platinum,
    Palladium,
    Aluminum,
    Zinc,
    Lead,
}

impl Commodity {
    /// Processing order of a daily run.
    pub const ALL: [Commodity; 8] = [
        Commodity::Gold,
        Commodity::Silver,
        Commodity::Copper,
        Commodity::Platinum,
        Commodity::Palladium,
        Commodity::Aluminum,
        Commodity::Zinc,
        Commodity::Lead,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Commodity::Gold      => "Gold",
            Commodity::Silver    => "Silver",
            Commodity::Copper    => "Copper",
            Commodity::Platinum  => "Platinum",
            Commodity::Palladium => "Palladium",
            Commodity::Aluminum  => "Aluminum",
            Commodity::Zinc      => "Zinc",
            Commodity::Lead      => "Lead",
        }
    }

    /// Upper-case words that introduce this metal's section in the
    /// issues-and-stops report.
    pub fn report_tokens(self) -> &'static [&'static str] {
        match self {
            Commodity::Gold      => &["GOLD"],
            Commodity::Silver    => &["SILVER"],
            Commodity::Copper    => &["COPPER"],
            Commodity::Platinum  => &["PLATINUM"],
            Commodity::Palladium => &["PALLADIUM"],
            Commodity::Aluminum  => &["ALUMINUM", "ALUMINIUM"],
            Commodity::Zinc      => &["ZINC"],
            Commodity::Lead      => &["LEAD"],
        }
    }

    /// Which commodity, if any, a single upper-case word names.
    pub fn from_report_token(word: &str) -> Option<Commodity> {
        Commodity::ALL
            .into_iter()
            .find(|c| c.report_tokens().contains(&word))
    }
}

impl fmt::Display for Commodity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown commodity: '{0}'")]
pub struct UnknownCommodity(pub String);

impl FromStr for Commodity {
    type Err = UnknownCommodity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Commodity::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownCommodity(wanted.to_string()))
    }
}
