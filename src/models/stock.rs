//! # models::stock
//!
//! [`StockSnapshot`] — one commodity's warehouse inventory on one report date.
//!
//! `total` and `registered_ratio` are derived on every read so they can never
//! disagree with the two figures they come from.

use serde::{Serialize, Serializer, ser::SerializeStruct};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StockSnapshot {
    registered: f64,
    eligible:   f64,
    net_change: f64,
}

impl StockSnapshot {
    /// Negative or non-finite inventory figures are not meaningful and are
    /// stored as `0.0`; `net_change` keeps its sign.
    pub fn new(registered: f64, eligible: f64, net_change: f64) -> Self {
        Self {
            registered: non_negative(registered),
            eligible:   non_negative(eligible),
            net_change: if net_change.is_finite() { net_change } else { 0.0 },
        }
    }

    pub fn registered(&self) -> f64 {
        self.registered
    }

    pub fn eligible(&self) -> f64 {
        self.eligible
    }

    pub fn net_change(&self) -> f64 {
        self.net_change
    }

    pub fn total(&self) -> f64 {
        self.registered + self.eligible
    }

    /// `registered / total`, or `0.0` for an empty warehouse. Always in `[0, 1]`.
    pub fn registered_ratio(&self) -> f64 {
        let total = self.total();
        if total > 0.0 {
            (self.registered / total).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

fn non_negative(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 { v } else { 0.0 }
}

impl Serialize for StockSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("StockSnapshot", 5)?;
        s.serialize_field("registered", &self.registered)?;
        s.serialize_field("eligible", &self.eligible)?;
        s.serialize_field("total", &self.total())?;
        s.serialize_field("net_change", &self.net_change)?;
        s.serialize_field("registered_ratio", &self.registered_ratio())?;
        s.end()
    }
}
