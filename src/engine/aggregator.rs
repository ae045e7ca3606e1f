//! # engine::aggregator
//!
//! Pure merge of one commodity's facts into a [`DailyMetalRecord`]. No I/O.
//!
//! The dealer list stays complete upstream; the top-N summary string is only
//! a display projection computed here.

use chrono::NaiveDate;

use crate::models::{Commodity, DailyMetalRecord, DealerActivity, RecordExtras, StockSnapshot, NO_ACTIVITY};

/// Separator between entries of the dealer summary.
pub const SUMMARY_DELIMITER: &str = "; ";

#[derive(Debug, Clone, Copy)]
pub struct FactAggregator {
    top_n: usize,
}

impl Default for FactAggregator {
    fn default() -> Self {
        Self { top_n: 3 }
    }
}

impl FactAggregator {
    /// `top_n` of zero is treated as one.
    pub fn new(top_n: usize) -> Self {
        Self { top_n: top_n.max(1) }
    }

    pub fn aggregate(
        &self,
        commodity: Commodity,
        date: NaiveDate,
        stock: StockSnapshot,
        activities: &[DealerActivity],
        extras: RecordExtras,
    ) -> DailyMetalRecord {
        DailyMetalRecord {
            report_date:    date,
            commodity,
            stock,
            dealer_summary: self.dealer_summary(activities),
            open_interest:  extras.open_interest,
            narrative_note: extras.narrative_note,
            remote_id:      None,
        }
    }

    /// `"{firm}: {volume} ({direction})"` for the first `top_n` entries, which
    /// are expected to be ranked already.
    pub fn dealer_summary(&self, activities: &[DealerActivity]) -> String {
        if activities.is_empty() {
            return NO_ACTIVITY.to_string();
        }
        activities
            .iter()
            .take(self.top_n)
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(SUMMARY_DELIMITER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Direction;

    fn make_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 11).unwrap()
    }

    fn make_activities() -> Vec<DealerActivity> {
        vec![
            DealerActivity::new("JPMORGAN CHASE", 500, Direction::Issued),
            DealerActivity::new("CITI", 300, Direction::Stopped),
            DealerActivity::new("HSBC", 200, Direction::Stopped),
            DealerActivity::new("STONEX", 100, Direction::Issued),
        ]
    }

    #[test]
    fn test_top_one_summary() {
        let agg = FactAggregator::new(1);
        assert_eq!(agg.dealer_summary(&make_activities()), "JPMORGAN CHASE: 500 (Issued)");
    }

    #[test]
    fn test_default_top_three() {
        let agg = FactAggregator::default();
        assert_eq!(
            agg.dealer_summary(&make_activities()),
            "JPMORGAN CHASE: 500 (Issued); CITI: 300 (Stopped); HSBC: 200 (Stopped)"
        );
    }

    #[test]
    fn test_empty_activity_sentinel() {
        assert_eq!(FactAggregator::default().dealer_summary(&[]), "No significant activity.");
    }

    #[test]
    fn test_absent_extras_stay_absent() {
        let stock = StockSnapshot::new(1000.0, 250.0, 3.0);
        let rec = FactAggregator::default().aggregate(
            Commodity::Gold,
            make_date(),
            stock,
            &[],
            RecordExtras::default(),
        );
        assert_eq!(rec.open_interest, None);
        assert_eq!(rec.narrative_note, None);
        assert_eq!(rec.remote_id, None);
        assert_eq!(rec.stock, stock);
        assert_eq!(rec.dealer_summary, NO_ACTIVITY);
    }

    #[test]
    fn test_zero_open_interest_is_kept() {
        let extras = RecordExtras { open_interest: Some(0), narrative_note: Some("quiet".into()) };
        let rec = FactAggregator::new(0).aggregate(
            Commodity::Silver,
            make_date(),
            StockSnapshot::default(),
            &make_activities(),
            extras,
        );
        assert_eq!(rec.open_interest, Some(0));
        assert_eq!(rec.narrative_note.as_deref(), Some("quiet"));
        assert_eq!(rec.dealer_summary, "JPMORGAN CHASE: 500 (Issued)");
    }
}
