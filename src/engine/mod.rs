//! Pure processing stages: report decoding, delivery extraction, aggregation.

pub mod aggregator;
pub mod delivery;
pub mod report_parser;

pub use aggregator::FactAggregator;
pub use report_parser::ReportParser;
