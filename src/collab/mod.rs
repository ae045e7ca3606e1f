//! Outbound collaborators: report download, archive, market data, AI.

pub mod ai;
pub mod archive;
pub mod fetch;
pub mod market;
pub mod prompt;
