//! Domain models shared across the pipeline.

pub mod commodity;
pub mod dealer;
pub mod record;
pub mod stock;

pub use commodity::Commodity;
pub use dealer::{DealerActivity, Direction};
pub use record::{
    DailyMetalRecord, FieldMask, FileLink, RecordExtras, RecordKey, RecordLinks, RecordPatch, RemoteId, NO_ACTIVITY,
};
pub use stock::StockSnapshot;
