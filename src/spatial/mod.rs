//! In-memory spatial stores, bulk-loaded once at startup and read without
//! locking afterwards.

pub mod garage_index;
pub mod meter_index;
pub mod spot_index;

pub use garage_index::GarageIndex;
pub use meter_index::MeterIndex;
pub use spot_index::SpotIndex;
