pub mod meter;
pub mod reading;
pub mod usage;

pub use meter::{Meter, MeterType, NewMeter, DEFAULT_COST_PER_UNIT};
pub use reading::{NewReading, Reading};
pub use usage::UsageRecord;
