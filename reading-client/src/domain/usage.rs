use time::Date;

/// Derived consumption of one meter on one local date.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct UsageRecord {
    pub meter_id: i64,
    pub date: Date,
    pub start_reading: f64,
    pub end_reading: f64,
    pub usage_amount: f64,
    pub cost_per_unit: f64,
    pub calculated_cost: f64,
}
