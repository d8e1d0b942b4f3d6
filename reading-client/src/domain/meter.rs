use std::{fmt, str::FromStr};

use time::OffsetDateTime;

/// Liters are billed at this rate unless the owner sets one.
pub const DEFAULT_COST_PER_UNIT: f64 = 0.005;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum MeterType {
    Hot,
    Cold,
}

impl MeterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::Cold => "cold",
        }
    }
}

impl fmt::Display for MeterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeterType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hot" => Ok(Self::Hot),
            "cold" => Ok(Self::Cold),
            other => Err(format!("unknown meter type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Meter {
    pub id: i64,
    pub name: String,
    pub meter_type: MeterType,
    pub user_id: String,
    pub cost_per_unit: f64,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub created_at: OffsetDateTime,
    pub is_active: bool,
}

impl Meter {
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}

#[derive(Debug, Clone)]
pub struct NewMeter {
    pub name: String,
    pub meter_type: MeterType,
    pub user_id: String,
    pub cost_per_unit: f64,
}
