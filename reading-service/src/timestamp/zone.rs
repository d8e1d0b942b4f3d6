use chrono::{FixedOffset, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeDelta, TimeZone};
use chrono_tz::Tz;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Where naive wall-clock times get their offset from: the configured IANA
/// zone, then the host's zone (when enabled), then UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneChain {
    configured: Option<Tz>,
    system_fallback: bool,
}

impl ZoneChain {
    pub fn new(configured: Option<Tz>, system_fallback: bool) -> Self {
        Self {
            configured,
            system_fallback,
        }
    }

    /// Chain that always lands on UTC.
    pub fn utc() -> Self {
        Self::new(None, false)
    }

    /// Build from the `[time]` config section. An unknown zone name is logged
    /// and skipped so the rest of the chain still applies.
    pub fn from_config(zone: Option<&str>, system_fallback: bool) -> Self {
        let configured = zone.and_then(|name| match name.trim().parse::<Tz>() {
            Ok(tz) => Some(tz),
            Err(e) => {
                tracing::warn!(zone = name, error = %e, "unknown time zone in config, ignoring");
                None
            }
        });
        Self::new(configured, system_fallback)
    }

    pub fn configured(&self) -> Option<Tz> {
        self.configured
    }

    /// Attach an offset to a wall-clock time read from a device or a client.
    pub fn localize(&self, local: PrimitiveDateTime) -> OffsetDateTime {
        let offset = self
            .configured
            .and_then(|tz| offset_for_wall_clock(&tz, local))
            .or_else(|| {
                self.system_fallback
                    .then(|| offset_for_wall_clock(&chrono::Local, local))
                    .flatten()
            })
            .unwrap_or(UtcOffset::UTC);
        local.assume_offset(offset)
    }

    /// Express an absolute instant (file mtime, epoch millis, now) in the chain's zone.
    pub fn at_instant(&self, instant: OffsetDateTime) -> OffsetDateTime {
        let offset = self
            .configured
            .and_then(|tz| offset_at_instant(&tz, instant))
            .or_else(|| {
                self.system_fallback
                    .then(|| offset_at_instant(&chrono::Local, instant))
                    .flatten()
            })
            .unwrap_or(UtcOffset::UTC);
        instant.to_offset(offset)
    }
}

impl Default for ZoneChain {
    fn default() -> Self {
        Self::new(None, true)
    }
}

/// Ambiguous fall-back times take the later (standard time) offset; times
/// inside a spring-forward gap take the offset in force before the gap.
fn offset_for_wall_clock<Z: TimeZone>(zone: &Z, local: PrimitiveDateTime) -> Option<UtcOffset> {
    let naive = to_naive(local)?;
    let offset = match zone.offset_from_local_datetime(&naive) {
        LocalResult::Single(offset) => offset,
        LocalResult::Ambiguous(_, standard) => standard,
        LocalResult::None => zone.offset_from_utc_datetime(&(naive - TimeDelta::hours(24))),
    };
    to_utc_offset(offset.fix())
}

fn offset_at_instant<Z: TimeZone>(zone: &Z, instant: OffsetDateTime) -> Option<UtcOffset> {
    let utc = chrono::DateTime::from_timestamp(instant.unix_timestamp(), instant.nanosecond())?;
    to_utc_offset(zone.offset_from_utc_datetime(&utc.naive_utc()).fix())
}

fn to_utc_offset(fixed: FixedOffset) -> Option<UtcOffset> {
    UtcOffset::from_whole_seconds(fixed.local_minus_utc()).ok()
}

fn to_naive(local: PrimitiveDateTime) -> Option<NaiveDateTime> {
    let date = NaiveDate::from_ymd_opt(
        local.year(),
        u32::from(u8::from(local.month())),
        u32::from(local.day()),
    )?;
    let time = NaiveTime::from_hms_nano_opt(
        u32::from(local.hour()),
        u32::from(local.minute()),
        u32::from(local.second()),
        local.nanosecond(),
    )?;
    Some(NaiveDateTime::new(date, time))
}
