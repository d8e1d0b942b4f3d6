use time::{
    format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime,
    PrimitiveDateTime, Time, UtcOffset,
};

use super::zone::ZoneChain;

/// Capture hints a browser can send alongside the photo.
///
/// All values arrive as raw form strings; blank values count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientHints {
    /// ISO-8601 capture time, e.g. `2024-01-05 10:00:00` or `2024-01-05T10:00:00+02:00`.
    pub iso_timestamp: Option<String>,
    /// Offset of the client's clock, `±HH:MM`.
    pub tz_offset: Option<String>,
    /// `File.lastModified` in epoch milliseconds.
    pub last_modified_ms: Option<String>,
}

impl ClientHints {
    pub fn offset(&self) -> Option<UtcOffset> {
        self.tz_offset.as_deref().and_then(parse_offset)
    }
}

/// Parse a strict `±HH:MM` offset. Anything else is `None`.
pub fn parse_offset(raw: &str) -> Option<UtcOffset> {
    let b = raw.trim().as_bytes();
    if b.len() != 6 || b[3] != b':' {
        return None;
    }
    let sign: i8 = match b[0] {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    if ![b[1], b[2], b[4], b[5]].iter().all(u8::is_ascii_digit) {
        return None;
    }

    let hours = ((b[1] - b'0') * 10 + (b[2] - b'0')) as i8;
    let minutes = ((b[4] - b'0') * 10 + (b[5] - b'0')) as i8;
    if hours > 23 || minutes > 59 {
        return None;
    }
    UtcOffset::from_hms(sign * hours, sign * minutes, 0).ok()
}

/// A zone suffix is a trailing `Z` or any sign after the date part.
fn has_explicit_zone(ts: &str) -> bool {
    let tail = ts.get(10..).unwrap_or("");
    tail.ends_with(['Z', 'z']) || tail.contains(['+', '-'])
}

/// Resolve a client-reported ISO timestamp.
///
/// Without a zone suffix the string takes the client offset; failing that,
/// the zone chain.
pub fn parse_client_iso(raw: &str, client_offset: Option<UtcOffset>, zones: &ZoneChain) -> Option<OffsetDateTime> {
    let mut ts = raw.trim().replace(' ', "T");
    if ts.is_empty() {
        return None;
    }

    if has_explicit_zone(&ts) {
        if ts.ends_with(['Z', 'z']) {
            ts.pop();
            ts.push_str("+00:00");
        }
        return parse_aware(&ts);
    }

    let naive = parse_naive(&ts)?;
    Some(match client_offset {
        Some(offset) => naive.assume_offset(offset),
        None => zones.localize(naive),
    })
}

/// Resolve `File.lastModified` milliseconds, shown at the client offset when known.
pub fn parse_last_modified(raw_ms: &str, client_offset: Option<UtcOffset>, zones: &ZoneChain) -> Option<OffsetDateTime> {
    let raw_ms = raw_ms.trim();
    let ms = raw_ms.parse::<i64>().ok().or_else(|| {
        raw_ms
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| v as i64)
    })?;
    let instant = OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).ok()?;

    Some(match client_offset {
        Some(offset) => instant.to_offset(offset),
        None => zones.at_instant(instant),
    })
}

fn parse_aware(ts: &str) -> Option<OffsetDateTime> {
    if let Ok(parsed) = OffsetDateTime::parse(ts, &Rfc3339) {
        return Some(parsed);
    }
    [
        format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond][offset_hour sign:mandatory]:[offset_minute]"
        ),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][offset_hour sign:mandatory]:[offset_minute]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][offset_hour sign:mandatory][offset_minute]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute][offset_hour sign:mandatory]:[offset_minute]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond][offset_hour sign:mandatory]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][offset_hour sign:mandatory]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute][offset_hour sign:mandatory]"),
    ]
    .iter()
    .find_map(|fmt| OffsetDateTime::parse(ts, fmt).ok())
}

fn parse_naive(ts: &str) -> Option<PrimitiveDateTime> {
    let parsed = [
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]"),
    ]
    .iter()
    .find_map(|fmt| PrimitiveDateTime::parse(ts, fmt).ok());

    parsed.or_else(|| {
        Date::parse(ts, format_description!("[year]-[month]-[day]"))
            .ok()
            .map(|date| date.with_time(Time::MIDNIGHT))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{datetime, offset};

    #[test]
    fn offsets_must_be_signed_hours_colon_minutes() {
        assert_eq!(parse_offset("+02:00"), Some(offset!(+02:00)));
        assert_eq!(parse_offset("-05:30"), Some(offset!(-05:30)));
        assert_eq!(parse_offset(" +00:00 "), Some(UtcOffset::UTC));
        for bad in ["", "02:00", "+2:00", "+0200", "+02-00", "+24:00", "+02:60", "UTC", "+0a:00"] {
            assert_eq!(parse_offset(bad), None, "{bad:?} should be rejected");
        }
    }

    #[test]
    fn naive_iso_takes_client_offset() {
        let ts = parse_client_iso("2024-01-05 10:00:00", parse_offset("+02:00"), &ZoneChain::utc());
        assert_eq!(ts, Some(datetime!(2024-01-05 10:00:00 +02:00)));
    }

    #[test]
    fn explicit_zone_wins_over_client_offset() {
        let zones = ZoneChain::utc();
        assert_eq!(
            parse_client_iso("2024-01-05T10:00:00-03:00", parse_offset("+02:00"), &zones),
            Some(datetime!(2024-01-05 10:00:00 -03:00))
        );
        assert_eq!(
            parse_client_iso("2024-01-05T10:00:00.250Z", None, &zones),
            Some(datetime!(2024-01-05 10:00:00.25 UTC))
        );
    }

    #[test]
    fn hour_only_offset_suffix_is_accepted() {
        let zones = ZoneChain::utc();
        assert_eq!(
            parse_client_iso("2024-01-05T10:00:00+02", None, &zones),
            Some(datetime!(2024-01-05 10:00:00 +02:00))
        );
        assert_eq!(
            parse_client_iso("2024-01-05 10:00:00.5-05", parse_offset("+02:00"), &zones),
            Some(datetime!(2024-01-05 10:00:00.5 -05:00))
        );
        assert_eq!(
            parse_client_iso("2024-01-05T10:00+02", None, &zones),
            Some(datetime!(2024-01-05 10:00:00 +02:00))
        );
    }

    #[test]
    fn naive_iso_without_offset_uses_zone_chain() {
        let zones = ZoneChain::from_config(Some("Europe/Warsaw"), false);
        assert_eq!(
            parse_client_iso("2024-01-05T10:00", None, &zones),
            Some(datetime!(2024-01-05 10:00:00 +01:00))
        );
        assert_eq!(
            parse_client_iso("2024-01-05", None, &ZoneChain::utc()),
            Some(datetime!(2024-01-05 00:00:00 UTC))
        );
    }

    #[test]
    fn garbage_iso_is_none() {
        let zones = ZoneChain::utc();
        assert_eq!(parse_client_iso("", None, &zones), None);
        assert_eq!(parse_client_iso("yesterday", None, &zones), None);
        assert_eq!(parse_client_iso("2024-13-05 10:00:00", None, &zones), None);
        assert_eq!(parse_client_iso("2024-01-05T10:00:00+2", None, &zones), None);
    }

    #[test]
    fn last_modified_is_an_instant() {
        // 2024-01-05T08:00:00Z
        let ts = parse_last_modified("1704441600000", parse_offset("+02:00"), &ZoneChain::utc()).unwrap();
        assert_eq!(ts, datetime!(2024-01-05 10:00:00 +02:00));
        assert_eq!(ts.offset(), offset!(+02:00));

        let ts = parse_last_modified("1704441600000.0", None, &ZoneChain::utc()).unwrap();
        assert_eq!(ts, datetime!(2024-01-05 08:00:00 UTC));
        assert_eq!(parse_last_modified("soon", None, &ZoneChain::utc()), None);
    }

    #[test]
    fn hints_offset_needs_full_form() {
        let mut hints = ClientHints {
            iso_timestamp: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(hints.offset(), None);
        hints.tz_offset = Some("+01".to_string());
        assert_eq!(hints.offset(), None);
        hints.tz_offset = Some("+01:00".to_string());
        assert_eq!(hints.offset(), Some(offset!(+01:00)));
    }
}
