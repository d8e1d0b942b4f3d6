use std::io::Cursor;

use exif::{Exif, Field, In, Tag, Value};
use time::{macros::format_description, OffsetDateTime, PrimitiveDateTime};

use super::{client::parse_offset, zone::ZoneChain};

/// Placeholder some cameras write when the clock was never set.
pub const UNSET_DATETIME: &str = "0000:00:00 00:00:00";

/// Capture-time related EXIF tags of one image, trimmed, blanks as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureTags {
    pub date_time_original: Option<String>,
    pub date_time_digitized: Option<String>,
    pub date_time: Option<String>,
    pub offset_time_original: Option<String>,
    pub offset_time_digitized: Option<String>,
    pub offset_time: Option<String>,
}

impl CaptureTags {
    /// Read the tags from any container kamadak-exif understands (JPEG, TIFF, HEIF, PNG, WebP).
    pub fn read(image: &[u8]) -> Result<Self, exif::Error> {
        let exif = exif::Reader::new().read_from_container(&mut Cursor::new(image))?;
        Ok(Self::from_exif(&exif))
    }

    fn from_exif(exif: &Exif) -> Self {
        let ascii = |tag: Tag| exif.get_field(tag, In::PRIMARY).and_then(ascii_value);
        Self {
            date_time_original: ascii(Tag::DateTimeOriginal),
            date_time_digitized: ascii(Tag::DateTimeDigitized),
            date_time: ascii(Tag::DateTime),
            offset_time_original: ascii(Tag::OffsetTimeOriginal),
            offset_time_digitized: ascii(Tag::OffsetTimeDigitized),
            offset_time: ascii(Tag::OffsetTime),
        }
    }

    /// The capture instant, or `None` when no date tag holds a usable value.
    ///
    /// Date tags are tried original, digitized, then modification time; the
    /// first well-formed offset tag in the same order wins, otherwise the
    /// zone chain decides.
    pub fn capture_time(&self, zones: &ZoneChain) -> Option<OffsetDateTime> {
        let local = [&self.date_time_original, &self.date_time_digitized, &self.date_time]
            .into_iter()
            .flatten()
            .filter(|raw| raw.as_str() != UNSET_DATETIME)
            .find_map(|raw| parse_exif_datetime(raw))?;

        let offset = [&self.offset_time_original, &self.offset_time_digitized, &self.offset_time]
            .into_iter()
            .flatten()
            .find_map(|raw| parse_offset(raw));

        Some(match offset {
            Some(offset) => local.assume_offset(offset),
            None => zones.localize(local),
        })
    }
}

fn ascii_value(field: &Field) -> Option<String> {
    match &field.value {
        Value::Ascii(parts) => parts
            .first()
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
            .map(|s| s.trim_matches(|c: char| c == '\0' || c.is_whitespace()).to_string())
            .filter(|s| !s.is_empty()),
        _ => None,
    }
}

pub fn parse_exif_datetime(raw: &str) -> Option<PrimitiveDateTime> {
    [
        format_description!("[year]:[month]:[day] [hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
        format_description!("[year]:[month]:[day] [hour]:[minute]:[second].[subsecond]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
    ]
    .iter()
    .find_map(|fmt| PrimitiveDateTime::parse(raw.trim(), fmt).ok())
}
