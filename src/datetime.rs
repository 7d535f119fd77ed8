//! Parsing of configured date-time strings.
//!
//! Policies accept both zoned (`2030-01-01T10:00:00+02:00`, `...Z`) and local
//! (`2030-01-01T10:00:00`) forms. Zoned values always keep their own offset.
//! Local values are interpreted in the configured zone (a fixed offset such
//! as `+02:00`, `UTC`, or a region such as `America/New_York`), defaulting to
//! the system's local zone.

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

const LOCAL_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// A zone in which local date-times are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Fixed(FixedOffset),
    Named(Tz),
}

impl Zone {
    /// The instant of `naive` wall-clock time in this zone.
    ///
    /// Ambiguous times (a DST fall-back) resolve to the earlier instant;
    /// times skipped by a DST gap yield `None`.
    pub fn localize(self, naive: &NaiveDateTime) -> Option<DateTime<Utc>> {
        match self {
            Self::Fixed(offset) => offset
                .from_local_datetime(naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc)),
            Self::Named(tz) => tz
                .from_local_datetime(naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

/// Parse a zone identifier.
///
/// Accepts `UTC`, `GMT`, `Z`, `±HH:MM` offsets (optionally prefixed with
/// `UTC`/`GMT`) and IANA region names.
pub fn parse_zone(zone: &str) -> Option<Zone> {
    let zone = zone.trim();
    match zone.to_ascii_uppercase().as_str() {
        "UTC" | "GMT" | "Z" => FixedOffset::east_opt(0).map(Zone::Fixed),
        _ => {
            let offset = zone
                .strip_prefix("UTC")
                .or_else(|| zone.strip_prefix("GMT"))
                .unwrap_or(zone);
            offset
                .parse::<FixedOffset>()
                .ok()
                .map(Zone::Fixed)
                .or_else(|| zone.parse::<Tz>().ok().map(Zone::Named))
        }
    }
}

/// Parse `value` into an instant.
///
/// `zone` only affects local values. Returns `None` for blank or
/// unparseable input.
pub fn parse_instant(value: &str, zone: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(zoned) = DateTime::parse_from_rfc3339(value) {
        return Some(zoned.with_timezone(&Utc));
    }

    let naive = LOCAL_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;

    let target = match zone.filter(|z| !z.trim().is_empty()) {
        Some(z) => match parse_zone(z) {
            Some(zone) => Some(zone),
            None => {
                tracing::warn!(zone = %z, "Unsupported time zone; using the system zone");
                None
            }
        },
        None => None,
    };

    match target {
        Some(zone) => zone.localize(&naive),
        None => Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_parse_zoned() {
        let instant = parse_instant("2030-01-01T10:00:00+02:00", None).unwrap();
        assert_eq!(instant.to_rfc3339(), "2030-01-01T08:00:00+00:00");
        let utc = parse_instant("2030-01-01T10:00:00Z", None).unwrap();
        assert_eq!(utc.to_rfc3339(), "2030-01-01T10:00:00+00:00");
    }

    #[test]
    fn test_parse_local_with_zone() {
        let instant = parse_instant("2030-01-01T10:00:00", Some("UTC")).unwrap();
        assert_eq!(instant.to_rfc3339(), "2030-01-01T10:00:00+00:00");
        let shifted = parse_instant("2030-01-01T10:00", Some("+05:00")).unwrap();
        assert_eq!(shifted.to_rfc3339(), "2030-01-01T05:00:00+00:00");
        let date_only = parse_instant("2030-01-01", Some("UTC")).unwrap();
        assert_eq!(date_only.to_rfc3339(), "2030-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_zone_leaves_zoned_values_alone() {
        let instant = parse_instant("2030-01-01T10:00:00+02:00", Some("UTC")).unwrap();
        assert_eq!(instant.to_rfc3339(), "2030-01-01T08:00:00+00:00");
        let instant = parse_instant("2030-01-01T10:00:00Z", Some("+05:00")).unwrap();
        assert_eq!(instant.to_rfc3339(), "2030-01-01T10:00:00+00:00");
        let instant = parse_instant("2030-01-01T10:00:00Z", Some("Asia/Tokyo")).unwrap();
        assert_eq!(instant.to_rfc3339(), "2030-01-01T10:00:00+00:00");
    }

    #[test]
    fn test_parse_local_in_named_zone() {
        let winter = parse_instant("2030-01-01T10:00:00", Some("America/New_York")).unwrap();
        assert_eq!(winter.to_rfc3339(), "2030-01-01T15:00:00+00:00");
        let summer = parse_instant("2030-07-01T10:00:00", Some("America/New_York")).unwrap();
        assert_eq!(summer.to_rfc3339(), "2030-07-01T14:00:00+00:00");
    }

    #[test]
    fn test_named_zone_dst_transitions() {
        // 01:30 happens twice on 2030-11-03 in New York; the earlier is EDT
        let ambiguous = parse_instant("2030-11-03T01:30:00", Some("America/New_York")).unwrap();
        assert_eq!(ambiguous.to_rfc3339(), "2030-11-03T05:30:00+00:00");
        // 02:30 is skipped on 2030-03-10
        assert!(parse_instant("2030-03-10T02:30:00", Some("America/New_York")).is_none());
    }

    #[test]
    fn test_parse_local_without_zone_uses_local_time() {
        let now = Local::now().naive_local() + Duration::days(1);
        let formatted = now.format("%Y-%m-%dT%H:%M:%S").to_string();
        let parsed = parse_instant(&formatted, None).unwrap();
        assert!(parsed > Utc::now());
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_instant("", None).is_none());
        assert!(parse_instant("not a date", None).is_none());
        assert!(parse_instant("2030-13-45T00:00:00", Some("UTC")).is_none());
    }

    #[test]
    fn test_parse_zone() {
        let utc = FixedOffset::east_opt(0).map(Zone::Fixed);
        assert_eq!(parse_zone("UTC"), utc);
        assert_eq!(parse_zone("utc"), utc);
        assert_eq!(parse_zone("+02:00"), FixedOffset::east_opt(7200).map(Zone::Fixed));
        assert_eq!(
            parse_zone("UTC-03:00"),
            FixedOffset::west_opt(3 * 3600).map(Zone::Fixed)
        );
        assert_eq!(parse_zone("Europe/Paris"), Some(Zone::Named(chrono_tz::Europe::Paris)));
        assert!(parse_zone("Mars/Olympus_Mons").is_none());
    }
}
