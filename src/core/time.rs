use time::{format_description::well_known::Rfc3339, OffsetDateTime, PrimitiveDateTime, UtcOffset};

pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

pub fn format_offset(value: OffsetDateTime) -> String {
    value.format(&Rfc3339).unwrap_or_else(|_| value.to_string())
}

/// Parses a server timestamp. Accepts RFC 3339 and naive `YYYY-MM-DDTHH:MM:SS[.fff]`
/// values, the latter taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(value) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(value.to_offset(UtcOffset::UTC));
    }

    let naive = time::macros::format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"
    );
    PrimitiveDateTime::parse(raw, naive).ok().map(PrimitiveDateTime::assume_utc)
}

/// Renders a countdown as `MM:SS`; minutes are not wrapped at 60.
pub fn format_countdown(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
