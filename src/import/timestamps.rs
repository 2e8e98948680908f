use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeDelta, Utc};

/// Naive layouts seen in broker exports, interpreted as UTC.
/// MT5 writes `2024.03.01 14:05:09`.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y.%m.%d %H:%M:%S%.f",
    "%Y.%m.%d %H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y.%m.%d", "%Y/%m/%d"];

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.and_utc());
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }

    None
}

/// `2024-03-01T14:05:09.000Z`
pub fn to_iso(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_iso() -> String {
    to_iso(Utc::now())
}

/// Recognised timestamps are rewritten as ISO-8601 UTC; anything else is
/// kept as the source wrote it.
pub fn normalize_timestamp(value: &str) -> String {
    match parse_timestamp(value) {
        Some(dt) => to_iso(dt),
        None => value.trim().to_string(),
    }
}

/// Spreadsheet serial date (days since 1899-12-30, fraction = time of day)
pub fn excel_serial_to_iso(serial: f64) -> Option<String> {
    if !serial.is_finite() {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    let dt = base.checked_add_signed(TimeDelta::try_milliseconds(millis)?)?;
    Some(to_iso(dt.and_utc()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc3339_is_converted_to_utc() {
        assert_eq!(
            normalize_timestamp("2024-03-01T16:05:09+02:00"),
            "2024-03-01T14:05:09.000Z"
        );
    }

    #[test]
    fn test_broker_layouts() {
        let expected = "2024-03-01T14:05:09.000Z";
        assert_eq!(normalize_timestamp("2024.03.01 14:05:09"), expected);
        assert_eq!(normalize_timestamp("2024-03-01 14:05:09"), expected);
        assert_eq!(normalize_timestamp("2024/03/01 14:05:09"), expected);
        assert_eq!(normalize_timestamp(" 2024-03-01T14:05:09 "), expected);
        assert_eq!(normalize_timestamp("2024.03.01 14:05"), "2024-03-01T14:05:00.000Z");
        assert_eq!(normalize_timestamp("2024-03-01"), "2024-03-01T00:00:00.000Z");
    }

    #[test]
    fn test_unrecognised_text_is_kept() {
        assert_eq!(normalize_timestamp("yesterday"), "yesterday");
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("2024-13-45").is_none());
    }

    #[test]
    fn test_excel_serial_dates() {
        // 45352 = 2024-03-01, .5 = noon
        assert_eq!(excel_serial_to_iso(45352.5).unwrap(), "2024-03-01T12:00:00.000Z");
        assert!(excel_serial_to_iso(f64::NAN).is_none());
    }
}
