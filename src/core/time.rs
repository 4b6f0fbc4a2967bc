use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, Duration, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

pub(crate) fn primitive_now_utc() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

pub(crate) fn to_primitive_utc(value: OffsetDateTime) -> PrimitiveDateTime {
    let utc = value.to_offset(UtcOffset::UTC);
    PrimitiveDateTime::new(utc.date(), utc.time())
}

pub(crate) fn format_primitive(value: PrimitiveDateTime) -> String {
    value.assume_utc().format(&Rfc3339).unwrap_or_else(|_| value.assume_utc().to_string())
}

/// `YYYY-MM-DD HH:MM`, the form used in reports.
pub(crate) fn format_minutes(value: PrimitiveDateTime) -> String {
    value
        .format(format_description!("[year]-[month]-[day] [hour]:[minute]"))
        .unwrap_or_else(|_| value.to_string())
}

/// Parses a quiz window bound. Naive values are taken as UTC.
///
/// Accepts `YYYY-MM-DD HH:MM`, `YYYY-MM-DDTHH:MM` (both with optional seconds)
/// and RFC 3339 with an explicit offset.
pub(crate) fn parse_datetime(value: &str) -> Option<PrimitiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(parsed) = OffsetDateTime::parse(value, &Rfc3339) {
        return Some(to_primitive_utc(parsed));
    }

    let normalized = value.replacen('T', " ", 1);
    let with_seconds = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let without_seconds = format_description!("[year]-[month]-[day] [hour]:[minute]");

    PrimitiveDateTime::parse(&normalized, with_seconds)
        .or_else(|_| PrimitiveDateTime::parse(&normalized, without_seconds))
        .ok()
}

/// Converts an Excel serial date (days since 1899-12-30, fraction = time of day).
pub(crate) fn from_excel_serial(serial: f64) -> Option<PrimitiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let epoch = PrimitiveDateTime::new(
        Date::from_calendar_date(1899, Month::December, 30).ok()?,
        Time::MIDNIGHT,
    );
    let seconds = (serial * 86_400.0).round() as i64;
    epoch.checked_add(Duration::seconds(seconds))
}

pub(crate) fn remaining_seconds(deadline: PrimitiveDateTime, now: PrimitiveDateTime) -> i64 {
    (deadline - now).whole_seconds().max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn format_primitive_outputs_utc_z() {
        assert_eq!(format_primitive(datetime!(2025-01-02 10:20:30)), "2025-01-02T10:20:30Z");
    }

    #[test]
    fn format_minutes_drops_seconds() {
        assert_eq!(format_minutes(datetime!(2025-03-04 08:05:59)), "2025-03-04 08:05");
    }

    #[test]
    fn parse_datetime_accepts_form_and_iso_inputs() {
        let expected = datetime!(2025-06-01 09:30:00);
        assert_eq!(parse_datetime("2025-06-01 09:30"), Some(expected));
        assert_eq!(parse_datetime("2025-06-01T09:30"), Some(expected));
        assert_eq!(parse_datetime("2025-06-01T09:30:00"), Some(expected));
        assert_eq!(parse_datetime("2025-06-01T11:30:00+02:00"), Some(expected));
        assert_eq!(parse_datetime("2025-06-01T09:30:00Z"), Some(expected));
    }

    #[test]
    fn parse_datetime_rejects_garbage() {
        assert_eq!(parse_datetime(""), None);
        assert_eq!(parse_datetime("tomorrow"), None);
        assert_eq!(parse_datetime("2025-13-01 09:30"), None);
    }

    #[test]
    fn excel_serial_converts_date_and_time() {
        // 45658.5 is 2025-01-01 12:00
        assert_eq!(from_excel_serial(45658.5), Some(datetime!(2025-01-01 12:00:00)));
        assert_eq!(from_excel_serial(-1.0), None);
    }

    #[test]
    fn remaining_seconds_never_negative() {
        let now = datetime!(2025-01-01 12:00:00);
        assert_eq!(remaining_seconds(datetime!(2025-01-01 12:01:00), now), 60);
        assert_eq!(remaining_seconds(datetime!(2025-01-01 11:00:00), now), 0);
    }
}
