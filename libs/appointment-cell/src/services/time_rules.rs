use std::sync::Mutex;

use chrono::{DateTime, Duration, Locale, NaiveDate, NaiveDateTime, Timelike, Utc};

use crate::models::AppointmentError;

// `%.f` also matches an absent fraction; `%#z` takes `Z`, `+00`, `+0000` and `+00:00`.
const OFFSET_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f%#z",
    "%Y-%m-%dT%H:%M%#z",
    "%Y-%m-%d %H:%M:%S%.f%#z",
    "%Y-%m-%d %H:%M%#z",
];

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Truncates minutes, seconds and sub-seconds.
pub fn start_of_hour(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(instant)
}

/// Strict: an instant is never before itself.
pub fn is_before(instant: DateTime<Utc>, other: DateTime<Utc>) -> bool {
    instant < other
}

/// Saturates at the earliest representable instant instead of overflowing.
pub fn sub_hours(instant: DateTime<Utc>, hours: i64) -> DateTime<Utc> {
    Duration::try_hours(hours)
        .and_then(|delta| instant.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Accepts ISO-8601 date-times with or without seconds and offset (`T` or a
/// space between date and time), and bare dates. Missing offsets read as UTC;
/// a bare date is midnight UTC.
pub fn parse_instant(raw: &str) -> Result<DateTime<Utc>, AppointmentError> {
    let raw = raw.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }

    if let Some(parsed) = OFFSET_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(raw, format).ok())
    {
        return Ok(parsed.with_timezone(&Utc));
    }

    if let Some(naive) = NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
    {
        return Ok(naive.and_utc());
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
        .ok_or_else(|| AppointmentError::ValidationError(format!("Invalid date: '{}'", raw)))
}

/// e.g. `dia 01 de junho, às 10:00h`
pub fn format_appointment_date(instant: DateTime<Utc>) -> String {
    instant
        .format_localized("dia %d de %B, às %-H:%Mh", Locale::pt_BR)
        .to_string()
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and simulations.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    #[test]
    fn truncates_to_start_of_hour() {
        let instant = Utc.with_ymd_and_hms(2025, 6, 1, 10, 47, 33).unwrap() + Duration::milliseconds(250);
        assert_eq!(start_of_hour(instant), Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn is_before_is_strict() {
        let instant = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        assert!(!is_before(instant, instant));
        assert!(is_before(instant - Duration::seconds(1), instant));
    }

    #[test]
    fn parses_offset_and_naive_inputs() {
        let expected = Utc.with_ymd_and_hms(2025, 6, 1, 10, 30, 0).unwrap();

        assert_eq!(parse_instant("2025-06-01T10:30:00Z").unwrap(), expected);
        assert_eq!(parse_instant("2025-06-01T07:30:00-03:00").unwrap(), expected);
        assert_eq!(parse_instant("2025-06-01T10:30:00").unwrap(), expected);
        assert_eq!(parse_instant("2025-06-01T10:30").unwrap(), expected);
        assert_eq!(parse_instant("2025-06-01T10:30:00.000").unwrap(), expected);
    }

    #[test]
    fn parses_offsets_without_seconds_or_colon() {
        let ten = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();

        assert_eq!(parse_instant("2025-06-01T10:00Z").unwrap(), ten);
        assert_eq!(parse_instant("2025-06-01T11:00+00:00").unwrap(), ten + Duration::hours(1));
        assert_eq!(parse_instant("2025-06-01T12:00:00+0000").unwrap(), ten + Duration::hours(2));
        assert_eq!(parse_instant("2025-06-01T07:00-03").unwrap(), ten);
        assert_eq!(parse_instant("2025-06-01T10:00:00.500Z").unwrap(), ten + Duration::milliseconds(500));
    }

    #[test]
    fn parses_space_separated_and_date_only_inputs() {
        assert_eq!(
            parse_instant("2025-06-01 13:00:00").unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 1, 13, 0, 0).unwrap()
        );
        assert_eq!(
            parse_instant("2025-06-01 13:15").unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 1, 13, 15, 0).unwrap()
        );
        assert_eq!(
            parse_instant("2025-06-01 13:00:00Z").unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 1, 13, 0, 0).unwrap()
        );
        assert_eq!(
            parse_instant("2025-06-01").unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn sub_hours_saturates_instead_of_panicking() {
        let instant = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();

        assert_eq!(sub_hours(instant, 2), Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap());
        assert_eq!(sub_hours(instant, i64::MAX), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn rejects_unparseable_dates() {
        assert_matches!(parse_instant("tomorrow"), Err(AppointmentError::ValidationError(_)));
        assert_matches!(parse_instant("2025-13-01T10:00:00Z"), Err(AppointmentError::ValidationError(_)));
        assert_matches!(parse_instant(""), Err(AppointmentError::ValidationError(_)));
        assert_matches!(parse_instant("2025-06-01T10"), Err(AppointmentError::ValidationError(_)));
    }

    #[test]
    fn formats_date_in_portuguese() {
        let instant = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        assert_eq!(format_appointment_date(instant), "dia 01 de junho, às 10:00h");

        let morning = Utc.with_ymd_and_hms(2025, 12, 24, 9, 0, 0).unwrap();
        assert_eq!(format_appointment_date(morning), "dia 24 de dezembro, às 9:00h");
    }

    #[test]
    fn fixed_clock_can_be_moved() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let clock = FixedClock::new(start);

        clock.advance(Duration::hours(3));
        assert_eq!(clock.now(), start + Duration::hours(3));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }
}
