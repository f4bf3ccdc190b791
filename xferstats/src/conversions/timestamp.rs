use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Date and time layouts, most specific first.
///
/// Two-digit years are tried before four-digit ones: `%Y` happily reads `20` as year 20, while
/// `%y` rejects a four-digit year because of the digits it leaves behind. `%.f` makes the
/// fractional seconds optional.
const DATETIME_FORMATS: &[&str] = &[
    "%m/%d/%y %H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%m/%d/%y %H:%M",
    "%m/%d/%Y %H:%M",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%m/%d/%y", "%m/%d/%Y", "%Y-%m-%d", "%Y/%m/%d"];

/// Parses a timestamp in any of the layouts found in transfer logs or passed on the command
/// line.
///
/// Timestamps without an offset are taken as UTC and dates without a time as midnight.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(timestamp.with_timezone(&Utc));
    }

    for format in DATETIME_FORMATS {
        if let Ok(timestamp) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(timestamp.and_utc());
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return date.and_hms_opt(0, 0, 0).map(|midnight| midnight.and_utc());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn parses_us_dates() {
        assert_eq!(
            parse_timestamp("01/02/2020 10:00:00"),
            Some(utc(2020, 1, 2, 10, 0, 0))
        );
        assert_eq!(
            parse_timestamp("01/02/20 10:00:00"),
            Some(utc(2020, 1, 2, 10, 0, 0))
        );
        assert_eq!(
            parse_timestamp("12/31/99 23:59:59"),
            Some(utc(1999, 12, 31, 23, 59, 59))
        );
    }

    #[test]
    fn parses_iso_dates_and_fractions() {
        assert_eq!(
            parse_timestamp("2020-01-02 10:00:00"),
            Some(utc(2020, 1, 2, 10, 0, 0))
        );

        let with_fraction = parse_timestamp("2020-01-02 10:00:00.250").unwrap();
        assert_eq!(with_fraction.timestamp_subsec_millis(), 250);

        assert_eq!(
            parse_timestamp("2020-01-02T10:00:00+02:00"),
            Some(utc(2020, 1, 2, 8, 0, 0))
        );
    }

    #[test]
    fn date_only_means_midnight() {
        assert_eq!(parse_timestamp("2020-01-02"), Some(utc(2020, 1, 2, 0, 0, 0)));
        assert_eq!(parse_timestamp("01/02/2020"), Some(utc(2020, 1, 2, 0, 0, 0)));
    }

    #[test]
    fn rejects_nonsense() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("13/45/2020 10:00:00"), None);
        assert_eq!(parse_timestamp("yesterday"), None);
    }
}
