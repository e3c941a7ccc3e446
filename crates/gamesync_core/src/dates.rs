use chrono::{DateTime, NaiveDate, Utc};

/// Storefront release date, e.g. `Sep 17, 2020`.
pub const STORE_DATE_FORMAT: &str = "%b %d, %Y";
/// Storefront release date in day-first locales, e.g. `17 Sep, 2020`.
pub const STORE_DATE_ALT_FORMAT: &str = "%d %b, %Y";
/// Date-only representation used by the workspace database.
pub const WORKSPACE_DATE_FORMAT: &str = "%Y-%m-%d";

const UNANNOUNCED_SENTINEL: &str = "to be announced";

/// Parse a storefront release date into midnight UTC of that day.
///
/// Formats are tried in order: `Mon D, YYYY`, `D Mon, YYYY`, then a bare
/// four-digit year (January 1st of that year). Empty text, the
/// "to be announced" sentinel and anything else return `None`.
pub fn parse_release_date(text: &str) -> Option<DateTime<Utc>> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(UNANNOUNCED_SENTINEL) {
        return None;
    }

    NaiveDate::parse_from_str(trimmed, STORE_DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(trimmed, STORE_DATE_ALT_FORMAT))
        .ok()
        .or_else(|| parse_bare_year(trimmed))
        .and_then(start_of_day)
}

/// Parse a date as stored by the workspace database: either a full RFC 3339
/// timestamp or a plain `YYYY-MM-DD` date.
pub fn parse_workspace_date(text: &str) -> Option<DateTime<Utc>> {
    let trimmed = text.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(timestamp.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(trimmed, WORKSPACE_DATE_FORMAT)
        .ok()
        .and_then(start_of_day)
}

pub fn format_workspace_date(date: DateTime<Utc>) -> String {
    date.format(WORKSPACE_DATE_FORMAT).to_string()
}

fn parse_bare_year(text: &str) -> Option<NaiveDate> {
    if text.len() != 4 || !text.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    let year = text.parse::<i32>().ok()?;
    NaiveDate::from_ymd_opt(year, 1, 1)
}

fn start_of_day(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::*;

    fn utc(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn parses_month_first_format() {
        assert_eq!(parse_release_date("Feb 24, 2017"), Some(utc(2017, 2, 24)));
        assert_eq!(parse_release_date("Mar 5, 2021"), Some(utc(2021, 3, 5)));
    }

    #[test]
    fn parses_day_first_format() {
        assert_eq!(parse_release_date("17 Sep, 2020"), Some(utc(2020, 9, 17)));
        assert_eq!(parse_release_date("3 Nov, 2022"), Some(utc(2022, 11, 3)));
    }

    #[test]
    fn parses_bare_year_as_new_year() {
        assert_eq!(parse_release_date("2026"), Some(utc(2026, 1, 1)));
        assert_eq!(parse_release_date("  2027 "), Some(utc(2027, 1, 1)));
    }

    #[test]
    fn round_trips_every_store_format() {
        let dates = [
            NaiveDate::from_ymd_opt(1998, 11, 19).unwrap(),
            NaiveDate::from_ymd_opt(2020, 2, 29).unwrap(),
            NaiveDate::from_ymd_opt(2024, 12, 1).unwrap(),
        ];
        for date in dates {
            let expected = Some(date.and_hms_opt(0, 0, 0).unwrap().and_utc());
            for format in [STORE_DATE_FORMAT, STORE_DATE_ALT_FORMAT] {
                let text = date.format(format).to_string();
                assert_eq!(parse_release_date(&text), expected, "format {format}: {text}");
            }
        }
        assert_eq!(parse_release_date("2031"), Some(utc(2031, 1, 1)));
    }

    #[test]
    fn unannounced_and_empty_are_not_parseable() {
        for text in ["", "   ", "To be announced", "TO BE ANNOUNCED", "to be announced"] {
            assert_eq!(parse_release_date(text), None, "{text:?}");
        }
    }

    #[test]
    fn unknown_text_is_not_parseable() {
        for text in ["TBA", "Coming soon", "Q3 2025", "20255", "Sep 2020", "31 Feb, 2020"] {
            assert_eq!(parse_release_date(text), None, "{text:?}");
        }
    }

    #[test]
    fn parses_workspace_dates() {
        assert_eq!(
            parse_workspace_date("2017-02-24T00:00:00Z"),
            Some(utc(2017, 2, 24))
        );
        assert_eq!(
            parse_workspace_date("2017-02-24T00:00:00.000+00:00"),
            Some(utc(2017, 2, 24))
        );
        assert_eq!(parse_workspace_date("2017-02-24"), Some(utc(2017, 2, 24)));
        assert_eq!(parse_workspace_date("next tuesday"), None);
    }

    #[test]
    fn formats_workspace_dates_as_plain_dates() {
        assert_eq!(format_workspace_date(utc(2020, 9, 17)), "2020-09-17");
    }
}
