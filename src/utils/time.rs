/*!
 * Time & Locale Layer
 *
 * Pure conversions between UTC instants and clinic-local civil time, plus
 * the fixed spoken-date grammar used by the voice webhooks.
 *
 * All persisted times are UTC; the clinic's IANA timezone is applied only
 * at the formatting boundary. Civil times that fall in a DST gap are
 * rejected; times in a DST fold resolve to the earlier offset.
 */

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

use crate::utils::errors::{AppError, ErrorCode, Result};

/// Parse an ISO-8601 instant from the PMS (`Z` suffix or numeric offset)
/// and convert to UTC
pub fn parse_pms_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            AppError::new(
                ErrorCode::InvalidTime,
                format!("unparseable PMS timestamp '{}': {}", s, e),
            )
        })
}

/// Normalize a possibly-naive timestamp string to UTC.
///
/// Aware instants are converted; naive instants are interpreted in
/// `default_tz`. Fails only on malformed input.
pub fn ensure_utc(s: &str, default_tz: Tz) -> Result<DateTime<Utc>> {
    if let Ok(aware) = DateTime::parse_from_rfc3339(s) {
        return Ok(aware.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M"))
        .map_err(|e| {
            AppError::new(
                ErrorCode::InvalidTime,
                format!("unparseable timestamp '{}': {}", s, e),
            )
        })?;

    match default_tz.from_local_datetime(&naive) {
        LocalResult::Single(t) => Ok(t.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        // DST gap: roll forward an hour, which always lands on a valid time
        LocalResult::None => {
            let shifted = naive + Duration::hours(1);
            match default_tz.from_local_datetime(&shifted) {
                LocalResult::Single(t) | LocalResult::Ambiguous(t, _) => {
                    Ok(t.with_timezone(&Utc))
                }
                LocalResult::None => Err(AppError::new(
                    ErrorCode::InvalidTime,
                    format!("unresolvable local time '{}'", s),
                )),
            }
        }
    }
}

/// Convert a clinic-local civil datetime to UTC.
///
/// DST gap -> `invalid_time`; DST fold -> earlier offset.
pub fn local_to_utc(civil: NaiveDateTime, tz: Tz) -> Result<DateTime<Utc>> {
    match tz.from_local_datetime(&civil) {
        LocalResult::Single(t) => Ok(t.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => Err(AppError::new(
            ErrorCode::InvalidTime,
            format!("{} does not exist in {}", civil, tz.name()),
        )),
    }
}

/// Convert a UTC instant to clinic-local civil time
pub fn utc_to_local(utc: DateTime<Utc>, tz: Tz) -> NaiveDateTime {
    utc.with_timezone(&tz).naive_local()
}

/// Construct a UTC instant from clinic-local civil components.
///
/// Undefined civil times (DST gap) fail with `invalid_time`; ambiguous
/// times (DST fold) resolve to the earlier offset.
pub fn combine_date_time_local(
    date: NaiveDate,
    hour: u32,
    minute: u32,
    tz: Tz,
) -> Result<DateTime<Utc>> {
    let civil = date.and_hms_opt(hour, minute, 0).ok_or_else(|| {
        AppError::new(
            ErrorCode::InvalidTime,
            format!("{:02}:{:02} is not a valid time of day", hour, minute),
        )
    })?;

    local_to_utc(civil, tz)
}

/// Format a UTC instant as voice-ready `h:mm AM/PM` in the clinic timezone
pub fn format_time_for_voice(utc: DateTime<Utc>, tz: Tz) -> String {
    utc.with_timezone(&tz).format("%-I:%M %p").to_string()
}

/// Format a UTC instant's date with day-of-week phrasing for TTS,
/// e.g. "Wednesday, 16 July"
pub fn format_date_for_voice(utc: DateTime<Utc>, tz: Tz) -> String {
    utc.with_timezone(&tz).format("%A, %-d %B").to_string()
}

/// Full voice phrasing: "10:00 AM on Wednesday, 16 July"
pub fn format_for_voice(utc: DateTime<Utc>, tz: Tz) -> String {
    format!(
        "{} on {}",
        format_time_for_voice(utc, tz),
        format_date_for_voice(utc, tz)
    )
}

/// Resolve a clinic's IANA timezone, falling back to the configured
/// default (with a warning) on a missing or invalid value
pub fn get_clinic_timezone(tz_name: Option<&str>, default_tz: Tz) -> Tz {
    match tz_name {
        Some(name) => match name.parse::<Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                tracing::warn!(
                    timezone = name,
                    fallback = default_tz.name(),
                    "Clinic has an invalid timezone, using default"
                );
                default_tz
            }
        },
        None => {
            tracing::warn!(
                fallback = default_tz.name(),
                "Clinic has no timezone configured, using default"
            );
            default_tz
        }
    }
}

/// Parse a spoken date against the fixed grammar.
///
/// Accepted: a `YYYY-MM-DD` literal, `today`, `tomorrow`, a weekday name
/// (next occurrence, with today preserved), or `next <weekday>` (the
/// occurrence at least seven days away). Anything else is `invalid_date`.
/// `today` is the clinic-local current date, passed in so the function
/// stays pure.
pub fn parse_spoken_date(input: &str, today: NaiveDate) -> Result<NaiveDate> {
    let trimmed = input.trim().to_lowercase();

    if trimmed.is_empty() {
        return Err(AppError::new(ErrorCode::InvalidDate, "empty date"));
    }

    if let Ok(date) = NaiveDate::parse_from_str(&trimmed, "%Y-%m-%d") {
        return Ok(date);
    }

    match trimmed.as_str() {
        "today" => return Ok(today),
        "tomorrow" => return Ok(today + Duration::days(1)),
        _ => {}
    }

    if let Some(rest) = trimmed.strip_prefix("next ") {
        let weekday = parse_weekday(rest.trim())
            .ok_or_else(|| invalid_date(input))?;
        let ahead = days_until(today.weekday(), weekday);
        // "next <weekday>" means the occurrence at least a week out
        let ahead = if ahead == 0 { 7 } else { ahead + 7 };
        return Ok(today + Duration::days(ahead));
    }

    if let Some(weekday) = parse_weekday(&trimmed) {
        let ahead = days_until(today.weekday(), weekday);
        return Ok(today + Duration::days(ahead));
    }

    Err(invalid_date(input))
}

/// Parse a spoken or literal time of day: `HH:MM`, `h:MM AM/PM`, or `h AM/PM`
pub fn parse_spoken_time(input: &str) -> Result<(u32, u32)> {
    let trimmed = input.trim().to_uppercase();

    for format in ["%H:%M", "%I:%M %p", "%I%p", "%I %p"] {
        if let Ok(t) = chrono::NaiveTime::parse_from_str(&trimmed, format) {
            use chrono::Timelike;
            return Ok((t.hour(), t.minute()));
        }
    }

    Err(AppError::new(
        ErrorCode::InvalidTime,
        format!("unparseable time '{}'", input),
    ))
}

fn invalid_date(input: &str) -> AppError {
    AppError::new(
        ErrorCode::InvalidDate,
        format!("'{}' is outside the supported date grammar", input),
    )
}

fn parse_weekday(s: &str) -> Option<Weekday> {
    match s {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Days from `from` to the next occurrence of `to`; zero when equal
fn days_until(from: Weekday, to: Weekday) -> i64 {
    let from = from.num_days_from_monday() as i64;
    let to = to.num_days_from_monday() as i64;
    (to - from).rem_euclid(7)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Australia::Sydney;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_pms_time_z_and_offset() {
        let z = parse_pms_time("2025-07-16T00:00:00Z").unwrap();
        let offset = parse_pms_time("2025-07-16T10:00:00+10:00").unwrap();
        assert_eq!(z.to_rfc3339(), "2025-07-16T00:00:00+00:00");
        assert_eq!(offset.to_rfc3339(), "2025-07-16T00:00:00+00:00");
    }

    #[test]
    fn test_parse_pms_time_malformed() {
        assert!(parse_pms_time("16/07/2025").is_err());
    }

    #[test]
    fn test_ensure_utc_naive_uses_default_timezone() {
        // Sydney is UTC+10 in July (no DST)
        let t = ensure_utc("2025-07-16T10:00:00", Sydney).unwrap();
        assert_eq!(t.to_rfc3339(), "2025-07-16T00:00:00+00:00");
    }

    #[test]
    fn test_ensure_utc_aware_is_converted() {
        let t = ensure_utc("2025-07-16T10:00:00+10:00", Sydney).unwrap();
        assert_eq!(t.to_rfc3339(), "2025-07-16T00:00:00+00:00");
    }

    #[test]
    fn test_local_utc_round_trip() {
        let utc = Utc.with_ymd_and_hms(2025, 7, 16, 0, 0, 0).unwrap();
        let local = utc_to_local(utc, Sydney);
        assert_eq!(local_to_utc(local, Sydney).unwrap(), utc);
    }

    #[test]
    fn test_combine_dst_gap_fails() {
        // DST starts 2025-10-05 in Sydney; 02:30 does not exist
        let result = combine_date_time_local(date(2025, 10, 5), 2, 30, Sydney);
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().code, ErrorCode::InvalidTime);
    }

    #[test]
    fn test_combine_dst_fold_takes_earlier_offset() {
        // DST ends 2025-04-06 in Sydney; 02:30 occurs twice. The earlier
        // occurrence is AEDT (+11:00).
        let t = combine_date_time_local(date(2025, 4, 6), 2, 30, Sydney).unwrap();
        assert_eq!(t.to_rfc3339(), "2025-04-05T15:30:00+00:00");
    }

    #[test]
    fn test_format_for_voice() {
        let utc = Utc.with_ymd_and_hms(2025, 7, 16, 0, 0, 0).unwrap();
        assert_eq!(format_time_for_voice(utc, Sydney), "10:00 AM");
        assert_eq!(format_date_for_voice(utc, Sydney), "Wednesday, 16 July");
    }

    #[test]
    fn test_get_clinic_timezone_fallback() {
        assert_eq!(
            get_clinic_timezone(Some("Australia/Melbourne"), Sydney).name(),
            "Australia/Melbourne"
        );
        assert_eq!(get_clinic_timezone(Some("Mars/Olympus"), Sydney), Sydney);
        assert_eq!(get_clinic_timezone(None, Sydney), Sydney);
    }

    #[test]
    fn test_spoken_date_literals() {
        let today = date(2025, 7, 16); // a Wednesday
        assert_eq!(parse_spoken_date("2025-08-01", today).unwrap(), date(2025, 8, 1));
        assert_eq!(parse_spoken_date("today", today).unwrap(), today);
        assert_eq!(parse_spoken_date("Tomorrow", today).unwrap(), date(2025, 7, 17));
    }

    #[test]
    fn test_spoken_date_weekdays() {
        let today = date(2025, 7, 16); // Wednesday
        // Same weekday is preserved as today
        assert_eq!(parse_spoken_date("wednesday", today).unwrap(), today);
        // Friday is two days out
        assert_eq!(parse_spoken_date("friday", today).unwrap(), date(2025, 7, 18));
        // Monday wraps to next week
        assert_eq!(parse_spoken_date("monday", today).unwrap(), date(2025, 7, 21));
    }

    #[test]
    fn test_spoken_date_next_weekday() {
        let today = date(2025, 7, 16); // Wednesday
        // "next wednesday" is a week out, not today
        assert_eq!(
            parse_spoken_date("next wednesday", today).unwrap(),
            date(2025, 7, 23)
        );
        // "next friday" is nine days out (>= 7)
        assert_eq!(
            parse_spoken_date("next friday", today).unwrap(),
            date(2025, 7, 25)
        );
    }

    #[test]
    fn test_spoken_date_rejects_everything_else() {
        let today = date(2025, 7, 16);
        for input in ["someday", "16/07/2025", "July 16", "", "in two weeks"] {
            let err = parse_spoken_date(input, today).unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidDate, "input {:?}", input);
        }
    }

    #[test]
    fn test_parse_spoken_time() {
        assert_eq!(parse_spoken_time("10:00").unwrap(), (10, 0));
        assert_eq!(parse_spoken_time("2:30 PM").unwrap(), (14, 30));
        assert_eq!(parse_spoken_time("9 am").unwrap(), (9, 0));
        assert!(parse_spoken_time("half past ten").is_err());
    }
}
