/// Syslog timestamp normalization
///
/// Postfix writes `Sep 17 06:25:01` with neither a year nor a UTC offset.
/// The normalizer supplies both: a reference year and an IANA timezone.

use chrono::{DateTime, Datelike, FixedOffset, LocalResult, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;
use std::sync::OnceLock;

use super::error::TimestampError;

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

const FULL_MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampNormalizer {
    tz: Tz,
    year: i32,
}

impl TimestampNormalizer {
    pub fn new(tz: Tz, year: i32) -> Self {
        Self { tz, year }
    }

    /// Reference year is "now" in the given zone
    pub fn for_current_year(tz: Tz) -> Self {
        let year = Utc::now().with_timezone(&tz).year();
        Self { tz, year }
    }

    /// Build from a timezone name such as `UTC` or `Europe/Paris`
    pub fn from_names(tz_name: &str, year: Option<i32>) -> Result<Self, TimestampError> {
        let tz: Tz = tz_name
            .trim()
            .parse()
            .map_err(|_| TimestampError::UnknownTimezone(tz_name.to_string()))?;

        Ok(match year {
            Some(year) => Self::new(tz, year),
            None => Self::for_current_year(tz),
        })
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// Parse `Month Day HH:MM:SS` into an absolute instant
    pub fn parse(&self, text: &str) -> Result<DateTime<FixedOffset>, TimestampError> {
        static SYSLOG_RE: OnceLock<Regex> = OnceLock::new();

        let re = SYSLOG_RE.get_or_init(|| {
            Regex::new(r"^\s*([A-Za-z]+)\s+(\d{1,2})\s+(\d{1,2}):(\d{1,2}):(\d{1,2})\s*$").unwrap()
        });

        let caps = re
            .captures(text)
            .ok_or_else(|| TimestampError::Unrecognized(text.to_string()))?;

        let month = month_number(&caps[1]).ok_or_else(|| TimestampError::Unrecognized(text.to_string()))?;
        let invalid = || TimestampError::InvalidDate(text.to_string());

        let day: u32 = caps[2].parse().map_err(|_| invalid())?;
        let hour: u32 = caps[3].parse().map_err(|_| invalid())?;
        let minute: u32 = caps[4].parse().map_err(|_| invalid())?;
        let second: u32 = caps[5].parse().map_err(|_| invalid())?;

        let date = NaiveDate::from_ymd_opt(self.year, month, day).ok_or_else(invalid)?;
        let time = NaiveTime::from_hms_opt(hour, minute, second).ok_or_else(invalid)?;
        let local = date.and_time(time);

        let resolved = match self.tz.from_local_datetime(&local) {
            LocalResult::Single(dt) => dt,
            LocalResult::Ambiguous(earliest, _) => earliest,
            LocalResult::None => {
                return Err(TimestampError::NonexistentLocalTime {
                    text: text.to_string(),
                    tz: self.tz.name().to_string(),
                })
            }
        };

        Ok(resolved.with_timezone(&resolved.offset().fix()))
    }
}

fn month_number(name: &str) -> Option<u32> {
    let lower = name.to_ascii_lowercase();
    MONTHS
        .iter()
        .position(|m| *m == lower)
        .or_else(|| FULL_MONTHS.iter().position(|m| *m == lower))
        .map(|idx| idx as u32 + 1)
}
