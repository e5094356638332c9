//! Cron expression parsing and evaluation.
//!
//! Supports the six-field format `sec min hour day-of-month month day-of-week`
//! with an optional seventh `year` field. Each field accepts `*`, single values,
//! ranges (`a-b`), steps (`a/b`, `*/b`, `a-b/c`) and comma-separated lists.
//! `?` is accepted in day-of-month and day-of-week as "no specific value".
//! Months and weekdays may be written by name (`JAN`, `MON`), and day-of-week
//! accepts 0-7 where both 0 and 7 mean Sunday.
//!
//! A time matches when every field matches. Evaluation is in UTC with one-second
//! resolution.
//!
//! ```
//! use task_lanes::core::CronExpression;
//!
//! // Every five seconds
//! let every_five: CronExpression = "*/5 * * * * *".parse().unwrap();
//!
//! // Weekdays at noon
//! let lunch = CronExpression::parse("0 0 12 ? * MON-FRI").unwrap();
//! # let _ = (every_five, lunch);
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Timelike, Utc};
use thiserror::Error;

/// Earliest year accepted in the year field.
pub const MIN_YEAR: i32 = 1970;
/// Latest year accepted in the year field; the search for a next fire time stops here.
pub const MAX_YEAR: i32 = 2099;

const MONTH_NAMES: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const DAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// Error type for cron parsing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CronError {
    /// Wrong number of whitespace-separated fields.
    #[error("expected 6 or 7 fields, found {0}")]
    FieldCount(usize),
    /// A value could not be parsed.
    #[error("invalid {field} value `{value}`")]
    InvalidValue {
        /// Field being parsed.
        field: CronField,
        /// Offending text.
        value: String,
    },
    /// A value is outside the field's allowed range.
    #[error("{field} value {value} not in range {min}-{max}")]
    OutOfRange {
        /// Field being parsed.
        field: CronField,
        /// Offending value.
        value: i64,
        /// Smallest allowed value.
        min: u32,
        /// Largest allowed value.
        max: u32,
    },
    /// A range whose start exceeds its end.
    #[error("invalid {field} range `{value}`")]
    InvalidRange {
        /// Field being parsed.
        field: CronField,
        /// Offending text.
        value: String,
    },
    /// A zero or malformed step.
    #[error("invalid {field} step `{value}`")]
    InvalidStep {
        /// Field being parsed.
        field: CronField,
        /// Offending text.
        value: String,
    },
    /// `?` outside day-of-month / day-of-week.
    #[error("`?` is only allowed in day-of-month or day-of-week, not {0}")]
    MisplacedQuestionMark(CronField),
    /// The expression is valid but matches no time up to the last supported year.
    #[error("expression never fires after the given time")]
    NoFutureMatch,
}

/// The fields of a cron expression, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CronField {
    /// 0-59
    Second,
    /// 0-59
    Minute,
    /// 0-23
    Hour,
    /// 1-31
    DayOfMonth,
    /// 1-12 or JAN-DEC
    Month,
    /// 0-7 or SUN-SAT
    DayOfWeek,
    /// 1970-2099
    Year,
}

impl CronField {
    const ORDER: [Self; 7] = [
        Self::Second,
        Self::Minute,
        Self::Hour,
        Self::DayOfMonth,
        Self::Month,
        Self::DayOfWeek,
        Self::Year,
    ];

    const fn bounds(self) -> (u32, u32) {
        match self {
            Self::Second | Self::Minute => (0, 59),
            Self::Hour => (0, 23),
            Self::DayOfMonth => (1, 31),
            Self::Month => (1, 12),
            Self::DayOfWeek => (0, 7),
            #[allow(clippy::cast_sign_loss)]
            Self::Year => (MIN_YEAR as u32, MAX_YEAR as u32),
        }
    }

    const fn allows_question_mark(self) -> bool {
        matches!(self, Self::DayOfMonth | Self::DayOfWeek)
    }

    fn names(self) -> &'static [&'static str] {
        match self {
            Self::Month => &MONTH_NAMES,
            Self::DayOfWeek => &DAY_NAMES,
            _ => &[],
        }
    }

    /// Offset added to the index of a name to get its numeric value.
    const fn name_base(self) -> u32 {
        match self {
            Self::Month => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for CronField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Second => "second",
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::DayOfMonth => "day-of-month",
            Self::Month => "month",
            Self::DayOfWeek => "day-of-week",
            Self::Year => "year",
        };
        f.write_str(name)
    }
}

/// Set of allowed values for one of the small fields, as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bits(u64);

impl Bits {
    fn from_values(values: &[u32]) -> Self {
        Self(values.iter().fold(0, |acc, v| acc | (1_u64 << *v)))
    }

    const fn contains(self, value: u32) -> bool {
        value < 64 && self.0 & (1 << value) != 0
    }
}

/// A parsed cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpression {
    source: String,
    seconds: Bits,
    minutes: Bits,
    hours: Bits,
    days_of_month: Bits,
    months: Bits,
    days_of_week: Bits,
    years: Option<BTreeSet<i32>>,
}

impl CronExpression {
    /// Parse a six- or seven-field cron expression.
    ///
    /// # Errors
    ///
    /// Returns a [`CronError`] describing the first field that failed to parse.
    pub fn parse(expr: &str) -> Result<Self, CronError> {
        let parts: Vec<&str> = expr.split_whitespace().collect();
        if !(6..=7).contains(&parts.len()) {
            return Err(CronError::FieldCount(parts.len()));
        }

        let mut parsed: Vec<Vec<u32>> = Vec::with_capacity(parts.len());
        for (field, text) in CronField::ORDER.iter().zip(&parts) {
            parsed.push(parse_field(*field, text)?);
        }

        // Sunday may be written as 7; fold it onto 0.
        let days_of_week: Vec<u32> = parsed[5].iter().map(|d| d % 7).collect();
        let years = (parts.len() == 7 && parts[6] != "*").then(|| {
            parsed[6]
                .iter()
                .filter_map(|y| i32::try_from(*y).ok())
                .collect::<BTreeSet<i32>>()
        });

        Ok(Self {
            source: parts.join(" "),
            seconds: Bits::from_values(&parsed[0]),
            minutes: Bits::from_values(&parsed[1]),
            hours: Bits::from_values(&parsed[2]),
            days_of_month: Bits::from_values(&parsed[3]),
            months: Bits::from_values(&parsed[4]),
            days_of_week: Bits::from_values(&days_of_week),
            years,
        })
    }

    /// The expression text, normalized to single spaces.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Check whether a time (truncated to the second) matches every field.
    #[must_use]
    pub fn matches(&self, dt: &DateTime<Utc>) -> bool {
        self.year_matches(dt.year())
            && self.months.contains(dt.month())
            && self.day_matches(dt.date_naive())
            && self.hours.contains(dt.hour())
            && self.minutes.contains(dt.minute())
            && self.seconds.contains(dt.second())
    }

    /// The smallest matching time strictly greater than `after`, or `None` if the
    /// expression never fires again before the end of [`MAX_YEAR`].
    #[must_use]
    pub fn next_after(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = after.naive_utc().with_nanosecond(0)? + TimeDelta::seconds(1);
        self.next_from(start).map(|naive| Utc.from_utc_datetime(&naive))
    }

    /// Iterator over successive fire times after `after`.
    pub fn upcoming(&self, after: DateTime<Utc>) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        std::iter::successors(self.next_after(&after), move |prev| self.next_after(prev))
    }

    fn year_matches(&self, year: i32) -> bool {
        self.years.as_ref().map_or(true, |years| years.contains(&year))
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        self.days_of_month.contains(date.day())
            && self.days_of_week.contains(date.weekday().num_days_from_sunday())
    }

    /// Walk forward from `t` (inclusive), jumping to the start of the next
    /// candidate unit whenever a coarser field fails to match.
    fn next_from(&self, mut t: NaiveDateTime) -> Option<NaiveDateTime> {
        while t.year() <= MAX_YEAR {
            if !self.year_matches(t.year()) {
                let year = self.next_year_after(t.year())?;
                t = midnight(NaiveDate::from_ymd_opt(year, 1, 1)?)?;
                continue;
            }
            if !self.months.contains(t.month()) {
                t = midnight(first_of_next_month(t.date())?)?;
                continue;
            }
            if !self.day_matches(t.date()) {
                t = midnight(t.date().succ_opt()?)?;
                continue;
            }
            if !self.hours.contains(t.hour()) {
                t = t.date().and_hms_opt(t.hour(), 0, 0)? + TimeDelta::hours(1);
                continue;
            }
            if !self.minutes.contains(t.minute()) {
                t = t.date().and_hms_opt(t.hour(), t.minute(), 0)? + TimeDelta::minutes(1);
                continue;
            }
            if !self.seconds.contains(t.second()) {
                t += TimeDelta::seconds(1);
                continue;
            }
            return Some(t);
        }
        None
    }

    fn next_year_after(&self, year: i32) -> Option<i32> {
        match &self.years {
            Some(years) => years.range(year + 1..).next().copied(),
            None => Some(year + 1),
        }
    }
}

impl FromStr for CronExpression {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn midnight(date: NaiveDate) -> Option<NaiveDateTime> {
    date.and_hms_opt(0, 0, 0)
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDate> {
    if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
    }
}

/// Expand one field into the sorted list of values it allows.
fn parse_field(field: CronField, text: &str) -> Result<Vec<u32>, CronError> {
    let (min, max) = field.bounds();
    let mut values = BTreeSet::new();

    for part in text.split(',') {
        if part == "?" {
            if !field.allows_question_mark() {
                return Err(CronError::MisplacedQuestionMark(field));
            }
            values.extend(min..=max);
            continue;
        }

        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .ok()
                    .filter(|s| *s > 0)
                    .ok_or_else(|| CronError::InvalidStep {
                        field,
                        value: part.to_owned(),
                    })?;
                (range, Some(step))
            }
            None => (part, None),
        };

        let (start, end) = if range == "*" {
            (min, max)
        } else if let Some((lo, hi)) = range.split_once('-') {
            let lo = parse_value(field, lo)?;
            let hi = parse_value(field, hi)?;
            if lo > hi {
                return Err(CronError::InvalidRange {
                    field,
                    value: part.to_owned(),
                });
            }
            (lo, hi)
        } else {
            let value = parse_value(field, range)?;
            // `5/15` means "from 5 every 15"
            (value, if step.is_some() { max } else { value })
        };

        let step = step.unwrap_or(1) as usize;
        values.extend((start..=end).step_by(step));
    }

    Ok(values.into_iter().collect())
}

fn parse_value(field: CronField, text: &str) -> Result<u32, CronError> {
    let (min, max) = field.bounds();
    let upper = text.to_ascii_uppercase();
    if let Some(index) = field.names().iter().position(|name| *name == upper) {
        #[allow(clippy::cast_possible_truncation)]
        return Ok(index as u32 + field.name_base());
    }

    let value: i64 = text.parse().map_err(|_| CronError::InvalidValue {
        field,
        value: text.to_owned(),
    })?;
    match u32::try_from(value) {
        Ok(v) if (min..=max).contains(&v) => Ok(v),
        _ => Err(CronError::OutOfRange {
            field,
            value,
            min,
            max,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_parse_field_count() {
        assert_eq!(CronExpression::parse("* * * * *"), Err(CronError::FieldCount(5)));
        assert_eq!(
            CronExpression::parse("* * * * * * * *"),
            Err(CronError::FieldCount(8))
        );
        assert!(CronExpression::parse("0 0 0 * * ? 2030").is_ok());
    }

    #[test]
    fn test_parse_field_values() {
        assert_eq!(parse_field(CronField::Second, "*/15").unwrap(), vec![0, 15, 30, 45]);
        assert_eq!(parse_field(CronField::Minute, "5/20").unwrap(), vec![5, 25, 45]);
        assert_eq!(parse_field(CronField::Hour, "1-5/2").unwrap(), vec![1, 3, 5]);
        assert_eq!(parse_field(CronField::Month, "JAN,mar,12").unwrap(), vec![1, 3, 12]);
        assert_eq!(parse_field(CronField::DayOfWeek, "MON-FRI").unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            CronExpression::parse("60 * * * * *"),
            Err(CronError::OutOfRange { field: CronField::Second, value: 60, .. })
        ));
        assert!(matches!(
            CronExpression::parse("? * * * * *"),
            Err(CronError::MisplacedQuestionMark(CronField::Second))
        ));
        assert!(matches!(
            CronExpression::parse("*/0 * * * * *"),
            Err(CronError::InvalidStep { .. })
        ));
        assert!(matches!(
            CronExpression::parse("0 10-5 * * * *"),
            Err(CronError::InvalidRange { .. })
        ));
        assert!(matches!(
            CronExpression::parse("0 0 0 L * ?"),
            Err(CronError::InvalidValue { field: CronField::DayOfMonth, .. })
        ));
    }

    #[test]
    fn test_every_five_seconds() {
        let cron = CronExpression::parse("*/5 * * * * *").unwrap();
        assert_eq!(cron.next_after(&at(2026, 10, 16, 12, 0, 3)), Some(at(2026, 10, 16, 12, 0, 5)));
        // strictly after a matching reference
        assert_eq!(cron.next_after(&at(2026, 10, 16, 12, 0, 5)), Some(at(2026, 10, 16, 12, 0, 10)));
        assert_eq!(cron.next_after(&at(2026, 10, 16, 12, 59, 58)), Some(at(2026, 10, 16, 13, 0, 0)));
    }

    #[test]
    fn test_sub_second_reference() {
        let cron = CronExpression::parse("* * * * * *").unwrap();
        let reference = at(2026, 1, 1, 0, 0, 0) + TimeDelta::milliseconds(400);
        assert_eq!(cron.next_after(&reference), Some(at(2026, 1, 1, 0, 0, 1)));
    }

    #[test]
    fn test_rollovers() {
        let new_year = CronExpression::parse("0 0 0 1 1 ?").unwrap();
        assert_eq!(new_year.next_after(&at(2026, 6, 1, 0, 0, 0)), Some(at(2027, 1, 1, 0, 0, 0)));

        let leap_day = CronExpression::parse("0 30 6 29 FEB ?").unwrap();
        assert_eq!(leap_day.next_after(&at(2025, 3, 1, 0, 0, 0)), Some(at(2028, 2, 29, 6, 30, 0)));
    }

    #[test]
    fn test_day_of_week_and_sunday_alias() {
        // 2026-10-16 is a Friday
        let weekdays = CronExpression::parse("0 0 12 ? * MON-FRI").unwrap();
        assert_eq!(weekdays.next_after(&at(2026, 10, 16, 13, 0, 0)), Some(at(2026, 10, 19, 12, 0, 0)));

        let sunday = CronExpression::parse("0 0 9 ? * 7").unwrap();
        assert_eq!(sunday, CronExpression::parse("0 0 9 ? * 0").unwrap().with_source("0 0 9 ? * 7"));
        assert_eq!(sunday.next_after(&at(2026, 10, 16, 0, 0, 0)), Some(at(2026, 10, 18, 9, 0, 0)));
    }

    #[test]
    fn test_both_day_fields_must_match() {
        // Friday the 13th
        let cron = CronExpression::parse("0 0 0 13 * FRI").unwrap();
        assert_eq!(cron.next_after(&at(2026, 1, 1, 0, 0, 0)), Some(at(2026, 2, 13, 0, 0, 0)));
    }

    #[test]
    fn test_year_field() {
        let cron = CronExpression::parse("0 0 0 1 1 ? 2030,2032").unwrap();
        assert_eq!(cron.next_after(&at(2026, 1, 1, 0, 0, 0)), Some(at(2030, 1, 1, 0, 0, 0)));
        assert_eq!(cron.next_after(&at(2030, 1, 1, 0, 0, 0)), Some(at(2032, 1, 1, 0, 0, 0)));
        assert_eq!(cron.next_after(&at(2032, 1, 1, 0, 0, 0)), None);
    }

    #[test]
    fn test_impossible_date_never_fires() {
        let cron = CronExpression::parse("0 0 0 30 2 ?").unwrap();
        assert_eq!(cron.next_after(&at(2026, 1, 1, 0, 0, 0)), None);
    }

    #[test]
    fn test_upcoming_and_display() {
        let cron: CronExpression = "0  */30   * * * *".parse().unwrap();
        assert_eq!(cron.to_string(), "0 */30 * * * *");
        let times: Vec<_> = cron.upcoming(at(2026, 10, 16, 23, 10, 0)).take(3).collect();
        assert_eq!(
            times,
            vec![at(2026, 10, 16, 23, 30, 0), at(2026, 10, 17, 0, 0, 0), at(2026, 10, 17, 0, 30, 0)]
        );
        assert!(cron.matches(&times[1]));
        assert!(!cron.matches(&at(2026, 10, 17, 0, 15, 0)));
    }

    impl CronExpression {
        fn with_source(mut self, source: &str) -> Self {
            source.clone_into(&mut self.source);
            self
        }
    }
}
