//! Time/calendar normalisation.
//!
//! Every downstream component works on a single numeric axis: seconds since
//! `1970-01-01T00:00:00` *in the source calendar*. Raw calendar strings never
//! leave this module.
//!
//! Decoding is fail-fast. A units/calendar pair that cannot be converted
//! exactly (for example `"months since"` on anything but a 360-day calendar)
//! yields [`TimeDecodeError::UnsupportedCalendar`] and the caller has to supply
//! an explicit timestamp array instead.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{TimeDecodeError, TimeResult};

const SECONDS_PER_DAY: f64 = 86_400.0;

const CUMULATIVE_DAYS_NOLEAP: [i64; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];
const CUMULATIVE_DAYS_LEAP: [i64; 12] = [0, 31, 60, 91, 121, 152, 182, 213, 244, 274, 305, 335];

/// CF calendars understood by the normaliser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Calendar {
    /// `standard`, `gregorian`, `proleptic_gregorian`.
    Gregorian,
    /// `noleap`, `365_day`.
    NoLeap,
    /// `all_leap`, `366_day`.
    AllLeap,
    /// `360_day`.
    Day360,
    /// `julian`.
    Julian,
}

impl FromStr for Calendar {
    type Err = TimeDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "standard" | "gregorian" | "proleptic_gregorian" => Ok(Self::Gregorian),
            "noleap" | "no_leap" | "365_day" => Ok(Self::NoLeap),
            "all_leap" | "366_day" => Ok(Self::AllLeap),
            "360_day" => Ok(Self::Day360),
            "julian" => Ok(Self::Julian),
            other => Err(TimeDecodeError::unsupported_calendar(other, "")),
        }
    }
}

impl fmt::Display for Calendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Gregorian => "gregorian",
            Self::NoLeap => "noleap",
            Self::AllLeap => "all_leap",
            Self::Day360 => "360_day",
            Self::Julian => "julian",
        };
        write!(f, "{}", name)
    }
}

impl Calendar {
    fn is_leap_year(&self, year: i64) -> bool {
        match self {
            Self::Gregorian => (year % 4 == 0 && year % 100 != 0) || year % 400 == 0,
            Self::Julian => year.rem_euclid(4) == 0,
            Self::AllLeap => true,
            Self::NoLeap | Self::Day360 => false,
        }
    }

    fn days_in_month(&self, year: i64, month: u32) -> u32 {
        match self {
            Self::Day360 => 30,
            _ => match month {
                2 if self.is_leap_year(year) => 29,
                2 => 28,
                4 | 6 | 9 | 11 => 30,
                _ => 31,
            },
        }
    }

    /// Days from `1970-01-01` of this calendar to the given date.
    fn days_since_1970(&self, year: i64, month: u32, day: u32) -> TimeResult<i64> {
        if month == 0 || month > 12 || day == 0 || day > self.days_in_month(year, month) {
            return Err(TimeDecodeError::invalid_units(format!(
                "{:04}-{:02}-{:02} is not a valid {} date",
                year, month, day, self
            )));
        }
        let m = (month - 1) as usize;
        let d = day as i64 - 1;
        let days = match self {
            Self::Gregorian => {
                let date = i32::try_from(year)
                    .ok()
                    .and_then(|y| NaiveDate::from_ymd_opt(y, month, day))
                    .ok_or_else(|| {
                        TimeDecodeError::invalid_units(format!("date out of range: year {}", year))
                    })?;
                let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)
                    .ok_or_else(|| TimeDecodeError::invalid_units("epoch out of range"))?;
                date.signed_duration_since(epoch).num_days()
            }
            Self::NoLeap => (year - 1970) * 365 + CUMULATIVE_DAYS_NOLEAP[m] + d,
            Self::AllLeap => (year - 1970) * 366 + CUMULATIVE_DAYS_LEAP[m] + d,
            Self::Day360 => (year - 1970) * 360 + (m as i64) * 30 + d,
            Self::Julian => julian_day_number(year, month, day) - julian_day_number(1970, 1, 1),
        };
        Ok(days)
    }
}

/// Julian day number of a date in the Julian calendar.
fn julian_day_number(year: i64, month: u32, day: u32) -> i64 {
    let a = (14 - month as i64) / 12;
    let y = year + 4800 - a;
    let m = month as i64 + 12 * a - 3;
    day as i64 + (153 * m + 2) / 5 + 365 * y + y.div_euclid(4) - 32083
}

/// Base unit of a CF `"<unit> since <epoch>"` descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Months,
    Years,
}

impl TimeUnit {
    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "s" | "sec" | "secs" | "second" | "seconds" => Some(Self::Seconds),
            "min" | "mins" | "minute" | "minutes" => Some(Self::Minutes),
            "h" | "hr" | "hrs" | "hour" | "hours" => Some(Self::Hours),
            "d" | "day" | "days" => Some(Self::Days),
            "month" | "months" => Some(Self::Months),
            "year" | "years" => Some(Self::Years),
            _ => None,
        }
    }

    /// Length of one unit in seconds, or `None` when the length depends on
    /// the calendar in a way that cannot be decoded exactly.
    pub fn seconds(&self, calendar: Calendar) -> Option<f64> {
        match (self, calendar) {
            (Self::Seconds, _) => Some(1.0),
            (Self::Minutes, _) => Some(60.0),
            (Self::Hours, _) => Some(3_600.0),
            (Self::Days, _) => Some(SECONDS_PER_DAY),
            (Self::Months, Calendar::Day360) => Some(30.0 * SECONDS_PER_DAY),
            (Self::Years, Calendar::Day360) => Some(360.0 * SECONDS_PER_DAY),
            (Self::Months | Self::Years, _) => None,
        }
    }
}

/// A date in an arbitrary calendar (no validation against chrono, so
/// `2001-02-30` is representable for 360-day data).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalendarDate {
    pub year: i64,
    pub month: u32,
    pub day: u32,
    pub seconds_of_day: f64,
}

impl CalendarDate {
    /// Parse `YYYY-MM-DD[( |T)hh:mm[:ss[.fff]]][Z| UTC]`. Padding is optional.
    pub fn parse(s: &str) -> TimeResult<Self> {
        let s = s.trim().trim_end_matches('Z').trim_end_matches("UTC").trim();
        let (date, time) = match s.split_once(|c: char| c == 'T' || c == ' ') {
            Some((d, t)) => (d, Some(t.trim())),
            None => (s, None),
        };

        let invalid = || TimeDecodeError::invalid_units(format!("cannot parse epoch '{}'", s));

        // Leading '-' belongs to the year.
        let (sign, date_body) = match date.strip_prefix('-') {
            Some(rest) => (-1, rest),
            None => (1, date),
        };
        let mut parts = date_body.split('-');
        let year: i64 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let month: u32 = parts.next().map_or(Some(1), |p| p.parse().ok()).ok_or_else(invalid)?;
        let day: u32 = parts.next().map_or(Some(1), |p| p.parse().ok()).ok_or_else(invalid)?;

        let seconds_of_day = match time {
            None | Some("") => 0.0,
            Some(t) => {
                let mut hms = t.split(':');
                let h: f64 = hms.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
                let m: f64 = hms.next().map_or(Some(0.0), |p| p.parse().ok()).ok_or_else(invalid)?;
                let sec: f64 = hms.next().map_or(Some(0.0), |p| p.parse().ok()).ok_or_else(invalid)?;
                h * 3_600.0 + m * 60.0 + sec
            }
        };

        Ok(Self {
            year: sign * year,
            month,
            day,
            seconds_of_day,
        })
    }

    /// Seconds from `1970-01-01T00:00:00` of `calendar` to this date.
    pub fn seconds_since_1970(&self, calendar: Calendar) -> TimeResult<f64> {
        let days = calendar.days_since_1970(self.year, self.month, self.day)?;
        Ok(days as f64 * SECONDS_PER_DAY + self.seconds_of_day)
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.seconds_of_day.round() as u64;
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
            self.year,
            self.month,
            self.day,
            secs / 3_600,
            (secs % 3_600) / 60,
            secs % 60
        )
    }
}

/// A parsed CF units descriptor such as `"days since 1955-01-01 00:00:00"`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeUnits {
    pub unit: TimeUnit,
    pub epoch: CalendarDate,
}

impl FromStr for TimeUnits {
    type Err = TimeDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().splitn(3, char::is_whitespace);
        let unit_str = parts.next().unwrap_or_default();
        let since = parts.next().unwrap_or_default();
        let epoch_str = parts.next().unwrap_or_default();

        if !since.eq_ignore_ascii_case("since") || epoch_str.is_empty() {
            return Err(TimeDecodeError::invalid_units(format!(
                "expected '<unit> since <date>', got '{}'",
                s
            )));
        }

        let unit = TimeUnit::parse(unit_str).ok_or_else(|| {
            TimeDecodeError::invalid_units(format!("unknown time unit '{}'", unit_str))
        })?;

        Ok(Self {
            unit,
            epoch: CalendarDate::parse(epoch_str)?,
        })
    }
}

/// Raw time description as found in a source, before normalisation.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeEncoding {
    /// CF-style offsets with a units string and optional calendar attribute
    /// (absent calendar means `standard`).
    Cf {
        values: Vec<f64>,
        units: String,
        calendar: Option<String>,
    },
    /// Explicit override already expressed in seconds on the common axis.
    Seconds(Vec<f64>),
    /// Absolute UTC timestamps.
    Datetimes(Vec<DateTime<Utc>>),
}

/// What a normalised axis is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeReference {
    /// Decoded from CF units in the given calendar; `origin` is the units epoch.
    Calendar {
        calendar: Calendar,
        origin: CalendarDate,
    },
    /// Supplied by the user. Assumed to already be on the common scale.
    Explicit,
}

/// `[start, end]` of a normalised axis in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeBounds {
    pub start: f64,
    pub end: f64,
}

impl TimeBounds {
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t <= self.end
    }

    pub fn overlaps(&self, other: &TimeBounds) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn span(&self) -> f64 {
        self.end - self.start
    }
}

/// A strictly increasing, normalised time axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeAxis {
    values: Vec<f64>,
    reference: TimeReference,
}

impl TimeAxis {
    /// Decode CF offsets. See the module docs for the fail-fast rules.
    pub fn from_cf(values: &[f64], units: &str, calendar: Option<&str>) -> TimeResult<Self> {
        let calendar_name = calendar.unwrap_or("standard");
        let calendar: Calendar = calendar_name
            .parse()
            .map_err(|_| TimeDecodeError::unsupported_calendar(calendar_name, units))?;
        let parsed: TimeUnits = units.parse()?;

        let unit_seconds = parsed
            .unit
            .seconds(calendar)
            .ok_or_else(|| TimeDecodeError::unsupported_calendar(calendar_name, units))?;
        let offset = parsed.epoch.seconds_since_1970(calendar)?;

        let values = values.iter().map(|v| offset + v * unit_seconds).collect();
        Self::new(
            values,
            TimeReference::Calendar {
                calendar,
                origin: parsed.epoch,
            },
        )
    }

    /// Wrap an explicit timestamp array (seconds on the common axis).
    pub fn from_seconds(values: Vec<f64>) -> TimeResult<Self> {
        Self::new(values, TimeReference::Explicit)
    }

    /// Absolute UTC timestamps, stored as Unix seconds in the Gregorian calendar.
    pub fn from_datetimes(times: &[DateTime<Utc>]) -> TimeResult<Self> {
        let values = times
            .iter()
            .map(|t| t.timestamp() as f64 + f64::from(t.timestamp_subsec_nanos()) * 1e-9)
            .collect();
        let origin = CalendarDate {
            year: 1970,
            month: 1,
            day: 1,
            seconds_of_day: 0.0,
        };
        Self::new(
            values,
            TimeReference::Calendar {
                calendar: Calendar::Gregorian,
                origin,
            },
        )
    }

    fn new(values: Vec<f64>, reference: TimeReference) -> TimeResult<Self> {
        if values.is_empty() {
            return Err(TimeDecodeError::Empty);
        }
        if let Some((index, &value)) = values.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(TimeDecodeError::NonFinite { index, value });
        }
        for (index, pair) in values.windows(2).enumerate() {
            if pair[1].partial_cmp(&pair[0]) != Some(Ordering::Greater) {
                return Err(TimeDecodeError::NonMonotonic {
                    index: index + 1,
                    previous: pair[0],
                    next: pair[1],
                });
            }
        }
        Ok(Self { values, reference })
    }

    /// Concatenate per-file axes into one. All parts must share a reference
    /// calendar and the result must stay strictly increasing.
    pub fn concat(parts: &[TimeAxis]) -> TimeResult<Self> {
        let first = parts.first().ok_or(TimeDecodeError::Empty)?;
        for part in &parts[1..] {
            if !first.is_compatible_with(part) || !part.is_compatible_with(first) {
                return Err(TimeDecodeError::unsupported_calendar(
                    part.calendar_name(),
                    format!("mixed with {}", first.calendar_name()),
                ));
            }
        }
        let values = parts.iter().flat_map(|p| p.values.iter().copied()).collect();
        Self::new(values, first.reference)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn first(&self) -> f64 {
        self.values[0]
    }

    pub fn last(&self) -> f64 {
        self.values[self.values.len() - 1]
    }

    pub fn bounds(&self) -> TimeBounds {
        TimeBounds {
            start: self.first(),
            end: self.last(),
        }
    }

    pub fn reference(&self) -> TimeReference {
        self.reference
    }

    pub fn calendar(&self) -> Option<Calendar> {
        match self.reference {
            TimeReference::Calendar { calendar, .. } => Some(calendar),
            TimeReference::Explicit => None,
        }
    }

    /// Epoch of the source units, when decoded from CF metadata.
    pub fn origin(&self) -> Option<CalendarDate> {
        match self.reference {
            TimeReference::Calendar { origin, .. } => Some(origin),
            TimeReference::Explicit => None,
        }
    }

    fn calendar_name(&self) -> String {
        self.calendar()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "explicit".to_string())
    }

    /// Two axes can be compared numerically when they were decoded in the same
    /// calendar, or when either was supplied explicitly.
    pub fn is_compatible_with(&self, other: &TimeAxis) -> bool {
        match (self.calendar(), other.calendar()) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }

    /// Index of the value equal to `t`, if any.
    pub fn index_of(&self, t: f64) -> Option<usize> {
        self.values.binary_search_by(|v| v.total_cmp(&t)).ok()
    }

    /// Calendar date for a numeric time on a Gregorian axis.
    pub fn datetime_at(&self, t: f64) -> Option<NaiveDateTime> {
        match self.calendar() {
            Some(Calendar::Gregorian) | None => {
                let secs = t.floor();
                let nanos = ((t - secs) * 1e9).round() as u32;
                DateTime::from_timestamp(secs as i64, nanos.min(999_999_999)).map(|dt| dt.naive_utc())
            }
            _ => None,
        }
    }
}

/// Normalise any [`TimeEncoding`] into a [`TimeAxis`].
pub fn normalize(encoding: &TimeEncoding) -> TimeResult<TimeAxis> {
    let axis = match encoding {
        TimeEncoding::Cf {
            values,
            units,
            calendar,
        } => TimeAxis::from_cf(values, units, calendar.as_deref())?,
        TimeEncoding::Seconds(values) => TimeAxis::from_seconds(values.clone())?,
        TimeEncoding::Datetimes(times) => TimeAxis::from_datetimes(times)?,
    };
    tracing::debug!(
        len = axis.len(),
        start = axis.first(),
        end = axis.last(),
        calendar = %axis.calendar_name(),
        "Normalised time axis"
    );
    Ok(axis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_days_since_gregorian() {
        let axis = TimeAxis::from_cf(&[0.0, 1.0], "days since 1970-01-02", None).unwrap();
        assert_eq!(axis.values(), &[86_400.0, 172_800.0]);
        assert_eq!(axis.calendar(), Some(Calendar::Gregorian));
    }

    #[test]
    fn test_months_since_requires_360_day() {
        let err = TimeAxis::from_cf(&[0.0, 30.0], "months since 1955-01-01", None).unwrap_err();
        assert!(matches!(err, TimeDecodeError::UnsupportedCalendar { .. }));

        let err = TimeAxis::from_cf(&[0.0, 1.0], "months since 1955-01-01", Some("noleap"))
            .unwrap_err();
        assert!(matches!(err, TimeDecodeError::UnsupportedCalendar { .. }));

        let axis = TimeAxis::from_cf(&[0.0, 1.0], "months since 1970-01-01", Some("360_day"))
            .unwrap();
        assert_eq!(axis.values(), &[0.0, 30.0 * 86_400.0]);
    }

    #[test]
    fn test_unknown_calendar_is_unsupported() {
        let err = TimeAxis::from_cf(&[0.0], "days since 2000-01-01", Some("none")).unwrap_err();
        assert!(matches!(err, TimeDecodeError::UnsupportedCalendar { .. }));
    }

    #[test]
    fn test_noleap_epoch_offset() {
        // 1971-03-01 is 365 + 59 days after 1970-01-01 without leap days.
        let axis = TimeAxis::from_cf(&[0.0], "hours since 1971-03-01", Some("365_day")).unwrap();
        assert_eq!(axis.first(), (365.0 + 59.0) * 86_400.0);
    }

    #[test]
    fn test_day360_accepts_day_30_in_february() {
        let axis = TimeAxis::from_cf(&[0.0], "days since 1970-02-30", Some("360_day")).unwrap();
        assert_eq!(axis.first(), 59.0 * 86_400.0);

        let err = TimeAxis::from_cf(&[0.0], "days since 1970-02-30", None).unwrap_err();
        assert!(matches!(err, TimeDecodeError::InvalidUnits(_)));
    }

    #[test]
    fn test_julian_epoch_offset() {
        // 1972 is a leap year in the Julian calendar as well.
        let axis = TimeAxis::from_cf(&[0.0], "days since 1973-01-01", Some("julian")).unwrap();
        assert_eq!(axis.first(), (365.0 * 3.0 + 1.0) * 86_400.0);
    }

    #[test]
    fn test_epoch_with_time_of_day() {
        let units: TimeUnits = "seconds since 1970-01-01T06:30:00Z".parse().unwrap();
        assert_eq!(units.unit, TimeUnit::Seconds);
        assert_eq!(units.epoch.seconds_of_day, 6.0 * 3_600.0 + 30.0 * 60.0);

        let units: TimeUnits = "hours since 1990-1-1 0:0:0".parse().unwrap();
        assert_eq!(units.epoch.year, 1990);
    }

    #[test]
    fn test_invalid_units() {
        assert!(matches!(
            TimeAxis::from_cf(&[0.0], "fortnights since 2000-01-01", None),
            Err(TimeDecodeError::InvalidUnits(_))
        ));
        assert!(matches!(
            TimeAxis::from_cf(&[0.0], "days", None),
            Err(TimeDecodeError::InvalidUnits(_))
        ));
    }

    #[test]
    fn test_non_finite_rejected() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = TimeAxis::from_seconds(vec![value]).unwrap_err();
            assert!(matches!(err, TimeDecodeError::NonFinite { index: 0, .. }));
        }
        let err = TimeAxis::from_cf(&[0.0, f64::NAN], "days since 2000-01-01", None).unwrap_err();
        assert!(matches!(err, TimeDecodeError::NonFinite { index: 1, .. }));
    }

    #[test]
    fn test_non_monotonic_rejected() {
        let err = TimeAxis::from_seconds(vec![0.0, 10.0, 10.0]).unwrap_err();
        assert_eq!(
            err,
            TimeDecodeError::NonMonotonic {
                index: 2,
                previous: 10.0,
                next: 10.0
            }
        );
        assert_eq!(TimeAxis::from_seconds(vec![]).unwrap_err(), TimeDecodeError::Empty);
    }

    #[test]
    fn test_concat_and_compatibility() {
        let a = TimeAxis::from_cf(&[0.0, 1.0], "days since 2000-01-01", None).unwrap();
        let b = TimeAxis::from_cf(&[2.0, 3.0], "days since 2000-01-01", Some("gregorian")).unwrap();
        let joined = TimeAxis::concat(&[a.clone(), b]).unwrap();
        assert_eq!(joined.len(), 4);

        let c = TimeAxis::from_cf(&[5.0], "days since 2000-01-01", Some("noleap")).unwrap();
        assert!(!a.is_compatible_with(&c));
        assert!(TimeAxis::concat(&[a.clone(), c]).is_err());

        let explicit = TimeAxis::from_seconds(vec![0.0, 1.0]).unwrap();
        assert!(a.is_compatible_with(&explicit));
    }

    #[test]
    fn test_datetimes_and_back() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 1, 15, 18, 0, 0).unwrap();
        let axis = normalize(&TimeEncoding::Datetimes(vec![t0, t1])).unwrap();
        assert_eq!(axis.last() - axis.first(), 6.0 * 3_600.0);
        assert_eq!(axis.datetime_at(axis.first()), Some(t0.naive_utc()));
    }

    #[test]
    fn test_origin_recorded() {
        let axis = TimeAxis::from_cf(&[0.0], "days since 1955-01-01", None).unwrap();
        assert_eq!(axis.origin().unwrap().to_string(), "1955-01-01T00:00:00");
        assert_eq!(TimeAxis::from_seconds(vec![1.0]).unwrap().origin(), None);
    }
}
