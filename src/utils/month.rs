use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};

use crate::error::KizamiError;

use super::time::start_of;

/// A calendar month written as `YYYY-MM`. The only way to obtain one from text is [FromStr],
/// which rejects anything else, so holders never need to re-validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl Display for YearMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl YearMonth {
    pub fn new_opt(year: i32, month: u32) -> Option<YearMonth> {
        if (0..=9999).contains(&year) && (1..=12).contains(&month) {
            Some(YearMonth { year, month })
        } else {
            None
        }
    }

    /// Month `time` falls in, as seen in its own time zone.
    pub fn of<Tz: TimeZone>(time: &DateTime<Tz>) -> YearMonth {
        YearMonth {
            year: time.year(),
            month: time.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn next(&self) -> YearMonth {
        if self.month == 12 {
            YearMonth {
                year: self.year + 1,
                month: 1,
            }
        } else {
            YearMonth {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .expect("YearMonth always holds a valid month")
    }

    /// Half-open UTC range `[start, end)` covering the month in `tz`.
    pub fn range_in<Tz: TimeZone>(&self, tz: &Tz) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = start_of(self.first_day().and_time(chrono::NaiveTime::MIN), tz);
        let end = start_of(self.next().first_day().and_time(chrono::NaiveTime::MIN), tz);
        (start, end)
    }
}

impl FromStr for YearMonth {
    type Err = KizamiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || KizamiError::validation(format!("'{s}' is not a month, expected YYYY-MM"));

        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4
            || month.len() != 2
            || !year.bytes().all(|b| b.is_ascii_digit())
            || !month.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        YearMonth::new_opt(year, month).ok_or_else(invalid)
    }
}
