use std::str::FromStr;

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::RotaError;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    #[default]
    Daily,
    Weekly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
        }
    }
}

impl FromStr for Frequency {
    type Err = RotaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            other => Err(RotaError::UnknownFrequency(other.to_string())),
        }
    }
}

/// Set of weekdays a pool may trigger on.
///
/// Serialized as a sorted list of day numbers, Sunday = 0 through Saturday = 6.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const EMPTY: WeekdaySet = WeekdaySet(0);

    pub fn all() -> Self {
        WeekdaySet(0b111_1111)
    }

    pub fn from_days(days: &[u8]) -> Result<Self, RotaError> {
        let mut set = WeekdaySet::EMPTY;
        for &d in days {
            if d > 6 {
                return Err(RotaError::InvalidWeekday(d));
            }
            set.0 |= 1 << d;
        }
        Ok(set)
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= 1 << day.num_days_from_sunday();
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_sunday()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn days(&self) -> Vec<u8> {
        (0..7u8).filter(|d| self.0 & (1 << d) != 0).collect()
    }
}

impl TryFrom<Vec<u8>> for WeekdaySet {
    type Error = RotaError;

    fn try_from(days: Vec<u8>) -> Result<Self, Self::Error> {
        WeekdaySet::from_days(&days)
    }
}

impl From<WeekdaySet> for Vec<u8> {
    fn from(set: WeekdaySet) -> Self {
        set.days()
    }
}

/// Parse a calendar date in `YYYY-MM-DD` form.
pub fn parse_date(s: &str) -> Result<NaiveDate, RotaError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| RotaError::InvalidDate(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekday_set_uses_sunday_zero() {
        let set = WeekdaySet::from_days(&[0, 6]).unwrap();
        assert!(set.contains(Weekday::Sun));
        assert!(set.contains(Weekday::Sat));
        assert!(!set.contains(Weekday::Mon));
        assert_eq!(set.days(), vec![0, 6]);
    }

    #[test]
    fn weekday_set_rejects_out_of_range() {
        assert_eq!(WeekdaySet::from_days(&[1, 7]), Err(RotaError::InvalidWeekday(7)));
    }

    #[test]
    fn weekday_set_ignores_duplicates() {
        let set = WeekdaySet::from_days(&[3, 3, 1]).unwrap();
        assert_eq!(set.days(), vec![1, 3]);
        assert!(!set.is_empty());
        assert!(WeekdaySet::EMPTY.is_empty());
        assert_eq!(WeekdaySet::all().days().len(), 7);
    }

    #[test]
    fn frequency_parses_case_insensitively() {
        assert_eq!("Weekly".parse::<Frequency>().unwrap(), Frequency::Weekly);
        assert_eq!(" daily ".parse::<Frequency>().unwrap(), Frequency::Daily);
        assert!(matches!("monthly".parse::<Frequency>(), Err(RotaError::UnknownFrequency(_))));
    }

    #[test]
    fn parse_date_rejects_garbage() {
        assert_eq!(parse_date("2024-02-29").unwrap(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert!(parse_date("2023-02-29").is_err());
        assert!(parse_date("tomorrow").is_err());
    }
}
