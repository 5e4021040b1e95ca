use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Unit letter of a timeframe string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Minute,
    Hour,
    Day,
    Week,
    /// Fixed 30-day month
    Month,
}

impl TimeUnit {
    fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'm' => Some(TimeUnit::Minute),
            'h' => Some(TimeUnit::Hour),
            'd' => Some(TimeUnit::Day),
            'w' => Some(TimeUnit::Week),
            'M' => Some(TimeUnit::Month),
            _ => None,
        }
    }

    fn letter(self) -> char {
        match self {
            TimeUnit::Minute => 'm',
            TimeUnit::Hour => 'h',
            TimeUnit::Day => 'd',
            TimeUnit::Week => 'w',
            TimeUnit::Month => 'M',
        }
    }

    fn minutes(self) -> i64 {
        match self {
            TimeUnit::Minute => 1,
            TimeUnit::Hour => 60,
            TimeUnit::Day => 24 * 60,
            TimeUnit::Week => 7 * 24 * 60,
            TimeUnit::Month => 30 * 24 * 60,
        }
    }
}

/// Longest accepted timeframe, ten years of minutes
const MAX_MINUTES: i64 = 10 * 365 * 24 * 60;

/// Bar sampling duration, written as count + unit letter ("15m", "1h", "1d", "1w", "1M")
///
/// The string form doubles as the column prefix of everything computed on that timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timeframe {
    count: u32,
    unit: TimeUnit,
}

impl Timeframe {
    pub const FIFTEEN_MINUTES: Timeframe = Timeframe {
        count: 15,
        unit: TimeUnit::Minute,
    };
    pub const ONE_HOUR: Timeframe = Timeframe {
        count: 1,
        unit: TimeUnit::Hour,
    };
    pub const ONE_DAY: Timeframe = Timeframe {
        count: 1,
        unit: TimeUnit::Day,
    };

    pub fn new(count: u32, unit: TimeUnit) -> Result<Self> {
        if count == 0 {
            return Err(Error::Config("timeframe count must be positive".to_string()));
        }
        if count as i64 * unit.minutes() > MAX_MINUTES {
            return Err(Error::Config(format!(
                "timeframe {}{} is longer than ten years",
                count,
                unit.letter()
            )));
        }
        Ok(Self { count, unit })
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    pub fn minutes(&self) -> i64 {
        self.count as i64 * self.unit.minutes()
    }

    pub fn duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.minutes())
    }

    /// Whether bar boundaries fall on multiples of the duration since the Unix epoch.
    /// Weekly and monthly bars follow the calendar instead.
    pub fn is_epoch_aligned(&self) -> bool {
        matches!(
            self.unit,
            TimeUnit::Minute | TimeUnit::Hour | TimeUnit::Day
        )
    }
}

impl FromStr for Timeframe {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::Config(format!("invalid timeframe '{}'", s));

        let letter = s.chars().last().ok_or_else(invalid)?;
        let unit = TimeUnit::from_letter(letter).ok_or_else(invalid)?;
        let digits = &s[..s.len() - letter.len_utf8()];

        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let count: u32 = digits.parse().map_err(|_| invalid())?;
        Timeframe::new(count, unit).map_err(|_| invalid())
    }
}

impl TryFrom<String> for Timeframe {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(value: Timeframe) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.unit.letter())
    }
}

impl Ord for Timeframe {
    fn cmp(&self, other: &Self) -> Ordering {
        self.minutes()
            .cmp(&other.minutes())
            .then_with(|| self.unit.minutes().cmp(&other.unit.minutes()))
    }
}

impl PartialOrd for Timeframe {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_common_timeframes() {
        let tf: Timeframe = "15m".parse().unwrap();
        assert_eq!(tf.minutes(), 15);
        assert_eq!(tf.to_string(), "15m");

        assert_eq!("1h".parse::<Timeframe>().unwrap().minutes(), 60);
        assert_eq!("4h".parse::<Timeframe>().unwrap().minutes(), 240);
        assert_eq!("1d".parse::<Timeframe>().unwrap().minutes(), 1440);
        assert_eq!("1w".parse::<Timeframe>().unwrap().minutes(), 10080);
        assert_eq!("1M".parse::<Timeframe>().unwrap().minutes(), 43200);
    }

    #[test]
    fn test_rejects_invalid_strings() {
        for bad in ["", "m", "15", "15x", "0m", "-5m", "+5m", "1.5h", "15 m", "é"] {
            let result = bad.parse::<Timeframe>();
            assert!(
                matches!(result, Err(Error::Config(_))),
                "'{}' should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_rejects_oversized_counts() {
        for bad in ["4294967295M", "4294967296m", "600M", "9999999w"] {
            assert!(bad.parse::<Timeframe>().is_err(), "'{}' should be rejected", bad);
        }
        assert!(Timeframe::new(u32::MAX, TimeUnit::Minute).is_err());
        assert_eq!("120M".parse::<Timeframe>().unwrap().duration().num_days(), 3600);
    }

    #[test]
    fn test_ordering_by_duration() {
        let short: Timeframe = "15m".parse().unwrap();
        let medium: Timeframe = "1h".parse().unwrap();
        let long: Timeframe = "1d".parse().unwrap();

        assert!(short < medium);
        assert!(medium < long);

        let mut frames = vec![long, short, medium];
        frames.sort();
        assert_eq!(frames, vec![short, medium, long]);
    }

    #[test]
    fn test_same_duration_different_units_are_distinct() {
        let sixty: Timeframe = "60m".parse().unwrap();
        let hour: Timeframe = "1h".parse().unwrap();
        assert_ne!(sixty, hour);
        assert_ne!(sixty.cmp(&hour), Ordering::Equal);
    }

    #[test]
    fn test_epoch_alignment() {
        assert!("15m".parse::<Timeframe>().unwrap().is_epoch_aligned());
        assert!("1d".parse::<Timeframe>().unwrap().is_epoch_aligned());
        assert!(!"1w".parse::<Timeframe>().unwrap().is_epoch_aligned());
        assert!(!"1M".parse::<Timeframe>().unwrap().is_epoch_aligned());
    }

    #[test]
    fn test_serde_uses_string_form() {
        let tf: Timeframe = serde_json::from_str("\"4h\"").unwrap();
        assert_eq!(tf.minutes(), 240);
        assert_eq!(serde_json::to_string(&tf).unwrap(), "\"4h\"");
        assert!(serde_json::from_str::<Timeframe>("\"4x\"").is_err());
    }
}
