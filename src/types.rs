// =============================================================================
// Shared types used across the scanner
// =============================================================================

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which market-data backend bars are fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Yahoo,
    Binance,
}

impl Default for Provider {
    fn default() -> Self {
        Self::Yahoo
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Yahoo => write!(f, "yahoo"),
            Self::Binance => write!(f, "binance"),
        }
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yahoo" => Ok(Self::Yahoo),
            "binance" => Ok(Self::Binance),
            other => Err(format!("unknown provider '{other}' (expected yahoo or binance)")),
        }
    }
}

/// How far back to fetch daily bars, in Yahoo's range vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LookbackPeriod {
    Day1,
    Day5,
    Month1,
    Month3,
    Month6,
    Year1,
    Year2,
    Year5,
    Year10,
    YearToDate,
    Max,
}

impl Default for LookbackPeriod {
    fn default() -> Self {
        Self::Year1
    }
}

impl LookbackPeriod {
    /// The range token understood by the Yahoo chart endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day1 => "1d",
            Self::Day5 => "5d",
            Self::Month1 => "1mo",
            Self::Month3 => "3mo",
            Self::Month6 => "6mo",
            Self::Year1 => "1y",
            Self::Year2 => "2y",
            Self::Year5 => "5y",
            Self::Year10 => "10y",
            Self::YearToDate => "ytd",
            Self::Max => "max",
        }
    }

    /// Approximate number of calendar days covered, for providers that take a
    /// bar count instead of a range. `ytd` is measured against `today`.
    pub fn approx_days(&self, today: chrono::NaiveDate) -> u32 {
        use chrono::Datelike;
        match self {
            Self::Day1 => 1,
            Self::Day5 => 5,
            Self::Month1 => 31,
            Self::Month3 => 92,
            Self::Month6 => 183,
            Self::Year1 => 365,
            Self::Year2 => 730,
            Self::Year5 => 1826,
            Self::Year10 => 3652,
            Self::YearToDate => today.ordinal(),
            Self::Max => u32::MAX,
        }
    }
}

impl std::fmt::Display for LookbackPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LookbackPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let period = match s.trim().to_ascii_lowercase().as_str() {
            "1d" => Self::Day1,
            "5d" => Self::Day5,
            "1mo" => Self::Month1,
            "3mo" => Self::Month3,
            "6mo" => Self::Month6,
            "1y" => Self::Year1,
            "2y" => Self::Year2,
            "5y" => Self::Year5,
            "10y" => Self::Year10,
            "ytd" => Self::YearToDate,
            "max" => Self::Max,
            other => return Err(format!("unsupported lookback period '{other}'")),
        };
        Ok(period)
    }
}

impl TryFrom<String> for LookbackPeriod {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LookbackPeriod> for String {
    fn from(value: LookbackPeriod) -> Self {
        value.as_str().to_string()
    }
}
