use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// One of the four reporting periods of a year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Quarter(u8);

impl Quarter {
    pub fn new(value: u8) -> Option<Self> {
        (1..=4).contains(&value).then_some(Self(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Quarter {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Quarter::new(value).ok_or_else(|| format!("quarter out of range: {value}"))
    }
}

impl From<Quarter> for u8 {
    fn from(q: Quarter) -> u8 {
        q.0
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q{}", self.0)
    }
}

/// Reporting period key used to rank catalog entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub quarter: Quarter,
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.year, self.quarter)
    }
}

/// A remote archive attributed to a reporting period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub year: i32,
    pub quarter: Quarter,
    pub remote_url: String,
}

impl CatalogEntry {
    pub fn period(&self) -> Period {
        Period {
            year: self.year,
            quarter: self.quarter,
        }
    }
}

/// One statement line reduced to entity, period and amount.
#[derive(Debug, Clone, PartialEq)]
pub struct DisclosureRow {
    pub registry_id: String,
    pub year: Option<i32>,
    pub quarter: Option<u8>,
    pub amount: Option<f64>,
}

/// Per-(legal name, region) statistics over validated amounts.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub legal_name: String,
    pub region: String,
    pub total: f64,
    pub mean: f64,
    pub stddev: Option<f64>,
}

/// A file streamed to local storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadedFile {
    pub url: String,
    pub path: PathBuf,
    pub bytes: u64,
    pub sha256: String,
    pub fetched_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quarter_rejects_out_of_range() {
        assert!(Quarter::new(0).is_none());
        assert!(Quarter::new(5).is_none());
        assert_eq!(Quarter::new(4).map(Quarter::get), Some(4));
    }

    #[test]
    fn quarter_deserialization_is_checked() {
        assert!(serde_json::from_str::<Quarter>("3").is_ok());
        assert!(serde_json::from_str::<Quarter>("7").is_err());
    }

    #[test]
    fn periods_order_by_year_then_quarter() {
        let a = Period { year: 2022, quarter: Quarter::new(4).unwrap() };
        let b = Period { year: 2023, quarter: Quarter::new(1).unwrap() };
        assert!(a < b);
        assert_eq!(b.to_string(), "2023Q1");
    }
}
