use crate::billing::clamped_date;
use crate::error::AppError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UtilityType {
    Power,
    Gas,
    Water,
    Solar,
}

impl UtilityType {
    pub fn as_label(self) -> &'static str {
        match self {
            UtilityType::Power => "power",
            UtilityType::Gas => "gas",
            UtilityType::Water => "water",
            UtilityType::Solar => "solar",
        }
    }

    /// Unit the rate tables are expressed in, after conversion.
    pub fn billing_unit(self) -> &'static str {
        match self {
            UtilityType::Power | UtilityType::Solar => "kWh",
            UtilityType::Gas => "dth",
            UtilityType::Water => "ccf",
        }
    }
}

/// Day of month a billing cycle starts on, 1 through 31.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct BillingDay(u32);

impl BillingDay {
    pub fn new(day: u32) -> Result<Self, AppError> {
        if !(1..=31).contains(&day) {
            return Err(AppError::Validation(format!(
                "billing start day must be between 1 and 31, got {day}"
            )));
        }
        Ok(Self(day))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for BillingDay {
    type Error = AppError;

    fn try_from(day: u32) -> Result<Self, Self::Error> {
        Self::new(day)
    }
}

impl From<BillingDay> for u32 {
    fn from(day: BillingDay) -> Self {
        day.0
    }
}

/// A recurring calendar day, written as `MM/DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MonthDay {
    month: u32,
    day: u32,
}

impl MonthDay {
    pub fn new(month: u32, day: u32) -> Result<Self, AppError> {
        if !(1..=12).contains(&month) {
            return Err(AppError::Validation(format!(
                "season month must be between 1 and 12, got {month}"
            )));
        }
        // Leap year so that 02/29 is accepted; it clamps in other years.
        let max_day = crate::billing::days_in_month(2000, month);
        if day == 0 || day > max_day {
            return Err(AppError::Validation(format!(
                "season day {day} is out of range for month {month}"
            )));
        }
        Ok(Self { month, day })
    }

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let invalid = || AppError::Validation(format!("season boundary '{raw}' is not MM/DD"));
        let (month, day) = raw.trim().split_once(['/', '-']).ok_or_else(invalid)?;
        let month = month.trim().parse::<u32>().map_err(|_| invalid())?;
        let day = day.trim().parse::<u32>().map_err(|_| invalid())?;
        Self::new(month, day)
    }

    pub fn in_year(self, year: i32) -> Option<NaiveDate> {
        clamped_date(year, self.month, self.day)
    }
}

impl fmt::Display for MonthDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}/{:02}", self.month, self.day)
    }
}

impl TryFrom<String> for MonthDay {
    type Error = AppError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<MonthDay> for String {
    fn from(value: MonthDay) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub threshold: f64,
    /// Currency subunits (cents) per billing unit.
    pub rate: f64,
}

/// Ordered usage brackets. Thresholds are strictly ascending.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(into = "Vec<Tier>")]
pub struct TierTable(Vec<Tier>);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTierTable {
    List(Vec<Tier>),
    Map(BTreeMap<String, f64>),
}

impl TierTable {
    pub fn new(tiers: Vec<Tier>) -> Result<Self, AppError> {
        if tiers.is_empty() {
            return Err(AppError::Validation("tier table is empty".into()));
        }
        for tier in &tiers {
            if !tier.threshold.is_finite() || !tier.rate.is_finite() {
                return Err(AppError::Validation(
                    "tier thresholds and rates must be finite numbers".into(),
                ));
            }
            if tier.rate < 0.0 {
                return Err(AppError::Validation(format!(
                    "tier rate {} at threshold {} is negative",
                    tier.rate, tier.threshold
                )));
            }
        }
        if let Some(pair) = tiers.windows(2).find(|w| w[1].threshold <= w[0].threshold) {
            return Err(AppError::Validation(format!(
                "tier thresholds must be strictly ascending ({} then {})",
                pair[0].threshold, pair[1].threshold
            )));
        }
        Ok(Self(tiers))
    }

    /// Single bracket starting at zero. `rate` is expected to be validated.
    pub(crate) fn flat(rate: f64) -> Self {
        Self(vec![Tier {
            threshold: 0.0,
            rate,
        }])
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.0
    }

    fn from_raw(raw: RawTierTable) -> Result<Self, AppError> {
        match raw {
            RawTierTable::List(tiers) => Self::new(tiers),
            RawTierTable::Map(map) => {
                let mut tiers = Vec::with_capacity(map.len());
                for (key, rate) in map {
                    let threshold = key.trim().parse::<f64>().map_err(|_| {
                        AppError::Validation(format!("tier threshold '{key}' is not a number"))
                    })?;
                    tiers.push(Tier { threshold, rate });
                }
                // String keys order "100" before "50".
                tiers.sort_by(|a, b| a.threshold.total_cmp(&b.threshold));
                Self::new(tiers)
            }
        }
    }
}

impl<'de> Deserialize<'de> for TierTable {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawTierTable::deserialize(deserializer)?;
        Self::from_raw(raw).map_err(serde::de::Error::custom)
    }
}

impl From<TierTable> for Vec<Tier> {
    fn from(table: TierTable) -> Self {
        table.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSchedule {
    pub start_date: MonthDay,
    pub end_date: MonthDay,
    pub tiers: TierTable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub date: DateTime<Utc>,
    pub total: f64,
}

/// Readings in ascending date order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadSeries(Vec<Reading>);

impl ReadSeries {
    /// Orders readings oldest-first regardless of how they were supplied.
    /// Readings sharing a timestamp are ordered by total, lowest first.
    pub fn sorted(mut reads: Vec<Reading>) -> Self {
        reads.sort_by(|a, b| a.date.cmp(&b.date).then(a.total.total_cmp(&b.total)));
        Self(reads)
    }

    pub fn as_slice(&self) -> &[Reading] {
        &self.0
    }

    pub fn is_ascending(&self) -> bool {
        self.0.windows(2).all(|w| w[0].date <= w[1].date)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meter {
    pub guid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub utility_type: UtilityType,
    pub billing_start: BillingDay,
    #[serde(default)]
    pub reads: Vec<Reading>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summer: Option<RateSchedule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winter: Option<RateSchedule>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Summer,
    Winter,
    /// No schedule configured, the default rate applies.
    Flat,
}

impl Season {
    pub fn as_label(self) -> &'static str {
        match self {
            Season::Summer => "summer",
            Season::Winter => "winter",
            Season::Flat => "flat",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineWarning {
    /// Readings summed to a negative total (rollback or rollover).
    NegativeUsage { usage: f64 },
    /// Tier data produced a negative cost, reported as zero.
    CostUnderflow { subunits: f64 },
}

impl fmt::Display for EngineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineWarning::NegativeUsage { usage } => {
                write!(f, "negative usage {usage} billed as zero")
            }
            EngineWarning::CostUnderflow { subunits } => {
                write!(f, "negative cost of {subunits} subunits clamped to zero")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterReport {
    pub guid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub utility_type: UtilityType,
    pub usage: f64,
    pub billing_usage: f64,
    pub cycle_start: NaiveDate,
    pub billing_days_since_start: i64,
    pub billing_cycle_total_days: i64,
    pub season: Season,
    pub actual_usage_cost: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<EngineWarning>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub date: DateTime<Utc>,
    #[serde(alias = "delta")]
    pub line1: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonPoint {
    pub date: NaiveDate,
    pub line1: f64,
    pub line2: f64,
    pub line3: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub guid: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reads: Vec<ComparisonPoint>,
}
