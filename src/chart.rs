use crate::billing::diff_days;
use crate::models::{Comparison, ComparisonPoint, DateRange, LineItem, ReadSeries, Reading};
use crate::usage::{deltas, normalize};
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bucket size for chart points, picked from the length of the range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimeSpan {
    Day,
    Week,
    Month,
}

impl TimeSpan {
    /// Up to a month is drawn per day, up to half a year per week, anything
    /// longer per month.
    pub fn for_range(range: &DateRange) -> Self {
        match diff_days(range.end_date, range.start_date) {
            0..=31 => TimeSpan::Day,
            32..=183 => TimeSpan::Week,
            _ => TimeSpan::Month,
        }
    }

    /// First day of the bucket containing `date`. Weeks start on Monday.
    pub fn bucket(self, date: NaiveDate) -> NaiveDate {
        match self {
            TimeSpan::Day => date,
            TimeSpan::Week => date - Duration::days(date.weekday().num_days_from_monday() as i64),
            TimeSpan::Month => date.with_day(1).unwrap_or(date),
        }
    }
}

/// Sums line values per bucket, ascending by bucket date.
pub fn group_by_span(items: &[LineItem], span: TimeSpan) -> Vec<(NaiveDate, f64)> {
    let mut buckets: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for item in items {
        *buckets.entry(span.bucket(item.date.date_naive())).or_default() += item.line1;
    }
    buckets.into_iter().collect()
}

fn within(items: &[LineItem], range: &DateRange) -> Vec<LineItem> {
    items
        .iter()
        .filter(|item| {
            let day = item.date.date_naive();
            day >= range.start_date && day <= range.end_date
        })
        .cloned()
        .collect()
}

/// What the sync layer hands over for a comparison chart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonInput {
    pub guid: String,
    #[serde(flatten)]
    pub range: DateRange,
    /// The meter's own cumulative reads.
    #[serde(default)]
    pub reads: Vec<Reading>,
    /// Neighborhood average deltas.
    #[serde(default)]
    pub average: Vec<LineItem>,
    /// Neighborhood efficient-home deltas.
    #[serde(default)]
    pub efficiency: Vec<LineItem>,
}

/// Aligns own usage (`line1`), neighborhood average (`line2`) and
/// neighborhood efficiency (`line3`) by bucket date. A series with no value
/// at a date contributes zero. Returns `None` when all three are empty.
pub fn build_comparison(input: &ComparisonInput) -> Option<Comparison> {
    if input.reads.is_empty() && input.average.is_empty() && input.efficiency.is_empty() {
        return None;
    }

    let range = &input.range;
    let span = TimeSpan::for_range(range);
    let usage = normalize(&deltas(&ReadSeries::sorted(input.reads.clone())));

    let mut points: BTreeMap<NaiveDate, ComparisonPoint> = BTreeMap::new();
    let mut add_series = |items: &[LineItem], apply: fn(&mut ComparisonPoint, f64)| {
        for (date, value) in group_by_span(&within(items, range), span) {
            let point = points.entry(date).or_insert_with(|| ComparisonPoint {
                date,
                line1: 0.0,
                line2: 0.0,
                line3: 0.0,
            });
            apply(point, value);
        }
    };
    add_series(&usage, |p, v| p.line1 += v);
    add_series(&input.average, |p, v| p.line2 += v);
    add_series(&input.efficiency, |p, v| p.line3 += v);

    Some(Comparison {
        guid: input.guid.clone(),
        start_date: range.start_date,
        end_date: range.end_date,
        reads: points.into_values().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, month, day, 12, 0, 0)
            .single()
            .expect("valid fixed timestamp")
    }

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).expect("valid fixed date")
    }

    fn item(month: u32, day: u32, line1: f64) -> LineItem {
        LineItem {
            date: ts(month, day),
            line1,
        }
    }

    fn range(start: NaiveDate, end: NaiveDate) -> DateRange {
        DateRange {
            start_date: start,
            end_date: end,
        }
    }

    fn input(reads: Vec<Reading>, average: Vec<LineItem>, efficiency: Vec<LineItem>) -> ComparisonInput {
        ComparisonInput {
            guid: "meter-1".into(),
            range: range(date(1, 1), date(1, 31)),
            reads,
            average,
            efficiency,
        }
    }

    #[test]
    fn span_follows_range_length() {
        assert_eq!(TimeSpan::for_range(&range(date(1, 1), date(1, 31))), TimeSpan::Day);
        assert_eq!(TimeSpan::for_range(&range(date(1, 1), date(3, 31))), TimeSpan::Week);
        assert_eq!(TimeSpan::for_range(&range(date(1, 1), date(12, 31))), TimeSpan::Month);
    }

    #[test]
    fn buckets_start_on_monday_and_first_of_month() {
        // 2024-01-10 is a Wednesday.
        assert_eq!(TimeSpan::Week.bucket(date(1, 10)), date(1, 8));
        assert_eq!(TimeSpan::Month.bucket(date(1, 10)), date(1, 1));
        assert_eq!(TimeSpan::Day.bucket(date(1, 10)), date(1, 10));
    }

    #[test]
    fn grouping_sums_values_per_bucket() {
        let items = vec![item(1, 8, 2.0), item(1, 10, 3.0), item(1, 15, 4.0)];
        let grouped = group_by_span(&items, TimeSpan::Week);
        assert_eq!(grouped, vec![(date(1, 8), 5.0), (date(1, 15), 4.0)]);
    }

    #[test]
    fn all_empty_series_produce_nothing() {
        assert!(build_comparison(&input(vec![], vec![], vec![])).is_none());
    }

    #[test]
    fn missing_series_default_to_zero_per_point() {
        let reads = vec![
            Reading {
                date: ts(1, 2),
                total: 100.0,
            },
            Reading {
                date: ts(1, 3),
                total: 110.0,
            },
            Reading {
                date: ts(1, 4),
                total: 105.0,
            },
        ];
        let average = vec![item(1, 3, 7.0), item(1, 5, 6.0)];
        let out = build_comparison(&input(reads, average, vec![])).expect("comparison");

        assert_eq!(out.guid, "meter-1");
        assert_eq!(out.reads.len(), 3);
        assert_eq!(
            out.reads[0],
            ComparisonPoint {
                date: date(1, 3),
                line1: 10.0,
                line2: 7.0,
                line3: 0.0,
            }
        );
        // Rollback on the 4th is normalized to zero.
        assert_eq!(out.reads[1].line1, 0.0);
        assert_eq!(out.reads[1].line2, 0.0);
        assert_eq!(out.reads[2].date, date(1, 5));
        assert_eq!(out.reads[2].line2, 6.0);
    }

    #[test]
    fn points_outside_range_are_dropped() {
        let efficiency = vec![item(1, 20, 1.0), item(2, 10, 9.0)];
        let out = build_comparison(&input(vec![], vec![], efficiency)).expect("comparison");
        assert_eq!(out.reads.len(), 1);
        assert_eq!(out.reads[0].line3, 1.0);
    }

    #[test]
    fn neighborhood_rows_accept_delta_field() {
        let raw = r#"{
            "guid": "meter-1",
            "start_date": "2024-01-01",
            "end_date": "2024-01-31",
            "average": [{"date": "2024-01-03T00:00:00Z", "delta": 4.5}]
        }"#;
        let parsed: ComparisonInput = serde_json::from_str(raw).expect("comparison input");
        assert_eq!(parsed.average[0].line1, 4.5);
        assert!(parsed.reads.is_empty());
    }
}
