use crate::models::{LineItem, Meter, ReadSeries};
use crate::pricing::{marginal_rate, resolve_schedule};
use crate::units::UnitConverter;
use serde::{Deserialize, Serialize};

/// Net consumption over the series: the sum of every adjacent difference,
/// oldest pair first. Rollbacks contribute negative amounts.
pub fn cycle_usage(series: &ReadSeries) -> f64 {
    debug_assert!(series.is_ascending());
    series
        .as_slice()
        .windows(2)
        .map(|pair| pair[1].total - pair[0].total)
        .sum()
}

/// One delta per adjacent pair, dated at the later reading.
pub fn deltas(series: &ReadSeries) -> Vec<LineItem> {
    debug_assert!(series.is_ascending());
    series
        .as_slice()
        .windows(2)
        .map(|pair| LineItem {
            date: pair[1].date,
            line1: pair[1].total - pair[0].total,
        })
        .collect()
}

/// Replaces negative deltas with zero.
pub fn normalize(items: &[LineItem]) -> Vec<LineItem> {
    items
        .iter()
        .map(|item| LineItem {
            date: item.date,
            line1: item.line1.max(0.0),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReadCost {
    /// Major currency units.
    pub total_cost: f64,
    /// Sum of positive deltas in meter units.
    pub total_delta: f64,
}

/// Prices reads one at a time with the marginal rate of the running total.
///
/// Each positive delta is converted to billing units and charged at the rate
/// looked up for the cumulative converted total, using the schedule active on
/// the delta's own date. Non-positive deltas are skipped.
pub fn cost_from_deltas(
    meter: &Meter,
    items: &[LineItem],
    converter: &UnitConverter,
    default_rate: f64,
) -> ReadCost {
    let mut total_delta = 0.0;
    let mut total_subunits = 0.0;

    for item in items {
        if item.line1 <= 0.0 {
            continue;
        }
        total_delta += item.line1;

        let day = item.date.date_naive();
        let cumulative = converter.to_billing_units(meter.utility_type, total_delta);
        let rate = resolve_schedule(day, meter.summer.as_ref(), meter.winter.as_ref())
            .map(|active| marginal_rate(active.tiers, cumulative))
            .unwrap_or(default_rate);

        total_subunits += converter.to_billing_units(meter.utility_type, item.line1) * rate;
    }

    ReadCost {
        total_cost: if total_subunits > 0.0 {
            total_subunits / 100.0
        } else {
            0.0
        },
        total_delta,
    }
}
