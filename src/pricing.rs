use crate::models::{RateSchedule, Season, TierTable};
use chrono::{Datelike, NaiveDate};

/// Tier table selected for a date, with the season it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveSchedule<'a> {
    pub season: Season,
    pub tiers: &'a TierTable,
}

/// Whether `today` falls inside the summer window of its own year.
/// The window is half-open: the end date already belongs to winter.
pub fn is_summer(today: NaiveDate, summer: &RateSchedule) -> bool {
    let year = today.year();
    match (summer.start_date.in_year(year), summer.end_date.in_year(year)) {
        (Some(start), Some(end)) => start <= today && today < end,
        _ => false,
    }
}

/// Picks summer tiers when summer applies, otherwise winter tiers.
/// `None` means the caller bills at the flat default rate.
pub fn resolve_schedule<'a>(
    today: NaiveDate,
    summer: Option<&'a RateSchedule>,
    winter: Option<&'a RateSchedule>,
) -> Option<ActiveSchedule<'a>> {
    if let Some(summer) = summer.filter(|s| is_summer(today, s)) {
        return Some(ActiveSchedule {
            season: Season::Summer,
            tiers: &summer.tiers,
        });
    }
    winter.map(|w| ActiveSchedule {
        season: Season::Winter,
        tiers: &w.tiers,
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierCost {
    /// Raw accumulated amount in currency subunits, may be negative.
    pub subunits: f64,
    /// Major currency units, never negative.
    pub cost: f64,
}

impl TierCost {
    fn from_subunits(subunits: f64) -> Self {
        let cost = if subunits > 0.0 { subunits / 100.0 } else { 0.0 };
        Self { subunits, cost }
    }

    pub fn underflow(&self) -> bool {
        self.subunits < 0.0
    }
}

/// Progressive bracket allocation.
///
/// Each bracket `[threshold_k, threshold_k+1)` is billed at `rate_k`. Usage
/// exactly on a threshold fills the lower bracket completely and nothing of
/// the next one. Usage above the highest threshold is billed at the top rate.
pub fn progressive_cost(table: &TierTable, usage: f64) -> TierCost {
    let tiers = table.tiers();
    if let [only] = tiers {
        return TierCost::from_subunits(usage * only.rate);
    }

    let mut total = 0.0;
    for (idx, pair) in tiers.windows(2).enumerate() {
        let (curr, next) = (pair[0], pair[1]);
        if usage >= next.threshold {
            total += (next.threshold - curr.threshold) * curr.rate;
            let last_pair = idx + 2 == tiers.len();
            if last_pair && usage > next.threshold {
                total += (usage - next.threshold) * next.rate;
            }
        } else {
            total += (usage - curr.threshold) * curr.rate;
            break;
        }
    }

    TierCost::from_subunits(total)
}

/// Cost of `usage` at a single flat rate in subunits per unit.
pub fn flat_cost(usage: f64, rate: f64) -> TierCost {
    progressive_cost(&TierTable::flat(rate), usage)
}

/// Rate for one incremental read, looked up by the running delta total.
///
/// Finds the first threshold the total does not exceed and returns the rate
/// of the bracket below it. This is not the progressive allocation above and
/// can return the lower rate for a total sitting exactly on a threshold.
pub fn marginal_rate(table: &TierTable, cumulative: f64) -> f64 {
    let tiers = table.tiers();
    if cumulative > 0.0 {
        if let Some(idx) = tiers.iter().position(|t| cumulative <= t.threshold) {
            return tiers[idx.saturating_sub(1)].rate;
        }
    }
    tiers.last().map(|t| t.rate).unwrap_or_default()
}
