use crate::billing::BillingCycle;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::models::{EngineWarning, LineItem, Meter, MeterReport, ReadSeries, Season};
use crate::pricing::{flat_cost, progressive_cost, resolve_schedule};
use crate::units::UnitConverter;
use crate::usage::{cost_from_deltas, cycle_usage, deltas, normalize};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Per-read breakdown of a meter, priced one read at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadCostReport {
    pub guid: String,
    pub deltas: Vec<LineItem>,
    pub total_delta: f64,
    pub total_cost: f64,
}

/// Derives cycle usage, day counts and cost for meters.
///
/// Takes meters by reference and returns fresh reports, so running it twice
/// on the same input with the same `today` gives the same result.
pub struct MeterCostEngine {
    converter: UnitConverter,
    default_rate: f64,
}

impl MeterCostEngine {
    pub fn new(cfg: &AppConfig) -> Self {
        Self {
            converter: UnitConverter::new(cfg.conversion),
            default_rate: cfg.default_rate,
        }
    }

    pub fn compute(&self, meter: &Meter, today: NaiveDate) -> Result<MeterReport, AppError> {
        let mut warnings = Vec::new();

        let series = ReadSeries::sorted(meter.reads.clone());
        let usage = cycle_usage(&series);

        let cycle = BillingCycle::containing(today, meter.billing_start)?;

        let active = resolve_schedule(today, meter.summer.as_ref(), meter.winter.as_ref());

        let billing_usage = self.converter.to_billing_units(meter.utility_type, usage);
        let billable = if billing_usage < 0.0 {
            warnings.push(EngineWarning::NegativeUsage { usage });
            0.0
        } else {
            billing_usage
        };

        let (season, cost) = match active {
            Some(active) => (active.season, progressive_cost(active.tiers, billable)),
            None => (Season::Flat, flat_cost(billable, self.default_rate)),
        };
        if cost.underflow() {
            warnings.push(EngineWarning::CostUnderflow {
                subunits: cost.subunits,
            });
        }
        for warning in &warnings {
            warn!(meter = %meter.guid, "{warning}");
        }

        debug!(
            meter = %meter.guid,
            utility = meter.utility_type.as_label(),
            season = season.as_label(),
            usage,
            billing_usage,
            cost = cost.cost,
            "computed meter cost"
        );

        Ok(MeterReport {
            guid: meter.guid.clone(),
            name: meter.name.clone(),
            utility_type: meter.utility_type,
            usage,
            billing_usage,
            cycle_start: cycle.start,
            billing_days_since_start: cycle.days_since_start,
            billing_cycle_total_days: cycle.total_days,
            season,
            actual_usage_cost: cost.cost,
            warnings,
        })
    }

    pub fn compute_all(
        &self,
        meters: &[Meter],
        today: NaiveDate,
    ) -> Result<Vec<MeterReport>, AppError> {
        meters.iter().map(|m| self.compute(m, today)).collect()
    }

    /// Deltas between consecutive reads and their marginal-rate cost.
    /// Rollbacks show up as negative deltas but are not charged.
    pub fn read_cost(&self, meter: &Meter) -> ReadCostReport {
        let series = ReadSeries::sorted(meter.reads.clone());
        let items = deltas(&series);
        let cost = cost_from_deltas(
            meter,
            &normalize(&items),
            &self.converter,
            self.default_rate,
        );
        ReadCostReport {
            guid: meter.guid.clone(),
            deltas: items,
            total_delta: cost.total_delta,
            total_cost: cost.total_cost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConversionConfig;
    use crate::models::{BillingDay, MonthDay, RateSchedule, Reading, Tier, TierTable, UtilityType};
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, month, day, 6, 0, 0)
            .single()
            .expect("valid fixed timestamp")
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid fixed date")
    }

    fn engine() -> MeterCostEngine {
        MeterCostEngine::new(&AppConfig {
            conversion: ConversionConfig {
                ccf_to_dth: 10.0,
                gal_to_ccf: 748.0,
            },
            ..AppConfig::default()
        })
    }

    fn schedule(start: &str, end: &str, pairs: &[(f64, f64)]) -> RateSchedule {
        RateSchedule {
            start_date: MonthDay::parse(start).expect("start"),
            end_date: MonthDay::parse(end).expect("end"),
            tiers: TierTable::new(
                pairs
                    .iter()
                    .map(|&(threshold, rate)| Tier { threshold, rate })
                    .collect(),
            )
            .expect("tiers"),
        }
    }

    fn meter(utility_type: UtilityType, totals: &[(u32, f64)]) -> Meter {
        Meter {
            guid: "meter-1".into(),
            name: Some("House".into()),
            utility_type,
            billing_start: BillingDay::new(15).expect("valid day"),
            // Newest first, the way the sync layer hands them over.
            reads: totals
                .iter()
                .rev()
                .map(|&(day, total)| Reading {
                    date: ts(1, day),
                    total,
                })
                .collect(),
            summer: Some(schedule("06/01", "10/01", &[(0.0, 200.0)])),
            winter: Some(schedule("10/01", "06/01", &[(0.0, 100.0), (50.0, 150.0)])),
        }
    }

    #[test]
    fn computes_usage_cycle_and_tiered_cost() {
        let m = meter(UtilityType::Power, &[(16, 1000.0), (18, 1040.0), (19, 1070.0)]);
        let report = engine().compute(&m, date(2024, 1, 20)).expect("report");

        assert_eq!(report.usage, 70.0);
        assert_eq!(report.billing_usage, 70.0);
        assert_eq!(report.cycle_start, date(2024, 1, 15));
        assert_eq!(report.billing_days_since_start, 5);
        assert_eq!(report.billing_cycle_total_days, 31);
        assert_eq!(report.season, Season::Winter);
        assert!((report.actual_usage_cost - 80.0).abs() < 1e-9);
        assert!(report.warnings.is_empty());
        assert_eq!(report.name.as_deref(), Some("House"));
    }

    #[test]
    fn summer_schedule_applies_inside_window() {
        let m = meter(UtilityType::Power, &[(16, 0.0), (19, 10.0)]);
        let report = engine().compute(&m, date(2024, 7, 4)).expect("report");
        assert_eq!(report.season, Season::Summer);
        assert!((report.actual_usage_cost - 20.0).abs() < 1e-9);
    }

    #[test]
    fn gas_usage_is_converted_before_allocation() {
        let m = meter(UtilityType::Gas, &[(16, 0.0), (19, 700.0)]);
        let report = engine().compute(&m, date(2024, 1, 20)).expect("report");
        assert_eq!(report.usage, 700.0);
        assert!((report.billing_usage - 70.0).abs() < 1e-12);
        assert!((report.actual_usage_cost - 80.0).abs() < 1e-9);
    }

    #[test]
    fn meter_without_schedules_uses_default_rate() {
        let mut m = meter(UtilityType::Power, &[(16, 10.0), (19, 40.0)]);
        m.summer = None;
        m.winter = None;
        let report = engine().compute(&m, date(2024, 1, 20)).expect("report");
        assert_eq!(report.season, Season::Flat);
        assert!((report.actual_usage_cost - 0.30).abs() < 1e-12);
    }

    #[test]
    fn fewer_than_two_reads_cost_nothing() {
        let m = meter(UtilityType::Water, &[(16, 500.0)]);
        let report = engine().compute(&m, date(2024, 1, 20)).expect("report");
        assert_eq!(report.usage, 0.0);
        assert_eq!(report.actual_usage_cost, 0.0);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn rollback_is_billed_as_zero_with_warning() {
        let m = meter(UtilityType::Power, &[(16, 500.0), (19, 480.0)]);
        let report = engine().compute(&m, date(2024, 1, 20)).expect("report");
        assert_eq!(report.usage, -20.0);
        assert_eq!(report.actual_usage_cost, 0.0);
        assert_eq!(
            report.warnings,
            vec![EngineWarning::NegativeUsage { usage: -20.0 }]
        );
    }

    #[test]
    fn tiers_starting_above_usage_report_underflow() {
        let mut m = meter(UtilityType::Power, &[(16, 0.0), (19, 5.0)]);
        m.winter = Some(schedule("10/01", "06/01", &[(10.0, 100.0), (50.0, 150.0)]));
        let report = engine().compute(&m, date(2024, 1, 20)).expect("report");
        assert_eq!(report.actual_usage_cost, 0.0);
        assert!(matches!(
            report.warnings.as_slice(),
            [EngineWarning::CostUnderflow { .. }]
        ));
    }

    #[test]
    fn compute_is_idempotent_and_leaves_input_untouched() {
        let m = meter(UtilityType::Power, &[(16, 1000.0), (18, 1040.0), (19, 1070.0)]);
        let snapshot = m.clone();
        let eng = engine();
        let today = date(2024, 1, 20);

        let first = eng.compute(&m, today).expect("first");
        let second = eng.compute(&m, today).expect("second");
        assert_eq!(first, second);
        assert_eq!(m, snapshot);
    }

    #[test]
    fn read_cost_prices_each_delta_at_its_marginal_rate() {
        let m = meter(UtilityType::Power, &[(16, 1000.0), (18, 1040.0), (19, 1060.0), (20, 1055.0)]);
        let report = engine().read_cost(&m);

        assert_eq!(report.deltas.len(), 3);
        assert_eq!(report.deltas[2].line1, -5.0);
        assert_eq!(report.total_delta, 60.0);
        // Winter tiers: 40 at 100, then 20 at 150 once the running total passes 50.
        assert!((report.total_cost - 70.0).abs() < 1e-9);
    }

    #[test]
    fn compute_all_keeps_meter_order() {
        let a = meter(UtilityType::Power, &[(16, 0.0), (19, 10.0)]);
        let mut b = meter(UtilityType::Solar, &[(16, 0.0), (19, 20.0)]);
        b.guid = "meter-2".into();

        let reports = engine()
            .compute_all(&[a, b], date(2024, 1, 20))
            .expect("reports");
        let guids: Vec<&str> = reports.iter().map(|r| r.guid.as_str()).collect();
        assert_eq!(guids, vec!["meter-1", "meter-2"]);
        assert_eq!(reports[1].usage, 20.0);
    }
}
