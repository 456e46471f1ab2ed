mod billing;
mod chart;
mod config;
mod error;
mod logging;
mod models;
mod pricing;
mod service;
mod units;
mod usage;

use chart::{build_comparison, ComparisonInput};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use crate::config::{ensure_initialized, load_config};
use error::AppError;
use models::{Meter, MeterReport, Tier, TierTable};
use pricing::{marginal_rate, progressive_cost};
use service::MeterCostEngine;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "meter-cost")]
#[command(about = "Utility meter usage and tiered cost calculator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Init,
    Compute {
        #[arg(long)]
        input: PathBuf,
        /// Date to compute the billing cycle for, YYYY-MM-DD. Defaults to today.
        #[arg(long)]
        today: Option<String>,
        #[arg(long, default_value = "json")]
        format: String,
    },
    Quote {
        #[arg(long, allow_negative_numbers = true)]
        usage: f64,
        /// THRESHOLD:RATE, rate in currency subunits per unit. Repeatable.
        #[arg(long = "tier", required = true)]
        tiers: Vec<String>,
    },
    /// Per-read deltas priced at the marginal rate of the running total.
    Reads {
        #[arg(long)]
        input: PathBuf,
    },
    Compare {
        #[arg(long)]
        input: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Json,
    Csv,
}

fn validate_format(input: &str) -> Result<OutputFormat, AppError> {
    if input.eq_ignore_ascii_case("json") {
        Ok(OutputFormat::Json)
    } else if input.eq_ignore_ascii_case("csv") {
        Ok(OutputFormat::Csv)
    } else {
        Err(AppError::Config(
            "Unsupported output format. Use json or csv.".into(),
        ))
    }
}

fn parse_today(input: Option<&str>) -> Result<NaiveDate, AppError> {
    match input {
        Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
            AppError::Validation(format!("Invalid --today value {raw}. Use YYYY-MM-DD."))
        }),
        None => Ok(Local::now().date_naive()),
    }
}

fn parse_tier(raw: &str) -> Result<Tier, AppError> {
    let invalid = || AppError::Validation(format!("Invalid tier {raw}. Use THRESHOLD:RATE."));
    let (threshold, rate) = raw.split_once(':').ok_or_else(invalid)?;
    Ok(Tier {
        threshold: threshold.trim().parse().map_err(|_| invalid())?,
        rate: rate.trim().parse().map_err(|_| invalid())?,
    })
}

fn parse_tiers(raw: &[String]) -> Result<TierTable, AppError> {
    let mut tiers = raw
        .iter()
        .map(|t| parse_tier(t))
        .collect::<Result<Vec<_>, _>>()?;
    tiers.sort_by(|a, b| a.threshold.total_cmp(&b.threshold));
    TierTable::new(tiers)
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

fn render_csv(reports: &[MeterReport], currency: &str) -> String {
    let mut out = String::from(
        "guid,name,utility_type,usage,billing_usage,billing_unit,cycle_start,billing_days_since_start,billing_cycle_total_days,season,actual_usage_cost,currency\n",
    );
    for r in reports {
        out.push_str(&format!(
            "{},{},{},{:.4},{:.4},{},{},{},{},{},{:.2},{}\n",
            csv_field(&r.guid),
            csv_field(r.name.as_deref().unwrap_or("")),
            r.utility_type.as_label(),
            r.usage,
            r.billing_usage,
            r.utility_type.billing_unit(),
            r.cycle_start,
            r.billing_days_since_start,
            r.billing_cycle_total_days,
            r.season.as_label(),
            r.actual_usage_cost,
            csv_field(currency),
        ));
    }
    out
}

fn main() -> Result<(), AppError> {
    logging::init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            ensure_initialized()?;
            println!("Initialized meter-cost config and data directories.");
        }
        Commands::Compute {
            input,
            today,
            format,
        } => {
            let format = validate_format(&format)?;
            let today = parse_today(today.as_deref())?;
            ensure_initialized()?;
            let cfg = load_config()?;

            let raw = fs::read_to_string(&input)?;
            let meters: Vec<Meter> = serde_json::from_str(&raw)?;
            let engine = MeterCostEngine::new(&cfg);
            let reports = engine.compute_all(&meters, today)?;
            info!(meters = reports.len(), %today, "computed meter reports");

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
                OutputFormat::Csv => print!("{}", render_csv(&reports, &cfg.currency)),
            }
        }
        Commands::Quote { usage, tiers } => {
            ensure_initialized()?;
            let cfg = load_config()?;
            let table = parse_tiers(&tiers)?;
            let cost = progressive_cost(&table, usage);
            println!("usage: {usage}");
            println!(
                "progressive cost: {:.2} {} ({:.2} subunits)",
                cost.cost, cfg.currency, cost.subunits
            );
            println!("marginal rate: {} subunits/unit", marginal_rate(&table, usage));
            if cost.underflow() {
                warn!(
                    subunits = cost.subunits,
                    "tiers produced a negative cost, reported as zero"
                );
            }
        }
        Commands::Reads { input } => {
            ensure_initialized()?;
            let cfg = load_config()?;

            let raw = fs::read_to_string(&input)?;
            let meters: Vec<Meter> = serde_json::from_str(&raw)?;
            let engine = MeterCostEngine::new(&cfg);
            let reports: Vec<_> = meters.iter().map(|m| engine.read_cost(m)).collect();
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        Commands::Compare { input } => {
            let raw = fs::read_to_string(&input)?;
            let request: ComparisonInput = serde_json::from_str(&raw)?;
            let comparison = build_comparison(&request);
            println!("{}", serde_json::to_string_pretty(&comparison)?);
        }
    }

    Ok(())
}
