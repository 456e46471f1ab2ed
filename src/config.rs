use crate::error::AppError;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const SERVICE_NAME: &str = "meter-cost";
const ENV_PREFIX: &str = "METER_COST";

fn app_home_dir() -> Result<PathBuf, AppError> {
    if let Ok(custom) = std::env::var("METER_COST_HOME") {
        return Ok(PathBuf::from(custom));
    }

    if let Some(dirs) = ProjectDirs::from("com", "neubell", SERVICE_NAME) {
        let candidate = dirs.data_local_dir().to_path_buf();
        if fs::create_dir_all(&candidate).is_ok() {
            return Ok(candidate);
        }
    }

    let cwd = std::env::current_dir()?;
    Ok(cwd.join(".meter-cost"))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub conversion: ConversionConfig,
    /// Subunits per billing unit for meters without any rate schedule.
    pub default_rate: f64,
    pub currency: String,
}

/// Divisors from meter-reported units to billing units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Hundred cubic feet of gas per dekatherm.
    pub ccf_to_dth: f64,
    /// Gallons of water per hundred cubic feet.
    pub gal_to_ccf: f64,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            ccf_to_dth: 9.643,
            gal_to_ccf: 748.052,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            conversion: ConversionConfig::default(),
            default_rate: 1.0,
            currency: "USD".into(),
        }
    }
}

pub fn config_dir() -> Result<PathBuf, AppError> {
    Ok(app_home_dir()?.join("config"))
}

pub fn data_dir() -> Result<PathBuf, AppError> {
    Ok(app_home_dir()?.join("data"))
}

pub fn config_path() -> Result<PathBuf, AppError> {
    Ok(config_dir()?.join("config.toml"))
}

pub fn ensure_dirs() -> Result<(), AppError> {
    fs::create_dir_all(config_dir()?)?;
    fs::create_dir_all(data_dir()?)?;
    Ok(())
}

fn validate_factor(name: &str, value: f64) -> Result<(), AppError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(AppError::Config(format!(
            "{name} must be a positive number, got {value}"
        )));
    }
    Ok(())
}

pub fn validate_config(config: &AppConfig) -> Result<(), AppError> {
    validate_factor("conversion.ccf_to_dth", config.conversion.ccf_to_dth)?;
    validate_factor("conversion.gal_to_ccf", config.conversion.gal_to_ccf)?;
    if !config.default_rate.is_finite() || config.default_rate < 0.0 {
        return Err(AppError::Config(format!(
            "default_rate must be zero or positive, got {}",
            config.default_rate
        )));
    }
    if config.currency.trim().is_empty() {
        return Err(AppError::Config("currency must not be empty".into()));
    }
    Ok(())
}

/// Layers the config file under `METER_COST__*` environment overrides,
/// e.g. `METER_COST__CONVERSION__CCF_TO_DTH=10`.
pub fn load_config_from(path: &Path) -> Result<AppConfig, AppError> {
    let settings = ::config::Config::builder()
        .add_source(::config::File::from(path.to_path_buf()).required(false))
        .add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let parsed: AppConfig = settings.try_deserialize()?;
    validate_config(&parsed)?;
    Ok(parsed)
}

pub fn load_config() -> Result<AppConfig, AppError> {
    load_config_from(&config_path()?)
}

pub fn save_config(config: &AppConfig) -> Result<(), AppError> {
    ensure_dirs()?;
    let path = config_path()?;
    let raw = toml::to_string_pretty(config)?;
    fs::write(path, raw)?;
    Ok(())
}

pub fn ensure_initialized() -> Result<(), AppError> {
    ensure_dirs()?;
    let cfg_path = config_path()?;
    if !Path::new(&cfg_path).exists() {
        save_config(&AppConfig::default())?;
    }
    Ok(())
}
