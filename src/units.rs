use crate::config::ConversionConfig;
use crate::models::UtilityType;

/// Converts meter-reported quantities into the units rate tables use.
#[derive(Debug, Clone, Copy)]
pub struct UnitConverter {
    conversion: ConversionConfig,
}

impl UnitConverter {
    pub fn new(conversion: ConversionConfig) -> Self {
        Self { conversion }
    }

    pub fn to_billing_units(&self, utility: UtilityType, usage: f64) -> f64 {
        match utility {
            UtilityType::Gas => usage / self.conversion.ccf_to_dth,
            UtilityType::Water => usage / self.conversion.gal_to_ccf,
            UtilityType::Power | UtilityType::Solar => usage,
        }
    }
}
