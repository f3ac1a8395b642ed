use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::{ensure_non_negative, BillingResult};

/// Environment prefix, e.g. `BILLING_ENGINE__SPLIT_TOLERANCE=0.05`.
pub const ENV_PREFIX: &str = "BILLING_ENGINE";

/// Engine tunables. Every field has a default, so an empty source is valid.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Largest accepted gap between split components and the amount paid (exclusive).
    pub split_tolerance: Decimal,
    /// Decimal places used when amounts are rendered into notes and reports.
    pub display_scale: u32,
    pub currency_symbol: String,
    /// Selecting a single-tender method on a new bill fills the amount paid with the grand total.
    pub full_settlement_on_new_bill: bool,
    /// Entering a split method with no split yet seeds a 50/50 suggestion.
    pub seed_split_on_method_change: bool,
    /// Lines with a blank service name are left out of the committed record.
    pub exclude_incomplete_lines_on_commit: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            split_tolerance: Decimal::new(1, 2),
            display_scale: 2,
            currency_symbol: "₹".to_string(),
            full_settlement_on_new_bill: true,
            seed_split_on_method_change: true,
            exclude_incomplete_lines_on_commit: true,
        }
    }
}

impl EngineConfig {
    /// Loads the config from an optional file overlaid with `BILLING_ENGINE__*` variables.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::Config` when a source cannot be parsed and
    /// `BillingError::InvalidInput` for a negative split tolerance.
    pub fn load(path: Option<&Path>) -> BillingResult<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(false));
        }

        let settings = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns `BillingError::InvalidInput` for a negative split tolerance.
    pub fn validate(&self) -> BillingResult<()> {
        ensure_non_negative("split_tolerance", self.split_tolerance)?;
        Ok(())
    }

    /// Rounds `amount` half away from zero to the display scale, pads it to
    /// that many places and prefixes the currency symbol.
    pub fn format_amount(&self, amount: Decimal) -> String {
        let mut rounded = amount.round_dp_with_strategy(
            self.display_scale,
            rust_decimal::RoundingStrategy::MidpointAwayFromZero,
        );
        rounded.rescale(self.display_scale);
        format!("{}{rounded}", self.currency_symbol)
    }
}
