use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ModelError;

/// Chain settings read once when a model is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Local-move jitter as a fraction of the maximum root-to-tip length.
    #[serde(default = "default_location_scale")]
    pub update_event_location_scale: f64,
    #[serde(default = "default_rate_scale")]
    pub update_event_rate_scale: f64,
    /// Odds of a local move against a global move.
    #[serde(default = "default_local_global_ratio")]
    pub local_global_move_ratio: f64,
    #[serde(default = "default_poisson_rate_prior")]
    pub poisson_rate_prior: f64,
    #[serde(default)]
    pub event_data_infile: Option<PathBuf>,
    #[serde(default = "default_warmup_draws")]
    pub rng_warmup_draws: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            update_event_location_scale: default_location_scale(),
            update_event_rate_scale: default_rate_scale(),
            local_global_move_ratio: default_local_global_ratio(),
            poisson_rate_prior: default_poisson_rate_prior(),
            event_data_infile: None,
            rng_warmup_draws: default_warmup_draws(),
        }
    }
}

impl Settings {
    /// Reject values the move proposer cannot use.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidSettings`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ModelError> {
        let positive = [
            ("update_event_location_scale", self.update_event_location_scale),
            ("update_event_rate_scale", self.update_event_rate_scale),
            ("local_global_move_ratio", self.local_global_move_ratio),
            ("poisson_rate_prior", self.poisson_rate_prior),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ModelError::InvalidSettings(format!(
                    "{name} must be positive and finite, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Load settings from a TOML file. Missing fields take their defaults.
pub fn load_settings(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let settings = toml::from_str::<Settings>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    settings
        .validate()
        .with_context(|| format!("Invalid settings in {}", path.display()))?;
    Ok(settings)
}

const fn default_location_scale() -> f64 {
    0.05
}

const fn default_rate_scale() -> f64 {
    4.0
}

const fn default_local_global_ratio() -> f64 {
    10.0
}

const fn default_poisson_rate_prior() -> f64 {
    1.0
}

const fn default_warmup_draws() -> u32 {
    100
}
