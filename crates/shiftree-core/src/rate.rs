//! Model-specific event parameters and per-branch mean rates.
//!
//! The engine never interprets parameters itself. A [`RateModel`] says how to
//! draw them for a new event, how to read and write them in event-data
//! records, and how to integrate each rate component over a stretch of branch
//! governed by one event.

use std::fmt;

use rand_distr::{Exp, Normal};
use serde::{Deserialize, Serialize};

use crate::rng::ChainRng;

/// Problems with the parameter fields of one event record.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParameterError {
    #[error("expected {expected} parameter fields, found {found}")]
    Count { expected: usize, found: usize },

    #[error("parameter '{name}' is not a number: '{value}'")]
    NotANumber { name: &'static str, value: String },

    #[error("parameter '{name}' out of range: {value}")]
    OutOfDomain { name: &'static str, value: f64 },
}

pub trait RateModel {
    type Params: Clone + fmt::Debug + PartialEq;

    /// Number of whitespace-separated fields per event record.
    fn parameter_count(&self) -> usize;

    /// Number of rate components averaged per branch.
    fn rate_components(&self) -> usize;

    /// Parameters of the root event when a model is first built.
    fn root_parameters(&self) -> Self::Params;

    /// Fresh parameters for a newly created event.
    fn draw_parameters(&self, rng: &mut ChainRng) -> Self::Params;

    /// Parse exactly [`RateModel::parameter_count`] fields.
    ///
    /// # Errors
    ///
    /// Returns a [`ParameterError`] on a wrong field count, a non-numeric
    /// field, or a value outside the parameter's domain.
    fn read_parameters(&self, fields: &[&str]) -> Result<Self::Params, ParameterError>;

    /// Render parameters so that [`RateModel::read_parameters`] reads them back.
    fn write_parameters(&self, params: &Self::Params) -> Vec<String>;

    /// Add the integral of each rate component between elapsed times `from`
    /// and `to` (both measured from the governing event) into `out`.
    fn segment_integral(&self, params: &Self::Params, from: f64, to: f64, out: &mut [f64]);
}

fn parse_field(name: &'static str, raw: &str) -> Result<f64, ParameterError> {
    let value: f64 = raw.parse().map_err(|_| ParameterError::NotANumber {
        name,
        value: raw.to_string(),
    })?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ParameterError::OutOfDomain { name, value })
    }
}

fn exp_prior(name: &'static str, rate: f64) -> Result<Exp<f64>, ParameterError> {
    if !(rate.is_finite() && rate > 0.0) {
        return Err(ParameterError::OutOfDomain { name, value: rate });
    }
    Exp::new(rate).map_err(|_| ParameterError::OutOfDomain { name, value: rate })
}

fn check_count(expected: usize, fields: &[&str]) -> Result<(), ParameterError> {
    if fields.len() == expected {
        Ok(())
    } else {
        Err(ParameterError::Count {
            expected,
            found: fields.len(),
        })
    }
}

/// One time-constant rate per regime; new rates are exponential draws.
#[derive(Debug, Clone)]
pub struct ConstantRate {
    root_rate: f64,
    prior: Exp<f64>,
}

impl ConstantRate {
    /// # Errors
    ///
    /// Fails if `root_rate` is negative or `prior_rate` is not positive.
    pub fn new(root_rate: f64, prior_rate: f64) -> Result<Self, ParameterError> {
        if !(root_rate.is_finite() && root_rate >= 0.0) {
            return Err(ParameterError::OutOfDomain {
                name: "rate",
                value: root_rate,
            });
        }
        let prior = exp_prior("prior_rate", prior_rate)?;
        Ok(Self { root_rate, prior })
    }
}

impl RateModel for ConstantRate {
    type Params = f64;

    fn parameter_count(&self) -> usize {
        1
    }

    fn rate_components(&self) -> usize {
        1
    }

    fn root_parameters(&self) -> f64 {
        self.root_rate
    }

    fn draw_parameters(&self, rng: &mut ChainRng) -> f64 {
        rng.sample(&self.prior)
    }

    fn read_parameters(&self, fields: &[&str]) -> Result<f64, ParameterError> {
        check_count(1, fields)?;
        let rate = parse_field("rate", fields[0])?;
        if rate < 0.0 {
            return Err(ParameterError::OutOfDomain {
                name: "rate",
                value: rate,
            });
        }
        Ok(rate)
    }

    fn write_parameters(&self, params: &f64) -> Vec<String> {
        vec![params.to_string()]
    }

    fn segment_integral(&self, params: &f64, from: f64, to: f64, out: &mut [f64]) {
        out[0] += params * (to - from);
    }
}

/// Parameters of one speciation/extinction regime.
///
/// Speciation decays or grows exponentially from the event:
/// `lambda(t) = lambda_init * exp(lambda_shift * t)`; extinction is constant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpExParams {
    pub lambda_init: f64,
    pub lambda_shift: f64,
    pub mu_init: f64,
}

/// Prior settings for [`SpeciationExtinction`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpExPriors {
    #[serde(default = "default_lambda_init")]
    pub root_lambda_init: f64,
    #[serde(default)]
    pub root_lambda_shift: f64,
    #[serde(default = "default_mu_init")]
    pub root_mu_init: f64,
    /// Rate of the exponential prior on `lambda_init`.
    #[serde(default = "default_prior_rate")]
    pub lambda_init_prior: f64,
    /// Standard deviation of the zero-mean normal prior on `lambda_shift`.
    #[serde(default = "default_shift_sd")]
    pub lambda_shift_prior_sd: f64,
    /// Rate of the exponential prior on `mu_init`.
    #[serde(default = "default_prior_rate")]
    pub mu_init_prior: f64,
}

const fn default_lambda_init() -> f64 {
    0.2
}

const fn default_mu_init() -> f64 {
    0.05
}

const fn default_prior_rate() -> f64 {
    1.0
}

const fn default_shift_sd() -> f64 {
    0.05
}

impl Default for SpExPriors {
    fn default() -> Self {
        Self {
            root_lambda_init: default_lambda_init(),
            root_lambda_shift: 0.0,
            root_mu_init: default_mu_init(),
            lambda_init_prior: default_prior_rate(),
            lambda_shift_prior_sd: default_shift_sd(),
            mu_init_prior: default_prior_rate(),
        }
    }
}

/// Time-varying speciation with constant extinction.
///
/// Rate components are `[lambda, mu]`.
#[derive(Debug, Clone)]
pub struct SpeciationExtinction {
    root: SpExParams,
    lambda_init_prior: Exp<f64>,
    lambda_shift_prior: Normal<f64>,
    mu_init_prior: Exp<f64>,
}

impl SpeciationExtinction {
    /// # Errors
    ///
    /// Fails if a prior rate or standard deviation is invalid, or the root
    /// parameters are outside their domain.
    pub fn new(priors: SpExPriors) -> Result<Self, ParameterError> {
        let root = SpExParams {
            lambda_init: priors.root_lambda_init,
            lambda_shift: priors.root_lambda_shift,
            mu_init: priors.root_mu_init,
        };
        validate(&root)?;

        let sd = priors.lambda_shift_prior_sd;
        let lambda_shift_prior = Normal::new(0.0, sd).map_err(|_| ParameterError::OutOfDomain {
            name: "lambda_shift_prior_sd",
            value: sd,
        })?;

        Ok(Self {
            root,
            lambda_init_prior: exp_prior("lambda_init_prior", priors.lambda_init_prior)?,
            lambda_shift_prior,
            mu_init_prior: exp_prior("mu_init_prior", priors.mu_init_prior)?,
        })
    }
}

fn validate(params: &SpExParams) -> Result<(), ParameterError> {
    if params.lambda_init <= 0.0 || !params.lambda_init.is_finite() {
        return Err(ParameterError::OutOfDomain {
            name: "lambda_init",
            value: params.lambda_init,
        });
    }
    if !params.lambda_shift.is_finite() {
        return Err(ParameterError::OutOfDomain {
            name: "lambda_shift",
            value: params.lambda_shift,
        });
    }
    if params.mu_init < 0.0 || !params.mu_init.is_finite() {
        return Err(ParameterError::OutOfDomain {
            name: "mu_init",
            value: params.mu_init,
        });
    }
    Ok(())
}

impl RateModel for SpeciationExtinction {
    type Params = SpExParams;

    fn parameter_count(&self) -> usize {
        3
    }

    fn rate_components(&self) -> usize {
        2
    }

    fn root_parameters(&self) -> SpExParams {
        self.root
    }

    fn draw_parameters(&self, rng: &mut ChainRng) -> SpExParams {
        SpExParams {
            lambda_init: rng.sample(&self.lambda_init_prior),
            lambda_shift: rng.sample(&self.lambda_shift_prior),
            mu_init: rng.sample(&self.mu_init_prior),
        }
    }

    fn read_parameters(&self, fields: &[&str]) -> Result<SpExParams, ParameterError> {
        check_count(3, fields)?;
        let params = SpExParams {
            lambda_init: parse_field("lambda_init", fields[0])?,
            lambda_shift: parse_field("lambda_shift", fields[1])?,
            mu_init: parse_field("mu_init", fields[2])?,
        };
        validate(&params)?;
        Ok(params)
    }

    fn write_parameters(&self, params: &SpExParams) -> Vec<String> {
        vec![
            params.lambda_init.to_string(),
            params.lambda_shift.to_string(),
            params.mu_init.to_string(),
        ]
    }

    fn segment_integral(&self, params: &SpExParams, from: f64, to: f64, out: &mut [f64]) {
        let k = params.lambda_shift;
        out[0] += if k.abs() < 1e-12 {
            params.lambda_init * (to - from)
        } else {
            params.lambda_init * ((k * to).exp() - (k * from).exp()) / k
        };
        out[1] += params.mu_init * (to - from);
    }
}
