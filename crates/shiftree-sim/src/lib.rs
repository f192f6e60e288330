//! shiftree-sim library.
//!
//! Drives a model through long random proposal sequences and checks, after
//! every step, that incremental propagation agrees with a full recomputation.
//!
//! # Conventions
//!
//! - **Errors**: Use `anyhow::Result` for return types.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `debug!`).

#![forbid(unsafe_code)]

pub mod campaign;
pub mod oracle;
pub mod tree_gen;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use shiftree_core::{ChainRng, Model, Settings, SpExPriors, SpeciationExtinction};
use tracing::debug;

use crate::oracle::{InvariantOracle, InvariantViolation, OracleResult};
pub use crate::tree_gen::{TreeShape, generate_tree};

/// Relative weights of the proposal kinds the simulator draws from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProposalWeights {
    pub add: u32,
    pub delete: u32,
    pub relocate: u32,
    pub event_rate: u32,
}

impl Default for ProposalWeights {
    fn default() -> Self {
        Self {
            add: 3,
            delete: 2,
            relocate: 6,
            event_rate: 1,
        }
    }
}

impl ProposalWeights {
    const fn total(&self) -> u32 {
        self.add + self.delete + self.relocate + self.event_rate
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn choose(&self, u: f64) -> ProposalKind {
        let ticket = ((u * f64::from(self.total())) as u32).min(self.total() - 1);
        if ticket < self.add {
            ProposalKind::Add
        } else if ticket < self.add + self.delete {
            ProposalKind::Delete
        } else if ticket < self.add + self.delete + self.relocate {
            ProposalKind::Relocate
        } else {
            ProposalKind::EventRate
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalKind {
    Add,
    Delete,
    Relocate,
    EventRate,
}

impl ProposalKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Delete => "delete",
            Self::Relocate => "relocate",
            Self::EventRate => "event-rate",
        }
    }
}

/// Configuration of one simulated chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub seed: u64,
    pub tips: usize,
    pub steps: usize,
    #[serde(default)]
    pub shape: TreeShape,
    #[serde(default = "default_mean_branch_length")]
    pub mean_branch_length: f64,
    /// Probability of accepting a proposal (percent, 0–100).
    #[serde(default = "default_accept_percent")]
    pub accept_percent: u8,
    #[serde(default)]
    pub weights: ProposalWeights,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub priors: SpExPriors,
}

const fn default_mean_branch_length() -> f64 {
    1.0
}

const fn default_accept_percent() -> u8 {
    50
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            tips: 16,
            steps: 200,
            shape: TreeShape::default(),
            mean_branch_length: default_mean_branch_length(),
            accept_percent: default_accept_percent(),
            weights: ProposalWeights::default(),
            settings: Settings::default(),
            priors: SpExPriors::default(),
        }
    }
}

impl SimulationConfig {
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        if self.tips < 2 {
            bail!("tips must be >= 2");
        }
        if self.accept_percent > 100 {
            bail!("accept_percent must be <= 100");
        }
        if self.weights.total() == 0 {
            bail!("at least one proposal weight must be > 0");
        }
        self.settings.validate()?;
        Ok(())
    }
}

/// What one simulation step did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub step: usize,
    pub kind: ProposalKind,
    /// Raw id of the touched event, if any.
    pub event: Option<u64>,
    /// `None` when the proposal was a no-op and nothing was decided.
    pub accepted: Option<bool>,
    pub events_after: usize,
}

#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub seed: u64,
    pub trace: Vec<TraceEvent>,
    pub oracle: OracleResult,
    pub final_events: usize,
    pub acceptance_rate: f64,
    /// Final configuration in event-data format.
    pub event_data: String,
}

impl SimulationResult {
    #[must_use]
    pub fn violations(&self) -> &[InvariantViolation] {
        &self.oracle.violations
    }
}

pub struct Simulator {
    config: SimulationConfig,
    model: Model<SpeciationExtinction>,
}

impl Simulator {
    /// Build the tree and model for `config.seed`.
    ///
    /// # Errors
    ///
    /// Returns an error when the config is invalid or the model cannot be built.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;

        let mut tree_rng = ChainRng::seed_from_u64(config.seed);
        let tree = generate_tree(
            config.shape,
            config.tips,
            config.mean_branch_length,
            &mut tree_rng,
        )
        .context("Failed to generate tree")?;

        let rate_model = SpeciationExtinction::new(config.priors)?;
        let chain_rng = ChainRng::seed_from_u64(config.seed.wrapping_add(0x5EED));
        let model = Model::new(tree, &config.settings, rate_model, chain_rng)?;

        Ok(Self { config, model })
    }

    #[must_use]
    pub const fn model(&self) -> &Model<SpeciationExtinction> {
        &self.model
    }

    /// Run every configured step.
    ///
    /// # Errors
    ///
    /// Returns an error if the model rejects an operation, which only happens
    /// when the proposal protocol itself is broken.
    pub fn run(&mut self) -> Result<SimulationResult> {
        let mut trace = Vec::with_capacity(self.config.steps);
        let mut oracle = OracleResult::pass();

        for step in 0..self.config.steps {
            let before = self.model.node_assignment();
            let kind = self.config.weights.choose(self.model.rng_mut().uniform_rv());
            let event = self.propose(kind)?;
            oracle = oracle.merge(InvariantOracle::check_all(step, &self.model));

            let accepted = if self.model.pending_proposal().is_clean() {
                None
            } else {
                let threshold = f64::from(self.config.accept_percent) / 100.0;
                let accepted = self.model.rng_mut().uniform_rv() < threshold;
                if accepted {
                    self.model.commit_proposal()?;
                } else {
                    self.model.revert_proposal()?;
                    oracle = oracle.merge(InvariantOracle::check_reverted(
                        step,
                        kind.label(),
                        &before,
                        &self.model,
                    ));
                }
                oracle = oracle.merge(InvariantOracle::check_all(step, &self.model));
                debug!(step, kind = kind.label(), accepted, "step decided");
                Some(accepted)
            };
            trace.push(self.trace_event(step, kind, event, accepted));
        }

        Ok(SimulationResult {
            seed: self.config.seed,
            trace,
            oracle,
            final_events: self.model.number_of_events(),
            acceptance_rate: self.model.acceptance_rate(),
            event_data: self.model.write_event_data(),
        })
    }

    fn propose(&mut self, kind: ProposalKind) -> Result<Option<u64>> {
        let id = match kind {
            ProposalKind::Add => Some(self.model.add_event_to_tree(None)?),
            ProposalKind::Delete => self.model.delete_random_event()?,
            ProposalKind::Relocate => self.model.propose_event_relocation()?,
            ProposalKind::EventRate => {
                self.model.propose_event_rate()?;
                None
            }
        };
        Ok(id.map(|id| id.0))
    }

    fn trace_event(
        &self,
        step: usize,
        kind: ProposalKind,
        event: Option<u64>,
        accepted: Option<bool>,
    ) -> TraceEvent {
        TraceEvent {
            step,
            kind,
            event,
            accepted,
            events_after: self.model.number_of_events(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SimulationConfig::default().validate().is_ok());
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let config = SimulationConfig {
            tips: 1,
            ..SimulationConfig::default()
        };
        assert!(config.validate().is_err());

        let config = SimulationConfig {
            weights: ProposalWeights {
                add: 0,
                delete: 0,
                relocate: 0,
                event_rate: 0,
            },
            ..SimulationConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn weights_partition_the_unit_interval() {
        let weights = ProposalWeights::default();
        assert_eq!(weights.choose(0.0), ProposalKind::Add);
        assert_eq!(weights.choose(0.26), ProposalKind::Delete);
        assert_eq!(weights.choose(0.5), ProposalKind::Relocate);
        assert_eq!(weights.choose(0.999), ProposalKind::EventRate);
    }

    #[test]
    fn simulation_passes_the_oracle() {
        for shape in [TreeShape::Balanced, TreeShape::Caterpillar, TreeShape::Random] {
            let config = SimulationConfig {
                seed: 11,
                shape,
                steps: 300,
                ..SimulationConfig::default()
            };
            let result = Simulator::new(config).unwrap().run().unwrap();
            assert_eq!(result.trace.len(), 300);
            assert!(result.oracle.passed, "{shape:?}: {:?}", result.violations());
        }
    }

    #[test]
    fn simulation_is_deterministic() {
        let config = SimulationConfig {
            seed: 99,
            steps: 150,
            ..SimulationConfig::default()
        };
        let a = Simulator::new(config.clone()).unwrap().run().unwrap();
        let b = Simulator::new(config).unwrap().run().unwrap();
        assert_eq!(a.trace, b.trace);
        assert_eq!(a.event_data, b.event_data);
    }

    #[test]
    fn always_accepting_grows_events() {
        let config = SimulationConfig {
            seed: 4,
            steps: 100,
            accept_percent: 100,
            weights: ProposalWeights {
                add: 1,
                delete: 0,
                relocate: 0,
                event_rate: 0,
            },
            ..SimulationConfig::default()
        };
        let result = Simulator::new(config).unwrap().run().unwrap();
        assert_eq!(result.final_events, 100);
        assert!((result.acceptance_rate - 1.0).abs() < f64::EPSILON);
    }
}
