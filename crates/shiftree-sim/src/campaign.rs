//! Campaign runner for deterministic simulation campaigns.
//!
//! Executes many seeds with the same parameters, collecting pass/fail results
//! and identifying the first failing seed for replay.

use std::ops::Range;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use shiftree_core::{Settings, SpExPriors};
use tracing::{info, warn};

use crate::oracle::{InvariantViolation, OracleResult};
use crate::{ProposalWeights, SimulationConfig, SimulationResult, Simulator, TreeShape};

/// Campaign-level configuration controlling how many seeds to run and
/// what simulation parameters to use for each seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Range of seeds to execute, e.g., `0..100`.
    pub seed_range: Range<u64>,
    pub tips: usize,
    /// Proposals per seed.
    pub steps: usize,
    #[serde(default)]
    pub shape: TreeShape,
    pub mean_branch_length: f64,
    /// Acceptance probability (percent, 0–100).
    pub accept_percent: u8,
    #[serde(default)]
    pub weights: ProposalWeights,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub priors: SpExPriors,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            seed_range: 0..100,
            tips: 16,
            steps: 200,
            shape: TreeShape::default(),
            mean_branch_length: 1.0,
            accept_percent: 50,
            weights: ProposalWeights::default(),
            settings: Settings::default(),
            priors: SpExPriors::default(),
        }
    }
}

impl CampaignConfig {
    /// Load a campaign from TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Build a [`SimulationConfig`] for a specific seed.
    #[must_use]
    pub fn sim_config_for_seed(&self, seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed,
            tips: self.tips,
            steps: self.steps,
            shape: self.shape,
            mean_branch_length: self.mean_branch_length,
            accept_percent: self.accept_percent,
            weights: self.weights,
            settings: self.settings.clone(),
            priors: self.priors,
        }
    }

    /// Validate configuration before running.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        if self.seed_range.is_empty() {
            bail!("seed_range must not be empty");
        }
        if self.steps == 0 {
            bail!("steps must be > 0");
        }
        self.sim_config_for_seed(self.seed_range.start).validate()
    }
}

/// Failure details for a single seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedFailure {
    pub seed: u64,
    pub violations: Vec<String>,
}

/// Aggregate report produced by a campaign run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub seeds_run: usize,
    pub seeds_passed: usize,
    /// First seed that failed (for prioritized replay).
    pub first_failure: Option<u64>,
    pub failures: Vec<SeedFailure>,
    /// Proposals that were actually decided across all seeds.
    pub decided_steps: usize,
}

impl CampaignReport {
    /// True if every seed passed.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Detailed trace produced by replaying a single seed.
#[derive(Debug, Clone)]
pub struct DetailedTrace {
    pub result: SimulationResult,
    pub oracle: OracleResult,
}

/// Run a full campaign across all seeds in the config.
///
/// # Errors
///
/// Returns an error if config validation fails or a simulation encounters
/// an internal error.
pub fn run_campaign(config: &CampaignConfig) -> Result<CampaignReport> {
    config.validate()?;

    let mut seeds_run = 0_usize;
    let mut seeds_passed = 0_usize;
    let mut first_failure: Option<u64> = None;
    let mut failures = Vec::new();
    let mut decided_steps = 0_usize;

    for seed in config.seed_range.clone() {
        seeds_run += 1;

        let (outcome, decided) = run_single_seed(seed, config)?;
        decided_steps += decided;
        match outcome {
            Ok(()) => {
                seeds_passed += 1;
            }
            Err(violations) => {
                warn!(seed, violations = violations.len(), "seed failed");
                if first_failure.is_none() {
                    first_failure = Some(seed);
                }
                failures.push(SeedFailure {
                    seed,
                    violations: violations.iter().map(format_violation).collect(),
                });
            }
        }
    }

    info!(seeds_run, seeds_passed, "campaign complete");
    Ok(CampaignReport {
        seeds_run,
        seeds_passed,
        first_failure,
        failures,
        decided_steps,
    })
}

/// Outcome of one seed: pass, or the violations found.
pub type SeedOutcome = std::result::Result<(), Vec<InvariantViolation>>;

/// Run a single seed. Also returns how many proposals were decided.
///
/// # Errors
///
/// Returns an `anyhow::Error` if the simulation itself encounters an internal
/// error (invalid config, etc). The inner `Result` distinguishes pass from
/// invariant violations.
pub fn run_single_seed(seed: u64, config: &CampaignConfig) -> Result<(SeedOutcome, usize)> {
    let mut simulator = Simulator::new(config.sim_config_for_seed(seed))?;
    let result = simulator.run()?;
    let decided = result
        .trace
        .iter()
        .filter(|step| step.accepted.is_some())
        .count();

    if result.oracle.passed {
        Ok((Ok(()), decided))
    } else {
        Ok((Err(result.oracle.violations), decided))
    }
}

/// Replay a single seed with full trace details for debugging.
///
/// # Errors
///
/// Returns an error when config validation or simulation fails.
pub fn replay_seed(seed: u64, config: &CampaignConfig) -> Result<DetailedTrace> {
    config.validate()?;

    let mut simulator = Simulator::new(config.sim_config_for_seed(seed))?;
    let result = simulator.run()?;
    let oracle = result.oracle.clone();

    Ok(DetailedTrace { result, oracle })
}

/// Format an invariant violation into a human-readable string.
#[must_use]
pub fn format_violation(v: &InvariantViolation) -> String {
    match v {
        InvariantViolation::NodeEventMismatch {
            step,
            node,
            cached,
            expected,
        } => format!("NodeEvent: step {step} node {node} caches {cached}, expected {expected}"),
        InvariantViolation::AncestralMismatch {
            step,
            node,
            cached,
            expected,
        } => format!(
            "AncestralEvent: step {step} node {node} caches {cached}, expected {expected}"
        ),
        InvariantViolation::RegistryHistoryMismatch {
            step,
            registered,
            stored,
        } => format!(
            "RegistryHistory: step {step} has {registered} registered events \
             but {stored} stored in branch histories"
        ),
        InvariantViolation::EventHomeMismatch { step, event, node } => {
            format!("EventHome: step {step} event {event} is not stored on node {node}")
        }
        InvariantViolation::Reversibility {
            step,
            proposal,
            differing_nodes,
        } => format!(
            "Reversibility: step {step} revert of {proposal} left {} node(s) changed \
             ({differing_nodes:?})",
            differing_nodes.len()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shiftree_core::{EventId, NodeId};
    use std::io::Write;

    #[test]
    fn campaign_config_default_is_valid() {
        assert!(CampaignConfig::default().validate().is_ok());
    }

    #[test]
    fn campaign_config_empty_seed_range_rejected() {
        let config = CampaignConfig {
            seed_range: 5..5,
            ..CampaignConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn campaign_config_zero_steps_rejected() {
        let config = CampaignConfig {
            steps: 0,
            ..CampaignConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn sim_config_for_seed_uses_correct_seed() {
        let config = CampaignConfig::default();
        let sim = config.sim_config_for_seed(42);
        assert_eq!(sim.seed, 42);
        assert_eq!(sim.tips, config.tips);
        assert_eq!(sim.steps, config.steps);
    }

    #[test]
    fn run_campaign_all_seeds_pass() {
        let config = CampaignConfig {
            seed_range: 0..20,
            tips: 12,
            steps: 150,
            shape: TreeShape::Random,
            ..CampaignConfig::default()
        };
        let report = run_campaign(&config).expect("campaign should not error");
        assert_eq!(report.seeds_run, 20);
        assert!(
            report.all_passed(),
            "campaign failed: {:?}",
            report.failures.first()
        );
        assert!(report.first_failure.is_none());
        assert!(report.decided_steps > 0);
    }

    #[test]
    fn replay_is_deterministic() {
        let config = CampaignConfig {
            seed_range: 0..1,
            steps: 80,
            ..CampaignConfig::default()
        };

        let trace1 = replay_seed(7, &config).expect("replay 1");
        let trace2 = replay_seed(7, &config).expect("replay 2");

        assert_eq!(trace1.result.trace, trace2.result.trace);
        assert_eq!(trace1.result.event_data, trace2.result.event_data);
        assert!(trace1.oracle.passed);
    }

    #[test]
    fn campaign_loads_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "seed_range = {{ start = 3, end = 6 }}\n\
             tips = 8\n\
             steps = 40\n\
             shape = \"caterpillar\"\n\
             mean_branch_length = 0.5\n\
             accept_percent = 30\n\
             \n\
             [settings]\n\
             local_global_move_ratio = 2.0\n"
        )
        .unwrap();

        let config = CampaignConfig::load(file.path()).unwrap();
        assert_eq!(config.seed_range, 3..6);
        assert_eq!(config.shape, TreeShape::Caterpillar);
        assert!((config.settings.local_global_move_ratio - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.weights, ProposalWeights::default());
        assert!(run_campaign(&config).unwrap().all_passed());
    }

    #[test]
    fn campaign_report_serializes_to_json() {
        let report = CampaignReport {
            seeds_run: 10,
            seeds_passed: 9,
            first_failure: Some(7),
            failures: vec![SeedFailure {
                seed: 7,
                violations: vec!["NodeEvent: step 3 node n4 caches e2, expected root".into()],
            }],
            decided_steps: 1500,
        };
        let json = serde_json::to_string(&report).expect("serialize");
        assert!(json.contains("\"seeds_run\":10"));
        assert!(json.contains("\"first_failure\":7"));
    }

    #[test]
    fn format_violation_produces_readable_strings() {
        let v = InvariantViolation::NodeEventMismatch {
            step: 3,
            node: NodeId(4),
            cached: EventId(2),
            expected: EventId::ROOT,
        };
        let s = format_violation(&v);
        assert_eq!(s, "NodeEvent: step 3 node n4 caches e2, expected root");
    }
}
