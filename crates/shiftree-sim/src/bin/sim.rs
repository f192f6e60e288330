#![forbid(unsafe_code)]

use std::env;
use std::ops::Range;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use shiftree_sim::TreeShape;
use shiftree_sim::campaign::{CampaignConfig, format_violation, replay_seed, run_campaign};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "shiftree-sim: check event propagation invariants over seeded runs",
    long_about = None
)]
struct Cli {
    /// Seeds to run, as `start..end`.
    #[arg(long, value_parser = parse_seed_range)]
    seeds: Option<Range<u64>>,

    /// Proposals per seed.
    #[arg(long)]
    steps: Option<usize>,

    /// Tips in each generated tree.
    #[arg(long)]
    tips: Option<usize>,

    #[arg(long, value_enum)]
    shape: Option<TreeShape>,

    /// Campaign settings file (TOML). Flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Replay one seed and print its full trace.
    #[arg(long)]
    replay: Option<u64>,

    /// Emit JSON output instead of human-readable text.
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn campaign_config(&self) -> Result<CampaignConfig> {
        let mut config = match &self.config {
            Some(path) => CampaignConfig::load(path)?,
            None => CampaignConfig::default(),
        };
        if let Some(seeds) = &self.seeds {
            config.seed_range = seeds.clone();
        }
        if let Some(steps) = self.steps {
            config.steps = steps;
        }
        if let Some(tips) = self.tips {
            config.tips = tips;
        }
        if let Some(shape) = self.shape {
            config.shape = shape;
        }
        Ok(config)
    }
}

fn parse_seed_range(raw: &str) -> Result<Range<u64>> {
    let Some((start, end)) = raw.split_once("..") else {
        bail!("expected start..end, got '{raw}'");
    };
    let start = start.parse().context("invalid range start")?;
    let end = end.parse().context("invalid range end")?;
    Ok(start..end)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("SHIFTREE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "shiftree=debug,info"
        } else {
            "shiftree=info,warn"
        })
    });

    let format = env::var("SHIFTREE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry.with(fmt::layer().json().with_ansi(false)).init();
        }
        _ => {
            registry.with(fmt::layer().compact()).init();
        }
    }
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = cli.campaign_config()?;

    if let Some(seed) = cli.replay {
        let trace = replay_seed(seed, &config)?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&trace.result.trace)?);
        } else {
            for step in &trace.result.trace {
                println!(
                    "step={} kind={} event={:?} accepted={:?} events={}",
                    step.step,
                    step.kind.label(),
                    step.event,
                    step.accepted,
                    step.events_after
                );
            }
            for violation in &trace.oracle.violations {
                println!("violation: {}", format_violation(violation));
            }
            print!("{}", trace.result.event_data);
        }
        if !trace.oracle.passed {
            bail!("seed {seed} violated {} invariant(s)", trace.oracle.violations.len());
        }
        return Ok(());
    }

    info!(seeds = ?config.seed_range, steps = config.steps, "starting campaign");
    let report = run_campaign(&config)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "campaign complete: seeds_run={} seeds_passed={} decided_steps={}",
            report.seeds_run, report.seeds_passed, report.decided_steps
        );
        for failure in &report.failures {
            println!("seed {} failed:", failure.seed);
            for violation in &failure.violations {
                println!("  {violation}");
            }
        }
    }

    if let Some(seed) = report.first_failure {
        bail!("campaign failed; first failing seed {seed} (replay with --replay {seed})");
    }
    Ok(())
}
