//! Runs a battle described in a JSON file with the built-in sample robots.
//!
//! ```text
//! robobattle --config battle.json --rounds 3 --seed 7
//! ```
//!
//! A battle file holds an optional `battle` section (a `BattleConfig`) and a
//! list of contestants, each either a robot class name or a team:
//!
//! ```json
//! {
//!   "battle": { "rules": { "rounds": 5 } },
//!   "robots": [
//!     "sample.Tracker",
//!     { "team": "Ducks", "members": ["sample.SittingDuck", "sample.Spinner"] }
//!   ]
//! }
//! ```

mod samples;

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use robobattle_core::config::WakePolicy;
use robobattle_core::prelude::*;
use robobattle_core::telemetry::{TelemetryConfig, TelemetryObserver};
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "robobattle", version, about = "Run a robot battle from a JSON battle file")]
struct Cli {
    /// Battle file to run.
    #[arg(short, long)]
    config: PathBuf,

    /// Override the number of rounds.
    #[arg(long)]
    rounds: Option<u32>,

    /// Override the battle seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Wake all robots at once instead of one after another.
    #[arg(long)]
    parallel: bool,

    /// Cap the simulation speed in ticks per second.
    #[arg(long)]
    max_tps: Option<u32>,

    /// Log periodic per-robot telemetry reports.
    #[arg(long)]
    telemetry: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

/// Contents of a battle file.
#[derive(Debug, Deserialize)]
struct BattleFile {
    #[serde(default)]
    battle: BattleConfig,
    robots: Vec<ContestantFile>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContestantFile {
    Robot(String),
    Team { team: String, members: Vec<String> },
}

impl BattleFile {
    fn apply(&mut self, cli: &Cli) {
        if let Some(rounds) = cli.rounds {
            self.battle.rules.rounds = rounds;
        }
        if let Some(seed) = cli.seed {
            self.battle.seed = seed;
        }
        if cli.parallel {
            self.battle.budget.policy = WakePolicy::Parallel;
        }
        if cli.max_tps.is_some() {
            self.battle.max_tps = cli.max_tps;
        }
    }

    fn builder(&self) -> Result<BattleBuilder> {
        let budget = self.battle.budget.turn_budget();
        let sample = |name: &str| {
            samples::lookup(name, budget).with_context(|| {
                format!(
                    "no sample robot for {name}; known classes: {}",
                    samples::SAMPLE_NAMES.join(", ")
                )
            })
        };

        let mut builder = Battle::builder(self.battle.clone());
        for contestant in &self.robots {
            builder = match contestant {
                ContestantFile::Robot(name) => builder.robot(sample(name)?),
                ContestantFile::Team { team, members } => {
                    let members = members.iter().map(|m| sample(m)).collect::<Result<_>>()?;
                    builder.team(team.clone(), members)
                }
            };
        }
        Ok(builder)
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }
}

fn print_results(results: &[ContestantResult]) {
    println!(
        "{:<5} {:<32} {:>8} {:>9} {:>7} {:>8} {:>6} {:>4} {:>4} {:>4}",
        "Rank", "Name", "Total", "Survival", "Bonus", "Damage", "Kills", "1st", "2nd", "3rd"
    );
    for result in results {
        let score = &result.score;
        println!(
            "{:<5} {:<32} {:>8.0} {:>9.0} {:>7.0} {:>8.0} {:>6.0} {:>4} {:>4} {:>4}",
            result.rank,
            result.name,
            result.total_score(),
            score.survival,
            score.last_survivor_bonus,
            score.bullet_damage,
            score.bullet_kill_bonus,
            score.firsts,
            score.seconds,
            score.thirds,
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let text = fs::read_to_string(&cli.config)
        .with_context(|| format!("failed to read battle file: {}", cli.config.display()))?;
    let mut file: BattleFile = serde_json::from_str(&text)
        .with_context(|| format!("invalid battle file: {}", cli.config.display()))?;
    file.apply(&cli);

    let mut builder = file.builder()?;
    if cli.telemetry {
        builder = builder.observer(Box::new(TelemetryObserver::new(TelemetryConfig::default())));
    }
    let mut battle = builder.build().context("failed to set up battle")?;

    info!(
        robots = battle.registry().robots().len(),
        rounds = file.battle.rules.rounds,
        seed = file.battle.seed,
        "starting battle"
    );
    let results = battle.run().context("battle failed")?;
    print_results(&results);
    Ok(())
}
