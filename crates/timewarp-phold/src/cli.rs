// Purpose: Provides the command-line interface for PHOLD runs.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use timewarp_phold::report::render;
use timewarp_phold::{run_phold, PholdConfig};

/// PHOLD benchmark on the Time Warp kernel
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// PHOLD configuration file (TOML)
    #[clap(long, short, env = "PHOLD_CONFIG", default_value = "phold.toml")]
    config: PathBuf,

    /// Number of LPs; 0 uses every available core
    #[clap(long, env = "PHOLD_LPS")]
    lps: Option<usize>,

    /// Number of entities
    #[clap(long, env = "PHOLD_ENTITIES")]
    entities: Option<u32>,

    /// Simulation end time
    #[clap(long)]
    end_time: Option<i64>,

    /// Run seed
    #[clap(long, env = "PHOLD_SEED")]
    seed: Option<u64>,

    /// Print the report as JSON instead of text
    #[clap(long)]
    json: bool,
}

impl Cli {
    /// File settings with command-line overrides applied
    fn resolve_config(&self) -> Result<PholdConfig> {
        let mut config = if self.config.exists() {
            PholdConfig::load(&self.config)?
        } else {
            warn!(path = %self.config.display(), "config file not found, using defaults");
            PholdConfig::default()
        };

        if let Some(lps) = self.lps {
            config.lp_count = lps;
        }
        if let Some(entities) = self.entities {
            config.entity_count = entities;
        }
        if let Some(end_time) = self.end_time {
            config.end_time = end_time;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        config.validate()?;
        Ok(config)
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;
    if config.lp_count == 0 {
        info!(
            lps = config.resolved_lp_count(),
            "LP count 0: using every available core"
        );
    }

    let report = run_phold(&config).await?;

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        println!("{json}");
    } else {
        println!("{}", render(&report));
    }
    Ok(())
}
