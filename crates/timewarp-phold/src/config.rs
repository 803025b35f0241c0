//! Configuration for PHOLD runs
//!
//! Loaded from a TOML file; command-line flags override single values.

use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use timewarp_core::config::DEFAULT_GVT_THRESHOLD;
use timewarp_core::SimulationConfig;

//-----------------------------------------------------------------------------
// Configuration Structures
//-----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PholdConfig {
    /// Initial events per entity
    pub density: f64,
    /// Simulation horizon
    pub end_time: i64,
    /// Synthetic floating-point operations per processed event
    pub fp_ops: u32,
    /// Number of LPs; 0 uses every available core
    pub lp_count: usize,
    pub entity_count: u32,
    pub seed: u64,
    pub gvt_threshold: usize,
}

impl Default for PholdConfig {
    fn default() -> Self {
        Self {
            density: 0.5,
            end_time: 1_000,
            fp_ops: 1_000,
            lp_count: 0,
            entity_count: 1_000,
            seed: 1,
            gvt_threshold: DEFAULT_GVT_THRESHOLD,
        }
    }
}

impl PholdConfig {
    /// Read and validate a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read PHOLD config: {}", path.display()))?;
        let config: PholdConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse PHOLD config TOML: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.density.is_finite() && self.density > 0.0,
            "density must be positive, got {}",
            self.density
        );
        ensure!(self.end_time > 0, "end_time must be positive, got {}", self.end_time);
        ensure!(
            self.entity_count >= 2,
            "PHOLD needs at least two entities, got {}",
            self.entity_count
        );
        ensure!(self.gvt_threshold > 0, "gvt_threshold must be positive");
        Ok(())
    }

    /// Number of events created before the run starts
    pub fn initial_event_count(&self) -> i64 {
        (self.entity_count as f64 * self.density) as i64
    }

    /// Configured LP count, with 0 resolved to the available parallelism.
    ///
    /// Never more LPs than entities.
    pub fn resolved_lp_count(&self) -> usize {
        let lps = match self.lp_count {
            0 => std::thread::available_parallelism().map_or(1, |n| n.get()),
            n => n,
        };
        lps.min(self.entity_count as usize).max(1)
    }

    /// Kernel configuration for this run
    pub fn simulation_config(&self) -> SimulationConfig {
        SimulationConfig::new(self.resolved_lp_count(), self.end_time)
            .with_gvt_threshold(self.gvt_threshold)
    }
}
