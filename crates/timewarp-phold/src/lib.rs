//! PHOLD benchmark for the Time Warp kernel
//!
//! The classic synthetic workload for optimistic simulators: entities
//! bounce events at each other with exponentially distributed delays. This
//! crate supplies the event-generation policy, seeded randomness,
//! configuration loading and reporting; `timewarp-core` does the rest.

pub mod config;
pub mod model;
pub mod randomness;
pub mod report;

pub use config::PholdConfig;
pub use model::{entity_to_lp, PholdModel};
pub use randomness::SeededRng;

use anyhow::{Context, Result};
use timewarp_core::{Simulation, SimulationReport};
use tracing::info;

/// Build, seed and run a PHOLD simulation.
pub async fn run_phold(config: &PholdConfig) -> Result<SimulationReport> {
    config.validate()?;
    let sim_config = config.simulation_config();
    let model = PholdModel::new(config, sim_config.lp_count)
        .context("Failed to set up the PHOLD model")?;
    let events = model.initial_events();

    info!(
        lps = sim_config.lp_count,
        entities = config.entity_count,
        initial_events = events.len(),
        end_time = config.end_time,
        fp_ops = config.fp_ops,
        "PHOLD configured"
    );

    let partition = model.clone();
    let mut simulation = Simulation::new(sim_config, model)?;
    simulation.seed(events, |event| partition.lp_of(event))?;
    let report = simulation.run().await.context("PHOLD simulation failed")?;
    Ok(report)
}
