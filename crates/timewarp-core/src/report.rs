//! Run summaries

use std::time::Duration;

use serde::Serialize;

use crate::event::LpId;
use crate::time::VirtualTime;

/// Counters of one logical process at shutdown
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LpReport {
    pub lp: LpId,
    /// Events processed and not undone by a rollback
    pub processed: u64,
    pub rollbacks: u64,
    /// Anti-messages synthesized by rollbacks (local and remote)
    pub anti_messages: u64,
    /// Event/anti-event pairs that cancelled out at this LP
    pub annihilations: u64,
    pub final_clock: VirtualTime,
    /// Last GVT adopted by this LP
    pub gvt: VirtualTime,
}

/// Outcome of [`crate::Simulation::run`]
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub end_time: VirtualTime,
    pub gvt: VirtualTime,
    pub gvt_evaluations: u64,
    pub wall_clock: Duration,
    /// Per-LP counters, ordered by LP index
    pub lps: Vec<LpReport>,
}

impl SimulationReport {
    pub fn total_processed(&self) -> u64 {
        self.lps.iter().map(|lp| lp.processed).sum()
    }

    pub fn total_rollbacks(&self) -> u64 {
        self.lps.iter().map(|lp| lp.rollbacks).sum()
    }

    pub fn total_anti_messages(&self) -> u64 {
        self.lps.iter().map(|lp| lp.anti_messages).sum()
    }
}
