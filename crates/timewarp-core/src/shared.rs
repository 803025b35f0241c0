//! State shared by every logical process
//!
//! The only cross-LP surfaces besides mailboxes: the run-state table, the
//! rollback counters and the GVT coordinator. Each LP writes its own run-state
//! entry; the termination transition writes all of them and runs under the
//! table lock.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::channel::PostOffice;
use crate::event::LpId;
use crate::gvt::GvtCoordinator;
use crate::time::VirtualTime;

/// Lifecycle of a logical process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunState {
    NotStarted,
    Running,
    /// Local minimum reported, waiting for the round to commit
    EvaluatingGvt,
    Idle,
    /// Terminal
    Stopped,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::NotStarted => write!(f, "not-started"),
            RunState::Running => write!(f, "running"),
            RunState::EvaluatingGvt => write!(f, "evaluating-gvt"),
            RunState::Idle => write!(f, "idle"),
            RunState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Outcome of [`SharedCoordinationState::enter_idle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleOutcome {
    /// Other LPs still have work; block on the mailbox.
    Wait,
    /// Every LP is idle and nothing is in flight: the simulation is over and
    /// every entry has been set to [`RunState::Stopped`].
    Terminate,
    /// Somebody already stopped this LP.
    Stopped,
}

/// Coordination surface passed by reference to every LP.
#[derive(Debug)]
pub struct SharedCoordinationState {
    end_time: VirtualTime,
    states: Mutex<Vec<RunState>>,
    rollbacks: Vec<AtomicU64>,
    gvt: GvtCoordinator,
}

impl SharedCoordinationState {
    pub fn new(lp_count: usize, end_time: VirtualTime) -> Self {
        Self {
            end_time,
            states: Mutex::new(vec![RunState::NotStarted; lp_count]),
            rollbacks: (0..lp_count).map(|_| AtomicU64::new(0)).collect(),
            gvt: GvtCoordinator::new(lp_count, end_time),
        }
    }

    fn states(&self) -> MutexGuard<'_, Vec<RunState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn lp_count(&self) -> usize {
        self.rollbacks.len()
    }

    pub fn end_time(&self) -> VirtualTime {
        self.end_time
    }

    pub fn gvt(&self) -> &GvtCoordinator {
        &self.gvt
    }

    pub fn state(&self, lp: LpId) -> RunState {
        self.states()
            .get(lp.index())
            .copied()
            .unwrap_or(RunState::Stopped)
    }

    pub fn is_stopped(&self, lp: LpId) -> bool {
        self.state(lp) == RunState::Stopped
    }

    /// Set the state of `lp` unless it is already stopped; returns the state
    /// in effect afterwards.
    pub fn set_state(&self, lp: LpId, state: RunState) -> RunState {
        let mut states = self.states();
        match states.get_mut(lp.index()) {
            Some(entry) if *entry != RunState::Stopped => {
                *entry = state;
                state
            }
            _ => RunState::Stopped,
        }
    }

    /// Mark `lp` idle and check for global quiescence.
    ///
    /// The simulation may end only when every LP is idle and no counted
    /// packet is in flight. Idle LPs never send, and a receiver leaves the
    /// idle state before it settles a packet, so holding the table lock while
    /// reading the in-flight counter makes the check exact.
    pub fn enter_idle(&self, lp: LpId, post: &PostOffice) -> IdleOutcome {
        let mut states = self.states();
        match states.get_mut(lp.index()) {
            Some(entry) if *entry != RunState::Stopped => *entry = RunState::Idle,
            _ => return IdleOutcome::Stopped,
        }

        if states.iter().all(|state| *state == RunState::Idle) && post.in_flight() == 0 {
            states.fill(RunState::Stopped);
            info!(lp = %lp, "all LPs idle, terminating");
            return IdleOutcome::Terminate;
        }
        IdleOutcome::Wait
    }

    /// Stop every LP (termination broadcast or fatal abort).
    pub fn stop_all(&self) {
        self.states().fill(RunState::Stopped);
    }

    pub fn record_rollback(&self, lp: LpId) {
        if let Some(counter) = self.rollbacks.get(lp.index()) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn rollbacks(&self, lp: LpId) -> u64 {
        self.rollbacks
            .get(lp.index())
            .map_or(0, |counter| counter.load(Ordering::Relaxed))
    }

    pub fn total_rollbacks(&self) -> u64 {
        self.rollbacks
            .iter()
            .map(|counter| counter.load(Ordering::Relaxed))
            .sum()
    }

    /// Number of committed GVT rounds
    pub fn gvt_evaluations(&self) -> u64 {
        self.gvt.rounds_completed()
    }
}
