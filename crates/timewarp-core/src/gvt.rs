//! Global Virtual Time evaluation
//!
//! A round collects one local lower bound from every LP. The LP that reports
//! last commits the round: the committed GVT is the minimum over all reported
//! values, where an LP with nothing pending reports no value at all. Rounds
//! are serialized by a single mutex, so exactly one commit happens per round.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::event::LpId;
use crate::time::VirtualTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Empty,
    /// `None` means the LP had nothing pending when it reported.
    Filled(Option<VirtualTime>),
}

#[derive(Debug)]
struct Round {
    slots: Vec<Slot>,
    active: bool,
    committed: VirtualTime,
    completed: u64,
}

/// Process-wide GVT reduction shared by every LP.
#[derive(Debug)]
pub struct GvtCoordinator {
    round: Mutex<Round>,
    /// Upper bound of any committed value (the simulation end time)
    horizon: VirtualTime,
}

impl GvtCoordinator {
    pub fn new(lp_count: usize, horizon: VirtualTime) -> Self {
        Self {
            round: Mutex::new(Round {
                slots: vec![Slot::Empty; lp_count],
                active: false,
                committed: VirtualTime::ZERO,
                completed: 0,
            }),
            horizon,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Round> {
        self.round.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a round over `lp_count` LPs.
    ///
    /// Returns `false` if a round is already running; the first requester
    /// wins and later requests have no effect.
    pub fn start_round(&self, lp_count: usize) -> bool {
        let mut round = self.lock();
        if round.active {
            return false;
        }
        round.slots = vec![Slot::Empty; lp_count];
        round.active = true;
        debug!(round = round.completed + 1, "GVT round started");
        true
    }

    /// Record the local minimum of `lp` for the running round.
    ///
    /// Returns the number of rounds completed before this one (the id of the
    /// round the value went into), or `None` when no round is running.
    pub fn set_local_minimum(&self, value: Option<VirtualTime>, lp: LpId) -> Option<u64> {
        let mut round = self.lock();
        if !round.active {
            return None;
        }
        let id = round.completed;
        let slot = round.slots.get_mut(lp.index())?;
        *slot = match *slot {
            // A second report in the same round keeps the lower bound
            Slot::Filled(Some(previous)) => Slot::Filled(Some(match value {
                Some(value) => value.min(previous),
                None => previous,
            })),
            _ => Slot::Filled(value),
        };

        if round.slots.iter().all(|slot| matches!(slot, Slot::Filled(_))) {
            let gvt = round
                .slots
                .iter()
                .filter_map(|slot| match slot {
                    Slot::Filled(value) => *value,
                    Slot::Empty => None,
                })
                .min()
                .map_or(self.horizon, |min| min.min(self.horizon));
            round.slots.fill(Slot::Empty);
            round.active = false;
            round.committed = gvt;
            round.completed += 1;
            debug!(round = round.completed, gvt = %gvt, "GVT committed");
        }
        Some(id)
    }

    /// Last committed GVT, or `None` while a round is running.
    pub fn committed_gvt(&self) -> Option<VirtualTime> {
        let round = self.lock();
        (!round.active).then_some(round.committed)
    }

    /// Number of committed rounds and the value of the latest one, also
    /// readable while the next round is running.
    pub fn last_commit(&self) -> (u64, VirtualTime) {
        let round = self.lock();
        (round.completed, round.committed)
    }

    /// Number of committed rounds (GVT evaluations)
    pub fn rounds_completed(&self) -> u64 {
        self.lock().completed
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    pub fn horizon(&self) -> VirtualTime {
        self.horizon
    }

    /// Close the simulation: once every LP is idle nothing earlier than the
    /// horizon can happen any more, so the horizon becomes the GVT.
    pub fn finalize(&self) {
        let mut round = self.lock();
        round.slots.fill(Slot::Empty);
        round.active = false;
        if round.committed < self.horizon {
            round.committed = self.horizon;
        }
    }
}
