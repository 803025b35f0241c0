//! Model boundary
//!
//! The kernel knows nothing about what an event means. A model implements
//! [`EventHandler`]; the kernel calls it once per processed event and lets it
//! schedule new events through an [`LpContext`].

use crate::error::TimeWarpResult;
use crate::event::{Event, LpId};
use crate::process::LogicalProcess;
use crate::time::VirtualTime;

/// Event-generation policy injected into every LP.
///
/// Handlers must be deterministic functions of the event: an event undone by
/// a rollback is processed again and must produce the same effects (event ids
/// included). Work done here should be bounded and never block.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &Event, ctx: &mut LpContext<'_>) -> TimeWarpResult<()>;
}

impl<F> EventHandler for F
where
    F: Fn(&Event, &mut LpContext<'_>) -> TimeWarpResult<()> + Send + Sync,
{
    fn handle(&self, event: &Event, ctx: &mut LpContext<'_>) -> TimeWarpResult<()> {
        self(event, ctx)
    }
}

/// View of the processing LP handed to [`EventHandler::handle`]
pub struct LpContext<'a> {
    lp: &'a mut LogicalProcess,
}

impl<'a> LpContext<'a> {
    pub(crate) fn new(lp: &'a mut LogicalProcess) -> Self {
        Self { lp }
    }

    /// Local virtual time (the timestamp of the event being processed)
    pub fn now(&self) -> VirtualTime {
        self.lp.clock()
    }

    /// Index of the processing LP
    pub fn index(&self) -> LpId {
        self.lp.index()
    }

    pub fn lp_count(&self) -> usize {
        self.lp.lp_count()
    }

    pub fn end_time(&self) -> VirtualTime {
        self.lp.end_time()
    }

    /// Schedule `event` on LP `destination`.
    ///
    /// Events for the processing LP go straight into its heap; others are
    /// sent. Either way the send is remembered so that a rollback can cancel
    /// it.
    pub fn schedule(&mut self, event: Event, destination: LpId) -> TimeWarpResult<()> {
        self.lp.schedule(event, destination)
    }
}
