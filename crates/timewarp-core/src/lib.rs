//! Time Warp Simulation Kernel
//!
//! Optimistic parallel discrete-event simulation. Each logical process (LP)
//! runs as its own tokio task and executes events ahead of global time;
//! causality violations are repaired by rollback and anti-messages, and a
//! periodically computed Global Virtual Time (GVT) bounds the history each LP
//! keeps.
//!
//! ## Core Components
//!
//! - **EventHeap**: per-LP future-event set, bucketed by timestamp
//! - **OrderedLog**: time-ordered history used for rollback and fossil collection
//! - **PostOffice / Mailbox**: bounded non-blocking LP-to-LP transport
//! - **GvtCoordinator**: shared GVT reduction
//! - **Simulation**: spawns the LPs and collects their reports
//!
//! ## Getting Started
//! ```rust,no_run
//! use timewarp_core::{Event, LpContext, LpId, Payload, Simulation, SimulationConfig, TimeWarpResult};
//!
//! fn ping(event: &Event, ctx: &mut LpContext<'_>) -> TimeWarpResult<()> {
//!     let next = LpId::from((ctx.index().index() + 1) % ctx.lp_count());
//!     ctx.schedule(Event::new(event.id.raw() + 1, ctx.now() + 1, Payload::default()), next)
//! }
//!
//! # async fn run() -> TimeWarpResult<()> {
//! let mut simulation = Simulation::new(SimulationConfig::new(2, 100), ping)?;
//! simulation.seed_lp(LpId::new(0), Event::new(1, 0, Payload::default()))?;
//! let report = simulation.run().await?;
//! println!("processed {} events", report.total_processed());
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod event;
pub mod gvt;
pub mod handler;
pub mod heap;
pub mod log;
mod process;
pub mod report;
pub mod shared;
pub mod simulation;
pub mod time;

// Core exports
pub use config::SimulationConfig;
pub use error::{TimeWarpError, TimeWarpResult};
pub use event::{
    AckOwnership, Acknowledgement, Event, EventFlag, EventId, LpId, Message, Packet, Payload,
    TimedMessage,
};
pub use gvt::GvtCoordinator;
pub use handler::{EventHandler, LpContext};
pub use heap::{EventHeap, HeapError};
pub use log::{OrderedLog, Timestamped};
pub use report::{LpReport, SimulationReport};
pub use shared::{RunState, SharedCoordinationState};
pub use simulation::Simulation;
pub use time::VirtualTime;
