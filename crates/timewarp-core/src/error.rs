//! Error types for the Time Warp kernel
//!
//! Every variant except `Configuration` denotes a broken invariant: the whole
//! simulation stops, because causality bookkeeping can no longer be trusted.

//-----------------------------------------------------------------------------
// Error Types
//-----------------------------------------------------------------------------

use thiserror::Error;

use crate::event::{EventId, LpId};
use crate::heap::HeapError;
use crate::time::VirtualTime;

/// Main error type for the kernel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeWarpError {
    /// Invalid simulation setup, reported before any LP starts.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The future-event heap of an LP rejected an event.
    #[error("LP {lp}: event heap error: {source}")]
    Heap {
        lp: LpId,
        #[source]
        source: HeapError,
    },

    /// An LP was about to process an event earlier than its clock outside of a rollback.
    #[error("LP {lp}: processing an event in the past (clock {clock}, event time {event_time})")]
    CausalityViolation {
        lp: LpId,
        clock: VirtualTime,
        event_time: VirtualTime,
    },

    /// A handler tried to schedule an event before the current local time.
    #[error("LP {lp}: cannot schedule event {id} at {event_time}, local clock is {clock}")]
    ScheduledInPast {
        lp: LpId,
        id: EventId,
        clock: VirtualTime,
        event_time: VirtualTime,
    },

    /// Event ids must be strictly positive; negative ids are reserved for anti-messages.
    #[error("LP {lp}: invalid event id {id}")]
    InvalidEventId { lp: LpId, id: EventId },

    /// A destination LP outside of the configured population.
    #[error("unknown LP {lp} (simulation has {lp_count} LPs)")]
    UnknownLp { lp: LpId, lp_count: usize },

    /// An acknowledgement arrived for a message that is not awaiting one.
    #[error("LP {lp}: acknowledgement from LP {from} for event {event_id} matches no outgoing message")]
    UnmatchedAck {
        lp: LpId,
        from: LpId,
        event_id: EventId,
    },

    /// A committed GVT lower than one already adopted.
    #[error("LP {lp}: new GVT {committed} is lower than the previous one {previous}")]
    GvtRegression {
        lp: LpId,
        previous: VirtualTime,
        committed: VirtualTime,
    },

    /// A rollback reached into history already released by fossil collection.
    #[error("LP {lp}: rollback to {to} is before the adopted GVT {gvt}")]
    RollbackBeforeGvt {
        lp: LpId,
        gvt: VirtualTime,
        to: VirtualTime,
    },

    /// A mailbox had no room left; a dropped message would break causality.
    #[error("mailbox of LP {lp} is full ({capacity} messages)")]
    MailboxOverflow { lp: LpId, capacity: usize },

    /// A message was addressed to an LP that already shut down.
    #[error("mailbox of LP {lp} is closed")]
    MailboxClosed { lp: LpId },

    /// The model's event handler reported a failure.
    #[error("LP {lp}: event handler failed: {message}")]
    Handler { lp: LpId, message: String },

    /// An LP task panicked or was cancelled.
    #[error("LP task failed: {0}")]
    TaskFailed(String),
}

impl TimeWarpError {
    /// Convenience constructor for handler failures
    pub fn handler(lp: LpId, message: impl Into<String>) -> Self {
        TimeWarpError::Handler {
            lp,
            message: message.into(),
        }
    }
}

/// Result type alias for kernel operations.
pub type TimeWarpResult<T> = Result<T, TimeWarpError>;
