//! Events, messages and mailbox packets
//!
//! These are the immutable records exchanged between logical processes. An
//! event with a negative id is the anti-message of the event carrying the
//! positive id; anti-messages are the only way to cancel a sent event.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::log::Timestamped;
use crate::time::VirtualTime;

//-----------------------------------------------------------------------------
// Identifiers
//-----------------------------------------------------------------------------

/// Index of a logical process
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LpId(u32);

impl LpId {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Position of this LP in per-LP tables
    pub const fn index(&self) -> usize {
        self.0 as usize
    }

    /// All LP ids of a simulation with `lp_count` processes
    pub fn all(lp_count: usize) -> impl Iterator<Item = LpId> {
        (0..lp_count as u32).map(LpId)
    }
}

impl From<usize> for LpId {
    fn from(index: usize) -> Self {
        Self(index as u32)
    }
}

impl fmt::Display for LpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an event; negative values identify anti-messages.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EventId(i64);

impl EventId {
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> i64 {
        self.0
    }

    /// Id of the anti-message cancelling this event (or of the event an
    /// anti-message cancels).
    pub const fn negated(&self) -> Self {
        Self(-self.0)
    }

    pub const fn is_anti(&self) -> bool {
        self.0 < 0
    }

    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//-----------------------------------------------------------------------------
// Events
//-----------------------------------------------------------------------------

/// Marks an event as a regular event or a cancellation token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EventFlag {
    #[default]
    Normal,
    Anti,
}

/// Model-defined data carried by an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Payload {
    /// Entity that produced the event
    pub origin: u32,
    /// Entity the event is addressed to
    pub destination: u32,
    pub flag: EventFlag,
}

impl Payload {
    pub fn new(origin: u32, destination: u32) -> Self {
        Self {
            origin,
            destination,
            flag: EventFlag::Normal,
        }
    }
}

/// A simulation event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub time: VirtualTime,
    pub payload: Payload,
}

impl Event {
    pub fn new(id: impl Into<i64>, time: impl Into<VirtualTime>, payload: Payload) -> Self {
        Self {
            id: EventId::new(id.into()),
            time: time.into(),
            payload,
        }
    }

    /// Build the anti-message that cancels this event.
    pub fn anti(&self) -> Event {
        Event {
            id: self.id.negated(),
            time: self.time,
            payload: Payload {
                flag: EventFlag::Anti,
                ..self.payload
            },
        }
    }

    pub fn is_anti(&self) -> bool {
        self.id.is_anti() || self.payload.flag == EventFlag::Anti
    }
}

impl Timestamped for Event {
    fn timestamp(&self) -> VirtualTime {
        self.time
    }

    fn same_as(&self, other: &Self) -> bool {
        self.id == other.id && self.time == other.time
    }
}

//-----------------------------------------------------------------------------
// Messages
//-----------------------------------------------------------------------------

/// An event travelling from one LP to another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: LpId,
    pub receiver: LpId,
    pub event: Event,
}

impl Message {
    pub fn new(sender: LpId, receiver: LpId, event: Event) -> Self {
        Self {
            sender,
            receiver,
            event,
        }
    }

    /// Same endpoints, cancelled event.
    pub fn anti(&self) -> Message {
        Message {
            sender: self.sender,
            receiver: self.receiver,
            event: self.event.anti(),
        }
    }
}

/// A message stamped with the sender's local clock at send time.
///
/// Logs of sent messages are ordered by this stamp, not by the event time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedMessage {
    pub message: Message,
    pub sent_at: VirtualTime,
}

impl TimedMessage {
    pub fn new(message: Message, sent_at: VirtualTime) -> Self {
        Self { message, sent_at }
    }
}

impl Timestamped for TimedMessage {
    fn timestamp(&self) -> VirtualTime {
        self.sent_at
    }

    fn same_as(&self, other: &Self) -> bool {
        self.message.sender == other.message.sender
            && self.message.receiver == other.message.receiver
            && self.message.event.id == other.message.event.id
    }
}

/// Who keeps responsibility for an acknowledged message in GVT evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckOwnership {
    /// The receiver has not yet reported its local minimum, so its report
    /// will cover the message.
    Receiver,
    /// The receiver already reported for the current round; the sender must
    /// keep the message in its acknowledged log until its own next report.
    Sender,
}

/// Acknowledgement of a received event or anti-message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    /// The LP that received the acknowledged event
    pub from: LpId,
    /// The LP that sent the acknowledged event
    pub to: LpId,
    pub event_id: EventId,
    pub ownership: AckOwnership,
}

/// Everything that can travel through an LP mailbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Packet {
    Event(Message),
    Ack(Acknowledgement),
    GvtRequest { from: LpId, to: LpId },
    Terminate { from: LpId, to: LpId },
}

impl Packet {
    /// LP whose mailbox receives this packet
    pub fn destination(&self) -> LpId {
        match self {
            Packet::Event(message) => message.receiver,
            Packet::Ack(ack) => ack.to,
            Packet::GvtRequest { to, .. } | Packet::Terminate { to, .. } => *to,
        }
    }

    /// Whether the packet participates in quiescence detection.
    ///
    /// Termination broadcasts are sent once everybody is idle and are never
    /// counted as in flight.
    pub fn is_counted(&self) -> bool {
        !matches!(self, Packet::Terminate { .. })
    }
}
