//! LP mailboxes
//!
//! Every LP owns one bounded inbound [`Mailbox`]; every LP holds a clone of
//! the [`PostOffice`] that routes packets to the right mailbox. Sending never
//! blocks: a full mailbox is a fatal error, because a dropped message would
//! silently break causality.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::trace;

use crate::error::{TimeWarpError, TimeWarpResult};
use crate::event::{LpId, Packet};

/// Default number of packets a mailbox can hold.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 10_000;

/// Create one mailbox per LP and the post office that feeds them.
pub fn mailboxes(lp_count: usize, capacity: usize) -> (PostOffice, Vec<Mailbox>) {
    let (senders, receivers): (Vec<_>, Vec<_>) =
        (0..lp_count).map(|_| mpsc::channel(capacity)).unzip();

    let post = PostOffice {
        senders: Arc::new(senders),
        in_flight: Arc::new(AtomicUsize::new(0)),
        capacity,
    };
    let mailboxes = receivers
        .into_iter()
        .enumerate()
        .map(|(index, rx)| Mailbox {
            owner: LpId::from(index),
            rx,
        })
        .collect();
    (post, mailboxes)
}

/// Sending side shared by every LP
#[derive(Debug, Clone)]
pub struct PostOffice {
    senders: Arc<Vec<mpsc::Sender<Packet>>>,
    /// Counted packets sent but not yet settled by their receiver
    in_flight: Arc<AtomicUsize>,
    capacity: usize,
}

impl PostOffice {
    pub fn lp_count(&self) -> usize {
        self.senders.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Deliver a packet without blocking.
    pub fn send(&self, packet: Packet) -> TimeWarpResult<()> {
        let to = packet.destination();
        let sender = self.senders.get(to.index()).ok_or(TimeWarpError::UnknownLp {
            lp: to,
            lp_count: self.senders.len(),
        })?;

        let counted = packet.is_counted();
        if counted {
            self.in_flight.fetch_add(1, Ordering::SeqCst);
        }
        match sender.try_send(packet) {
            Ok(()) => {
                trace!(to = %to, ?packet, "packet sent");
                Ok(())
            }
            Err(err) => {
                if counted {
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                }
                match err {
                    TrySendError::Full(_) => Err(TimeWarpError::MailboxOverflow {
                        lp: to,
                        capacity: self.capacity,
                    }),
                    TrySendError::Closed(_) => Err(TimeWarpError::MailboxClosed { lp: to }),
                }
            }
        }
    }

    /// Send a termination packet to every LP, the sender included.
    ///
    /// Mailboxes that are already closed belong to LPs that stopped, so
    /// failures are ignored.
    pub fn broadcast_terminate(&self, from: LpId) {
        for to in LpId::all(self.lp_count()) {
            if let Err(err) = self.send(Packet::Terminate { from, to }) {
                trace!(%to, %err, "termination packet not delivered");
            }
        }
    }

    /// Mark a received packet as handled.
    ///
    /// The receiver calls this only after it left the idle state, so that an
    /// idle LP never hides work from the termination check.
    pub fn settle(&self, packet: &Packet) {
        if packet.is_counted() {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Counted packets sent and not yet settled
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

/// Receiving side owned by one LP
#[derive(Debug)]
pub struct Mailbox {
    owner: LpId,
    rx: mpsc::Receiver<Packet>,
}

impl Mailbox {
    pub fn owner(&self) -> LpId {
        self.owner
    }

    /// Next waiting packet, or `None` if the mailbox is currently empty.
    pub fn try_recv(&mut self) -> Option<Packet> {
        match self.rx.try_recv() {
            Ok(packet) => Some(packet),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Wait for the next packet.
    ///
    /// Returns `None` once every post office clone has been dropped.
    pub async fn recv(&mut self) -> Option<Packet> {
        self.rx.recv().await
    }
}
