//! Logical process: the Time Warp event loop
//!
//! An LP executes its pending events optimistically in timestamp order. A
//! message that arrives with a timestamp below the local clock (a straggler)
//! rolls the LP back: processed events are put back into the heap and every
//! message sent since then is cancelled with an anti-message. GVT rounds
//! bound how far back a rollback can reach; history older than the committed
//! GVT is discarded.

use std::sync::Arc;

use tracing::{debug, error, info, info_span, trace, Instrument};

use crate::channel::{Mailbox, PostOffice};
use crate::config::SimulationConfig;
use crate::error::{TimeWarpError, TimeWarpResult};
use crate::event::{
    AckOwnership, Acknowledgement, Event, LpId, Message, Packet, TimedMessage,
};
use crate::handler::{EventHandler, LpContext};
use crate::heap::EventHeap;
use crate::log::OrderedLog;
use crate::report::LpReport;
use crate::shared::{IdleOutcome, RunState, SharedCoordinationState};
use crate::time::VirtualTime;

#[derive(Debug, Default, Clone, Copy)]
struct LpStats {
    processed: u64,
    rollbacks: u64,
    anti_messages: u64,
    annihilations: u64,
}

pub(crate) struct LogicalProcess {
    index: LpId,
    clock: VirtualTime,
    /// Last GVT adopted by this LP
    gvt: VirtualTime,
    /// Round this LP contributed to and has not seen committed yet
    gvt_round: Option<u64>,
    end_time: VirtualTime,
    gvt_threshold: usize,

    heap: EventHeap,
    processed: OrderedLog<Event>,
    /// Every scheduled event, stamped with the clock at scheduling time
    sent: OrderedLog<TimedMessage>,
    /// Remote sends awaiting acknowledgement
    outgoing: OrderedLog<TimedMessage>,
    /// Acknowledged sends this LP must still cover in its next GVT report
    acked: OrderedLog<TimedMessage>,
    /// Anti-messages that arrived before their positive event, keyed by the
    /// cancelled event's timestamp
    pending_anti: OrderedLog<Event>,

    mailbox: Mailbox,
    post: PostOffice,
    shared: Arc<SharedCoordinationState>,
    handler: Arc<dyn EventHandler>,
    stats: LpStats,
}

impl LogicalProcess {
    pub(crate) fn new(
        config: &SimulationConfig,
        mailbox: Mailbox,
        post: PostOffice,
        shared: Arc<SharedCoordinationState>,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        Self {
            index: mailbox.owner(),
            clock: VirtualTime::ZERO,
            gvt: VirtualTime::ZERO,
            gvt_round: None,
            end_time: config.end_time,
            gvt_threshold: config.gvt_threshold,
            heap: EventHeap::with_capacity(config.heap_capacity),
            processed: OrderedLog::new(),
            sent: OrderedLog::new(),
            outgoing: OrderedLog::new(),
            acked: OrderedLog::new(),
            pending_anti: OrderedLog::new(),
            mailbox,
            post,
            shared,
            handler,
            stats: LpStats::default(),
        }
    }

    pub(crate) fn index(&self) -> LpId {
        self.index
    }

    pub(crate) fn clock(&self) -> VirtualTime {
        self.clock
    }

    pub(crate) fn end_time(&self) -> VirtualTime {
        self.end_time
    }

    pub(crate) fn lp_count(&self) -> usize {
        self.post.lp_count()
    }

    /// Place an initial event into the heap before the loop starts.
    pub(crate) fn seed(&mut self, event: Event) -> TimeWarpResult<()> {
        if !event.id.is_positive() || event.is_anti() {
            return Err(TimeWarpError::InvalidEventId {
                lp: self.index,
                id: event.id,
            });
        }
        self.heap_insert(event)
    }

    pub(crate) fn report(&self) -> LpReport {
        LpReport {
            lp: self.index,
            processed: self.stats.processed,
            rollbacks: self.stats.rollbacks,
            anti_messages: self.stats.anti_messages,
            annihilations: self.stats.annihilations,
            final_clock: self.clock,
            gvt: self.gvt,
        }
    }

    //-------------------------------------------------------------------------
    // Main loop
    //-------------------------------------------------------------------------

    /// Run until the simulation stops.
    ///
    /// A fatal error stops every LP before it is returned.
    pub(crate) async fn run(mut self) -> TimeWarpResult<LpReport> {
        let span = info_span!("lp", index = self.index.index());
        async move {
            self.shared.set_state(self.index, RunState::Running);
            info!(pending = self.heap.len(), "LP started");

            match self.run_loop().await {
                Ok(()) => {
                    if let Some(gvt) = self.shared.gvt().committed_gvt() {
                        self.gvt = self.gvt.max(gvt);
                    }
                    info!(
                        processed = self.stats.processed,
                        rollbacks = self.stats.rollbacks,
                        clock = %self.clock,
                        "LP stopped"
                    );
                    Ok(self.report())
                }
                // Another LP failed first and closed the run under us
                Err(err) if self.shared.is_stopped(self.index) => {
                    debug!(%err, "error after shutdown ignored");
                    Ok(self.report())
                }
                Err(err) => {
                    error!(%err, clock = %self.clock, "fatal error, stopping the simulation");
                    self.shared.stop_all();
                    self.post.broadcast_terminate(self.index);
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_loop(&mut self) -> TimeWarpResult<()> {
        loop {
            if self.shared.is_stopped(self.index) {
                return Ok(());
            }
            self.drain()?;
            if self.shared.is_stopped(self.index) {
                return Ok(());
            }

            if self.should_idle() {
                self.go_idle().await?;
            } else {
                self.advance()?;
            }
            self.catch_up_gvt()?;

            tokio::task::yield_now().await;
        }
    }

    /// Nothing left to do before the end time.
    pub(crate) fn should_idle(&self) -> bool {
        self.clock >= self.end_time
            || self
                .heap
                .peek_min_time()
                .map_or(true, |next| next >= self.end_time)
    }

    async fn go_idle(&mut self) -> TimeWarpResult<()> {
        match self.shared.enter_idle(self.index, &self.post) {
            IdleOutcome::Stopped => Ok(()),
            IdleOutcome::Terminate => {
                self.shared.gvt().finalize();
                self.post.broadcast_terminate(self.index);
                Ok(())
            }
            IdleOutcome::Wait => {
                trace!(clock = %self.clock, "idle");
                let Some(packet) = self.mailbox.recv().await else {
                    self.shared.set_state(self.index, RunState::Stopped);
                    return Ok(());
                };
                // Leave the idle state before the packet stops counting as
                // in flight
                let resumed = self.shared.set_state(self.index, self.resume_state());
                self.post.settle(&packet);
                if resumed == RunState::Stopped {
                    return Ok(());
                }
                self.dispatch(packet)
            }
        }
    }

    fn resume_state(&self) -> RunState {
        if self.gvt_round.is_some() {
            RunState::EvaluatingGvt
        } else {
            RunState::Running
        }
    }

    /// Handle every packet currently waiting in the mailbox.
    pub(crate) fn drain(&mut self) -> TimeWarpResult<()> {
        while let Some(packet) = self.mailbox.try_recv() {
            self.post.settle(&packet);
            self.dispatch(packet)?;
        }
        Ok(())
    }

    fn dispatch(&mut self, packet: Packet) -> TimeWarpResult<()> {
        trace!(?packet, "dispatch");
        match packet {
            Packet::Event(message) => self.receive_event(message),
            Packet::Ack(ack) => self.receive_ack(ack),
            Packet::GvtRequest { .. } => {
                self.contribute_local_minimum();
                Ok(())
            }
            Packet::Terminate { from, .. } => {
                debug!(%from, "termination received");
                self.shared.set_state(self.index, RunState::Stopped);
                Ok(())
            }
        }
    }

    /// Process the earliest pending event.
    ///
    /// Returns `false` when no event before the end time is pending.
    pub(crate) fn advance(&mut self) -> TimeWarpResult<bool> {
        let next = match self.heap.peek_min_time() {
            Some(next) if next < self.end_time => next,
            _ => return Ok(false),
        };
        if next < self.clock {
            return Err(TimeWarpError::CausalityViolation {
                lp: self.index,
                clock: self.clock,
                event_time: next,
            });
        }
        let Some(event) = self.heap.extract_min() else {
            return Ok(false);
        };

        self.clock = event.time;
        let handler = Arc::clone(&self.handler);
        handler.handle(&event, &mut LpContext::new(self))?;
        self.stats.processed += 1;
        self.processed.insert(event);

        if self.history_exceeds_threshold() {
            self.request_gvt()?;
        }
        Ok(true)
    }

    fn history_exceeds_threshold(&self) -> bool {
        self.processed.len() > self.gvt_threshold
            || self.sent.len() > self.gvt_threshold
            || self.outgoing.len() > self.gvt_threshold
    }

    //-------------------------------------------------------------------------
    // Sending
    //-------------------------------------------------------------------------

    pub(crate) fn schedule(&mut self, event: Event, destination: LpId) -> TimeWarpResult<()> {
        if !event.id.is_positive() || event.is_anti() {
            return Err(TimeWarpError::InvalidEventId {
                lp: self.index,
                id: event.id,
            });
        }
        if event.time < self.clock {
            return Err(TimeWarpError::ScheduledInPast {
                lp: self.index,
                id: event.id,
                clock: self.clock,
                event_time: event.time,
            });
        }
        if destination.index() >= self.lp_count() {
            return Err(TimeWarpError::UnknownLp {
                lp: destination,
                lp_count: self.lp_count(),
            });
        }

        let message = Message::new(self.index, destination, event);
        if destination == self.index {
            self.heap_insert(event)?;
        } else {
            self.send_event(message)?;
        }
        self.sent.insert(TimedMessage::new(message, self.clock));
        Ok(())
    }

    /// Transmit an event or anti-message and keep it until acknowledged.
    fn send_event(&mut self, message: Message) -> TimeWarpResult<()> {
        self.outgoing.insert(TimedMessage::new(message, self.clock));
        self.post.send(Packet::Event(message))
    }

    //-------------------------------------------------------------------------
    // Receiving
    //-------------------------------------------------------------------------

    fn receive_event(&mut self, message: Message) -> TimeWarpResult<()> {
        let event = message.event;
        let ownership = if self.gvt_round.is_some() {
            AckOwnership::Sender
        } else {
            AckOwnership::Receiver
        };
        self.post.send(Packet::Ack(Acknowledgement {
            from: self.index,
            to: message.sender,
            event_id: event.id,
            ownership,
        }))?;

        if event.is_anti() {
            return self.annihilate(event);
        }
        let cancelled_by = event.id.negated();
        if self
            .pending_anti
            .remove_first_where(|anti| anti.id == cancelled_by)
            .is_some()
        {
            trace!(id = %event.id, "event cancelled by earlier anti-message");
            self.stats.annihilations += 1;
            return Ok(());
        }
        if event.time < self.clock {
            self.rollback(event.time)?;
        }
        self.heap_insert(event)
    }

    fn receive_ack(&mut self, ack: Acknowledgement) -> TimeWarpResult<()> {
        let acked = self.outgoing.remove_first_where(|sent| {
            sent.message.receiver == ack.from && sent.message.event.id == ack.event_id
        });
        match acked {
            Some(sent) => {
                if ack.ownership == AckOwnership::Sender {
                    self.acked.insert(sent);
                }
                Ok(())
            }
            None => Err(TimeWarpError::UnmatchedAck {
                lp: self.index,
                from: ack.from,
                event_id: ack.event_id,
            }),
        }
    }

    //-------------------------------------------------------------------------
    // Rollback and annihilation
    //-------------------------------------------------------------------------

    /// Undo everything this LP did at or after `to`.
    ///
    /// Both history logs are trimmed before any anti-message is handled.
    pub(crate) fn rollback(&mut self, to: VirtualTime) -> TimeWarpResult<()> {
        if to < self.gvt {
            return Err(TimeWarpError::RollbackBeforeGvt {
                lp: self.index,
                gvt: self.gvt,
                to,
            });
        }
        let from = self.clock;
        self.clock = to;

        let undone = self.processed.split_off_from(to);
        let cancelled = self.sent.split_off_from(to);
        self.stats.processed = self.stats.processed.saturating_sub(undone.len() as u64);
        for event in undone {
            self.heap_insert(event)?;
        }

        for sent in cancelled.iter().rev() {
            let anti = sent.message.anti();
            self.stats.anti_messages += 1;
            if anti.receiver == self.index {
                self.annihilate(anti.event)?;
            } else {
                self.send_event(anti)?;
            }
        }

        self.stats.rollbacks += 1;
        self.shared.record_rollback(self.index);
        debug!(from = %from, to = %to, anti_messages = cancelled.len(), "rollback");
        Ok(())
    }

    /// Cancel the positive event matching `anti`.
    pub(crate) fn annihilate(&mut self, anti: Event) -> TimeWarpResult<()> {
        let target = anti.id.negated();
        let processed_at = self
            .processed
            .find(|event| event.id == target)
            .map(|event| event.time);
        if let Some(time) = processed_at {
            if time <= self.clock {
                self.rollback(time)?;
            }
        }

        if self.heap.delete_by_id(target).is_some() {
            trace!(id = %target, "annihilated");
            self.stats.annihilations += 1;
        } else {
            // The positive event has not arrived yet
            self.pending_anti.insert(anti);
        }
        Ok(())
    }

    //-------------------------------------------------------------------------
    // GVT
    //-------------------------------------------------------------------------

    /// Lower bound on any timestamp this LP can still produce or receive.
    fn local_minimum(&self) -> Option<VirtualTime> {
        [
            self.heap.peek_min_time(),
            self.outgoing.min_time(),
            self.acked.min_time(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    fn request_gvt(&mut self) -> TimeWarpResult<()> {
        if self.gvt_round.is_some() {
            return Ok(());
        }
        let lp_count = self.lp_count();
        if !self.shared.gvt().start_round(lp_count) {
            return Ok(());
        }
        for to in LpId::all(lp_count).filter(|to| *to != self.index) {
            self.post.send(Packet::GvtRequest {
                from: self.index,
                to,
            })?;
        }
        self.contribute_local_minimum();
        Ok(())
    }

    fn contribute_local_minimum(&mut self) {
        let minimum = self.local_minimum();
        if let Some(round) = self.shared.gvt().set_local_minimum(minimum, self.index) {
            trace!(round, minimum = ?minimum, "local minimum reported");
            self.gvt_round = Some(round);
            self.acked.clear();
            self.shared.set_state(self.index, RunState::EvaluatingGvt);
        }
    }

    /// Adopt the GVT of a round this LP contributed to, once it committed.
    ///
    /// The next round may already be running. Acknowledgements collected
    /// since the last report stay in `acked` until that round's report.
    pub(crate) fn catch_up_gvt(&mut self) -> TimeWarpResult<()> {
        let Some(round) = self.gvt_round else {
            return Ok(());
        };
        let (completed, committed) = self.shared.gvt().last_commit();
        if completed <= round {
            return Ok(());
        }
        if committed < self.gvt {
            return Err(TimeWarpError::GvtRegression {
                lp: self.index,
                previous: self.gvt,
                committed,
            });
        }

        self.gvt = committed;
        self.gvt_round = None;
        self.fossil_collect(committed);
        self.shared.set_state(self.index, RunState::Running);
        Ok(())
    }

    fn fossil_collect(&mut self, gvt: VirtualTime) {
        let processed = self.processed.delete_before(gvt);
        let sent = self.sent.delete_before(gvt);
        // A positive event in transit is never below the GVT
        let anti = self.pending_anti.delete_older_than(gvt);
        debug!(gvt = %gvt, processed, sent, anti, "fossil collection");
    }

    fn heap_insert(&mut self, event: Event) -> TimeWarpResult<()> {
        self.heap.insert(event).map_err(|source| TimeWarpError::Heap {
            lp: self.index,
            source,
        })
    }
}
