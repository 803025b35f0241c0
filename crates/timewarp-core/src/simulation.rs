//! Simulation orchestrator
//!
//! Builds the LPs, seeds their initial events, spawns one task per LP and
//! waits for all of them.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{error, info};

use crate::channel::{mailboxes, PostOffice};
use crate::config::SimulationConfig;
use crate::error::{TimeWarpError, TimeWarpResult};
use crate::event::{Event, LpId};
use crate::handler::EventHandler;
use crate::process::LogicalProcess;
use crate::report::SimulationReport;
use crate::shared::SharedCoordinationState;

/// A configured, seeded Time Warp run.
pub struct Simulation {
    config: SimulationConfig,
    shared: Arc<SharedCoordinationState>,
    post: PostOffice,
    lps: Vec<LogicalProcess>,
}

impl Simulation {
    /// Validate `config` and set up one LP per configured index, all sharing
    /// `handler`.
    pub fn new<H>(config: SimulationConfig, handler: H) -> TimeWarpResult<Self>
    where
        H: EventHandler + 'static,
    {
        config.validate()?;
        let handler: Arc<dyn EventHandler> = Arc::new(handler);
        let shared = Arc::new(SharedCoordinationState::new(
            config.lp_count,
            config.end_time,
        ));
        let (post, boxes) = mailboxes(config.lp_count, config.mailbox_capacity);
        let lps = boxes
            .into_iter()
            .map(|mailbox| {
                LogicalProcess::new(
                    &config,
                    mailbox,
                    post.clone(),
                    Arc::clone(&shared),
                    Arc::clone(&handler),
                )
            })
            .collect();

        Ok(Self {
            config,
            shared,
            post,
            lps,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Distribute initial events with a static partition function.
    pub fn seed<I, P>(&mut self, events: I, partition: P) -> TimeWarpResult<()>
    where
        I: IntoIterator<Item = Event>,
        P: Fn(&Event) -> LpId,
    {
        for event in events {
            let lp = partition(&event);
            self.seed_lp(lp, event)?;
        }
        Ok(())
    }

    /// Place one initial event on `lp`.
    pub fn seed_lp(&mut self, lp: LpId, event: Event) -> TimeWarpResult<()> {
        let lp_count = self.lps.len();
        self.lps
            .get_mut(lp.index())
            .ok_or(TimeWarpError::UnknownLp { lp, lp_count })?
            .seed(event)
    }

    /// Run every LP to termination.
    ///
    /// Returns the first fatal error if any LP failed; every other LP is
    /// stopped before this returns.
    pub async fn run(self) -> TimeWarpResult<SimulationReport> {
        let Self {
            config,
            shared,
            post,
            lps,
        } = self;

        info!(
            lp_count = config.lp_count,
            end_time = %config.end_time,
            gvt_threshold = config.gvt_threshold,
            "simulation started"
        );
        let started = Instant::now();

        let mut tasks: FuturesUnordered<_> =
            lps.into_iter().map(|lp| tokio::spawn(lp.run())).collect();

        let mut reports = Vec::with_capacity(config.lp_count);
        let mut failure = None;
        while let Some(joined) = tasks.next().await {
            let result = joined
                .map_err(|err| TimeWarpError::TaskFailed(err.to_string()))
                .and_then(|result| result);
            match result {
                Ok(report) => reports.push(report),
                Err(err) => {
                    if failure.is_none() {
                        error!(%err, "simulation aborted");
                        // A panicked task never got to stop its peers
                        shared.stop_all();
                        post.broadcast_terminate(LpId::new(0));
                        failure = Some(err);
                    }
                }
            }
        }
        if let Some(err) = failure {
            return Err(err);
        }

        reports.sort_by_key(|report| report.lp);
        let report = SimulationReport {
            end_time: config.end_time,
            gvt: shared.gvt().committed_gvt().unwrap_or(config.end_time),
            gvt_evaluations: shared.gvt_evaluations(),
            wall_clock: started.elapsed(),
            lps: reports,
        };
        info!(
            processed = report.total_processed(),
            rollbacks = report.total_rollbacks(),
            gvt_evaluations = report.gvt_evaluations,
            elapsed_ms = report.wall_clock.as_millis() as u64,
            "simulation finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Payload;
    use crate::handler::LpContext;

    fn noop(_event: &Event, _ctx: &mut LpContext<'_>) -> TimeWarpResult<()> {
        Ok(())
    }

    #[test]
    fn test_invalid_config_is_rejected_before_start() {
        let result = Simulation::new(SimulationConfig::new(0, 10), noop);
        assert!(matches!(result, Err(TimeWarpError::Configuration(_))));
    }

    #[test]
    fn test_seed_rejects_unknown_lp() {
        let mut simulation = Simulation::new(SimulationConfig::new(2, 10), noop).unwrap();
        let event = Event::new(1, 1, Payload::default());
        assert_eq!(
            simulation.seed_lp(LpId::new(5), event),
            Err(TimeWarpError::UnknownLp {
                lp: LpId::new(5),
                lp_count: 2
            })
        );
        assert!(simulation.seed_lp(LpId::new(1), event).is_ok());
    }

    #[tokio::test]
    async fn test_empty_simulation_terminates() {
        let simulation = Simulation::new(SimulationConfig::new(3, 10), noop).unwrap();
        let report = simulation.run().await.unwrap();
        assert_eq!(report.lps.len(), 3);
        assert_eq!(report.total_processed(), 0);
        assert_eq!(report.gvt, report.end_time);
    }
}
