//! Whole-simulation runs on the multi-threaded runtime.

use std::time::Duration;

use timewarp_core::{
    Event, EventHandler, LpContext, LpId, Payload, Simulation, SimulationConfig,
    SimulationReport, TimeWarpError, TimeWarpResult,
};

const RUN_TIMEOUT: Duration = Duration::from_secs(60);

/// Each event sends one follow-up to a fixed neighbouring entity. Child ids
/// are `parent + initial`, so every re-execution produces the same ids.
struct Relay {
    entities: u32,
    initial: i64,
}

impl Relay {
    fn next_entity(&self, entity: u32) -> u32 {
        (entity * 7 + 3) % self.entities
    }

    fn delay(id: i64) -> i64 {
        1 + id % 4
    }

    fn initial_events(&self) -> Vec<Event> {
        (1..=self.initial)
            .map(|id| {
                let entity = (id as u32) % self.entities;
                Event::new(id, id % 5, Payload::new(entity, entity))
            })
            .collect()
    }

    /// Committed event count, computed sequentially.
    fn expected_processed(&self, end_time: i64) -> u64 {
        let mut total = 0;
        for event in self.initial_events() {
            let (mut id, mut time) = (event.id.raw(), event.time.ticks());
            while time < end_time {
                total += 1;
                time += Self::delay(id);
                id += self.initial;
            }
        }
        total
    }
}

impl EventHandler for Relay {
    fn handle(&self, event: &Event, ctx: &mut LpContext<'_>) -> TimeWarpResult<()> {
        let from = event.payload.destination;
        let to = self.next_entity(from);
        let child = Event::new(
            event.id.raw() + self.initial,
            ctx.now() + Self::delay(event.id.raw()),
            Payload::new(from, to),
        );
        if child.time >= ctx.end_time() {
            return Ok(());
        }
        ctx.schedule(child, LpId::from(to as usize % ctx.lp_count()))
    }
}

async fn run_relay(lp_count: usize, end_time: i64, gvt_threshold: usize) -> SimulationReport {
    let relay = Relay {
        entities: 16,
        initial: 32,
    };
    let events = relay.initial_events();
    let config = SimulationConfig::new(lp_count, end_time).with_gvt_threshold(gvt_threshold);
    let mut simulation = Simulation::new(config, relay).unwrap();
    simulation
        .seed(events, |event| {
            LpId::from(event.payload.destination as usize % lp_count)
        })
        .unwrap();
    tokio::time::timeout(RUN_TIMEOUT, simulation.run())
        .await
        .expect("simulation did not terminate")
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_lp_reaches_end_time_without_rollbacks() {
    let report = run_relay(1, 200, 8).await;

    assert_eq!(report.gvt, report.end_time);
    assert_eq!(report.total_rollbacks(), 0);
    assert!(report.gvt_evaluations >= 1);
    assert_eq!(report.lps.len(), 1);
    assert_eq!(report.lps[0].gvt, report.end_time);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_committed_work_is_independent_of_lp_count() {
    let expected = Relay {
        entities: 16,
        initial: 32,
    }
    .expected_processed(300);

    for lp_count in [1, 2, 4] {
        let report = run_relay(lp_count, 300, 16).await;
        assert_eq!(report.total_processed(), expected, "{lp_count} LPs");
        assert_eq!(report.gvt, report.end_time);
        assert_eq!(report.lps.len(), lp_count);
        assert!(report
            .lps
            .iter()
            .enumerate()
            .all(|(index, lp)| lp.lp == LpId::from(index)));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_repeated_runs_are_reproducible() {
    let first = run_relay(3, 250, 32).await;
    let second = run_relay(3, 250, 32).await;
    assert_eq!(first.total_processed(), second.total_processed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_handler_failure_stops_every_lp() {
    fn fail_on_three(event: &Event, ctx: &mut LpContext<'_>) -> TimeWarpResult<()> {
        if event.id.raw() == 3 {
            return Err(TimeWarpError::handler(ctx.index(), "refusing event 3"));
        }
        Ok(())
    }

    let mut simulation = Simulation::new(SimulationConfig::new(3, 100), fail_on_three).unwrap();
    for id in 1..=6 {
        simulation
            .seed_lp(
                LpId::from(id as usize % 3),
                Event::new(id, id * 2, Payload::default()),
            )
            .unwrap();
    }

    let result = tokio::time::timeout(RUN_TIMEOUT, simulation.run())
        .await
        .expect("simulation did not terminate");
    assert!(matches!(result, Err(TimeWarpError::Handler { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_events_beyond_end_time_are_never_processed() {
    fn ignore(_event: &Event, _ctx: &mut LpContext<'_>) -> TimeWarpResult<()> {
        Ok(())
    }

    let mut simulation = Simulation::new(SimulationConfig::new(2, 10), ignore).unwrap();
    simulation
        .seed_lp(LpId::new(0), Event::new(1, 9, Payload::default()))
        .unwrap();
    simulation
        .seed_lp(LpId::new(1), Event::new(2, 10, Payload::default()))
        .unwrap();

    let report = simulation.run().await.unwrap();
    assert_eq!(report.total_processed(), 1);
    assert_eq!(report.lps[0].final_clock.ticks(), 9);
    assert_eq!(report.gvt.ticks(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_frequent_gvt_rounds_never_pass_pending_work() {
    let relay = Relay {
        entities: 16,
        initial: 32,
    };
    let expected = relay.expected_processed(400);

    // A rollback below an adopted GVT or a regressing commit fails the run
    for _ in 0..5 {
        let report = run_relay(4, 400, 1).await;
        assert_eq!(report.total_processed(), expected);
        assert!(report.gvt_evaluations > 1);
        assert_eq!(report.gvt, report.end_time);
        assert!(report.lps.iter().all(|lp| lp.gvt <= report.end_time));
    }
}
