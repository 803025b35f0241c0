//! The PHOLD workload
//!
//! A fixed population of entities exchanges events. Each processed event
//! produces exactly one new event, sent from the entity that received it to
//! a uniformly chosen different entity, a short exponential delay later.
//! Processing burns a configurable amount of floating-point work.

use timewarp_core::{
    Event, EventHandler, LpContext, LpId, Payload, TimeWarpError, TimeWarpResult, VirtualTime,
};

use crate::config::PholdConfig;
use crate::randomness::{SeededRng, LAMBDA};

/// Event-generation policy for PHOLD
#[derive(Debug, Clone)]
pub struct PholdModel {
    entity_count: u32,
    lp_count: u32,
    initial_events: i64,
    fp_ops: u32,
    seed: u64,
}

impl PholdModel {
    pub fn new(config: &PholdConfig, lp_count: usize) -> TimeWarpResult<Self> {
        if config.entity_count < 2 {
            return Err(TimeWarpError::Configuration(format!(
                "PHOLD needs at least two entities, got {}",
                config.entity_count
            )));
        }
        let lp_count = u32::try_from(lp_count)
            .ok()
            .filter(|&n| n > 0 && n <= config.entity_count)
            .ok_or_else(|| {
                TimeWarpError::Configuration(format!(
                    "LP count {lp_count} must be between 1 and the entity count {}",
                    config.entity_count
                ))
            })?;

        Ok(Self {
            entity_count: config.entity_count,
            lp_count,
            initial_events: config.initial_event_count(),
            fp_ops: config.fp_ops,
            seed: config.seed,
        })
    }

    pub fn initial_event_count(&self) -> i64 {
        self.initial_events
    }

    /// Events present before the run starts, ids `1..=initial_event_count`.
    pub fn initial_events(&self) -> Vec<Event> {
        (1..=self.initial_events)
            .map(|id| {
                let mut rng = self.stream(id);
                let origin = rng.uniform_int(0, self.entity_count - 1);
                let destination = self.other_entity(&mut rng, origin);
                let time = VirtualTime::ZERO + rng.exponential(LAMBDA);
                Event::new(id, time, Payload::new(origin, destination))
            })
            .collect()
    }

    /// LP owning `entity`
    pub fn entity_to_lp(&self, entity: u32) -> LpId {
        entity_to_lp(entity, self.entity_count, self.lp_count)
    }

    /// LP that processes `event` (the owner of its destination entity)
    pub fn lp_of(&self, event: &Event) -> LpId {
        self.entity_to_lp(event.payload.destination)
    }

    fn stream(&self, id: i64) -> SeededRng {
        SeededRng::for_stream(self.seed, id as u64)
    }

    fn other_entity(&self, rng: &mut SeededRng, entity: u32) -> u32 {
        loop {
            let candidate = rng.uniform_int(0, self.entity_count - 1);
            if candidate != entity {
                return candidate;
            }
        }
    }
}

impl EventHandler for PholdModel {
    fn handle(&self, event: &Event, ctx: &mut LpContext<'_>) -> TimeWarpResult<()> {
        // A child id is unique because every event has exactly one child
        let id = event.id.raw() + self.initial_events;
        let mut rng = self.stream(id);
        let origin = event.payload.destination;
        let destination = self.other_entity(&mut rng, origin);
        let time = ctx.now() + rng.exponential(LAMBDA);

        compute(self.fp_ops);

        if time >= ctx.end_time() {
            // Would never be processed
            return Ok(());
        }
        ctx.schedule(
            Event::new(id, time, Payload::new(origin, destination)),
            self.entity_to_lp(destination),
        )
    }
}

/// Block partition of `entity_count` entities over `lp_count` LPs.
///
/// The first `entity_count % lp_count` LPs own one extra entity.
pub fn entity_to_lp(entity: u32, entity_count: u32, lp_count: u32) -> LpId {
    let rem = entity_count % lp_count;
    let block = entity_count / lp_count;
    let lp = if rem == 0 {
        entity / block
    } else {
        let lp = entity / (block + 1);
        if lp >= rem {
            rem + (entity - rem * (block + 1)) / block
        } else {
            lp
        }
    };
    LpId::new(lp)
}

/// Synthetic load: Newton iterations for 1/sqrt(2), one per five operations.
pub fn compute(fp_ops: u32) -> f64 {
    let z = std::hint::black_box(2.0_f64);
    let mut x = 0.5_f64;
    for _ in 0..fp_ops / 5 {
        x = 0.5 * x * (3.0 - z * x * x);
    }
    std::hint::black_box(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn config(entity_count: u32, density: f64) -> PholdConfig {
        PholdConfig {
            entity_count,
            density,
            seed: 11,
            ..PholdConfig::default()
        }
    }

    #[test]
    fn test_partition_spreads_remainder_over_first_lps() {
        let owners: Vec<u32> = (0..10)
            .map(|e| entity_to_lp(e, 10, 3).index() as u32)
            .collect();
        assert_eq!(owners, vec![0, 0, 0, 0, 1, 1, 1, 2, 2, 2]);

        let even: Vec<u32> = (0..8).map(|e| entity_to_lp(e, 8, 4).index() as u32).collect();
        assert_eq!(even, vec![0, 0, 1, 1, 2, 2, 3, 3]);
    }

    #[test]
    fn test_partition_is_monotone_and_complete() {
        for lp_count in 1..=7 {
            let owners: Vec<u32> = (0..23)
                .map(|e| entity_to_lp(e, 23, lp_count).index() as u32)
                .collect();
            assert!(owners.windows(2).all(|w| w[0] <= w[1]));
            assert_eq!(owners.first(), Some(&0));
            assert_eq!(owners.last(), Some(&(lp_count - 1)));
        }
    }

    #[test]
    fn test_initial_events_are_deterministic_and_valid() {
        let model = PholdModel::new(&config(50, 2.0), 4).unwrap();
        let events = model.initial_events();
        assert_eq!(events.len(), 100);
        assert_eq!(events, model.initial_events());

        let ids: HashSet<i64> = events.iter().map(|e| e.id.raw()).collect();
        assert_eq!(ids.len(), 100);
        for event in &events {
            assert_ne!(event.payload.origin, event.payload.destination);
            assert!(event.payload.destination < 50);
            assert!(event.time >= VirtualTime::new(1));
            assert!(model.lp_of(event).index() < 4);
        }
    }

    #[test]
    fn test_invalid_model_settings() {
        assert!(PholdModel::new(&config(1, 1.0), 1).is_err());
        assert!(PholdModel::new(&config(4, 1.0), 0).is_err());
        assert!(PholdModel::new(&config(4, 1.0), 5).is_err());
        assert!(PholdModel::new(&config(4, 1.0), 4).is_ok());
    }

    #[test]
    fn test_compute_converges() {
        let x = compute(500);
        assert!((x - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-9);
        assert_eq!(compute(0), 0.5);
    }
}
