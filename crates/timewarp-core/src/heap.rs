//! Future-event heap
//!
//! A binary min-heap of timestamp buckets. Events sharing a timestamp live in
//! one bucket node and are ordered by id inside it, so both the timestamp and
//! the id address an event. The heap is stored in a vector whose slot 0 is a
//! sentinel; the root lives at index 1 and the children of node `i` are
//! `2i` and `2i + 1`.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::event::{Event, EventId};
use crate::time::VirtualTime;

/// Default maximum number of distinct timestamps held by one heap.
pub const DEFAULT_HEAP_CAPACITY: usize = 1 << 16;

/// Failure to insert into an [`EventHeap`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeapError {
    #[error("heap is full ({capacity} timestamp buckets), cannot insert event {id}")]
    Full { capacity: usize, id: EventId },

    #[error("event {0} is already pending")]
    DuplicateId(EventId),
}

#[derive(Debug, Clone)]
struct Bucket {
    time: VirtualTime,
    /// Sorted by id
    events: Vec<Event>,
}

impl Bucket {
    fn sentinel() -> Self {
        Bucket {
            time: VirtualTime::MAX,
            events: Vec::new(),
        }
    }
}

/// Priority queue of pending events keyed by timestamp.
#[derive(Debug, Clone)]
pub struct EventHeap {
    nodes: Vec<Bucket>,
    /// Timestamp -> node index
    slots: HashMap<VirtualTime, usize>,
    /// Event id -> timestamp
    ids: HashMap<EventId, VirtualTime>,
    capacity: usize,
    len: usize,
}

impl Default for EventHeap {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HEAP_CAPACITY)
    }
}

impl EventHeap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a heap holding at most `capacity` distinct timestamps
    pub fn with_capacity(capacity: usize) -> Self {
        let mut nodes = Vec::with_capacity(capacity.min(1024) + 1);
        nodes.push(Bucket::sentinel());
        Self {
            nodes,
            slots: HashMap::new(),
            ids: HashMap::new(),
            capacity,
            len: 0,
        }
    }

    /// Number of pending events
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Number of distinct pending timestamps
    pub fn bucket_count(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains_id(&self, id: EventId) -> bool {
        self.ids.contains_key(&id)
    }

    /// Insert an event, creating its timestamp bucket if needed.
    pub fn insert(&mut self, event: Event) -> Result<(), HeapError> {
        if self.ids.contains_key(&event.id) {
            return Err(HeapError::DuplicateId(event.id));
        }

        match self.slots.get(&event.time).copied() {
            Some(pos) => {
                let events = &mut self.nodes[pos].events;
                let at = events
                    .binary_search_by_key(&event.id, |e| e.id)
                    .unwrap_or_else(|at| at);
                events.insert(at, event);
            }
            None => {
                if self.bucket_count() >= self.capacity {
                    return Err(HeapError::Full {
                        capacity: self.capacity,
                        id: event.id,
                    });
                }
                let pos = self.nodes.len();
                self.nodes.push(Bucket {
                    time: event.time,
                    events: vec![event],
                });
                self.slots.insert(event.time, pos);
                self.sift_up(pos);
            }
        }

        self.ids.insert(event.id, event.time);
        self.len += 1;
        Ok(())
    }

    /// Timestamp of the earliest pending event
    pub fn peek_min_time(&self) -> Option<VirtualTime> {
        self.nodes.get(1).map(|bucket| bucket.time)
    }

    /// The event [`EventHeap::extract_min`] would return
    pub fn peek_min(&self) -> Option<&Event> {
        self.nodes.get(1).and_then(|bucket| bucket.events.first())
    }

    /// Remove the earliest event (lowest id among equal timestamps).
    pub fn extract_min(&mut self) -> Option<Event> {
        let id = self.peek_min()?.id;
        self.delete_by_id(id)
    }

    /// Remove the event with exactly this id.
    ///
    /// A miss is an expected outcome: the event may not have arrived yet.
    pub fn delete_by_id(&mut self, id: EventId) -> Option<Event> {
        let time = *self.ids.get(&id)?;
        let pos = *self.slots.get(&time)?;

        let events = &mut self.nodes[pos].events;
        let at = events.binary_search_by_key(&id, |e| e.id).ok()?;
        let event = events.remove(at);
        let bucket_empty = events.is_empty();

        self.ids.remove(&id);
        self.len -= 1;
        if bucket_empty {
            self.remove_node(pos);
        }
        Some(event)
    }

    /// Remove every pending event matching `predicate`
    pub fn delete_matching(&mut self, mut predicate: impl FnMut(&Event) -> bool) -> Vec<Event> {
        let matching: Vec<EventId> = self
            .iter()
            .filter(|event| predicate(event))
            .map(|event| event.id)
            .collect();
        matching
            .into_iter()
            .filter_map(|id| self.delete_by_id(id))
            .collect()
    }

    /// Pending events in heap layout order (not sorted)
    pub fn iter(&self) -> impl Iterator<Item = &Event> + '_ {
        self.nodes[1..].iter().flat_map(|bucket| bucket.events.iter())
    }

    fn remove_node(&mut self, pos: usize) {
        let last = self.nodes.len() - 1;
        self.swap(pos, last);
        if let Some(removed) = self.nodes.pop() {
            self.slots.remove(&removed.time);
        }
        if pos < self.nodes.len() {
            if pos > 1 && self.nodes[pos].time < self.nodes[pos / 2].time {
                self.sift_up(pos);
            } else {
                self.sift_down(pos);
            }
        }
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 1 {
            let parent = pos / 2;
            if self.nodes[parent].time <= self.nodes[pos].time {
                break;
            }
            self.swap(pos, parent);
            pos = parent;
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.nodes.len();
        loop {
            let left = pos * 2;
            if left >= len {
                break;
            }
            let right = left + 1;
            let child = if right < len && self.nodes[right].time < self.nodes[left].time {
                right
            } else {
                left
            };
            if self.nodes[pos].time <= self.nodes[child].time {
                break;
            }
            self.swap(pos, child);
            pos = child;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.nodes.swap(a, b);
        self.slots.insert(self.nodes[a].time, a);
        self.slots.insert(self.nodes[b].time, b);
    }
}

impl fmt::Display for EventHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "empty heap");
        }
        writeln!(f, "heap nodes:")?;
        for bucket in &self.nodes[1..] {
            write!(f, "  t={}:", bucket.time)?;
            for event in &bucket.events {
                write!(f, " {}", event.id)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Payload;

    fn ev(id: i64, time: i64) -> Event {
        Event::new(id, time, Payload::default())
    }

    fn drain(heap: &mut EventHeap) -> Vec<(i64, i64)> {
        std::iter::from_fn(|| heap.extract_min())
            .map(|e| (e.time.ticks(), e.id.raw()))
            .collect()
    }

    #[test]
    fn test_extract_min_orders_by_time_then_id() {
        let mut heap = EventHeap::new();
        for (id, time) in [(1, 9), (2, 3), (3, 7), (4, 3), (5, 1), (6, 7), (7, 12), (8, 3)] {
            heap.insert(ev(id, time)).unwrap();
        }
        assert_eq!(heap.len(), 8);
        assert_eq!(heap.bucket_count(), 5);
        assert_eq!(heap.peek_min_time(), Some(VirtualTime::new(1)));

        assert_eq!(
            drain(&mut heap),
            vec![(1, 5), (3, 2), (3, 4), (3, 8), (7, 3), (7, 6), (9, 1), (12, 7)]
        );
        assert!(heap.is_empty());
        assert_eq!(heap.peek_min_time(), None);
        assert_eq!(heap.extract_min(), None);
    }

    #[test]
    fn test_interleaved_insert_and_extract_yield_global_minimum() {
        let mut heap = EventHeap::new();
        let mut next_id = 1;
        let mut extracted = Vec::new();
        // Pseudo-random but fixed sequence of timestamps
        let mut x: i64 = 17;
        for round in 0..200 {
            x = (x * 31 + 7) % 101;
            heap.insert(ev(next_id, x)).unwrap();
            next_id += 1;
            if round % 3 == 0 {
                let min = heap.iter().map(|e| (e.time, e.id)).min().unwrap();
                let got = heap.extract_min().unwrap();
                assert_eq!((got.time, got.id), min);
                extracted.push(got);
            }
        }
        assert_eq!(heap.len() + extracted.len(), 200);
    }

    #[test]
    fn test_delete_by_id_restores_previous_state() {
        let build = || {
            let mut heap = EventHeap::new();
            for (id, time) in [(1, 4), (2, 2), (3, 6), (4, 2)] {
                heap.insert(ev(id, time)).unwrap();
            }
            heap
        };
        let mut untouched = build();
        let mut heap = build();

        heap.insert(ev(10, 1)).unwrap();
        assert_eq!(heap.peek_min_time(), Some(VirtualTime::new(1)));
        assert_eq!(heap.delete_by_id(EventId::new(10)), Some(ev(10, 1)));

        heap.insert(ev(11, 2)).unwrap();
        assert_eq!(heap.delete_by_id(EventId::new(11)), Some(ev(11, 2)));
        assert!(!heap.contains_id(EventId::new(11)));

        assert_eq!(heap.len(), untouched.len());
        assert_eq!(heap.bucket_count(), untouched.bucket_count());
        assert_eq!(drain(&mut heap), drain(&mut untouched));
    }

    #[test]
    fn test_delete_missing_id_is_not_an_error() {
        let mut heap = EventHeap::new();
        heap.insert(ev(1, 5)).unwrap();
        assert_eq!(heap.delete_by_id(EventId::new(2)), None);
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn test_delete_from_middle_of_heap_keeps_order() {
        let mut heap = EventHeap::new();
        for id in 1..=15 {
            heap.insert(ev(id, id * 10)).unwrap();
        }
        for id in [2, 7, 11, 1] {
            assert!(heap.delete_by_id(EventId::new(id)).is_some());
        }
        let times: Vec<i64> = drain(&mut heap).into_iter().map(|(t, _)| t).collect();
        let mut sorted = times.clone();
        sorted.sort();
        assert_eq!(times, sorted);
        assert_eq!(times.len(), 11);
    }

    #[test]
    fn test_delete_matching() {
        let mut heap = EventHeap::new();
        for id in 1..=6 {
            heap.insert(ev(id, id % 3)).unwrap();
        }
        let removed = heap.delete_matching(|e| e.id.raw() % 2 == 0);
        assert_eq!(removed.len(), 3);
        assert_eq!(drain(&mut heap), vec![(0, 3), (1, 1), (2, 5)]);
    }

    #[test]
    fn test_capacity_counts_buckets_not_events() {
        let mut heap = EventHeap::with_capacity(2);
        heap.insert(ev(1, 1)).unwrap();
        heap.insert(ev(2, 2)).unwrap();
        heap.insert(ev(3, 2)).unwrap();
        assert_eq!(
            heap.insert(ev(4, 3)),
            Err(HeapError::Full {
                capacity: 2,
                id: EventId::new(4)
            })
        );
        assert_eq!(heap.len(), 3);
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let mut heap = EventHeap::new();
        heap.insert(ev(1, 1)).unwrap();
        assert_eq!(heap.insert(ev(1, 4)), Err(HeapError::DuplicateId(EventId::new(1))));
    }
}
