//! Time-ordered history logs
//!
//! Every LP keeps several logs (processed events, sent messages, outgoing
//! messages awaiting acknowledgement, acknowledged messages, pending
//! anti-messages). They share one structure: a sequence sorted by timestamp
//! that is pruned from the front by fossil collection and from the back by
//! rollback.

use std::collections::VecDeque;

use crate::time::VirtualTime;

/// Element of an [`OrderedLog`]
pub trait Timestamped {
    /// Ordering key of the element
    fn timestamp(&self) -> VirtualTime;

    /// Identity test used by [`OrderedLog::delete`]
    fn same_as(&self, other: &Self) -> bool;
}

/// Ascending-by-timestamp sequence.
///
/// Elements with equal timestamps keep their insertion order.
#[derive(Debug, Clone)]
pub struct OrderedLog<T> {
    entries: VecDeque<T>,
}

impl<T> Default for OrderedLog<T> {
    fn default() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }
}

impl<T: Timestamped> OrderedLog<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert keeping the log sorted; returns the new length.
    ///
    /// Entries mostly arrive in time order, so the position is searched from
    /// the back.
    pub fn insert(&mut self, entry: T) -> usize {
        let time = entry.timestamp();
        let mut pos = self.entries.len();
        while pos > 0 && self.entries[pos - 1].timestamp() > time {
            pos -= 1;
        }
        self.entries.insert(pos, entry);
        self.entries.len()
    }

    /// Drop every entry with timestamp <= `time` (fossil collection).
    pub fn delete_before(&mut self, time: VirtualTime) -> usize {
        let mut removed = 0;
        while self
            .entries
            .front()
            .is_some_and(|entry| entry.timestamp() <= time)
        {
            self.entries.pop_front();
            removed += 1;
        }
        removed
    }

    /// Drop every entry with timestamp strictly below `time`.
    pub fn delete_older_than(&mut self, time: VirtualTime) -> usize {
        let mut removed = 0;
        while self
            .entries
            .front()
            .is_some_and(|entry| entry.timestamp() < time)
        {
            self.entries.pop_front();
            removed += 1;
        }
        removed
    }

    /// Drop every entry with timestamp >= `time` (rollback).
    pub fn delete_after(&mut self, time: VirtualTime) -> usize {
        self.split_off_from(time).len()
    }

    /// Remove and return, in ascending order, every entry with timestamp >= `time`.
    pub fn split_off_from(&mut self, time: VirtualTime) -> Vec<T> {
        let mut pos = self.entries.len();
        while pos > 0 && self.entries[pos - 1].timestamp() >= time {
            pos -= 1;
        }
        self.entries.split_off(pos).into_iter().collect()
    }

    /// Whether some entry has exactly timestamp `time`
    pub fn contains(&self, time: VirtualTime) -> bool {
        self.entries
            .iter()
            .take_while(|entry| entry.timestamp() <= time)
            .any(|entry| entry.timestamp() == time)
    }

    /// Remove the entry identical to `entry`; returns whether one was found.
    ///
    /// Only entries up to `entry`'s timestamp are scanned.
    pub fn delete(&mut self, entry: &T) -> bool {
        let time = entry.timestamp();
        let position = self
            .entries
            .iter()
            .take_while(|candidate| candidate.timestamp() <= time)
            .position(|candidate| candidate.same_as(entry));
        match position {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Remove and return the first entry (in time order) matching `predicate`.
    pub fn remove_first_where(&mut self, mut predicate: impl FnMut(&T) -> bool) -> Option<T> {
        let pos = self.entries.iter().position(|entry| predicate(entry))?;
        self.entries.remove(pos)
    }

    /// First entry (in time order) matching `predicate`
    pub fn find(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<&T> {
        self.entries.iter().find(|entry| predicate(entry))
    }

    /// Last entry with timestamp <= `time`, if any.
    pub fn nearest_at_or_before(&self, time: VirtualTime) -> Option<&T> {
        self.entries
            .iter()
            .take_while(|entry| entry.timestamp() <= time)
            .last()
    }

    /// Timestamp of the earliest entry
    pub fn min_time(&self) -> Option<VirtualTime> {
        self.entries.front().map(Timestamped::timestamp)
    }

    /// Timestamp of the latest entry
    pub fn max_time(&self) -> Option<VirtualTime> {
        self.entries.back().map(Timestamped::timestamp)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + '_ {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Entry {
        time: i64,
        tag: &'static str,
    }

    impl Timestamped for Entry {
        fn timestamp(&self) -> VirtualTime {
            VirtualTime::new(self.time)
        }

        fn same_as(&self, other: &Self) -> bool {
            self.tag == other.tag
        }
    }

    fn entry(time: i64, tag: &'static str) -> Entry {
        Entry { time, tag }
    }

    fn tags(log: &OrderedLog<Entry>) -> Vec<&'static str> {
        log.iter().map(|e| e.tag).collect()
    }

    fn sample() -> OrderedLog<Entry> {
        let mut log = OrderedLog::new();
        for e in [entry(5, "e"), entry(1, "a"), entry(3, "c"), entry(3, "d"), entry(2, "b")] {
            log.insert(e);
        }
        log
    }

    #[test]
    fn test_insert_keeps_time_order_and_is_stable() {
        let log = sample();
        assert_eq!(tags(&log), vec!["a", "b", "c", "d", "e"]);
        assert_eq!(log.min_time(), Some(VirtualTime::new(1)));
        assert_eq!(log.max_time(), Some(VirtualTime::new(5)));
    }

    #[test]
    fn test_delete_before_is_inclusive() {
        let mut log = sample();
        assert_eq!(log.delete_before(VirtualTime::new(3)), 4);
        assert_eq!(tags(&log), vec!["e"]);
        assert_eq!(log.delete_before(VirtualTime::new(10)), 1);
        assert!(log.is_empty());
    }

    #[test]
    fn test_delete_older_than_is_exclusive() {
        let mut log = sample();
        assert_eq!(log.delete_older_than(VirtualTime::new(3)), 2);
        assert_eq!(tags(&log), vec!["c", "d", "e"]);
    }

    #[test]
    fn test_delete_after_is_inclusive() {
        let mut log = sample();
        assert_eq!(log.delete_after(VirtualTime::new(3)), 3);
        assert_eq!(tags(&log), vec!["a", "b"]);
        assert_eq!(log.delete_after(VirtualTime::ZERO), 2);
        assert!(log.is_empty());
    }

    #[test]
    fn test_split_off_returns_suffix_in_order() {
        let mut log = sample();
        let suffix = log.split_off_from(VirtualTime::new(3));
        let suffix_tags: Vec<_> = suffix.iter().map(|e| e.tag).collect();
        assert_eq!(suffix_tags, vec!["c", "d", "e"]);
        assert_eq!(tags(&log), vec!["a", "b"]);
    }

    #[test]
    fn test_contains_and_nearest() {
        let log = sample();
        assert!(log.contains(VirtualTime::new(3)));
        assert!(!log.contains(VirtualTime::new(4)));
        assert_eq!(log.nearest_at_or_before(VirtualTime::new(4)).map(|e| e.tag), Some("d"));
        assert_eq!(log.nearest_at_or_before(VirtualTime::new(0)), None);
    }

    #[test]
    fn test_identity_delete() {
        let mut log = sample();
        assert!(log.delete(&entry(3, "d")));
        assert!(!log.delete(&entry(3, "d")));
        // Identity lookup does not scan past the entry's timestamp
        assert!(!log.delete(&entry(1, "e")));
        assert_eq!(tags(&log), vec!["a", "b", "c", "e"]);
    }

    #[test]
    fn test_remove_first_where() {
        let mut log = sample();
        let removed = log.remove_first_where(|e| e.time == 3);
        assert_eq!(removed, Some(entry(3, "c")));
        assert_eq!(log.find(|e| e.time == 3), Some(&entry(3, "d")));
        assert_eq!(log.remove_first_where(|e| e.time == 9), None);
    }
}
