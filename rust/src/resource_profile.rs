//! Per-resource reservation tracking for serial schedule generation.

use crate::models::Time;

/// Quantities reserved on one resource over time.
///
/// Reservations are kept sorted by start so window queries only walk the
/// prefix that can overlap, found by binary search.
#[derive(Clone, Debug)]
pub struct ResourceProfile {
    /// Resource code (for logging)
    pub resource_name: String,
    pub capacity: i64,
    /// (start, finish, quantity), half-open, sorted by start
    reservations: Vec<(Time, Time, i64)>,
}

impl ResourceProfile {
    pub fn new(resource_name: String, capacity: i64) -> Self {
        Self {
            resource_name,
            capacity,
            reservations: Vec::new(),
        }
    }

    /// Hold `quantity` over `[start, finish)`. Empty intervals and zero
    /// quantities hold nothing.
    pub fn reserve(&mut self, start: Time, finish: Time, quantity: i64) {
        if start >= finish || quantity == 0 {
            return;
        }
        let idx = self.reservations.partition_point(|&(s, _, _)| s <= start);
        self.reservations.insert(idx, (start, finish, quantity));
    }

    /// Highest total usage at any instant of `[start, finish)`.
    pub fn peak_usage(&self, start: Time, finish: Time) -> i64 {
        if start >= finish {
            return 0;
        }

        // Only reservations starting before the window ends can overlap it
        let end = self.reservations.partition_point(|&(s, _, _)| s < finish);
        let mut events: Vec<(Time, i64)> = Vec::new();
        for &(s, f, q) in &self.reservations[..end] {
            if f <= start {
                continue;
            }
            events.push((s.max(start), q));
            if f < finish {
                events.push((f, -q));
            }
        }
        events.sort_unstable();

        let mut level = 0;
        let mut peak = 0;
        let mut i = 0;
        while i < events.len() {
            let instant = events[i].0;
            while i < events.len() && events[i].0 == instant {
                level += events[i].1;
                i += 1;
            }
            peak = peak.max(level);
        }
        peak
    }

    /// Whether `quantity` more fits over `[start, start + duration)`.
    pub fn fits(&self, start: Time, duration: Time, quantity: i64) -> bool {
        if duration == 0 || quantity == 0 {
            return true;
        }
        self.peak_usage(start, start + duration) + quantity <= self.capacity
    }

    /// Instants after `after` at which some reservation ends, ascending.
    ///
    /// Usage only drops at these instants, so they are the only candidate
    /// starts worth testing beyond a lower bound.
    pub fn release_times_after(&self, after: Time) -> Vec<Time> {
        let mut times: Vec<Time> = self
            .reservations
            .iter()
            .map(|&(_, f, _)| f)
            .filter(|&f| f > after)
            .collect();
        times.sort_unstable();
        times.dedup();
        times
    }

    pub fn len(&self) -> usize {
        self.reservations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }
}
