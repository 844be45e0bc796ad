use std::time::Duration;

/// Number of one-millisecond latency slots (0..=99 ms)
pub const TIME_SLOTS: usize = 100;

/// Round-trip times bucketed by whole milliseconds.
///
/// Anything at or above `TIME_SLOTS - 1` ms shares the last slot.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct LatencyHistogram {
    slots: [u64; TIME_SLOTS],
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        LatencyHistogram {
            slots: [0; TIME_SLOTS],
        }
    }
}

impl LatencyHistogram {
    pub fn new() -> Self {
        LatencyHistogram::default()
    }

    pub fn slot_for(round_trip: Duration) -> usize {
        let millis = round_trip.as_millis();
        if millis >= TIME_SLOTS as u128 {
            TIME_SLOTS - 1
        } else {
            millis as usize
        }
    }

    /// Records a round trip and returns the slot it landed in
    pub fn record(&mut self, round_trip: Duration) -> usize {
        let slot = Self::slot_for(round_trip);
        self.slots[slot] += 1;
        slot
    }

    pub fn get(&self, slot_ms: usize) -> u64 {
        self.slots.get(slot_ms).copied().unwrap_or(0)
    }

    /// Sum over all slots, i.e. the number of matched responses
    pub fn total(&self) -> u64 {
        self.slots.iter().sum()
    }

    /// `(slot_ms, count)` for every nonzero slot, ascending
    pub fn iter_nonzero(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .map(|(slot_ms, count)| (slot_ms, *count))
    }
}
