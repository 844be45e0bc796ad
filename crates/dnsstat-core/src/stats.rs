use std::collections::HashMap;
use std::time::Duration;

use crate::{LatencyHistogram, Timestamp};

/// Scalar counters gathered over a run
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct RunSummary {
    pub ipv4_request_count: u64,
    pub ipv6_request_count: u64,
    pub response_count: u64,
    /// Responses without a pending request
    pub miss_count: u64,
    /// Matched responses stamped earlier than their request
    pub reordered_count: u64,
    /// Time of the first query, never overwritten
    pub first_query_time: Option<Timestamp>,
    /// Time of the most recent query
    pub last_query_time: Option<Timestamp>,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub struct HistogramEntry {
    pub slot_ms: usize,
    pub count: u64,
    /// Share of all responses, `None` when no response was seen
    pub percentage: Option<f64>,
}

/// Final, read-only state of a correlation run
#[derive(Debug, Clone)]
pub struct Stats {
    pub(crate) summary: RunSummary,
    pub(crate) histogram: LatencyHistogram,
    pub(crate) names: HashMap<Vec<u8>, u64>,
    pub(crate) pending: HashMap<u16, Timestamp>,
}

impl Stats {
    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn histogram(&self) -> &LatencyHistogram {
        &self.histogram
    }

    pub fn total_requests(&self) -> u64 {
        self.summary.ipv4_request_count + self.summary.ipv6_request_count
    }

    /// Requests that never got a response
    pub fn unmatched_request_count(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_ids(&self) -> impl Iterator<Item = u16> + '_ {
        self.pending.keys().copied()
    }

    /// Time between the first and the last query, `None` if there were no queries
    pub fn observation_window(&self) -> Option<Duration> {
        let first = self.summary.first_query_time?;
        let last = self.summary.last_query_time?;
        Some(last.checked_duration_since(first).unwrap_or(Duration::ZERO))
    }

    /// `count` spread over the observation window, `None` for an empty or zero-length window
    pub fn rate_per_minute(&self, count: u64) -> Option<f64> {
        let minutes = self.observation_window()?.as_secs_f64() / 60.0;
        if minutes > 0.0 {
            Some(count as f64 / minutes)
        } else {
            None
        }
    }

    pub fn percentage_of_responses(&self, count: u64) -> Option<f64> {
        match self.summary.response_count {
            0 => None,
            responses => Some(100.0 * count as f64 / responses as f64),
        }
    }

    pub fn histogram_entries(&self) -> impl Iterator<Item = HistogramEntry> + '_ {
        self.histogram
            .iter_nonzero()
            .map(|(slot_ms, count)| HistogramEntry {
                slot_ms,
                count,
                percentage: self.percentage_of_responses(count),
            })
    }

    pub fn name_entries(&self) -> impl Iterator<Item = (&[u8], u64)> + '_ {
        self.names
            .iter()
            .map(|(name, count)| (name.as_slice(), *count))
    }

    pub fn name_count(&self, name: &[u8]) -> u64 {
        self.names.get(name).copied().unwrap_or(0)
    }
}
