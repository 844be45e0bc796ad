use std::collections::HashMap;
use std::time::Duration;

use dnsstat_lib::QueryOpcode;

use crate::{DnsEvent, LatencyHistogram, RunSummary, Stats, Timestamp};

/// Matches DNS responses to queries by transaction ID and aggregates the results.
///
/// Events must be fed in capture order. Only one request per transaction ID is tracked at a
/// time: a query reusing a pending ID replaces the earlier one.
#[derive(Debug, Default)]
pub struct Correlator {
    summary: RunSummary,
    histogram: LatencyHistogram,
    names: HashMap<Vec<u8>, u64>,
    pending: HashMap<u16, Timestamp>,
}

impl Correlator {
    pub fn new() -> Self {
        Correlator::default()
    }

    /// Drains `events` and returns the final statistics
    pub fn consume(mut self, events: impl IntoIterator<Item = DnsEvent>) -> Stats {
        for event in events {
            self.process(&event);
        }
        self.finish()
    }

    pub fn process(&mut self, event: &DnsEvent) {
        if event.opcode != QueryOpcode::QUERY {
            return;
        }

        if event.is_response {
            self.process_response(event);
        } else {
            self.process_query(event);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn finish(self) -> Stats {
        Stats {
            summary: self.summary,
            histogram: self.histogram,
            names: self.names,
            pending: self.pending,
        }
    }

    fn process_response(&mut self, event: &DnsEvent) {
        self.summary.response_count += 1;

        let Some(requested_at) = self.pending.remove(&event.transaction_id) else {
            self.summary.miss_count += 1;
            return;
        };

        let round_trip = match event.timestamp.checked_duration_since(requested_at) {
            Some(round_trip) => round_trip,
            None => {
                tracing::debug!(
                    id = event.transaction_id,
                    "Response at {} precedes its request at {}",
                    event.timestamp,
                    requested_at
                );
                self.summary.reordered_count += 1;
                Duration::ZERO
            }
        };
        self.histogram.record(round_trip);
    }

    fn process_query(&mut self, event: &DnsEvent) {
        if event.is_ipv6 {
            self.summary.ipv6_request_count += 1;
        } else {
            self.summary.ipv4_request_count += 1;
        }

        if let Some(previous) = self.pending.insert(event.transaction_id, event.timestamp) {
            tracing::trace!(
                id = event.transaction_id,
                "Request from {} replaced by a newer one",
                previous
            );
        }

        if let Some(name) = event.question_name.as_deref() {
            match self.names.get_mut(name) {
                Some(count) => *count += 1,
                None => {
                    self.names.insert(name.to_vec(), 1);
                }
            }
        }

        self.summary.first_query_time.get_or_insert(event.timestamp);
        self.summary.last_query_time = Some(event.timestamp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HistogramEntry, TIME_SLOTS};
    use proptest::prelude::*;

    fn ms(millis: u64) -> Timestamp {
        Timestamp::from_millis(millis)
    }

    fn query(id: u16, at: u64, name: &str) -> DnsEvent {
        DnsEvent::query(id, ms(at), name, false)
    }

    fn response(id: u16, at: u64) -> DnsEvent {
        DnsEvent::response(id, ms(at))
    }

    #[test]
    fn matched_response_is_bucketed() {
        let stats = Correlator::new().consume([query(7, 1_000, "a.com"), response(7, 1_042)]);

        assert_eq!(stats.histogram().get(42), 1);
        assert_eq!(stats.histogram().total(), 1);
        assert_eq!(stats.unmatched_request_count(), 0);
        assert_eq!(stats.summary().response_count, 1);
        assert_eq!(stats.summary().miss_count, 0);
    }

    #[test]
    fn sub_millisecond_remainder_is_truncated() {
        let stats = Correlator::new().consume([
            DnsEvent::query(1, Timestamp::from_secs_nanos(5, 0), "a.com", false),
            DnsEvent::response(1, Timestamp::from_secs_nanos(5, 20_999_999)),
        ]);

        assert_eq!(stats.histogram().get(20), 1);
    }

    #[test]
    fn response_without_request_is_a_miss() {
        let mut correlator = Correlator::new();
        correlator.process(&query(1, 0, "a.com"));
        correlator.process(&response(2, 5));
        let stats = correlator.finish();

        assert_eq!(stats.summary().miss_count, 1);
        assert_eq!(stats.summary().response_count, 1);
        assert_eq!(stats.histogram().total(), 0);
        assert_eq!(stats.pending_ids().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn duplicate_response_is_a_miss() {
        let stats = Correlator::new().consume([query(1, 0, "a.com"), response(1, 3), response(1, 4)]);

        assert_eq!(stats.summary().response_count, 2);
        assert_eq!(stats.summary().miss_count, 1);
        assert_eq!(stats.histogram().get(3), 1);
        assert_eq!(stats.histogram().total(), 1);
    }

    #[test]
    fn unanswered_requests_stay_pending() {
        let stats = Correlator::new().consume([
            query(1, 0, "a.com"),
            query(2, 1, "b.com"),
            query(3, 2, "c.com"),
            response(2, 10),
        ]);

        let mut pending: Vec<_> = stats.pending_ids().collect();
        pending.sort_unstable();
        assert_eq!(pending, vec![1, 3]);
        assert_eq!(stats.unmatched_request_count(), 2);
    }

    #[test]
    fn reused_id_keeps_latest_request() {
        let stats = Correlator::new().consume([query(5, 0, "a.com"), query(5, 30, "a.com"), response(5, 40)]);

        assert_eq!(stats.histogram().get(10), 1);
        assert_eq!(stats.histogram().get(40), 0);
        assert_eq!(stats.unmatched_request_count(), 0);
        assert_eq!(stats.total_requests(), 2);
    }

    #[test]
    fn round_trips_are_clamped() {
        let stats = Correlator::new().consume([
            query(1, 0, "a.com"),
            response(1, 99),
            query(2, 1_000, "a.com"),
            response(2, 1_500),
            query(3, 2_000, "a.com"),
            response(3, 2_000),
        ]);

        assert_eq!(stats.histogram().get(TIME_SLOTS - 1), 2);
        assert_eq!(stats.histogram().get(0), 1);
    }

    #[test]
    fn response_before_request_lands_in_first_slot() {
        let stats = Correlator::new().consume([query(1, 50, "a.com"), response(1, 20)]);

        assert_eq!(stats.histogram().get(0), 1);
        assert_eq!(stats.summary().reordered_count, 1);
        assert_eq!(stats.summary().miss_count, 0);
        assert_eq!(stats.unmatched_request_count(), 0);
    }

    #[test]
    fn names_are_tallied_regardless_of_outcome() {
        let stats = Correlator::new().consume([
            query(1, 0, "example.com"),
            query(2, 1, "example.com"),
            query(3, 2, "example.com"),
            query(4, 3, "other.org"),
            response(1, 4),
        ]);

        assert_eq!(stats.name_count(b"example.com"), 3);
        assert_eq!(stats.name_count(b"other.org"), 1);
        assert_eq!(stats.name_count(b"EXAMPLE.COM"), 0);
        assert_eq!(stats.name_entries().count(), 2);
    }

    #[test]
    fn query_without_question_is_still_counted() {
        let mut event = query(1, 0, "");
        event.question_name = None;
        let stats = Correlator::new().consume([event, response(1, 1)]);

        assert_eq!(stats.total_requests(), 1);
        assert_eq!(stats.name_entries().count(), 0);
        assert_eq!(stats.histogram().get(1), 1);
    }

    #[test]
    fn end_to_end_scenario() {
        let stats = Correlator::new().consume([
            DnsEvent::query(1, ms(0), "a.com", false),
            response(1, 20),
            DnsEvent::query(2, ms(5), "b.com", true),
            response(99, 10),
        ]);

        let summary = stats.summary();
        assert_eq!(summary.ipv4_request_count, 1);
        assert_eq!(summary.ipv6_request_count, 1);
        assert_eq!(summary.response_count, 2);
        assert_eq!(summary.miss_count, 1);
        assert_eq!(stats.histogram_entries().map(|e| (e.slot_ms, e.count)).collect::<Vec<_>>(), vec![(20, 1)]);
        assert_eq!(stats.pending_ids().collect::<Vec<_>>(), vec![2]);

        let mut names: Vec<_> = stats.name_entries().collect();
        names.sort_unstable();
        assert_eq!(names, vec![(&b"a.com"[..], 1), (&b"b.com"[..], 1)]);

        assert_eq!(summary.first_query_time, Some(ms(0)));
        assert_eq!(summary.last_query_time, Some(ms(5)));
    }

    #[test]
    fn non_query_opcodes_are_ignored() {
        let stats = Correlator::new().consume([
            query(1, 0, "a.com").with_opcode(QueryOpcode::STATUS),
            response(1, 5).with_opcode(QueryOpcode::STATUS),
            query(2, 10, "b.com").with_opcode(QueryOpcode::NOTIFY),
            response(3, 15).with_opcode(QueryOpcode::UPDATE),
            query(4, 20, "c.com").with_opcode(QueryOpcode::UNKNOWN(9)),
        ]);

        assert_eq!(stats.summary(), &RunSummary::default());
        assert_eq!(stats.histogram(), &LatencyHistogram::new());
        assert_eq!(stats.name_entries().count(), 0);
        assert_eq!(stats.unmatched_request_count(), 0);
    }

    #[test]
    fn last_query_time_ignores_responses() {
        let stats = Correlator::new().consume([query(1, 100, "a.com"), query(2, 200, "a.com"), response(1, 900)]);

        assert_eq!(stats.summary().first_query_time, Some(ms(100)));
        assert_eq!(stats.summary().last_query_time, Some(ms(200)));
        assert_eq!(stats.observation_window(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn degenerate_aggregates_are_undefined() {
        let empty = Correlator::new().finish();
        assert_eq!(empty.observation_window(), None);
        assert_eq!(empty.rate_per_minute(10), None);
        assert_eq!(empty.percentage_of_responses(1), None);

        let single = Correlator::new().consume([query(1, 0, "a.com")]);
        assert_eq!(single.observation_window(), Some(Duration::ZERO));
        assert_eq!(single.rate_per_minute(1), None);
    }

    #[test]
    fn rates_and_percentages() {
        let stats = Correlator::new().consume([
            query(1, 0, "a.com"),
            response(1, 10),
            query(2, 30_000, "a.com"),
            response(2, 30_010),
            query(3, 60_000, "a.com"),
            response(3, 60_050),
            response(4, 60_051),
        ]);

        assert_eq!(stats.rate_per_minute(3), Some(3.0));
        let entries: Vec<_> = stats.histogram_entries().collect();
        assert_eq!(entries, vec![entry(10, 2, 50.0), entry(50, 1, 25.0)]);
    }

    fn entry(slot_ms: usize, count: u64, percentage: f64) -> HistogramEntry {
        HistogramEntry {
            slot_ms,
            count,
            percentage: Some(percentage),
        }
    }

    fn arb_event() -> impl Strategy<Value = DnsEvent> {
        (0..8u16, any::<bool>(), any::<bool>(), 0..4u8, 0..500u64).prop_map(
            |(id, is_response, is_ipv6, opcode, at)| {
                let event = if is_response {
                    response(id, at)
                } else {
                    DnsEvent::query(id, ms(at), format!("{}.test", id % 3), is_ipv6)
                };
                event.with_opcode(opcode.into())
            },
        )
    }

    proptest! {
        #[test]
        fn counters_are_conserved(events in prop::collection::vec(arb_event(), 0..200)) {
            let queries: Vec<_> = events
                .iter()
                .filter(|e| e.opcode == QueryOpcode::QUERY && !e.is_response)
                .collect();
            let responses = events
                .iter()
                .filter(|e| e.opcode == QueryOpcode::QUERY && e.is_response)
                .count() as u64;

            let stats = Correlator::new().consume(events.clone());
            let summary = stats.summary();

            prop_assert_eq!(stats.total_requests(), queries.len() as u64);
            prop_assert_eq!(summary.response_count, responses);
            // Every response is either a miss or exactly one histogram hit
            prop_assert_eq!(summary.miss_count + stats.histogram().total(), responses);
            prop_assert_eq!(stats.name_entries().map(|(_, count)| count).sum::<u64>(), queries.len() as u64);
            prop_assert!(stats.unmatched_request_count() <= queries.len());
            prop_assert_eq!(summary.first_query_time, queries.first().map(|e| e.timestamp));
            prop_assert_eq!(summary.last_query_time, queries.last().map(|e| e.timestamp));
        }
    }
}
