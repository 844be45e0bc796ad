//! Single-pass correlation of DNS queries and responses.
//!
//! [`Correlator`] consumes [`DnsEvent`]s in capture order, pairs responses with queries by
//! transaction ID and produces [`Stats`]: request counters, a round-trip histogram and a
//! per-name query tally.

mod correlator;
mod event;
mod histogram;
mod stats;

pub use correlator::Correlator;
pub use event::{DnsEvent, Timestamp};
pub use histogram::{LatencyHistogram, TIME_SLOTS};
pub use stats::{HistogramEntry, RunSummary, Stats};
