use std::fmt;
use std::time::Duration;

use dnsstat_lib::QueryOpcode;

/// Capture time as an offset from the Unix epoch
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default, Hash)]
pub struct Timestamp(Duration);

impl Timestamp {
    pub const fn new(since_epoch: Duration) -> Self {
        Timestamp(since_epoch)
    }

    pub fn from_secs_nanos(secs: u64, nanos: u32) -> Self {
        Timestamp(Duration::new(secs, nanos))
    }

    pub fn from_millis(millis: u64) -> Self {
        Timestamp(Duration::from_millis(millis))
    }

    pub fn since_epoch(&self) -> Duration {
        self.0
    }

    /// Elapsed time from `earlier` to `self`, or `None` if `earlier` is actually later
    pub fn checked_duration_since(&self, earlier: Timestamp) -> Option<Duration> {
        self.0.checked_sub(earlier.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.0.as_secs(), self.0.subsec_nanos())
    }
}

/// A single decoded DNS message, as seen by the correlator
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DnsEvent {
    pub transaction_id: u16,
    pub is_response: bool,
    pub opcode: QueryOpcode,
    pub timestamp: Timestamp,
    /// Address family of the carrying packet; only meaningful for queries
    pub is_ipv6: bool,
    /// Dotted name of the first question; only meaningful for queries
    pub question_name: Option<Vec<u8>>,
}

impl DnsEvent {
    pub fn query(
        transaction_id: u16,
        timestamp: Timestamp,
        question_name: impl Into<Vec<u8>>,
        is_ipv6: bool,
    ) -> Self {
        DnsEvent {
            transaction_id,
            is_response: false,
            opcode: QueryOpcode::QUERY,
            timestamp,
            is_ipv6,
            question_name: Some(question_name.into()),
        }
    }

    pub fn response(transaction_id: u16, timestamp: Timestamp) -> Self {
        DnsEvent {
            transaction_id,
            is_response: true,
            opcode: QueryOpcode::QUERY,
            timestamp,
            is_ipv6: false,
            question_name: None,
        }
    }

    pub fn with_opcode(mut self, opcode: QueryOpcode) -> Self {
        self.opcode = opcode;
        self
    }
}
