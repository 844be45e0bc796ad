use std::path::Path;

use anyhow::Context as _;
use dnsstat_core::{DnsEvent, Timestamp};
use pcap::{Capture, Offline};

use crate::frame::{decode_frame, FrameError, LinkType};

/// Frames that didn't turn into DNS events, by reason
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SkippedFrames {
    /// Non-DNS traffic: other protocols, other ports, truncated lower layers
    pub unrelated: u64,
    /// DNS traffic that failed to decode
    pub malformed: u64,
}

impl SkippedFrames {
    fn record(&mut self, err: &FrameError) {
        if err.is_malformed() {
            tracing::debug!("Skipping frame: {}", err);
            self.malformed += 1;
        } else {
            tracing::trace!("Skipping frame: {}", err);
            self.unrelated += 1;
        }
    }
}

/// Lazily reads DNS events from a pcap/pcapng file, in capture order.
///
/// The reader is single-use: once the file is exhausted it keeps returning `None`.
pub struct TraceReader {
    capture: Capture<Offline>,
    link_type: LinkType,
    packets: u64,
    skipped: SkippedFrames,
    finished: bool,
}

impl TraceReader {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let capture = Capture::from_file(path)
            .with_context(|| format!("failed to open trace file '{}'", path.display()))?;

        let datalink = capture.get_datalink();
        let link_type = LinkType::from_dlt(datalink.0).with_context(|| {
            format!(
                "unsupported link type {} ({}) in '{}'",
                datalink.0,
                datalink.get_name().unwrap_or_else(|_| "unknown".into()),
                path.display()
            )
        })?;
        tracing::debug!(path = ?path, ?link_type, "Opened trace file");

        Ok(TraceReader {
            capture,
            link_type,
            packets: 0,
            skipped: SkippedFrames::default(),
            finished: false,
        })
    }

    pub fn link_type(&self) -> LinkType {
        self.link_type
    }

    /// Number of frames read so far, DNS or not
    pub fn packets(&self) -> u64 {
        self.packets
    }

    pub fn skipped(&self) -> &SkippedFrames {
        &self.skipped
    }
}

impl Iterator for TraceReader {
    type Item = DnsEvent;

    fn next(&mut self) -> Option<DnsEvent> {
        while !self.finished {
            match self.capture.next_packet() {
                Ok(packet) => {
                    self.packets += 1;
                    let timestamp =
                        timestamp_from_timeval(packet.header.ts.tv_sec as i64, packet.header.ts.tv_usec as i64);
                    match decode_frame(self.link_type, packet.data, timestamp) {
                        Ok(event) => return Some(event),
                        Err(e) => self.skipped.record(&e),
                    }
                }
                Err(pcap::Error::NoMorePackets) => {
                    self.finished = true;
                }
                Err(e) => {
                    // Usually a capture cut short mid-record; keep what was read so far
                    tracing::warn!(packets = self.packets, "Stopped reading the trace file: {}", e);
                    self.finished = true;
                }
            }
        }

        None
    }
}

/// Converts a pcap record time, clamping pre-epoch values to the epoch
fn timestamp_from_timeval(secs: i64, micros: i64) -> Timestamp {
    let secs = u64::try_from(secs).unwrap_or(0);
    let micros = micros.clamp(0, 999_999) as u32;
    Timestamp::from_secs_nanos(secs, micros * 1_000)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::frame::tests::{dns_message, ethernet, ipv4, udp};
    use std::fs;
    use std::path::PathBuf;
    use std::time::Duration;

    pub(crate) const LINKTYPE_ETHERNET: u32 = 1;

    /// Writes a classic microsecond pcap file with one record per `(secs, micros, frame)`
    pub(crate) fn write_pcap(name: &str, link_type: u32, records: &[(u32, u32, Vec<u8>)]) -> PathBuf {
        let mut file = Vec::new();
        file.extend_from_slice(&0xa1b2c3d4u32.to_le_bytes());
        file.extend_from_slice(&2u16.to_le_bytes());
        file.extend_from_slice(&4u16.to_le_bytes());
        file.extend_from_slice(&0i32.to_le_bytes());
        file.extend_from_slice(&0u32.to_le_bytes());
        file.extend_from_slice(&65535u32.to_le_bytes());
        file.extend_from_slice(&link_type.to_le_bytes());
        for (secs, micros, frame) in records {
            file.extend_from_slice(&secs.to_le_bytes());
            file.extend_from_slice(&micros.to_le_bytes());
            file.extend_from_slice(&(frame.len() as u32).to_le_bytes());
            file.extend_from_slice(&(frame.len() as u32).to_le_bytes());
            file.extend_from_slice(frame);
        }

        let path = std::env::temp_dir().join(format!("dnsstat-{}-{}.pcap", name, std::process::id()));
        fs::write(&path, file).expect("shouldn't have failed");
        path
    }

    pub(crate) fn dns_frame(id: u16, is_response: bool, qname: &str) -> Vec<u8> {
        let (src, dst) = if is_response { (53, 33333) } else { (33333, 53) };
        ethernet(0x0800, &ipv4(17, &udp(src, dst, &dns_message(id, is_response, qname))))
    }

    #[test]
    fn reads_events_in_capture_order() {
        let path = write_pcap(
            "order",
            LINKTYPE_ETHERNET,
            &[
                (100, 0, dns_frame(1, false, "a.com")),
                (100, 500, ethernet(0x0806, &[0x0; 28])),
                (100, 20_000, dns_frame(1, true, "a.com")),
            ],
        );

        let mut reader = TraceReader::open(&path).expect("shouldn't have failed");
        assert_eq!(reader.link_type(), LinkType::Ethernet);
        let events: Vec<_> = reader.by_ref().collect();
        fs::remove_file(&path).ok();

        assert_eq!(events.len(), 2);
        assert!(!events[0].is_response);
        assert!(events[1].is_response);
        assert_eq!(
            events[1].timestamp.checked_duration_since(events[0].timestamp),
            Some(Duration::from_millis(20))
        );
        assert_eq!(reader.packets(), 3);
        assert_eq!(reader.skipped(), &SkippedFrames { unrelated: 1, malformed: 0 });
        assert!(reader.next().is_none());
    }

    #[test]
    fn malformed_dns_is_counted() {
        let mut truncated = dns_frame(5, false, "example.com");
        truncated.truncate(truncated.len() - 6);
        let path = write_pcap("malformed", LINKTYPE_ETHERNET, &[(1, 0, truncated)]);

        let mut reader = TraceReader::open(&path).expect("shouldn't have failed");
        let events: Vec<_> = reader.by_ref().collect();
        fs::remove_file(&path).ok();

        assert!(events.is_empty());
        assert_eq!(reader.skipped().malformed, 1);
    }

    #[test]
    fn missing_file_is_an_error() {
        let path = std::env::temp_dir().join("dnsstat-definitely-missing.pcap");
        let err = TraceReader::open(&path).err().expect("should have failed");
        assert!(format!("{:#}", err).starts_with("failed to open trace file"));
    }

    #[test]
    fn unsupported_link_type_is_an_error() {
        // LINKTYPE_IEEE802_11
        let path = write_pcap("wifi", 105, &[]);
        let err = TraceReader::open(&path).err().expect("should have failed");
        fs::remove_file(&path).ok();
        assert!(err.to_string().starts_with("unsupported link type 105"));
    }

    #[test]
    fn pre_epoch_timestamps_are_clamped() {
        assert_eq!(timestamp_from_timeval(-5, 10), Timestamp::from_secs_nanos(0, 10_000));
        assert_eq!(timestamp_from_timeval(7, 250_000), Timestamp::from_secs_nanos(7, 250_000_000));
    }
}
