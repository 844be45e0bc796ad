use std::fmt;

use chrono::{DateTime, Local};
use dnsstat_core::{Stats, Timestamp};

const NOT_APPLICABLE: &str = "n/a";

/// Human-readable rendering of a finished run
pub struct Report<'a> {
    stats: &'a Stats,
}

impl<'a> Report<'a> {
    pub fn new(stats: &'a Stats) -> Self {
        Report { stats }
    }

    fn write_timestamp(f: &mut fmt::Formatter<'_>, timestamp: Option<Timestamp>) -> fmt::Result {
        let local = timestamp.and_then(|timestamp| {
            let since_epoch = timestamp.since_epoch();
            DateTime::from_timestamp(since_epoch.as_secs() as i64, since_epoch.subsec_nanos())
                .map(|utc| utc.with_timezone(&Local))
        });
        match local {
            Some(local) => writeln!(f, "{}", local.format("%Y-%m-%d %H:%M:%S%.6f %z")),
            None => writeln!(f, "{}", NOT_APPLICABLE),
        }
    }

    fn write_requests(f: &mut fmt::Formatter<'_>, label: &str, count: u64, rate: Option<f64>) -> fmt::Result {
        match rate {
            Some(rate) => writeln!(f, "{:<17}{} ({:.6} rpm)", label, count, rate),
            None => writeln!(f, "{:<17}{} ({} rpm)", label, count, NOT_APPLICABLE),
        }
    }
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats;
        let summary = stats.summary();

        writeln!(
            f,
            "{} requests, {} responses, {} missing requests, {} missing responses",
            stats.total_requests(),
            summary.response_count,
            summary.miss_count,
            stats.unmatched_request_count()
        )?;
        writeln!(f)?;

        write!(f, "{:<17}", "started:")?;
        Self::write_timestamp(f, summary.first_query_time)?;
        write!(f, "{:<17}", "finished:")?;
        Self::write_timestamp(f, summary.last_query_time)?;
        match stats.observation_window() {
            Some(window) => writeln!(f, "{:<17}{:.3} seconds", "measured period:", window.as_secs_f64())?,
            None => writeln!(f, "{:<17}{}", "measured period:", NOT_APPLICABLE)?,
        }
        Self::write_requests(
            f,
            "IPv4 requests:",
            summary.ipv4_request_count,
            stats.rate_per_minute(summary.ipv4_request_count),
        )?;
        Self::write_requests(
            f,
            "IPv6 requests:",
            summary.ipv6_request_count,
            stats.rate_per_minute(summary.ipv6_request_count),
        )?;
        if summary.reordered_count > 0 {
            writeln!(f, "{:<17}{}", "reordered:", summary.reordered_count)?;
        }

        writeln!(f)?;
        writeln!(f, "requests per round time:")?;
        for entry in stats.histogram_entries() {
            match entry.percentage {
                Some(percentage) => {
                    writeln!(f, "{:02}ms {:>6} {:>6.2} %", entry.slot_ms, entry.count, percentage)?
                }
                None => writeln!(f, "{:02}ms {:>6} {:>6} %", entry.slot_ms, entry.count, NOT_APPLICABLE)?,
            }
        }

        // Busiest names first, ties broken by name so output is stable
        let mut names: Vec<_> = stats.name_entries().collect();
        names.sort_unstable_by(|(a_name, a_count), (b_name, b_count)| {
            b_count.cmp(a_count).then_with(|| a_name.cmp(b_name))
        });
        for (name, count) in names {
            writeln!(f, "{:>5} {}", count, String::from_utf8_lossy(name))?;
        }

        Ok(())
    }
}
