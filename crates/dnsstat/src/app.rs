use std::io::Write as _;
use std::path::Path;

use anyhow::Context as _;
use dnsstat_core::{Correlator, Stats};

use crate::report::Report;
use crate::trace::TraceReader;
use crate::Args;

pub struct App;

impl App {
    pub fn run(args: &Args) -> anyhow::Result<()> {
        let stats = App::analyze(&args.trace_path)?;

        let mut stdout = std::io::stdout().lock();
        write!(stdout, "{}", Report::new(&stats)).context("failed to write the report")?;
        stdout.flush().context("failed to write the report")
    }

    /// Correlates every DNS message in the trace file at `path`
    pub fn analyze(path: &Path) -> anyhow::Result<Stats> {
        let mut reader = TraceReader::open(path)?;
        let stats = Correlator::new().consume(reader.by_ref());

        let skipped = reader.skipped();
        tracing::info!(
            packets = reader.packets(),
            unrelated = skipped.unrelated,
            malformed = skipped.malformed,
            "Finished reading '{}'",
            path.display()
        );
        if skipped.malformed > 0 {
            tracing::warn!("{} DNS packets couldn't be decoded and were ignored", skipped.malformed);
        }

        Ok(stats)
    }
}
