use anyhow::Context;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    filter::filter_fn, fmt::layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

pub const LOGGING_ENV: &str = "DNSSTAT_LOG";

/// Routes logs to stderr, keeping stdout for the report.
///
/// INFO and above are printed plainly, DEBUG and TRACE carry their source location.
pub fn setup_logging() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            layer()
                .with_writer(std::io::stderr)
                .with_filter(LevelFilter::INFO)
                .and_then(
                    layer()
                        .with_writer(std::io::stderr)
                        .with_line_number(true)
                        .with_file(true)
                        .with_filter(filter_fn(|metadata| metadata.level() > &LevelFilter::INFO)),
                )
                .with_filter(
                    EnvFilter::builder()
                        .with_env_var(LOGGING_ENV)
                        .with_default_directive(LevelFilter::WARN.into())
                        .from_env_lossy(),
                ),
        )
        .try_init()
        .context("failed to initialize tracing_subscriber")
}
