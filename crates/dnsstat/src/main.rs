use clap::Parser as _;
use dnsstat::{setup_logging, App, Args};

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    setup_logging()?;

    App::run(&args)
}
