use std::path::PathBuf;

use clap::Parser;

/// Measures DNS round-trip times and per-domain query counts in a packet trace
#[derive(Parser, Debug)]
#[command(version, name = "dnsstat")]
pub struct Args {
    /// Previously captured trace file (pcap or pcapng)
    #[arg(value_name = "FILE")]
    pub trace_path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn single_positional_argument() {
        let args = Args::try_parse_from(["dnsstat", "capture.pcap"]).expect("shouldn't have failed");
        assert_eq!(args.trace_path, PathBuf::from("capture.pcap"));
    }

    #[test]
    fn missing_argument() {
        let err = Args::try_parse_from(["dnsstat"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        assert_ne!(err.exit_code(), 0);
    }

    #[test]
    fn extra_argument() {
        let err = Args::try_parse_from(["dnsstat", "a.pcap", "b.pcap"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
        assert_ne!(err.exit_code(), 0);
    }
}
