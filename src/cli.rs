//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Normalize an HTTP request description.
///
/// Reads a JSON request description (from FILE or stdin), normalizes every
/// parameter against a session built from the config file and flags, and
/// prints the canonical request as JSON.
#[derive(Parser, Debug)]
#[command(name = "reqnorm")]
#[command(author, version, about)]
pub struct Args {
    /// JSON request description; reads stdin when omitted
    #[arg(value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/reqnorm/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Session-wide total timeout in seconds (max 3600)
    #[arg(long, value_name = "SECS", value_parser = parse_timeout_secs)]
    pub timeout: Option<f64>,

    /// Session-wide retries for retryable statuses (0-10)
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(0..=10))]
    pub retries: Option<u32>,

    /// Disable TLS certificate verification
    #[arg(long)]
    pub insecure: bool,
}

fn parse_timeout_secs(raw: &str) -> Result<f64, String> {
    let secs: f64 = raw
        .parse()
        .map_err(|_| format!("'{raw}' is not a number of seconds"))?;
    if !secs.is_finite() || secs <= 0.0 || secs > 3600.0 {
        return Err(format!("{secs} is out of range (0, 3600]"));
    }
    Ok(secs)
}
