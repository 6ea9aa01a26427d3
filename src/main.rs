//! CLI entry point for reqnorm.

use std::fs;
use std::io::{self, IsTerminal, Read};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Parser;
use reqnorm::{RequestParams, Session};
use tracing::{debug, error, info};

mod cli;
mod config;

use cli::Args;

fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let mut session = Session::new();
    if let Some(file_config) = config::load_config(args.config.as_deref())? {
        debug!(?file_config, "loaded config");
        file_config.apply_to(&mut session)?;
    }

    // Flags override config values
    if let Some(timeout) = args.timeout {
        session
            .set_timeout(timeout)
            .context("Invalid --timeout")?;
    }
    if let Some(retries) = args.retries {
        session
            .set_retries(retries)
            .context("Invalid --retries")?;
    }
    if args.insecure {
        session.set_verify(false).context("Invalid --insecure")?;
    }

    let raw = read_description(args)?;
    let description: serde_json::Value =
        serde_json::from_str(&raw).context("Request description is not valid JSON")?;

    let params = RequestParams::from_json(&description)?;
    let prepared = session.prepare(params)?;

    info!(
        method = %prepared.head.method,
        url = %prepared.head.url,
        "request normalized"
    );

    let rendered = serde_json::to_string_pretty(&prepared.summary())
        .context("Failed to render request summary")?;
    println!("{rendered}");
    Ok(())
}

fn read_description(args: &Args) -> Result<String> {
    if let Some(path) = &args.file {
        return fs::read_to_string(path)
            .with_context(|| format!("Failed to read request file '{}'", path.display()));
    }
    if io::stdin().is_terminal() {
        bail!("No request description given. Pass a FILE or pipe JSON via stdin.");
    }
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read request description from stdin")?;
    Ok(buffer)
}
