// CLI entry point for the compose orchestrator.
//
// Reads one compose request as JSON (from a file, or stdin when no file is
// given), runs the pipeline and prints the response as pretty JSON on
// stdout. Logs go to stderr; set RUST_LOG to adjust verbosity.
//
// Usage:
//   compose [OPTIONS] [REQUEST.json]
//     --config <PATH>     Compose config JSON (default: built-in defaults)
//     --timestamp <TS>    Fixed artifacts.timestamp (default: now, UTC)
//     --hashes            Also print the content hashes to stderr

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use starsong_compose::hashing::normalized_response_hash;
use starsong_compose::{ComposeConfig, ComposeContext, ComposeRequest, compose, compose_at};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    request: Option<PathBuf>,
    timestamp: Option<String>,
    hashes: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("starsong=info".parse()?))
        .init();

    let Some(args) = parse_args()? else {
        print_usage();
        return Ok(());
    };

    let config = match &args.config {
        Some(path) => ComposeConfig::from_path(path)?,
        None => ComposeConfig::default(),
    };
    let ctx = ComposeContext::with_default_tables(config)?;

    let json = match &args.request {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read request {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read request from stdin")?;
            buf
        }
    };
    let request = ComposeRequest::from_json(&json)?;

    let output = match &args.timestamp {
        Some(ts) => compose_at(&ctx, &request, ts)?,
        None => compose(&ctx, &request)?,
    };

    if args.hashes {
        let normalized = normalized_response_hash(&output.response)?;
        info!(
            audio = %output.hashes.audio,
            events = %output.hashes.events,
            text = %output.hashes.text,
            response = %normalized,
            "content hashes"
        );
    }

    println!("{}", serde_json::to_string_pretty(&output.response)?);
    Ok(())
}

/// Parse command-line arguments. Returns `None` when help was requested.
fn parse_args() -> Result<Option<Args>> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().context("--config requires a path")?;
                args.config = Some(PathBuf::from(path));
            }
            "--timestamp" => {
                args.timestamp = Some(iter.next().context("--timestamp requires a value")?);
            }
            "--hashes" => args.hashes = true,
            "--help" | "-h" => return Ok(None),
            other if other.starts_with("--") => bail!("unknown argument: {other}"),
            other => {
                if args.request.is_some() {
                    bail!("only one request file may be given");
                }
                args.request = Some(PathBuf::from(other));
            }
        }
    }

    Ok(Some(args))
}

fn print_usage() {
    println!("Usage: compose [OPTIONS] [REQUEST.json]");
    println!();
    println!("Reads the request from stdin when no file is given.");
    println!();
    println!("Options:");
    println!("  --config <PATH>     Compose config JSON (default: built-in defaults)");
    println!("  --timestamp <TS>    Fixed artifacts.timestamp (default: now, UTC)");
    println!("  --hashes            Log content hashes to stderr");
    println!("  --help, -h          Show this help");
}
