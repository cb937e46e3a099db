//! Command-line runner
//!
//! Reads the suite manifest, runs every suite (or the named ones) and exits
//! with the run's exit code.

use clap::Parser;
use minharness::{manifest, ColorSetting, ConsoleReporter, ThrowPolicy};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "minharness")]
#[command(about = "Run assertion suites and report through the exit code")]
struct Args {
    /// Directory holding suite directories and collaborator scripts
    #[arg(long, default_value = "test")]
    base: PathBuf,

    /// Suite manifest (defaults to <base>/suites.json)
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Idle timeout in milliseconds for suites that enable it
    #[arg(long)]
    idle_timeout_ms: Option<u64>,

    /// Record expressions that throw under a comparator as failures
    #[arg(long)]
    record_throws: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Enable verbose tracing output
    #[arg(long)]
    verbose: bool,

    /// Only run the suites with these names
    suites: Vec<String>,
}

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

fn run(args: Args) -> minharness::Result<i32> {
    let manifest_path = args
        .manifest
        .clone()
        .unwrap_or_else(|| args.base.join("suites.json"));
    let mut suites = manifest::load(&manifest_path)?;
    if !args.suites.is_empty() {
        suites.retain(|s| args.suites.iter().any(|name| name.eq_ignore_ascii_case(&s.name)));
    }
    tracing::info!("running {} suite(s) from {}", suites.len(), manifest_path.display());

    let color = if args.no_color {
        ColorSetting::Never
    } else {
        ColorSetting::Automatic
    };
    let mut builder = minharness::harness(&args.base)
        .suites(suites)
        .reporter(ConsoleReporter::new(color));
    if let Some(ms) = args.idle_timeout_ms {
        builder = builder.idle_timeout(Duration::from_millis(ms));
    }
    if args.record_throws {
        builder = builder.throw_policy(ThrowPolicy::Record);
    }

    let report = builder.execute()?;
    Ok(report.exit_code())
}

/// Default filter directives; collaborator output is shown unless filtered out
fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "minharness=debug"
    } else {
        "minharness=warn,minharness::env=info"
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new(default_directives(true))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(false)))
    };

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::EnvFilter;

    #[test]
    fn collaborator_output_is_shown_by_default() {
        let directives = default_directives(false);
        assert!(directives.split(',').any(|d| d == "minharness::env=info"));
        assert!(EnvFilter::try_new(directives).is_ok());
        assert!(EnvFilter::try_new(default_directives(true)).is_ok());
    }
}
