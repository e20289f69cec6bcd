//! Binary entry point for the covgate CLI.
//!
//! ## Usage
//!
//! ```bash
//! # Test every package in the module and fail on untested code
//! covgate --enforce ./...
//!
//! # Merge profiles produced elsewhere (e.g. by CI shards) without testing
//! covgate --load 'shards/*.out' --verbose
//!
//! # Pass flags through to go test
//! covgate -t -race -t -tags=integration ./pkg/...
//! ```
//!
//! Flags override `covgate.toml` in the root, which overrides the defaults.

use std::env;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;

use covgate::cli::{run, Setup};
use covgate::config::Config;
use covgate::error::CovError;
use covgate::profile::Mode;
use covgate::runner::cancel_on_ctrl_c;

// ============================================================================
// CLI Structure
// ============================================================================

/// Statement coverage gate for Go.
///
/// Runs `go test` with coverage for every target, merges the profiles into
/// one, and reports top-level declarations that contain code no test ran.
#[derive(Parser, Debug)]
#[command(name = "covgate", version, about = "Statement coverage gate for Go")]
struct Cli {
    /// Package patterns to test (default: ./... unless --load is given).
    targets: Vec<String>,

    /// Aggregation root (default: current directory).
    #[arg(short = 'C', long)]
    root: Option<PathBuf>,

    /// Configuration file (default: covgate.toml in the root, if present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Fail with a non-zero exit when untested code remains.
    #[arg(short, long)]
    enforce: bool,

    /// Print the report even when not failing.
    #[arg(short, long)]
    verbose: bool,

    /// Merged profile destination, relative to the root.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Exclusion rule `marker:<word>`, `name:<regex>` or `path:<glob>`.
    ///
    /// Can be given multiple times; replaces the configured rules.
    #[arg(long = "exclude", value_name = "RULE")]
    exclude: Vec<String>,

    /// Glob of existing raw profiles to merge, relative to the root.
    #[arg(long, value_name = "GLOB")]
    load: Vec<String>,

    /// Coverage mode: set, count or atomic.
    #[arg(long, value_parser = parse_mode)]
    mode: Option<Mode>,

    /// Maximum concurrent test processes.
    #[arg(long, value_parser = parse_workers)]
    workers: Option<usize>,

    /// Per-process time limit in seconds.
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Extra argument for every `go test` invocation (repeatable).
    #[arg(short = 't', long = "test-arg", value_name = "ARG", allow_hyphen_values = true)]
    test_args: Vec<String>,

    /// Count coverage only from each package's own tests.
    #[arg(long)]
    no_coverpkg: bool,

    /// `go` executable (default: looked up on PATH).
    #[arg(long)]
    go: Option<PathBuf>,

    /// Write a JSON summary to stdout instead of the text report.
    #[arg(long)]
    json: bool,

    /// After Ctrl-C, merge and judge whatever coverage was gathered.
    #[arg(long)]
    partial: bool,

    /// Log level for tracing output.
    #[arg(long, value_enum, default_value = "warn")]
    log_level: LogLevel,

    /// Log line format.
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

fn parse_mode(s: &str) -> Result<Mode, String> {
    s.parse()
}

fn parse_workers(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("workers must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(format!("invalid worker count '{}': {}", s, e)),
    }
}

/// Log level for tracing output.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Log line format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

// ============================================================================
// Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.log_level, cli.log_format);

    match execute(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err);
            ExitCode::from(err.error_code().code())
        }
    }
}

/// Initialize tracing subscriber. Logs go to stderr; stdout carries the report.
fn init_tracing(level: LogLevel, format: LogFormat) {
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Merge flags over the configuration file.
fn build_setup(cli: &Cli) -> Result<Setup, CovError> {
    let root = match &cli.root {
        Some(root) => root.clone(),
        None => env::current_dir().map_err(|e| CovError::io(".", e))?,
    };
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_from_root(&root)?,
    };

    if !cli.targets.is_empty() {
        config.targets = cli.targets.clone();
    }
    config.enforce |= cli.enforce;
    config.verbose |= cli.verbose;
    if let Some(output) = &cli.output {
        config.output = output.clone();
    }
    if !cli.exclude.is_empty() {
        config.exclude = cli.exclude.clone();
    }
    if !cli.load.is_empty() {
        config.load = cli.load.clone();
    }
    if let Some(mode) = cli.mode {
        config.mode = mode;
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if let Some(timeout) = cli.timeout {
        config.timeout_secs = timeout;
    }
    config.test_args.extend(cli.test_args.iter().cloned());
    if cli.no_coverpkg {
        config.cross_package = false;
    }

    Ok(Setup {
        root,
        config,
        json: cli.json,
        partial: cli.partial,
        go: cli.go.clone(),
    })
}

fn execute(cli: &Cli) -> Result<(), CovError> {
    let setup = build_setup(cli)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CovError::internal(format!("failed to start runtime: {}", e)))?;

    runtime.block_on(async {
        let cancel = CancellationToken::new();
        let watcher = cancel_on_ctrl_c(cancel.clone());
        let mut stdout = io::stdout().lock();
        let result = run(&setup, &mut stdout, &cancel).await;
        cancel.cancel();
        let _ = watcher.await;
        result.map(|_| ())
    })
}

fn report_error(err: &CovError) {
    if let CovError::TestRunFailed { output, .. } = err {
        if !output.is_empty() {
            eprint!("{}", output);
            if !output.ends_with('\n') {
                eprintln!();
            }
        }
    }
    if err.is_untested_code() {
        eprintln!("{}", err);
    } else {
        eprintln!("Error: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod cli_parsing {
        use super::*;

        #[test]
        fn defaults() {
            let cli = Cli::try_parse_from(["covgate"]).unwrap();
            assert!(cli.targets.is_empty());
            assert!(!cli.enforce);
            assert!(!cli.verbose);
            assert!(cli.mode.is_none());
            assert!(matches!(cli.log_level, LogLevel::Warn));
            assert_eq!(cli.log_format, LogFormat::Text);
        }

        #[test]
        fn short_flags_and_targets() {
            let cli =
                Cli::try_parse_from(["covgate", "-e", "-v", "-o", "out.cov", "./a", "./b"]).unwrap();
            assert!(cli.enforce);
            assert!(cli.verbose);
            assert_eq!(cli.output, Some(PathBuf::from("out.cov")));
            assert_eq!(cli.targets, vec!["./a", "./b"]);
        }

        #[test]
        fn repeated_rules_and_loads() {
            let cli = Cli::try_parse_from([
                "covgate",
                "--exclude",
                "marker:notest",
                "--exclude",
                "name:^Must",
                "--load",
                "a/*.out",
            ])
            .unwrap();
            assert_eq!(cli.exclude, vec!["marker:notest", "name:^Must"]);
            assert_eq!(cli.load, vec!["a/*.out"]);
        }

        #[test]
        fn test_args_accept_leading_hyphens() {
            let cli = Cli::try_parse_from(["covgate", "-t", "-race", "--test-arg", "-count=1"])
                .unwrap();
            assert_eq!(cli.test_args, vec!["-race", "-count=1"]);
        }

        #[test]
        fn mode_is_parsed() {
            let cli = Cli::try_parse_from(["covgate", "--mode", "atomic"]).unwrap();
            assert_eq!(cli.mode, Some(Mode::Atomic));
            assert!(Cli::try_parse_from(["covgate", "--mode", "sometimes"]).is_err());
        }

        #[test]
        fn zero_workers_is_rejected() {
            assert!(Cli::try_parse_from(["covgate", "--workers", "0"]).is_err());
            let cli = Cli::try_parse_from(["covgate", "--workers", "3"]).unwrap();
            assert_eq!(cli.workers, Some(3));
        }

        #[test]
        fn log_options() {
            let cli =
                Cli::try_parse_from(["covgate", "--log-level", "debug", "--log-format", "json"])
                    .unwrap();
            assert!(matches!(cli.log_level, LogLevel::Debug));
            assert_eq!(cli.log_format, LogFormat::Json);
        }
    }

    mod log_level {
        use super::*;

        #[test]
        fn converts_to_tracing_levels() {
            assert_eq!(LogLevel::Trace.to_tracing_level(), tracing::Level::TRACE);
            assert_eq!(LogLevel::Debug.to_tracing_level(), tracing::Level::DEBUG);
            assert_eq!(LogLevel::Info.to_tracing_level(), tracing::Level::INFO);
            assert_eq!(LogLevel::Warn.to_tracing_level(), tracing::Level::WARN);
            assert_eq!(LogLevel::Error.to_tracing_level(), tracing::Level::ERROR);
        }
    }

    mod setup {
        use super::*;
        use std::fs;
        use tempfile::TempDir;

        fn root_with_config(text: &str) -> TempDir {
            let dir = TempDir::new().unwrap();
            fs::write(dir.path().join("covgate.toml"), text).unwrap();
            dir
        }

        #[test]
        fn flags_override_config() {
            let dir = root_with_config(
                "targets = [\"./pkg/...\"]\nmode = \"count\"\ntest_args = [\"-short\"]\nexclude = [\"name:^Must\"]\n",
            );
            let root = dir.path().to_str().unwrap();
            let cli = Cli::try_parse_from([
                "covgate",
                "-C",
                root,
                "--mode",
                "atomic",
                "-t",
                "-race",
                "--exclude",
                "marker:skip",
                "--no-coverpkg",
                "./cmd/...",
            ])
            .unwrap();
            let setup = build_setup(&cli).unwrap();
            assert_eq!(setup.root, dir.path());
            assert_eq!(setup.config.targets, vec!["./cmd/..."]);
            assert_eq!(setup.config.mode, Mode::Atomic);
            assert_eq!(setup.config.test_args, vec!["-short", "-race"]);
            assert_eq!(setup.config.exclude, vec!["marker:skip"]);
            assert!(!setup.config.cross_package);
        }

        #[test]
        fn config_values_survive_without_flags() {
            let dir = root_with_config("enforce = true\ntimeout_secs = 42\n");
            let root = dir.path().to_str().unwrap();
            let cli = Cli::try_parse_from(["covgate", "-C", root]).unwrap();
            let setup = build_setup(&cli).unwrap();
            assert!(setup.config.enforce);
            assert_eq!(setup.config.timeout_secs, 42);
            assert_eq!(setup.config.exclude, vec!["marker:notest"]);
        }

        #[test]
        fn explicit_config_file_must_exist() {
            let dir = TempDir::new().unwrap();
            let missing = dir.path().join("nope.toml");
            let cli = Cli::try_parse_from([
                "covgate",
                "--config",
                missing.to_str().unwrap(),
            ])
            .unwrap();
            let err = build_setup(&cli).unwrap_err();
            assert_eq!(err.error_code().code(), 2);
        }

        #[test]
        fn invalid_config_is_reported() {
            let dir = root_with_config("workers = 0\n");
            let root = dir.path().to_str().unwrap();
            let cli = Cli::try_parse_from(["covgate", "-C", root]).unwrap();
            assert!(matches!(
                build_setup(&cli),
                Err(CovError::InvalidConfig { .. })
            ));
        }
    }
}
