//! Concurrent `go test` execution.
//!
//! Each target runs in its own child process with its own scratch profile.
//! At most `workers` processes run at once. Every process has a time limit,
//! and all of them are killed when the run is cancelled (Ctrl-C) or when one
//! target fails.
//!
//! Results come back in target order regardless of completion order, so the
//! merge sees a deterministic input sequence.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use covgate_core::persist::is_not_found;
use covgate_core::{CovError, CovResult, Mode, RawProfile};

use crate::testcmd::{GoTestCommand, TemplateVars};

/// How test processes are launched.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// The `go` executable.
    pub go: PathBuf,
    /// Working directory of every process.
    pub root: PathBuf,
    pub mode: Mode,
    pub workers: usize,
    /// Per-process time limit.
    pub timeout: Duration,
    /// Extra arguments for every invocation.
    pub test_args: Vec<String>,
    /// Packages passed as `-coverpkg`.
    pub coverpkg: Option<Vec<String>>,
    /// On cancellation, return the profiles gathered so far instead of
    /// failing.
    pub partial: bool,
}

enum TargetStatus {
    Profile(RawProfile),
    NoTests,
    Cancelled,
}

/// Run every target and collect the raw profiles they wrote.
///
/// Targets without test files write no profile and contribute nothing.
///
/// # Errors
///
/// - `TestRunFailed` for the first target whose process exits non-zero
/// - `TestRunTimedOut` when a process exceeds its time limit
/// - `Cancelled` when `cancel` fires and partial results were not requested
pub async fn run_targets(
    options: &RunnerOptions,
    targets: &[String],
    cancel: &CancellationToken,
) -> CovResult<Vec<RawProfile>> {
    let scratch = tempfile::Builder::new()
        .prefix("covgate-")
        .tempdir()
        .map_err(|e| CovError::io(std::env::temp_dir(), e))?;
    let semaphore = Arc::new(Semaphore::new(options.workers.max(1)));
    let stop = cancel.child_token();
    let shared = Arc::new(options.clone());

    let mut tasks = JoinSet::new();
    for (index, target) in targets.iter().enumerate() {
        let profile = scratch.path().join(format!("{}.out", index));
        let target = target.clone();
        let options = Arc::clone(&shared);
        let semaphore = Arc::clone(&semaphore);
        let stop = stop.clone();
        tasks.spawn(async move {
            let result = run_target(&options, &target, &profile, semaphore, &stop).await;
            (index, result)
        });
    }

    let mut profiles = Vec::new();
    let mut failure = None;
    let mut interrupted = false;
    while let Some(joined) = tasks.join_next().await {
        let (index, result) =
            joined.map_err(|e| CovError::internal(format!("test task failed: {}", e)))?;
        match result {
            Ok(TargetStatus::Profile(raw)) => profiles.push((index, raw)),
            Ok(TargetStatus::NoTests) => {}
            Ok(TargetStatus::Cancelled) => interrupted = true,
            Err(err) => {
                if failure.is_none() {
                    stop.cancel();
                    failure = Some(err);
                }
            }
        }
    }

    if let Some(err) = failure {
        return Err(err);
    }
    if interrupted || cancel.is_cancelled() {
        if !options.partial {
            return Err(CovError::Cancelled);
        }
        warn!(
            completed = profiles.len(),
            targets = targets.len(),
            "run cancelled, continuing with partial coverage"
        );
    }

    profiles.sort_by_key(|(index, _)| *index);
    Ok(profiles.into_iter().map(|(_, raw)| raw).collect())
}

async fn run_target(
    options: &RunnerOptions,
    target: &str,
    profile: &Path,
    semaphore: Arc<Semaphore>,
    stop: &CancellationToken,
) -> CovResult<TargetStatus> {
    let _permit = tokio::select! {
        biased;
        () = stop.cancelled() => return Ok(TargetStatus::Cancelled),
        permit = semaphore.acquire_owned() => {
            permit.map_err(|_| CovError::internal("worker pool closed"))?
        }
    };

    let vars = TemplateVars::for_target(&options.root, profile, target);
    let command = GoTestCommand::build(
        target,
        options.mode,
        profile,
        options.coverpkg.as_deref(),
        &options.test_args,
        &vars,
    )?;
    debug!(target, command = %command.display("go"), "starting test process");

    let started = Instant::now();
    let child = Command::new(&options.go)
        .args(&command.args)
        .current_dir(&options.root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| CovError::io(&options.go, e))?;

    let output = tokio::select! {
        biased;
        () = stop.cancelled() => {
            debug!(target, "test process killed");
            return Ok(TargetStatus::Cancelled);
        }
        result = timeout(options.timeout, child.wait_with_output()) => match result {
            Ok(output) => output.map_err(|e| CovError::io(&options.go, e))?,
            Err(_) => {
                warn!(
                    "test process for {} timed out after {:?}",
                    target, options.timeout
                );
                return Err(CovError::TestRunTimedOut {
                    target: target.to_string(),
                    timeout: options.timeout,
                });
            }
        },
    };

    if !output.status.success() {
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        return Err(CovError::TestRunFailed {
            target: target.to_string(),
            exit_code: output.status.code(),
            output: text,
        });
    }

    match tokio::fs::read_to_string(profile).await {
        Ok(text) => {
            info!(
                target,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "test target finished"
            );
            Ok(TargetStatus::Profile(RawProfile::new(target, text)))
        }
        Err(e) if is_not_found(&e) => {
            debug!(target, "no profile written, package has no tests");
            Ok(TargetStatus::NoTests)
        }
        Err(e) => Err(CovError::io(profile, e)),
    }
}

/// Cancel `token` on the first Ctrl-C.
pub fn cancel_on_ctrl_c(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if result.is_ok() {
                    warn!("interrupt received, stopping test processes");
                    token.cancel();
                }
            }
            () = token.cancelled() => {}
        }
    })
}
