//! One covgate invocation, end to end.
//!
//! [`run`] gathers raw profiles (loaded from disk and/or produced by running
//! the configured targets), hands them to the [`Engine`], prints the report
//! or a JSON summary, and applies the verdict. The binary is a thin wrapper
//! that builds a [`Setup`] from flags and configuration.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use covgate_core::exclude::ExclusionPolicy;
use covgate_core::source::{ChainResolver, LocalResolver, ModuleResolver};
use covgate_core::{Config, CovError, CovResult, Engine, EngineOptions, Outcome, RawProfile};

use crate::golist::{expand_patterns, find_go, GoListResolver};
use crate::load::load_profiles;
use crate::runner::{run_targets, RunnerOptions};

/// Everything one invocation needs.
#[derive(Debug, Clone)]
pub struct Setup {
    /// Aggregation root: module directory, working directory of every test
    /// process, and base of relative paths.
    pub root: PathBuf,
    pub config: Config,
    /// Write a JSON summary instead of the text report.
    pub json: bool,
    /// Keep going with partial coverage after a cancelled test run.
    pub partial: bool,
    /// `go` executable; looked up on `PATH` when needed and not given.
    pub go: Option<PathBuf>,
}

impl Setup {
    /// Setup for `root` with its `covgate.toml` (or defaults).
    pub fn for_root(root: impl Into<PathBuf>) -> CovResult<Self> {
        let root = root.into();
        let config = Config::load_from_root(&root)?;
        Ok(Setup {
            root,
            config,
            json: false,
            partial: false,
            go: None,
        })
    }

    fn go(&self) -> CovResult<PathBuf> {
        match &self.go {
            Some(go) => Ok(go.clone()),
            None => find_go(),
        }
    }
}

/// Run one invocation, writing the report (or JSON summary) to `out`.
///
/// # Errors
///
/// Any fatal error from loading, testing, merging or mapping, and
/// `UntestedCode` when enforcement fails. In the last case the report has
/// already been written.
pub async fn run(
    setup: &Setup,
    out: &mut dyn Write,
    cancel: &CancellationToken,
) -> CovResult<Outcome> {
    let config = &setup.config;
    let policy = config.exclusion_policy()?;
    let output = config.output_path(&setup.root);

    let mut raws = load_profiles(&setup.root, &config.load, Some(&output))?;
    let targets = config.effective_targets();
    if !targets.is_empty() {
        raws.extend(test_targets(setup, &targets, cancel).await?);
    }
    info!(inputs = raws.len(), "collected raw profiles");

    let options = EngineOptions {
        enforce: config.enforce,
        verbose: config.verbose,
        output: Some(output),
        default_mode: config.mode,
    };
    let outcome = evaluate(setup.clone(), policy, options, raws).await?;

    if setup.json {
        serde_json::to_writer_pretty(&mut *out, &outcome)
            .map_err(|e| CovError::internal(format!("failed to serialize summary: {}", e)))?;
        writeln!(out).map_err(|e| CovError::io("<stdout>", e))?;
    } else if outcome.report.should_print(config.enforce, config.verbose) {
        out.write_all(outcome.report.render().as_bytes())
            .and_then(|()| out.flush())
            .map_err(|e| CovError::io("<stdout>", e))?;
    }

    outcome.verdict()?;
    Ok(outcome)
}

/// Merge and map on the blocking pool.
///
/// Source lookups read files and may shell out to `go list`, so they must not
/// hold a runtime thread.
async fn evaluate(
    setup: Setup,
    policy: ExclusionPolicy,
    options: EngineOptions,
    raws: Vec<RawProfile>,
) -> CovResult<Outcome> {
    tokio::task::spawn_blocking(move || {
        let resolver = build_resolver(&setup);
        Engine::new(policy, &resolver, options).evaluate(raws)
    })
    .await
    .map_err(|e| CovError::internal(format!("evaluation task failed: {}", e)))?
}

async fn test_targets(
    setup: &Setup,
    targets: &[String],
    cancel: &CancellationToken,
) -> CovResult<Vec<RawProfile>> {
    let config = &setup.config;
    let go = setup.go()?;
    let packages = expand_patterns(&go, &setup.root, targets).await?;
    debug!(packages = ?packages, "test targets");

    let options = RunnerOptions {
        go,
        root: setup.root.clone(),
        mode: config.mode,
        workers: config.workers,
        timeout: Duration::from_secs(config.timeout_secs),
        test_args: config.test_args.clone(),
        coverpkg: config.cross_package.then(|| packages.clone()),
        partial: setup.partial,
    };
    run_targets(&options, &packages, cancel).await
}

/// Module layout first, then plain paths, then the toolchain.
fn build_resolver(setup: &Setup) -> ChainResolver {
    let mut chain = ChainResolver::new();
    if setup.root.join("go.mod").is_file() {
        match ModuleResolver::discover(&setup.root) {
            Ok(module) => {
                debug!(module = module.module(), "resolving module files");
                chain = chain.push(module);
            }
            Err(e) => warn!("ignoring go.mod: {}", e),
        }
    }
    chain = chain.push(LocalResolver::new(&setup.root));
    if let Ok(go) = setup.go() {
        chain = chain.push(GoListResolver::new(go, &setup.root));
    }
    chain
}
