//! The aggregation and enforcement pipeline.
//!
//! ```text
//! raw profiles ─► parse ─► merge ─► persist ─► map zero-hit blocks ─► exclude ─► report ─► verdict
//! ```
//!
//! The engine accepts raw profile text however it was produced, so it runs
//! against fixture data without spawning any process. Every input is parsed
//! and merged before anything is written: a fatal input error leaves the
//! output location untouched. Zero-hit blocks in files matched by a `path:`
//! rule are excluded before mapping, so their source is never read.

use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{CovError, CovResult};
use crate::exclude::ExclusionPolicy;
use crate::merge::ProfileMerger;
use crate::persist::write_profile;
use crate::profile::{parse_profile, CoverageProfile, Mode};
use crate::report::{Report, Violation};
use crate::source::{PathResolver, SourceMapper};

/// Raw profile text plus a label naming where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawProfile {
    /// Test target or file path, used in error messages.
    pub origin: String,
    pub text: String,
}

impl RawProfile {
    pub fn new(origin: impl Into<String>, text: impl Into<String>) -> Self {
        RawProfile {
            origin: origin.into(),
            text: text.into(),
        }
    }
}

/// Per-invocation settings.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Fail with `UntestedCode` when enforced violations remain.
    pub enforce: bool,
    /// Print the report even when not failing.
    pub verbose: bool,
    /// Where to persist the canonical profile; `None` skips persisting.
    pub output: Option<PathBuf>,
    /// Mode of the canonical profile when there are no inputs.
    pub default_mode: Mode,
}

/// Result of one evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub output: Option<PathBuf>,
    pub mode: Mode,
    pub inputs: usize,
    pub blocks: usize,
    pub zero_hit_blocks: usize,
    pub excluded_blocks: usize,
    pub enforce: bool,
    pub report: Report,
    #[serde(skip)]
    pub profile: CoverageProfile,
}

impl Outcome {
    /// `UntestedCode` when enforcing with a non-empty report.
    pub fn verdict(&self) -> CovResult<()> {
        self.report.verdict(self.enforce)
    }

    pub fn passed(&self) -> bool {
        self.verdict().is_ok()
    }
}

/// Parses, merges, persists, maps and judges coverage.
pub struct Engine<'r> {
    policy: ExclusionPolicy,
    resolver: &'r dyn PathResolver,
    options: EngineOptions,
}

impl<'r> Engine<'r> {
    pub fn new(
        policy: ExclusionPolicy,
        resolver: &'r dyn PathResolver,
        options: EngineOptions,
    ) -> Self {
        Engine {
            policy,
            resolver,
            options,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Run the pipeline up to the report; the verdict is left to the caller.
    pub fn evaluate<I>(&self, raws: I) -> CovResult<Outcome>
    where
        I: IntoIterator<Item = RawProfile>,
    {
        let mut merger = ProfileMerger::new();
        for raw in raws {
            if let Some(profile) = parse_profile(&raw.origin, &raw.text)? {
                merger.fold(&raw.origin, profile)?;
            }
        }
        let inputs = merger.inputs();
        let profile = merger.finish(self.options.default_mode);
        info!(inputs, blocks = profile.len(), mode = %profile.mode(), "merged profiles");

        if let Some(path) = &self.options.output {
            write_profile(path, &profile)?;
        }

        let (skipped, mapped): (Vec<_>, Vec<_>) = profile
            .zero_hit_blocks()
            .partition(|block| self.policy.excludes_file(&block.file));
        for block in &skipped {
            debug!(file = %block.file, range = %block.range, "excluded by path");
        }

        let mut mapper = SourceMapper::new(self.resolver);
        let violations = mapped
            .into_iter()
            .map(|block| {
                let declaration = mapper.find_enclosing(&block.file, &block.range)?;
                debug!(
                    file = %block.file,
                    range = %block.range,
                    declaration = %declaration.qualified_name(),
                    "zero-hit block"
                );
                Ok(Violation {
                    block: block.clone(),
                    declaration,
                })
            })
            .collect::<CovResult<Vec<_>>>()?;
        let zero_hit_blocks = skipped.len() + violations.len();

        let partition = self.policy.partition(violations);
        let excluded_blocks = skipped.len() + partition.excluded.len();
        let report = Report::from_violations(partition.enforced);
        info!(
            zero_hit_blocks,
            excluded_blocks,
            declarations = report.len(),
            files = mapper.cached_files(),
            "mapped untested code"
        );

        Ok(Outcome {
            output: self.options.output.clone(),
            mode: profile.mode(),
            inputs,
            blocks: profile.len(),
            zero_hit_blocks,
            excluded_blocks,
            enforce: self.options.enforce,
            report,
            profile,
        })
    }

    /// Print the report to `out` when the options call for it.
    pub fn emit(&self, outcome: &Outcome, out: &mut dyn Write) -> CovResult<()> {
        if outcome
            .report
            .should_print(self.options.enforce, self.options.verbose)
        {
            out.write_all(outcome.report.render().as_bytes())
                .and_then(|()| out.flush())
                .map_err(|e| CovError::io("<stdout>", e))?;
        }
        Ok(())
    }

    /// Evaluate, print, and apply the verdict.
    pub fn run<I>(&self, raws: I, out: &mut dyn Write) -> CovResult<Outcome>
    where
        I: IntoIterator<Item = RawProfile>,
    {
        let outcome = self.evaluate(raws)?;
        self.emit(&outcome, out)?;
        outcome.verdict()?;
        Ok(outcome)
    }
}

impl std::fmt::Debug for Engine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("policy", &self.policy)
            .field("options", &self.options)
            .finish()
    }
}
