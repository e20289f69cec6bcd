//! Folding many coverage profiles into one canonical profile.
//!
//! The same package is often exercised by several test binaries, so the
//! inputs may cover overlapping or complementary sets of files. Merging is
//! commutative and associative: any permutation of the same inputs yields
//! the same canonical profile.
//!
//! Each fold is validated before it is applied. A failing input leaves the
//! accumulator untouched, and callers discard it anyway since every merge
//! error is fatal.

use tracing::debug;

use crate::error::{CovError, CovResult};
use crate::profile::{CoverageProfile, Mode};

/// Single-writer accumulator for the canonical profile.
#[derive(Debug, Default)]
pub struct ProfileMerger {
    canonical: Option<CoverageProfile>,
    inputs: usize,
}

impl ProfileMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of profiles folded so far.
    pub fn inputs(&self) -> usize {
        self.inputs
    }

    /// Fold one profile into the canonical profile.
    ///
    /// Fails with `ModeConflict` when the profile's mode differs from the
    /// first profile folded, and with `StatementCountConflict` when a block
    /// key is already known with a different statement count.
    pub fn fold(&mut self, origin: &str, profile: CoverageProfile) -> CovResult<()> {
        self.inputs += 1;

        let canonical = match self.canonical.as_mut() {
            Some(canonical) => canonical,
            None => {
                debug!(origin, mode = %profile.mode(), blocks = profile.len(), "first profile");
                self.canonical = Some(profile);
                return Ok(());
            }
        };

        if canonical.mode() != profile.mode() {
            return Err(CovError::ModeConflict {
                expected: canonical.mode(),
                found: profile.mode(),
                origin: origin.to_string(),
            });
        }

        for block in profile.blocks() {
            if let Some(existing) = canonical.get(&block.key()) {
                if existing.num_statements != block.num_statements {
                    return Err(CovError::StatementCountConflict {
                        file: block.file.clone(),
                        range: block.range,
                        existing: existing.num_statements,
                        incoming: block.num_statements,
                        origin: origin.to_string(),
                    });
                }
            }
        }

        let mode = canonical.mode();
        let mut added = 0usize;
        for block in profile.into_blocks() {
            match canonical.block_mut(&block.key()) {
                Some(existing) => {
                    existing.hit_count = mode.accumulate(existing.hit_count, block.hit_count);
                }
                None => {
                    added += 1;
                    canonical.insert_unchecked(block);
                }
            }
        }
        debug!(origin, added, total = canonical.len(), "folded profile");
        Ok(())
    }

    /// Finish merging.
    ///
    /// With no inputs the result is an empty profile in `default_mode`.
    pub fn finish(self, default_mode: Mode) -> CoverageProfile {
        self.canonical
            .unwrap_or_else(|| CoverageProfile::new(default_mode))
    }
}

/// Merge an ordered sequence of `(origin, profile)` pairs.
pub fn merge_profiles<I, S>(default_mode: Mode, profiles: I) -> CovResult<CoverageProfile>
where
    I: IntoIterator<Item = (S, CoverageProfile)>,
    S: AsRef<str>,
{
    let mut merger = ProfileMerger::new();
    for (origin, profile) in profiles {
        merger.fold(origin.as_ref(), profile)?;
    }
    Ok(merger.finish(default_mode))
}
