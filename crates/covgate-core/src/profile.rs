//! Coverage profile model and the raw profile parser.
//!
//! A raw profile is the line-oriented text written by `go test -coverprofile`:
//!
//! ```text
//! mode: set
//! example.com/pkg/file.go:3.24,6.5 2 1
//! example.com/pkg/file.go:8.24,11.5 2 0
//! ```
//!
//! The first line declares the counting [`Mode`]. Every following line is one
//! [`CoverageBlock`]: `<file>:<startLine>.<startCol>,<endLine>.<endCol>
//! <numStatements> <hitCount>`. The canonical rendering produced by
//! [`CoverageProfile::render`] uses the same grammar with blocks sorted by
//! file and then start position.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;
use winnow::ascii::{dec_uint, space0, space1};
use winnow::combinator::{preceded, separated_pair};
use winnow::prelude::*;
use winnow::ModalResult;

use crate::error::{CovError, CovResult};

// ============================================================================
// Mode
// ============================================================================

/// Coverage counting mode declared in the profile header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Presence only: a block ran or it did not.
    #[default]
    Set,
    /// Exact execution counts.
    Count,
    /// Exact execution counts gathered with atomic increments.
    Atomic,
}

impl Mode {
    /// The header token for this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Set => "set",
            Mode::Count => "count",
            Mode::Atomic => "atomic",
        }
    }

    /// Normalize a freshly observed hit count.
    ///
    /// In `set` mode any non-zero count collapses to 1.
    pub fn normalize(&self, hits: u64) -> u64 {
        match self {
            Mode::Set => u64::from(hits != 0),
            Mode::Count | Mode::Atomic => hits,
        }
    }

    /// Combine two observations of the same block.
    ///
    /// Commutative and associative for every mode.
    pub fn accumulate(&self, current: u64, incoming: u64) -> u64 {
        match self {
            Mode::Set => u64::from(current != 0 || incoming != 0),
            Mode::Count | Mode::Atomic => current.saturating_add(incoming),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "set" => Ok(Mode::Set),
            "count" => Ok(Mode::Count),
            "atomic" => Ok(Mode::Atomic),
            other => Err(format!(
                "unknown mode '{}', expected one of set, count, atomic",
                other
            )),
        }
    }
}

// ============================================================================
// Positions and Ranges
// ============================================================================

/// A 1-based line and byte column inside a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub col: u32,
}

impl Position {
    pub fn new(line: u32, col: u32) -> Self {
        Position { line, col }
    }
}

/// Statement range of one block, as emitted by the instrumentation.
///
/// Ordered by start position, then end position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockRange {
    pub start: Position,
    pub end: Position,
}

impl BlockRange {
    pub fn new(start: Position, end: Position) -> Self {
        BlockRange { start, end }
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{},{}.{}",
            self.start.line, self.start.col, self.end.line, self.end.col
        )
    }
}

// ============================================================================
// Blocks
// ============================================================================

/// Identity of a block: logical file plus statement range.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockKey {
    pub file: String,
    pub range: BlockRange,
}

/// One instrumented statement range with its execution count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageBlock {
    /// Logical, import-path-qualified source path.
    pub file: String,
    pub range: BlockRange,
    /// Number of statements tracked by this block (at least 1).
    pub num_statements: u32,
    pub hit_count: u64,
}

impl CoverageBlock {
    pub fn new(
        file: impl Into<String>,
        range: BlockRange,
        num_statements: u32,
        hit_count: u64,
    ) -> Self {
        CoverageBlock {
            file: file.into(),
            range,
            num_statements,
            hit_count,
        }
    }

    pub fn key(&self) -> BlockKey {
        BlockKey {
            file: self.file.clone(),
            range: self.range,
        }
    }

    pub fn is_covered(&self) -> bool {
        self.hit_count > 0
    }
}

impl fmt::Display for CoverageBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} {} {}",
            self.file, self.range, self.num_statements, self.hit_count
        )
    }
}

// ============================================================================
// Profile
// ============================================================================

/// The complete coverage picture of one run, or of the merged result.
///
/// Blocks are keyed by [`BlockKey`]; iteration order is the canonical sort
/// order (file, then start position).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageProfile {
    mode: Mode,
    blocks: BTreeMap<BlockKey, CoverageBlock>,
}

impl CoverageProfile {
    /// Create an empty profile.
    pub fn new(mode: Mode) -> Self {
        CoverageProfile {
            mode,
            blocks: BTreeMap::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Blocks in canonical order.
    pub fn blocks(&self) -> impl Iterator<Item = &CoverageBlock> {
        self.blocks.values()
    }

    pub fn get(&self, key: &BlockKey) -> Option<&CoverageBlock> {
        self.blocks.get(key)
    }

    /// Blocks whose hit count is zero, in canonical order.
    pub fn zero_hit_blocks(&self) -> impl Iterator<Item = &CoverageBlock> {
        self.blocks.values().filter(|b| !b.is_covered())
    }

    /// Record one observation of a block.
    ///
    /// A new key is inserted with its hit count normalized for the mode. A
    /// repeated key must agree on the statement count; its hit count is
    /// accumulated.
    pub fn observe(&mut self, block: CoverageBlock, origin: &str) -> CovResult<()> {
        let hits = self.mode.normalize(block.hit_count);
        let key = block.key();
        match self.blocks.get_mut(&key) {
            Some(existing) => {
                if existing.num_statements != block.num_statements {
                    return Err(CovError::StatementCountConflict {
                        file: block.file,
                        range: block.range,
                        existing: existing.num_statements,
                        incoming: block.num_statements,
                        origin: origin.to_string(),
                    });
                }
                existing.hit_count = self.mode.accumulate(existing.hit_count, hits);
            }
            None => {
                self.blocks.insert(
                    key,
                    CoverageBlock {
                        hit_count: hits,
                        ..block
                    },
                );
            }
        }
        Ok(())
    }

    /// Consume the profile, yielding its blocks in canonical order.
    pub fn into_blocks(self) -> impl Iterator<Item = CoverageBlock> {
        self.blocks.into_values()
    }

    pub(crate) fn block_mut(&mut self, key: &BlockKey) -> Option<&mut CoverageBlock> {
        self.blocks.get_mut(key)
    }

    pub(crate) fn insert_unchecked(&mut self, block: CoverageBlock) {
        self.blocks.insert(block.key(), block);
    }

    /// Render the canonical text form: mode header plus sorted records.
    pub fn render(&self) -> String {
        let mut out = format!("mode: {}\n", self.mode);
        for block in self.blocks.values() {
            out.push_str(&block.to_string());
            out.push('\n');
        }
        out
    }
}

// ============================================================================
// Parser
// ============================================================================

const RECORD_LAYOUT: &str =
    "expected <file>:<startLine>.<startCol>,<endLine>.<endCol> <numStatements> <hitCount>";

/// Parse one raw profile.
///
/// `origin` names the input (a file path or test target) in error messages.
/// Input with no non-blank line carries no mode and no blocks, and yields
/// `None`. A header with no data lines yields an empty profile. Blank lines
/// are skipped. Repeated ranges are treated as re-observations of the same
/// counter and accumulated.
pub fn parse_profile(origin: &str, text: &str) -> CovResult<Option<CoverageProfile>> {
    let mut lines = text.lines().enumerate();

    let mode = loop {
        match lines.next() {
            Some((_, line)) if line.trim().is_empty() => continue,
            Some((idx, line)) => break parse_header(origin, idx + 1, line)?,
            None => {
                debug!(origin, "empty profile");
                return Ok(None);
            }
        }
    };

    let mut profile = CoverageProfile::new(mode);
    for (idx, line) in lines {
        let trimmed = line.trim_end();
        if trimmed.trim_start().is_empty() {
            continue;
        }
        let block = parse_record(origin, idx + 1, trimmed)?;
        profile.observe(block, origin)?;
    }

    debug!(origin, mode = %profile.mode(), blocks = profile.len(), "parsed profile");
    Ok(Some(profile))
}

fn parse_header(origin: &str, line_no: usize, line: &str) -> CovResult<Mode> {
    let token = line
        .trim()
        .strip_prefix("mode:")
        .ok_or_else(|| CovError::malformed(origin, line_no, line, "expected 'mode: <token>' header"))?
        .trim();
    Mode::from_str(token).map_err(|reason| CovError::malformed(origin, line_no, line, reason))
}

fn parse_record(origin: &str, line_no: usize, line: &str) -> CovResult<CoverageBlock> {
    let (file, rest) = line
        .rsplit_once(':')
        .filter(|(file, _)| !file.is_empty())
        .ok_or_else(|| CovError::malformed(origin, line_no, line, RECORD_LAYOUT))?;

    let (range, num_statements, hit_count) = record_fields.parse(rest).map_err(|e| {
        CovError::malformed(
            origin,
            line_no,
            line,
            format!("{} (column {})", RECORD_LAYOUT, file.len() + 2 + e.offset()),
        )
    })?;

    if range.start > range.end {
        return Err(CovError::malformed(
            origin,
            line_no,
            line,
            "range start lies after range end",
        ));
    }
    if num_statements == 0 {
        return Err(CovError::malformed(
            origin,
            line_no,
            line,
            "statement count must be at least 1",
        ));
    }

    Ok(CoverageBlock::new(file, range, num_statements, hit_count))
}

/// `<startLine>.<startCol>,<endLine>.<endCol> <numStatements> <hitCount>`
fn record_fields(input: &mut &str) -> ModalResult<(BlockRange, u32, u64)> {
    (
        block_range,
        preceded(space1, dec_uint),
        preceded(space1, dec_uint),
        space0,
    )
        .map(|(range, num_statements, hit_count, _)| (range, num_statements, hit_count))
        .parse_next(input)
}

fn block_range(input: &mut &str) -> ModalResult<BlockRange> {
    separated_pair(position, ',', position)
        .map(|(start, end)| BlockRange::new(start, end))
        .parse_next(input)
}

fn position(input: &mut &str) -> ModalResult<Position> {
    separated_pair(dec_uint, '.', dec_uint)
        .map(|(line, col)| Position::new(line, col))
        .parse_next(input)
}

// ============================================================================
// Tests
// ============================================================================
