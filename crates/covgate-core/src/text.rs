//! Text position utilities for byte offset and line:column conversions.
//!
//! ## Coordinate Conventions
//!
//! - Lines and columns are **1-indexed**, matching the coverage profile format
//! - Columns count **bytes**, as the Go instrumentation does
//! - Byte offsets are **0-indexed**
//! - Line/column values of 0 are treated as 1

// ============================================================================
// Line Index
// ============================================================================

/// Precomputed line starts for fast offset <-> position conversion.
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte offset of the first byte of each line.
    starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    /// Build the index for `content`.
    pub fn new(content: &str) -> Self {
        let starts = std::iter::once(0)
            .chain(
                content
                    .bytes()
                    .enumerate()
                    .filter(|&(_, b)| b == b'\n')
                    .map(|(i, _)| i + 1),
            )
            .collect();
        LineIndex {
            starts,
            len: content.len(),
        }
    }

    /// Convert a byte offset to 1-indexed line and column.
    ///
    /// Offsets past the end are clamped to the end of content.
    pub fn position(&self, offset: usize) -> (u32, u32) {
        let offset = offset.min(self.len);
        let line_idx = match self.starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx - 1,
        };
        let col = offset - self.starts[line_idx] + 1;
        (line_idx as u32 + 1, col as u32)
    }

    /// Convert a 1-indexed line and column to a byte offset.
    ///
    /// A column past the end of its line clamps to the line's newline; a line
    /// past the end of content returns the content length.
    pub fn offset(&self, line: u32, col: u32) -> usize {
        let line = line.max(1) as usize;
        let col = col.max(1) as usize;

        let Some(&start) = self.starts.get(line - 1) else {
            return self.len;
        };
        let line_end = self
            .starts
            .get(line)
            .map(|next| next - 1)
            .unwrap_or(self.len);
        (start + col - 1).min(line_end)
    }

    /// Number of lines (a trailing newline does not open a new line).
    pub fn line_count(&self) -> u32 {
        if self.len == 0 {
            0
        } else if self.starts.last() == Some(&self.len) {
            self.starts.len() as u32 - 1
        } else {
            self.starts.len() as u32
        }
    }

    /// Byte range `[start, end)` of a whole line, excluding its newline.
    pub fn line_span(&self, line: u32) -> Option<(usize, usize)> {
        let idx = (line as usize).checked_sub(1)?;
        let start = *self.starts.get(idx)?;
        if start > self.len || (start == self.len && idx > 0) {
            return None;
        }
        let end = self
            .starts
            .get(idx + 1)
            .map(|next| next - 1)
            .unwrap_or(self.len);
        Some((start, end))
    }
}

// ============================================================================
// Indentation
// ============================================================================

/// Remove the longest whitespace prefix shared by every non-blank line.
///
/// Blank lines do not participate and come out empty.
pub fn dedent(text: &str) -> String {
    let common = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(leading_whitespace)
        .reduce(common_prefix)
        .unwrap_or("");

    text.lines()
        .map(|line| line.strip_prefix(common).unwrap_or_else(|| line.trim_start()))
        .map(|line| if line.trim().is_empty() { "" } else { line })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prefix every line of `text` with `prefix`.
pub fn indent(text: &str, prefix: &str) -> String {
    text.lines()
        .map(|line| format!("{}{}", prefix, line))
        .collect::<Vec<_>>()
        .join("\n")
}

fn leading_whitespace(line: &str) -> &str {
    let trimmed = line.trim_start_matches([' ', '\t']);
    &line[..line.len() - trimmed.len()]
}

fn common_prefix<'a>(a: &'a str, b: &'a str) -> &'a str {
    let len = a
        .bytes()
        .zip(b.bytes())
        .take_while(|(x, y)| x == y)
        .count();
    &a[..len]
}

// ============================================================================
// Tests
// ============================================================================
