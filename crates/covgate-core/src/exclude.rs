//! Exclusion policy: which untested declarations are allowed to stay untested.
//!
//! ## Rule Grammar
//!
//! ```text
//! <rule>   := <kind> ":" <value>
//! <kind>   := "marker" | "name" | "path"
//! <value>  := '"' ... '"' | "'" ... "'" | <rest of input>
//! ```
//!
//! - `marker:notest` excludes a declaration carrying a comment that contains
//!   `notest` as a whole word, either inside the declaration or in the doc
//!   comment group directly above it
//! - `name:^Test` matches a regex against the declaration name, and against
//!   `Receiver.Name` for methods
//! - `path:**/gen/*.go` matches a glob against the logical file path
//!
//! Rules apply to whole declarations. Every zero-hit block of an excluded
//! declaration is excluded together.

use std::collections::HashMap;
use std::fmt;

use globset::{Glob, GlobMatcher};
use regex::Regex;
use tracing::debug;
use winnow::combinator::{alt, delimited};
use winnow::prelude::*;
use winnow::token::{rest, take_till, take_while};
use winnow::ModalResult;

use crate::error::{CovError, CovResult};
use crate::report::Violation;
use crate::source::DeclarationSpan;

/// Marker honored when no rules are configured.
pub const DEFAULT_MARKER: &str = "notest";

/// One exclusion rule.
#[derive(Debug, Clone)]
pub enum ExclusionRule {
    /// In-source comment marker.
    Marker(String),
    /// Declaration name pattern.
    Name(Regex),
    /// Logical file path glob.
    Path(GlobMatcher),
}

impl ExclusionRule {
    /// Parse a rule from its textual form.
    pub fn parse(input: &str) -> CovResult<Self> {
        let trimmed = input.trim();
        let (kind, value) = rule_parts
            .parse(trimmed)
            .map_err(|_| invalid(input, "expected <kind>:<value>"))?;
        if value.is_empty() {
            return Err(invalid(input, "empty value"));
        }

        match kind {
            "marker" => {
                if value.chars().any(char::is_whitespace) {
                    return Err(invalid(input, "marker must be a single word"));
                }
                Ok(ExclusionRule::Marker(value))
            }
            "name" => Regex::new(&value)
                .map(ExclusionRule::Name)
                .map_err(|e| invalid(input, e.to_string())),
            "path" => Glob::new(&value)
                .map(|g| ExclusionRule::Path(g.compile_matcher()))
                .map_err(|e| invalid(input, e.to_string())),
            other => Err(invalid(
                input,
                format!("unknown rule kind '{}', expected marker, name or path", other),
            )),
        }
    }

    /// Whether this rule matches the declaration.
    pub fn matches(&self, decl: &DeclarationSpan) -> bool {
        match self {
            ExclusionRule::Marker(token) => {
                decl.comments.iter().any(|c| contains_word(c, token))
            }
            ExclusionRule::Name(re) => {
                re.is_match(&decl.name)
                    || re.is_match(&decl.qualified_name())
                    || decl.name.split(", ").any(|n| re.is_match(n))
            }
            ExclusionRule::Path(glob) => glob.is_match(&decl.file),
        }
    }
}

impl fmt::Display for ExclusionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionRule::Marker(token) => write!(f, "marker:{}", token),
            ExclusionRule::Name(re) => write!(f, "name:{}", re.as_str()),
            ExclusionRule::Path(glob) => write!(f, "path:{}", glob.glob()),
        }
    }
}

fn invalid(rule: &str, message: impl Into<String>) -> CovError {
    CovError::InvalidRule {
        rule: rule.to_string(),
        message: message.into(),
    }
}

fn rule_parts<'i>(input: &mut &'i str) -> ModalResult<(&'i str, String)> {
    (
        take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
        ':',
        alt((
            delimited('"', take_till(0.., |c| c == '"'), '"'),
            delimited('\'', take_till(0.., |c| c == '\''), '\''),
            rest,
        )),
    )
        .map(|(kind, _, value)| (kind, String::from(value)))
        .parse_next(input)
}

/// `word` occurs in `text` delimited by non-identifier characters.
fn contains_word(text: &str, word: &str) -> bool {
    let is_ident = |c: char| c.is_alphanumeric() || c == '_';
    text.match_indices(word).any(|(at, _)| {
        let before = text[..at].chars().next_back();
        let after = text[at + word.len()..].chars().next();
        !before.is_some_and(is_ident) && !after.is_some_and(is_ident)
    })
}

// ============================================================================
// Policy
// ============================================================================

/// Zero-hit blocks split by the policy.
#[derive(Debug, Default)]
pub struct Partition {
    pub excluded: Vec<Violation>,
    pub enforced: Vec<Violation>,
}

/// An explicit set of exclusion rules.
#[derive(Debug, Clone, Default)]
pub struct ExclusionPolicy {
    rules: Vec<ExclusionRule>,
}

impl ExclusionPolicy {
    pub fn new(rules: Vec<ExclusionRule>) -> Self {
        ExclusionPolicy { rules }
    }

    /// Parse every pattern; the first invalid one fails.
    pub fn from_patterns<I, S>(patterns: I) -> CovResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = patterns
            .into_iter()
            .map(|p| ExclusionRule::parse(p.as_ref()))
            .collect::<CovResult<Vec<_>>>()?;
        Ok(ExclusionPolicy::new(rules))
    }

    /// The `marker:notest` policy.
    pub fn default_marker() -> Self {
        ExclusionPolicy::new(vec![ExclusionRule::Marker(DEFAULT_MARKER.to_string())])
    }

    pub fn rules(&self) -> &[ExclusionRule] {
        &self.rules
    }

    /// The first rule matching the declaration, if any.
    pub fn matching_rule(&self, decl: &DeclarationSpan) -> Option<&ExclusionRule> {
        self.rules.iter().find(|rule| rule.matches(decl))
    }

    pub fn is_excluded(&self, decl: &DeclarationSpan) -> bool {
        self.matching_rule(decl).is_some()
    }

    /// Whether a path rule excludes every declaration in `file`.
    ///
    /// Decided from the logical file name alone, so the source need not be
    /// resolvable.
    pub fn excludes_file(&self, file: &str) -> bool {
        self.rules
            .iter()
            .any(|rule| matches!(rule, ExclusionRule::Path(glob) if glob.is_match(file)))
    }

    /// Split violations into excluded and enforced.
    ///
    /// The decision is made once per declaration and applied to all of its
    /// blocks.
    pub fn partition(&self, violations: Vec<Violation>) -> Partition {
        let mut decisions: HashMap<(String, usize), bool> = HashMap::new();
        let mut partition = Partition::default();
        for violation in violations {
            let decl = &violation.declaration;
            let excluded = *decisions
                .entry((decl.file.clone(), decl.start))
                .or_insert_with(|| match self.matching_rule(decl) {
                    Some(rule) => {
                        debug!(
                            file = %decl.file,
                            declaration = %decl.qualified_name(),
                            rule = %rule,
                            "excluded"
                        );
                        true
                    }
                    None => false,
                });
            if excluded {
                partition.excluded.push(violation);
            } else {
                partition.enforced.push(violation);
            }
        }
        partition
    }
}
