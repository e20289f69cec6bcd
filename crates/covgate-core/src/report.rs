//! Violation report and enforcement verdict.
//!
//! The text layout is:
//!
//! ```text
//! Untested code:
//! ns/a/a.go:8-11:
//!     func Bar(i int) int {
//!         i++
//!         return i
//!     }
//! ```
//!
//! with each declaration line indented by one tab. Declarations appear once,
//! however many of their blocks were missed, in file-then-line order.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{CovError, CovResult};
use crate::profile::CoverageBlock;
use crate::source::DeclarationSpan;
use crate::text::indent;

/// Header line of a non-empty report.
pub const REPORT_HEADER: &str = "Untested code:";

/// Line printed by a verbose run with nothing to report.
pub const NO_UNTESTED_CODE: &str = "No untested code.";

/// One zero-hit block with its enclosing declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub block: CoverageBlock,
    pub declaration: DeclarationSpan,
}

/// A declaration with all of its zero-hit blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UntestedDeclaration {
    pub declaration: DeclarationSpan,
    pub blocks: Vec<CoverageBlock>,
}

impl UntestedDeclaration {
    /// Statements in this declaration that never ran.
    pub fn missed_statements(&self) -> u64 {
        self.blocks.iter().map(|b| u64::from(b.num_statements)).sum()
    }
}

/// Enforced violations grouped by declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    declarations: Vec<UntestedDeclaration>,
}

impl Report {
    /// Group violations by declaration, ordered by file then position.
    pub fn from_violations(violations: Vec<Violation>) -> Self {
        let mut grouped: BTreeMap<(String, usize), UntestedDeclaration> = BTreeMap::new();
        for Violation { block, declaration } in violations {
            grouped
                .entry((declaration.file.clone(), declaration.start))
                .or_insert_with(|| UntestedDeclaration {
                    declaration,
                    blocks: Vec::new(),
                })
                .blocks
                .push(block);
        }

        let declarations = grouped
            .into_values()
            .map(|mut entry| {
                entry.blocks.sort_by_key(|b| b.range);
                entry.blocks.dedup_by_key(|b| b.range);
                entry
            })
            .collect();
        Report { declarations }
    }

    pub fn declarations(&self) -> &[UntestedDeclaration] {
        &self.declarations
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    /// Total zero-hit blocks across all declarations.
    pub fn block_count(&self) -> usize {
        self.declarations.iter().map(|d| d.blocks.len()).sum()
    }

    /// The report text. An empty report renders as [`NO_UNTESTED_CODE`].
    pub fn render(&self) -> String {
        if self.is_empty() {
            return format!("{}\n", NO_UNTESTED_CODE);
        }
        let mut out = format!("{}\n", REPORT_HEADER);
        for entry in &self.declarations {
            let decl = &entry.declaration;
            out.push_str(&format!(
                "{}:{}-{}:\n",
                decl.file, decl.start_line, decl.end_line
            ));
            out.push_str(&indent(&decl.text, "\t"));
            out.push('\n');
        }
        out
    }

    /// Whether the report should be echoed.
    ///
    /// Verbose runs always print it. Enforcing runs print it when it would
    /// fail the build.
    pub fn should_print(&self, enforce: bool, verbose: bool) -> bool {
        verbose || (enforce && !self.is_empty())
    }

    /// The verdict: `UntestedCode` when enforcing with at least one
    /// declaration in the report.
    pub fn verdict(&self, enforce: bool) -> CovResult<()> {
        if enforce && !self.is_empty() {
            return Err(CovError::UntestedCode {
                declarations: self.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{BlockRange, Position};
    use crate::source::DeclKind;

    fn span(file: &str, name: &str, start: u32, end: u32, text: &str) -> DeclarationSpan {
        DeclarationSpan {
            file: file.to_string(),
            kind: DeclKind::Func,
            name: name.to_string(),
            receiver: None,
            start: start as usize * 100,
            start_line: start,
            end_line: end,
            text: text.to_string(),
            comments: Vec::new(),
        }
    }

    fn block(file: &str, sl: u32, el: u32) -> CoverageBlock {
        CoverageBlock::new(
            file,
            BlockRange::new(Position::new(sl, 2), Position::new(el, 3)),
            2,
            0,
        )
    }

    fn bar() -> DeclarationSpan {
        span(
            "ns/a/a.go",
            "Bar",
            8,
            11,
            "func Bar(i int) int {\n\ti++ // 0\n\treturn i\n}",
        )
    }

    #[test]
    fn renders_one_stanza_per_declaration() {
        let report = Report::from_violations(vec![
            Violation {
                block: block("ns/a/a.go", 9, 9),
                declaration: bar(),
            },
            Violation {
                block: block("ns/a/a.go", 10, 10),
                declaration: bar(),
            },
        ]);
        assert_eq!(report.len(), 1);
        assert_eq!(report.block_count(), 2);
        assert_eq!(report.declarations()[0].missed_statements(), 4);
        assert_eq!(
            report.render(),
            "Untested code:\nns/a/a.go:8-11:\n\tfunc Bar(i int) int {\n\t\ti++ // 0\n\t\treturn i\n\t}\n"
        );
    }

    #[test]
    fn declarations_sorted_by_file_then_line() {
        let report = Report::from_violations(vec![
            Violation {
                block: block("ns/b.go", 3, 3),
                declaration: span("ns/b.go", "Z", 2, 4, "func Z() {}"),
            },
            Violation {
                block: block("ns/a.go", 20, 20),
                declaration: span("ns/a.go", "Y", 19, 21, "func Y() {}"),
            },
            Violation {
                block: block("ns/a.go", 5, 5),
                declaration: span("ns/a.go", "X", 4, 6, "func X() {}"),
            },
        ]);
        let names: Vec<_> = report
            .declarations()
            .iter()
            .map(|d| d.declaration.name.as_str())
            .collect();
        assert_eq!(names, vec!["X", "Y", "Z"]);
    }

    #[test]
    fn declarations_sharing_a_line_stay_apart() {
        let text = "var a = 1; func f() { a++ }";
        let mut var = span("ns/a.go", "a", 3, 3, text);
        var.kind = DeclKind::Var;
        var.start = 40;
        let mut func = span("ns/a.go", "f", 3, 3, text);
        func.start = 51;
        let report = Report::from_violations(vec![
            Violation {
                block: block("ns/a.go", 3, 3),
                declaration: func,
            },
            Violation {
                block: block("ns/a.go", 3, 3),
                declaration: var,
            },
        ]);
        let names: Vec<_> = report
            .declarations()
            .iter()
            .map(|d| d.declaration.name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "f"]);
    }

    #[test]
    fn empty_report_renders_summary() {
        assert_eq!(Report::default().render(), "No untested code.\n");
    }

    mod verdict {
        use super::*;

        fn non_empty() -> Report {
            Report::from_violations(vec![Violation {
                block: block("ns/a/a.go", 9, 9),
                declaration: bar(),
            }])
        }

        #[test]
        fn enforcing_with_violations_fails() {
            let err = non_empty().verdict(true).unwrap_err();
            assert!(err.to_string().contains("Error: untested code"));
        }

        #[test]
        fn not_enforcing_never_fails() {
            assert!(non_empty().verdict(false).is_ok());
            assert!(Report::default().verdict(false).is_ok());
        }

        #[test]
        fn enforcing_without_violations_passes() {
            assert!(Report::default().verdict(true).is_ok());
        }

        #[test]
        fn printing_rules() {
            let report = non_empty();
            assert!(report.should_print(true, false));
            assert!(report.should_print(false, true));
            assert!(!report.should_print(false, false));
            assert!(!Report::default().should_print(true, false));
            assert!(Report::default().should_print(true, true));
        }
    }
}
