//! End-to-end tests for the coverage gate.
//!
//! Each test builds a small Go module in a temp dir, writes raw profiles as
//! fixtures, and drives `covgate::cli::run` with `load` globs so no Go
//! toolchain is needed.

use std::fs;
use std::path::Path;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use covgate::cli::{run, Setup};
use covgate::error::{CovError, UNTESTED_CODE_PREFIX};
use covgate::profile::Mode;

// ============================================================================
// Test Infrastructure
// ============================================================================

const A_GO: &str = "package a
\t\t
\t\t\tfunc Foo(i int) int {
\t\t\t\ti++ // 1
\t\t\t\treturn i
\t\t\t}
\t\t\t
\t\t\tfunc Bar(i int) int {
\t\t\t\ti++ // 0
\t\t\t\treturn i
\t\t\t}
\t\t";

const MERGED: &str = "mode: set\nns/a/a.go:3.24,6.5 2 1\nns/a/a.go:8.24,11.5 2 0\n";

const BAR_REPORT: &str = "Untested code:
ns/a/a.go:8-11:
\tfunc Bar(i int) int {
\t\ti++ // 0
\t\treturn i
\t}
";

/// Module `ns` with `a/a.go`, plus raw profiles under `raw/`.
fn module(profiles: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "go.mod", "module ns\n\ngo 1.21\n");
    write(dir.path(), "a/a.go", A_GO);
    for (name, text) in profiles {
        write(dir.path(), &format!("raw/{}", name), text);
    }
    dir
}

fn write(root: &Path, relative: &str, text: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

fn setup(dir: &TempDir, enforce: bool, verbose: bool) -> Setup {
    let mut setup = Setup::for_root(dir.path()).unwrap();
    setup.config.load = vec!["raw/*.out".to_string()];
    setup.config.enforce = enforce;
    setup.config.verbose = verbose;
    setup.go = Some(dir.path().join("no-go-toolchain"));
    setup
}

async fn gate(setup: &Setup) -> (Result<covgate::engine::Outcome, CovError>, String) {
    let mut out = Vec::new();
    let result = run(setup, &mut out, &CancellationToken::new()).await;
    (result, String::from_utf8(out).unwrap())
}

fn read_output(dir: &TempDir) -> String {
    fs::read_to_string(dir.path().join("coverage.out")).unwrap()
}

// ============================================================================
// Enforcement
// ============================================================================

mod enforcement {
    use super::*;

    fn split_profiles() -> TempDir {
        // Foo runs in the first package's tests only.
        module(&[
            (
                "1.out",
                "mode: set\nns/a/a.go:3.24,6.5 2 1\nns/a/a.go:8.24,11.5 2 0\n",
            ),
            (
                "2.out",
                "mode: set\nns/a/a.go:8.24,11.5 2 0\nns/a/a.go:3.24,6.5 2 0\n",
            ),
        ])
    }

    #[tokio::test]
    async fn untested_function_fails_the_gate() {
        let dir = split_profiles();
        let (result, stdout) = gate(&setup(&dir, true, false)).await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains(UNTESTED_CODE_PREFIX));
        assert!(err.is_untested_code());
        assert_eq!(err.error_code().code(), 5);

        assert_eq!(stdout, BAR_REPORT);
        assert_eq!(read_output(&dir), MERGED);
    }

    #[tokio::test]
    async fn same_inputs_pass_without_enforcement() {
        let dir = split_profiles();
        let (result, stdout) = gate(&setup(&dir, false, false)).await;

        let outcome = result.unwrap();
        assert_eq!(outcome.report.len(), 1);
        assert!(stdout.is_empty());
        assert_eq!(read_output(&dir), MERGED);
    }

    #[tokio::test]
    async fn verbose_prints_without_failing() {
        let dir = split_profiles();
        let (result, stdout) = gate(&setup(&dir, false, true)).await;
        assert!(result.is_ok());
        assert_eq!(stdout, BAR_REPORT);
    }

    #[tokio::test]
    async fn fully_covered_module_passes() {
        let dir = module(&[(
            "1.out",
            "mode: set\nns/a/a.go:3.24,6.5 2 1\nns/a/a.go:8.24,11.5 2 3\n",
        )]);
        let (result, stdout) = gate(&setup(&dir, true, true)).await;
        let outcome = result.unwrap();
        assert!(outcome.report.is_empty());
        assert_eq!(stdout, "No untested code.\n");
        assert_eq!(
            read_output(&dir),
            "mode: set\nns/a/a.go:3.24,6.5 2 1\nns/a/a.go:8.24,11.5 2 1\n"
        );
    }
}

// ============================================================================
// Merging
// ============================================================================

mod merging {
    use super::*;

    #[tokio::test]
    async fn count_mode_sums_hits() {
        let dir = module(&[
            ("1.out", "mode: count\nns/a/a.go:3.24,6.5 2 4\n"),
            (
                "2.out",
                "mode: count\nns/a/a.go:3.24,6.5 2 3\nns/a/a.go:8.24,11.5 2 1\n",
            ),
        ]);
        let (result, _) = gate(&setup(&dir, true, false)).await;
        let outcome = result.unwrap();
        assert_eq!(outcome.mode, Mode::Count);
        assert_eq!(
            read_output(&dir),
            "mode: count\nns/a/a.go:3.24,6.5 2 7\nns/a/a.go:8.24,11.5 2 1\n"
        );
    }

    #[tokio::test]
    async fn empty_profile_merges_as_a_no_op() {
        let dir = module(&[("1.out", MERGED), ("2.out", "")]);
        let (result, stdout) = gate(&setup(&dir, false, false)).await;
        let outcome = result.unwrap();
        assert_eq!(outcome.inputs, 1);
        assert_eq!(outcome.mode, Mode::Set);
        assert!(stdout.is_empty());
        assert_eq!(read_output(&dir), MERGED);
    }

    #[tokio::test]
    async fn malformed_header_writes_nothing() {
        let dir = module(&[
            ("1.out", MERGED),
            ("2.out", "mode set\nns/a/a.go:3.24,6.5 2 1\n"),
        ]);
        let (result, stdout) = gate(&setup(&dir, true, false)).await;
        let err = result.unwrap_err();
        assert!(matches!(err, CovError::MalformedProfile { .. }));
        assert_eq!(err.error_code().code(), 3);
        assert!(stdout.is_empty());
        assert!(!dir.path().join("coverage.out").exists());
    }

    #[tokio::test]
    async fn conflicting_statement_counts_are_fatal() {
        let dir = module(&[
            ("1.out", "mode: set\nns/a/a.go:3.24,6.5 2 1\n"),
            ("2.out", "mode: set\nns/a/a.go:3.24,6.5 3 0\n"),
        ]);
        let (result, _) = gate(&setup(&dir, false, false)).await;
        assert!(matches!(
            result.unwrap_err(),
            CovError::StatementCountConflict { .. }
        ));
        assert!(!dir.path().join("coverage.out").exists());
    }

    #[tokio::test]
    async fn mixed_modes_are_fatal() {
        let dir = module(&[
            ("1.out", "mode: set\nns/a/a.go:3.24,6.5 2 1\n"),
            ("2.out", "mode: atomic\nns/a/a.go:3.24,6.5 2 5\n"),
        ]);
        let (result, _) = gate(&setup(&dir, false, false)).await;
        assert!(matches!(result.unwrap_err(), CovError::ModeConflict { .. }));
    }

    #[tokio::test]
    async fn previous_output_is_not_reloaded() {
        let dir = module(&[("1.out", MERGED)]);
        write(dir.path(), "raw/coverage.out", "mode: count\n");
        let mut setup = setup(&dir, false, false);
        setup.config.output = "raw/coverage.out".into();
        let (result, _) = gate(&setup).await;
        assert_eq!(result.unwrap().inputs, 1);
        assert_eq!(
            fs::read_to_string(dir.path().join("raw/coverage.out")).unwrap(),
            MERGED
        );
    }
}

// ============================================================================
// Exclusions
// ============================================================================

mod exclusions {
    use super::*;

    const MARKED_GO: &str = "package b

// Bar is only reachable from main.
// notest
func Bar() {
\tprintln(\"bar\")
}

func Baz() {} // notest
";

    fn marked_module() -> TempDir {
        let dir = module(&[(
            "1.out",
            "mode: set\nns/b/b.go:5.12,7.2 1 0\nns/b/b.go:9.12,9.14 1 0\n",
        )]);
        write(dir.path(), "b/b.go", MARKED_GO);
        dir
    }

    #[tokio::test]
    async fn marker_comments_exclude_declarations() {
        let dir = marked_module();
        let (result, stdout) = gate(&setup(&dir, true, false)).await;
        let outcome = result.unwrap();
        assert_eq!(outcome.zero_hit_blocks, 2);
        assert_eq!(outcome.excluded_blocks, 2);
        assert!(stdout.is_empty());
    }

    #[tokio::test]
    async fn replacing_rules_drops_the_default_marker() {
        let dir = marked_module();
        let mut setup = setup(&dir, true, false);
        setup.config.exclude = vec!["name:^Baz$".to_string()];
        let (result, stdout) = gate(&setup).await;
        assert!(result.unwrap_err().is_untested_code());
        assert!(stdout.contains("ns/b/b.go:5-7:\n\tfunc Bar() {\n"));
        assert!(!stdout.contains("Baz"));
    }

    #[tokio::test]
    async fn path_rules_exclude_whole_files() {
        let dir = marked_module();
        let mut setup = setup(&dir, true, false);
        setup.config.exclude = vec!["path:ns/b/*.go".to_string()];
        let (result, _) = gate(&setup).await;
        assert_eq!(result.unwrap().excluded_blocks, 2);
    }

    #[tokio::test]
    async fn path_rules_cover_files_without_source() {
        let dir = module(&[("1.out", "mode: set\nns/gen/g.go:1.1,2.2 1 0\n")]);
        let mut setup = setup(&dir, true, false);
        setup.config.exclude = vec!["path:ns/gen/*.go".to_string()];
        let (result, stdout) = gate(&setup).await;
        let outcome = result.unwrap();
        assert_eq!(outcome.zero_hit_blocks, 1);
        assert_eq!(outcome.excluded_blocks, 1);
        assert!(outcome.report.is_empty());
        assert!(stdout.is_empty());
    }
}

// ============================================================================
// Source Resolution
// ============================================================================

mod resolution {
    use super::*;

    #[tokio::test]
    async fn missing_source_is_fatal() {
        let dir = module(&[("1.out", "mode: set\nns/gone/g.go:1.1,2.2 1 0\n")]);
        let (result, _) = gate(&setup(&dir, false, false)).await;
        let err = result.unwrap_err();
        assert!(matches!(err, CovError::SourceUnavailable { .. }));
        assert_eq!(err.error_code().code(), 4);
    }

    #[tokio::test]
    async fn stale_profile_is_fatal() {
        let dir = module(&[("1.out", "mode: set\nns/a/a.go:30.1,31.2 1 0\n")]);
        let (result, _) = gate(&setup(&dir, false, false)).await;
        assert!(matches!(
            result.unwrap_err(),
            CovError::NoEnclosingDeclaration { .. }
        ));
    }

    #[tokio::test]
    async fn covered_blocks_need_no_source() {
        let dir = module(&[("1.out", "mode: set\nns/gone/g.go:1.1,2.2 1 1\n")]);
        let (result, _) = gate(&setup(&dir, true, false)).await;
        assert!(result.unwrap().passed());
    }
}
