//! Building the `go test` invocation for one target.
//!
//! Every target runs as:
//!
//! ```text
//! go test -covermode=<mode> -coverprofile=<profile> [-coverpkg=<list>] <test args...> <target>
//! ```
//!
//! ## Template Variables
//!
//! Extra test arguments may reference:
//!
//! - `{root}` - Aggregation root path
//! - `{profile}` - Raw profile path for this target
//! - `{target}` - The package pattern under test
//!
//! Any other `{name}` token is passed through untouched, so Go flags such as
//! `-run '^Test{1,2}$'` keep working.

use std::path::Path;

use thiserror::Error;

use covgate_core::{CovError, Mode};

/// Errors from test command construction.
#[derive(Debug, Error)]
pub enum TestCommandError {
    /// Template variable not provided.
    #[error("template variable '{variable}' not provided")]
    MissingVariable { variable: String },
}

/// Result type for test command operations.
pub type TestCommandResult<T> = Result<T, TestCommandError>;

impl From<TestCommandError> for CovError {
    fn from(err: TestCommandError) -> Self {
        CovError::invalid_argument(err.to_string())
    }
}

/// Template variables for test argument expansion.
#[derive(Debug, Clone, Default)]
pub struct TemplateVars {
    pub root: Option<String>,
    pub profile: Option<String>,
    pub target: Option<String>,
}

impl TemplateVars {
    /// Variables for one target run.
    pub fn for_target(root: &Path, profile: &Path, target: &str) -> Self {
        TemplateVars {
            root: Some(root.display().to_string()),
            profile: Some(profile.display().to_string()),
            target: Some(target.to_string()),
        }
    }
}

/// Expand template variables in every argument.
///
/// # Errors
///
/// Returns `MissingVariable` if a known variable is used but not provided.
pub fn expand_template_vars(
    args: &[String],
    vars: &TemplateVars,
) -> TestCommandResult<Vec<String>> {
    args.iter()
        .map(|arg| expand_single_var(arg, vars))
        .collect()
}

fn expand_single_var(s: &str, vars: &TemplateVars) -> TestCommandResult<String> {
    let mut result = s.to_string();
    for (token, value) in [
        ("{root}", &vars.root),
        ("{profile}", &vars.profile),
        ("{target}", &vars.target),
    ] {
        if result.contains(token) {
            let value = value.as_deref().ok_or_else(|| TestCommandError::MissingVariable {
                variable: token.trim_matches(|c| c == '{' || c == '}').to_string(),
            })?;
            result = result.replace(token, value);
        }
    }
    Ok(result)
}

/// A fully expanded `go test` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoTestCommand {
    /// Arguments after the `go` program itself.
    pub args: Vec<String>,
}

impl GoTestCommand {
    /// Build the invocation for `target`.
    ///
    /// `coverpkg` lists the packages whose statements count, typically every
    /// target, so coverage gained in one package's tests counts for another.
    pub fn build(
        target: &str,
        mode: Mode,
        profile: &Path,
        coverpkg: Option<&[String]>,
        test_args: &[String],
        vars: &TemplateVars,
    ) -> TestCommandResult<Self> {
        let mut args = vec![
            "test".to_string(),
            format!("-covermode={}", mode),
            format!("-coverprofile={}", profile.display()),
        ];
        if let Some(packages) = coverpkg.filter(|p| !p.is_empty()) {
            args.push(format!("-coverpkg={}", packages.join(",")));
        }
        args.extend(expand_template_vars(test_args, vars)?);
        args.push(target.to_string());
        Ok(GoTestCommand { args })
    }

    /// The command line as one string, for logs.
    pub fn display(&self, program: &str) -> String {
        std::iter::once(program)
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
