//! Configuration handling for covgate
//!
//! Settings come from `covgate.toml` in the aggregation root when present.
//! Every field has a default, and command-line flags override the file.
//!
//! ```toml
//! targets = ["./..."]
//! enforce = true
//! exclude = ["marker:notest", "path:**/mock_*.go"]
//! mode = "atomic"
//! timeout_secs = 300
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CovError, CovResult};
use crate::exclude::{ExclusionPolicy, DEFAULT_MARKER};
use crate::profile::Mode;

/// Name of the configuration file looked up in the aggregation root.
pub const CONFIG_FILE: &str = "covgate.toml";

/// Default merged-profile file name.
pub const DEFAULT_OUTPUT: &str = "coverage.out";

/// Covgate configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Package patterns to test
    #[serde(default)]
    pub targets: Vec<String>,

    /// Fail when untested code remains
    #[serde(default)]
    pub enforce: bool,

    /// Print the report even when not failing
    #[serde(default)]
    pub verbose: bool,

    /// Merged profile destination, relative to the root
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// Exclusion rules
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,

    /// Coverage mode passed to `go test -covermode`
    #[serde(default)]
    pub mode: Mode,

    /// Concurrent test processes
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Per-process time limit in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Globs of already-produced raw profiles to merge
    #[serde(default)]
    pub load: Vec<String>,

    /// Extra arguments for every `go test` invocation
    #[serde(default)]
    pub test_args: Vec<String>,

    /// Pass `-coverpkg` so coverage from any package counts
    #[serde(default = "default_cross_package")]
    pub cross_package: bool,
}

fn default_output() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT)
}

fn default_exclude() -> Vec<String> {
    vec![format!("marker:{}", DEFAULT_MARKER)]
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_cross_package() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            enforce: false,
            verbose: false,
            output: default_output(),
            exclude: default_exclude(),
            mode: Mode::default(),
            workers: default_workers(),
            timeout_secs: default_timeout_secs(),
            load: Vec::new(),
            test_args: Vec::new(),
            cross_package: default_cross_package(),
        }
    }
}

impl Config {
    /// Parse configuration text; `path` is only used in errors.
    pub fn parse(path: &Path, content: &str) -> CovResult<Self> {
        let config: Config = toml::from_str(content).map_err(|e| CovError::InvalidConfig {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        if config.workers == 0 {
            return Err(CovError::InvalidConfig {
                path: path.to_path_buf(),
                message: "workers must be at least 1".to_string(),
            });
        }
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> CovResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| CovError::InvalidConfig {
            path: path.to_path_buf(),
            message: format!("failed to read config file: {}", e),
        })?;
        Self::parse(path, &content)
    }

    /// Load `covgate.toml` from `root`, or defaults when it does not exist.
    pub fn load_from_root(root: &Path) -> CovResult<Self> {
        let path = root.join(CONFIG_FILE);
        if path.is_file() {
            debug!(path = %path.display(), "loading config");
            Self::load(&path)
        } else {
            Ok(Config::default())
        }
    }

    /// Targets to test: the configured ones, or `./...` when neither targets
    /// nor profiles to load were given.
    pub fn effective_targets(&self) -> Vec<String> {
        if self.targets.is_empty() && self.load.is_empty() {
            vec!["./...".to_string()]
        } else {
            self.targets.clone()
        }
    }

    /// Absolute output path under `root`.
    pub fn output_path(&self, root: &Path) -> PathBuf {
        root.join(&self.output)
    }

    /// Build the exclusion policy from the configured rules.
    pub fn exclusion_policy(&self) -> CovResult<ExclusionPolicy> {
        ExclusionPolicy::from_patterns(&self.exclude)
    }
}
