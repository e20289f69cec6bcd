//! covgate: statement coverage gate for Go codebases
//!
//! Runs `go test` with coverage across many packages, merges the raw
//! profiles into one canonical profile, maps every block that never ran to
//! the top-level declaration containing it, and fails when untested code
//! remains that no exclusion rule covers.

// Engine - re-exported from covgate-core
pub use covgate_core::config;
pub use covgate_core::engine;
pub use covgate_core::error;
pub use covgate_core::exclude;
pub use covgate_core::merge;
pub use covgate_core::persist;
pub use covgate_core::profile;
pub use covgate_core::report;
pub use covgate_core::source;
pub use covgate_core::text;

// Test orchestration
pub mod golist;
pub mod load;
pub mod runner;
pub mod testcmd;

// Front door
pub mod cli;
