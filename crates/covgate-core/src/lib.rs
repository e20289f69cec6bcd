//! Core engine for covgate.
//!
//! This crate turns raw Go coverage profiles into a verdict:
//! - Profile parsing and canonical rendering
//! - Order-independent merging with conflict detection
//! - Mapping zero-hit blocks to their enclosing top-level declarations
//! - Declaration-level exclusion rules
//! - Violation reports and the enforcement verdict
//! - Atomic persistence of the merged profile
//! - Configuration and error types
//!
//! Nothing here spawns processes; raw profile text is plain input.

pub mod config;
pub mod engine;
pub mod error;
pub mod exclude;
pub mod merge;
pub mod persist;
pub mod profile;
pub mod report;
pub mod source;
pub mod text;

pub use config::Config;
pub use engine::{Engine, EngineOptions, Outcome, RawProfile};
pub use error::{CovError, CovResult, OutputErrorCode, UNTESTED_CODE_PREFIX};
pub use exclude::{ExclusionPolicy, ExclusionRule};
pub use merge::{merge_profiles, ProfileMerger};
pub use profile::{parse_profile, BlockKey, BlockRange, CoverageBlock, CoverageProfile, Mode, Position};
pub use report::{Report, UntestedDeclaration, Violation};
pub use source::{DeclarationSpan, PathResolver, SourceMapper};
