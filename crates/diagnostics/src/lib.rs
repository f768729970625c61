//! Normalized diagnostic records and the report-shaping pipeline.
//!
//! Raw diagnostics produced by the pluggable analyzers (a type-checker and
//! optionally a lint engine) are converted into one uniform [`Diagnostic`]
//! shape, filtered against ignore rules and a path allowlist, and packaged
//! into a [`CheckReport`] for delivery to the build pipeline.

#![warn(missing_docs)]

pub mod filter;
pub mod normalize;
pub mod record;
pub mod report;

pub use filter::{DiagnosticFilter, FilterConfig};
pub use normalize::{
	CheckCategory, LintLevel, RawCheckDiagnostic, RawLintDiagnostic, internal_error,
	normalize_check, normalize_lint,
};
pub use record::{Diagnostic, Severity, ToolCode};
pub use report::CheckReport;

/// A convenient type alias for `Result` with `E` = [`enum@Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// A path allowlist pattern failed to compile.
	#[error("invalid path glob: {0}")]
	Glob(#[from] globset::Error),
}
