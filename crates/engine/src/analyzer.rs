//! The seam between the engine and the external analyzers.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use vigil_diagnostics::{RawCheckDiagnostic, RawLintDiagnostic};

/// Cooperative cancellation flag polled by the engine between analysis
/// slices, and by analyzers that support mid-computation cancellation.
///
/// An analyzer that never polls runs unbounded; there is no preemption.
#[derive(Debug, Clone, Default)]
pub struct CancelProbe {
	flag: Arc<AtomicBool>,
}

impl CancelProbe {
	/// Creates a probe in the not-cancelled state.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Requests cancellation.
	pub fn cancel(&self) {
		self.flag.store(true, Ordering::SeqCst);
	}

	/// Returns true once cancellation has been requested.
	pub fn is_cancelled(&self) -> bool {
		self.flag.load(Ordering::Relaxed)
	}
}

/// Unexpected failure inside one analyzer invocation.
///
/// Recovered locally by the engine: it becomes one synthetic diagnostic, not
/// a worker-fatal error.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct AnalyzerFault {
	/// What went wrong.
	pub message: String,
	/// Optional backtrace or tool-specific detail.
	pub detail: Option<String>,
}

impl AnalyzerFault {
	/// Creates a fault with a bare message.
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			detail: None,
		}
	}
}

/// Result of type-checking one file.
#[derive(Debug, Default)]
pub struct CheckOutput {
	/// Parse-stage diagnostics; droppable via the syntactic-suppression flag.
	pub syntactic: Vec<RawCheckDiagnostic>,
	/// Semantic diagnostics.
	pub semantic: Vec<RawCheckDiagnostic>,
	/// Files this file depends on; changing any of them invalidates this one.
	pub dependencies: Vec<PathBuf>,
}

/// The type-checker black box.
pub trait CheckAnalyzer: Send + Sync {
	/// Checks one file. Implementations may poll `probe` internally.
	fn check(&self, file: &Path, text: &str, probe: &CancelProbe)
	-> Result<CheckOutput, AnalyzerFault>;
}

/// The lint engine black box.
pub trait LintAnalyzer: Send + Sync {
	/// Lints one file. Implementations may poll `probe` internally.
	fn lint(
		&self,
		file: &Path,
		text: &str,
		probe: &CancelProbe,
	) -> Result<Vec<RawLintDiagnostic>, AnalyzerFault>;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn probe_starts_clear_and_latches() {
		let probe = CancelProbe::new();
		assert!(!probe.is_cancelled());
		probe.cancel();
		assert!(probe.is_cancelled());

		let clone = probe.clone();
		assert!(clone.is_cancelled());
	}
}
