//! Final per-job report delivered to the build pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::record::{Diagnostic, Severity};

/// Filtered result of one completed checking job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReport {
	/// Type-checker records, post filtering.
	pub diagnostics: Vec<Diagnostic>,
	/// Lint records, post filtering. Empty when no lint engine is configured.
	pub lints: Vec<Diagnostic>,
	/// Wall-clock time of the job.
	#[serde(rename = "elapsed_ms", with = "duration_ms")]
	pub elapsed: Duration,
}

impl CheckReport {
	/// Number of error-severity records across both channels.
	pub fn error_count(&self) -> usize {
		self.diagnostics
			.iter()
			.chain(&self.lints)
			.filter(|d| d.severity == Severity::Error)
			.count()
	}

	/// Number of warning-severity records across both channels.
	pub fn warning_count(&self) -> usize {
		self.diagnostics
			.iter()
			.chain(&self.lints)
			.filter(|d| d.severity == Severity::Warning)
			.count()
	}

	/// Returns true when no record survived filtering.
	pub fn is_clean(&self) -> bool {
		self.diagnostics.is_empty() && self.lints.is_empty()
	}
}

mod duration_ms {
	use std::time::Duration;

	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_u64(value.as_millis() as u64)
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
		Ok(Duration::from_millis(u64::deserialize(deserializer)?))
	}
}
