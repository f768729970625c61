//! Method names and payload shapes of the checking protocol.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use vigil_diagnostics::Diagnostic;

use crate::message::AnyResponse;
use crate::token::WireToken;

/// Request: run one checking iteration for the worker's partition.
pub const METHOD_RUN: &str = "check/run";

/// Notification: out-of-band cancellation interrupt for one generation.
pub const METHOD_CANCEL: &str = "check/cancel";

/// Environment variable carrying the serialized [`WorkerConfig`] at spawn.
pub const CONFIG_ENV_VAR: &str = "VIGIL_WORKER_CONFIG";

/// Parameters of [`METHOD_RUN`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RunParams {
	/// Job generation this dispatch belongs to.
	pub generation: u64,
	/// Serialized cancellation token.
	pub token: WireToken,
}

/// Parameters of [`METHOD_CANCEL`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CancelParams {
	/// Generation whose run should stop.
	pub generation: u64,
}

/// Successful payload of [`METHOD_RUN`]: one partition's unfiltered records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
	/// Type-checker records for owned files.
	pub diagnostics: Vec<Diagnostic>,
	/// Lint records for owned files; empty without a lint engine.
	pub lints: Vec<Diagnostic>,
}

/// Outcome of one dispatched run.
#[derive(Debug, Clone)]
pub enum RunOutcome {
	/// The iteration completed with this partition report.
	Done(RunReport),
	/// The worker observed cancellation; no records are trustworthy.
	Cancelled,
}

impl RunOutcome {
	/// Decodes a [`METHOD_RUN`] response; an absent or null payload means the
	/// run was cancelled.
	pub fn from_response(resp: &AnyResponse) -> crate::Result<Self> {
		if let Some(error) = &resp.error {
			return Err(crate::Error::Response(error.clone()));
		}
		match &resp.result {
			None | Some(JsonValue::Null) => Ok(Self::Cancelled),
			Some(result) => Ok(Self::Done(serde_json::from_value(result.clone())?)),
		}
	}

	/// Encodes this outcome as a response payload.
	pub fn into_result_value(self) -> crate::Result<Option<JsonValue>> {
		match self {
			Self::Done(report) => Ok(Some(serde_json::to_value(report)?)),
			Self::Cancelled => Ok(None),
		}
	}
}

/// Static per-worker configuration, serialized once at spawn time.
///
/// No file list is ever re-sent per dispatch; the worker derives its watched
/// set and partition from this struct for its whole lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
	/// Project root the worker resolves relative paths against.
	pub root: PathBuf,
	/// Watched files and directories.
	pub watch: Vec<PathBuf>,
	/// This worker's partition index.
	pub partition_index: u32,
	/// Total number of partitions.
	pub partition_division: u32,
	/// Run the lint engine alongside the type-checker.
	#[serde(default)]
	pub lint: bool,
	/// Opaque lint engine configuration.
	#[serde(default)]
	pub lint_config: Option<JsonValue>,
	/// Opaque type-checker configuration.
	#[serde(default)]
	pub checker_config: Option<JsonValue>,
	/// Memory ceiling in MiB, enforced by the process host.
	#[serde(default)]
	pub memory_limit_mib: Option<u64>,
	/// Drop syntactic (parse-stage) diagnostics.
	#[serde(default)]
	pub suppress_syntactic: bool,
	/// Reuse incremental analysis state between iterations.
	#[serde(default = "default_incremental")]
	pub incremental: bool,
}

fn default_incremental() -> bool {
	true
}

#[cfg(test)]
mod tests {
	use crate::message::RequestId;

	use super::*;

	#[test]
	fn null_and_missing_results_decode_as_cancelled() {
		for result in [None, Some(JsonValue::Null)] {
			let resp = AnyResponse {
				id: RequestId(1),
				result,
				error: None,
			};
			assert!(matches!(
				RunOutcome::from_response(&resp).unwrap(),
				RunOutcome::Cancelled
			));
		}
	}

	#[test]
	fn done_round_trips_through_a_response() {
		let outcome = RunOutcome::Done(RunReport::default());
		let resp = AnyResponse {
			id: RequestId(2),
			result: outcome.into_result_value().unwrap(),
			error: None,
		};
		assert!(matches!(
			RunOutcome::from_response(&resp).unwrap(),
			RunOutcome::Done(_)
		));
	}

	#[test]
	fn worker_config_defaults() {
		let config: WorkerConfig = serde_json::from_value(serde_json::json!({
			"root": "/proj",
			"watch": ["src"],
			"partition_index": 0,
			"partition_division": 1,
		}))
		.unwrap();
		assert!(config.incremental);
		assert!(!config.lint);
		assert!(config.memory_limit_mib.is_none());
	}
}
