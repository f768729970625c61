//! Controller configuration and startup validation.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use vigil_diagnostics::{DiagnosticFilter, FilterConfig};
use vigil_rpc::proto::WorkerConfig;

use crate::{Error, Result};

/// Configuration of one controller and the workers it spawns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
	/// Command used to start a worker process (ignored by in-process
	/// transports).
	#[serde(default)]
	pub worker_command: String,
	/// Arguments for the worker command.
	#[serde(default)]
	pub worker_args: Vec<String>,
	/// Extra environment for worker processes.
	#[serde(default)]
	pub worker_env: HashMap<String, String>,
	/// Number of workers; also the partition division.
	#[serde(default = "default_workers")]
	pub workers: u32,
	/// Project root.
	pub root: PathBuf,
	/// Watched files and directories, relative to `root` unless absolute.
	pub watch: Vec<PathBuf>,
	/// Run the lint engine alongside the type-checker.
	#[serde(default)]
	pub lint: bool,
	/// Opaque lint engine configuration.
	#[serde(default)]
	pub lint_config: Option<JsonValue>,
	/// Opaque type-checker configuration.
	#[serde(default)]
	pub checker_config: Option<JsonValue>,
	/// Per-worker memory ceiling in MiB, enforced by the process host.
	#[serde(default)]
	pub memory_limit_mib: Option<u64>,
	/// Drop parse-stage diagnostics.
	#[serde(default)]
	pub suppress_syntactic: bool,
	/// Reuse incremental analysis state between jobs.
	#[serde(default = "default_incremental")]
	pub incremental: bool,
	/// Report filtering rules.
	#[serde(default)]
	pub filter: FilterConfig,
}

fn default_workers() -> u32 {
	1
}

fn default_incremental() -> bool {
	true
}

impl ControllerConfig {
	/// Validates the configuration, including compiling the filter.
	///
	/// Called once at controller startup; a bad configuration is fatal
	/// before any job is ever dispatched.
	pub fn validate(&self) -> Result<DiagnosticFilter> {
		if self.workers == 0 {
			return Err(Error::Config("worker count must be > 0".into()));
		}
		if self.watch.is_empty() {
			return Err(Error::Config("watch list is empty".into()));
		}
		Ok(DiagnosticFilter::new(&self.filter)?)
	}

	/// Derives the spawn-time configuration of one worker.
	pub fn worker_config(&self, index: u32) -> WorkerConfig {
		WorkerConfig {
			root: self.root.clone(),
			watch: self.watch.clone(),
			partition_index: index,
			partition_division: self.workers,
			lint: self.lint,
			lint_config: self.lint_config.clone(),
			checker_config: self.checker_config.clone(),
			memory_limit_mib: self.memory_limit_mib,
			suppress_syntactic: self.suppress_syntactic,
			incremental: self.incremental,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn base() -> ControllerConfig {
		serde_json::from_value(serde_json::json!({
			"root": "/proj",
			"watch": ["src"],
		}))
		.unwrap()
	}

	#[test]
	fn defaults_are_single_worker_incremental() {
		let config = base();
		assert_eq!(config.workers, 1);
		assert!(config.incremental);
		assert!(config.validate().is_ok());
	}

	#[test]
	fn zero_workers_is_rejected() {
		let mut config = base();
		config.workers = 0;
		assert!(matches!(config.validate(), Err(Error::Config(_))));
	}

	#[test]
	fn empty_watch_is_rejected() {
		let mut config = base();
		config.watch.clear();
		assert!(matches!(config.validate(), Err(Error::Config(_))));
	}

	#[test]
	fn bad_filter_glob_is_rejected_at_startup() {
		let mut config = base();
		config.filter.include_globs = vec!["src/[".into()];
		assert!(matches!(config.validate(), Err(Error::Filter(_))));
	}

	#[test]
	fn worker_configs_partition_the_pool() {
		let mut config = base();
		config.workers = 3;
		for index in 0..3 {
			let wc = config.worker_config(index);
			assert_eq!(wc.partition_index, index);
			assert_eq!(wc.partition_division, 3);
		}
	}
}
