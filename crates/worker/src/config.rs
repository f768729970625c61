//! Spawn-time configuration intake.

use std::path::PathBuf;
use std::sync::Arc;

use vigil_engine::{CheckAnalyzer, CheckEngine, EngineOptions, LintAnalyzer, Partition};
use vigil_rpc::proto::{CONFIG_ENV_VAR, WorkerConfig};

use crate::{Error, Result};

/// Reads the worker configuration serialized into the spawn environment.
pub fn config_from_env() -> Result<WorkerConfig> {
	let raw = std::env::var(CONFIG_ENV_VAR).map_err(|_| Error::MissingConfig)?;
	Ok(serde_json::from_str(&raw)?)
}

/// Builds the checking engine described by a spawn-time configuration.
///
/// The embedder supplies the analyzers; the configuration decides the watch
/// set, partition, and behavior toggles. The linter is dropped when linting
/// is disabled, even if one was supplied.
pub fn build_engine(
	config: &WorkerConfig,
	checker: Arc<dyn CheckAnalyzer>,
	linter: Option<Arc<dyn LintAnalyzer>>,
) -> Result<CheckEngine> {
	if config.partition_division == 0 {
		return Err(Error::Config("partition division must be > 0".into()));
	}
	if config.partition_index >= config.partition_division {
		return Err(Error::Config(format!(
			"partition index {} out of range for division {}",
			config.partition_index, config.partition_division
		)));
	}
	if config.watch.is_empty() {
		return Err(Error::Config("watch list is empty".into()));
	}

	let watch: Vec<PathBuf> = config
		.watch
		.iter()
		.map(|path| {
			if path.is_absolute() {
				path.clone()
			} else {
				config.root.join(path)
			}
		})
		.collect();

	Ok(CheckEngine::new(
		watch,
		Partition::new(config.partition_index, config.partition_division),
		checker,
		if config.lint { linter } else { None },
		EngineOptions {
			suppress_syntactic: config.suppress_syntactic,
			incremental: config.incremental,
		},
	))
}

#[cfg(test)]
mod tests {
	use std::path::Path;

	use vigil_engine::{AnalyzerFault, CancelProbe, CheckOutput};

	use super::*;

	struct NullChecker;

	impl CheckAnalyzer for NullChecker {
		fn check(
			&self,
			_file: &Path,
			_text: &str,
			_probe: &CancelProbe,
		) -> std::result::Result<CheckOutput, AnalyzerFault> {
			Ok(CheckOutput::default())
		}
	}

	fn base_config() -> WorkerConfig {
		serde_json::from_value(serde_json::json!({
			"root": "/proj",
			"watch": ["src"],
			"partition_index": 0,
			"partition_division": 1,
		}))
		.unwrap()
	}

	#[test]
	fn out_of_range_partition_is_rejected() {
		let mut config = base_config();
		config.partition_index = 2;
		config.partition_division = 2;
		assert!(build_engine(&config, Arc::new(NullChecker), None).is_err());
	}

	#[test]
	fn empty_watch_list_is_rejected() {
		let mut config = base_config();
		config.watch.clear();
		assert!(build_engine(&config, Arc::new(NullChecker), None).is_err());
	}

	#[test]
	fn valid_config_builds() {
		assert!(build_engine(&base_config(), Arc::new(NullChecker), None).is_ok());
	}
}
