//! Transport spawning workers as child processes.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::BufReader;
use tokio::process::{Child, Command};

use vigil_rpc::Endpoint;
use vigil_rpc::proto::{CONFIG_ENV_VAR, WorkerConfig};

use super::{WorkerHandle, WorkerTransport};
use crate::{Error, Result};

/// Spawns worker processes and talks to them over piped stdio.
///
/// The spawn-time configuration is serialized once into the child's
/// environment; nothing about the watched set is ever re-sent per job.
pub struct ProcessTransport {
	command: String,
	args: Vec<String>,
	env: HashMap<String, String>,
	children: Mutex<HashMap<u32, Child>>,
}

impl ProcessTransport {
	/// Creates a transport around a worker command line.
	pub fn new(
		command: impl Into<String>,
		args: Vec<String>,
		env: HashMap<String, String>,
	) -> Result<Self> {
		let command = command.into();
		if command.is_empty() {
			return Err(Error::Config("worker command is empty".into()));
		}
		Ok(Self {
			command,
			args,
			env,
			children: Mutex::new(HashMap::new()),
		})
	}

	/// Number of live child processes.
	pub fn active_count(&self) -> usize {
		self.children.lock().len()
	}
}

#[async_trait]
impl WorkerTransport for ProcessTransport {
	async fn spawn(&self, index: u32, config: &WorkerConfig) -> Result<WorkerHandle> {
		let serialized = serde_json::to_string(config).map_err(|e| Error::Spawn {
			command: self.command.clone(),
			reason: format!("config serialization failed: {e}"),
		})?;

		tracing::info!(
			index,
			command = %self.command,
			partition_division = config.partition_division,
			"worker.spawning"
		);

		let mut cmd = Command::new(&self.command);
		cmd.args(&self.args)
			.env(CONFIG_ENV_VAR, serialized)
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::null())
			.current_dir(&config.root)
			.kill_on_drop(true);
		for (key, value) in &self.env {
			cmd.env(key, value);
		}

		let mut child = cmd.spawn().map_err(|e| Error::Spawn {
			command: self.command.clone(),
			reason: e.to_string(),
		})?;

		let stdin = child.stdin.take().ok_or_else(|| Error::Spawn {
			command: self.command.clone(),
			reason: "failed to capture stdin".into(),
		})?;
		let stdout = child.stdout.take().ok_or_else(|| Error::Spawn {
			command: self.command.clone(),
			reason: "failed to capture stdout".into(),
		})?;

		// The endpoint pump observes the child dying as EOF, which fails any
		// outstanding dispatch with a worker-exit error.
		let (endpoint, _incoming, _pump) = Endpoint::new(BufReader::new(stdout), stdin);
		self.children.lock().insert(index, child);

		Ok(WorkerHandle::new(index, endpoint))
	}

	async fn stop(&self, index: u32) {
		let child = self.children.lock().remove(&index);
		let Some(mut child) = child else {
			return; // idempotent
		};

		// Best-effort kill, then wait a bit.
		let _ = child.start_kill();
		let _ = tokio::time::timeout(Duration::from_secs(2), child.wait()).await;
	}
}
