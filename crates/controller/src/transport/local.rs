//! In-process transport running worker service loops as tasks.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::BufReader;
use tokio::task::JoinHandle;

use vigil_engine::{CheckAnalyzer, CheckEngine, LintAnalyzer};
use vigil_rpc::Endpoint;
use vigil_rpc::proto::WorkerConfig;

use super::{WorkerHandle, WorkerTransport};
use crate::Result;

/// Builds one engine per spawned worker from its spawn-time configuration.
pub type EngineFactory =
	dyn Fn(&WorkerConfig) -> vigil_worker::Result<CheckEngine> + Send + Sync;

/// Service task plus the controller-side pump for one local worker.
struct LocalWorker {
	service: JoinHandle<()>,
	pump: JoinHandle<()>,
}

impl LocalWorker {
	/// Severs the worker like a process kill: in-flight dispatches observe
	/// a dead channel, not a response.
	fn kill(self) {
		self.service.abort();
		self.pump.abort();
	}
}

/// Runs worker service loops in-process over duplex pipes.
///
/// Gives embedders a single-process deployment without changing any
/// controller logic, and gives tests real worker semantics without child
/// processes. Killing a local worker severs both ends of its channel, which
/// the controller observes exactly like a crashed process.
pub struct LocalTransport {
	factory: Box<EngineFactory>,
	workers: Mutex<HashMap<u32, LocalWorker>>,
}

impl LocalTransport {
	/// Creates a transport from an engine factory.
	pub fn new(
		factory: impl Fn(&WorkerConfig) -> vigil_worker::Result<CheckEngine> + Send + Sync + 'static,
	) -> Arc<Self> {
		Arc::new(Self {
			factory: Box::new(factory),
			workers: Mutex::new(HashMap::new()),
		})
	}

	/// Creates a transport wiring fixed analyzers into every worker.
	pub fn with_analyzers(
		checker: Arc<dyn CheckAnalyzer>,
		linter: Option<Arc<dyn LintAnalyzer>>,
	) -> Arc<Self> {
		Self::new(move |config| {
			vigil_worker::build_engine(config, Arc::clone(&checker), linter.clone())
		})
	}

	/// Kills every worker, simulating the process host killing the pool
	/// (for example for exceeding the memory ceiling).
	pub fn kill_all(&self) {
		for (index, worker) in self.workers.lock().drain() {
			tracing::debug!(index, "local_worker.killed");
			worker.kill();
		}
	}
}

#[async_trait]
impl WorkerTransport for LocalTransport {
	async fn spawn(&self, index: u32, config: &WorkerConfig) -> Result<WorkerHandle> {
		let engine = (self.factory)(config)?;

		let (controller_side, worker_side) = tokio::io::duplex(256 * 1024);
		let (worker_read, worker_write) = tokio::io::split(worker_side);
		let service = tokio::spawn(vigil_worker::serve(
			engine,
			BufReader::new(worker_read),
			worker_write,
		));

		let (controller_read, controller_write) = tokio::io::split(controller_side);
		let (endpoint, _incoming, pump) =
			Endpoint::new(BufReader::new(controller_read), controller_write);
		self.workers.lock().insert(index, LocalWorker { service, pump });
		Ok(WorkerHandle::new(index, endpoint))
	}

	async fn stop(&self, index: u32) {
		if let Some(worker) = self.workers.lock().remove(&index) {
			worker.kill();
		}
	}
}
