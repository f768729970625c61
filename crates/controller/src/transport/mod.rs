//! Worker transports: how the controller reaches its workers.

mod local;
mod process;

use async_trait::async_trait;

pub use local::LocalTransport;
pub use process::ProcessTransport;

use vigil_rpc::proto::{
	CancelParams, METHOD_CANCEL, METHOD_RUN, RunOutcome, RunParams, WorkerConfig,
};
use vigil_rpc::{Endpoint, WireToken};

use crate::Result;
use crate::pool::PoolError;

/// Handle to one live worker.
///
/// Cheap to clone; all clones share the worker's RPC channel.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
	index: u32,
	endpoint: Endpoint,
}

impl WorkerHandle {
	/// Wraps an endpoint as a worker handle.
	#[must_use]
	pub fn new(index: u32, endpoint: Endpoint) -> Self {
		Self { index, endpoint }
	}

	/// This worker's partition index.
	pub const fn index(&self) -> u32 {
		self.index
	}

	/// Dispatches one run and awaits its outcome.
	///
	/// A dead channel maps to [`PoolError::WorkerExited`]: the caller must
	/// see the difference between "worker answered" and "worker is gone".
	pub async fn dispatch(
		&self,
		generation: u64,
		token: WireToken,
	) -> Result<RunOutcome, PoolError> {
		let params = serde_json::to_value(RunParams { generation, token })
			.expect("run params always serialize");
		match self.endpoint.request(METHOD_RUN, params).await {
			Ok(resp) => RunOutcome::from_response(&resp).map_err(|source| PoolError::Protocol {
				index: self.index,
				source,
			}),
			Err(vigil_rpc::Error::ChannelClosed) => {
				Err(PoolError::WorkerExited { index: self.index })
			}
			Err(source) => Err(PoolError::Protocol {
				index: self.index,
				source,
			}),
		}
	}

	/// Sends the out-of-band cancellation interrupt for one generation.
	///
	/// Best effort: a worker that is already gone has nothing to cancel.
	pub fn cancel(&self, generation: u64) {
		let params = serde_json::to_value(CancelParams { generation })
			.expect("cancel params always serialize");
		if self.endpoint.notify(METHOD_CANCEL, params).is_err() {
			tracing::trace!(index = self.index, "worker.cancel_after_exit");
		}
	}
}

/// Adapter between the controller and a concrete worker hosting mechanism.
///
/// Selected once at controller initialization: [`ProcessTransport`] spawns
/// real worker processes, [`LocalTransport`] runs worker service loops
/// in-process for tests and single-process embedding.
#[async_trait]
pub trait WorkerTransport: Send + Sync {
	/// Spawns worker `index` with its static spawn-time configuration.
	async fn spawn(&self, index: u32, config: &WorkerConfig) -> Result<WorkerHandle>;

	/// Stops worker `index`. Idempotent.
	async fn stop(&self, index: u32);
}
