//! Fan-out/merge coordination across the worker pool.

use tokio::task::JoinSet;

use vigil_diagnostics::Diagnostic;
use vigil_rpc::WireToken;
use vigil_rpc::proto::{RunOutcome, RunReport};

use crate::transport::WorkerHandle;

/// Fatal pool condition, distinct from analysis results.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PoolError {
	/// A worker process exited mid-job: crash or memory ceiling. Never
	/// retried automatically.
	#[error("worker {index} exited unexpectedly (crash or out of memory)")]
	WorkerExited {
		/// Partition index of the dead worker.
		index: u32,
	},
	/// A worker broke the protocol or replied with an error.
	#[error("worker {index} failed: {source}")]
	Protocol {
		/// Partition index of the failing worker.
		index: u32,
		/// Underlying failure.
		source: vigil_rpc::Error,
	},
	/// A coordinator task failed to join.
	#[error("pool task failed: {0}")]
	Join(String),
}

/// Combined outcome of one fanned-out job.
#[derive(Debug, Clone)]
pub enum PoolOutcome {
	/// All workers completed; records are merged across partitions.
	Done(RunReport),
	/// At least one worker observed cancellation; any-cancels-all.
	Cancelled,
}

/// One logical job fanned out to every live worker.
#[derive(Debug, Clone)]
pub struct WorkerPool {
	workers: Vec<WorkerHandle>,
}

impl WorkerPool {
	/// Wraps a set of live worker handles.
	#[must_use]
	pub fn new(workers: Vec<WorkerHandle>) -> Self {
		Self { workers }
	}

	/// Number of workers.
	pub fn len(&self) -> usize {
		self.workers.len()
	}

	/// Returns true when the pool has no workers.
	pub fn is_empty(&self) -> bool {
		self.workers.is_empty()
	}

	/// Sends the cancellation interrupt for `generation` to every worker.
	pub fn broadcast_cancel(&self, generation: u64) {
		for worker in &self.workers {
			worker.cancel(generation);
		}
	}

	/// Dispatches the job to every worker and merges their replies.
	///
	/// Replies are awaited concurrently and arrive in any order; merging is
	/// plain union since partitions are disjoint by construction. Any
	/// cancelled worker makes the whole job cancelled; any dead worker makes
	/// it fatal.
	pub async fn run(&self, generation: u64, token: WireToken) -> Result<PoolOutcome, PoolError> {
		let mut replies = JoinSet::new();
		for worker in &self.workers {
			let worker = worker.clone();
			replies.spawn(async move { worker.dispatch(generation, token).await });
		}

		let mut merged = RunReport::default();
		let mut cancelled = false;
		while let Some(joined) = replies.join_next().await {
			match joined {
				Ok(Ok(RunOutcome::Done(report))) => {
					merged.diagnostics.extend(report.diagnostics);
					merged.lints.extend(report.lints);
				}
				Ok(Ok(RunOutcome::Cancelled)) => cancelled = true,
				Ok(Err(error)) => return Err(error),
				Err(join_error) => return Err(PoolError::Join(join_error.to_string())),
			}
		}

		if cancelled {
			return Ok(PoolOutcome::Cancelled);
		}
		sort_records(&mut merged.diagnostics);
		sort_records(&mut merged.lints);
		Ok(PoolOutcome::Done(merged))
	}
}

/// Cross-worker merge order is arrival order; re-sort for determinism.
fn sort_records(records: &mut [Diagnostic]) {
	records.sort_by(|a, b| {
		(&a.file, a.line, a.column, &a.message).cmp(&(&b.file, b.line, b.column, &b.message))
	});
}
