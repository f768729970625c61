//! The controller job lifecycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use vigil_diagnostics::{CheckReport, DiagnosticFilter};
use vigil_rpc::{CancelHandle, GenerationClock};

use crate::config::ControllerConfig;
use crate::events::{ControlEvent, ReportSink};
use crate::pool::{PoolError, PoolOutcome, WorkerPool};
use crate::transport::WorkerTransport;
use crate::{Error, Result};

/// What one dispatched job ultimately did.
#[derive(Debug)]
pub enum JobEnd {
	/// The filtered report was delivered to the sink.
	Reported(CheckReport),
	/// The result was stale or cancelled and discarded silently.
	Discarded,
	/// The pool died under this job.
	Failed(PoolError),
}

/// State shared with in-flight job tasks.
struct Shared {
	/// Generation of the one current job; stale responses compare against
	/// this before being allowed any effect.
	current_generation: AtomicU64,
	/// Set on pool-fatal; the next job respawns fresh workers first.
	pool_poisoned: AtomicBool,
	sink: Arc<dyn ReportSink>,
	filter: DiagnosticFilter,
	last_report: Mutex<Option<(u64, CheckReport)>>,
}

/// Owns the worker pool and keeps at most one checking job in flight.
///
/// Lifecycle is explicit: [`Controller::start`] spawns the pool,
/// [`Controller::shutdown`] tears it down. A start event arriving while a
/// job is outstanding cancels the old token and dispatches a fresh
/// generation immediately; whichever responses arrive for superseded
/// generations are discarded without ever reaching the sink.
pub struct Controller {
	config: ControllerConfig,
	transport: Arc<dyn WorkerTransport>,
	clock: GenerationClock,
	shared: Arc<Shared>,
	pool: Option<WorkerPool>,
	current: Option<Arc<CancelHandle>>,
}

impl Controller {
	/// Validates the configuration and spawns the worker pool.
	pub async fn start(
		config: ControllerConfig,
		transport: Arc<dyn WorkerTransport>,
		sink: Arc<dyn ReportSink>,
	) -> Result<Self> {
		let filter = config.validate()?;
		let mut controller = Self {
			shared: Arc::new(Shared {
				current_generation: AtomicU64::new(0),
				pool_poisoned: AtomicBool::new(false),
				sink,
				filter,
				last_report: Mutex::new(None),
			}),
			config,
			transport,
			clock: GenerationClock::new(),
			pool: None,
			current: None,
		};
		controller.spawn_pool().await?;
		Ok(controller)
	}

	/// Consumes control events until `Stop` or the channel closes.
	///
	/// This is the asynchronous watch mode: reports are delivered to the
	/// sink whenever their job resolves, decoupled from the events.
	pub async fn run(&mut self, mut events: mpsc::UnboundedReceiver<ControlEvent>) -> Result<()> {
		while let Some(event) = events.recv().await {
			match event {
				ControlEvent::Start => {
					let _job = self.begin_job().await?;
				}
				ControlEvent::RequestResult => self.emit_last(),
				ControlEvent::Stop => break,
			}
		}
		self.shutdown().await;
		Ok(())
	}

	/// Runs one job synchronously and returns its filtered report.
	///
	/// This is the one-shot build mode; the report is also delivered to the
	/// sink like any other.
	pub async fn run_once(&mut self) -> Result<CheckReport> {
		let job = self.begin_job().await?;
		match job.await.map_err(|e| Error::Internal(e.to_string()))? {
			JobEnd::Reported(report) => Ok(report),
			JobEnd::Discarded => Err(Error::Cancelled),
			JobEnd::Failed(error) => Err(Error::Pool(error)),
		}
	}

	/// Starts a new job generation, superseding any outstanding one.
	///
	/// Returns the job task; watch mode detaches it, sync mode awaits it.
	pub async fn begin_job(&mut self) -> Result<JoinHandle<JobEnd>> {
		// Supersede without waiting: cancel the old token and let its
		// eventual response fail the generation comparison below.
		if let Some(old) = self.current.take()
			&& !old.is_cleaned_up()
		{
			old.request_cancellation();
			if let Some(pool) = &self.pool {
				pool.broadcast_cancel(old.generation());
			}
		}

		if self.shared.pool_poisoned.swap(false, Ordering::AcqRel) {
			self.respawn_pool().await?;
		}
		let pool = self
			.pool
			.clone()
			.ok_or_else(|| Error::Internal("controller has no pool".into()))?;

		let generation = self.clock.next();
		let handle = Arc::new(CancelHandle::new(generation));
		self.shared
			.current_generation
			.store(generation, Ordering::Release);
		self.current = Some(Arc::clone(&handle));
		self.shared.sink.in_progress(generation);
		tracing::info!(generation, workers = pool.len(), "job.dispatched");

		let shared = Arc::clone(&self.shared);
		let started = Instant::now();
		Ok(tokio::spawn(async move {
			let outcome = pool.run(generation, handle.wire()).await;
			let stale = shared.current_generation.load(Ordering::Acquire) != generation;
			// Exactly once per token, on every path.
			handle.cleanup();

			match outcome {
				Ok(PoolOutcome::Done(report)) if !stale => {
					let report = CheckReport {
						diagnostics: shared.filter.apply(&report.diagnostics),
						lints: shared.filter.apply(&report.lints),
						elapsed: started.elapsed(),
					};
					tracing::info!(
						generation,
						diagnostics = report.diagnostics.len(),
						lints = report.lints.len(),
						elapsed_ms = report.elapsed.as_millis() as u64,
						"job.reported"
					);
					*shared.last_report.lock() = Some((generation, report.clone()));
					shared.sink.report(generation, report.clone());
					JobEnd::Reported(report)
				}
				Ok(PoolOutcome::Done(_)) => {
					tracing::debug!(generation, "job.stale_result_discarded");
					JobEnd::Discarded
				}
				Ok(PoolOutcome::Cancelled) => {
					tracing::debug!(generation, "job.cancelled");
					JobEnd::Discarded
				}
				Err(error) => {
					shared.pool_poisoned.store(true, Ordering::Release);
					if stale {
						tracing::warn!(generation, error = %error, "job.pool_fatal_stale");
						JobEnd::Discarded
					} else {
						tracing::error!(generation, error = %error, "job.pool_fatal");
						shared.sink.pool_fatal(generation, &error);
						JobEnd::Failed(error)
					}
				}
			}
		}))
	}

	/// Cancels the current job and stops every worker.
	pub async fn shutdown(&mut self) {
		if let Some(current) = self.current.take() {
			current.request_cancellation();
			if let Some(pool) = &self.pool {
				pool.broadcast_cancel(current.generation());
			}
			current.cleanup();
		}
		// Park the generation so nothing in flight can surface anymore.
		self.shared.current_generation.store(0, Ordering::Release);
		for index in 0..self.config.workers {
			self.transport.stop(index).await;
		}
		self.pool = None;
		tracing::info!("controller.stopped");
	}

	/// Re-emits the most recently delivered report, if any.
	fn emit_last(&self) {
		let last = self.shared.last_report.lock().clone();
		if let Some((generation, report)) = last {
			self.shared.sink.report(generation, report);
		}
	}

	async fn spawn_pool(&mut self) -> Result<()> {
		let mut workers = Vec::with_capacity(self.config.workers as usize);
		for index in 0..self.config.workers {
			let worker_config = self.config.worker_config(index);
			workers.push(self.transport.spawn(index, &worker_config).await?);
		}
		self.pool = Some(WorkerPool::new(workers));
		Ok(())
	}

	async fn respawn_pool(&mut self) -> Result<()> {
		tracing::warn!("controller.respawning_pool");
		for index in 0..self.config.workers {
			self.transport.stop(index).await;
		}
		self.spawn_pool().await
	}
}
