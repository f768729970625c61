//! Controller side of the checking system.
//!
//! The [`Controller`] owns the job lifecycle: it spawns a pool of worker
//! processes through a [`transport::WorkerTransport`], keeps at most one
//! checking job in flight, supersedes a stale job when a new start event
//! arrives (last token wins, stale results are discarded silently), and
//! delivers filtered reports to a [`ReportSink`].

pub mod config;
pub mod controller;
pub mod events;
pub mod pool;
pub mod transport;

pub use config::ControllerConfig;
pub use controller::{Controller, JobEnd};
pub use events::{ChannelSink, ControlEvent, ReportSink, SinkEvent};
pub use pool::{PoolError, PoolOutcome, WorkerPool};
pub use transport::{LocalTransport, ProcessTransport, WorkerHandle, WorkerTransport};

/// A convenient type alias for `Result` with `E` = [`enum@Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// Invalid controller configuration, rejected before any dispatch.
	#[error("configuration error: {0}")]
	Config(String),
	/// The diagnostic filter failed to compile.
	#[error(transparent)]
	Filter(#[from] vigil_diagnostics::Error),
	/// A worker process or task could not be spawned.
	#[error("failed to spawn worker `{command}`: {reason}")]
	Spawn {
		/// The worker command or label.
		command: String,
		/// Why the spawn failed.
		reason: String,
	},
	/// The spawn-time worker configuration was rejected.
	#[error(transparent)]
	Worker(#[from] vigil_worker::Error),
	/// The pool reported a fatal condition (worker crash or memory ceiling).
	#[error(transparent)]
	Pool(#[from] pool::PoolError),
	/// The job was cancelled or superseded before producing a report.
	#[error("job cancelled")]
	Cancelled,
	/// A controller-internal task failed.
	#[error("internal: {0}")]
	Internal(String),
}
