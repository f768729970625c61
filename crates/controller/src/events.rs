//! Event interfaces between the controller and its host pipeline.

use tokio::sync::mpsc;

use vigil_diagnostics::CheckReport;

use crate::pool::PoolError;

/// Control events the host pipeline feeds into [`crate::Controller::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
	/// A new generation of source exists; start (and supersede) checking.
	Start,
	/// Tear the controller down.
	Stop,
	/// Re-emit the most recently delivered report, if any.
	RequestResult,
}

/// Receiver of job results, decoupled from the triggering events.
pub trait ReportSink: Send + Sync {
	/// A job for `generation` is outstanding.
	fn in_progress(&self, generation: u64) {
		let _ = generation;
	}

	/// A job completed with this filtered report.
	fn report(&self, generation: u64, report: CheckReport);

	/// A worker died mid-job (crash or memory ceiling); no report follows
	/// for this generation.
	fn pool_fatal(&self, generation: u64, error: &PoolError);
}

/// Sink event as carried by [`ChannelSink`].
#[derive(Debug, Clone)]
pub enum SinkEvent {
	/// A job is outstanding.
	InProgress {
		/// Job generation.
		generation: u64,
	},
	/// A job completed.
	Report {
		/// Job generation.
		generation: u64,
		/// The filtered report.
		report: CheckReport,
	},
	/// A job died with the pool.
	PoolFatal {
		/// Job generation.
		generation: u64,
		/// Operator-facing description.
		message: String,
	},
}

/// [`ReportSink`] implementation delivering over an unbounded channel.
#[derive(Debug)]
pub struct ChannelSink {
	tx: mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
	/// Creates the sink and its receiving end.
	#[must_use]
	pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
		let (tx, rx) = mpsc::unbounded_channel();
		(Self { tx }, rx)
	}
}

impl ReportSink for ChannelSink {
	fn in_progress(&self, generation: u64) {
		let _ = self.tx.send(SinkEvent::InProgress { generation });
	}

	fn report(&self, generation: u64, report: CheckReport) {
		let _ = self.tx.send(SinkEvent::Report { generation, report });
	}

	fn pool_fatal(&self, generation: u64, error: &PoolError) {
		let _ = self.tx.send(SinkEvent::PoolFatal {
			generation,
			message: error.to_string(),
		});
	}
}
