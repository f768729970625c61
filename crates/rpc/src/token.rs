//! Per-job cancellation tokens and the generation clock behind them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::{CancellationToken, DropGuard};

/// Monotonic clock assigning each checking job its generation.
#[derive(Debug, Default, Clone)]
pub struct GenerationClock {
	next: Arc<AtomicU64>,
}

impl GenerationClock {
	/// Creates a clock starting at generation 1.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the next generation.
	pub fn next(&self) -> u64 {
		self.next.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
	}
}

/// Serialized form of a cancellation token, sent with every dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireToken {
	/// Cancellation has been requested.
	pub requested: bool,
	/// The side-channel resource has been released.
	pub cleaned_up: bool,
}

/// Controller-side cancellation token for one job generation.
///
/// Owns the out-of-band side channel (a [`CancellationToken`] local tasks can
/// await) and the exactly-once cleanup latch for its guard resource. Workers
/// never hold this type; they see only [`WireToken`] plus the `check/cancel`
/// interrupt.
#[derive(Debug)]
pub struct CancelHandle {
	generation: u64,
	requested: AtomicBool,
	cleaned_up: AtomicBool,
	side: CancellationToken,
	guard: Mutex<Option<DropGuard>>,
}

impl CancelHandle {
	/// Creates the token for one freshly allocated generation.
	#[must_use]
	pub fn new(generation: u64) -> Self {
		let side = CancellationToken::new();
		let guard = side.clone().drop_guard();
		Self {
			generation,
			requested: AtomicBool::new(false),
			cleaned_up: AtomicBool::new(false),
			side,
			guard: Mutex::new(Some(guard)),
		}
	}

	/// Returns the job generation this token belongs to.
	pub const fn generation(&self) -> u64 {
		self.generation
	}

	/// Flips `requested` and fires the side channel.
	pub fn request_cancellation(&self) {
		if !self.requested.swap(true, Ordering::AcqRel) {
			tracing::debug!(generation = self.generation, "job.cancel_requested");
			self.side.cancel();
		}
	}

	/// Returns true when cancellation has been requested.
	pub fn is_requested(&self) -> bool {
		self.requested.load(Ordering::Acquire)
	}

	/// Returns true once the side-channel resource has been released.
	pub fn is_cleaned_up(&self) -> bool {
		self.cleaned_up.load(Ordering::Acquire)
	}

	/// Releases the side-channel resource.
	///
	/// Idempotent: the first call releases, later calls are no-ops. Returns
	/// true on the releasing call.
	pub fn cleanup(&self) -> bool {
		if self.cleaned_up.swap(true, Ordering::AcqRel) {
			return false;
		}
		// Dropping the guard cancels the side channel, so anything still
		// awaiting it unblocks rather than leaking.
		drop(self.guard.lock().take());
		tracing::trace!(generation = self.generation, "job.token_cleaned");
		true
	}

	/// Snapshot for dispatch over the wire.
	pub fn wire(&self) -> WireToken {
		WireToken {
			requested: self.is_requested(),
			cleaned_up: self.is_cleaned_up(),
		}
	}

	/// The side channel local tasks may await for this generation.
	pub fn side_channel(&self) -> &CancellationToken {
		&self.side
	}
}

impl Drop for CancelHandle {
	fn drop(&mut self) {
		// Cleanup must happen on every path, including abnormal teardown.
		self.cleanup();
	}
}
