//! Message-based RPC layer between the controller and its worker processes.
//!
//! This crate provides the protocol-level primitives of the checking system:
//! * [`Message`]: the wire message model with `Content-Length` framing
//! * [`Endpoint`]: a duplex message pump correlating responses to calls by ID
//! * [`CancelHandle`] / [`WireToken`]: the per-job cancellation token
//! * [`proto`]: method names and payload shapes of the checking protocol

#![warn(missing_docs)]

pub mod endpoint;
pub mod message;
pub mod proto;
pub mod token;

pub use endpoint::{Endpoint, Incoming};
pub use message::{AnyNotification, AnyRequest, AnyResponse, Message, RequestId, ResponseError};
pub use token::{CancelHandle, GenerationClock, WireToken};

/// A convenient type alias for `Result` with `E` = [`enum@Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// Input/output errors from the underlying channel.
	#[error("{0}")]
	Io(#[from] std::io::Error),
	/// The peer sent an undecodable or invalid message.
	#[error("deserialization failed: {0}")]
	Deserialize(#[from] serde_json::Error),
	/// The peer violated the wire protocol.
	#[error("protocol error: {0}")]
	Protocol(String),
	/// The peer process exited or the channel closed with calls outstanding.
	#[error("peer channel closed")]
	ChannelClosed,
	/// The peer replied with an error response.
	#[error("{0}")]
	Response(#[from] ResponseError),
}
