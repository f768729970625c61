//! Duplex RPC endpoint with per-call response correlation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use serde_json::Value as JsonValue;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::message::{AnyNotification, AnyRequest, AnyResponse, Message, RequestId};
use crate::{Error, Result};

/// An inbound message surfaced to the endpoint's host.
#[derive(Debug)]
pub enum Incoming {
	/// A request the host must answer via [`Endpoint::respond`].
	Request(AnyRequest),
	/// A notification; no reply expected.
	Notification(AnyNotification),
}

/// Outbound envelope; requests carry their response slot into the pump.
enum Outbound {
	Request {
		req: AnyRequest,
		response_tx: oneshot::Sender<Result<AnyResponse>>,
	},
	Notification(AnyNotification),
	Response(AnyResponse),
}

/// Handle to one duplex RPC channel.
///
/// All writes funnel through a single queue so outbound messages keep total
/// order. Responses are matched back to their call by [`RequestId`]; arrival
/// order is irrelevant. When the peer dies, every outstanding call resolves
/// to [`Error::ChannelClosed`] rather than hanging.
#[derive(Debug, Clone)]
pub struct Endpoint {
	outbound_tx: mpsc::UnboundedSender<Outbound>,
	next_id: Arc<AtomicI64>,
}

impl Endpoint {
	/// Creates an endpoint over a read/write half pair and spawns its pump.
	///
	/// The returned receiver yields inbound requests and notifications; the
	/// join handle resolves when the channel closes.
	pub fn new(
		reader: impl AsyncBufRead + Unpin + Send + 'static,
		writer: impl AsyncWrite + Unpin + Send + 'static,
	) -> (Self, mpsc::UnboundedReceiver<Incoming>, JoinHandle<()>) {
		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
		let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
		let pump = tokio::spawn(pump(reader, writer, outbound_rx, incoming_tx));
		let endpoint = Self {
			outbound_tx,
			next_id: Arc::new(AtomicI64::new(0)),
		};
		(endpoint, incoming_rx, pump)
	}

	/// Sends a request and suspends until the correlated response arrives or
	/// the channel closes.
	pub async fn request(&self, method: impl Into<String>, params: JsonValue) -> Result<AnyResponse> {
		let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
		let (response_tx, response_rx) = oneshot::channel();
		let req = AnyRequest {
			id,
			method: method.into(),
			params,
		};
		self.outbound_tx
			.send(Outbound::Request { req, response_tx })
			.map_err(|_| Error::ChannelClosed)?;
		response_rx.await.map_err(|_| Error::ChannelClosed)?
	}

	/// Sends a notification.
	pub fn notify(&self, method: impl Into<String>, params: JsonValue) -> Result<()> {
		self.outbound_tx
			.send(Outbound::Notification(AnyNotification {
				method: method.into(),
				params,
			}))
			.map_err(|_| Error::ChannelClosed)
	}

	/// Answers an inbound request.
	pub fn respond(&self, resp: AnyResponse) -> Result<()> {
		self.outbound_tx
			.send(Outbound::Response(resp))
			.map_err(|_| Error::ChannelClosed)
	}
}

/// Drives one channel until EOF, write failure, or host hangup.
async fn pump(
	mut reader: impl AsyncBufRead + Unpin + Send,
	mut writer: impl AsyncWrite + Unpin + Send,
	mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
	incoming_tx: mpsc::UnboundedSender<Incoming>,
) {
	let mut pending: HashMap<RequestId, oneshot::Sender<Result<AnyResponse>>> = HashMap::new();

	loop {
		tokio::select! {
			Some(out) = outbound_rx.recv() => {
				let write_res = match out {
					Outbound::Request { req, response_tx } => {
						let id = req.id;
						match Message::Request(req).write(&mut writer).await {
							Ok(()) => {
								pending.insert(id, response_tx);
								Ok(())
							}
							Err(e) => {
								let _ = response_tx.send(Err(e));
								Err(())
							}
						}
					}
					Outbound::Notification(notif) => {
						Message::Notification(notif).write(&mut writer).await.map_err(|e| {
							tracing::error!(error = %e, "rpc.write_failed");
						})
					}
					Outbound::Response(resp) => {
						Message::Response(resp).write(&mut writer).await.map_err(|e| {
							tracing::error!(error = %e, "rpc.write_failed");
						})
					}
				};
				if write_res.is_err() {
					break;
				}
			}

			msg = Message::read(&mut reader) => {
				match msg {
					Ok(Some(Message::Response(resp))) => {
						match pending.remove(&resp.id) {
							Some(response_tx) => {
								let _ = response_tx.send(Ok(resp));
							}
							None => {
								tracing::trace!(id = resp.id.0, "rpc.unmatched_response");
							}
						}
					}
					Ok(Some(Message::Request(req))) => {
						if incoming_tx.send(Incoming::Request(req)).is_err() {
							break;
						}
					}
					Ok(Some(Message::Notification(notif))) => {
						if incoming_tx.send(Incoming::Notification(notif)).is_err() {
							break;
						}
					}
					Ok(None) => {
						tracing::debug!("rpc.peer_eof");
						break;
					}
					Err(e) => {
						tracing::error!(error = %e, "rpc.read_failed");
						break;
					}
				}
			}
		}
	}

	// The channel is gone; no outstanding call may hang.
	for (_, response_tx) in pending.drain() {
		let _ = response_tx.send(Err(Error::ChannelClosed));
	}
	outbound_rx.close();
	while let Ok(out) = outbound_rx.try_recv() {
		if let Outbound::Request { response_tx, .. } = out {
			let _ = response_tx.send(Err(Error::ChannelClosed));
		}
	}
}
