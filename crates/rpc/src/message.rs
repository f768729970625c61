//! Wire message model and `Content-Length` framing.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Error, Result};

/// Per-call identifier correlating a response back to its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub i64);

/// An RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnyRequest {
	/// Call identifier.
	pub id: RequestId,
	/// Method name.
	pub method: String,
	/// Method parameters.
	#[serde(default)]
	pub params: JsonValue,
}

/// An RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnyResponse {
	/// Identifier of the call being answered.
	pub id: RequestId,
	/// Successful payload, absent on error.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<JsonValue>,
	/// Error payload, absent on success.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<ResponseError>,
}

/// An RPC notification; carries no identifier and expects no reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnyNotification {
	/// Method name.
	pub method: String,
	/// Method parameters.
	#[serde(default)]
	pub params: JsonValue,
}

/// Error payload of a failed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("remote error {code}: {message}")]
pub struct ResponseError {
	/// Numeric error code.
	pub code: i64,
	/// Human-readable message.
	pub message: String,
}

/// A complete wire message.
#[derive(Debug, Clone)]
pub enum Message {
	/// An incoming or outgoing request.
	Request(AnyRequest),
	/// An incoming or outgoing response.
	Response(AnyResponse),
	/// An incoming or outgoing notification.
	Notification(AnyNotification),
}

impl Message {
	/// Reads one framed message, or `None` on a clean EOF at a frame boundary.
	pub async fn read(reader: &mut (impl AsyncBufRead + Unpin)) -> Result<Option<Self>> {
		let mut content_length: Option<usize> = None;
		let mut line = String::new();
		loop {
			line.clear();
			if reader.read_line(&mut line).await? == 0 {
				return if content_length.is_none() {
					Ok(None)
				} else {
					Err(Error::Protocol("EOF inside frame header".into()))
				};
			}
			let header = line.trim();
			if header.is_empty() {
				break;
			}
			if let Some(len) = header.strip_prefix("Content-Length: ") {
				content_length = Some(
					len.parse()
						.map_err(|_| Error::Protocol(format!("bad Content-Length: {len}")))?,
				);
			}
		}

		let length =
			content_length.ok_or_else(|| Error::Protocol("missing Content-Length".into()))?;
		let mut body = vec![0u8; length];
		reader.read_exact(&mut body).await?;

		let value: JsonValue = serde_json::from_slice(&body)?;
		Self::classify(value).map(Some)
	}

	/// Writes this message with its frame header.
	pub async fn write(&self, writer: &mut (impl AsyncWrite + Unpin)) -> Result<()> {
		let body = match self {
			Self::Request(req) => serde_json::to_vec(req)?,
			Self::Response(resp) => serde_json::to_vec(resp)?,
			Self::Notification(notif) => serde_json::to_vec(notif)?,
		};
		writer
			.write_all(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes())
			.await?;
		writer.write_all(&body).await?;
		writer.flush().await?;
		Ok(())
	}

	/// Classifies a decoded body by the presence of `id` and `method`.
	fn classify(value: JsonValue) -> Result<Self> {
		let has_id = value.get("id").is_some();
		let has_method = value.get("method").is_some();
		match (has_id, has_method) {
			(true, true) => Ok(Self::Request(serde_json::from_value(value)?)),
			(true, false) => Ok(Self::Response(serde_json::from_value(value)?)),
			(false, true) => Ok(Self::Notification(serde_json::from_value(value)?)),
			(false, false) => Err(Error::Protocol("message has neither id nor method".into())),
		}
	}
}
