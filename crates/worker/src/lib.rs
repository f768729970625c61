//! Worker-process side of the checking system.
//!
//! A worker is configured exactly once at spawn time (via
//! [`vigil_rpc::proto::WorkerConfig`] in the process environment), builds a
//! [`vigil_engine::CheckEngine`] around the embedder's analyzers, and then
//! serves `check/run` / `check/cancel` over its stdio channel until EOF.
//!
//! Embedders provide the actual analyzers and a `main` that calls
//! [`serve_stdio`]; this crate contributes everything between the wire and
//! the engine.

pub mod config;
pub mod service;

pub use config::{build_engine, config_from_env};
pub use service::{serve, serve_stdio};

/// A convenient type alias for `Result` with `E` = [`enum@Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The spawn environment carries no worker configuration.
	#[error("missing {} in the process environment", vigil_rpc::proto::CONFIG_ENV_VAR)]
	MissingConfig,
	/// The spawn-time configuration failed to deserialize.
	#[error("invalid worker configuration: {0}")]
	InvalidConfig(#[from] serde_json::Error),
	/// The spawn-time configuration is structurally wrong.
	#[error("bad worker configuration: {0}")]
	Config(String),
}
