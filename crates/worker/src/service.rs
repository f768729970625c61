//! The worker's RPC service loop.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};

use vigil_engine::{CancelProbe, CheckEngine, IterationOutcome};
use vigil_rpc::proto::{CancelParams, METHOD_CANCEL, METHOD_RUN, RunOutcome, RunParams, RunReport};
use vigil_rpc::{AnyResponse, Endpoint, Incoming, ResponseError};

/// Serves the checking protocol over the process stdio channel until EOF.
pub async fn serve_stdio(engine: CheckEngine) {
	serve(engine, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await;
}

/// Serves the checking protocol over an arbitrary duplex pair until EOF.
///
/// Runs are driven on the blocking pool since analysis is synchronous CPU
/// work; the loop itself keeps consuming messages so a `check/cancel`
/// interrupt lands while its run is still in flight. Iterations serialize
/// through the engine lock, so overlapping run requests from an ill-behaved
/// caller queue instead of corrupting incremental state.
pub async fn serve(
	engine: CheckEngine,
	reader: impl AsyncBufRead + Unpin + Send + 'static,
	writer: impl AsyncWrite + Unpin + Send + 'static,
) {
	let (endpoint, mut incoming, _pump) = Endpoint::new(reader, writer);
	let engine = Arc::new(Mutex::new(engine));
	let probes: Arc<Mutex<HashMap<u64, CancelProbe>>> = Arc::new(Mutex::new(HashMap::new()));

	while let Some(message) = incoming.recv().await {
		match message {
			Incoming::Request(req) if req.method == METHOD_RUN => {
				let params: RunParams = match serde_json::from_value(req.params) {
					Ok(params) => params,
					Err(e) => {
						let _ = endpoint.respond(AnyResponse {
							id: req.id,
							result: None,
							error: Some(ResponseError {
								code: -32602,
								message: format!("bad run params: {e}"),
							}),
						});
						continue;
					}
				};

				let probe = CancelProbe::new();
				if params.token.requested {
					// Already superseded before we ever saw it.
					probe.cancel();
				}
				probes.lock().insert(params.generation, probe.clone());

				let id = req.id;
				let endpoint = endpoint.clone();
				let engine = Arc::clone(&engine);
				let probes = Arc::clone(&probes);
				tokio::spawn(async move {
					tracing::debug!(generation = params.generation, "worker.run");
					let outcome = tokio::task::spawn_blocking(move || {
						let mut engine = engine.lock();
						engine.run_iteration(&probe)
					})
					.await;
					probes.lock().remove(&params.generation);

					let response = match outcome {
						Ok(IterationOutcome::Done(report)) => {
							let outcome = RunOutcome::Done(RunReport {
								diagnostics: report.diagnostics,
								lints: report.lints,
							});
							match outcome.into_result_value() {
								Ok(result) => AnyResponse {
									id,
									result,
									error: None,
								},
								Err(e) => AnyResponse {
									id,
									result: None,
									error: Some(ResponseError {
										code: -32603,
										message: format!("report encoding failed: {e}"),
									}),
								},
							}
						}
						Ok(IterationOutcome::Cancelled) => {
							tracing::debug!(generation = params.generation, "worker.cancelled");
							AnyResponse {
								id,
								result: None,
								error: None,
							}
						}
						Err(join_error) => {
							tracing::error!(error = %join_error, "worker.iteration_panicked");
							AnyResponse {
								id,
								result: None,
								error: Some(ResponseError {
									code: -32603,
									message: format!("iteration failed: {join_error}"),
								}),
							}
						}
					};
					let _ = endpoint.respond(response);
				});
			}

			Incoming::Request(req) => {
				let _ = endpoint.respond(AnyResponse {
					id: req.id,
					result: None,
					error: Some(ResponseError {
						code: -32601,
						message: format!("unknown method: {}", req.method),
					}),
				});
			}

			Incoming::Notification(notif) if notif.method == METHOD_CANCEL => {
				match serde_json::from_value::<CancelParams>(notif.params) {
					Ok(params) => {
						if let Some(probe) = probes.lock().get(&params.generation) {
							tracing::debug!(generation = params.generation, "worker.cancel");
							probe.cancel();
						}
					}
					Err(e) => {
						tracing::warn!(error = %e, "worker.bad_cancel_params");
					}
				}
			}

			Incoming::Notification(notif) => {
				tracing::trace!(method = %notif.method, "worker.unhandled_notification");
			}
		}
	}

	tracing::info!("worker.channel_closed");
}
