//! The per-worker checking state machine.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use xxhash_rust::xxh3::xxh3_64;

use vigil_diagnostics::{Diagnostic, internal_error, normalize_check, normalize_lint};

use crate::analyzer::{AnalyzerFault, CancelProbe, CheckAnalyzer, LintAnalyzer};
use crate::partition::Partition;
use crate::state::{ProgramState, collect_watched};

/// Engine behavior toggles from the spawn-time configuration.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
	/// Drop parse-stage diagnostics from reports.
	pub suppress_syntactic: bool,
	/// Reuse analysis state between iterations; off forces a full re-check
	/// every run.
	pub incremental: bool,
}

impl Default for EngineOptions {
	fn default() -> Self {
		Self {
			suppress_syntactic: false,
			incremental: true,
		}
	}
}

/// Unfiltered records for the engine's partition after one iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionReport {
	/// Type-checker records for owned files.
	pub diagnostics: Vec<Diagnostic>,
	/// Lint records for owned files.
	pub lints: Vec<Diagnostic>,
}

/// Result of one checking iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
	/// The iteration completed; the report covers the full owned set.
	Done(PartitionReport),
	/// Cancellation was observed; no partial records are returned.
	Cancelled,
}

/// Incremental checking engine for one partition of the watched tree.
///
/// The engine rests in `Idle` between calls; [`CheckEngine::run_iteration`]
/// is the `Checking` state and ends in `Done` or `Cancelled`. Per-file
/// analyzer faults are recovered inside the iteration and never abort it.
/// The incremental [`ProgramState`] is reused across iterations, including
/// after a cancelled one: files invalidated but not yet re-analyzed stay
/// pending.
pub struct CheckEngine {
	watch: Vec<PathBuf>,
	partition: Partition,
	checker: Arc<dyn CheckAnalyzer>,
	linter: Option<Arc<dyn LintAnalyzer>>,
	options: EngineOptions,
	state: ProgramState,
}

impl CheckEngine {
	/// Creates an engine over the given watch roots and analyzers.
	pub fn new(
		watch: Vec<PathBuf>,
		partition: Partition,
		checker: Arc<dyn CheckAnalyzer>,
		linter: Option<Arc<dyn LintAnalyzer>>,
		options: EngineOptions,
	) -> Self {
		Self {
			watch,
			partition,
			checker,
			linter,
			options,
			state: ProgramState::new(),
		}
	}

	/// Runs one checking iteration, polling `probe` between files.
	///
	/// Cancellation latency is bounded by the analysis of a single file plus
	/// whatever the analyzer's own cooperative polling adds.
	pub fn run_iteration(&mut self, probe: &CancelProbe) -> IterationOutcome {
		let started = Instant::now();
		tracing::debug!(
			partition_index = self.partition.index(),
			partition_division = self.partition.division(),
			"engine.checking"
		);

		let files = collect_watched(&self.watch);
		let changes = self.state.scan(&files, !self.options.incremental);
		tracing::debug!(
			changed = changes.changed.len(),
			removed = changes.removed.len(),
			watched = files.len(),
			"engine.scan"
		);

		let mut contents: HashMap<PathBuf, (String, SystemTime, u64)> = changes
			.changed
			.iter()
			.map(|c| (c.path.clone(), (c.text.clone(), c.mtime, c.content_hash)))
			.collect();
		self.state.invalidate(&changes);

		for file in self.state.dirty_files() {
			if probe.is_cancelled() {
				tracing::debug!(
					elapsed_ms = started.elapsed().as_millis() as u64,
					"engine.cancelled"
				);
				return IterationOutcome::Cancelled;
			}
			let Some((text, mtime, content_hash)) =
				contents.remove(&file).or_else(|| load(&file))
			else {
				// Vanished since the sweep; the next scan reclassifies it.
				continue;
			};
			self.analyze_file(&file, &text, mtime, content_hash, probe);
		}

		let partition = self.partition;
		let (diagnostics, lints) = self.state.collect(|path| partition.owns(path));
		tracing::debug!(
			diagnostics = diagnostics.len(),
			lints = lints.len(),
			elapsed_ms = started.elapsed().as_millis() as u64,
			"engine.done"
		);
		IterationOutcome::Done(PartitionReport { diagnostics, lints })
	}

	/// Analyzes one file and stores the result, converting any fault or
	/// panic into a synthetic record instead of letting it escape.
	fn analyze_file(
		&mut self,
		file: &Path,
		text: &str,
		mtime: SystemTime,
		content_hash: u64,
		probe: &CancelProbe,
	) {
		let mut diagnostics = Vec::new();
		let mut dependencies = Vec::new();

		let checker = Arc::clone(&self.checker);
		match catch_unwind(AssertUnwindSafe(|| checker.check(file, text, probe))) {
			Ok(Ok(output)) => {
				dependencies = output.dependencies;
				if !self.options.suppress_syntactic {
					diagnostics.extend(
						output
							.syntactic
							.into_iter()
							.map(|raw| normalize_check(raw, Some(file))),
					);
				}
				diagnostics.extend(
					output
						.semantic
						.into_iter()
						.map(|raw| normalize_check(raw, Some(file))),
				);
			}
			Ok(Err(fault)) => {
				tracing::warn!(path = %file.display(), error = %fault, "engine.checker_fault");
				diagnostics.push(internal_error(fault_message("type check", &fault), Some(file.to_path_buf())));
			}
			Err(payload) => {
				let message = panic_message(payload.as_ref());
				tracing::error!(path = %file.display(), message, "engine.checker_panic");
				diagnostics.push(internal_error(
					format!("type check panicked: {message}"),
					Some(file.to_path_buf()),
				));
			}
		}

		let mut lints = Vec::new();
		if let Some(linter) = &self.linter {
			let linter = Arc::clone(linter);
			match catch_unwind(AssertUnwindSafe(|| linter.lint(file, text, probe))) {
				Ok(Ok(raw)) => {
					lints.extend(raw.into_iter().map(|r| normalize_lint(r, Some(file))));
				}
				Ok(Err(fault)) => {
					tracing::warn!(path = %file.display(), error = %fault, "engine.linter_fault");
					lints.push(internal_error(fault_message("lint", &fault), Some(file.to_path_buf())));
				}
				Err(payload) => {
					let message = panic_message(payload.as_ref());
					tracing::error!(path = %file.display(), message, "engine.linter_panic");
					lints.push(internal_error(
						format!("lint panicked: {message}"),
						Some(file.to_path_buf()),
					));
				}
			}
		}

		self.state.record(file, mtime, content_hash, dependencies, diagnostics, lints);
	}
}

fn fault_message(stage: &str, fault: &AnalyzerFault) -> String {
	match &fault.detail {
		Some(detail) => format!("{stage} failed: {}\n{detail}", fault.message),
		None => format!("{stage} failed: {}", fault.message),
	}
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
	if let Some(message) = payload.downcast_ref::<&str>() {
		(*message).to_owned()
	} else if let Some(message) = payload.downcast_ref::<String>() {
		message.clone()
	} else {
		"analyzer panicked".to_owned()
	}
}

fn load(path: &Path) -> Option<(String, SystemTime, u64)> {
	let mtime = std::fs::metadata(path).ok()?.modified().ok()?;
	let bytes = std::fs::read(path).ok()?;
	let hash = xxh3_64(&bytes);
	Some((String::from_utf8_lossy(&bytes).into_owned(), mtime, hash))
}

#[cfg(test)]
mod tests {
	use std::fs;
	use std::sync::atomic::{AtomicUsize, Ordering};

	use vigil_diagnostics::{
		CheckCategory, LintLevel, RawCheckDiagnostic, RawLintDiagnostic, Severity, ToolCode,
	};

	use super::*;
	use crate::analyzer::CheckOutput;

	/// Line-marker driven checker:
	/// * `// TYPE-ERROR` emits a semantic error on that line
	/// * `// PARSE-ERROR` emits a syntactic error on that line
	/// * `// import NAME` records a dependency on a sibling file
	/// * a file whose name contains `faulty` returns an analyzer fault
	/// * a file whose name contains `explosive` panics
	#[derive(Default)]
	struct MarkerChecker {
		calls: AtomicUsize,
		cancel_on_call: Option<usize>,
	}

	impl CheckAnalyzer for MarkerChecker {
		fn check(
			&self,
			file: &Path,
			text: &str,
			probe: &CancelProbe,
		) -> Result<CheckOutput, AnalyzerFault> {
			let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
			if self.cancel_on_call == Some(call) {
				probe.cancel();
			}

			let name = file.file_name().unwrap().to_string_lossy();
			if name.contains("faulty") {
				return Err(AnalyzerFault::new("corrupt source map"));
			}
			if name.contains("explosive") {
				panic!("checker exploded");
			}

			let mut output = CheckOutput::default();
			for (idx, line) in text.lines().enumerate() {
				let line_no = (idx + 1) as u32;
				if line.contains("// TYPE-ERROR") {
					output.semantic.push(RawCheckDiagnostic {
						code: 2322,
						category: CheckCategory::Error,
						line: line_no,
						column: 1,
						message: "type mismatch".into(),
					});
				}
				if line.contains("// PARSE-ERROR") {
					output.syntactic.push(RawCheckDiagnostic {
						code: 1005,
						category: CheckCategory::Error,
						line: line_no,
						column: 1,
						message: "';' expected".into(),
					});
				}
				if let Some(name) = line.strip_prefix("// import ") {
					output
						.dependencies
						.push(file.parent().unwrap().join(name.trim()));
				}
			}
			Ok(output)
		}
	}

	struct MarkerLinter;

	impl LintAnalyzer for MarkerLinter {
		fn lint(
			&self,
			_file: &Path,
			text: &str,
			_probe: &CancelProbe,
		) -> Result<Vec<RawLintDiagnostic>, AnalyzerFault> {
			Ok(text
				.lines()
				.enumerate()
				.filter(|(_, line)| line.contains("// LINT"))
				.map(|(idx, _)| RawLintDiagnostic {
					rule: "no-console".into(),
					level: LintLevel::Warn,
					line: (idx + 1) as u32,
					column: 1,
					message: "console call".into(),
				})
				.collect())
		}
	}

	fn engine_over(
		dir: &Path,
		checker: Arc<MarkerChecker>,
		linter: bool,
		options: EngineOptions,
	) -> CheckEngine {
		CheckEngine::new(
			vec![dir.to_path_buf()],
			Partition::solo(),
			checker,
			linter.then(|| Arc::new(MarkerLinter) as Arc<dyn LintAnalyzer>),
			options,
		)
	}

	fn done(outcome: IterationOutcome) -> PartitionReport {
		match outcome {
			IterationOutcome::Done(report) => report,
			IterationOutcome::Cancelled => panic!("iteration was cancelled"),
		}
	}

	#[test]
	fn reports_single_type_error_with_position() {
		let dir = tempfile::tempdir().unwrap();
		fs::write(
			dir.path().join("app.ts"),
			"let a = 1;\nlet b = 2;\nlet c: string = 3; // TYPE-ERROR\n",
		)
		.unwrap();

		let mut engine = engine_over(
			dir.path(),
			Arc::new(MarkerChecker::default()),
			false,
			EngineOptions::default(),
		);
		let report = done(engine.run_iteration(&CancelProbe::new()));

		assert_eq!(report.diagnostics.len(), 1);
		let diag = &report.diagnostics[0];
		assert_eq!(diag.severity, Severity::Error);
		assert_eq!(diag.line, 3);
		assert_eq!(diag.code, ToolCode::Check(2322));
		assert!(report.lints.is_empty());
	}

	#[test]
	fn unchanged_rerun_is_idempotent_without_reanalysis() {
		let dir = tempfile::tempdir().unwrap();
		fs::write(dir.path().join("a.ts"), "bad // TYPE-ERROR\n").unwrap();
		fs::write(dir.path().join("b.ts"), "fine\n").unwrap();

		let checker = Arc::new(MarkerChecker::default());
		let mut engine = engine_over(
			dir.path(),
			Arc::clone(&checker),
			false,
			EngineOptions::default(),
		);

		let first = done(engine.run_iteration(&CancelProbe::new()));
		let calls_after_first = checker.calls.load(Ordering::SeqCst);
		let second = done(engine.run_iteration(&CancelProbe::new()));

		assert_eq!(first, second);
		assert_eq!(checker.calls.load(Ordering::SeqCst), calls_after_first);
	}

	#[test]
	fn editing_a_dependency_reanalyzes_dependents() {
		let dir = tempfile::tempdir().unwrap();
		fs::write(dir.path().join("lib.ts"), "export const n = 1;\n").unwrap();
		fs::write(dir.path().join("app.ts"), "// import lib.ts\nuse lib\n").unwrap();

		let checker = Arc::new(MarkerChecker::default());
		let mut engine = engine_over(
			dir.path(),
			Arc::clone(&checker),
			false,
			EngineOptions::default(),
		);
		done(engine.run_iteration(&CancelProbe::new()));
		assert_eq!(checker.calls.load(Ordering::SeqCst), 2);

		// Keep the edit clear of mtime granularity on coarse filesystems.
		std::thread::sleep(std::time::Duration::from_millis(10));
		fs::write(dir.path().join("lib.ts"), "export const n = 2;\n").unwrap();
		done(engine.run_iteration(&CancelProbe::new()));
		// Both the edited file and its dependent were re-checked.
		assert_eq!(checker.calls.load(Ordering::SeqCst), 4);
	}

	#[test]
	fn cancellation_returns_no_partial_results_and_resumes() {
		let dir = tempfile::tempdir().unwrap();
		fs::write(dir.path().join("a.ts"), "x // TYPE-ERROR\n").unwrap();
		fs::write(dir.path().join("b.ts"), "y // TYPE-ERROR\n").unwrap();

		let checker = Arc::new(MarkerChecker {
			calls: AtomicUsize::new(0),
			cancel_on_call: Some(1),
		});
		let mut engine = engine_over(
			dir.path(),
			Arc::clone(&checker),
			false,
			EngineOptions::default(),
		);

		let outcome = engine.run_iteration(&CancelProbe::new());
		assert_eq!(outcome, IterationOutcome::Cancelled);

		// The next iteration finishes the carried-over pending files.
		let report = done(engine.run_iteration(&CancelProbe::new()));
		assert_eq!(report.diagnostics.len(), 2);
	}

	#[test]
	fn analyzer_fault_degrades_to_one_synthetic_record() {
		let dir = tempfile::tempdir().unwrap();
		fs::write(dir.path().join("faulty.ts"), "whatever\n").unwrap();
		fs::write(dir.path().join("ok.ts"), "z // TYPE-ERROR\n").unwrap();

		let mut engine = engine_over(
			dir.path(),
			Arc::new(MarkerChecker::default()),
			false,
			EngineOptions::default(),
		);
		let report = done(engine.run_iteration(&CancelProbe::new()));

		let internal: Vec<_> = report
			.diagnostics
			.iter()
			.filter(|d| d.code.is_internal())
			.collect();
		assert_eq!(internal.len(), 1);
		assert!(internal[0].message.contains("corrupt source map"));
		// The healthy file was still analyzed.
		assert!(report.diagnostics.iter().any(|d| d.code == ToolCode::Check(2322)));
	}

	#[test]
	fn analyzer_panic_degrades_to_one_synthetic_record() {
		let dir = tempfile::tempdir().unwrap();
		fs::write(dir.path().join("explosive.ts"), "whatever\n").unwrap();

		let mut engine = engine_over(
			dir.path(),
			Arc::new(MarkerChecker::default()),
			false,
			EngineOptions::default(),
		);
		let report = done(engine.run_iteration(&CancelProbe::new()));

		assert_eq!(report.diagnostics.len(), 1);
		assert!(report.diagnostics[0].code.is_internal());
		assert!(report.diagnostics[0].message.contains("checker exploded"));
	}

	#[test]
	fn partition_scopes_reporting_but_not_analysis() {
		let dir = tempfile::tempdir().unwrap();
		let a = dir.path().join("a.ts");
		let b = dir.path().join("b.ts");
		fs::write(&a, "x // TYPE-ERROR\n").unwrap();
		fs::write(&b, "y // TYPE-ERROR\n").unwrap();

		// Find the partition that owns exactly one of the two files.
		let division = 2;
		let owner_of_a = (0..division)
			.map(|i| Partition::new(i, division))
			.find(|p| p.owns(&a))
			.unwrap();

		let checker = Arc::new(MarkerChecker::default());
		let mut engine = CheckEngine::new(
			vec![dir.path().to_path_buf()],
			owner_of_a,
			Arc::clone(&checker) as Arc<dyn CheckAnalyzer>,
			None,
			EngineOptions::default(),
		);
		let report = done(engine.run_iteration(&CancelProbe::new()));

		// Both files were analyzed; only owned files are reported.
		assert_eq!(checker.calls.load(Ordering::SeqCst), 2);
		for diag in &report.diagnostics {
			assert!(owner_of_a.owns(diag.file.as_deref().unwrap()));
		}
		if !owner_of_a.owns(&b) {
			assert_eq!(report.diagnostics.len(), 1);
			assert_eq!(report.diagnostics[0].file.as_deref(), Some(a.as_path()));
		}
	}

	#[test]
	fn syntactic_suppression_drops_parse_records() {
		let dir = tempfile::tempdir().unwrap();
		fs::write(
			dir.path().join("a.ts"),
			"broken( // PARSE-ERROR\nbad // TYPE-ERROR\n",
		)
		.unwrap();

		let mut engine = engine_over(
			dir.path(),
			Arc::new(MarkerChecker::default()),
			false,
			EngineOptions {
				suppress_syntactic: true,
				..EngineOptions::default()
			},
		);
		let report = done(engine.run_iteration(&CancelProbe::new()));
		assert_eq!(report.diagnostics.len(), 1);
		assert_eq!(report.diagnostics[0].code, ToolCode::Check(2322));
	}

	#[test]
	fn lints_arrive_on_their_own_channel() {
		let dir = tempfile::tempdir().unwrap();
		fs::write(dir.path().join("a.ts"), "console.log(1) // LINT\n").unwrap();

		let mut engine = engine_over(
			dir.path(),
			Arc::new(MarkerChecker::default()),
			true,
			EngineOptions::default(),
		);
		let report = done(engine.run_iteration(&CancelProbe::new()));
		assert!(report.diagnostics.is_empty());
		assert_eq!(report.lints.len(), 1);
		assert_eq!(report.lints[0].code, ToolCode::Lint("no-console".into()));
	}
}
