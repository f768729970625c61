//! Incremental program state carried between checking iterations.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use xxhash_rust::xxh3::xxh3_64;

use vigil_diagnostics::Diagnostic;

/// Cached analysis of one watched file.
#[derive(Debug)]
struct FileEntry {
	mtime: SystemTime,
	content_hash: u64,
	dependencies: Vec<PathBuf>,
	diagnostics: Vec<Diagnostic>,
	lints: Vec<Diagnostic>,
}

/// A file whose content differs from the cached analysis.
#[derive(Debug)]
pub struct ChangedFile {
	/// File path.
	pub path: PathBuf,
	/// Current content.
	pub text: String,
	/// Current mtime.
	pub mtime: SystemTime,
	/// Current content hash.
	pub content_hash: u64,
}

/// Result of one change-detection sweep.
#[derive(Debug, Default)]
pub struct ChangeSet {
	/// Files whose content changed (or everything, on a full sweep).
	pub changed: Vec<ChangedFile>,
	/// Previously cached files no longer on disk.
	pub removed: Vec<PathBuf>,
}

/// Per-worker incremental analysis state.
///
/// Exclusively owned by one engine; carries forward dependency edges and
/// previously computed records between iterations, and dies with the worker
/// process.
#[derive(Debug, Default)]
pub struct ProgramState {
	entries: HashMap<PathBuf, FileEntry>,
	/// Files invalidated but not yet (re-)analyzed. Survives a cancelled
	/// iteration so the next run picks up exactly where this one stopped.
	pending: HashSet<PathBuf>,
}

impl ProgramState {
	/// Creates empty state.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Sweeps the watched set and classifies each file against the cache.
	///
	/// Two-level detection: the mtime fast path skips unchanged files without
	/// reading them; files with a newer mtime are re-read and compared by
	/// content hash, so a touch without an edit only refreshes the cached
	/// mtime. With `force_full` every file is re-read and reported changed.
	pub fn scan(&mut self, files: &[PathBuf], force_full: bool) -> ChangeSet {
		let mut changes = ChangeSet::default();
		let on_disk: HashSet<&Path> = files.iter().map(PathBuf::as_path).collect();

		for path in files {
			let Ok(meta) = std::fs::metadata(path) else {
				// Vanished between walk and stat; the removal sweep below
				// handles any cached entry.
				continue;
			};
			let Ok(mtime) = meta.modified() else { continue };

			if !force_full
				&& let Some(entry) = self.entries.get(path)
				&& entry.mtime == mtime
			{
				continue;
			}

			let Ok(bytes) = std::fs::read(path) else {
				tracing::warn!(path = %path.display(), "state.read_failed");
				continue;
			};
			let content_hash = xxh3_64(&bytes);

			if !force_full
				&& let Some(entry) = self.entries.get_mut(path)
				&& entry.content_hash == content_hash
			{
				entry.mtime = mtime;
				continue;
			}

			changes.changed.push(ChangedFile {
				path: path.clone(),
				text: String::from_utf8_lossy(&bytes).into_owned(),
				mtime,
				content_hash,
			});
		}

		changes.removed = self
			.entries
			.keys()
			.filter(|cached| !on_disk.contains(cached.as_path()))
			.cloned()
			.collect();
		changes.removed.sort();

		changes
	}

	/// Applies a change set: drops removed entries and marks the changed
	/// files plus their reverse-dependent closure as pending analysis.
	pub fn invalidate(&mut self, changes: &ChangeSet) {
		let roots: Vec<&Path> = changes
			.changed
			.iter()
			.map(|c| c.path.as_path())
			.chain(changes.removed.iter().map(PathBuf::as_path))
			.collect();

		for path in self.dependent_closure(&roots) {
			self.pending.insert(path);
		}
		for removed in &changes.removed {
			self.entries.remove(removed);
			self.pending.remove(removed);
		}
	}

	/// Files awaiting analysis, in deterministic order.
	pub fn dirty_files(&self) -> Vec<PathBuf> {
		let mut dirty: Vec<_> = self.pending.iter().cloned().collect();
		dirty.sort();
		dirty
	}

	/// Stores the finished analysis of one file and clears its pending mark.
	pub fn record(
		&mut self,
		path: &Path,
		mtime: SystemTime,
		content_hash: u64,
		dependencies: Vec<PathBuf>,
		diagnostics: Vec<Diagnostic>,
		lints: Vec<Diagnostic>,
	) {
		self.entries.insert(
			path.to_path_buf(),
			FileEntry {
				mtime,
				content_hash,
				dependencies,
				diagnostics,
				lints,
			},
		);
		self.pending.remove(path);
	}

	/// Collects the stored records for every file `owned` accepts.
	pub fn collect(
		&self,
		mut owned: impl FnMut(&Path) -> bool,
	) -> (Vec<Diagnostic>, Vec<Diagnostic>) {
		let mut diagnostics = Vec::new();
		let mut lints = Vec::new();
		for (path, entry) in &self.entries {
			if owned(path) {
				diagnostics.extend(entry.diagnostics.iter().cloned());
				lints.extend(entry.lints.iter().cloned());
			}
		}
		sort_records(&mut diagnostics);
		sort_records(&mut lints);
		(diagnostics, lints)
	}

	/// Number of cached file entries.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// Returns true when nothing has been analyzed yet.
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Roots plus every file that transitively depends on one of them.
	fn dependent_closure(&self, roots: &[&Path]) -> Vec<PathBuf> {
		let mut reverse: HashMap<&Path, Vec<&Path>> = HashMap::new();
		for (path, entry) in &self.entries {
			for dep in &entry.dependencies {
				reverse.entry(dep.as_path()).or_default().push(path.as_path());
			}
		}

		let mut seen: HashSet<PathBuf> = HashSet::new();
		let mut queue: VecDeque<PathBuf> =
			roots.iter().map(|p| p.to_path_buf()).collect();
		while let Some(path) = queue.pop_front() {
			if !seen.insert(path.clone()) {
				continue;
			}
			if let Some(dependents) = reverse.get(path.as_path()) {
				for dependent in dependents {
					queue.push_back(dependent.to_path_buf());
				}
			}
		}
		seen.into_iter().collect()
	}
}

/// Deterministic record order so identical state yields identical reports.
fn sort_records(records: &mut [Diagnostic]) {
	records.sort_by(|a, b| {
		(&a.file, a.line, a.column, &a.message).cmp(&(&b.file, b.line, b.column, &b.message))
	});
}

/// Expands watch roots into the concrete watched file set.
///
/// Directories are walked with standard ignore rules; plain files are taken
/// as-is. The result is sorted and deduplicated.
pub fn collect_watched(watch: &[PathBuf]) -> Vec<PathBuf> {
	let mut files = Vec::new();
	for root in watch {
		if root.is_file() {
			files.push(root.clone());
			continue;
		}
		for entry in ignore::WalkBuilder::new(root).build().flatten() {
			if entry.file_type().is_some_and(|t| t.is_file()) {
				files.push(entry.into_path());
			}
		}
	}
	files.sort();
	files.dedup();
	files
}

#[cfg(test)]
mod tests {
	use std::fs;

	use super::*;

	fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
		let path = dir.join(name);
		fs::write(&path, content).unwrap();
		path
	}

	#[test]
	fn first_scan_reports_everything_changed() {
		let dir = tempfile::tempdir().unwrap();
		let a = write(dir.path(), "a.ts", "let a = 1;");
		let b = write(dir.path(), "b.ts", "let b = 2;");

		let mut state = ProgramState::new();
		let changes = state.scan(&[a, b], false);
		assert_eq!(changes.changed.len(), 2);
		assert!(changes.removed.is_empty());
	}

	#[test]
	fn unchanged_files_are_skipped_after_record() {
		let dir = tempfile::tempdir().unwrap();
		let a = write(dir.path(), "a.ts", "let a = 1;");

		let mut state = ProgramState::new();
		let changes = state.scan(std::slice::from_ref(&a), false);
		let changed = &changes.changed[0];
		state.record(
			&a,
			changed.mtime,
			changed.content_hash,
			Vec::new(),
			Vec::new(),
			Vec::new(),
		);

		let again = state.scan(std::slice::from_ref(&a), false);
		assert!(again.changed.is_empty());
		assert!(again.removed.is_empty());
	}

	#[test]
	fn touch_without_edit_is_unchanged() {
		let dir = tempfile::tempdir().unwrap();
		let a = write(dir.path(), "a.ts", "let a = 1;");

		let mut state = ProgramState::new();
		let changes = state.scan(std::slice::from_ref(&a), false);
		let changed = &changes.changed[0];
		state.record(
			&a,
			changed.mtime,
			changed.content_hash,
			Vec::new(),
			Vec::new(),
			Vec::new(),
		);

		// Rewrite identical content; the mtime moves but the hash does not.
		fs::write(&a, "let a = 1;").unwrap();
		let again = state.scan(std::slice::from_ref(&a), false);
		assert!(again.changed.is_empty());
	}

	#[test]
	fn removed_files_drop_their_records() {
		let dir = tempfile::tempdir().unwrap();
		let a = write(dir.path(), "a.ts", "let a = 1;");

		let mut state = ProgramState::new();
		let changes = state.scan(std::slice::from_ref(&a), false);
		let changed = &changes.changed[0];
		state.record(
			&a,
			changed.mtime,
			changed.content_hash,
			Vec::new(),
			vec![vigil_diagnostics::internal_error("x", Some(a.clone()))],
			Vec::new(),
		);

		fs::remove_file(&a).unwrap();
		let changes = state.scan(&[], false);
		assert_eq!(changes.removed, vec![a]);
		state.invalidate(&changes);

		let (diagnostics, _) = state.collect(|_| true);
		assert!(diagnostics.is_empty());
		assert!(state.is_empty());
	}

	#[test]
	fn invalidation_reaches_transitive_dependents() {
		let mut state = ProgramState::new();
		let now = SystemTime::now();
		// c depends on b depends on a.
		state.record(Path::new("a"), now, 1, vec![], vec![], vec![]);
		state.record(Path::new("b"), now, 2, vec![PathBuf::from("a")], vec![], vec![]);
		state.record(Path::new("c"), now, 3, vec![PathBuf::from("b")], vec![], vec![]);

		let changes = ChangeSet {
			changed: vec![ChangedFile {
				path: PathBuf::from("a"),
				text: String::new(),
				mtime: now,
				content_hash: 9,
			}],
			removed: Vec::new(),
		};
		state.invalidate(&changes);

		assert_eq!(
			state.dirty_files(),
			vec![PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("c")]
		);
	}

	#[test]
	fn collect_respects_ownership() {
		let mut state = ProgramState::new();
		let now = SystemTime::now();
		state.record(
			Path::new("a"),
			now,
			1,
			vec![],
			vec![vigil_diagnostics::internal_error("a", Some(PathBuf::from("a")))],
			vec![],
		);
		state.record(
			Path::new("b"),
			now,
			2,
			vec![],
			vec![vigil_diagnostics::internal_error("b", Some(PathBuf::from("b")))],
			vec![],
		);

		let (diagnostics, _) = state.collect(|p| p == Path::new("a"));
		assert_eq!(diagnostics.len(), 1);
		assert_eq!(diagnostics[0].file.as_deref(), Some(Path::new("a")));
	}
}
