//! Stable file-to-worker partitioning.

use std::path::Path;

use xxhash_rust::xxh3::xxh3_64;

/// Assignment of one worker to a disjoint slice of the watched file set.
///
/// Ownership is decided by a stable hash of the file identity, so partitions
/// are exhaustive and pairwise disjoint across workers for a fixed division,
/// and a file never migrates between workers while the division is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
	index: u32,
	division: u32,
}

impl Partition {
	/// Creates a partition assignment.
	///
	/// # Panics
	///
	/// Panics if `division` is zero or `index` is out of range; both are
	/// rejected by configuration validation before a worker is ever spawned.
	#[must_use]
	pub fn new(index: u32, division: u32) -> Self {
		assert!(division > 0, "partition division must be > 0");
		assert!(index < division, "partition index must be < division");
		Self { index, division }
	}

	/// The single partition of an unsplit pool.
	#[must_use]
	pub const fn solo() -> Self {
		Self {
			index: 0,
			division: 1,
		}
	}

	/// This worker's index.
	pub const fn index(&self) -> u32 {
		self.index
	}

	/// Total number of partitions.
	pub const fn division(&self) -> u32 {
		self.division
	}

	/// Returns true when this partition reports diagnostics for `path`.
	///
	/// Ownership only partitions diagnostic reporting; every worker still
	/// sees the full dependency graph for type resolution.
	pub fn owns(&self, path: &Path) -> bool {
		if self.division <= 1 {
			return true;
		}
		let hash = xxh3_64(path.as_os_str().as_encoded_bytes());
		hash % u64::from(self.division) == u64::from(self.index)
	}
}

#[cfg(test)]
mod tests {
	use std::path::PathBuf;

	use super::*;

	fn sample_paths() -> Vec<PathBuf> {
		(0..200)
			.map(|i| PathBuf::from(format!("src/module_{i}/file_{i}.ts")))
			.collect()
	}

	#[test]
	fn solo_partition_owns_everything() {
		let partition = Partition::solo();
		assert!(sample_paths().iter().all(|p| partition.owns(p)));
	}

	#[test]
	fn partitions_are_exhaustive_and_disjoint() {
		for division in [2u32, 3, 7] {
			let partitions: Vec<_> = (0..division).map(|i| Partition::new(i, division)).collect();
			for path in sample_paths() {
				let owners = partitions.iter().filter(|p| p.owns(&path)).count();
				assert_eq!(owners, 1, "{path:?} owned by {owners} partitions of {division}");
			}
		}
	}

	#[test]
	fn ownership_is_stable() {
		let partition = Partition::new(1, 4);
		let path = Path::new("src/app.ts");
		assert_eq!(partition.owns(path), partition.owns(path));
	}

	#[test]
	#[should_panic(expected = "division")]
	fn zero_division_is_rejected() {
		let _ = Partition::new(0, 0);
	}
}
