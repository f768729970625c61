//! Ignore-rule and path-glob filtering of normalized records.

use std::collections::HashSet;

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::record::{Diagnostic, Severity, ToolCode};

/// Filtering rules applied before a report is surfaced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
	/// Type-checker codes to drop.
	#[serde(default)]
	pub ignore_codes: Vec<u32>,
	/// Lint rule identifiers to drop.
	#[serde(default)]
	pub ignore_rules: Vec<String>,
	/// Drop every warning-severity record.
	#[serde(default)]
	pub suppress_warnings: bool,
	/// Path allowlist; when non-empty, file-scoped records must match one glob.
	#[serde(default)]
	pub include_globs: Vec<String>,
}

/// Compiled diagnostic filter.
///
/// Construction compiles the glob allowlist once; a bad pattern is a
/// configuration error surfaced before any job runs.
#[derive(Debug)]
pub struct DiagnosticFilter {
	ignore_codes: HashSet<u32>,
	ignore_rules: HashSet<String>,
	suppress_warnings: bool,
	include: Option<GlobSet>,
}

impl DiagnosticFilter {
	/// Compiles a filter from its configuration.
	pub fn new(config: &FilterConfig) -> Result<Self> {
		let include = if config.include_globs.is_empty() {
			None
		} else {
			let mut builder = GlobSetBuilder::new();
			for pattern in &config.include_globs {
				builder.add(Glob::new(pattern)?);
			}
			Some(builder.build()?)
		};

		Ok(Self {
			ignore_codes: config.ignore_codes.iter().copied().collect(),
			ignore_rules: config.ignore_rules.iter().cloned().collect(),
			suppress_warnings: config.suppress_warnings,
			include,
		})
	}

	/// Returns the records that survive the configured rules.
	pub fn apply(&self, records: &[Diagnostic]) -> Vec<Diagnostic> {
		records.iter().filter(|d| self.keeps(d)).cloned().collect()
	}

	fn keeps(&self, record: &Diagnostic) -> bool {
		if self.suppress_warnings && record.severity == Severity::Warning {
			return false;
		}
		match &record.code {
			ToolCode::Check(code) if self.ignore_codes.contains(code) => return false,
			ToolCode::Lint(rule) if self.ignore_rules.contains(rule) => return false,
			// Recovered faults always surface.
			_ => {}
		}
		match (&self.include, &record.file) {
			(Some(include), Some(file)) => include.is_match(file),
			// Project-wide records bypass the path allowlist.
			_ => true,
		}
	}
}

#[cfg(test)]
mod tests {
	use std::path::PathBuf;

	use super::*;

	fn check_diag(code: u32, severity: Severity, file: &str) -> Diagnostic {
		Diagnostic {
			severity,
			code: ToolCode::Check(code),
			file: Some(PathBuf::from(file)),
			line: 1,
			column: 1,
			message: "m".into(),
		}
	}

	#[test]
	fn ignored_code_filters_to_empty() {
		let filter = DiagnosticFilter::new(&FilterConfig {
			ignore_codes: vec![2304],
			..FilterConfig::default()
		})
		.unwrap();

		let records = vec![check_diag(2304, Severity::Error, "src/a.ts")];
		assert!(filter.apply(&records).is_empty());
	}

	#[test]
	fn ignored_rule_drops_only_that_rule() {
		let filter = DiagnosticFilter::new(&FilterConfig {
			ignore_rules: vec!["no-console".into()],
			..FilterConfig::default()
		})
		.unwrap();

		let kept = Diagnostic {
			severity: Severity::Warning,
			code: ToolCode::Lint("eqeqeq".into()),
			file: None,
			line: 2,
			column: 1,
			message: "m".into(),
		};
		let dropped = Diagnostic {
			code: ToolCode::Lint("no-console".into()),
			..kept.clone()
		};
		assert_eq!(filter.apply(&[kept.clone(), dropped]), vec![kept]);
	}

	#[test]
	fn warning_suppression_keeps_errors() {
		let filter = DiagnosticFilter::new(&FilterConfig {
			suppress_warnings: true,
			..FilterConfig::default()
		})
		.unwrap();

		let records = vec![
			check_diag(1, Severity::Error, "src/a.ts"),
			check_diag(2, Severity::Warning, "src/a.ts"),
		];
		let kept = filter.apply(&records);
		assert_eq!(kept.len(), 1);
		assert_eq!(kept[0].severity, Severity::Error);
	}

	#[test]
	fn glob_allowlist_scopes_file_records() {
		let filter = DiagnosticFilter::new(&FilterConfig {
			include_globs: vec!["src/**/*.ts".into()],
			..FilterConfig::default()
		})
		.unwrap();

		let inside = check_diag(1, Severity::Error, "src/nested/a.ts");
		let outside = check_diag(1, Severity::Error, "vendor/b.ts");
		assert_eq!(filter.apply(&[inside.clone(), outside]), vec![inside]);
	}

	#[test]
	fn project_wide_records_bypass_globs() {
		let filter = DiagnosticFilter::new(&FilterConfig {
			include_globs: vec!["src/**".into()],
			..FilterConfig::default()
		})
		.unwrap();

		let record = crate::normalize::internal_error("fault", None);
		assert_eq!(filter.apply(&[record.clone()]), vec![record]);
	}

	#[test]
	fn bad_glob_is_a_config_error() {
		let result = DiagnosticFilter::new(&FilterConfig {
			include_globs: vec!["src/[".into()],
			..FilterConfig::default()
		});
		assert!(result.is_err());
	}
}
