//! Total mappings from analyzer-specific records into [`Diagnostic`].

use std::path::{Path, PathBuf};

use crate::record::{Diagnostic, Severity, ToolCode};

/// Category assigned by the type-checker to one of its diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckCategory {
	/// Analysis failure.
	Error,
	/// Suspicious but well-formed code.
	Warning,
	/// Non-blocking improvement hint.
	Suggestion,
}

/// Raw diagnostic record emitted by the type-checker.
#[derive(Debug, Clone)]
pub struct RawCheckDiagnostic {
	/// Numeric tool code.
	pub code: u32,
	/// Category assigned by the checker.
	pub category: CheckCategory,
	/// 1-based line.
	pub line: u32,
	/// 1-based column.
	pub column: u32,
	/// Message text.
	pub message: String,
}

/// Level assigned by the lint engine to one of its findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LintLevel {
	/// Rule configured to warn.
	Warn,
	/// Rule configured to reject.
	Deny,
}

/// Raw finding emitted by the lint engine.
#[derive(Debug, Clone)]
pub struct RawLintDiagnostic {
	/// Rule identifier.
	pub rule: String,
	/// Configured level of the rule.
	pub level: LintLevel,
	/// 1-based line.
	pub line: u32,
	/// 1-based column.
	pub column: u32,
	/// Message text.
	pub message: String,
}

/// Normalizes one type-checker record.
///
/// The mapping is total: suggestions fold into warnings, everything else is
/// carried over unchanged.
pub fn normalize_check(raw: RawCheckDiagnostic, file: Option<&Path>) -> Diagnostic {
	let severity = match raw.category {
		CheckCategory::Error => Severity::Error,
		CheckCategory::Warning | CheckCategory::Suggestion => Severity::Warning,
	};
	Diagnostic {
		severity,
		code: ToolCode::Check(raw.code),
		file: file.map(Path::to_path_buf),
		line: raw.line.max(1),
		column: raw.column.max(1),
		message: raw.message,
	}
}

/// Normalizes one lint finding.
pub fn normalize_lint(raw: RawLintDiagnostic, file: Option<&Path>) -> Diagnostic {
	let severity = match raw.level {
		LintLevel::Warn => Severity::Warning,
		LintLevel::Deny => Severity::Error,
	};
	Diagnostic {
		severity,
		code: ToolCode::Lint(raw.rule),
		file: file.map(Path::to_path_buf),
		line: raw.line.max(1),
		column: raw.column.max(1),
		message: raw.message,
	}
}

/// Packages a recovered analyzer fault as one synthetic error record.
pub fn internal_error(message: impl Into<String>, file: Option<PathBuf>) -> Diagnostic {
	Diagnostic {
		severity: Severity::Error,
		code: ToolCode::Internal,
		file,
		line: 1,
		column: 1,
		message: message.into(),
	}
}
