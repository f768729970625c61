//! The uniform diagnostic record all producers normalize into.

use std::fmt;
use std::path::PathBuf;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Severity of a normalized diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
	/// The analyzed source is considered broken.
	Error,
	/// The analyzed source is suspicious but usable.
	Warning,
}

/// Originating tool code of a diagnostic.
///
/// Type-checker codes are numeric, lint rule identifiers are strings, and
/// analyzer faults recovered inside a worker carry the synthetic
/// [`ToolCode::Internal`] code so they remain recognizable downstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ToolCode {
	/// Numeric code from the type-checker.
	Check(u32),
	/// Lint rule identifier.
	Lint(String),
	/// Synthetic code for a fault recovered inside a worker.
	Internal,
}

/// Wire representation of [`ToolCode::Internal`].
const INTERNAL_CODE: &str = "VIGIL-INTERNAL";

impl ToolCode {
	/// Returns true for the synthetic internal-error code.
	pub const fn is_internal(&self) -> bool {
		matches!(self, Self::Internal)
	}
}

impl fmt::Display for ToolCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Check(code) => write!(f, "{code}"),
			Self::Lint(rule) => f.write_str(rule),
			Self::Internal => f.write_str(INTERNAL_CODE),
		}
	}
}

impl Serialize for ToolCode {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		match self {
			Self::Check(code) => serializer.serialize_u32(*code),
			Self::Lint(rule) => serializer.serialize_str(rule),
			Self::Internal => serializer.serialize_str(INTERNAL_CODE),
		}
	}
}

impl<'de> Deserialize<'de> for ToolCode {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		#[derive(Deserialize)]
		#[serde(untagged)]
		enum Repr {
			Number(u64),
			Name(String),
		}

		match Repr::deserialize(deserializer)? {
			Repr::Number(code) => {
				let code = u32::try_from(code)
					.map_err(|_| D::Error::custom("diagnostic code out of range"))?;
				Ok(Self::Check(code))
			}
			Repr::Name(name) if name == INTERNAL_CODE => Ok(Self::Internal),
			Repr::Name(name) => Ok(Self::Lint(name)),
		}
	}
}

/// One normalized diagnostic or lint record.
///
/// `file` is absent for project-wide records (for example a broken analyzer
/// configuration). `line` and `column` are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
	/// Record severity.
	pub severity: Severity,
	/// Originating tool code.
	pub code: ToolCode,
	/// Source file, absent for project-wide records.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub file: Option<PathBuf>,
	/// 1-based line.
	pub line: u32,
	/// 1-based column.
	pub column: u32,
	/// Free-text message.
	pub message: String,
}
