use serde::Deserialize;
use serde::Serialize;

use crate::QuillError;
use crate::QuillResult;

/// Default number of spaces emitted per nesting level.
pub const DEFAULT_INDENT_WIDTH: usize = 2;

/// Options that shape compilation and the rendered output.
///
/// Options can be loaded from TOML held in memory:
///
/// ```toml
/// indent_width = 4
/// base_indent = 1
/// ```
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CompileOptions {
	/// Spaces per nesting level in the rendered document.
	pub indent_width: usize,
	/// Number of nesting levels every rendered line starts at. Useful when
	/// the output is spliced into an already indented document.
	pub base_indent: usize,
}

impl Default for CompileOptions {
	fn default() -> Self {
		Self {
			indent_width: DEFAULT_INDENT_WIDTH,
			base_indent: 0,
		}
	}
}

impl CompileOptions {
	/// Parse options from a TOML document. Missing keys keep their defaults.
	pub fn from_toml_str(content: &str) -> QuillResult<Self> {
		toml::from_str(content).map_err(|e| QuillError::ConfigParse(e.to_string()))
	}

	pub fn with_indent_width(mut self, indent_width: usize) -> Self {
		self.indent_width = indent_width;
		self
	}

	pub fn with_base_indent(mut self, base_indent: usize) -> Self {
		self.base_indent = base_indent;
		self
	}

	/// Column the executor starts every line at.
	pub(crate) fn base_column(&self) -> usize {
		self.base_indent * self.indent_width
	}
}
