use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum QuillError {
	#[error("invalid character {character:?} on line {line}")]
	#[diagnostic(
		code(quill::invalid_character),
		help("control characters (including tabs) and non-characters are not allowed in templates")
	)]
	InvalidCharacter { line: usize, character: char },

	#[error("parse error on line {line}: {message}")]
	#[diagnostic(code(quill::parse))]
	Parse { line: usize, message: String },

	#[error("unsupported source encoding: `{0}`")]
	#[diagnostic(
		code(quill::unsupported_encoding),
		help("templates must be UTF-8; change the `coding:` pragma to `utf-8`")
	)]
	UnsupportedEncoding(String),

	#[error("failed to evaluate `{code}`: {reason}")]
	#[diagnostic(code(quill::evaluation))]
	Evaluation { code: String, reason: String },

	#[error("failed to parse compile options: {0}")]
	#[diagnostic(
		code(quill::config_parse),
		help("supported keys: indent_width, base_indent")
	)]
	ConfigParse(String),
}

impl QuillError {
	/// Shorthand for a [`QuillError::Parse`] at the given line.
	pub fn parse(line: usize, message: impl Into<String>) -> Self {
		Self::Parse {
			line,
			message: message.into(),
		}
	}

	/// The 1-based source line the error points at, when there is one.
	pub fn line(&self) -> Option<usize> {
		match self {
			Self::InvalidCharacter { line, .. } | Self::Parse { line, .. } => Some(*line),
			_ => None,
		}
	}
}

pub type QuillResult<T> = Result<T, QuillError>;
