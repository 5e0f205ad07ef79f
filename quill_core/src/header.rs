use logos::Logos;
use snailquote::unescape;

use crate::QuillError;
use crate::QuillResult;
use crate::escape::EscapeProfile;
use crate::escape::lookup_profile;
use crate::source::normalize_encoding_label;

/// Header kind used by a bare `!!!`.
pub const DEFAULT_HEADER_KIND: &str = "xml";

/// The only encoding a document may declare.
pub const UTF8_LABEL: &str = "utf-8";

/// Raw tokens of a `!!!` directive line.
#[derive(Logos, Debug, PartialEq)]
#[logos(skip r"[ ]+")]
enum DirectiveToken {
	#[token("!!!")]
	Directive,
	#[token("=")]
	Equals,
	#[regex(r"[a-zA-Z_][a-zA-Z0-9_.:-]*")]
	Ident,
	#[regex(r#""([^"\\]|\\.)*""#)]
	DoubleQuotedString,
	#[regex(r"'([^'\\]|\\.)*'")]
	SingleQuotedString,
}

/// The pieces of a directive line before they are checked against a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
	pub kind: String,
	pub attributes: Vec<(String, String)>,
}

/// Split a `!!! kind name="value" ...` line into its kind and attributes.
pub fn lex_directive(line: &str, line_number: usize) -> QuillResult<Directive> {
	let malformed = |detail: &str| {
		QuillError::parse(line_number, format!("malformed meta directive: {detail}"))
	};

	let tokens: Vec<_> = DirectiveToken::lexer(line)
		.spanned()
		.map(|(result, span)| (result, &line[span]))
		.collect();
	let mut iter = tokens.into_iter().peekable();

	match iter.next() {
		Some((Ok(DirectiveToken::Directive), _)) => {}
		_ => return Err(malformed("expected `!!!`")),
	}

	let mut kind = DEFAULT_HEADER_KIND.to_string();
	let mut attributes = Vec::new();

	// A leading identifier that is not followed by `=` names the kind.
	if let Some((Ok(DirectiveToken::Ident), slice)) = iter.peek() {
		let slice = *slice;
		iter.next();
		if matches!(iter.peek(), Some((Ok(DirectiveToken::Equals), _))) {
			iter.next();
			let value = read_value(iter.next(), &malformed)?;
			attributes.push((slice.to_string(), value));
		} else {
			kind = slice.to_string();
		}
	}

	while let Some((result, slice)) = iter.next() {
		let Ok(DirectiveToken::Ident) = result else {
			return Err(malformed(&format!("unexpected `{slice}`")));
		};

		let Some((Ok(DirectiveToken::Equals), _)) = iter.next() else {
			return Err(malformed(&format!("attribute `{slice}` needs a quoted value")));
		};

		let value = read_value(iter.next(), &malformed)?;
		attributes.push((slice.to_string(), value));
	}

	Ok(Directive { kind, attributes })
}

fn read_value(
	token: Option<(Result<DirectiveToken, ()>, &str)>,
	malformed: &impl Fn(&str) -> QuillError,
) -> QuillResult<String> {
	match token {
		Some((Ok(DirectiveToken::DoubleQuotedString | DirectiveToken::SingleQuotedString), slice)) => {
			let inner = &slice[1..slice.len() - 1];
			if inner.contains('\\') {
				unescape(inner).map_err(|_| malformed("invalid escape sequence"))
			} else {
				Ok(inner.to_string())
			}
		}
		_ => Err(malformed("expected a quoted value")),
	}
}

/// A markup declaration emitted before the document body, e.g.
/// `<?xml version="1.0" encoding="utf-8"?>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupHeader {
	pub kind: String,
	pub version_key: String,
	pub encoding: String,
	/// Attributes in output order. Always contains the version and encoding.
	pub attributes: Vec<(String, String)>,
}

impl MarkupHeader {
	/// Check a directive against the profile registry and fill in the
	/// implicit version and encoding.
	pub fn from_directive(
		directive: Directive,
		line: usize,
	) -> QuillResult<(Self, &'static EscapeProfile)> {
		let Some(profile) = lookup_profile(&directive.kind) else {
			return Err(QuillError::parse(
				line,
				format!("unknown markup header kind `{}`", directive.kind),
			));
		};

		let mut attributes = directive.attributes;

		let encoding = match attributes.iter().find(|(name, _)| name == "encoding") {
			Some((_, value)) if normalize_encoding_label(value) == "utf8" => value.clone(),
			Some((_, value)) => {
				return Err(QuillError::parse(
					line,
					format!("header encoding `{value}` is not supported, only UTF-8 output is"),
				));
			}
			None => {
				attributes.push(("encoding".to_string(), UTF8_LABEL.to_string()));
				UTF8_LABEL.to_string()
			}
		};

		if !attributes.iter().any(|(name, _)| name == profile.version_key) {
			attributes.insert(
				0,
				(
					profile.version_key.to_string(),
					profile.default_version.to_string(),
				),
			);
		}

		let header = Self {
			kind: profile.kind.to_string(),
			version_key: profile.version_key.to_string(),
			encoding,
			attributes,
		};

		Ok((header, profile))
	}

	pub fn version(&self) -> Option<&str> {
		self.attributes
			.iter()
			.find(|(name, _)| *name == self.version_key)
			.map(|(_, value)| value.as_str())
	}

	/// The declaration line, written exactly as declared.
	pub fn render(&self) -> String {
		let mut line = format!("<?{}", self.kind);
		for (name, value) in &self.attributes {
			line.push_str(&format!(" {name}=\"{value}\""));
		}
		line.push_str("?>");
		line
	}
}
