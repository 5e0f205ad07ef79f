use std::fmt::Display;

/// A single unit produced by the tokenizer. Each variant carries only the
/// payload that is valid for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
	/// `%tag`, or the implied `field` tag of a shortcut line.
	ElementName(String),
	/// `name="value"`, `name=value`, a flag attribute or a shortcut.
	StringAttribute { name: String, value: String },
	/// ``name=`code` ``
	CodeAttribute { name: String, code: String },
	/// A `/` closing the attribute list.
	SelfClose,
	/// Literal text after `:` on an element line.
	StringData(String),
	/// `= code`, `&= code` or `!= code` after `:` on an element line.
	CodeData { code: String, escape: bool },
	/// A literal content line.
	Content(String),
	/// A content line starting with `=`, `&=` or `!=`.
	CodeContent { code: String, escape: bool },
	/// A `//` comment block, one entry per line.
	Comment(Vec<String>),
	/// `!!! kind`, followed by its attributes as `StringAttribute` tokens.
	Meta { kind: String },
	/// `:name` and the verbatim lines of its body.
	Filter { name: String, lines: Vec<String> },
	/// `- code`
	RawCode(String),
	Indent,
	Dedent,
	/// One or more consecutive blank lines.
	BlankLine,
}

impl Token {
	/// Whether the payload must pass through the escaping policy before it
	/// is emitted.
	pub fn escape_required(&self) -> bool {
		match self {
			Token::StringAttribute { .. }
			| Token::StringData(_)
			| Token::Content(_)
			| Token::Comment(_) => true,
			Token::CodeData { escape, .. } | Token::CodeContent { escape, .. } => *escape,
			_ => false,
		}
	}

	/// Short human readable name used in error messages.
	pub fn kind(&self) -> &'static str {
		match self {
			Token::ElementName(_) => "element",
			Token::StringAttribute { .. } | Token::CodeAttribute { .. } => "attribute",
			Token::SelfClose => "self-close marker",
			Token::StringData(_) | Token::CodeData { .. } => "inline data",
			Token::Content(_) | Token::CodeContent { .. } => "content",
			Token::Comment(_) => "comment",
			Token::Meta { .. } => "meta directive",
			Token::Filter { .. } => "filter",
			Token::RawCode(_) => "raw code",
			Token::Indent => "indent",
			Token::Dedent => "dedent",
			Token::BlankLine => "blank line",
		}
	}
}

impl Display for Token {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Token::ElementName(tag) => write!(f, "%{tag}"),
			Token::StringAttribute { name, value } => write!(f, "{name}={value:?}"),
			Token::CodeAttribute { name, code } => write!(f, "{name}=`{code}`"),
			Token::SelfClose => write!(f, "/"),
			Token::StringData(text) => write!(f, ": {text}"),
			Token::CodeData { code, escape } => {
				write!(f, ": {}= {code}", if *escape { "" } else { "!" })
			}
			Token::Content(text) => write!(f, "{text}"),
			Token::CodeContent { code, escape } => {
				write!(f, "{}= {code}", if *escape { "" } else { "!" })
			}
			Token::Comment(lines) => write!(f, "// {}", lines.join(" / ")),
			Token::Meta { kind } => write!(f, "!!! {kind}"),
			Token::Filter { name, lines } => write!(f, ":{name} ({} lines)", lines.len()),
			Token::RawCode(code) => write!(f, "- {code}"),
			Token::Indent => write!(f, "<indent>"),
			Token::Dedent => write!(f, "<dedent>"),
			Token::BlankLine => write!(f, "<blank>"),
		}
	}
}

/// A token together with the 1-based line it starts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexeme {
	pub token: Token,
	pub line: usize,
}

impl Lexeme {
	pub fn new(token: Token, line: usize) -> Self {
		Self { token, line }
	}
}
