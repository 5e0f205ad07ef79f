use std::cmp::Ordering;
use std::collections::VecDeque;

use crate::QuillError;
use crate::QuillResult;
use crate::header::lex_directive;
use crate::indent::IndentTracker;
use crate::source::SourceStream;
use crate::tokens::Lexeme;
use crate::tokens::Token;

/// Tag given to elements introduced by a shortcut character.
pub const IMPLICIT_TAG: &str = "field";

/// Context states for the state machine that drives tokenization. Only the
/// top of the stack is acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexerContext {
	/// At the start of a line, looking for the next construct.
	Scanning,
	/// Comparing the line's leading whitespace with the open levels.
	Indentation,
	/// Collecting the attributes that follow an element name.
	ElementPieces,
	/// Collecting the inline data after `:`.
	Data,
	/// Capturing the verbatim body of a filter.
	FilterBody,
}

/// A filter header waiting for its body to be captured.
#[derive(Debug)]
struct PendingFilter {
	name: String,
	line: usize,
	width: usize,
}

/// Attribute name implied by a shortcut character.
pub fn shortcut_attribute(shortcut: char) -> Option<&'static str> {
	match shortcut {
		'@' => Some("name"),
		'.' => Some("class"),
		'#' => Some("id"),
		'$' => Some("string"),
		_ => None,
	}
}

/// Lazy, single pass tokenizer over a [`SourceStream`].
///
/// Each call to `next` yields at most one token; when several levels close
/// at once the `Dedent` tokens are handed out one call at a time. After an
/// error the tokenizer is exhausted.
#[derive(Debug)]
pub struct Tokenizer {
	stream: SourceStream,
	indents: IndentTracker,
	stack: Vec<LexerContext>,
	queue: VecDeque<Lexeme>,
	pending_dedents: usize,
	dedent_line: usize,
	pending_blank: bool,
	pending_filter: Option<PendingFilter>,
	paren_depth: usize,
	emitted: bool,
	finished: bool,
}

impl Tokenizer {
	pub fn new(stream: SourceStream) -> Self {
		Self {
			stream,
			indents: IndentTracker::default(),
			stack: vec![LexerContext::Scanning],
			queue: VecDeque::new(),
			pending_dedents: 0,
			dedent_line: 0,
			pending_blank: false,
			pending_filter: None,
			paren_depth: 0,
			emitted: false,
			finished: false,
		}
	}

	fn emit(&mut self, token: Token, line: usize) {
		self.queue.push_back(Lexeme::new(token, line));
		self.emitted = true;
	}

	fn ready(&mut self) -> Option<Lexeme> {
		if self.pending_dedents > 0 {
			self.pending_dedents -= 1;
			return Some(Lexeme::new(Token::Dedent, self.dedent_line));
		}

		self.queue.pop_front()
	}

	fn step(&mut self) -> QuillResult<()> {
		match self.stack.last() {
			Some(LexerContext::Scanning) | None => self.scan(),
			Some(LexerContext::Indentation) => self.indentation(),
			Some(LexerContext::ElementPieces) => self.element_pieces(),
			Some(LexerContext::Data) => self.data(),
			Some(LexerContext::FilterBody) => self.filter_body(),
		}
	}

	fn scan(&mut self) -> QuillResult<()> {
		let Some(line) = self.stream.peek_line() else {
			self.dedent_line = self.stream.line_number();
			self.pending_dedents += self.indents.dedent_to(0).unwrap_or_default();
			self.finished = true;
			return Ok(());
		};

		if line.trim().is_empty() {
			self.stream.get_line();
			if self.emitted {
				self.pending_blank = true;
			}
			return Ok(());
		}

		self.stack.push(LexerContext::Indentation);
		Ok(())
	}

	fn indentation(&mut self) -> QuillResult<()> {
		self.stack.pop();

		let line = self.stream.line_number();
		let text = self.stream.peek_line().unwrap_or_default();
		let width = leading_width(&text);

		match self.indents.compare(width) {
			Ordering::Greater => {
				self.indents.push(width);
				self.emit(Token::Indent, line);
			}
			Ordering::Less => {
				let Some(closed) = self.indents.dedent_to(width) else {
					return Err(QuillError::parse(
						line,
						format!(
							"inconsistent indentation: {width} spaces does not match any enclosing \
							 level"
						),
					));
				};
				self.pending_dedents += closed;
				self.dedent_line = line;
			}
			Ordering::Equal => {}
		}

		if std::mem::take(&mut self.pending_blank) {
			self.emit(Token::BlankLine, line);
		}

		for _ in 0..width {
			self.stream.get_char();
		}

		self.dispatch(&text[width..], width, line)
	}

	/// Pick the construct from the first characters of an unindented line.
	fn dispatch(&mut self, rest: &str, width: usize, line: usize) -> QuillResult<()> {
		let mut chars = rest.chars();

		match (chars.next(), chars.next()) {
			(Some('%'), _) => {
				self.stream.get_char();
				let tag = self.read_name("element")?;
				self.start_element(tag, line)
			}
			(Some('.' | '#' | '@' | '$'), _) => self.start_element(IMPLICIT_TAG.to_string(), line),
			(Some('/'), Some('/')) => self.comment(width, line),
			(Some('!'), Some('!')) if rest.starts_with("!!!") => self.meta(line),
			(Some('!' | '&'), Some('=')) | (Some('='), _) => {
				let text = self.stream.get_line().unwrap_or_default();
				let token = code_or_text(text.trim(), line, |code, escape| {
					Token::CodeContent { code, escape }
				})?;
				self.emit(token, line);
				Ok(())
			}
			(Some(':'), _) => self.filter_header(width, line),
			(Some('-'), _) => {
				let text = self.stream.get_line().unwrap_or_default();
				let code = text[1..].trim();
				if code.is_empty() {
					return Err(QuillError::parse(line, "missing code after `-`"));
				}
				self.emit(Token::RawCode(code.to_string()), line);
				Ok(())
			}
			(Some('\\'), _) => {
				let text = self.stream.get_line().unwrap_or_default();
				self.emit(Token::Content(text[1..].trim_end().to_string()), line);
				Ok(())
			}
			_ => {
				let text = self.stream.get_line().unwrap_or_default();
				self.emit(Token::Content(text.trim_end().to_string()), line);
				Ok(())
			}
		}
	}

	fn start_element(&mut self, tag: String, line: usize) -> QuillResult<()> {
		self.emit(Token::ElementName(tag), line);

		while let Some(shortcut) = self.stream.peek_char() {
			let Some(name) = shortcut_attribute(shortcut) else {
				break;
			};
			self.stream.get_char();
			let value = self.read_shortcut_value(shortcut)?;
			self.emit(
				Token::StringAttribute {
					name: name.to_string(),
					value,
				},
				line,
			);
		}

		self.paren_depth = 0;
		self.stack.push(LexerContext::ElementPieces);
		Ok(())
	}

	/// Read an element or attribute name, leaving the character after it
	/// unread.
	fn read_name(&mut self, what: &str) -> QuillResult<String> {
		let line = self.stream.line_number();

		match self.stream.peek_char() {
			Some(c) if is_name_start(c) => {}
			Some(c) if c.is_ascii_digit() || c == '-' || c == '.' => {
				return Err(QuillError::parse(
					line,
					format!("{what} name cannot start with `{c}`"),
				));
			}
			_ => return Err(QuillError::parse(line, format!("expected {what} name"))),
		}

		let mut name = String::new();
		while let Some(c) = self.stream.get_char() {
			if is_name_char(c) {
				name.push(c);
			} else {
				self.stream.push_char(c);
				break;
			}
		}

		Ok(name)
	}

	fn read_shortcut_value(&mut self, shortcut: char) -> QuillResult<String> {
		let line = self.stream.line_number();
		let mut value = String::new();

		while let Some(c) = self.stream.get_char() {
			if is_name_char(c) {
				value.push(c);
			} else {
				self.stream.push_char(c);
				break;
			}
		}

		match self.stream.peek_char() {
			Some('"' | '\'' | '`') => {
				return Err(QuillError::parse(
					line,
					format!("the `{shortcut}` shortcut cannot take a quoted value"),
				));
			}
			Some('=') => {
				return Err(QuillError::parse(
					line,
					format!("the `{shortcut}` shortcut cannot be assigned a value"),
				));
			}
			_ => {}
		}

		if value.is_empty() {
			return Err(QuillError::parse(
				line,
				format!("missing value after the `{shortcut}` shortcut"),
			));
		}

		if shortcut == '$' {
			value = value.replace('_', " ");
		}

		Ok(value)
	}

	/// Consume one piece of an element's attribute list.
	fn element_pieces(&mut self) -> QuillResult<()> {
		let line = self.stream.line_number();

		let Some(c) = self.stream.peek_char() else {
			if self.paren_depth > 0 {
				return Err(QuillError::parse(line, "unmatched `(` in attribute list"));
			}
			self.stack.pop();
			return Ok(());
		};

		match c {
			'\n' => {
				self.stream.get_char();
				if self.paren_depth == 0 {
					self.stack.pop();
				}
			}
			' ' => {
				self.stream.get_char();
			}
			'(' => {
				self.stream.get_char();
				self.paren_depth += 1;
			}
			')' => {
				self.stream.get_char();
				if self.paren_depth == 0 {
					return Err(QuillError::parse(line, "unmatched `)` in attribute list"));
				}
				self.paren_depth -= 1;
			}
			'\\' => {
				self.stream.get_char();
				if self.stream.get_char() != Some('\n') {
					return Err(QuillError::parse(
						line,
						"a `\\` in an attribute list must end the line",
					));
				}
			}
			':' => {
				if self.paren_depth > 0 {
					return Err(QuillError::parse(line, "unmatched `(` before inline data"));
				}
				self.stream.get_char();
				self.stack.pop();
				self.stack.push(LexerContext::Data);
			}
			'/' => {
				if self.paren_depth > 0 {
					return Err(QuillError::parse(line, "unmatched `(` before `/`"));
				}
				self.stream.get_char();
				self.emit(Token::SelfClose, line);
				let rest = self.stream.get_line().unwrap_or_default();
				let rest = rest.trim();
				if !rest.is_empty() {
					self.emit(Token::Content(rest.to_string()), line);
				}
				self.stack.pop();
			}
			c if is_name_start(c) => self.attribute(line)?,
			c if c.is_ascii_digit() || c == '-' || c == '.' => {
				return Err(QuillError::parse(
					line,
					format!("attribute name cannot start with `{c}`"),
				));
			}
			other => {
				return Err(QuillError::parse(
					line,
					format!("unexpected character `{other}` in attribute list"),
				));
			}
		}

		Ok(())
	}

	fn attribute(&mut self, line: usize) -> QuillResult<()> {
		let name = self.read_name("attribute")?;

		if self.stream.peek_char() != Some('=') {
			let value = name.clone();
			self.emit(Token::StringAttribute { name, value }, line);
			return Ok(());
		}
		self.stream.get_char();

		let token = match self.stream.peek_char() {
			Some(quote @ ('"' | '\'')) => {
				self.stream.get_char();
				let value = self.read_quoted(quote, line)?;
				Token::StringAttribute { name, value }
			}
			Some('`') => {
				self.stream.get_char();
				let code = self.read_quoted('`', line)?;
				Token::CodeAttribute { name, code }
			}
			_ => {
				let value = self.read_bare();
				if value.is_empty() {
					return Err(QuillError::parse(
						line,
						format!("missing value for attribute `{name}`"),
					));
				}
				Token::StringAttribute { name, value }
			}
		};

		self.emit(token, line);
		Ok(())
	}

	/// Read a quoted value whose opening quote was already consumed, then
	/// check the character that follows it.
	fn read_quoted(&mut self, quote: char, line: usize) -> QuillResult<String> {
		let mut value = String::new();

		loop {
			match self.stream.get_char() {
				None => {
					return Err(QuillError::parse(line, "unterminated quoted value"));
				}
				Some('\\') => {
					match self.stream.get_char() {
						Some('\n') => self.fold_newline(&mut value),
						Some(c) => value.push(c),
						None => {
							return Err(QuillError::parse(line, "unterminated quoted value"));
						}
					}
				}
				Some('\n') => {
					if self.paren_depth == 0 {
						return Err(QuillError::parse(
							line,
							"newline inside a quoted value; wrap the attribute list in parentheses \
							 to continue it",
						));
					}
					self.fold_newline(&mut value);
				}
				Some(c) if c == quote => break,
				Some(c) => value.push(c),
			}
		}

		match self.stream.peek_char() {
			Some(c) if c == quote => {
				Err(QuillError::parse(
					self.stream.line_number(),
					format!("unescaped `{quote}` inside a quoted value"),
				))
			}
			None | Some(' ' | '\n' | '(' | ')' | ':' | '/' | '\\') => Ok(value),
			Some(c) => {
				Err(QuillError::parse(
					self.stream.line_number(),
					format!("invalid character `{c}` after attribute value"),
				))
			}
		}
	}

	/// Replace a line break inside a value with one space, dropping the
	/// next line's indentation.
	fn fold_newline(&mut self, value: &mut String) {
		value.push(' ');
		while self.stream.peek_char() == Some(' ') {
			self.stream.get_char();
		}
	}

	fn read_bare(&mut self) -> String {
		let mut value = String::new();

		while let Some(c) = self.stream.get_char() {
			if matches!(c, ' ' | '\n' | '(' | ')' | ':' | '/') {
				self.stream.push_char(c);
				break;
			}
			value.push(c);
		}

		value
	}

	fn data(&mut self) -> QuillResult<()> {
		self.stack.pop();

		let line = self.stream.line_number();
		let rest = self.stream.get_line().unwrap_or_default();
		let rest = rest.trim();

		let token = match code_or_text(rest, line, |code, escape| Token::CodeData { code, escape })? {
			Token::Content(text) => Token::StringData(text),
			token => token,
		};
		self.emit(token, line);

		Ok(())
	}

	fn comment(&mut self, width: usize, line: usize) -> QuillResult<()> {
		let first = self.stream.get_line().unwrap_or_default();
		let mut lines = vec![strip_comment_marker(&first)];

		while let Some(next) = self.stream.get_line() {
			let next_width = leading_width(&next);
			let body = &next[next_width..];
			let continues = !body.is_empty()
				&& (next_width > width || (next_width == width && body.starts_with("//")));

			if !continues {
				self.stream.push_line(next);
				break;
			}

			if next_width == width {
				lines.push(strip_comment_marker(body));
			} else {
				lines.push(body.trim_end().to_string());
			}
		}

		self.emit(Token::Comment(lines), line);
		Ok(())
	}

	fn meta(&mut self, line: usize) -> QuillResult<()> {
		let text = self.stream.get_line().unwrap_or_default();
		let directive = lex_directive(&text, line)?;

		self.emit(
			Token::Meta {
				kind: directive.kind,
			},
			line,
		);
		for (name, value) in directive.attributes {
			self.emit(Token::StringAttribute { name, value }, line);
		}

		Ok(())
	}

	fn filter_header(&mut self, width: usize, line: usize) -> QuillResult<()> {
		let text = self.stream.get_line().unwrap_or_default();
		let name = text[1..].trim();

		if name.is_empty() {
			return Err(QuillError::parse(line, "missing filter name after `:`"));
		}

		self.pending_filter = Some(PendingFilter {
			name: name.to_string(),
			line,
			width,
		});
		self.stack.push(LexerContext::FilterBody);
		Ok(())
	}

	/// Capture every following line indented at least as deep as the first
	/// body line. Blank lines inside the body are kept.
	fn filter_body(&mut self) -> QuillResult<()> {
		self.stack.pop();

		let Some(filter) = self.pending_filter.take() else {
			return Ok(());
		};

		let mut lines = Vec::new();
		let mut blanks = 0;
		let mut body_width = None;

		while let Some(next) = self.stream.get_line() {
			let next_width = leading_width(&next);
			if next_width == next.len() {
				blanks += 1;
				continue;
			}

			if next_width < body_width.unwrap_or(filter.width + 1) {
				self.stream.push_line(next);
				break;
			}

			let width = *body_width.get_or_insert(next_width);
			lines.extend(std::iter::repeat_n(String::new(), blanks));
			blanks = 0;
			lines.push(next[width..].to_string());
		}

		self.emit(
			Token::Filter {
				name: filter.name,
				lines,
			},
			filter.line,
		);

		if blanks > 0 {
			self.pending_blank = true;
		}

		Ok(())
	}
}

impl Iterator for Tokenizer {
	type Item = QuillResult<Lexeme>;

	fn next(&mut self) -> Option<Self::Item> {
		loop {
			if let Some(lexeme) = self.ready() {
				return Some(Ok(lexeme));
			}

			if self.finished {
				return None;
			}

			if let Err(error) = self.step() {
				self.finished = true;
				self.queue.clear();
				self.pending_dedents = 0;
				return Some(Err(error));
			}
		}
	}
}

/// Tokenize a whole template.
pub fn tokenize(source: &str) -> QuillResult<Vec<Lexeme>> {
	Tokenizer::new(SourceStream::new(source)?).collect()
}

fn is_name_start(c: char) -> bool {
	c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
	c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn leading_width(line: &str) -> usize {
	line.len() - line.trim_start_matches(' ').len()
}

fn strip_comment_marker(line: &str) -> String {
	let line = line.trim_start();
	line.strip_prefix("//").unwrap_or(line).trim().to_string()
}

/// Split a payload into code (`=`, `&=`, `!=`) or literal text. Literal text
/// comes back as `Token::Content`.
fn code_or_text(
	text: &str,
	line: usize,
	code_token: impl FnOnce(String, bool) -> Token,
) -> QuillResult<Token> {
	let code = if let Some(code) = text.strip_prefix("!=") {
		Some((code, false))
	} else {
		text.strip_prefix("&=")
			.or_else(|| text.strip_prefix('='))
			.map(|code| (code, true))
	};

	let Some((code, escape)) = code else {
		return Ok(Token::Content(text.to_string()));
	};

	let code = code.trim();
	if code.is_empty() {
		return Err(QuillError::parse(line, "missing code after `=`"));
	}

	Ok(code_token(code.to_string(), escape))
}
