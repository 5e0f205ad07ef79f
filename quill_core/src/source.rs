use std::collections::VecDeque;
use std::sync::LazyLock;

use regex::Regex;

use crate::QuillError;
use crate::QuillResult;

/// A first line like `// -*- coding: utf-8 -*-` or `-# coding=utf-8`.
static CODING_PRAGMA: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"^[ \t]*(?://|-#).*?coding[:=][ \t]*([-\w.]+)").expect("coding pragma pattern")
});

/// Code points rejected anywhere in a template: C0 controls other than the
/// newline, most C1 controls, and the non-characters.
static DISALLOWED: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"[\x00-\x09\x0B-\x1F\x7F-\x84\x86-\x9F\x{FDD0}-\x{FDEF}\x{FFFE}\x{FFFF}]")
		.expect("disallowed character pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceEncoding {
	Utf8,
	Ascii,
}

/// Peekable, pushable reader over the lines and characters of a template.
///
/// Lines are handed out without their trailing newline. Characters are read
/// from the current line, which always ends in `\n`, so `get_char` observes
/// line breaks while `get_line` returns whatever is left of the current line.
#[derive(Debug, Clone, Default)]
pub struct SourceStream {
	/// Lines not yet touched, tagged with their 1-based line number.
	lines: VecDeque<(usize, String)>,
	/// Unread characters of the line being consumed, including its `\n`.
	current: VecDeque<char>,
	/// Line number of `current`.
	current_line: usize,
}

impl SourceStream {
	/// Build a stream over already decoded text.
	///
	/// Line endings are normalized, an optional coding pragma on the first
	/// line is validated and dropped, and the whole text is checked for
	/// disallowed characters before anything can be read.
	pub fn new(source: &str) -> QuillResult<Self> {
		let text = normalize_newlines(source);

		let first = text.lines().next().unwrap_or_default();
		if let Some(encoding) = coding_pragma(first) {
			resolve_encoding(encoding)?;
			let body = text.split_once('\n').map_or("", |(_, rest)| rest);
			return Self::from_lines(body, 2);
		}

		Self::from_lines(&text, 1)
	}

	/// Build a stream over raw bytes, decoding them with the encoding named
	/// by a first-line coding pragma or UTF-8 when there is none.
	pub fn from_bytes(bytes: &[u8]) -> QuillResult<Self> {
		let first_len = bytes
			.iter()
			.position(|byte| *byte == b'\n')
			.map_or(bytes.len(), |index| index + 1);
		let (first, rest) = bytes.split_at(first_len);

		if let Some(encoding) = std::str::from_utf8(first).ok().and_then(coding_pragma) {
			let encoding = resolve_encoding(encoding)?;
			let text = decode(rest, encoding, 2)?;
			return Self::from_lines(&normalize_newlines(&text), 2);
		}

		let text = decode(bytes, SourceEncoding::Utf8, 1)?;
		Self::from_lines(&normalize_newlines(&text), 1)
	}

	fn from_lines(text: &str, first_line: usize) -> QuillResult<Self> {
		validate(text, first_line)?;

		let lines = text
			.lines()
			.enumerate()
			.map(|(index, line)| (first_line + index, line.to_string()))
			.collect();

		Ok(Self {
			lines,
			current: VecDeque::new(),
			current_line: first_line,
		})
	}

	/// Move the next untouched line into `current` if it is exhausted.
	fn fill(&mut self) {
		if !self.current.is_empty() {
			return;
		}

		if let Some((number, line)) = self.lines.pop_front() {
			self.current_line = number;
			self.current.extend(line.chars());
			self.current.push_back('\n');
		}
	}

	/// Park the unread part of the current line back in the line buffer.
	fn fold_current(&mut self) {
		if self.current.is_empty() {
			return;
		}

		let pending: String = self.current.drain(..).collect();
		let pending = pending.strip_suffix('\n').unwrap_or(&pending).to_string();
		self.lines.push_front((self.current_line, pending));
	}

	pub fn get_char(&mut self) -> Option<char> {
		self.fill();
		self.current.pop_front()
	}

	pub fn peek_char(&mut self) -> Option<char> {
		self.fill();
		self.current.front().copied()
	}

	/// Return the rest of the current line, or the next line when the current
	/// one has been fully consumed.
	pub fn get_line(&mut self) -> Option<String> {
		if self.current.is_empty() {
			let (number, line) = self.lines.pop_front()?;
			self.current_line = number;
			return Some(line);
		}

		let mut line: String = self.current.drain(..).collect();
		if line.ends_with('\n') {
			line.pop();
		}
		Some(line)
	}

	pub fn peek_line(&self) -> Option<String> {
		if self.current.is_empty() {
			return self.lines.front().map(|(_, line)| line.clone());
		}

		let mut line: String = self.current.iter().collect();
		if line.ends_with('\n') {
			line.pop();
		}
		Some(line)
	}

	/// Push a character back so it is the next one read.
	///
	/// Pushing a newline splits the stream: whatever was left of the current
	/// line becomes the following line, and the newline ends an empty one.
	/// Any other character pushed after a whole line was consumed starts a
	/// line of its own.
	pub fn push_char(&mut self, character: char) {
		if character == '\n' {
			self.fold_current();
			self.current.push_back('\n');
			return;
		}

		if self.current.is_empty() {
			self.current.push_back('\n');
		}
		self.current.push_front(character);
	}

	/// Push a whole line back so it is the next one read.
	pub fn push_line(&mut self, line: String) {
		self.fold_current();
		let number = self
			.lines
			.front()
			.map_or(self.current_line, |(number, _)| number.saturating_sub(1).max(1));
		self.lines.push_front((number, line));
	}

	/// Line number of the next character or line to be read.
	pub fn line_number(&self) -> usize {
		if self.current.is_empty() {
			self.lines
				.front()
				.map_or(self.current_line, |(number, _)| *number)
		} else {
			self.current_line
		}
	}

	pub fn is_eof(&self) -> bool {
		self.current.is_empty() && self.lines.is_empty()
	}
}

fn normalize_newlines(source: &str) -> String {
	if source.contains('\r') {
		source.replace("\r\n", "\n").replace('\r', "\n")
	} else {
		source.to_string()
	}
}

fn coding_pragma(line: &str) -> Option<&str> {
	CODING_PRAGMA
		.captures(line)
		.and_then(|captures| captures.get(1))
		.map(|name| name.as_str())
}

/// Lowercase an encoding label and drop its separators, so `UTF-8`,
/// `utf_8` and `utf8` compare equal.
pub(crate) fn normalize_encoding_label(name: &str) -> String {
	name.chars()
		.filter(|c| !matches!(c, '-' | '_'))
		.collect::<String>()
		.to_ascii_lowercase()
}

fn resolve_encoding(name: &str) -> QuillResult<SourceEncoding> {
	match normalize_encoding_label(name).as_str() {
		"utf8" => Ok(SourceEncoding::Utf8),
		"ascii" | "usascii" => Ok(SourceEncoding::Ascii),
		_ => Err(QuillError::UnsupportedEncoding(name.to_string())),
	}
}

fn decode(bytes: &[u8], encoding: SourceEncoding, first_line: usize) -> QuillResult<String> {
	let line_of = |offset: usize| {
		first_line + bytes[..offset].iter().filter(|byte| **byte == b'\n').count()
	};

	if encoding == SourceEncoding::Ascii {
		if let Some(offset) = bytes.iter().position(|byte| !byte.is_ascii()) {
			return Err(QuillError::InvalidCharacter {
				line: line_of(offset),
				character: char::REPLACEMENT_CHARACTER,
			});
		}
	}

	String::from_utf8(bytes.to_vec()).map_err(|e| {
		QuillError::InvalidCharacter {
			line: line_of(e.utf8_error().valid_up_to()),
			character: char::REPLACEMENT_CHARACTER,
		}
	})
}

/// Reject the first disallowed character anywhere in the text.
fn validate(text: &str, first_line: usize) -> QuillResult<()> {
	for (index, line) in text.lines().enumerate() {
		if let Some(found) = DISALLOWED.find(line) {
			return Err(QuillError::InvalidCharacter {
				line: first_line + index,
				character: found.as_str().chars().next().unwrap_or_default(),
			});
		}
	}

	Ok(())
}
