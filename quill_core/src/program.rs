use derive_more::Deref;
use derive_more::DerefMut;

use crate::QuillError;
use crate::QuillResult;
use crate::escape::DEFAULT_PROFILE;
use crate::escape::EscapeProfile;
use crate::header::Directive;
use crate::header::MarkupHeader;
use crate::tokens::Lexeme;
use crate::tokens::Token;

/// Name of the only filter. Each line of its body runs as raw code.
pub const CODE_FILTER: &str = "code";

/// Text that is either fixed at compile time or produced at render time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
	/// Literal text, already escaped.
	Text(String),
	/// Code handed to the evaluator. `escape` says whether its result goes
	/// through the escaping policy.
	Code { code: String, escape: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
	/// Literal value, already escaped.
	Literal(String),
	/// Code whose result is used without escaping.
	Code(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
	pub name: String,
	pub value: AttributeValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementBody {
	/// `<tag/>`
	Empty,
	/// `<tag>data</tag>` on a single line.
	Inline(Fragment),
}

/// Primitive render operations. Every operation emits whole lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
	/// A leaf element rendered on one line.
	Element {
		tag: String,
		attributes: Vec<Attribute>,
		body: ElementBody,
	},
	/// The opening line of an element with children. Nests one level deeper.
	OpenElement {
		tag: String,
		attributes: Vec<Attribute>,
	},
	/// Steps one level out and writes the closing tag.
	CloseElement { tag: String },
	Content(Fragment),
	/// Comment lines, already escaped.
	Comment(Vec<String>),
	Blank,
	RawCode(String),
}

/// The compiled, immutable form of a template.
#[derive(Debug, Clone)]
pub struct Program {
	pub instructions: Vec<Instruction>,
	profile: &'static EscapeProfile,
}

impl Program {
	/// The escaping profile applied to escaped code results at render time.
	pub fn profile(&self) -> &'static EscapeProfile {
		self.profile
	}
}

/// Value of an attribute before the element is sealed.
#[derive(Debug, Clone)]
enum PendingValue {
	Literal(String),
	Code(String),
}

#[derive(Debug)]
struct PendingElement {
	tag: String,
	attributes: Vec<(String, PendingValue)>,
	self_closed: bool,
	data: Option<Fragment>,
	line: usize,
}

#[derive(Debug)]
struct PendingMeta {
	kind: String,
	attributes: Vec<(String, String)>,
	line: usize,
}

/// A construct that is open and waiting for the event that closes it.
#[derive(Debug)]
enum Construct {
	/// An element whose attribute list may still grow.
	Element(PendingElement),
	/// An element whose children are being emitted.
	Block { tag: String, mirror_blank: bool },
	Comment(Vec<String>),
	Blank,
	Meta(PendingMeta),
}

/// The builder's record of open constructs, innermost last.
#[derive(Debug, Default, Deref, DerefMut)]
struct DepthStack(
	#[deref]
	#[deref_mut]
	Vec<Construct>,
);

/// Consumes tokens and emits the instruction list.
#[derive(Debug)]
struct ProgramBuilder {
	profile: &'static EscapeProfile,
	instructions: Vec<Instruction>,
	depth: DepthStack,
	header: Option<MarkupHeader>,
	seen_construct: bool,
	previous: Option<&'static str>,
	after_indent: bool,
}

impl ProgramBuilder {
	fn new() -> Self {
		Self {
			profile: DEFAULT_PROFILE,
			instructions: Vec::new(),
			depth: DepthStack::default(),
			header: None,
			seen_construct: false,
			previous: None,
			after_indent: false,
		}
	}

	fn push(&mut self, lexeme: Lexeme) -> QuillResult<()> {
		tracing::trace!(line = lexeme.line, token = %lexeme.token, "consume token");

		let Lexeme { token, line } = lexeme;
		let kind = token.kind();
		let structural = matches!(token, Token::Indent | Token::Dedent | Token::BlankLine);
		let after_indent = std::mem::replace(&mut self.after_indent, matches!(token, Token::Indent));

		match token {
			Token::StringAttribute { name, value } => {
				self.attribute(name, PendingValue::Literal(value), line)?;
			}
			Token::CodeAttribute { name, code } => {
				self.attribute(name, PendingValue::Code(code), line)?;
			}
			Token::SelfClose => {
				let Some(Construct::Element(element)) = self.depth.last_mut() else {
					return Err(QuillError::parse(line, "`/` outside of an element"));
				};
				element.self_closed = true;
			}
			Token::StringData(text) => {
				let text = self.profile.escape_text(&text).into_owned();
				self.data(Fragment::Text(text), line)?;
			}
			Token::CodeData { code, escape } => {
				self.data(Fragment::Code { code, escape }, line)?;
			}
			Token::Indent => self.indent(line)?,
			Token::Dedent => self.dedent(line)?,
			Token::BlankLine => self.blank(after_indent)?,
			Token::Comment(lines) => {
				if let Some(Construct::Comment(open)) = self.depth.last_mut() {
					open.extend(lines);
				} else {
					self.close_pending()?;
					self.depth.push(Construct::Comment(lines));
				}
			}
			Token::Meta { kind } => self.meta(kind, line)?,
			Token::ElementName(tag) => {
				self.close_pending()?;
				self.depth.push(Construct::Element(PendingElement {
					tag,
					attributes: Vec::new(),
					self_closed: false,
					data: None,
					line,
				}));
			}
			Token::Content(text) => {
				self.close_pending()?;
				let text = self.profile.escape_text(&text).into_owned();
				self.instructions
					.push(Instruction::Content(Fragment::Text(text)));
			}
			Token::CodeContent { code, escape } => {
				self.close_pending()?;
				self.instructions
					.push(Instruction::Content(Fragment::Code { code, escape }));
			}
			Token::RawCode(code) => {
				self.close_pending()?;
				self.instructions.push(Instruction::RawCode(code));
			}
			Token::Filter { name, lines } => {
				self.close_pending()?;
				if name != CODE_FILTER {
					return Err(QuillError::parse(line, format!("unknown filter `{name}`")));
				}
				self.instructions.extend(lines.into_iter().map(|line| {
					if line.is_empty() {
						Instruction::Blank
					} else {
						Instruction::RawCode(line)
					}
				}));
			}
		}

		if !structural {
			self.seen_construct = true;
		}
		self.previous = Some(kind);

		Ok(())
	}

	fn attribute(&mut self, name: String, value: PendingValue, line: usize) -> QuillResult<()> {
		match self.depth.last_mut() {
			Some(Construct::Element(element)) if element.data.is_none() => {
				element.attributes.push((name, value));
				Ok(())
			}
			Some(Construct::Meta(meta)) => {
				match value {
					PendingValue::Literal(value) => {
						meta.attributes.push((name, value));
						Ok(())
					}
					PendingValue::Code(_) => {
						Err(QuillError::parse(
							line,
							"meta directive attributes must be literal strings",
						))
					}
				}
			}
			_ => Err(QuillError::parse(line, "attribute outside of an element")),
		}
	}

	fn data(&mut self, fragment: Fragment, line: usize) -> QuillResult<()> {
		let Some(Construct::Element(element)) = self.depth.last_mut() else {
			return Err(QuillError::parse(line, "inline data outside of an element"));
		};

		element.data = Some(fragment);
		self.close_pending()
	}

	fn indent(&mut self, line: usize) -> QuillResult<()> {
		match self.depth.pop() {
			Some(Construct::Element(element)) if !element.self_closed => {
				let (tag, attributes) = self.seal(element)?;
				self.instructions.push(Instruction::OpenElement {
					tag: tag.clone(),
					attributes,
				});
				self.depth.push(Construct::Block {
					tag,
					mirror_blank: false,
				});
				Ok(())
			}
			Some(Construct::Element(_)) => {
				Err(QuillError::parse(
					line,
					"a self-closing element cannot contain nested lines",
				))
			}
			Some(Construct::Meta(_)) => {
				Err(QuillError::parse(
					line,
					"a meta directive cannot contain nested lines",
				))
			}
			_ => {
				let message = match self.previous {
					Some(kind) => format!("unexpected indentation after {kind}"),
					None => "unexpected indentation at the start of the document".to_string(),
				};
				Err(QuillError::parse(line, message))
			}
		}
	}

	fn dedent(&mut self, line: usize) -> QuillResult<()> {
		self.close_pending()?;

		match self.depth.pop() {
			Some(Construct::Block { tag, mirror_blank }) => {
				if mirror_blank {
					self.instructions.push(Instruction::Blank);
				}
				self.instructions.push(Instruction::CloseElement { tag });
				Ok(())
			}
			_ => Err(QuillError::parse(line, "dedent without an open element")),
		}
	}

	/// A blank line right after an indent is mirrored before the block's
	/// closing tag. Any other blank waits for the next sibling and is dropped
	/// at the end of the document.
	fn blank(&mut self, after_indent: bool) -> QuillResult<()> {
		self.close_pending()?;

		if !after_indent {
			self.depth.push(Construct::Blank);
			return Ok(());
		}

		if let Some(Construct::Block { mirror_blank, .. }) = self.depth.last_mut() {
			*mirror_blank = true;
		}
		self.instructions.push(Instruction::Blank);

		Ok(())
	}

	fn meta(&mut self, kind: String, line: usize) -> QuillResult<()> {
		if self
			.depth
			.iter()
			.any(|construct| matches!(construct, Construct::Block { .. }))
		{
			return Err(QuillError::parse(line, "nested meta directives are not allowed"));
		}

		if self.seen_construct {
			return Err(QuillError::parse(
				line,
				"a meta directive must be the first construct in the document",
			));
		}

		self.close_pending()?;
		self.depth.push(Construct::Meta(PendingMeta {
			kind,
			attributes: Vec::new(),
			line,
		}));

		Ok(())
	}

	/// Close the innermost construct unless it is an element with children.
	fn close_pending(&mut self) -> QuillResult<()> {
		match self.depth.pop() {
			Some(Construct::Element(mut element)) => {
				let body = element.data.take().map_or(ElementBody::Empty, ElementBody::Inline);
				let (tag, attributes) = self.seal(element)?;
				self.instructions.push(Instruction::Element {
					tag,
					attributes,
					body,
				});
			}
			Some(Construct::Comment(lines)) => {
				let lines = lines
					.iter()
					.map(|line| self.profile.escape_comment(line).into_owned())
					.collect();
				self.instructions.push(Instruction::Comment(lines));
			}
			Some(Construct::Blank) => self.instructions.push(Instruction::Blank),
			Some(Construct::Meta(meta)) => {
				let directive = Directive {
					kind: meta.kind,
					attributes: meta.attributes,
				};
				let (header, profile) = MarkupHeader::from_directive(directive, meta.line)?;
				tracing::debug!(kind = %header.kind, encoding = %header.encoding, "markup header");
				self.profile = profile;
				self.header = Some(header);
			}
			Some(block @ Construct::Block { .. }) => self.depth.push(block),
			None => {}
		}

		Ok(())
	}

	/// Freeze an element's attribute list. Literal `class` values are joined
	/// with a space; any other repeated name is an error.
	fn seal(&self, element: PendingElement) -> QuillResult<(String, Vec<Attribute>)> {
		let mut attributes: Vec<Attribute> = Vec::with_capacity(element.attributes.len());
		let mut classes: Option<(usize, Vec<String>)> = None;

		for (name, value) in element.attributes {
			if let (PendingValue::Literal(class), "class") = (&value, name.as_str()) {
				if let Some((_, values)) = classes.as_mut() {
					values.push(class.clone());
					continue;
				}
				classes = Some((attributes.len(), vec![class.clone()]));
			}

			if attributes.iter().any(|attribute| attribute.name == name) {
				return Err(QuillError::parse(
					element.line,
					format!("duplicate attribute `{name}` on `{}`", element.tag),
				));
			}

			let value = match value {
				PendingValue::Literal(value) => {
					AttributeValue::Literal(self.profile.escape_attribute(&value).into_owned())
				}
				PendingValue::Code(code) => AttributeValue::Code(code),
			};
			attributes.push(Attribute { name, value });
		}

		if let Some((index, values)) = classes.filter(|(_, values)| values.len() > 1) {
			let joined = values.join(" ");
			attributes[index].value =
				AttributeValue::Literal(self.profile.escape_attribute(&joined).into_owned());
		}

		Ok((element.tag, attributes))
	}

	fn finish(mut self) -> QuillResult<(Program, Option<MarkupHeader>)> {
		if matches!(self.depth.last(), Some(Construct::Blank)) {
			self.depth.pop();
		}
		self.close_pending()?;

		while let Some(construct) = self.depth.pop() {
			if let Construct::Block { tag, mirror_blank } = construct {
				if mirror_blank {
					self.instructions.push(Instruction::Blank);
				}
				self.instructions.push(Instruction::CloseElement { tag });
			}
		}

		let program = Program {
			instructions: self.instructions,
			profile: self.profile,
		};

		Ok((program, self.header))
	}
}

/// Build the instruction list from a token stream. The first error aborts the
/// build; nothing is returned for the tokens consumed before it.
pub fn build_program<I>(tokens: I) -> QuillResult<(Program, Option<MarkupHeader>)>
where
	I: IntoIterator<Item = QuillResult<Lexeme>>,
{
	let mut builder = ProgramBuilder::new();
	let mut count = 0_usize;

	for lexeme in tokens {
		builder.push(lexeme?)?;
		count += 1;
	}

	let (program, header) = builder.finish()?;
	tracing::debug!(
		tokens = count,
		instructions = program.instructions.len(),
		"built program"
	);

	Ok((program, header))
}
