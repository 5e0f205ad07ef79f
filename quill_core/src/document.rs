use std::fmt;
use std::sync::Arc;

use crate::QuillResult;
use crate::config::CompileOptions;
use crate::evaluator::Evaluator;
use crate::evaluator::Parameters;
use crate::evaluator::value_to_text;
use crate::header::MarkupHeader;
use crate::indent::IndentTracker;
use crate::program::Attribute;
use crate::program::AttributeValue;
use crate::program::ElementBody;
use crate::program::Fragment;
use crate::program::Instruction;
use crate::program::Program;

/// Line buffer for a single render.
///
/// Every render owns one, so renders of the same [`Document`] never share
/// output or indentation state.
#[derive(Debug, Clone)]
pub struct Output {
	lines: Vec<String>,
	indent: IndentTracker,
	unit: usize,
}

impl Output {
	pub fn new(options: &CompileOptions) -> Self {
		Self {
			lines: Vec::new(),
			indent: IndentTracker::new(options.base_column()),
			unit: options.indent_width,
		}
	}

	/// Write text at the current depth. Every line of multi-line text is
	/// indented; empty lines stay empty.
	pub fn emit_line(&mut self, text: &str) {
		let text = text.strip_suffix('\n').unwrap_or(text);
		let prefix = " ".repeat(self.indent.current());

		for line in text.split('\n') {
			if line.is_empty() {
				self.lines.push(String::new());
			} else {
				self.lines.push(format!("{prefix}{line}"));
			}
		}
	}

	pub fn blank(&mut self) {
		self.lines.push(String::new());
	}

	/// Nest the following lines one unit deeper.
	pub fn indent(&mut self) {
		self.indent.push_by(self.unit);
	}

	pub fn dedent(&mut self) {
		self.indent.pop();
	}

	/// Levels opened since the render started.
	pub fn depth(&self) -> usize {
		self.indent.depth()
	}

	pub fn lines(&self) -> &[String] {
		&self.lines
	}

	fn into_text(self) -> String {
		self.lines.join("\n")
	}
}

/// A compiled template. Immutable and safe to render from many threads at
/// once.
#[derive(Clone)]
pub struct Document {
	program: Program,
	header: Option<MarkupHeader>,
	evaluator: Arc<dyn Evaluator>,
	options: CompileOptions,
}

impl fmt::Debug for Document {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Document")
			.field("program", &self.program)
			.field("header", &self.header)
			.field("options", &self.options)
			.finish_non_exhaustive()
	}
}

impl Document {
	pub(crate) fn new(
		program: Program,
		header: Option<MarkupHeader>,
		evaluator: Arc<dyn Evaluator>,
		options: CompileOptions,
	) -> Self {
		Self {
			program,
			header,
			evaluator,
			options,
		}
	}

	pub fn header(&self) -> Option<&MarkupHeader> {
		self.header.as_ref()
	}

	pub fn program(&self) -> &Program {
		&self.program
	}

	pub fn options(&self) -> &CompileOptions {
		&self.options
	}

	/// Run the program and join the emitted lines with `\n`.
	///
	/// Evaluator failures are returned as they are; nothing is substituted for
	/// a value that could not be computed.
	#[tracing::instrument(level = "debug", skip_all)]
	pub fn render(&self, parameters: &Parameters) -> QuillResult<String> {
		let mut output = Output::new(&self.options);

		if let Some(header) = &self.header {
			output.emit_line(&header.render());
		}

		for instruction in &self.program.instructions {
			self.execute(instruction, parameters, &mut output)?;
		}

		tracing::debug!(lines = output.lines.len(), "rendered document");

		Ok(output.into_text())
	}

	/// The rendered document encoded with the header's encoding. Only UTF-8
	/// can be declared, so these are the bytes of [`Document::render`].
	pub fn render_bytes(&self, parameters: &Parameters) -> QuillResult<Vec<u8>> {
		self.render(parameters).map(String::into_bytes)
	}

	fn execute(
		&self,
		instruction: &Instruction,
		parameters: &Parameters,
		output: &mut Output,
	) -> QuillResult<()> {
		match instruction {
			Instruction::Element {
				tag,
				attributes,
				body,
			} => {
				let attributes = self.render_attributes(attributes, parameters)?;
				let line = match body {
					ElementBody::Empty => format!("<{tag}{attributes}/>"),
					ElementBody::Inline(fragment) => {
						let data = self.render_fragment(fragment, parameters)?;
						format!("<{tag}{attributes}>{data}</{tag}>")
					}
				};
				output.emit_line(&line);
			}
			Instruction::OpenElement { tag, attributes } => {
				let attributes = self.render_attributes(attributes, parameters)?;
				output.emit_line(&format!("<{tag}{attributes}>"));
				output.indent();
			}
			Instruction::CloseElement { tag } => {
				output.dedent();
				output.emit_line(&format!("</{tag}>"));
			}
			Instruction::Content(fragment) => {
				let text = self.render_fragment(fragment, parameters)?;
				output.emit_line(&text);
			}
			Instruction::Comment(lines) => {
				match lines.as_slice() {
					[line] => output.emit_line(&format!("<!-- {line} -->")),
					lines => {
						output.emit_line("<!--");
						output.indent();
						for line in lines {
							output.emit_line(line);
						}
						output.dedent();
						output.emit_line("-->");
					}
				}
			}
			Instruction::Blank => output.blank(),
			Instruction::RawCode(code) => self.evaluator.execute(code, parameters, output)?,
		}

		Ok(())
	}

	fn render_fragment(&self, fragment: &Fragment, parameters: &Parameters) -> QuillResult<String> {
		match fragment {
			Fragment::Text(text) => Ok(text.clone()),
			Fragment::Code { code, escape } => {
				let text = value_to_text(&self.evaluator.evaluate(code, parameters)?);
				if *escape {
					Ok(self.program.profile().escape_text(&text).into_owned())
				} else {
					Ok(text)
				}
			}
		}
	}

	/// Render an attribute list with a leading space before each attribute.
	fn render_attributes(
		&self,
		attributes: &[Attribute],
		parameters: &Parameters,
	) -> QuillResult<String> {
		let mut rendered = String::new();

		for Attribute { name, value } in attributes {
			let value = match value {
				AttributeValue::Literal(value) => value.clone(),
				AttributeValue::Code(code) => {
					match self.evaluator.evaluate(code, parameters)? {
						serde_json::Value::Null | serde_json::Value::Bool(false) => continue,
						serde_json::Value::Bool(true) => name.clone(),
						value => value_to_text(&value),
					}
				}
			};

			rendered.push_str(&format!(" {name}=\"{value}\""));
		}

		Ok(rendered)
	}
}
