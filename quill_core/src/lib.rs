//! `quill_core` compiles an indentation-sensitive markup shorthand into a
//! reusable [`Document`] that renders XML-like text.
//!
//! ## Processing Pipeline
//!
//! ```text
//! Template text or bytes
//!   -> SourceStream (decodes, normalizes newlines, rejects control characters)
//!   -> Tokenizer (lazy token stream with Indent / Dedent / BlankLine tokens)
//!   -> Program builder (depth stack of open constructs -> instruction list)
//!   -> Document (instruction list + optional markup header)
//!   -> Document::render(parameters) -> text or UTF-8 bytes
//! ```
//!
//! ## Syntax
//!
//! ```text
//! !!! xml
//! %html
//!   .greeting
//!     Hello
//!   %a(href="/about" rel=`rel`): About
//!   // a comment
//!   = user.name
//! ```
//!
//! - `%tag` opens an element. `.` `#` `@` `$` shortcuts imply the `field` tag
//!   together with a `class`, `id`, `name` or `string` attribute.
//! - Attributes follow the name: `flag`, `name="value"`, `name=value` or
//!   ``name=`code` ``. Parentheses let an attribute list span lines.
//! - `:` puts inline data on the element line, `/` closes the element.
//! - `=`, `&=` and `!=` lines and data hold code handed to the [`Evaluator`].
//! - `- code` and `:code` blocks run code that writes its own lines.
//! - `!!! kind name="value"` as the first line emits a markup header.
//!
//! ## Key Types
//!
//! - [`Compiler`] compiles templates with a set of [`CompileOptions`] and an
//!   [`Evaluator`].
//! - [`Document`] is the compiled template. Render it as many times as
//!   needed, from any thread.
//! - [`MinijinjaEvaluator`] is the default evaluator. Code is written as
//!   minijinja expressions and template snippets.
//! - [`QuillError`] covers compile errors, render errors and bad options.

use std::sync::Arc;

pub use config::*;
pub use document::*;
pub use error::*;
pub use escape::*;
pub use evaluator::*;
pub use header::*;
pub use indent::*;
pub use lexer::*;
pub use program::*;
pub use source::*;
pub use tokens::*;

pub mod config;
mod document;
#[allow(unused_assignments)]
mod error;
mod escape;
mod evaluator;
mod header;
mod indent;
mod lexer;
mod program;
mod source;
mod tokens;

#[cfg(test)]
mod __fixtures;
#[cfg(test)]
mod __tests;

/// Compiles templates into [`Document`]s.
///
/// Every document produced by a compiler shares its evaluator and options.
#[derive(Clone)]
pub struct Compiler {
	options: CompileOptions,
	evaluator: Arc<dyn Evaluator>,
}

impl Default for Compiler {
	fn default() -> Self {
		Self::new(CompileOptions::default())
	}
}

impl std::fmt::Debug for Compiler {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Compiler")
			.field("options", &self.options)
			.finish_non_exhaustive()
	}
}

impl Compiler {
	/// A compiler using the [`MinijinjaEvaluator`].
	pub fn new(options: CompileOptions) -> Self {
		Self {
			options,
			evaluator: Arc::new(MinijinjaEvaluator::new()),
		}
	}

	#[must_use]
	pub fn with_evaluator(mut self, evaluator: impl Evaluator + 'static) -> Self {
		self.evaluator = Arc::new(evaluator);
		self
	}

	pub fn options(&self) -> &CompileOptions {
		&self.options
	}

	/// Compile template text.
	#[tracing::instrument(level = "debug", skip_all)]
	pub fn compile(&self, source: &str) -> QuillResult<Document> {
		self.build(SourceStream::new(source)?)
	}

	/// Compile template bytes. A first-line `coding:` pragma names the
	/// encoding; without one the bytes must be UTF-8.
	#[tracing::instrument(level = "debug", skip_all)]
	pub fn compile_bytes(&self, bytes: &[u8]) -> QuillResult<Document> {
		self.build(SourceStream::from_bytes(bytes)?)
	}

	fn build(&self, stream: SourceStream) -> QuillResult<Document> {
		let (program, header) = build_program(Tokenizer::new(stream))?;

		tracing::debug!(
			instructions = program.instructions.len(),
			header = header.as_ref().map_or("none", |header| header.kind.as_str()),
			"compiled template"
		);

		Ok(Document::new(
			program,
			header,
			Arc::clone(&self.evaluator),
			self.options,
		))
	}
}

/// Compile template text with the default [`Compiler`].
pub fn compile(source: &str) -> QuillResult<Document> {
	Compiler::default().compile(source)
}

/// Compile template bytes with the default [`Compiler`].
pub fn compile_bytes(bytes: &[u8]) -> QuillResult<Document> {
	Compiler::default().compile_bytes(bytes)
}
