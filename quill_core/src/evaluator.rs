use std::collections::HashMap;
use std::fmt::Display;

use minijinja::Environment;
use minijinja::UndefinedBehavior;
use minijinja::Value;

use crate::QuillError;
use crate::QuillResult;
use crate::document::Output;

/// Named values a document is rendered with.
pub type Parameters = HashMap<String, serde_json::Value>;

/// The capability that runs code embedded in a template.
///
/// `evaluate` is used for code attributes, code data and code content lines.
/// `execute` is used for `- code` lines and `:code` filter bodies, and may
/// write straight into the render output.
pub trait Evaluator: Send + Sync {
	fn evaluate(&self, code: &str, parameters: &Parameters) -> QuillResult<serde_json::Value>;

	fn execute(&self, code: &str, parameters: &Parameters, output: &mut Output) -> QuillResult<()> {
		let value = self.evaluate(code, parameters)?;
		let text = value_to_text(&value);
		if !text.is_empty() {
			output.emit_line(&text);
		}

		Ok(())
	}
}

/// Text form of an evaluated value: `null` is empty, strings are used as is
/// and everything else uses its JSON form.
pub fn value_to_text(value: &serde_json::Value) -> String {
	match value {
		serde_json::Value::Null => String::new(),
		serde_json::Value::String(text) => text.clone(),
		other => other.to_string(),
	}
}

/// Evaluator backed by [`minijinja`].
///
/// Expressions are minijinja expressions (`user.name | upper`) and raw code is
/// rendered as a minijinja template snippet. Unknown names are errors.
#[derive(Debug)]
pub struct MinijinjaEvaluator {
	env: Environment<'static>,
}

impl Default for MinijinjaEvaluator {
	fn default() -> Self {
		Self::new()
	}
}

impl MinijinjaEvaluator {
	pub fn new() -> Self {
		let mut env = Environment::new();
		env.set_undefined_behavior(UndefinedBehavior::Strict);

		Self { env }
	}

	/// Access the environment to register filters, functions or globals.
	pub fn environment_mut(&mut self) -> &mut Environment<'static> {
		&mut self.env
	}
}

impl Evaluator for MinijinjaEvaluator {
	fn evaluate(&self, code: &str, parameters: &Parameters) -> QuillResult<serde_json::Value> {
		let expression = self
			.env
			.compile_expression(code)
			.map_err(|e| evaluation_error(code, e))?;
		let value = expression
			.eval(Value::from_serialize(parameters))
			.map_err(|e| evaluation_error(code, e))?;

		if value.is_undefined() {
			return Err(evaluation_error(code, "expression is undefined"));
		}

		serde_json::to_value(&value).map_err(|e| evaluation_error(code, e))
	}

	fn execute(&self, code: &str, parameters: &Parameters, output: &mut Output) -> QuillResult<()> {
		let rendered = self
			.env
			.render_str(code, Value::from_serialize(parameters))
			.map_err(|e| evaluation_error(code, e))?;

		if !rendered.is_empty() {
			output.emit_line(&rendered);
		}

		Ok(())
	}
}

fn evaluation_error(code: &str, reason: impl Display) -> QuillError {
	QuillError::Evaluation {
		code: code.to_string(),
		reason: reason.to_string(),
	}
}
