use rstest::fixture;

use super::*;

/// Resolves code by looking it up as a parameter name. JSON literals
/// evaluate to themselves.
#[derive(Debug, Default)]
pub struct LookupEvaluator;

impl Evaluator for LookupEvaluator {
	fn evaluate(&self, code: &str, parameters: &Parameters) -> QuillResult<serde_json::Value> {
		if let Some(value) = parameters.get(code) {
			return Ok(value.clone());
		}

		serde_json::from_str(code).map_err(|_| {
			QuillError::Evaluation {
				code: code.to_string(),
				reason: "unknown parameter".to_string(),
			}
		})
	}
}

#[fixture]
pub fn lookup_compiler() -> Compiler {
	Compiler::default().with_evaluator(LookupEvaluator)
}

pub fn params<const N: usize>(pairs: [(&str, serde_json::Value); N]) -> Parameters {
	pairs
		.into_iter()
		.map(|(name, value)| (name.to_string(), value))
		.collect()
}

pub fn no_params() -> Parameters {
	Parameters::new()
}

/// Compile and render with the default evaluator and no parameters.
pub fn render(source: &str) -> QuillResult<String> {
	compile(source)?.render(&no_params())
}

pub fn tokens(source: &str) -> QuillResult<Vec<Token>> {
	Ok(tokenize(source)?
		.into_iter()
		.map(|lexeme| lexeme.token)
		.collect())
}

pub fn count_tokens(tokens: &[Token], token: &Token) -> usize {
	tokens.iter().filter(|candidate| *candidate == token).count()
}

pub fn greeting_source() -> &'static str {
	"!!! xml\n%html\n  .greeting\n    Hello\n"
}
