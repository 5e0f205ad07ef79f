use std::cmp::Ordering;

use derive_more::Deref;

/// Ordered stack of indentation widths.
///
/// The tokenizer keeps one to turn leading whitespace into `Indent` and
/// `Dedent` tokens, and every render keeps its own to decide how far each
/// emitted line is pushed in. The bottom entry is the base width and is never
/// popped.
#[derive(Debug, Clone, Deref, PartialEq, Eq)]
pub struct IndentTracker(
	#[deref]
	Vec<usize>,
);

impl Default for IndentTracker {
	fn default() -> Self {
		Self::new(0)
	}
}

impl IndentTracker {
	pub fn new(base: usize) -> Self {
		Self(vec![base])
	}

	/// The innermost width.
	pub fn current(&self) -> usize {
		self.0.last().copied().unwrap_or_default()
	}

	/// Number of levels opened above the base.
	pub fn depth(&self) -> usize {
		self.0.len().saturating_sub(1)
	}

	/// Compare a line's width with the innermost level.
	pub fn compare(&self, width: usize) -> Ordering {
		width.cmp(&self.current())
	}

	pub fn push(&mut self, width: usize) {
		self.0.push(width);
	}

	/// Open a level `unit` columns deeper than the current one.
	pub fn push_by(&mut self, unit: usize) {
		let width = self.current() + unit;
		self.0.push(width);
	}

	/// Close the innermost level. The base level stays in place.
	pub fn pop(&mut self) -> Option<usize> {
		if self.0.len() > 1 { self.0.pop() } else { None }
	}

	/// Close every level deeper than `width` and return how many were closed.
	///
	/// Returns `None` when `width` does not line up with any open level.
	pub fn dedent_to(&mut self, width: usize) -> Option<usize> {
		let mut closed = 0;

		while self.current() > width {
			if self.pop().is_none() {
				break;
			}
			closed += 1;
		}

		(self.current() == width).then_some(closed)
	}
}
