use std::borrow::Cow;

/// An escaping policy together with the header conventions of the markup
/// language it belongs to.
///
/// Profiles are selected by the kind named in a `!!!` header directive. A
/// document without a header uses [`DEFAULT_PROFILE`].
#[derive(Debug)]
pub struct EscapeProfile {
	/// Header kind that selects this profile, e.g. `xml`.
	pub kind: &'static str,
	/// Name of the header attribute that holds the language version.
	pub version_key: &'static str,
	/// Version written when the header does not name one.
	pub default_version: &'static str,
	text: fn(&str) -> Cow<'_, str>,
	attribute: fn(&str) -> Cow<'_, str>,
	comment: fn(&str) -> Cow<'_, str>,
}

impl EscapeProfile {
	/// Escape literal text content.
	pub fn escape_text<'a>(&self, value: &'a str) -> Cow<'a, str> {
		(self.text)(value)
	}

	/// Escape a value placed inside a double quoted attribute.
	pub fn escape_attribute<'a>(&self, value: &'a str) -> Cow<'a, str> {
		(self.attribute)(value)
	}

	/// Make a line safe to place inside a comment.
	pub fn escape_comment<'a>(&self, value: &'a str) -> Cow<'a, str> {
		(self.comment)(value)
	}
}

/// The built-in `xml` profile.
pub static XML_PROFILE: EscapeProfile = EscapeProfile {
	kind: "xml",
	version_key: "version",
	default_version: "1.0",
	text: xml_text,
	attribute: xml_attribute,
	comment: xml_comment,
};

/// Profile used when a document has no header.
pub static DEFAULT_PROFILE: &EscapeProfile = &XML_PROFILE;

/// Every profile that can be selected by a header directive.
static PROFILES: &[&EscapeProfile] = &[&XML_PROFILE];

/// Find the profile registered for a header kind. Kinds are matched case
/// insensitively.
pub fn lookup_profile(kind: &str) -> Option<&'static EscapeProfile> {
	PROFILES
		.iter()
		.copied()
		.find(|profile| profile.kind.eq_ignore_ascii_case(kind))
}

fn xml_text(value: &str) -> Cow<'_, str> {
	replace_chars(value, |c| {
		match c {
			'&' => Some("&amp;"),
			'<' => Some("&lt;"),
			'>' => Some("&gt;"),
			_ => None,
		}
	})
}

fn xml_attribute(value: &str) -> Cow<'_, str> {
	replace_chars(value, |c| {
		match c {
			'&' => Some("&amp;"),
			'<' => Some("&lt;"),
			'>' => Some("&gt;"),
			'"' => Some("&quot;"),
			_ => None,
		}
	})
}

fn xml_comment(value: &str) -> Cow<'_, str> {
	if !value.contains("--") {
		return Cow::Borrowed(value);
	}

	let mut result = value.to_string();
	while result.contains("--") {
		result = result.replace("--", "- -");
	}
	Cow::Owned(result)
}

/// Replace characters according to `lookup`, borrowing when nothing changes.
fn replace_chars(value: &str, lookup: impl Fn(char) -> Option<&'static str>) -> Cow<'_, str> {
	let Some(first) = value.find(|c| lookup(c).is_some()) else {
		return Cow::Borrowed(value);
	};

	let mut result = String::with_capacity(value.len() + 8);
	result.push_str(&value[..first]);

	for c in value[first..].chars() {
		match lookup(c) {
			Some(replacement) => result.push_str(replacement),
			None => result.push(c),
		}
	}

	Cow::Owned(result)
}
