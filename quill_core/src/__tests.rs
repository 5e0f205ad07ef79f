use rstest::rstest;
use serde_json::json;
use similar_asserts::assert_eq;
use tracing_test::traced_test;

use super::__fixtures::*;
use super::*;

#[rstest]
#[case::nested_then_root("%a\n  %b\n    %c\n%d\n", 2)]
#[case::siblings_at_depth("%a\n  %b\n  %c\n    %d\n  %e\n%f", 2)]
#[case::blank_inside_block("%a\n  %b\n\n  %c\n", 1)]
#[case::closed_at_end_of_input("%a\n  %b\n    %c", 2)]
#[case::flat("%a\n\n%b", 0)]
fn indent_and_dedent_tokens_balance(#[case] source: &str, #[case] expected: usize) -> QuillResult<()> {
	let tokens = tokens(source)?;

	assert_eq!(count_tokens(&tokens, &Token::Indent), expected);
	assert_eq!(count_tokens(&tokens, &Token::Dedent), expected);

	Ok(())
}

#[test]
fn tokenize_nested_elements_with_lines() -> QuillResult<()> {
	let lexemes = tokenize("%html\n  .greeting\n    Hello\n")?;

	assert_eq!(
		lexemes,
		vec![
			Lexeme::new(Token::ElementName("html".into()), 1),
			Lexeme::new(Token::Indent, 2),
			Lexeme::new(Token::ElementName("field".into()), 2),
			Lexeme::new(
				Token::StringAttribute {
					name: "class".into(),
					value: "greeting".into(),
				},
				2
			),
			Lexeme::new(Token::Indent, 3),
			Lexeme::new(Token::Content("Hello".into()), 3),
			Lexeme::new(Token::Dedent, 3),
			Lexeme::new(Token::Dedent, 3),
		]
	);

	Ok(())
}

#[rstest]
#[case::blank_after_indent("%a\n\n\n  %b\n", vec![
	Token::ElementName("a".into()),
	Token::Indent,
	Token::BlankLine,
	Token::ElementName("b".into()),
	Token::Dedent,
])]
#[case::leading_blanks_dropped("\n\n%a", vec![Token::ElementName("a".into())])]
#[case::trailing_blanks_dropped("%a\n\n\n", vec![Token::ElementName("a".into())])]
#[case::chained_shortcuts("%p.intro#top", vec![
	Token::ElementName("p".into()),
	Token::StringAttribute { name: "class".into(), value: "intro".into() },
	Token::StringAttribute { name: "id".into(), value: "top".into() },
])]
#[case::self_close_with_text("%br/ after", vec![
	Token::ElementName("br".into()),
	Token::SelfClose,
	Token::Content("after".into()),
])]
#[case::code_content("!= raw", vec![Token::CodeContent { code: "raw".into(), escape: false }])]
#[case::escaped_code_content("&= value", vec![Token::CodeContent { code: "value".into(), escape: true }])]
#[case::literal_escape("\\= not code", vec![Token::Content("= not code".into())])]
#[case::code_data("%p: = name", vec![
	Token::ElementName("p".into()),
	Token::CodeData { code: "name".into(), escape: true },
])]
#[case::meta("!!! xml version=\"1.1\"", vec![
	Token::Meta { kind: "xml".into() },
	Token::StringAttribute { name: "version".into(), value: "1.1".into() },
])]
#[case::filter(":code\n  one\n\n  two\n%a", vec![
	Token::Filter { name: "code".into(), lines: vec!["one".into(), String::new(), "two".into()] },
	Token::ElementName("a".into()),
])]
fn tokenize_constructs(#[case] source: &str, #[case] expected: Vec<Token>) -> QuillResult<()> {
	assert_eq!(tokens(source)?, expected);

	Ok(())
}

#[test]
fn tokenize_continues_attribute_lists() -> QuillResult<()> {
	let expected = vec![
		Token::ElementName("a".into()),
		Token::StringAttribute {
			name: "href".into(),
			value: "x".into(),
		},
		Token::StringAttribute {
			name: "title".into(),
			value: "one two".into(),
		},
	];

	assert_eq!(tokens("%a(href=\"x\"\n   title=\"one\n  two\")")?, expected);
	assert_eq!(
		tokens("%a href=\"x\" \\\n  title='one two'")?,
		expected
	);

	Ok(())
}

#[test]
fn source_stream_push_back() -> QuillResult<()> {
	let mut stream = SourceStream::new("ab\ncd")?;

	assert_eq!(stream.get_char(), Some('a'));
	stream.push_char('a');
	assert_eq!(stream.peek_line().as_deref(), Some("ab"));
	assert_eq!(stream.get_line().as_deref(), Some("ab"));

	assert_eq!(stream.get_char(), Some('c'));
	assert_eq!(stream.line_number(), 2);
	stream.push_char('\n');
	assert_eq!(stream.get_char(), Some('\n'));
	assert_eq!(stream.get_line().as_deref(), Some("d"));
	assert!(stream.is_eof());

	stream.push_line("again".into());
	assert_eq!(stream.peek_char(), Some('a'));
	assert_eq!(stream.get_line().as_deref(), Some("again"));
	assert_eq!(stream.get_line(), None);

	Ok(())
}

#[test]
fn source_stream_push_after_whole_line() -> QuillResult<()> {
	let mut stream = SourceStream::new("ab\ncd")?;

	assert_eq!(stream.get_line().as_deref(), Some("ab"));
	stream.push_char('b');
	assert_eq!(stream.line_number(), 1);
	assert_eq!(stream.get_line().as_deref(), Some("b"));
	assert_eq!(stream.get_line().as_deref(), Some("cd"));
	assert_eq!(stream.get_line(), None);

	stream.push_char('x');
	assert_eq!(stream.get_char(), Some('x'));
	assert_eq!(stream.get_char(), Some('\n'));
	assert!(stream.is_eof());

	Ok(())
}

#[test]
fn source_stream_push_line_after_eof() -> QuillResult<()> {
	let mut stream = SourceStream::new("")?;

	stream.push_line("again".into());
	assert_eq!(stream.peek_char(), Some('a'));
	assert_eq!(stream.get_line().as_deref(), Some("again"));
	assert_eq!(stream.get_line(), None);

	Ok(())
}

#[test]
fn source_stream_normalizes_newlines() -> QuillResult<()> {
	let mut stream = SourceStream::new("a\r\nb\rc")?;

	assert_eq!(stream.get_line().as_deref(), Some("a"));
	assert_eq!(stream.get_line().as_deref(), Some("b"));
	assert_eq!(stream.get_line().as_deref(), Some("c"));
	assert!(stream.is_eof());

	Ok(())
}

#[rstest]
#[case::bell("%a\n%b\u{7}\n", 2, '\u{7}')]
#[case::tab("%a\n\t%b", 2, '\t')]
#[case::first_line("\u{1b}[0m", 1, '\u{1b}')]
#[case::non_character("%a\n%b\n%c\u{fffe}", 3, '\u{fffe}')]
#[case::after_pragma("-# coding: utf-8\n%a\n\t%b", 3, '\t')]
fn disallowed_characters_are_rejected(
	#[case] source: &str,
	#[case] line: usize,
	#[case] character: char,
) {
	let error = tokenize(source).expect_err("source should be rejected");
	assert!(
		matches!(error, QuillError::InvalidCharacter { line: l, character: c } if l == line && c == character),
		"unexpected error: {error:?}"
	);

	let error = compile(source).expect_err("source should be rejected");
	assert_eq!(error.line(), Some(line));
}

#[test]
fn coding_pragma_selects_encoding() -> QuillResult<()> {
	assert_eq!(render("// -*- coding: utf-8 -*-\n%a")?, "<a/>");
	assert_eq!(
		compile_bytes(b"-# coding: ascii\n%a")?.render(&no_params())?,
		"<a/>"
	);

	let error = compile("// coding: latin-1\n%a").expect_err("latin-1 is not supported");
	assert!(matches!(error, QuillError::UnsupportedEncoding(ref name) if name == "latin-1"));

	let error = compile_bytes(b"-# coding: ascii\n%a \xc3\xa9").expect_err("not ascii");
	assert!(matches!(error, QuillError::InvalidCharacter { line: 2, .. }));

	let error = compile_bytes(b"%a\n%b\xff").expect_err("not utf-8");
	assert!(matches!(error, QuillError::InvalidCharacter { line: 2, .. }));

	Ok(())
}

#[test]
fn shortcut_matches_explicit_field_element() -> QuillResult<()> {
	assert_eq!(render(".foo")?, render("%field(class=\"foo\")")?);
	assert_eq!(render(".foo")?, "<field class=\"foo\"/>");
	assert_eq!(render("#main")?, "<field id=\"main\"/>");
	assert_eq!(render("@email")?, "<field name=\"email\"/>");

	Ok(())
}

#[test]
fn string_shortcut_replaces_underscores() -> QuillResult<()> {
	assert_eq!(render("$hello_world")?, "<field string=\"hello world\"/>");

	Ok(())
}

#[test]
fn literal_attributes_are_escaped_and_code_attributes_are_not() -> QuillResult<()> {
	assert_eq!(render("%a(title=\"x<y\")")?, "<a title=\"x&lt;y\"/>");

	let document = compile("%a(title=`title`)")?;
	let output = document.render(&params([("title", json!("x<y"))]))?;
	assert_eq!(output, "<a title=\"x<y\"/>");

	Ok(())
}

#[rstest]
fn code_attribute_values(lookup_compiler: Compiler) -> QuillResult<()> {
	let document = lookup_compiler
		.compile("%input(checked=`flag` disabled=`off` value=`count` data=`list` hidden=`nothing`)")?;
	let output = document.render(&params([
		("flag", json!(true)),
		("off", json!(false)),
		("count", json!(3)),
		("list", json!([1, 2])),
		("nothing", json!(null)),
	]))?;

	assert_eq!(
		output,
		"<input checked=\"checked\" value=\"3\" data=\"[1,2]\"/>"
	);

	Ok(())
}

#[rstest]
#[case::single("%a\n\n%b", "<a/>\n\n<b/>")]
#[case::collapsed("%a\n\n\n\n%b", "<a/>\n\n<b/>")]
#[case::between_children("%a\n  %b\n\n  %c", "<a>\n  <b/>\n\n  <c/>\n</a>")]
#[case::mirrored("%div\n\n  %p\n%after", "<div>\n\n  <p/>\n\n</div>\n<after/>")]
fn blank_lines_between_siblings(#[case] source: &str, #[case] expected: &str) -> QuillResult<()> {
	assert_eq!(render(source)?, expected);

	Ok(())
}

#[rstest]
#[case::nested("%a\n  %b\n    %c\n%d", "<a>\n  <b>\n    <c/>\n  </b>\n</a>\n<d/>")]
#[case::inline_data("%p: a < b", "<p>a &lt; b</p>")]
#[case::shortcut_data(".note: hi", "<field class=\"note\">hi</field>")]
#[case::bare_value_before_data("%a href=x: About", "<a href=\"x\">About</a>")]
#[case::bare_value_before_self_close("%input type=text/", "<input type=\"text\"/>")]
#[case::flag_and_bare("%input(type=text required)", "<input type=\"text\" required=\"required\"/>")]
#[case::merged_classes("%p.a.b", "<p class=\"a b\"/>")]
#[case::self_close("%br/ after", "<br/>\nafter")]
#[case::content("a < b", "a &lt; b")]
#[case::literal_line("\\%not an element", "%not an element")]
#[case::comment("// a -- b\n%a", "<!-- a - - b -->\n<a/>")]
#[case::comment_block(
	"// first\n// second\n%a",
	"<!--\n  first\n  second\n-->\n<a/>"
)]
#[case::comment_nested_lines(
	"%a\n  // heading\n    detail\n  %b",
	"<a>\n  <!--\n    heading\n    detail\n  -->\n  <b/>\n</a>"
)]
#[case::filter(":code\n  {{ 1 + 2 }}\n%after", "3\n<after/>")]
#[case::filter_in_element("%pre\n  :code\n    {{ 'a' }}\n    b", "<pre>\n  a\n  b\n</pre>")]
#[case::filter_keeps_blank_lines(":code\n  {{ 'a' }}\n\n  b", "a\n\nb")]
#[case::raw_code("%p\n  - {{ 'hi' | upper }}", "<p>\n  HI\n</p>")]
fn render_constructs(#[case] source: &str, #[case] expected: &str) -> QuillResult<()> {
	assert_eq!(render(source)?, expected);

	Ok(())
}

#[rstest]
#[case::escaped_data("%p: = html", "<p>&lt;b&gt;</p>")]
#[case::raw_data("%p: != html", "<p><b></p>")]
#[case::escaped_content("= html", "&lt;b&gt;")]
#[case::explicit_escape("&= html", "&lt;b&gt;")]
#[case::raw_content("!= html", "<b>")]
fn code_results_follow_escape_flag(
	lookup_compiler: Compiler,
	#[case] source: &str,
	#[case] expected: &str,
) -> QuillResult<()> {
	let document = lookup_compiler.compile(source)?;
	let output = document.render(&params([("html", json!("<b>"))]))?;

	assert_eq!(output, expected);

	Ok(())
}

#[rstest]
#[case::explicit("utf-8", true)]
#[case::uppercase("UTF-8", true)]
#[case::latin("latin-1", false)]
#[case::windows("cp1252", false)]
fn header_encoding_must_be_utf8(#[case] encoding: &str, #[case] valid: bool) {
	let source = format!("!!! xml encoding=\"{encoding}\"\n%a");
	let result = compile(&source);

	if valid {
		assert!(result.is_ok(), "{result:?}");
	} else {
		let error = result.expect_err("encoding should be rejected");
		assert!(matches!(error, QuillError::Parse { line: 1, .. }), "{error:?}");
	}
}

#[rstest]
#[case::implicit("!!! xml\n%a", "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<a/>")]
#[case::bare("!!!\n%a", "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<a/>")]
#[case::version(
	"!!! version=\"1.1\"\n%a",
	"<?xml version=\"1.1\" encoding=\"utf-8\"?>\n<a/>"
)]
#[case::attributes_in_order(
	"!!! xml encoding='utf-8' standalone=\"yes\"\n%a",
	"<?xml version=\"1.0\" encoding=\"utf-8\" standalone=\"yes\"?>\n<a/>"
)]
fn header_rendering(#[case] source: &str, #[case] expected: &str) -> QuillResult<()> {
	assert_eq!(render(source)?, expected);

	Ok(())
}

#[test]
fn header_is_exposed_on_document() -> QuillResult<()> {
	let document = compile("!!! xml standalone=\"no\"\n%a")?;
	let header = document.header().expect("header should be compiled");

	assert_eq!(header.kind, "xml");
	assert_eq!(header.encoding, "utf-8");
	assert_eq!(header.version(), Some("1.0"));
	assert!(compile("%a")?.header().is_none());

	Ok(())
}

#[rstest]
#[case::inconsistent_dedent("%a\n    %b\n  %c", 3)]
#[case::indent_at_start("  %a", 1)]
#[case::indent_under_data("%p: text\n  %b", 2)]
#[case::indent_under_self_close("%br/\n  %b", 2)]
#[case::indent_under_content("Hello\n  %b", 2)]
#[case::nested_meta("%a\n  !!! xml", 2)]
#[case::late_meta("%a\n!!! xml", 2)]
#[case::unknown_header_kind("!!! html\n%a", 1)]
#[case::unknown_filter(":markdown\n  text", 1)]
#[case::unterminated_quote("%a(href=\"x)", 1)]
#[case::unmatched_open_paren("%a(b", 1)]
#[case::unmatched_close_paren("%a b)", 1)]
#[case::bad_element_name("%1a", 1)]
#[case::empty_shortcut(".", 1)]
#[case::quoted_shortcut("#\"top\"", 1)]
#[case::unescaped_quote("%a(b=\"x\"\"y\")", 1)]
#[case::newline_in_quote("%a b=\"x\n  y\"", 1)]
#[case::duplicate_attribute("%p(id=\"x\" id=\"y\")", 1)]
#[case::empty_raw_code("%a\n- ", 2)]
#[case::empty_code_content("=", 1)]
fn parse_errors(#[case] source: &str, #[case] line: usize) {
	let error = compile(source).expect_err("source should not compile");

	assert!(matches!(error, QuillError::Parse { .. }), "{error:?}");
	assert_eq!(error.line(), Some(line), "{error}");
}

#[test]
fn tokenizer_stops_after_error() {
	let mut tokenizer = Tokenizer::new(SourceStream::new("%a\n%1b\n%c").expect("valid source"));

	assert!(matches!(tokenizer.next(), Some(Ok(_))));
	assert!(matches!(tokenizer.next(), Some(Err(QuillError::Parse { line: 2, .. }))));
	assert!(tokenizer.next().is_none());
}

#[test]
fn evaluation_errors_propagate_from_render() -> QuillResult<()> {
	let document = compile("%p: = missing")?;
	let error = document
		.render(&no_params())
		.expect_err("unknown name should fail");

	assert!(matches!(error, QuillError::Evaluation { ref code, .. } if code == "missing"));

	Ok(())
}

#[test]
fn greeting_renders_nested_elements() -> QuillResult<()> {
	let output = render(greeting_source())?;

	insta::assert_snapshot!(output, @r#"
<?xml version="1.0" encoding="utf-8"?>
<html>
  <field class="greeting">
    Hello
  </field>
</html>
"#);

	Ok(())
}

#[test]
fn render_full_page_with_minijinja() -> QuillResult<()> {
	let source = r#"!!! xml
%page(title="Home & Away")
  // navigation
  %nav
    %a(href="/" rel=`rel`): Home
    %a(href=`link`): = label

  .intro#top
    Welcome
    = user.name | upper
  $hello_world/
  - {{ items | join(", ") }}
"#;
	let document = compile(source)?;
	let output = document.render(&params([
		("rel", json!("nofollow")),
		("link", json!("/about")),
		("label", json!("About & more")),
		("user", json!({ "name": "ada" })),
		("items", json!(["a", "b"])),
	]))?;

	insta::assert_snapshot!(output, @r#"
<?xml version="1.0" encoding="utf-8"?>
<page title="Home &amp; Away">
  <!-- navigation -->
  <nav>
    <a href="/" rel="nofollow">Home</a>
    <a href="/about">About &amp; more</a>
  </nav>

  <field class="intro" id="top">
    Welcome
    ADA
  </field>
  <field string="hello world"/>
  a, b
</page>
"#);

	Ok(())
}

#[test]
fn render_bytes_matches_render() -> QuillResult<()> {
	let document = compile(greeting_source())?;

	assert_eq!(
		document.render_bytes(&no_params())?,
		document.render(&no_params())?.into_bytes()
	);

	Ok(())
}

#[test]
fn compiling_twice_is_deterministic() -> QuillResult<()> {
	let source = "%ul\n  %li.first: = name\n\n  %li\n    = name";
	let parameters = params([("name", json!("ada"))]);

	let first = compile(source)?;
	let second = compile(source)?;

	assert_eq!(first.program().instructions, second.program().instructions);
	assert_eq!(first.render(&parameters)?, second.render(&parameters)?);
	assert_eq!(first.render(&parameters)?, first.render(&parameters)?);

	Ok(())
}

#[test]
fn concurrent_renders_do_not_interleave() -> QuillResult<()> {
	let document = compile("%ul\n  %li: = name\n  %li\n    = name\n")?;

	std::thread::scope(|scope| -> QuillResult<()> {
		let handles: Vec<_> = (0..8)
			.map(|index| {
				let document = &document;
				scope.spawn(move || {
					let name = format!("user-{index}");
					let output = document.render(&params([("name", json!(name))]));
					(name, output)
				})
			})
			.collect();

		for handle in handles {
			let (name, output) = handle.join().expect("render thread panicked");
			assert_eq!(
				output?,
				format!("<ul>\n  <li>{name}</li>\n  <li>\n    {name}\n  </li>\n</ul>")
			);
		}

		Ok(())
	})
}

#[test]
fn compile_options_from_toml() -> QuillResult<()> {
	assert_eq!(CompileOptions::from_toml_str("")?, CompileOptions::default());
	assert_eq!(
		CompileOptions::from_toml_str("indent_width = 4\nbase_indent = 1")?,
		CompileOptions::default()
			.with_indent_width(4)
			.with_base_indent(1)
	);

	let error = CompileOptions::from_toml_str("tab_width = 4").expect_err("unknown key");
	assert!(matches!(error, QuillError::ConfigParse(_)));

	Ok(())
}

#[test]
fn compile_options_shape_output() -> QuillResult<()> {
	let options = CompileOptions::from_toml_str("indent_width = 4\nbase_indent = 1")?;
	let document = Compiler::new(options).compile("%a\n  %b")?;

	assert_eq!(
		document.render(&no_params())?,
		"    <a>\n        <b/>\n    </a>"
	);

	Ok(())
}

#[test]
fn indent_tracker_levels() {
	let mut tracker = IndentTracker::default();
	tracker.push(2);
	tracker.push(4);

	assert_eq!(tracker.depth(), 2);
	assert_eq!(tracker.compare(4), std::cmp::Ordering::Equal);
	assert_eq!(tracker.dedent_to(0), Some(2));
	assert_eq!(tracker.pop(), None);

	tracker.push_by(3);
	assert_eq!(tracker.current(), 3);
	assert_eq!(tracker.dedent_to(1), None);
}

#[test]
fn xml_profile_escaping() {
	assert_eq!(XML_PROFILE.escape_text("a<b&c>"), "a&lt;b&amp;c&gt;");
	assert_eq!(XML_PROFILE.escape_text("plain"), "plain");
	assert_eq!(
		XML_PROFILE.escape_attribute("say \"hi\""),
		"say &quot;hi&quot;"
	);
	assert_eq!(XML_PROFILE.escape_comment("a---b"), "a- - -b");
	assert!(lookup_profile("XML").is_some());
	assert!(lookup_profile("html").is_none());
}

#[test]
fn token_display_and_escape_flags() {
	let token = Token::CodeData {
		code: "name".into(),
		escape: false,
	};

	assert_eq!(token.to_string(), ": != name");
	assert!(!token.escape_required());
	assert!(Token::Content("x".into()).escape_required());
	assert_eq!(Token::Indent.kind(), "indent");
}

#[test]
#[traced_test]
fn compile_and_render_are_logged() -> QuillResult<()> {
	compile(greeting_source())?.render(&no_params())?;

	assert!(logs_contain("compiled template"));
	assert!(logs_contain("markup header"));
	assert!(logs_contain("rendered document"));

	Ok(())
}
