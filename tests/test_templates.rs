use similar_asserts::assert_eq;

use stencil::value::Value;
use stencil::{context, AutoEscape, Environment, ErrorKind};

fn render_str(source: &str, ctx: Value) -> String {
    let env = Environment::new();
    env.render_str(source, ctx).unwrap()
}

#[test]
fn test_basic_interpolation() {
    let mut env = Environment::new();
    env.add_template("hello", "Hello {{ name }}!").unwrap();
    let tmpl = env.get_template("hello").unwrap();
    let rv = tmpl.render(context!(name => "World")).unwrap();
    insta::assert_snapshot!(rv, @"Hello World!");
}

#[test]
fn test_literal_template_round_trips() {
    // a template without tags renders to itself, modulo the trailing
    // newline handling
    let env = Environment::new();
    assert_eq!(env.render_str("just some text", ()).unwrap(), "just some text");
    assert_eq!(env.render_str("text with newline\n", ()).unwrap(), "text with newline");
    let mut env = Environment::new();
    env.set_keep_trailing_newline(true);
    assert_eq!(
        env.render_str("text with newline\n", ()).unwrap(),
        "text with newline\n"
    );
}

#[test]
fn test_loop_index() {
    let rv = render_str(
        "{% for i in items %}{{ loop.index }}:{{ i }} {% endfor %}",
        context!(items => vec!["a", "b", "c"]),
    );
    assert_eq!(rv, "1:a 2:b 3:c ");
}

#[test]
fn test_arithmetic() {
    let rv = render_str("{{ 10 // 4 }}|{{ 10 / 4 }}|{{ 2 ** 10 }}", context!());
    assert_eq!(rv, "2|2.5|1024");
    let rv = render_str("{{ 1.5 + 1.5 }}|{{ 2 * 3 }}|{{ 7 % 3 }}|{{ -(2) }}", context!());
    assert_eq!(rv, "3.0|6|1|-2");
}

#[test]
fn test_int_overflow_promotes() {
    let rv = render_str(
        "{{ big + 1 }}",
        context!(big => i64::MAX),
    );
    assert_eq!(rv, "9223372036854775808");
}

#[test]
fn test_string_concat() {
    assert_eq!(render_str("{{ 'foo' ~ 42 }}", context!()), "foo42");
    // + on strings is not defined
    let env = Environment::new();
    assert!(env.render_str("{{ 'a' + 'b' }}", ()).is_err());
}

#[test]
fn test_auto_escaping() {
    let mut env = Environment::new();
    env.add_template("t.html", "{{ content }} / {{ content|safe }}")
        .unwrap();
    let tmpl = env.get_template("t.html").unwrap();
    let rv = tmpl.render(context!(content => "<b>x</b>")).unwrap();
    assert_eq!(rv, "&lt;b&gt;x&lt;&#x2f;b&gt; / <b>x</b>");
}

#[test]
fn test_escape_idempotence() {
    let env = Environment::new();
    let once = env
        .render_str("{{ s|e }}", context!(s => "<script>"))
        .unwrap();
    let twice = env
        .render_str("{{ s|e|e }}", context!(s => "<script>"))
        .unwrap();
    assert_eq!(once, twice);
    assert_eq!(once, "&lt;script&gt;");
}

#[test]
fn test_json_auto_escaping() {
    let mut env = Environment::new();
    env.add_template("t.json", "{{ data }}").unwrap();
    let tmpl = env.get_template("t.json").unwrap();
    let rv = tmpl
        .render(context!(data => context!(a => vec![1, 2])))
        .unwrap();
    assert_eq!(rv, r#"{"a":[1,2]}"#);
}

#[test]
fn test_auto_escape_suffix_stripping() {
    use stencil::default_auto_escape_callback as select;
    assert_eq!(select("page.html.j2"), AutoEscape::Html);
    assert_eq!(select("page.xml.jinja"), AutoEscape::Html);
    assert_eq!(select("data.json"), AutoEscape::Json);
    assert_eq!(select("conf.yml.jinja2"), AutoEscape::Json);
    assert_eq!(select("notes.txt"), AutoEscape::None);
}

#[test]
fn test_inheritance_super() {
    let mut env = Environment::new();
    env.add_template("base.html", "[{% block c %}BASE{% endblock %}]")
        .unwrap();
    env.add_template(
        "child.html",
        r#"{% extends "base.html" %}{% block c %}{{ super() }}!{% endblock %}"#,
    )
    .unwrap();
    let tmpl = env.get_template("child.html").unwrap();
    assert_eq!(tmpl.render(context!()).unwrap(), "[BASE!]");
}

#[test]
fn test_inheritance_not_overridden_block() {
    let mut env = Environment::new();
    env.add_template("base.txt", "{% block a %}A{% endblock %}-{% block b %}B{% endblock %}")
        .unwrap();
    env.add_template(
        "child.txt",
        r#"{% extends "base.txt" %}{% block b %}C{% endblock %}"#,
    )
    .unwrap();
    // blocks not overridden render as they would in the base template
    assert_eq!(
        env.get_template("child.txt").unwrap().render(context!()).unwrap(),
        "A-C"
    );
    assert_eq!(
        env.get_template("base.txt").unwrap().render(context!()).unwrap(),
        "A-B"
    );
}

#[test]
fn test_three_level_inheritance() {
    let mut env = Environment::new();
    env.add_template("a.txt", "{% block x %}A{% endblock %}").unwrap();
    env.add_template(
        "b.txt",
        r#"{% extends "a.txt" %}{% block x %}B({{ super() }}){% endblock %}"#,
    )
    .unwrap();
    env.add_template(
        "c.txt",
        r#"{% extends "b.txt" %}{% block x %}C({{ super() }}){% endblock %}"#,
    )
    .unwrap();
    assert_eq!(
        env.get_template("c.txt").unwrap().render(context!()).unwrap(),
        "C(B(A))"
    );
}

#[test]
fn test_sets_survive_extends() {
    let mut env = Environment::new();
    env.add_template("p.txt", "{{ greeting }}{% block b %}{% endblock %}")
        .unwrap();
    env.add_template(
        "c.txt",
        r#"{% extends "p.txt" %}{% set greeting = "hi" %}ignored"#,
    )
    .unwrap();
    assert_eq!(
        env.get_template("c.txt").unwrap().render(context!()).unwrap(),
        "hi"
    );
}

#[test]
fn test_extends_cycle_errors() {
    let mut env = Environment::new();
    env.add_template("selfish", r#"{% extends "selfish" %}"#).unwrap();
    let err = env
        .get_template("selfish")
        .unwrap()
        .render(context!())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
}

#[test]
fn test_self_block_reference() {
    let rv = render_str("{% block a %}A{% endblock %}-{{ self.a() }}", context!());
    assert_eq!(rv, "A-A");
}

#[test]
fn test_unknown_block_through_self() {
    let env = Environment::new();
    let err = env.render_str("{{ self.nope() }}", ()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownBlock);
}

#[test]
fn test_macro_call_block() {
    let rv = render_str(
        "{% macro wrap() %}<p>{{ caller() }}</p>{% endmacro %}{% call wrap() %}hi{% endcall %}",
        context!(),
    );
    insta::assert_snapshot!(rv, @"<p>hi</p>");
}

#[test]
fn test_call_block_without_caller_support() {
    let env = Environment::new();
    let err = env
        .render_str(
            "{% macro m() %}x{% endmacro %}{% call m() %}body{% endcall %}",
            (),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
}

#[test]
fn test_macro_defaults_and_kwargs() {
    let rv = render_str(
        "{% macro m(a, b='x') %}{{ a }}{{ b }}{% endmacro %}{{ m(1) }}|{{ m(1, 'y') }}|{{ m(b='z', a=2) }}",
        context!(),
    );
    assert_eq!(rv, "1x|1y|2z");
}

#[test]
fn test_macro_too_many_arguments() {
    let env = Environment::new();
    let err = env
        .render_str("{% macro m(a) %}{{ a }}{% endmacro %}{{ m(1, 2) }}", ())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TooManyArguments);
    let err = env
        .render_str("{% macro m(a) %}{{ a }}{% endmacro %}{{ m(1, a=2) }}", ())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TooManyArguments);
}

#[test]
fn test_macro_closure_captures_definition_site() {
    let rv = render_str(
        "{% set who = 'world' %}{% macro hi() %}hello {{ who }}{% endmacro %}{% set who = 'moon' %}{{ hi() }}",
        context!(),
    );
    // the snapshot at the definition site wins
    assert_eq!(rv, "hello world");
}

#[test]
fn test_macro_self_recursion() {
    let rv = render_str(
        "{% macro count(n) %}{{ n }}{% if n > 1 %} {{ count(n - 1) }}{% endif %}{% endmacro %}{{ count(3) }}",
        context!(),
    );
    assert_eq!(rv, "3 2 1");
}

#[test]
fn test_if_elif_else() {
    let tmpl = "{% if x == 1 %}one{% elif x == 2 %}two{% else %}many{% endif %}";
    assert_eq!(render_str(tmpl, context!(x => 1)), "one");
    assert_eq!(render_str(tmpl, context!(x => 2)), "two");
    assert_eq!(render_str(tmpl, context!(x => 3)), "many");
}

#[test]
fn test_for_else() {
    let rv = render_str(
        "{% for x in items %}{{ x }}{% else %}empty{% endfor %}",
        context!(items => Vec::<i32>::new()),
    );
    assert_eq!(rv, "empty");
}

#[test]
fn test_tuple_unpacking() {
    let rv = render_str(
        "{% for a, b in pairs %}{{ a }}-{{ b }};{% endfor %}",
        context!(pairs => vec![(1, 2), (3, 4)]),
    );
    assert_eq!(rv, "1-2;3-4;");
}

#[test]
fn test_tuple_unpacking_wrong_length() {
    let env = Environment::new();
    let err = env
        .render_str(
            "{% for a, b in pairs %}{{ a }}{% endfor %}",
            context!(pairs => vec![vec![1, 2, 3]]),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
}

#[test]
fn test_loop_filter() {
    let rv = render_str(
        "{% for x in [1, 2, 3, 4] if x is even %}{{ x }}{% endfor %}",
        context!(),
    );
    assert_eq!(rv, "24");
}

#[test]
fn test_loop_controls() {
    let rv = render_str(
        "{% for x in [1, 2, 3, 4] %}{% if x == 2 %}{% continue %}{% endif %}{% if x == 4 %}{% break %}{% endif %}{{ x }}{% endfor %}",
        context!(),
    );
    assert_eq!(rv, "13");
}

#[test]
fn test_recursive_loop() {
    let rv = render_str(
        "{% for item in tree recursive %}{{ item.name }}{% if item.children %}({{ loop(item.children) }}){% endif %}{% endfor %}",
        context!(tree => vec![context!(
            name => "a",
            children => vec![context!(name => "b", children => Vec::<Value>::new())],
        )]),
    );
    assert_eq!(rv, "a(b)");
}

#[test]
fn test_loop_cycle_and_changed() {
    let rv = render_str(
        "{% for x in [1, 2, 3] %}{{ loop.cycle('a', 'b') }}{% endfor %}",
        context!(),
    );
    assert_eq!(rv, "aba");
    let rv = render_str(
        "{% for x in [1, 1, 2] %}{{ loop.changed(x) }} {% endfor %}",
        context!(),
    );
    assert_eq!(rv, "true false true ");
}

#[test]
fn test_loop_adjacent_items() {
    let rv = render_str(
        "{% for x in [1, 2, 3] %}{{ loop.previtem }}|{{ loop.nextitem }};{% endfor %}",
        context!(),
    );
    assert_eq!(rv, "|2;1|3;2|;");
}

#[test]
fn test_one_shot_iterator_resumes_after_break() {
    let env = Environment::new();
    let nums = Value::make_one_shot_iterator("nums", 1..6i64);
    let rv = env
        .render_str(
            "{% for n in nums %}{{ n }}{% if n == 2 %}{% break %}{% endif %}{% endfor %}|{% for n in nums %}{{ n }}{% endfor %}",
            context!(nums),
        )
        .unwrap();
    assert_eq!(rv, "12|345");
}

#[test]
fn test_one_shot_iterator_loop_vars() {
    let env = Environment::new();
    let nums = Value::make_one_shot_iterator("nums", 0..3i64);
    let rv = env
        .render_str(
            "{% for n in nums %}{{ loop.index }}{{ loop.last }};{% endfor %}",
            context!(nums),
        )
        .unwrap();
    // one-shot iterators have no length so `last` reports undefined
    assert_eq!(rv, "1;2;3;");
}

#[test]
fn test_with_block() {
    let rv = render_str("{% with a = 1, b = a + 1 %}{{ a }}{{ b }}{% endwith %}{{ a }}", context!());
    assert_eq!(rv, "12");
}

#[test]
fn test_set_and_set_block() {
    assert_eq!(render_str("{% set x = 40 + 2 %}{{ x }}", context!()), "42");
    assert_eq!(
        render_str("{% set x %}hello{% endset %}{{ x }}", context!()),
        "hello"
    );
    assert_eq!(
        render_str("{% set x | upper %}abc{% endset %}{{ x }}", context!()),
        "ABC"
    );
}

#[test]
fn test_set_attribute_on_namespace() {
    let rv = render_str(
        "{% set ns = namespace(x=1) %}{% set ns.x = 2 %}{{ ns.x }}",
        context!(),
    );
    assert_eq!(rv, "2");
}

#[test]
fn test_set_attribute_on_immutable_is_noop() {
    let rv = render_str("{% set x = 42 %}{% set x.y = 1 %}{{ x }}", context!());
    assert_eq!(rv, "42");
}

#[test]
fn test_filter_block() {
    assert_eq!(
        render_str("{% filter upper %}abc{% endfilter %}", context!()),
        "ABC"
    );
}

#[test]
fn test_autoescape_block() {
    assert_eq!(
        render_str("{% autoescape true %}{{ '<' }}{% endautoescape %}{{ '<' }}", context!()),
        "&lt;<"
    );
    assert_eq!(
        render_str("{% autoescape 'json' %}{{ 'x' }}{% endautoescape %}", context!()),
        "\"x\""
    );
    let env = Environment::new();
    assert!(env
        .render_str("{% autoescape 42 %}{% endautoescape %}", ())
        .is_err());
}

#[test]
fn test_include() {
    let mut env = Environment::new();
    env.add_template("included", "I:{{ x }}").unwrap();
    env.add_template("main", r#"{% set x = 1 %}{% include "included" %}"#)
        .unwrap();
    assert_eq!(env.get_template("main").unwrap().render(context!()).unwrap(), "I:1");
}

#[test]
fn test_include_ignore_missing() {
    let env = Environment::new();
    assert_eq!(
        env.render_str(r#"a{% include "missing" ignore missing %}b"#, ())
            .unwrap(),
        "ab"
    );
    let err = env
        .render_str(r#"{% include "missing" %}"#, ())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TemplateNotFound);
}

#[test]
fn test_include_choices() {
    let mut env = Environment::new();
    env.add_template("second", "found").unwrap();
    assert_eq!(
        env.render_str(r#"{% include ["first", "second"] %}"#, ())
            .unwrap(),
        "found"
    );
    // all candidates missing with ignore missing renders nothing
    assert_eq!(
        env.render_str(r#"{% include ["first", "third"] ignore missing %}"#, ())
            .unwrap(),
        ""
    );
}

#[test]
fn test_include_does_not_leak_assignments() {
    let mut env = Environment::new();
    env.add_template("included", "{% set x = 2 %}{{ x }}").unwrap();
    env.add_template("main", r#"{% set x = 1 %}{% include "included" %}-{{ x }}"#)
        .unwrap();
    assert_eq!(
        env.get_template("main").unwrap().render(context!()).unwrap(),
        "2-1"
    );
}

#[test]
fn test_import() {
    let mut env = Environment::new();
    env.add_template(
        "macros.txt",
        "{% macro say(name) %}Hi {{ name }}!{% endmacro %}{% set answer = 42 %}",
    )
    .unwrap();
    env.add_template("main", r#"{% import "macros.txt" as m %}{{ m.say("Joe") }} {{ m.answer }}"#)
        .unwrap();
    assert_eq!(
        env.get_template("main").unwrap().render(context!()).unwrap(),
        "Hi Joe! 42"
    );
}

#[test]
fn test_from_import() {
    let mut env = Environment::new();
    env.add_template(
        "macros.txt",
        "{% macro say(name) %}Hi {{ name }}!{% endmacro %}",
    )
    .unwrap();
    env.add_template(
        "main",
        r#"{% from "macros.txt" import say as greet %}{{ greet("Joe") }}"#,
    )
    .unwrap();
    assert_eq!(
        env.get_template("main").unwrap().render(context!()).unwrap(),
        "Hi Joe!"
    );
}

#[test]
fn test_ternary_expression() {
    assert_eq!(render_str("{{ 'a' if true else 'b' }}", context!()), "a");
    assert_eq!(render_str("{{ 'a' if false else 'b' }}", context!()), "b");
    // missing else branch produces a silent undefined
    assert_eq!(render_str("{{ 'a' if false }}", context!()), "");
}

#[test]
fn test_short_circuiting_returns_operand() {
    assert_eq!(render_str("{{ 0 or 'fallback' }}", context!()), "fallback");
    assert_eq!(render_str("{{ 1 and 2 }}", context!()), "2");
}

#[test]
fn test_in_operator() {
    assert_eq!(render_str("{{ 'ell' in 'hello' }}", context!()), "true");
    assert_eq!(render_str("{{ 2 in [1, 2] }}", context!()), "true");
    assert_eq!(
        render_str("{{ 'a' in {'a': 1} }}|{{ 3 not in [1, 2] }}", context!()),
        "true|true"
    );
}

#[test]
fn test_comparisons_raise_cross_kind() {
    let env = Environment::new();
    let err = env.render_str("{{ 1 < 'a' }}", ()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    // equality never raises, it is simply false
    assert_eq!(env.render_str("{{ 1 == 'a' }}", ()).unwrap(), "false");
}

#[test]
fn test_slicing() {
    assert_eq!(render_str("{{ [1, 2, 3, 4][1:3] }}", context!()), "[2, 3]");
    assert_eq!(render_str("{{ 'abcdef'[::2] }}", context!()), "ace");
    assert_eq!(render_str("{{ 'abc'[::-1] }}", context!()), "cba");
}

#[test]
fn test_subscript_and_negative_index() {
    let rv = render_str(
        "{{ seq[0] }}{{ seq[-1] }}{{ map['key'] }}",
        context!(seq => vec![1, 2, 3], map => context!(key => "v")),
    );
    assert_eq!(rv, "13v");
}

#[test]
fn test_symbolic_test_aliases() {
    assert_eq!(render_str("{{ 1 is lessthan(2) }}", context!()), "true");
    assert_eq!(render_str("{{ 3 is greaterthan 2 }}", context!()), "true");
    // the comparison operators alias named tests for lookups by name
    let env = Environment::new();
    let state = env.empty_state();
    assert!(state.perform_test("==", &[1.into(), 1.into()]).unwrap());
    assert!(state.perform_test("!=", &[1.into(), 2.into()]).unwrap());
    assert!(state.perform_test("<=", &[1.into(), 1.into()]).unwrap());
}

#[test]
fn test_unknown_filter_and_test() {
    let env = Environment::new();
    let err = env.render_str("{{ 1|nosuchfilter }}", ()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownFilter);
    let err = env.render_str("{{ 1 is nosuchtest }}", ()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownTest);
    let err = env.render_str("{{ nosuchfunction() }}", ()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownFunction);
}

#[test]
fn test_custom_filter_and_function() {
    fn repeat(
        _state: &stencil::State,
        value: String,
        count: usize,
    ) -> Result<String, stencil::Error> {
        Ok(value.repeat(count))
    }

    fn shout(_state: &stencil::State, value: String) -> Result<String, stencil::Error> {
        Ok(format!("{}!", value.to_uppercase()))
    }

    let mut env = Environment::new();
    env.add_filter("repeat", repeat);
    env.add_function("shout", shout);
    assert_eq!(
        env.render_str("{{ 'na'|repeat(3) }} {{ shout('hey') }}", ())
            .unwrap(),
        "nanana HEY!"
    );
}

#[test]
fn test_splat_call_arguments() {
    let rv = render_str(
        "{% macro m(a, b, c) %}{{ a }}{{ b }}{{ c }}{% endmacro %}{{ m(*[1, 2], **{'c': 3}) }}",
        context!(),
    );
    assert_eq!(rv, "123");
}

#[test]
fn test_macro_recursion_limit() {
    let env = Environment::new();
    let err = env
        .render_str(
            "{% macro f(n) %}{{ f(n + 1) }}{% endmacro %}{{ f(0) }}",
            (),
        )
        .unwrap_err();
    // the error surfaces through the macro call chain
    let mut err: &dyn std::error::Error = &err;
    let mut found = false;
    loop {
        if err.to_string().contains("recursion limit exceeded") {
            found = true;
            break;
        }
        match err.source() {
            Some(source) => err = source,
            None => break,
        }
    }
    assert!(found);
}

#[test]
fn test_include_recursion_limit() {
    let mut env = Environment::new();
    env.add_template("rec", r#"{% include "rec" %}"#).unwrap();
    assert!(env.get_template("rec").unwrap().render(context!()).is_err());
}

#[test]
fn test_do_statement() {
    // the call is evaluated, the result is thrown away
    assert_eq!(render_str("{% do range(3) %}x", context!()), "x");
    let env = Environment::new();
    assert!(env.render_str("{% do nosuchfunction() %}", ()).is_err());
}

#[test]
fn test_raw_block() {
    assert_eq!(
        render_str("{% raw %}{{ not evaluated }}{% endraw %}", context!()),
        "{{ not evaluated }}"
    );
}

#[test]
fn test_line_statements() {
    let mut env = Environment::new();
    env.set_syntax(
        stencil::syntax::SyntaxConfig::builder()
            .line_statement_prefix("#")
            .line_comment_prefix("##")
            .build()
            .unwrap(),
    );
    let rv = env
        .render_str(
            "# for x in [1, 2]\n{{ x }} ## inline comment\n# endfor\n",
            (),
        )
        .unwrap();
    // the newline terminating a content line stays, the one terminating a
    // line statement is consumed
    assert_eq!(rv, "1 \n2 \n");
}

#[test]
fn test_custom_delimiters() {
    let mut env = Environment::new();
    env.set_syntax(
        stencil::syntax::SyntaxConfig::builder()
            .block_delimiters("<%", "%>")
            .variable_delimiters("<<", ">>")
            .comment_delimiters("<#", "#>")
            .build()
            .unwrap(),
    );
    let rv = env
        .render_str("<% if true %><< 42 >><# gone #><% endif %>", ())
        .unwrap();
    assert_eq!(rv, "42");
}

#[test]
fn test_trim_and_lstrip_blocks() {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    let rv = env
        .render_str("{% if true %}\n    {% if true %}\nx\n    {% endif %}\n{% endif %}\n", ())
        .unwrap();
    assert_eq!(rv, "x\n");
}

#[test]
fn test_whitespace_trim_markers() {
    assert_eq!(
        render_str("  {%- if true -%}   x   {%- endif -%}  ", context!()),
        "x"
    );
}

#[test]
fn test_error_location() {
    let mut env = Environment::new();
    env.add_template("bad.txt", "line one\n{{ 1 / }}").unwrap_err();
    let err = env
        .render_named_str("runtime.txt", "hello\n{{ 1|nosuch }}", ())
        .unwrap_err();
    assert_eq!(err.name(), Some("runtime.txt"));
    assert_eq!(err.line(), Some(2));
}

#[test]
fn test_render_to_write() {
    let mut env = Environment::new();
    env.add_template("hello", "Hello {{ name }}!").unwrap();
    let tmpl = env.get_template("hello").unwrap();
    let mut buf = Vec::new();
    tmpl.render_to_write(context!(name => "IO"), &mut buf).unwrap();
    assert_eq!(String::from_utf8(buf).unwrap(), "Hello IO!");
}

#[test]
fn test_cancellation() {
    let mut env = Environment::new();
    env.add_template("spin", "{% for x in range(100000) %}{{ x }}{% endfor %}")
        .unwrap();
    let tmpl = env.get_template("spin").unwrap();
    let handle = stencil::CancelHandle::new();
    handle.cancel();
    let err = tmpl.render_cancelable(context!(), handle).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
}

#[test]
fn test_globals_and_functions_lookup_order() {
    let mut env = Environment::new();
    env.add_global("answer", 42);
    assert_eq!(env.render_str("{{ answer }}", ()).unwrap(), "42");
    // context beats globals
    assert_eq!(
        env.render_str("{{ answer }}", context!(answer => 1)).unwrap(),
        "1"
    );
    // range comes from the function registry
    assert_eq!(env.render_str("{{ range(3) }}", ()).unwrap(), "[0, 1, 2]");
}
