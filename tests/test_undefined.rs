use similar_asserts::assert_eq;

use stencil::{context, Environment, ErrorKind, UndefinedBehavior};

fn env_with(behavior: UndefinedBehavior) -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(behavior);
    env
}

#[test]
fn test_lenient() {
    let env = env_with(UndefinedBehavior::Lenient);
    assert_eq!(env.render_str("[{{ missing }}]", ()).unwrap(), "[]");
    assert_eq!(
        env.render_str("{% for x in missing %}x{% endfor %}", ())
            .unwrap(),
        ""
    );
    assert_eq!(
        env.render_str("{% if missing %}a{% else %}b{% endif %}", ())
            .unwrap(),
        "b"
    );
    // chained lookups on undefined stay undefined
    assert_eq!(env.render_str("[{{ a.b.c }}]", ()).unwrap(), "[]");
}

#[test]
fn test_chainable() {
    let env = env_with(UndefinedBehavior::Chainable);
    assert_eq!(env.render_str("[{{ a.b.c }}]", ()).unwrap(), "[]");
    assert_eq!(env.render_str("[{{ a['b'][0] }}]", ()).unwrap(), "[]");
}

#[test]
fn test_semi_strict() {
    let env = env_with(UndefinedBehavior::SemiStrict);
    let err = env.render_str("{{ missing }}", ()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UndefinedError);
    let err = env
        .render_str("{% for x in missing %}x{% endfor %}", ())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UndefinedError);
    let err = env.render_str("{{ a.b }}", ()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UndefinedError);
    // truthiness checks remain allowed
    assert_eq!(
        env.render_str("{% if missing %}a{% else %}b{% endif %}", ())
            .unwrap(),
        "b"
    );
}

#[test]
fn test_strict() {
    let env = env_with(UndefinedBehavior::Strict);
    let err = env.render_str("{{ missing }}", ()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UndefinedError);
    let err = env
        .render_str("{% if missing %}a{% endif %}", ())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UndefinedError);
    let err = env.render_str("{{ a.b }}", ()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UndefinedError);
}

#[test]
fn test_strict_exceptions() {
    // these always succeed regardless of the mode
    let env = env_with(UndefinedBehavior::Strict);
    assert_eq!(env.render_str("{{ missing is defined }}", ()).unwrap(), "false");
    assert_eq!(env.render_str("{{ missing is undefined }}", ()).unwrap(), "true");
    assert_eq!(env.render_str("{{ missing is none }}", ()).unwrap(), "false");
    assert_eq!(env.render_str("{{ not missing }}", ()).unwrap(), "true");
}

#[test]
fn test_silent_undefined_never_fails() {
    // the missing else branch of a ternary produces a silent undefined
    // that even strict mode tolerates
    let env = env_with(UndefinedBehavior::Strict);
    assert_eq!(env.render_str("[{{ 'x' if false }}]", ()).unwrap(), "[]");
    assert_eq!(
        env.render_str("{% set v = 'x' if false %}[{{ v }}]", ())
            .unwrap(),
        "[]"
    );
    // it also survives being passed through a filter argument position
    assert_eq!(
        env.render_str("{{ ('x' if false)|default('fallback') }}", ())
            .unwrap(),
        "fallback"
    );
}

#[test]
fn test_defined_values_are_unaffected() {
    let env = env_with(UndefinedBehavior::Strict);
    assert_eq!(
        env.render_str("{{ present }}", context!(present => 1)).unwrap(),
        "1"
    );
}
