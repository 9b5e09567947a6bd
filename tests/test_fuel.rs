use similar_asserts::assert_eq;

use stencil::{context, Environment, ErrorKind};

#[test]
fn test_fuel_exhaustion() {
    let mut env = Environment::new();
    env.set_fuel(Some(50));
    let err = env
        .render_str("{% for x in range(10000) %}{{ x }}{% endfor %}", context!())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfFuel);
}

#[test]
fn test_enough_fuel_succeeds() {
    let mut env = Environment::new();
    env.set_fuel(Some(10000));
    let rv = env
        .render_str("{% for x in range(3) %}{{ x }}{% endfor %}", context!())
        .unwrap();
    assert_eq!(rv, "012");
}

#[test]
fn test_fuel_shared_with_macro_calls() {
    // a macro render consumes from the same budget as the host render
    let mut env = Environment::new();
    env.set_fuel(Some(30));
    let err = env
        .render_str(
            "{% macro noisy() %}{% for x in range(1000) %}{{ x }}{% endfor %}{% endmacro %}{{ noisy() }}",
            context!(),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfFuel);
}

#[test]
fn test_fuel_levels_visible_to_filters() {
    fn fuelcheck(
        state: &stencil::State,
        value: stencil::Value,
    ) -> Result<stencil::Value, stencil::Error> {
        let (consumed, _remaining) = state.fuel_levels().expect("fuel enabled");
        assert!(consumed > 0);
        Ok(value)
    }

    let mut env = Environment::new();
    env.set_fuel(Some(1000));
    env.add_filter("fuelcheck", fuelcheck);
    env.render_str("{{ 42|fuelcheck }}", context!()).unwrap();
}

#[test]
fn test_cancel_mid_render() {
    let mut env = Environment::new();
    env.add_template("t", "{{ 1 }}{{ 2 }}").unwrap();
    let tmpl = env.get_template("t").unwrap();
    let handle = stencil::CancelHandle::new();
    assert!(!handle.is_cancelled());
    // not signalled, the render completes
    assert_eq!(tmpl.render_cancelable(context!(), handle.clone()).unwrap(), "12");
    handle.cancel();
    assert!(tmpl.render_cancelable(context!(), handle).is_err());
}
