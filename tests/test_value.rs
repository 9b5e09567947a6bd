use similar_asserts::assert_eq;

use stencil::value::{Object, ObjectRepr, Value, ValueKind};
use stencil::{context, Environment};

#[test]
fn test_value_kinds() {
    assert_eq!(Value::from(42).kind(), ValueKind::Number);
    assert_eq!(Value::from(42.5).kind(), ValueKind::Number);
    assert_eq!(Value::from("x").kind(), ValueKind::String);
    assert_eq!(Value::from(true).kind(), ValueKind::Bool);
    assert_eq!(Value::from(()).kind(), ValueKind::None);
    assert_eq!(Value::UNDEFINED.kind(), ValueKind::Undefined);
    assert_eq!(Value::from(vec![1, 2]).kind(), ValueKind::Seq);
    assert_eq!(context!(a => 1).kind(), ValueKind::Map);
}

#[test]
fn test_truthiness() {
    assert!(Value::from(1).is_true());
    assert!(!Value::from(0).is_true());
    assert!(!Value::from("").is_true());
    assert!(Value::from("x").is_true());
    assert!(!Value::from(()).is_true());
    assert!(!Value::UNDEFINED.is_true());
    assert!(!Value::from(Vec::<i32>::new()).is_true());
    assert!(Value::from(vec![1]).is_true());
}

#[test]
fn test_number_equality_across_representations() {
    assert_eq!(Value::from(42), Value::from(42.0));
    assert_eq!(Value::from(true), Value::from(1));
    assert_ne!(Value::from(42), Value::from("42"));
}

#[test]
fn test_safe_string_flag() {
    let safe = Value::from_safe_string("<b>".into());
    assert!(safe.is_safe());
    assert!(!Value::from("<b>").is_safe());
    // content equality ignores the safe flag
    assert_eq!(safe, Value::from("<b>"));
}

#[test]
fn test_serde_ingress() {
    #[derive(serde::Serialize)]
    struct Point {
        x: i32,
        y: i32,
    }

    let value = Value::from_serializable(&Point { x: 1, y: 2 });
    assert_eq!(value.get_attr("x").unwrap(), Value::from(1));
    assert_eq!(value.get_attr("y").unwrap(), Value::from(2));
    assert_eq!(value.kind(), ValueKind::Map);
}

#[test]
fn test_value_roundtrips_through_context() {
    // values passed through serialization come out unchanged, including
    // dynamic objects
    #[derive(Debug)]
    struct Thing;

    impl Object for Thing {
        fn repr(&self) -> ObjectRepr {
            ObjectRepr::Plain
        }

        fn get_attr(&self, name: &str) -> Option<Value> {
            (name == "id").then(|| Value::from(42))
        }
    }

    let env = Environment::new();
    let rv = env
        .render_str("{{ thing.id }}", context!(thing => Value::from_object(Thing)))
        .unwrap();
    assert_eq!(rv, "42");
}

#[test]
fn test_sequence_and_map_display() {
    let env = Environment::new();
    assert_eq!(env.render_str("{{ [1, 'a'] }}", ()).unwrap(), "[1, \"a\"]");
    assert_eq!(
        env.render_str("{{ {'a': 1} }}", ()).unwrap(),
        "{\"a\": 1}"
    );
}

#[test]
fn test_map_iteration_is_deterministic() {
    let env = Environment::new();
    let rv = env
        .render_str(
            "{% for k in m %}{{ k }}{% endfor %}",
            context!(m => context!(b => 1, a => 2, c => 3)),
        )
        .unwrap();
    assert_eq!(rv, "abc");
}

#[test]
fn test_string_iteration_and_indexing() {
    let env = Environment::new();
    assert_eq!(
        env.render_str("{% for c in 'abc' %}{{ c }}.{% endfor %}", ())
            .unwrap(),
        "a.b.c."
    );
    assert_eq!(env.render_str("{{ 'abc'[1] }}", ()).unwrap(), "b");
}

#[test]
fn test_object_capabilities() {
    #[derive(Debug)]
    struct Collection;

    impl Object for Collection {
        fn repr(&self) -> ObjectRepr {
            ObjectRepr::Seq
        }

        fn enumerate(&self) -> Option<Vec<Value>> {
            Some(vec![Value::from(1), Value::from(2)])
        }
    }

    let env = Environment::new();
    let rv = env
        .render_str(
            "{{ c|length }}:{% for x in c %}{{ x }}{% endfor %}",
            context!(c => Value::from_object(Collection)),
        )
        .unwrap();
    assert_eq!(rv, "2:12");
}

#[test]
fn test_callable_object() {
    #[derive(Debug)]
    struct Adder;

    impl Object for Adder {
        fn repr(&self) -> ObjectRepr {
            ObjectRepr::Plain
        }

        fn call(
            &self,
            _state: &stencil::State,
            args: &[Value],
        ) -> Result<Value, stencil::Error> {
            let mut sum = 0i64;
            for arg in args {
                sum += arg.as_i64().unwrap_or(0);
            }
            Ok(Value::from(sum))
        }
    }

    let env = Environment::new();
    let rv = env
        .render_str("{{ add(1, 2, 3) }}", context!(add => Value::from_object(Adder)))
        .unwrap();
    assert_eq!(rv, "6");
}

#[test]
fn test_downcast() {
    #[derive(Debug)]
    struct Marker(u32);

    impl Object for Marker {}

    let value = Value::from_object(Marker(7));
    assert_eq!(value.downcast_object_ref::<Marker>().unwrap().0, 7);
}
