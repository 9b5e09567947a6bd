use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use similar_asserts::assert_eq;

use stencil::{context, Environment, ErrorKind};

#[test]
fn test_loader_basic() {
    let mut env = Environment::new();
    env.set_loader(|name| {
        if name == "layout.txt" {
            Ok(Some("Hello {{ name }}!".into()))
        } else {
            Ok(None)
        }
    });
    let tmpl = env.get_template("layout.txt").unwrap();
    assert_eq!(tmpl.render(context!(name => "World")).unwrap(), "Hello World!");
    let err = env.get_template("missing.txt").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TemplateNotFound);
}

#[test]
fn test_loader_invoked_once_per_name() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut env = Environment::new();
    {
        let counter = counter.clone();
        env.set_loader(move |name| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Some(format!("template {name}")))
        });
    }
    for _ in 0..3 {
        env.get_template("a.txt").unwrap().render(context!()).unwrap();
    }
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    // removing the template forces a reload
    env.remove_template("a.txt");
    env.get_template("a.txt").unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[test]
fn test_owned_templates() {
    let mut env = Environment::new();
    let name = String::from("owned.txt");
    let source = String::from("{{ 40 + 2 }}");
    env.add_template_owned(name, source).unwrap();
    assert_eq!(
        env.get_template("owned.txt").unwrap().render(context!()).unwrap(),
        "42"
    );
}

#[test]
fn test_clear_templates() {
    let mut env = Environment::new();
    env.add_template("x", "x").unwrap();
    assert_eq!(env.templates().count(), 1);
    env.clear_templates();
    assert_eq!(env.templates().count(), 0);
}

#[test]
fn test_path_join_callback() {
    let mut env = Environment::new();
    env.add_template("sub/other.txt", "other").unwrap();
    env.add_template("sub/main.txt", r#"{% include "other.txt" %}"#)
        .unwrap();
    env.set_path_join_callback(|name, parent| {
        let mut rv = parent.split('/').collect::<Vec<_>>();
        rv.pop();
        name.split('/').for_each(|segment| match segment {
            "." => {}
            ".." => {
                rv.pop();
            }
            _ => rv.push(segment),
        });
        rv.join("/").into()
    });
    assert_eq!(
        env.get_template("sub/main.txt")
            .unwrap()
            .render(context!())
            .unwrap(),
        "other"
    );
}

#[test]
fn test_loader_error_propagates() {
    let mut env = Environment::new();
    env.set_loader(|_| {
        Err(stencil::Error::new(
            ErrorKind::InvalidOperation,
            "loader blew up",
        ))
    });
    let err = env.get_template("any").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
}
