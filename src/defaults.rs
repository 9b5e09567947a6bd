use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::error::Error;
use crate::eval::State;
use crate::filters::{self, BoxedFilter};
use crate::functions::{self, BoxedFunction};
use crate::output::Output;
use crate::tests::{self, BoxedTest};
use crate::utils::{write_escaped, AutoEscape};
use crate::value::Value;

pub(crate) fn no_auto_escape(_: &str) -> AutoEscape {
    AutoEscape::None
}

/// The default logic for auto escaping based on file extension.
///
/// Template name suffixes `.j2`, `.jinja` and `.jinja2` are stripped
/// before the extension is matched:
///
/// * [`Html`](AutoEscape::Html): `.html`, `.htm`, `.xml`
/// * [`Json`](AutoEscape::Json): `.json`, `.json5`, `.js`, `.yaml`, `.yml`
/// * [`None`](AutoEscape::None): _all others_
pub fn default_auto_escape_callback(name: &str) -> AutoEscape {
    let name = name
        .strip_suffix(".j2")
        .or_else(|| name.strip_suffix(".jinja"))
        .or_else(|| name.strip_suffix(".jinja2"))
        .unwrap_or(name);
    match name.rsplit('.').next() {
        Some("html" | "htm" | "xml") => AutoEscape::Html,
        Some("json" | "json5" | "js" | "yaml" | "yml") => AutoEscape::Json,
        _ => AutoEscape::None,
    }
}

/// The default formatter.
///
/// This formatter takes a value and directly writes it into the output
/// while honoring the requested auto escape format of the state.  If the
/// value is already marked as safe, it's handled as if no auto escaping
/// was requested.
///
/// * [`Html`](AutoEscape::Html): performs HTML escaping
/// * [`Json`](AutoEscape::Json): serializes values to JSON
/// * [`None`](AutoEscape::None): no escaping
/// * [`Custom(..)`](AutoEscape::Custom): results in an error
pub fn escape_formatter(out: &mut Output, state: &State, value: &Value) -> Result<(), Error> {
    write_escaped(out, state.auto_escape(), value)
}

pub(crate) fn get_builtin_filters() -> BTreeMap<Cow<'static, str>, BoxedFilter> {
    let mut rv = BTreeMap::new();
    rv.insert("safe".into(), BoxedFilter::new(filters::safe));
    let escape = BoxedFilter::new(filters::escape);
    rv.insert("escape".into(), escape.clone());
    rv.insert("e".into(), escape);
    rv.insert("lower".into(), BoxedFilter::new(filters::lower));
    rv.insert("upper".into(), BoxedFilter::new(filters::upper));
    let length = BoxedFilter::new(filters::length);
    rv.insert("length".into(), length.clone());
    rv.insert("count".into(), length);
    rv.insert("trim".into(), BoxedFilter::new(filters::trim));
    rv.insert("join".into(), BoxedFilter::new(filters::join));
    let default = BoxedFilter::new(filters::default);
    rv.insert("default".into(), default.clone());
    rv.insert("d".into(), default);
    rv.insert("tojson".into(), BoxedFilter::new(filters::tojson));
    rv
}

pub(crate) fn get_builtin_tests() -> BTreeMap<Cow<'static, str>, BoxedTest> {
    let mut rv = BTreeMap::new();
    rv.insert("undefined".into(), BoxedTest::new(tests::is_undefined));
    rv.insert("defined".into(), BoxedTest::new(tests::is_defined));
    rv.insert("none".into(), BoxedTest::new(tests::is_none));
    let is_safe = BoxedTest::new(tests::is_safe);
    rv.insert("safe".into(), is_safe.clone());
    rv.insert("escaped".into(), is_safe);
    rv.insert("odd".into(), BoxedTest::new(tests::is_odd));
    rv.insert("even".into(), BoxedTest::new(tests::is_even));
    rv.insert("number".into(), BoxedTest::new(tests::is_number));
    rv.insert("string".into(), BoxedTest::new(tests::is_string));
    rv.insert("sequence".into(), BoxedTest::new(tests::is_sequence));
    rv.insert("mapping".into(), BoxedTest::new(tests::is_mapping));

    // the comparison operators double as tests under their symbolic
    // names so that `x is ==(1)` style expressions work.
    let is_eq = BoxedTest::new(tests::is_eq);
    rv.insert("eq".into(), is_eq.clone());
    rv.insert("equalto".into(), is_eq.clone());
    rv.insert("==".into(), is_eq);
    let is_ne = BoxedTest::new(tests::is_ne);
    rv.insert("ne".into(), is_ne.clone());
    rv.insert("!=".into(), is_ne);
    let is_lt = BoxedTest::new(tests::is_lt);
    rv.insert("lt".into(), is_lt.clone());
    rv.insert("lessthan".into(), is_lt.clone());
    rv.insert("<".into(), is_lt);
    let is_le = BoxedTest::new(tests::is_le);
    rv.insert("le".into(), is_le.clone());
    rv.insert("<=".into(), is_le);
    let is_gt = BoxedTest::new(tests::is_gt);
    rv.insert("gt".into(), is_gt.clone());
    rv.insert("greaterthan".into(), is_gt.clone());
    rv.insert(">".into(), is_gt);
    let is_ge = BoxedTest::new(tests::is_ge);
    rv.insert("ge".into(), is_ge.clone());
    rv.insert(">=".into(), is_ge);
    rv.insert("in".into(), BoxedTest::new(tests::is_in));
    rv
}

pub(crate) fn get_builtin_functions() -> BTreeMap<Cow<'static, str>, Value> {
    let mut rv = BTreeMap::new();
    rv.insert(
        "range".into(),
        BoxedFunction::new("range", functions::range).to_value(),
    );
    rv.insert(
        "dict".into(),
        BoxedFunction::new("dict", functions::dict).to_value(),
    );
    rv.insert(
        "namespace".into(),
        BoxedFunction::new("namespace", functions::namespace).to_value(),
    );
    rv
}

pub(crate) fn get_globals() -> BTreeMap<Cow<'static, str>, Value> {
    BTreeMap::new()
}
