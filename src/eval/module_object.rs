use std::fmt;
use std::sync::Arc;

use crate::value::{Object, Value, ValueMap};

/// Holds the exports of an imported template.
#[derive(Debug)]
pub(crate) struct Module {
    name: Arc<str>,
    values: ValueMap,
}

impl Module {
    pub fn new(name: Arc<str>, values: ValueMap) -> Module {
        Module { name, values }
    }

    pub fn get_export(&self, name: &str) -> Option<Value> {
        self.values.get(name).cloned()
    }
}

impl Object for Module {
    fn get_attr(&self, name: &str) -> Option<Value> {
        self.values.get(name).cloned()
    }

    fn enumerate(&self) -> Option<Vec<Value>> {
        Some(self.values.keys().map(|k| Value::from(k.clone())).collect())
    }

    fn render(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<module {:?}>", self.name)
    }
}
