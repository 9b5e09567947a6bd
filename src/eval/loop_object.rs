use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::compiler::ast;
use crate::error::{Error, ErrorKind};
use crate::eval::State;
use crate::value::{Object, ObjectRepr, OneShotIterator, Value};

/// The item source of a running loop.
pub(crate) enum LoopIter {
    /// Materialized items.
    Items(std::vec::IntoIter<Value>),
    /// Pull based iteration from a shared one-shot cursor.
    ///
    /// Items the loop does not consume remain in the cursor so a later
    /// loop over the same value resumes where this one stopped.
    Shared(Arc<OneShotIterator>),
}

impl LoopIter {
    fn next_item(&mut self) -> Option<Value> {
        match self {
            LoopIter::Items(iter) => iter.next(),
            LoopIter::Shared(iter) => iter.pull_next(),
        }
    }
}

/// The object exposed to templates as `loop`.
pub(crate) struct Loop {
    pub len: Option<usize>,
    pub idx: AtomicUsize,
    pub depth: usize,
    pub last_changed_value: Mutex<Option<Vec<Value>>>,
    prev_item: Mutex<Value>,
    peeked: Mutex<Option<Option<Value>>>,
    iter: Mutex<LoopIter>,
}

impl Loop {
    fn new(iter: LoopIter, len: Option<usize>, depth: usize) -> Loop {
        Loop {
            len,
            idx: AtomicUsize::new(0),
            depth,
            last_changed_value: Mutex::new(None),
            prev_item: Mutex::new(Value::UNDEFINED),
            peeked: Mutex::new(None),
            iter: Mutex::new(iter),
        }
    }

    /// Pulls the next item, preferring a cached peek.
    fn pull(&self) -> Option<Value> {
        match self.peeked.lock().unwrap().take() {
            Some(peeked) => peeked,
            None => self.iter.lock().unwrap().next_item(),
        }
    }

    /// Peeks the next item and caches it for the following iteration.
    fn peek(&self) -> Option<Value> {
        let mut peeked = self.peeked.lock().unwrap();
        if peeked.is_none() {
            *peeked = Some(self.iter.lock().unwrap().next_item());
        }
        peeked.as_ref().unwrap().clone()
    }
}

impl fmt::Debug for Loop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Loop");
        s.field("index0", &self.idx.load(Ordering::Relaxed));
        s.field("length", &self.len);
        s.field("depth0", &self.depth);
        s.finish()
    }
}

impl Object for Loop {
    fn repr(&self) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_attr(&self, name: &str) -> Option<Value> {
        let idx = self.idx.load(Ordering::Relaxed);
        Some(match name {
            "index0" => Value::from(idx),
            "index" => Value::from(idx + 1),
            "length" => self.len.map(Value::from).unwrap_or(Value::UNDEFINED),
            "revindex" => self
                .len
                .map(|len| Value::from(len.saturating_sub(idx)))
                .unwrap_or(Value::UNDEFINED),
            "revindex0" => self
                .len
                .map(|len| Value::from(len.saturating_sub(idx).saturating_sub(1)))
                .unwrap_or(Value::UNDEFINED),
            "first" => Value::from(idx == 0),
            "last" => match self.len {
                Some(len) => Value::from(len == 0 || idx == len - 1),
                None => Value::UNDEFINED,
            },
            "depth" => Value::from(self.depth + 1),
            "depth0" => Value::from(self.depth),
            "previtem" => self.prev_item.lock().unwrap().clone(),
            "nextitem" => self.peek().unwrap_or(Value::UNDEFINED),
            _ => return None,
        })
    }

    fn call(&self, _state: &State, _args: &[Value]) -> Result<Value, Error> {
        Err(Error::new(
            ErrorKind::InvalidOperation,
            "loop cannot be called if reassigned to different variable",
        ))
    }

    fn call_method(&self, _state: &State, name: &str, args: &[Value]) -> Result<Value, Error> {
        if name == "changed" {
            let mut last_changed_value = self.last_changed_value.lock().unwrap();
            let value = args.to_owned();
            let changed = last_changed_value.as_ref() != Some(&value);
            if changed {
                *last_changed_value = Some(value);
                Ok(Value::from(true))
            } else {
                Ok(Value::from(false))
            }
        } else if name == "cycle" {
            if args.is_empty() {
                return Ok(Value::UNDEFINED);
            }
            let idx = self.idx.load(Ordering::Relaxed);
            Ok(args[idx % args.len()].clone())
        } else {
            Err(Error::new(
                ErrorKind::UnknownMethod,
                format!("loop object has no method named {name}"),
            ))
        }
    }

    fn is_true(&self) -> bool {
        true
    }

    fn render(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.len {
            Some(len) => write!(f, "<loop {}/{}>", self.idx.load(Ordering::Relaxed), len),
            None => write!(f, "<loop {}/?>", self.idx.load(Ordering::Relaxed)),
        }
    }
}

/// Per frame loop bookkeeping.
pub(crate) struct LoopState<'template, 'env> {
    /// The loop node when the loop was declared `recursive`.
    pub recurse: Option<&'template ast::Spanned<ast::ForLoop<'env>>>,
    pub object: Arc<Loop>,
    idx: usize,
    last: Option<Value>,
}

impl<'template, 'env> LoopState<'template, 'env> {
    pub fn new(
        iter: LoopIter,
        len: Option<usize>,
        depth: usize,
        recurse: Option<&'template ast::Spanned<ast::ForLoop<'env>>>,
    ) -> LoopState<'template, 'env> {
        LoopState {
            recurse,
            object: Arc::new(Loop::new(iter, len, depth)),
            idx: 0,
            last: None,
        }
    }

    /// Advances the loop by one item.
    pub fn next(&mut self) -> Option<Value> {
        let item = some!(self.object.pull());
        *self.object.prev_item.lock().unwrap() =
            self.last.replace(item.clone()).unwrap_or(Value::UNDEFINED);
        self.object.idx.store(self.idx, Ordering::Relaxed);
        self.idx += 1;
        Some(item)
    }

    /// Reports if the loop did not produce a single item.
    pub fn did_not_iterate(&self) -> bool {
        self.idx == 0
    }
}
