use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::environment::Environment;
use crate::error::{Error, ErrorKind};
use crate::eval::loop_object::LoopState;
use crate::value::{Value, ValueMap};

pub(crate) type Locals<'env> = BTreeMap<&'env str, Value>;

/// One scope layer of the context.
pub(crate) struct Frame<'template, 'env> {
    pub locals: Locals<'env>,
    pub ctx: Value,
    pub current_loop: Option<LoopState<'template, 'env>>,
}

impl Default for Frame<'_, '_> {
    fn default() -> Self {
        Frame::new(Value::UNDEFINED)
    }
}

impl<'template, 'env> Frame<'template, 'env> {
    /// Creates a new frame with the given context value.
    pub fn new(ctx: Value) -> Frame<'template, 'env> {
        Frame {
            locals: Locals::new(),
            ctx,
            current_loop: None,
        }
    }

    /// Creates a new frame and validates the context value.
    pub fn new_checked(root: Value) -> Result<Frame<'template, 'env>, Error> {
        Ok(Frame::new(ok!(root.validate())))
    }

    /// Clones the frame without loop state.
    fn clone_flat(&self) -> Frame<'template, 'env> {
        Frame {
            locals: self.locals.clone(),
            ctx: self.ctx.clone(),
            current_loop: None,
        }
    }
}

/// The scope stack of a render.
pub(crate) struct Context<'template, 'env> {
    env: &'env Environment<'env>,
    stack: Vec<Frame<'template, 'env>>,
    outer_stack_depth: usize,
    recursion_limit: usize,
}

impl fmt::Debug for Context<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut m = f.debug_map();
        for frame in self.stack.iter().rev() {
            m.entries(frame.locals.iter());
        }
        m.finish()
    }
}

impl<'template, 'env> Context<'template, 'env> {
    /// Creates an empty context.
    pub fn new(env: &'env Environment<'env>) -> Context<'template, 'env> {
        Context {
            env,
            stack: Vec::with_capacity(12),
            outer_stack_depth: 0,
            recursion_limit: env.recursion_limit(),
        }
    }

    /// Creates a context with a root frame.
    pub fn new_with_frame(
        env: &'env Environment<'env>,
        frame: Frame<'template, 'env>,
    ) -> Context<'template, 'env> {
        let mut rv = Context::new(env);
        rv.stack.push(frame);
        rv
    }

    /// The environment of the context.
    #[inline(always)]
    pub fn env(&self) -> &'env Environment<'env> {
        self.env
    }

    /// Stores a variable in the innermost scope.
    pub fn store(&mut self, key: &'env str, value: Value) {
        self.stack.last_mut().unwrap().locals.insert(key, value);
    }

    /// Looks up a variable in the scope stack.
    ///
    /// The scopes are consulted inner to outer.  For each scope the locals
    /// win over the frame context value.  Globals and functions are not
    /// resolved here; that is the responsibility of the state.
    pub fn load(&self, key: &str) -> Option<Value> {
        for frame in self.stack.iter().rev() {
            // look at locals first
            if let Some(value) = frame.locals.get(key) {
                return Some(value.clone());
            }

            // if we are a loop, check if we are looking up the special loop var.
            if let Some(ref l) = frame.current_loop {
                if key == "loop" {
                    return Some(Value::from_arc_object(l.object.clone()));
                }
            }

            // perform a fast lookup.  This one will not produce errors if the
            // context is undefined or of the wrong type.
            if let Some(rv) = frame.ctx.get_attr_fast(key) {
                return Some(rv);
            }
        }

        None
    }

    /// Returns a flattened snapshot of the visible scopes.
    ///
    /// This is used when a macro is declared so it can close over the
    /// values at its definition site.  The root context value is excluded
    /// as it travels along separately.
    pub fn snapshot_for_closure(&self) -> ValueMap {
        let mut rv = ValueMap::new();
        for (idx, frame) in self.stack.iter().enumerate() {
            if idx > 0 {
                if let Some(map) = frame.ctx.as_map() {
                    for (key, value) in map.iter() {
                        rv.insert(key.clone(), value.clone());
                    }
                }
            }
            for (key, value) in frame.locals.iter() {
                rv.insert(Arc::from(*key), value.clone());
            }
        }
        rv
    }

    /// Return the base context value.
    pub fn clone_base(&self) -> Value {
        self.stack
            .first()
            .map(|x| x.ctx.clone())
            .unwrap_or_default()
    }

    /// Clones the context for a nested render.
    ///
    /// Loop states cannot travel, frames are flattened without them.
    pub fn clone_for_subrender(&self) -> Context<'template, 'env> {
        Context {
            env: self.env,
            stack: self.stack.iter().map(|x| x.clone_flat()).collect(),
            outer_stack_depth: self.outer_stack_depth,
            recursion_limit: self.recursion_limit,
        }
    }

    /// Pushes a new layer.
    pub fn push_frame(&mut self, layer: Frame<'template, 'env>) -> Result<(), Error> {
        ok!(self.check_depth());
        self.stack.push(layer);
        Ok(())
    }

    /// Pops the topmost layer.
    #[track_caller]
    pub fn pop_frame(&mut self) -> Frame<'template, 'env> {
        self.stack.pop().unwrap()
    }

    /// Returns the root locals (exports).
    #[track_caller]
    pub fn exports(&self) -> &Locals<'env> {
        &self.stack.first().unwrap().locals
    }

    /// Returns the locals of the innermost scope.
    #[track_caller]
    pub fn current_locals(&self) -> &Locals<'env> {
        &self.stack.last().unwrap().locals
    }

    /// Takes the locals of the innermost scope.
    #[track_caller]
    pub fn take_current_locals(&mut self) -> Locals<'env> {
        std::mem::take(&mut self.stack.last_mut().unwrap().locals)
    }

    /// Returns the current innermost loop state.
    pub fn current_loop(&mut self) -> Option<&mut LoopState<'template, 'env>> {
        self.stack
            .iter_mut()
            .rev()
            .find_map(|x| x.current_loop.as_mut())
    }

    /// The real depth of the context.
    pub fn depth(&self) -> usize {
        self.outer_stack_depth + self.stack.len()
    }

    /// Increase the stack depth.
    pub fn incr_depth(&mut self, delta: usize) -> Result<(), Error> {
        self.outer_stack_depth += delta;
        ok!(self.check_depth());
        Ok(())
    }

    /// Decrease the stack depth.
    pub fn decr_depth(&mut self, delta: usize) {
        self.outer_stack_depth -= delta;
    }

    fn check_depth(&self) -> Result<(), Error> {
        if self.depth() > self.recursion_limit {
            return Err(Error::new(
                ErrorKind::InvalidOperation,
                "recursion limit exceeded",
            ));
        }
        Ok(())
    }
}
