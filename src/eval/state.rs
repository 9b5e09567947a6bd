use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::compiler::ast;
use crate::environment::Environment;
use crate::error::{Error, ErrorKind};
use crate::eval::cancel::CancelHandle;
use crate::eval::context::Context;
use crate::eval::fuel::FuelTracker;
use crate::output::Output;
use crate::template::CompiledTemplate;
use crate::utils::{AutoEscape, UndefinedBehavior};
use crate::value::Value;

/// Every state gets a fresh id.  Macros keep a reference to bodies of
/// another state by index; the id makes sure a macro value that outlived
/// its render cannot index into the wrong state.
static STATE_ID: std::sync::atomic::AtomicIsize = std::sync::atomic::AtomicIsize::new(0);

/// The data a macro definition leaves behind in the state.
#[derive(Clone)]
pub(crate) struct MacroDef<'template, 'env> {
    pub name: &'env str,
    pub arg_names: Vec<&'env str>,
    pub defaults: &'template [ast::Expr<'env>],
    pub body: &'template [ast::Stmt<'env>],
    pub closure: Value,
    pub caller_reference: bool,
    pub template: &'template CompiledTemplate<'env>,
}

/// Tracks a block and its parent layers for `super()`.
///
/// Layer 0 is the child-most body; the cursor advances towards the root
/// ancestor while `super()` renders and is restored afterwards.
#[derive(Default, Clone)]
pub(crate) struct BlockStack<'template, 'env> {
    layers: Vec<(&'template [ast::Stmt<'env>], &'template CompiledTemplate<'env>)>,
    depth: usize,
}

impl<'template, 'env> BlockStack<'template, 'env> {
    pub fn new(
        body: &'template [ast::Stmt<'env>],
        tmpl: &'template CompiledTemplate<'env>,
    ) -> BlockStack<'template, 'env> {
        BlockStack {
            layers: vec![(body, tmpl)],
            depth: 0,
        }
    }

    pub fn body(&self) -> (&'template [ast::Stmt<'env>], &'template CompiledTemplate<'env>) {
        self.layers[self.depth]
    }

    pub fn push(&mut self) -> bool {
        if self.depth + 1 < self.layers.len() {
            self.depth += 1;
            true
        } else {
            false
        }
    }

    #[track_caller]
    pub fn pop(&mut self) {
        self.depth = self.depth.checked_sub(1).unwrap()
    }

    pub fn append_layer(
        &mut self,
        body: &'template [ast::Stmt<'env>],
        tmpl: &'template CompiledTemplate<'env>,
    ) {
        self.layers.push((body, tmpl));
    }
}

/// Provides access to the current execution state of the engine.
///
/// A read only reference is passed to filter functions and similar objects
/// to allow limited interfacing with the engine.  The state is useful to
/// look up information about the engine in filter, test or global
/// functions.  It not only provides access to the template environment but
/// also the context variables of the engine and the current auto escaping
/// behavior.
///
/// **Notes on lifetimes:** the state object exposes some of the internal
/// lifetimes through the type.  You should always elide these lifetimes
/// as there might be lifetimes added or removed between releases.
pub struct State<'template, 'env> {
    pub(crate) ctx: Context<'template, 'env>,
    pub(crate) current_block: Option<&'env str>,
    pub(crate) auto_escape: AutoEscape,
    pub(crate) template: Option<&'template CompiledTemplate<'env>>,
    pub(crate) blocks: BTreeMap<&'env str, BlockStack<'template, 'env>>,
    pub(crate) loaded_templates: BTreeSet<&'env str>,
    pub(crate) pending_parent: Option<&'template CompiledTemplate<'env>>,
    pub(crate) in_parent: bool,
    pub(crate) id: isize,
    pub(crate) macros: Arc<Mutex<Vec<MacroDef<'template, 'env>>>>,
    pub(crate) macro_table: Arc<Mutex<BTreeMap<String, Value>>>,
    pub(crate) temps: Arc<Mutex<BTreeMap<Box<str>, Value>>>,
    pub(crate) fuel_tracker: Option<Arc<FuelTracker>>,
    pub(crate) cancel: Option<Arc<CancelHandle>>,
}

impl fmt::Debug for State<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ds = f.debug_struct("State");
        ds.field("name", &self.name());
        ds.field("current_block", &self.current_block);
        ds.field("auto_escape", &self.auto_escape);
        ds.field("ctx", &self.ctx);
        ds.field("env", &self.env());
        ds.finish()
    }
}

impl<'template, 'env> State<'template, 'env> {
    /// Creates a new state.
    pub(crate) fn new(
        ctx: Context<'template, 'env>,
        auto_escape: AutoEscape,
        template: Option<&'template CompiledTemplate<'env>>,
        cancel: Option<Arc<CancelHandle>>,
    ) -> State<'template, 'env> {
        State {
            id: STATE_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed),
            current_block: None,
            auto_escape,
            template,
            blocks: BTreeMap::new(),
            loaded_templates: BTreeSet::new(),
            pending_parent: None,
            in_parent: false,
            macros: Default::default(),
            macro_table: Default::default(),
            temps: Default::default(),
            fuel_tracker: ctx.env().fuel().map(FuelTracker::new),
            cancel,
            ctx,
        }
    }

    /// Creates an empty state for an environment.
    pub(crate) fn new_for_env(env: &'env Environment<'env>) -> State<'env, 'env> {
        State::new(Context::new(env), AutoEscape::None, None, None)
    }

    /// Clones the state for a nested render of the same template.
    ///
    /// This is what block references use when they are invoked outside of
    /// the statement evaluation, for instance through `self.title`.
    pub(crate) fn fork(&self) -> State<'template, 'env> {
        State {
            ctx: self.ctx.clone_for_subrender(),
            current_block: self.current_block,
            auto_escape: self.auto_escape,
            template: self.template,
            blocks: self.blocks.clone(),
            loaded_templates: self.loaded_templates.clone(),
            pending_parent: None,
            in_parent: self.in_parent,
            id: self.id,
            macros: self.macros.clone(),
            macro_table: self.macro_table.clone(),
            temps: self.temps.clone(),
            fuel_tracker: self.fuel_tracker.clone(),
            cancel: self.cancel.clone(),
        }
    }

    /// Returns a reference to the current environment.
    #[inline(always)]
    pub fn env(&self) -> &'env Environment<'env> {
        self.ctx.env()
    }

    /// Returns the name of the current template.
    pub fn name(&self) -> &str {
        self.template.map_or("<unknown>", |x| x.name)
    }

    /// Returns the source of the current template.
    pub(crate) fn template_source(&self) -> Option<&str> {
        self.template.map(|x| x.source)
    }

    /// Returns the current value of the auto escape flag.
    #[inline(always)]
    pub fn auto_escape(&self) -> AutoEscape {
        self.auto_escape
    }

    /// Returns the current undefined behavior.
    #[inline(always)]
    pub fn undefined_behavior(&self) -> UndefinedBehavior {
        self.env().undefined_behavior()
    }

    /// Returns the name of the innermost block.
    #[inline(always)]
    pub fn current_block(&self) -> Option<&str> {
        self.current_block
    }

    /// Looks up a variable by name.
    ///
    /// The scopes are consulted inner to outer, then the root context
    /// object, the per render macro table, the environment globals and
    /// finally the environment functions.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(rv) = self.ctx.load(name) {
            return Some(rv);
        }
        if let Some(rv) = self.macro_table.lock().unwrap().get(name) {
            return Some(rv.clone());
        }
        if let Some(rv) = self.env().get_global(name) {
            return Some(rv);
        }
        self.env().get_function(name)
    }

    /// Fetches a template by name with path joining.
    ///
    /// This works like [`Environment::get_template`] with the difference
    /// that the lookup undergoes path joining.  If the environment has a
    /// configured path joining callback, it will be invoked with the name
    /// of the current template as parent template.
    pub(crate) fn get_template(
        &self,
        name: &str,
    ) -> Result<&'env CompiledTemplate<'env>, Error> {
        self.env()
            .compiled_template(&self.env().join_template_path(name, self.name()))
    }

    /// Invokes a filter with some arguments.
    ///
    /// ```
    /// # use stencil::Environment;
    /// # let mut env = Environment::new();
    /// # let state = env.empty_state();
    /// let rv = state.apply_filter("upper", &["hello world".into()]).unwrap();
    /// assert_eq!(rv.as_str(), Some("HELLO WORLD"));
    /// ```
    pub fn apply_filter(&self, filter: &str, args: &[Value]) -> Result<Value, Error> {
        match self.env().get_filter(filter) {
            Some(filter) if !args.is_empty() => filter.apply_to(self, &args[0], &args[1..]),
            Some(_) => Err(Error::new(
                ErrorKind::MissingArgument,
                "filters need at least a value",
            )),
            None => Err(Error::new(
                ErrorKind::UnknownFilter,
                format!("filter {filter} is unknown"),
            )),
        }
    }

    /// Invokes a test function on a value.
    ///
    /// ```
    /// # use stencil::Environment;
    /// # let mut env = Environment::new();
    /// # let state = env.empty_state();
    /// let rv = state.perform_test("even", &[42i32.into()]).unwrap();
    /// assert!(rv);
    /// ```
    pub fn perform_test(&self, test: &str, args: &[Value]) -> Result<bool, Error> {
        match self.env().get_test(test) {
            Some(test) if !args.is_empty() => test.perform(self, &args[0], &args[1..]),
            Some(_) => Err(Error::new(
                ErrorKind::MissingArgument,
                "tests need at least a value",
            )),
            None => Err(Error::new(
                ErrorKind::UnknownTest,
                format!("test {test} is unknown"),
            )),
        }
    }

    /// Formats a value to a string using the formatter on the environment.
    ///
    /// ```
    /// # use stencil::{value::Value, Environment};
    /// # let mut env = Environment::new();
    /// # let state = env.empty_state();
    /// let rv = state.format(Value::from(42)).unwrap();
    /// assert_eq!(rv, "42");
    /// ```
    pub fn format(&self, value: Value) -> Result<String, Error> {
        let mut rv = String::new();
        let mut out = Output::with_string(&mut rv);
        self.env().format(&value, self, &mut out).map(|_| rv)
    }

    /// Returns the fuel levels.
    ///
    /// When fuel tracking is enabled the returned value is
    /// `Some((consumed, remaining))`, otherwise `None` is returned.
    pub fn fuel_levels(&self) -> Option<(u64, u64)> {
        self.fuel_tracker
            .as_ref()
            .map(|x| (x.consumed(), x.remaining()))
    }

    /// Looks up a temp and returns it.
    ///
    /// Temps are similar to context values but the engine never looks them
    /// up on its own and they are not scoped.  The lifetime of temps is
    /// limited to the rendering process of a template.  Temps are useful so
    /// that filters and other things can temporarily stash away state.
    pub fn get_temp(&self, name: &str) -> Option<Value> {
        self.temps.lock().unwrap().get(name).cloned()
    }

    /// Inserts a temp and returns the old temp.
    ///
    /// For more information see [`get_temp`](Self::get_temp).
    pub fn set_temp(&self, name: &str, value: Value) -> Option<Value> {
        self.temps
            .lock()
            .unwrap()
            .insert(name.to_owned().into(), value)
    }

    /// Checks fuel and cancellation for an evaluation step.
    #[inline]
    pub(crate) fn track_step(&self) -> Result<(), Error> {
        if let Some(ref tracker) = self.fuel_tracker {
            ok!(tracker.track());
        }
        if let Some(ref cancel) = self.cancel {
            if cancel.is_cancelled() {
                return Err(cancel.abort_error());
            }
        }
        Ok(())
    }
}
