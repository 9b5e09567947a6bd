use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::defaults;
use crate::error::{Error, ErrorKind};
use crate::eval::State;
use crate::filters::{self, BoxedFilter};
use crate::functions::{self, BoxedFunction};
use crate::loader::LoaderStore;
use crate::output::Output;
use crate::syntax::SyntaxConfig;
use crate::template::{CompiledTemplate, CompiledTemplateRef, Template, TemplateConfig};
use crate::tests::{self, BoxedTest};
use crate::utils::{AutoEscape, UndefinedBehavior};
use crate::value::{UndefinedType, Value, ValueRepr};

type FormatterFunc = dyn Fn(&mut Output, &State, &Value) -> Result<(), Error> + Sync + Send;
type PathJoinFunc = dyn for<'s> Fn(&'s str, &'s str) -> Cow<'s, str> + Sync + Send;

/// The maximum recursion during rendering.
///
/// Normally each stack frame adds one to this counter (eg: every time a
/// frame is added).  However in some situations more depth is pushed if the
/// cost of the stack frame is higher.
const MAX_RECURSION: usize = 500;

/// An abstraction that holds the engine configuration.
///
/// This object holds the central configuration state for templates.  It is
/// also the container for all loaded templates.
///
/// The environment holds references to the source the templates were created
/// from.  This makes it very inconvenient to pass around unless the templates
/// are static strings.  For situations where you want to load dynamic
/// templates a [loader](Environment::set_loader) can be registered.
///
/// There are generally two ways to construct an environment:
///
/// * [`Environment::new`] creates an environment preconfigured with sensible
///   defaults.  It will contain the built-in filters, tests and functions the
///   core semantics need as well as a callback for auto escaping based on
///   file extension.
/// * [`Environment::empty`] creates a completely blank environment.
#[derive(Clone)]
pub struct Environment<'source> {
    templates: LoaderStore<'source>,
    filters: BTreeMap<Cow<'source, str>, BoxedFilter>,
    tests: BTreeMap<Cow<'source, str>, BoxedTest>,
    functions: BTreeMap<Cow<'source, str>, Value>,
    globals: BTreeMap<Cow<'source, str>, Value>,
    path_join_callback: Option<Arc<PathJoinFunc>>,
    undefined_behavior: UndefinedBehavior,
    formatter: Arc<FormatterFunc>,
    debug: bool,
    fuel: Option<u64>,
    recursion_limit: usize,
}

impl Default for Environment<'_> {
    fn default() -> Self {
        Environment::empty()
    }
}

impl fmt::Debug for Environment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("globals", &self.globals)
            .field("templates", &self.templates)
            .finish()
    }
}

impl<'source> Environment<'source> {
    /// Creates a new environment with sensible defaults.
    ///
    /// This environment does not yet contain any templates but it will have
    /// the default filters, tests and functions loaded.  If you do not want
    /// any default configuration you can use the alternative
    /// [`empty`](Environment::empty) method.
    pub fn new() -> Environment<'source> {
        Environment {
            templates: LoaderStore::new(TemplateConfig::new(Arc::new(
                defaults::default_auto_escape_callback,
            ))),
            filters: defaults::get_builtin_filters(),
            tests: defaults::get_builtin_tests(),
            functions: defaults::get_builtin_functions(),
            globals: defaults::get_globals(),
            path_join_callback: None,
            undefined_behavior: UndefinedBehavior::default(),
            formatter: Arc::new(defaults::escape_formatter),
            debug: cfg!(debug_assertions),
            fuel: None,
            recursion_limit: MAX_RECURSION,
        }
    }

    /// Creates a completely empty environment.
    ///
    /// This environment has no filters, no templates and no default logic for
    /// auto escaping configured.
    pub fn empty() -> Environment<'source> {
        Environment {
            templates: LoaderStore::new(TemplateConfig::new(Arc::new(defaults::no_auto_escape))),
            filters: Default::default(),
            tests: Default::default(),
            functions: Default::default(),
            globals: Default::default(),
            path_join_callback: None,
            undefined_behavior: UndefinedBehavior::default(),
            formatter: Arc::new(defaults::escape_formatter),
            debug: cfg!(debug_assertions),
            fuel: None,
            recursion_limit: MAX_RECURSION,
        }
    }

    /// Loads a template from a string into the environment.
    ///
    /// The `name` parameter defines the name of the template which identifies
    /// it.  To look up a loaded template use the
    /// [`get_template`](Self::get_template) method.
    ///
    /// ```
    /// # use stencil::Environment;
    /// let mut env = Environment::new();
    /// env.add_template("index.html", "Hello {{ name }}!").unwrap();
    /// ```
    ///
    /// This method fails if the template has a syntax error.
    pub fn add_template(&mut self, name: &'source str, source: &'source str) -> Result<(), Error> {
        self.templates.insert(name, source)
    }

    /// Adds a template without borrowing.
    ///
    /// This lets you place an owned [`String`] in the environment rather than
    /// the borrowed `&str` without having to worry about lifetimes.
    ///
    /// ```
    /// # use stencil::Environment;
    /// let mut env = Environment::new();
    /// env.add_template_owned("index.html".to_string(), "Hello {{ name }}!".to_string()).unwrap();
    /// ```
    pub fn add_template_owned<N, S>(&mut self, name: N, source: S) -> Result<(), Error>
    where
        N: Into<Cow<'source, str>>,
        S: Into<Cow<'source, str>>,
    {
        self.templates.insert_cow(name.into(), source.into())
    }

    /// Register a template loader as source of templates.
    ///
    /// When a template loader is registered, the environment gains the
    /// ability to dynamically load templates.  The loader is invoked with the
    /// name of the template.  If this template exists `Ok(Some(source))` has
    /// to be returned, otherwise `Ok(None)`.  Once a template has been loaded
    /// it's stored on the environment.  This means the loader is only invoked
    /// once per template name.
    ///
    /// For loading templates from the file system, you can use the
    /// [`path_loader`](crate::path_loader) function.
    pub fn set_loader<F>(&mut self, f: F)
    where
        F: Fn(&str) -> Result<Option<String>, Error> + Send + Sync + 'static,
    {
        self.templates.set_loader(f);
    }

    /// Preserve the trailing newline when rendering templates.
    ///
    /// The default is `false`, which causes a single newline, if present, to
    /// be stripped from the end of the template.
    ///
    /// This setting is used whenever a template is loaded into the
    /// environment.  Changing it at a later point only affects future
    /// templates loaded.
    pub fn set_keep_trailing_newline(&mut self, yes: bool) {
        self.templates.template_config.ws_config.keep_trailing_newline = yes;
    }

    /// Returns the value of the trailing newline preservation flag.
    pub fn keep_trailing_newline(&self) -> bool {
        self.templates.template_config.ws_config.keep_trailing_newline
    }

    /// Remove the first newline after a block.
    ///
    /// If this is set to `true` then the first newline after a block is
    /// removed (block, not variable tag!).  Defaults to `false`.
    pub fn set_trim_blocks(&mut self, yes: bool) {
        self.templates.template_config.ws_config.trim_blocks = yes;
    }

    /// Returns the value of the trim blocks flag.
    pub fn trim_blocks(&self) -> bool {
        self.templates.template_config.ws_config.trim_blocks
    }

    /// Remove leading spaces and tabs from the start of a line to a block.
    ///
    /// If this is set to `true` then leading spaces and tabs from the start
    /// of a line to the block tag are removed.
    pub fn set_lstrip_blocks(&mut self, yes: bool) {
        self.templates.template_config.ws_config.lstrip_blocks = yes;
    }

    /// Returns the value of the lstrip blocks flag.
    pub fn lstrip_blocks(&self) -> bool {
        self.templates.template_config.ws_config.lstrip_blocks
    }

    /// Sets the syntax for the environment.
    ///
    /// This setting is used whenever a template is loaded into the
    /// environment.  Changing it at a later point only affects future
    /// templates loaded.
    pub fn set_syntax(&mut self, syntax: SyntaxConfig) {
        self.templates.template_config.syntax_config = syntax;
    }

    /// Returns the current syntax config.
    pub fn syntax(&self) -> &SyntaxConfig {
        &self.templates.template_config.syntax_config
    }

    /// Removes a template by name.
    pub fn remove_template(&mut self, name: &str) {
        self.templates.remove(name);
    }

    /// Removes all stored templates.
    ///
    /// This method is mainly useful when combined with a loader as it causes
    /// the loader to "reload" templates.  By calling this method one can
    /// trigger a reload.
    pub fn clear_templates(&mut self) {
        self.templates.clear();
    }

    /// Returns an iterator over the already loaded templates and their names.
    pub fn templates(&self) -> impl Iterator<Item = (&str, Template<'_, '_>)> {
        self.templates.iter().map(|(name, compiled)| {
            let template = Template::new(
                self,
                CompiledTemplateRef::Borrowed(compiled),
                self.initial_auto_escape(name),
            );
            (name, template)
        })
    }

    /// Fetches a template by name.
    ///
    /// This requires that the template has been loaded with
    /// [`add_template`](Environment::add_template) beforehand.  If the
    /// template was not loaded an error of kind `TemplateNotFound` is
    /// returned.  If a loader was added to the engine this can also
    /// dynamically load templates.
    ///
    /// ```
    /// # use stencil::{Environment, context};
    /// let mut env = Environment::new();
    /// env.add_template("hello.txt", "Hello {{ name }}!").unwrap();
    /// let tmpl = env.get_template("hello.txt").unwrap();
    /// println!("{}", tmpl.render(context!{ name => "World" }).unwrap());
    /// ```
    pub fn get_template(&self, name: &str) -> Result<Template<'_, '_>, Error> {
        let compiled = ok!(self.templates.get(name));
        Ok(Template::new(
            self,
            CompiledTemplateRef::Borrowed(compiled),
            self.initial_auto_escape(name),
        ))
    }

    /// Loads a template from a string.
    ///
    /// In some cases you really only need to work with (eg: render) a
    /// template to be rendered once only.
    pub fn template_from_named_str(
        &self,
        name: &'source str,
        source: &'source str,
    ) -> Result<Template<'_, 'source>, Error> {
        Ok(Template::new(
            self,
            CompiledTemplateRef::Owned(Arc::new(ok!(CompiledTemplate::new(
                name,
                source,
                &self.templates.template_config,
            )))),
            self.initial_auto_escape(name),
        ))
    }

    /// Loads a template from a string, with name `<string>`.
    ///
    /// This is a shortcut to [`template_from_named_str`](Self::template_from_named_str)
    /// with name set to `<string>`.
    pub fn template_from_str(&self, source: &'source str) -> Result<Template<'_, 'source>, Error> {
        self.template_from_named_str("<string>", source)
    }

    /// Parses and renders a template from a string in one go with name.
    ///
    /// Like [`render_str`](Self::render_str), but provide a name for the
    /// template to be used instead of the default `<string>`.
    ///
    /// **Note on values:** The [`Value`] type implements `Serialize` and can
    /// be efficiently passed to render.  It does not undergo actual
    /// serialization.
    pub fn render_named_str<S: Serialize>(
        &self,
        name: &str,
        source: &str,
        ctx: S,
    ) -> Result<String, Error> {
        ok!(self.template_from_named_str(name, source)).render(ctx)
    }

    /// Parses and renders a template from a string in one go.
    ///
    /// In some cases you really only need a template to be rendered once from
    /// a string and returned.  The internal name of the template is
    /// `<string>`.
    ///
    /// ```
    /// # use stencil::{Environment, context};
    /// let env = Environment::new();
    /// let rv = env.render_str("Hello {{ name }}", context! { name => "World" });
    /// println!("{}", rv.unwrap());
    /// ```
    pub fn render_str<S: Serialize>(&self, source: &str, ctx: S) -> Result<String, Error> {
        // reduce total amount of code falling under mono morphization into
        // this function, and share the rest in render.
        ok!(self.template_from_str(source)).render(ctx)
    }

    /// Sets a new function to select the default auto escaping.
    ///
    /// This function is invoked when templates are loaded into the
    /// environment to determine the default auto escaping behavior.  The
    /// function is invoked with the name of the template and can make an
    /// initial auto escaping decision based on that.  The default
    /// implementation
    /// ([`default_auto_escape_callback`](defaults::default_auto_escape_callback))
    /// turns on escaping depending on the file extension.
    ///
    /// ```
    /// # use stencil::{Environment, AutoEscape};
    /// # let mut env = Environment::new();
    /// env.set_auto_escape_callback(|name| {
    ///     if matches!(name.rsplit('.').next().unwrap_or(""), "html" | "htm" | "aspx") {
    ///         AutoEscape::Html
    ///     } else {
    ///         AutoEscape::None
    ///     }
    /// });
    /// ```
    pub fn set_auto_escape_callback<F>(&mut self, f: F)
    where
        F: Fn(&str) -> AutoEscape + 'static + Sync + Send,
    {
        self.templates.template_config.default_auto_escape = Arc::new(f);
    }

    /// Sets a callback to join template paths.
    ///
    /// By default the template path is taken unchanged, but a callback can be
    /// used to implement relative path resolution between templates.  The
    /// first argument to the callback is the name of the template to be
    /// loaded, the second argument is the parent path.
    ///
    /// ```
    /// # let mut env = stencil::Environment::new();
    /// env.set_path_join_callback(|name, parent| {
    ///     let mut rv = parent.split('/').collect::<Vec<_>>();
    ///     rv.pop();
    ///     name.split('/').for_each(|segment| match segment {
    ///         "." => {}
    ///         ".." => { rv.pop(); }
    ///         _ => { rv.push(segment); }
    ///     });
    ///     rv.join("/").into()
    /// });
    /// ```
    pub fn set_path_join_callback<F>(&mut self, f: F)
    where
        F: for<'s> Fn(&'s str, &'s str) -> Cow<'s, str> + Send + Sync + 'static,
    {
        self.path_join_callback = Some(Arc::new(f));
    }

    /// Changes the undefined behavior.
    ///
    /// This changes the runtime behavior of [`undefined`](Value::UNDEFINED)
    /// values in the template engine.  For more information see
    /// [`UndefinedBehavior`].  The default is
    /// [`UndefinedBehavior::Lenient`].
    pub fn set_undefined_behavior(&mut self, behavior: UndefinedBehavior) {
        self.undefined_behavior = behavior;
    }

    /// Returns the current undefined behavior.
    #[inline(always)]
    pub fn undefined_behavior(&self) -> UndefinedBehavior {
        self.undefined_behavior
    }

    /// Sets a different formatter function.
    ///
    /// The formatter is invoked to format the given value into the provided
    /// [`Output`].  The default implementation is
    /// [`escape_formatter`](defaults::escape_formatter).  A custom formatter
    /// is required when a custom [`AutoEscape`] mode is used.
    pub fn set_formatter<F>(&mut self, f: F)
    where
        F: Fn(&mut Output, &State, &Value) -> Result<(), Error> + 'static + Sync + Send,
    {
        self.formatter = Arc::new(f);
    }

    /// Enable or disable the debug mode.
    ///
    /// When the debug mode is enabled the engine will dump out some of the
    /// execution state together with the source information of the executing
    /// template when an error is created.  The cost of this is relatively
    /// high as the data including the template source is cloned.
    ///
    /// This is enabled by default if debug assertions are enabled and false
    /// otherwise.
    pub fn set_debug(&mut self, enabled: bool) {
        self.debug = enabled;
    }

    /// Returns the current value of the debug flag.
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Sets the optional fuel of the engine.
    ///
    /// Every statement and expression evaluation consumes a unit of fuel.
    /// By default the engine has the fuel tracking disabled (`None`).  To
    /// turn on fuel set something like `Some(50000)` which will allow 50.000
    /// evaluation steps before running out of fuel.
    ///
    /// To find out how much fuel is consumed, you can access the fuel levels
    /// from the [`State`](crate::State).
    ///
    /// Fuel consumed per-render.
    pub fn set_fuel(&mut self, fuel: Option<u64>) {
        self.fuel = fuel;
    }

    /// Returns the configured fuel.
    pub fn fuel(&self) -> Option<u64> {
        self.fuel
    }

    /// Reconfigures the runtime recursion limit.
    ///
    /// This defaults to `500` and is silently capped at that maximum.  Every
    /// operation that requires recursion in the engine increments an internal
    /// recursion counter.  The actual cost attributed to that recursion
    /// depends on the cost of the operation: if statements and for loops for
    /// instance only increase the counter by 1, whereas template includes and
    /// macros increase it by 10 or more.
    pub fn set_recursion_limit(&mut self, level: usize) {
        self.recursion_limit = level.min(MAX_RECURSION);
    }

    /// Returns the current max recursion limit.
    pub fn recursion_limit(&self) -> usize {
        self.recursion_limit
    }

    /// Adds a new filter function.
    ///
    /// Filter functions are functions that can be applied to values in
    /// templates.  For details about filters have a look at
    /// [`filters`](crate::filters).
    pub fn add_filter<N, F, V, Rv, Args>(&mut self, name: N, f: F)
    where
        N: Into<Cow<'source, str>>,
        F: filters::Filter<V, Rv, Args>,
        V: crate::value::ArgType,
        Rv: Into<Value>,
        Args: crate::value::FunctionArgs,
    {
        self.filters.insert(name.into(), BoxedFilter::new(f));
    }

    /// Removes a filter by name.
    pub fn remove_filter(&mut self, name: &str) {
        self.filters.remove(name);
    }

    /// Adds a new test function.
    ///
    /// Test functions are similar to filters but perform a check on a value
    /// where the return value is always true or false.  For details about
    /// tests have a look at [`tests`](crate::tests).
    pub fn add_test<N, F, V, Args>(&mut self, name: N, f: F)
    where
        N: Into<Cow<'source, str>>,
        F: tests::Test<V, Args>,
        V: crate::value::ArgType,
        Args: crate::value::FunctionArgs,
    {
        self.tests.insert(name.into(), BoxedTest::new(f));
    }

    /// Removes a test by name.
    pub fn remove_test(&mut self, name: &str) {
        self.tests.remove(name);
    }

    /// Adds a new global function.
    ///
    /// Functions registered here live in their own registry which is
    /// consulted after globals when looking up names.  For details about
    /// functions have a look at [`functions`](crate::functions).
    pub fn add_function<N, F, Args>(&mut self, name: N, f: F)
    where
        N: Into<Cow<'source, str>>,
        F: functions::Function<Args>,
        Args: crate::value::FunctionArgs,
    {
        let name = name.into();
        let value = BoxedFunction::new(&name, f).to_value();
        self.functions.insert(name, value);
    }

    /// Removes a function by name.
    pub fn remove_function(&mut self, name: &str) {
        self.functions.remove(name);
    }

    /// Adds a global variable.
    pub fn add_global<N, V>(&mut self, name: N, value: V)
    where
        N: Into<Cow<'source, str>>,
        V: Into<Value>,
    {
        self.globals.insert(name.into(), value.into());
    }

    /// Removes a global function or variable by name.
    pub fn remove_global(&mut self, name: &str) {
        self.globals.remove(name);
    }

    /// Returns an iterator of all global variables.
    pub fn globals(&self) -> impl Iterator<Item = (&str, Value)> {
        self.globals
            .iter()
            .map(|(key, value)| (key as &str, value.clone()))
    }

    /// Returns an empty [`State`] for testing purposes and similar.
    pub fn empty_state(&self) -> State<'_, '_> {
        State::new_for_env(self)
    }

    /// Looks up a global.
    pub(crate) fn get_global(&self, name: &str) -> Option<Value> {
        self.globals.get(name).cloned()
    }

    /// Looks up a function.
    pub(crate) fn get_function(&self, name: &str) -> Option<Value> {
        self.functions.get(name).cloned()
    }

    /// Looks up a filter.
    pub(crate) fn get_filter(&self, name: &str) -> Option<&BoxedFilter> {
        self.filters.get(name)
    }

    /// Looks up a test function.
    pub(crate) fn get_test(&self, name: &str) -> Option<&BoxedTest> {
        self.tests.get(name)
    }

    pub(crate) fn initial_auto_escape(&self, name: &str) -> AutoEscape {
        (self.templates.template_config.default_auto_escape)(name)
    }

    pub(crate) fn compiled_template(&self, name: &str) -> Result<&CompiledTemplate<'_>, Error> {
        self.templates.get(name)
    }

    /// Formats a value into the final format.
    ///
    /// This step is called finalization in Jinja2 but since we are writing
    /// into the output stream rather than converting values, it's renamed
    /// to format here.
    pub(crate) fn format(
        &self,
        value: &Value,
        state: &State,
        out: &mut Output,
    ) -> Result<(), Error> {
        match (self.undefined_behavior, &value.0) {
            // this intentionally does not check for silent undefineds.  Those
            // are exclusively used in the missing else branch of a ternary
            // expression and go straight to the formatter.
            (
                UndefinedBehavior::Strict | UndefinedBehavior::SemiStrict,
                &ValueRepr::Undefined(UndefinedType::Default),
            ) => Err(Error::from(ErrorKind::UndefinedError)),
            _ => (self.formatter)(out, state, value),
        }
    }

    /// Performs a template path join.
    pub(crate) fn join_template_path<'s>(&self, name: &'s str, parent: &'s str) -> Cow<'s, str> {
        match self.path_join_callback {
            Some(ref cb) => cb(name, parent),
            None => Cow::Borrowed(name),
        }
    }
}
