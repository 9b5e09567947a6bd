use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::compiler::ast;
use crate::compiler::lexer::WhitespaceConfig;
use crate::compiler::parser::parse;
use crate::environment::Environment;
use crate::error::{attach_basic_debug_info, Error};
use crate::eval::{CancelHandle, Context, Evaluator, Frame, State};
use crate::output::{Output, WriteWrapper};
use crate::syntax::SyntaxConfig;
use crate::utils::AutoEscape;
use crate::value::Value;

type AutoEscapeFunc = dyn Fn(&str) -> AutoEscape + Sync + Send;

/// The configuration shared by all templates of an environment.
#[derive(Clone)]
pub(crate) struct TemplateConfig {
    pub syntax_config: SyntaxConfig,
    pub ws_config: WhitespaceConfig,
    pub default_auto_escape: Arc<AutoEscapeFunc>,
}

impl TemplateConfig {
    pub fn new(default_auto_escape: Arc<AutoEscapeFunc>) -> TemplateConfig {
        TemplateConfig {
            syntax_config: SyntaxConfig::default(),
            ws_config: WhitespaceConfig::default(),
            default_auto_escape,
        }
    }
}

/// Represents a handle to a template.
///
/// Templates are stored in the [`Environment`] as compiled abstract syntax
/// trees.  With the [`Environment::get_template`] method that is looked up
/// and returned in form of this handle.  Such a template can be cheaply
/// copied as it only holds references.
///
/// To render the [`render`](Template::render) method can be used.
#[derive(Clone)]
pub struct Template<'env, 'source> {
    env: &'env Environment<'env>,
    compiled: CompiledTemplateRef<'env, 'source>,
    initial_auto_escape: AutoEscape,
}

#[derive(Clone)]
pub(crate) enum CompiledTemplateRef<'env, 'source> {
    Borrowed(&'env CompiledTemplate<'source>),
    Owned(Arc<CompiledTemplate<'source>>),
}

impl fmt::Debug for Template<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ds = f.debug_struct("Template");
        ds.field("name", &self.name());
        ds.field("initial_auto_escape", &self.initial_auto_escape);
        ds.finish()
    }
}

impl<'env, 'source> Template<'env, 'source> {
    pub(crate) fn new(
        env: &'env Environment<'env>,
        compiled: CompiledTemplateRef<'env, 'source>,
        initial_auto_escape: AutoEscape,
    ) -> Template<'env, 'source> {
        Template {
            env,
            compiled,
            initial_auto_escape,
        }
    }

    fn compiled(&self) -> &CompiledTemplate<'source> {
        match self.compiled {
            CompiledTemplateRef::Borrowed(x) => x,
            CompiledTemplateRef::Owned(ref x) => x,
        }
    }

    /// Returns the name of the template.
    pub fn name(&self) -> &str {
        self.compiled().name
    }

    /// Returns the source code of the template.
    pub fn source(&self) -> &str {
        self.compiled().source
    }

    /// Renders the template into a string.
    ///
    /// The provided value is used as the initial context for the template.
    /// It can be any object that implements [`Serialize`](serde::Serialize).
    /// You can either create your own struct and derive `Serialize` for it
    /// or the [`context!`](crate::context) macro can be used to create an
    /// ad-hoc context.
    ///
    /// ```
    /// # use stencil::{Environment, context};
    /// # let mut env = Environment::new();
    /// # env.add_template("hello", "Hello {{ name }}!").unwrap();
    /// let tmpl = env.get_template("hello").unwrap();
    /// println!("{}", tmpl.render(context!(name => "John")).unwrap());
    /// ```
    ///
    /// **Note on values:** The [`Value`] type implements `Serialize` and can
    /// be efficiently passed to render.  It does not undergo actual
    /// serialization.
    pub fn render<S: Serialize>(&self, ctx: S) -> Result<String, Error> {
        // reduce total amount of code falling under mono morphization into
        // this function, and share the rest in _render.
        self._render(Value::from_serializable(&ctx), None)
    }

    /// Renders the template but allows the render to be cancelled.
    ///
    /// This works exactly like [`render`](Self::render) but a
    /// [`CancelHandle`] can be signalled from another thread to abort the
    /// render at the next evaluation step.
    ///
    /// ```
    /// # use stencil::{Environment, CancelHandle, context};
    /// # let mut env = Environment::new();
    /// # env.add_template("hello", "Hello {{ name }}!").unwrap();
    /// let tmpl = env.get_template("hello").unwrap();
    /// let handle = CancelHandle::new();
    /// let rv = tmpl.render_cancelable(context!(name => "John"), handle.clone());
    /// # assert!(rv.is_ok());
    /// ```
    pub fn render_cancelable<S: Serialize>(
        &self,
        ctx: S,
        handle: Arc<CancelHandle>,
    ) -> Result<String, Error> {
        self._render(Value::from_serializable(&ctx), Some(handle))
    }

    /// Renders the template into an [`io::Write`](std::io::Write).
    ///
    /// For details see [`render`](Self::render).
    pub fn render_to_write<S: Serialize, W: std::io::Write>(
        &self,
        ctx: S,
        w: W,
    ) -> Result<(), Error> {
        let mut wrapper = WriteWrapper { w, err: None };
        let root = Value::from_serializable(&ctx);
        let mut out = Output::with_write(&mut wrapper);
        self._eval(root, None, &mut out)
            .map_err(|err| wrapper.take_err(err))
    }

    fn _render(&self, root: Value, cancel: Option<Arc<CancelHandle>>) -> Result<String, Error> {
        let mut rv = String::new();
        let mut out = Output::with_string(&mut rv);
        self._eval(root, cancel, &mut out).map(|_| rv)
    }

    fn _eval(
        &self,
        root: Value,
        cancel: Option<Arc<CancelHandle>>,
        out: &mut Output,
    ) -> Result<(), Error> {
        let compiled = self.compiled();
        let mut state = State::new(
            Context::new_with_frame(self.env, ok!(Frame::new_checked(root))),
            self.initial_auto_escape,
            Some(compiled),
            cancel,
        );
        Evaluator::new(self.env).eval_template(&mut state, compiled, out)
    }
}

/// Represents a compiled template in memory.
pub(crate) struct CompiledTemplate<'source> {
    /// The name the template was loaded as.
    pub name: &'source str,
    /// The source code of the template.
    pub source: &'source str,
    /// The root node of the abstract syntax tree.
    pub ast: ast::Stmt<'source>,
}

impl fmt::Debug for CompiledTemplate<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledTemplate")
            .field("name", &self.name)
            .finish()
    }
}

impl<'source> CompiledTemplate<'source> {
    pub(crate) fn new(
        name: &'source str,
        source: &'source str,
        config: &TemplateConfig,
    ) -> Result<CompiledTemplate<'source>, Error> {
        attach_basic_debug_info(Self::_new_impl(name, source, config), source)
    }

    fn _new_impl(
        name: &'source str,
        source: &'source str,
        config: &TemplateConfig,
    ) -> Result<CompiledTemplate<'source>, Error> {
        let ast = ok!(parse(
            source,
            name,
            config.syntax_config.clone(),
            config.ws_config,
        ));
        Ok(CompiledTemplate { name, source, ast })
    }

    /// Returns the top level statements of the template.
    pub(crate) fn children(&self) -> &[ast::Stmt<'source>] {
        match self.ast {
            ast::Stmt::Template(ref tmpl) => &tmpl.children,
            _ => unreachable!("parser always produces a template node"),
        }
    }
}
