//! <div align=center>
//!   <p><strong>Stencil: a Jinja2 compatible template engine with a tree walking evaluator</strong></p>
//! </div>
//!
//! Stencil is a template engine for Rust which is based on the syntax and
//! behavior of the [Jinja2](https://jinja.palletsprojects.com/) template
//! engine for Python.  Templates are parsed into an abstract syntax tree
//! which is then walked directly by the evaluator; there is no intermediate
//! bytecode.  Values enter the engine through [`serde`] which means any
//! serializable data can be used as template context.
//!
//! ```jinja
//! {% for user in users %}
//!   <li>{{ user.name }}</li>
//! {% endfor %}
//! ```
//!
//! # Template Usage
//!
//! To use stencil one needs to create an [`Environment`] and populate it
//! with templates.  Afterwards templates can be loaded and rendered.  To
//! pass data one can pass any serde serializable value.  The [`context!`]
//! macro can be used to quickly construct a template context:
//!
//! ```
//! use stencil::{Environment, context};
//!
//! let mut env = Environment::new();
//! env.add_template("hello", "Hello {{ name }}!").unwrap();
//! let tmpl = env.get_template("hello").unwrap();
//! println!("{}", tmpl.render(context!(name => "John")).unwrap());
//! ```
//!
//! ```plain
//! Hello John!
//! ```
//!
//! # Custom Filters
//!
//! Stencil lets you register functions as filter functions (see
//! [`Filter`](crate::filters::Filter)) with the engine.  These can then be
//! invoked directly from the template:
//!
//! ```
//! use stencil::{Environment, State, Error, context};
//!
//! fn slugify(_state: &State, value: String) -> Result<String, Error> {
//!     Ok(value.to_lowercase().split_whitespace().collect::<Vec<_>>().join("-"))
//! }
//!
//! let mut env = Environment::new();
//! env.add_filter("slugify", slugify);
//! env.add_template("hello", "{{ title|slugify }}").unwrap();
//! let tmpl = env.get_template("hello").unwrap();
//! println!("{}", tmpl.render(context!(title => "Hello World")).unwrap());
//! ```
//!
//! ```plain
//! hello-world
//! ```
//!
//! # Error Handling
//!
//! Stencil tries to give you good errors out of the box.  However if you use
//! includes or template inheritance your experience will improve greatly if
//! you ensure to render chained errors.  For more information see [`Error`].
#![allow(clippy::cognitive_complexity)]
#![allow(clippy::get_first)]
#![deny(missing_docs)]

#[macro_use]
mod macros;

mod compiler;
mod defaults;
mod environment;
mod error;
mod eval;
mod loader;
mod output;
mod template;
mod utils;

pub mod filters;
pub mod functions;
pub mod syntax;
pub mod tests;
pub mod value;

pub use self::defaults::{default_auto_escape_callback, escape_formatter};
pub use self::environment::Environment;
pub use self::error::{DebugInfo, Error, ErrorKind};
pub use self::eval::{CancelHandle, State};
pub use self::loader::path_loader;
pub use self::macros::__context;
pub use self::output::Output;
pub use self::template::Template;
pub use self::utils::{AutoEscape, HtmlEscape, UndefinedBehavior};

/// Re-export of the value type for convenience.
pub use self::value::Value;
