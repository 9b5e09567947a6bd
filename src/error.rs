use std::borrow::Cow;
use std::fmt;

use crate::compiler::tokens::Span;
use crate::value::Value;

/// Represents template errors.
///
/// If debug mode is enabled a template error contains additional debug
/// information that can be displayed by formatting an error with the
/// alternative formatting (``format!("{:#}", err)``).
///
/// # Example
///
/// Here is an example of how you might want to render errors:
///
/// ```rust
/// # let mut env = stencil::Environment::new();
/// # env.add_template("tmpl.html", "");
/// # let template = env.get_template("tmpl.html").unwrap(); let ctx = ();
/// match template.render(ctx) {
///     Ok(result) => println!("{}", result),
///     Err(err) => {
///         eprintln!("could not render template: {:#}", err);
///         // render causes as well
///         let mut err = &err as &dyn std::error::Error;
///         while let Some(next_err) = err.source() {
///             eprintln!();
///             eprintln!("caused by: {:#}", next_err);
///             err = next_err;
///         }
///     }
/// }
/// ```
pub struct Error {
    repr: Box<ErrorRepr>,
}

/// The internal error data.
struct ErrorRepr {
    kind: ErrorKind,
    detail: Option<Cow<'static, str>>,
    name: Option<String>,
    lineno: usize,
    span: Option<Span>,
    template_source: Option<String>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
    debug_info: Option<DebugInfo>,
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind()
    }
}

impl Eq for Error {}

/// An enum describing the error kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A syntax error in the template was encountered.
    SyntaxError,
    /// An operation on values was attempted that is not supported.
    InvalidOperation,
    /// A referenced template does not exist.
    TemplateNotFound,
    /// An unknown filter was called.
    UnknownFilter,
    /// An unknown test was called.
    UnknownTest,
    /// An unknown function was called.
    UnknownFunction,
    /// An unknown method was called.
    UnknownMethod,
    /// A referenced block does not exist.
    UnknownBlock,
    /// A bad escape sequence in a string literal was encountered.
    BadEscape,
    /// An operation on an undefined value was attempted.
    UndefinedError,
    /// A required argument to a filter, test or function was missing.
    MissingArgument,
    /// A filter, test, function or macro was called with too many arguments.
    TooManyArguments,
    /// An included template failed to render.
    BadInclude,
    /// An inherited block failed to render.
    EvalBlock,
    /// The engine ran out of fuel.
    OutOfFuel,
    /// A value could not be converted into the internal format.
    BadSerialization,
    /// The configured delimiters cannot be used.
    InvalidDelimiter,
}

impl ErrorKind {
    fn description(self) -> &'static str {
        match self {
            ErrorKind::SyntaxError => "syntax error",
            ErrorKind::InvalidOperation => "invalid operation",
            ErrorKind::TemplateNotFound => "template not found",
            ErrorKind::UnknownFilter => "unknown filter",
            ErrorKind::UnknownTest => "unknown test",
            ErrorKind::UnknownFunction => "unknown function",
            ErrorKind::UnknownMethod => "unknown method",
            ErrorKind::UnknownBlock => "unknown block",
            ErrorKind::BadEscape => "bad string escape",
            ErrorKind::UndefinedError => "undefined value",
            ErrorKind::MissingArgument => "missing argument",
            ErrorKind::TooManyArguments => "too many arguments",
            ErrorKind::BadInclude => "could not render include",
            ErrorKind::EvalBlock => "could not render block",
            ErrorKind::OutOfFuel => "engine ran out of fuel",
            ErrorKind::BadSerialization => "could not serialize to value",
            ErrorKind::InvalidDelimiter => "invalid delimiter configuration",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref detail) = self.repr.detail {
            ok!(write!(f, "{}: {}", self.kind(), detail));
        } else {
            ok!(write!(f, "{}", self.kind()));
        }
        if let Some(ref filename) = self.repr.name {
            ok!(write!(f, " (in {}:{})", filename, self.repr.lineno));
        }
        if f.alternate() {
            if let Some(ref info) = self.repr.debug_info {
                ok!(info.render(self.line(), self.span(), f));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut err = f.debug_struct("Error");
        err.field("kind", &self.kind());
        if let Some(ref detail) = self.repr.detail {
            err.field("detail", detail);
        }
        if let Some(ref name) = self.name() {
            err.field("name", name);
        }
        if let Some(line) = self.line() {
            err.field("line", &line);
        }
        if let Some(ref source) = std::error::Error::source(self) {
            err.field("source", source);
        }
        err.finish()
    }
}

impl Error {
    /// Creates a new error with kind and detail.
    pub fn new<D: Into<Cow<'static, str>>>(kind: ErrorKind, detail: D) -> Error {
        Error {
            repr: Box::new(ErrorRepr {
                kind,
                detail: Some(detail.into()),
                name: None,
                lineno: 0,
                span: None,
                template_source: None,
                source: None,
                debug_info: None,
            }),
        }
    }

    /// Creates a template not found error for a name.
    pub(crate) fn new_not_found(name: &str) -> Error {
        Error::new(
            ErrorKind::TemplateNotFound,
            format!("template {name:?} does not exist"),
        )
    }

    pub(crate) fn set_filename_and_line(&mut self, filename: &str, lineno: usize) {
        self.repr.name = Some(filename.into());
        self.repr.lineno = lineno;
    }

    pub(crate) fn set_filename_and_span(&mut self, filename: &str, span: Span) {
        self.repr.name = Some(filename.into());
        self.repr.span = Some(span);
        self.repr.lineno = span.start_line as usize;
    }

    /// Attaches another error as source to this error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.repr.source = Some(Box::new(source));
        self
    }

    /// Returns the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.repr.kind
    }

    /// Returns the error detail.
    ///
    /// The detail is an error message that provides further details about
    /// the error kind.
    pub fn detail(&self) -> Option<&str> {
        self.repr.detail.as_deref()
    }

    /// Returns the name of the template that caused the error.
    pub fn name(&self) -> Option<&str> {
        self.repr.name.as_deref()
    }

    /// Returns the line number where the error occurred.
    pub fn line(&self) -> Option<usize> {
        self.repr.name.as_ref().map(|_| self.repr.lineno)
    }

    /// Returns the byte range of where the error occurred if available.
    pub fn range(&self) -> Option<std::ops::Range<usize>> {
        self.repr
            .span
            .map(|x| x.start_offset as usize..x.end_offset as usize)
    }

    /// Returns the node span of where the error occurred if available.
    pub(crate) fn span(&self) -> Option<Span> {
        self.repr.span
    }

    /// Returns the template source if attached.
    pub fn template_source(&self) -> Option<&str> {
        self.repr.template_source.as_deref()
    }

    pub(crate) fn attach_template_source(&mut self, source: &str) {
        if self.repr.template_source.is_none() {
            self.repr.template_source = Some(source.to_string());
        }
    }

    /// Returns the debug info if attached.
    pub fn debug_info(&self) -> Option<&DebugInfo> {
        self.repr.debug_info.as_ref()
    }

    pub(crate) fn attach_debug_info(&mut self, value: DebugInfo) {
        self.repr.debug_info = Some(value);
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.repr.source.as_ref().map(|err| err.as_ref() as _)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error {
            repr: Box::new(ErrorRepr {
                kind,
                detail: None,
                name: None,
                lineno: 0,
                span: None,
                template_source: None,
                source: None,
                debug_info: None,
            }),
        }
    }
}

impl From<fmt::Error> for Error {
    fn from(_: fmt::Error) -> Self {
        Error::new(ErrorKind::InvalidOperation, "formatting failed")
    }
}

impl serde::ser::Error for Error {
    fn custom<T>(msg: T) -> Self
    where
        T: fmt::Display,
    {
        Error::new(ErrorKind::BadSerialization, msg.to_string())
    }
}

/// Extra information attached to errors when debug mode is enabled.
///
/// The debug info carries a snapshot of the template source and the values
/// of variables the failing node referenced.  The engine only collects this
/// data; rendering a richer diagnostic out of it is left to the caller.
#[derive(Default)]
pub struct DebugInfo {
    pub(crate) template_source: Option<String>,
    pub(crate) referenced_locals: Vec<(String, Value)>,
}

impl fmt::Debug for DebugInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugInfo")
            .field("referenced_locals", &self.referenced_locals)
            .finish()
    }
}

impl DebugInfo {
    /// Returns the source of the template that failed.
    pub fn source(&self) -> Option<&str> {
        self.template_source.as_deref()
    }

    /// Returns the values of the variables the failing node referenced.
    pub fn referenced_locals(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.referenced_locals
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    fn render(
        &self,
        line: Option<usize>,
        span: Option<Span>,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        if let Some(source) = self.source() {
            ok!(writeln!(f));
            ok!(writeln!(f, "{:-^74}", " Template Source "));
            let lines: Vec<_> = source.lines().enumerate().collect();
            let idx = line.unwrap_or(1).saturating_sub(1);
            let skip = idx.saturating_sub(3);
            for (line_idx, line_source) in lines.iter().skip(skip).take(7) {
                if *line_idx == idx {
                    ok!(writeln!(f, "{:>4} > {}", line_idx + 1, line_source));
                    if let Some(span) = span {
                        if span.start_line == span.end_line {
                            ok!(writeln!(
                                f,
                                "     i {}{}",
                                " ".repeat(span.start_col as usize),
                                "^".repeat((span.end_col.saturating_sub(span.start_col)).max(1)
                                    as usize),
                            ));
                        }
                    }
                } else {
                    ok!(writeln!(f, "{:>4} | {}", line_idx + 1, line_source));
                }
            }
            ok!(writeln!(f, "{:-^74}", ""));
        }
        if !self.referenced_locals.is_empty() {
            ok!(writeln!(f, "{:#?}", self));
        }
        Ok(())
    }
}

pub(crate) fn attach_basic_debug_info<T>(rv: Result<T, Error>, source: &str) -> Result<T, Error> {
    match rv {
        Ok(rv) => Ok(rv),
        Err(mut err) => {
            err.repr.debug_info = Some(DebugInfo {
                template_source: Some(source.to_string()),
                referenced_locals: Vec::new(),
            });
            Err(err)
        }
    }
}
