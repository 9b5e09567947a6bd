//! Documents and configures the syntax of the template engine.
//!
//! The delimiters of the engine can be reconfigured via a
//! [`SyntaxConfig`] which is set on the environment with
//! [`set_syntax`](crate::Environment::set_syntax):
//!
//! ```
//! # use stencil::Environment;
//! use stencil::syntax::SyntaxConfig;
//!
//! let syntax = SyntaxConfig::builder()
//!     .block_delimiters("\\BLOCK{", "}")
//!     .variable_delimiters("\\VAR{", "}")
//!     .comment_delimiters("\\#{", "}")
//!     .build()
//!     .unwrap();
//!
//! let mut env = Environment::new();
//! env.set_syntax(syntax);
//! ```
//!
//! Additionally line statements and line comments in the style of Jinja2
//! can be enabled:
//!
//! ```
//! # use stencil::Environment;
//! use stencil::syntax::SyntaxConfig;
//!
//! let syntax = SyntaxConfig::builder()
//!     .line_statement_prefix("#")
//!     .line_comment_prefix("##")
//!     .build()
//!     .unwrap();
//! # let mut env = Environment::new();
//! # env.set_syntax(syntax);
//! ```
use std::borrow::Cow;
use std::sync::Arc;

use aho_corasick::AhoCorasick;

use crate::error::{Error, ErrorKind};

/// Utility enum that defines a start marker.
#[derive(Debug, Copy, Clone)]
pub(crate) enum StartMarker {
    Variable,
    Block,
    Comment,
}

#[derive(Debug, PartialEq, Clone)]
pub(crate) struct Delims {
    pub block_start: Cow<'static, str>,
    pub block_end: Cow<'static, str>,
    pub variable_start: Cow<'static, str>,
    pub variable_end: Cow<'static, str>,
    pub comment_start: Cow<'static, str>,
    pub comment_end: Cow<'static, str>,
}

const DEFAULT_DELIMS: Delims = Delims {
    block_start: Cow::Borrowed("{%"),
    block_end: Cow::Borrowed("%}"),
    variable_start: Cow::Borrowed("{{"),
    variable_end: Cow::Borrowed("}}"),
    comment_start: Cow::Borrowed("{#"),
    comment_end: Cow::Borrowed("#}"),
};

/// Builder helper to reconfigure the syntax.
///
/// Create with [`SyntaxConfig::builder`].
#[derive(Debug)]
pub struct SyntaxBuilder {
    delims: Delims,
    line_statement_prefix: Option<Cow<'static, str>>,
    line_comment_prefix: Option<Cow<'static, str>>,
}

impl SyntaxBuilder {
    /// Sets the block start and end delimiters.
    pub fn block_delimiters<S, E>(&mut self, s: S, e: E) -> &mut Self
    where
        S: Into<Cow<'static, str>>,
        E: Into<Cow<'static, str>>,
    {
        self.delims.block_start = s.into();
        self.delims.block_end = e.into();
        self
    }

    /// Sets the variable start and end delimiters.
    pub fn variable_delimiters<S, E>(&mut self, s: S, e: E) -> &mut Self
    where
        S: Into<Cow<'static, str>>,
        E: Into<Cow<'static, str>>,
    {
        self.delims.variable_start = s.into();
        self.delims.variable_end = e.into();
        self
    }

    /// Sets the comment start and end delimiters.
    pub fn comment_delimiters<S, E>(&mut self, s: S, e: E) -> &mut Self
    where
        S: Into<Cow<'static, str>>,
        E: Into<Cow<'static, str>>,
    {
        self.delims.comment_start = s.into();
        self.delims.comment_end = e.into();
        self
    }

    /// Enables line statements with the given prefix.
    ///
    /// A line whose first non-whitespace characters are the prefix is
    /// interpreted as a block statement spanning to the end of the line.
    pub fn line_statement_prefix<S>(&mut self, s: S) -> &mut Self
    where
        S: Into<Cow<'static, str>>,
    {
        self.line_statement_prefix = Some(s.into());
        self
    }

    /// Enables line comments with the given prefix.
    ///
    /// Everything from the prefix to the end of the line is ignored.
    pub fn line_comment_prefix<S>(&mut self, s: S) -> &mut Self
    where
        S: Into<Cow<'static, str>>,
    {
        self.line_comment_prefix = Some(s.into());
        self
    }

    /// Builds the final syntax config.
    pub fn build(&self) -> Result<SyntaxConfig, Error> {
        let delims = self.delims.clone();
        if delims.block_start == delims.variable_start
            || delims.block_start == delims.comment_start
            || delims.variable_start == delims.comment_start
        {
            return Err(ErrorKind::InvalidDelimiter.into());
        }
        if matches!(self.line_statement_prefix.as_deref(), Some(""))
            || matches!(self.line_comment_prefix.as_deref(), Some(""))
        {
            return Err(ErrorKind::InvalidDelimiter.into());
        }

        let aho_corasick = if delims == DEFAULT_DELIMS {
            None
        } else {
            Some(ok!(AhoCorasick::builder()
                .match_kind(aho_corasick::MatchKind::LeftmostLongest)
                .build([
                    &delims.variable_start as &str,
                    &delims.block_start as &str,
                    &delims.comment_start as &str,
                ])
                .map_err(|_| Error::from(ErrorKind::InvalidDelimiter))))
        };

        let mut start_delimiters_order = [
            StartMarker::Variable,
            StartMarker::Block,
            StartMarker::Comment,
        ];
        start_delimiters_order.sort_by_key(|marker| {
            std::cmp::Reverse(match marker {
                StartMarker::Variable => delims.variable_start.len(),
                StartMarker::Block => delims.block_start.len(),
                StartMarker::Comment => delims.comment_start.len(),
            })
        });

        Ok(SyntaxConfig(Arc::new(SyntaxConfigInternal {
            delims,
            start_delimiters_order,
            aho_corasick,
            line_statement_prefix: self.line_statement_prefix.clone(),
            line_comment_prefix: self.line_comment_prefix.clone(),
        })))
    }
}

#[derive(Debug)]
pub(crate) struct SyntaxConfigInternal {
    pub(crate) delims: Delims,
    pub(crate) start_delimiters_order: [StartMarker; 3],
    pub(crate) aho_corasick: Option<AhoCorasick>,
    pub(crate) line_statement_prefix: Option<Cow<'static, str>>,
    pub(crate) line_comment_prefix: Option<Cow<'static, str>>,
}

/// The delimiter and line marker configuration for the lexer.
///
/// The start markers need to be distinct from one another, the end markers
/// can be shared.  For the default configuration the lexer uses an
/// optimized code path that does not need a multi pattern matcher.
#[derive(Debug, Clone)]
pub struct SyntaxConfig(pub(crate) Arc<SyntaxConfigInternal>);

impl Default for SyntaxConfig {
    fn default() -> Self {
        SyntaxConfig(Arc::new(SyntaxConfigInternal {
            delims: DEFAULT_DELIMS,
            start_delimiters_order: [
                StartMarker::Variable,
                StartMarker::Block,
                StartMarker::Comment,
            ],
            aho_corasick: None,
            line_statement_prefix: None,
            line_comment_prefix: None,
        }))
    }
}

impl SyntaxConfig {
    /// Creates a syntax builder.
    pub fn builder() -> SyntaxBuilder {
        SyntaxBuilder {
            delims: DEFAULT_DELIMS,
            line_statement_prefix: None,
            line_comment_prefix: None,
        }
    }

    /// Returns the block delimiters.
    pub fn block_delimiters(&self) -> (&str, &str) {
        (&self.0.delims.block_start, &self.0.delims.block_end)
    }

    /// Returns the variable delimiters.
    pub fn variable_delimiters(&self) -> (&str, &str) {
        (&self.0.delims.variable_start, &self.0.delims.variable_end)
    }

    /// Returns the comment delimiters.
    pub fn comment_delimiters(&self) -> (&str, &str) {
        (&self.0.delims.comment_start, &self.0.delims.comment_end)
    }

    /// Returns the line statement prefix.
    pub fn line_statement_prefix(&self) -> Option<&str> {
        self.0.line_statement_prefix.as_deref()
    }

    /// Returns the line comment prefix.
    pub fn line_comment_prefix(&self) -> Option<&str> {
        self.0.line_comment_prefix.as_deref()
    }
}
