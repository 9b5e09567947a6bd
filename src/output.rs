use std::fmt;

use crate::utils::AutoEscape;
use crate::value::Value;

/// How the output is capturing.
#[derive(Debug, Clone, Copy)]
pub enum CaptureMode {
    /// Everything is captured into a buffer.
    Capture,
    /// Everything is discarded.
    Discard,
}

/// An abstraction over [`Write`](std::fmt::Write) for the rendering.
///
/// This is a utility type used in the engine which can be written into like
/// one can write into an [`std::fmt::Write`] value.  It's primarily used
/// internally in the engine but it's also passed to the custom formatter
/// function.
pub struct Output<'a> {
    w: &'a mut (dyn fmt::Write + 'a),
    capture_stack: Vec<Option<String>>,
    null_writer: NullWriter,
}

impl<'a> Output<'a> {
    /// Creates an output writing to a string.
    pub(crate) fn with_string(buf: &'a mut String) -> Self {
        Self {
            w: buf,
            capture_stack: Vec::new(),
            null_writer: NullWriter,
        }
    }

    /// Creates an output writing into an arbitrary writer.
    pub(crate) fn with_write(w: &'a mut (dyn fmt::Write + 'a)) -> Self {
        Self {
            w,
            capture_stack: Vec::new(),
            null_writer: NullWriter,
        }
    }

    /// Begins capturing into a string or discards the output.
    pub(crate) fn begin_capture(&mut self, mode: CaptureMode) {
        self.capture_stack.push(match mode {
            CaptureMode::Capture => Some(String::new()),
            CaptureMode::Discard => None,
        });
    }

    /// Ends capturing and returns the captured string as value.
    pub(crate) fn end_capture(&mut self, auto_escape: AutoEscape) -> Value {
        if let Some(captured) = self.capture_stack.pop().unwrap() {
            if !matches!(auto_escape, AutoEscape::None) {
                Value::from_safe_string(captured)
            } else {
                Value::from(captured)
            }
        } else {
            Value::UNDEFINED
        }
    }

    /// Returns `true` if the output is discarding.
    pub(crate) fn is_discarding(&self) -> bool {
        matches!(self.capture_stack.last(), Some(None))
    }

    fn target(&mut self) -> &mut dyn fmt::Write {
        match self.capture_stack.last_mut() {
            Some(Some(stream)) => stream as _,
            Some(None) => &mut self.null_writer,
            None => self.w,
        }
    }

    /// Writes some data to the underlying buffer contained within this output.
    #[inline]
    pub fn write_str(&mut self, s: &str) -> fmt::Result {
        self.target().write_str(s)
    }

    /// Writes some formatted information into this instance.
    #[inline]
    pub fn write_fmt(&mut self, a: fmt::Arguments<'_>) -> fmt::Result {
        self.target().write_fmt(a)
    }
}

impl fmt::Write for Output<'_> {
    #[inline]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        fmt::Write::write_str(self.target(), s)
    }

    #[inline]
    fn write_char(&mut self, c: char) -> fmt::Result {
        fmt::Write::write_char(self.target(), c)
    }

    #[inline]
    fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> fmt::Result {
        fmt::Write::write_fmt(self.target(), args)
    }
}

/// A writer that eats everything.
pub struct NullWriter;

impl fmt::Write for NullWriter {
    #[inline]
    fn write_str(&mut self, _s: &str) -> fmt::Result {
        Ok(())
    }

    #[inline]
    fn write_char(&mut self, _c: char) -> fmt::Result {
        Ok(())
    }
}

/// Wraps an `io::Write` so it can be used as `fmt::Write`.
///
/// IO errors have no channel through `fmt::Error` so they are stashed away
/// and recovered when the render finishes.
pub(crate) struct WriteWrapper<W> {
    pub w: W,
    pub err: Option<std::io::Error>,
}

impl<W: std::io::Write> WriteWrapper<W> {
    /// Replaces the given error with the held io error if available.
    pub fn take_err(&mut self, original: crate::error::Error) -> crate::error::Error {
        self.err
            .take()
            .map(|io_err| {
                crate::error::Error::new(
                    crate::error::ErrorKind::InvalidOperation,
                    "failed to write output",
                )
                .with_source(io_err)
            })
            .unwrap_or(original)
    }
}

impl<W: std::io::Write> fmt::Write for WriteWrapper<W> {
    #[inline]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.w.write_all(s.as_bytes()).map_err(|e| {
            self.err = Some(e);
            fmt::Error
        })
    }
}
