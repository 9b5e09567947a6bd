use std::sync::Arc;

use crate::compiler::tokens::{Span, Token};
use crate::error::{Error, ErrorKind};
use crate::syntax::{StartMarker, SyntaxConfig};
use crate::utils::{memchr, memstr, unescape};

/// Configures the whitespace handling of the lexer.
#[derive(Debug, Default, Clone, Copy)]
pub struct WhitespaceConfig {
    /// When enabled the first newline after a block tag is removed.
    pub trim_blocks: bool,
    /// When enabled leading spaces and tabs are stripped from the start
    /// of a line to a block tag.
    pub lstrip_blocks: bool,
    /// When disabled the single trailing newline of a template is removed.
    pub keep_trailing_newline: bool,
}

enum LexerState {
    Template,
    InVariable,
    InBlock,
    InLineStatement,
}

enum Cut {
    Marker(bool),
    LineStatement,
    LineComment,
}

/// Tokenizes template source into a stream of tokens.
pub struct Tokenizer<'s> {
    stack: Vec<LexerState>,
    rest: &'s str,
    filename: &'s str,
    failed: bool,
    current_line: u32,
    current_col: u32,
    current_offset: u32,
    trim_leading_whitespace: bool,
    paren_balance: isize,
    syntax_config: SyntaxConfig,
    ws_config: WhitespaceConfig,
}

fn find_start_marker_memchr(a: &str) -> Option<(usize, bool)> {
    let bytes = a.as_bytes();
    let mut offset = 0;
    loop {
        let idx = some!(memchr(&bytes[offset..], b'{'));
        if let Some(b'{' | b'%' | b'#') = bytes.get(offset + idx + 1).copied() {
            return Some((
                offset + idx,
                bytes.get(offset + idx + 2).copied() == Some(b'-'),
            ));
        }
        offset += idx + 1;
    }
}

fn find_start_marker(a: &str, syntax_config: &SyntaxConfig) -> Option<(usize, bool)> {
    match syntax_config.0.aho_corasick {
        Some(ref ac) => {
            let bytes = a.as_bytes();
            ac.find(bytes).map(|m| {
                (
                    m.start(),
                    bytes.get(m.start() + m.len()).copied() == Some(b'-'),
                )
            })
        }
        None => find_start_marker_memchr(a),
    }
}

fn match_start_marker(rest: &str, syntax_config: &SyntaxConfig) -> Option<(StartMarker, usize)> {
    if syntax_config.0.aho_corasick.is_none() {
        return match_start_marker_default(rest);
    }

    for delimiter in syntax_config.0.start_delimiters_order {
        let marker = match delimiter {
            StartMarker::Variable => &syntax_config.0.delims.variable_start as &str,
            StartMarker::Block => &syntax_config.0.delims.block_start as &str,
            StartMarker::Comment => &syntax_config.0.delims.comment_start as &str,
        };
        if rest.get(..marker.len()) == Some(marker) {
            return Some((delimiter, marker.len()));
        }
    }

    None
}

fn match_start_marker_default(rest: &str) -> Option<(StartMarker, usize)> {
    match rest.get(..2) {
        Some("{{") => Some((StartMarker::Variable, 2)),
        Some("{%") => Some((StartMarker::Block, 2)),
        Some("{#") => Some((StartMarker::Comment, 2)),
        _ => None,
    }
}

fn lex_identifier(s: &str) -> usize {
    s.as_bytes()
        .iter()
        .enumerate()
        .take_while(|&(idx, &c)| {
            if c == b'_' {
                true
            } else if idx == 0 {
                c.is_ascii_alphabetic()
            } else {
                c.is_ascii_alphanumeric()
            }
        })
        .count()
}

fn skip_basic_tag(block_str: &str, name: &str, block_end: &str) -> Option<(usize, bool)> {
    let mut ptr = block_str;
    let mut trim = false;

    if let Some(rest) = ptr.strip_prefix('-') {
        ptr = rest;
    }
    while let Some(rest) = ptr.strip_prefix(|x: char| x.is_ascii_whitespace()) {
        ptr = rest;
    }

    ptr = some!(ptr.strip_prefix(name));

    while let Some(rest) = ptr.strip_prefix(|x: char| x.is_ascii_whitespace()) {
        ptr = rest;
    }
    if let Some(rest) = ptr.strip_prefix('-') {
        ptr = rest;
        trim = true;
    }
    ptr = some!(ptr.strip_prefix(block_end));

    Some((block_str.len() - ptr.len(), trim))
}

fn lstrip_block(s: &str) -> &str {
    let trimmed = s.trim_end_matches(&[' ', '\t'][..]);
    if trimmed.is_empty() || trimmed.ends_with('\n') {
        trimmed
    } else {
        s
    }
}

impl<'s> Tokenizer<'s> {
    /// Creates a new tokenizer for the given source.
    pub fn new(
        mut source: &'s str,
        filename: &'s str,
        syntax_config: SyntaxConfig,
        ws_config: WhitespaceConfig,
    ) -> Tokenizer<'s> {
        if !ws_config.keep_trailing_newline {
            if let Some(stripped) = source.strip_suffix('\n') {
                source = stripped;
            }
            if let Some(stripped) = source.strip_suffix('\r') {
                source = stripped;
            }
        }
        Tokenizer {
            stack: vec![LexerState::Template],
            rest: source,
            filename,
            failed: false,
            current_line: 1,
            current_col: 0,
            current_offset: 0,
            trim_leading_whitespace: false,
            paren_balance: 0,
            syntax_config,
            ws_config,
        }
    }

    /// Returns the current filename.
    pub fn filename(&self) -> &'s str {
        self.filename
    }

    /// Produces the next token or `None` at the end of input.
    pub fn next_token(&mut self) -> Result<Option<(Token<'s>, Span)>, Error> {
        loop {
            if self.rest.is_empty() || self.failed {
                if !self.failed && matches!(self.stack.last(), Some(LexerState::InLineStatement)) {
                    let old_loc = self.loc();
                    self.stack.pop();
                    return Ok(Some((Token::BlockEnd, self.span(old_loc))));
                }
                return Ok(None);
            }
            match self.stack.last() {
                Some(LexerState::Template) => {
                    if let Some(rv) = ok!(self.tokenize_template_data()) {
                        return Ok(Some(rv));
                    }
                }
                Some(LexerState::InBlock | LexerState::InVariable) => {
                    if let Some(rv) = ok!(self.tokenize_in_tag(false)) {
                        return Ok(Some(rv));
                    }
                }
                Some(LexerState::InLineStatement) => {
                    if let Some(rv) = ok!(self.tokenize_in_tag(true)) {
                        return Ok(Some(rv));
                    }
                }
                None => unreachable!("empty lexer state"),
            }
        }
    }

    fn advance(&mut self, bytes: usize) -> &'s str {
        let (skipped, new_rest) = self.rest.split_at(bytes);
        for c in skipped.chars() {
            match c {
                '\n' => {
                    self.current_line += 1;
                    self.current_col = 0;
                }
                _ => self.current_col += 1,
            }
        }
        self.current_offset += bytes as u32;
        self.rest = new_rest;
        skipped
    }

    #[inline(always)]
    fn loc(&self) -> (u32, u32, u32) {
        (self.current_line, self.current_col, self.current_offset)
    }

    fn span(&self, start: (u32, u32, u32)) -> Span {
        let (start_line, start_col, start_offset) = start;
        Span {
            start_line,
            start_col,
            start_offset,
            end_line: self.current_line,
            end_col: self.current_col,
            end_offset: self.current_offset,
        }
    }

    fn syntax_error(&mut self, msg: &'static str) -> Error {
        self.failed = true;
        let mut err = Error::new(ErrorKind::SyntaxError, msg);
        err.set_filename_and_line(self.filename, self.current_line as usize);
        err
    }

    fn skip_whitespace(&mut self) {
        let skip = self
            .rest
            .chars()
            .map_while(|c| c.is_whitespace().then(|| c.len_utf8()))
            .sum::<usize>();
        if skip > 0 {
            self.advance(skip);
        }
    }

    fn eat_one_newline(&mut self) {
        if self.rest.starts_with("\r\n") {
            self.advance(2);
        } else if self.rest.starts_with('\n') {
            self.advance(1);
        }
    }

    fn block_end(&self) -> &str {
        &self.syntax_config.0.delims.block_end
    }

    fn variable_end(&self) -> &str {
        &self.syntax_config.0.delims.variable_end
    }

    /// Finds the next point of interest in the template data.
    fn next_cut(&self) -> Option<(usize, Cut)> {
        let mut best = find_start_marker(self.rest, &self.syntax_config)
            .map(|(pos, trim)| (pos, Cut::Marker(trim)));
        if let Some(prefix) = self.syntax_config.line_comment_prefix() {
            if let Some(pos) = memstr(self.rest.as_bytes(), prefix.as_bytes()) {
                if best.as_ref().map_or(true, |&(best_pos, _)| pos < best_pos) {
                    best = Some((pos, Cut::LineComment));
                }
            }
        }
        if let Some(prefix) = self.syntax_config.line_statement_prefix() {
            if let Some(pos) = self.find_line_statement(prefix) {
                if best.as_ref().map_or(true, |&(best_pos, _)| pos < best_pos) {
                    best = Some((pos, Cut::LineStatement));
                }
            }
        }
        best
    }

    /// Finds the start of the next line whose first non-whitespace
    /// content is the line statement prefix.
    fn find_line_statement(&self, prefix: &str) -> Option<usize> {
        let mut line_start = if self.current_col == 0 { Some(0) } else { None };
        let bytes = self.rest.as_bytes();
        loop {
            if let Some(start) = line_start {
                let ws = bytes[start..]
                    .iter()
                    .take_while(|&&c| c == b' ' || c == b'\t')
                    .count();
                if self.rest[start + ws..].starts_with(prefix) {
                    return Some(start);
                }
            }
            let search_from = line_start.unwrap_or(0);
            match memchr(&bytes[search_from..], b'\n') {
                Some(idx) => line_start = Some(search_from + idx + 1),
                None => return None,
            }
        }
    }

    fn handle_line_statement_start(&mut self, prefix: &str) -> Option<(Token<'s>, Span)> {
        if self.current_col != 0 {
            return None;
        }
        let ws = self
            .rest
            .as_bytes()
            .iter()
            .take_while(|&&c| c == b' ' || c == b'\t')
            .count();
        if !self.rest[ws..].starts_with(prefix) {
            return None;
        }
        let old_loc = self.loc();
        self.advance(ws + prefix.len());
        self.stack.push(LexerState::InLineStatement);
        self.paren_balance = 0;
        Some((Token::BlockStart, self.span(old_loc)))
    }

    fn tokenize_template_data(&mut self) -> Result<Option<(Token<'s>, Span)>, Error> {
        let mut old_loc = self.loc();

        match match_start_marker(self.rest, &self.syntax_config) {
            Some((StartMarker::Comment, skip)) => {
                let comment_end = self.syntax_config.0.delims.comment_end.clone();
                return match memstr(&self.rest.as_bytes()[skip..], comment_end.as_bytes()) {
                    Some(end) => {
                        let trim = self
                            .rest
                            .as_bytes()
                            .get(end.saturating_sub(1) + skip)
                            .copied()
                            == Some(b'-');
                        self.advance(end + skip + comment_end.len());
                        if trim {
                            self.trim_leading_whitespace = true;
                        } else if self.ws_config.trim_blocks {
                            self.eat_one_newline();
                        }
                        Ok(None)
                    }
                    None => Err(self.syntax_error("unexpected end of comment")),
                };
            }
            Some((StartMarker::Variable, skip)) => {
                if self.rest.as_bytes().get(skip) == Some(&b'-') {
                    self.advance(skip + 1);
                } else {
                    self.advance(skip);
                }
                self.stack.push(LexerState::InVariable);
                return Ok(Some((Token::VariableStart, self.span(old_loc))));
            }
            Some((StartMarker::Block, skip)) => {
                // raw blocks require special handling.  If we are at the beginning of a
                // raw block we want to skip everything until {% endraw %} completely
                // ignoring interior syntax and emit the entire raw block as template
                // data.
                if let Some((raw, trim_start)) =
                    skip_basic_tag(&self.rest[skip..], "raw", self.block_end())
                {
                    return self.tokenize_raw_block(skip + raw, trim_start).map(Some);
                }
                if self.rest.as_bytes().get(skip) == Some(&b'-') {
                    self.advance(skip + 1);
                } else {
                    self.advance(skip);
                }
                self.stack.push(LexerState::InBlock);
                return Ok(Some((Token::BlockStart, self.span(old_loc))));
            }
            None => {}
        }

        if let Some(prefix) = self.syntax_config.line_comment_prefix() {
            if self.rest.starts_with(prefix) {
                let line_len = memchr(self.rest.as_bytes(), b'\n').unwrap_or(self.rest.len());
                self.advance(line_len);
                return Ok(None);
            }
        }
        if let Some(prefix) = self
            .syntax_config
            .line_statement_prefix()
            .map(|x| x.to_string())
        {
            if let Some(rv) = self.handle_line_statement_start(&prefix) {
                return Ok(Some(rv));
            }
        }

        if self.trim_leading_whitespace {
            self.trim_leading_whitespace = false;
            self.skip_whitespace();
        }
        old_loc = self.loc();

        let (lead, span) = match self.next_cut() {
            Some((cut, Cut::Marker(true))) => {
                let peeked = &self.rest[..cut];
                let trimmed = peeked.trim_end();
                let lead = self.advance(trimmed.len());
                let span = self.span(old_loc);
                self.advance(peeked.len() - trimmed.len());
                (lead, span)
            }
            Some((cut, Cut::Marker(false))) => {
                let mut peeked = &self.rest[..cut];
                if self.ws_config.lstrip_blocks
                    && !matches!(
                        match_start_marker(&self.rest[cut..], &self.syntax_config),
                        Some((StartMarker::Variable, _))
                    )
                {
                    peeked = lstrip_block(peeked);
                }
                let lead_len = peeked.len();
                let lead = self.advance(lead_len);
                let span = self.span(old_loc);
                self.advance(cut - lead_len);
                (lead, span)
            }
            Some((cut, Cut::LineStatement | Cut::LineComment)) => {
                (self.advance(cut), self.span(old_loc))
            }
            None => (self.advance(self.rest.len()), self.span(old_loc)),
        };
        if lead.is_empty() {
            Ok(None)
        } else {
            Ok(Some((Token::TemplateData(lead), span)))
        }
    }

    fn tokenize_raw_block(
        &mut self,
        skip: usize,
        trim_start: bool,
    ) -> Result<(Token<'s>, Span), Error> {
        let old_loc = self.loc();
        let block_start = self.syntax_config.0.delims.block_start.clone();
        let block_end = self.block_end().to_string();
        self.advance(skip);
        let mut ptr = 0;
        while let Some(block) = memstr(&self.rest.as_bytes()[ptr..], block_start.as_bytes()) {
            ptr += block + block_start.len();
            let trim_end = self.rest.as_bytes().get(ptr) == Some(&b'-');
            if let Some((endraw, trim_next)) = skip_basic_tag(&self.rest[ptr..], "endraw", &block_end)
            {
                let mut result = &self.rest[..ptr - block_start.len()];
                if trim_start {
                    result = result.trim_start();
                }
                if trim_end {
                    result = result.trim_end();
                }
                self.advance(ptr + endraw);
                if trim_next {
                    self.trim_leading_whitespace = true;
                } else if self.ws_config.trim_blocks {
                    self.eat_one_newline();
                }
                return Ok((Token::TemplateData(result), self.span(old_loc)));
            }
        }
        Err(self.syntax_error("unexpected end of raw block"))
    }

    fn tokenize_in_tag(&mut self, line_statement: bool) -> Result<Option<(Token<'s>, Span)>, Error> {
        // within tags whitespace is generally insignificant.  Line statements
        // however terminate at the end of the line unless parentheses or
        // brackets are left open.
        loop {
            match self.rest.as_bytes().first() {
                Some(b'\n') if line_statement && self.paren_balance <= 0 => {
                    let old_loc = self.loc();
                    self.advance(1);
                    self.stack.pop();
                    return Ok(Some((Token::BlockEnd, self.span(old_loc))));
                }
                Some(c) if c.is_ascii_whitespace() => {
                    self.advance(1);
                }
                None => {
                    if line_statement {
                        let old_loc = self.loc();
                        self.stack.pop();
                        return Ok(Some((Token::BlockEnd, self.span(old_loc))));
                    }
                    return Ok(None);
                }
                Some(_) => break,
            }
        }

        let old_loc = self.loc();

        if !line_statement {
            if let Some(LexerState::InBlock) = self.stack.last() {
                let block_end = self.block_end().to_string();
                if self.rest.get(..1) == Some("-")
                    && self.rest.get(1..block_end.len() + 1) == Some(block_end.as_str())
                {
                    self.stack.pop();
                    self.advance(block_end.len() + 1);
                    self.trim_leading_whitespace = true;
                    return Ok(Some((Token::BlockEnd, self.span(old_loc))));
                }
                if self.rest.get(..block_end.len()) == Some(block_end.as_str()) {
                    self.stack.pop();
                    self.advance(block_end.len());
                    if self.ws_config.trim_blocks {
                        self.eat_one_newline();
                    }
                    return Ok(Some((Token::BlockEnd, self.span(old_loc))));
                }
            } else {
                let variable_end = self.variable_end().to_string();
                if self.rest.get(..1) == Some("-")
                    && self.rest.get(1..variable_end.len() + 1) == Some(variable_end.as_str())
                {
                    self.stack.pop();
                    self.advance(variable_end.len() + 1);
                    self.trim_leading_whitespace = true;
                    return Ok(Some((Token::VariableEnd, self.span(old_loc))));
                }
                if self.rest.get(..variable_end.len()) == Some(variable_end.as_str()) {
                    self.stack.pop();
                    self.advance(variable_end.len());
                    return Ok(Some((Token::VariableEnd, self.span(old_loc))));
                }
            }
        }

        // two character operators
        let op = match self.rest.as_bytes().get(..2) {
            Some(b"//") => Some(Token::FloorDiv),
            Some(b"**") => Some(Token::Pow),
            Some(b"==") => Some(Token::Eq),
            Some(b"!=") => Some(Token::Ne),
            Some(b">=") => Some(Token::Gte),
            Some(b"<=") => Some(Token::Lte),
            _ => None,
        };
        if let Some(op) = op {
            self.advance(2);
            return Ok(Some((op, self.span(old_loc))));
        }

        // single character operators (and strings)
        let op = match self.rest.as_bytes().first() {
            Some(b'+') => Some(Token::Plus),
            Some(b'-') => Some(Token::Minus),
            Some(b'*') => Some(Token::Mul),
            Some(b'/') => Some(Token::Div),
            Some(b'%') => Some(Token::Mod),
            Some(b'!') => Some(Token::Bang),
            Some(b'.') => Some(Token::Dot),
            Some(b',') => Some(Token::Comma),
            Some(b':') => Some(Token::Colon),
            Some(b'~') => Some(Token::Tilde),
            Some(b'|') => Some(Token::Pipe),
            Some(b'=') => Some(Token::Assign),
            Some(b'>') => Some(Token::Gt),
            Some(b'<') => Some(Token::Lt),
            Some(b'(') => {
                self.paren_balance += 1;
                Some(Token::ParenOpen)
            }
            Some(b')') => {
                self.paren_balance -= 1;
                Some(Token::ParenClose)
            }
            Some(b'[') => {
                self.paren_balance += 1;
                Some(Token::BracketOpen)
            }
            Some(b']') => {
                self.paren_balance -= 1;
                Some(Token::BracketClose)
            }
            Some(b'{') => {
                self.paren_balance += 1;
                Some(Token::BraceOpen)
            }
            Some(b'}') => {
                self.paren_balance -= 1;
                Some(Token::BraceClose)
            }
            Some(b'\'') => return self.eat_string(b'\'').map(Some),
            Some(b'"') => return self.eat_string(b'"').map(Some),
            Some(c) if c.is_ascii_digit() => return self.eat_number().map(Some),
            _ => None,
        };
        if let Some(op) = op {
            self.advance(1);
            return Ok(Some((op, self.span(old_loc))));
        }

        self.eat_identifier().map(Some)
    }

    fn eat_number(&mut self) -> Result<(Token<'s>, Span), Error> {
        #[derive(Copy, Clone)]
        enum State {
            Integer,      // 123
            Fraction,     // .123
            Exponent,     // E | e
            ExponentSign, // +|-
        }

        let old_loc = self.loc();
        let mut state = State::Integer;
        let mut num_len = self
            .rest
            .as_bytes()
            .iter()
            .take_while(|&c| c.is_ascii_digit())
            .count();
        for c in self.rest.as_bytes()[num_len..].iter().copied() {
            state = match (c, state) {
                (b'.', State::Integer) => State::Fraction,
                (b'E' | b'e', State::Integer | State::Fraction) => State::Exponent,
                (b'+' | b'-', State::Exponent) => State::ExponentSign,
                (b'0'..=b'9', State::Exponent) => State::ExponentSign,
                (b'0'..=b'9', state) => state,
                _ => break,
            };
            num_len += 1;
        }
        let is_float = !matches!(state, State::Integer);

        let num = self.advance(num_len);
        Ok((
            ok!(if is_float {
                num.parse()
                    .map(Token::Float)
                    .map_err(|_| self.syntax_error("invalid float"))
            } else if let Ok(int) = num.parse() {
                Ok(Token::Int(int))
            } else {
                num.parse()
                    .map(Token::Int128)
                    .map_err(|_| self.syntax_error("invalid integer"))
            }),
            self.span(old_loc),
        ))
    }

    fn eat_identifier(&mut self) -> Result<(Token<'s>, Span), Error> {
        let ident_len = lex_identifier(self.rest);
        if ident_len > 0 {
            let old_loc = self.loc();
            let ident = self.advance(ident_len);
            Ok((Token::Ident(ident), self.span(old_loc)))
        } else {
            Err(self.syntax_error("unexpected character"))
        }
    }

    fn eat_string(&mut self, delim: u8) -> Result<(Token<'s>, Span), Error> {
        let old_loc = self.loc();
        let mut escaped = false;
        let mut has_escapes = false;
        let str_len = self
            .rest
            .as_bytes()
            .iter()
            .skip(1)
            .take_while(|&&c| match (escaped, c) {
                (true, _) => {
                    escaped = false;
                    true
                }
                (_, b'\\') => {
                    escaped = true;
                    has_escapes = true;
                    true
                }
                (_, c) if c == delim => false,
                _ => true,
            })
            .count();
        if escaped || self.rest.as_bytes().get(str_len + 1) != Some(&delim) {
            return Err(self.syntax_error("unexpected end of string"));
        }
        let s = self.advance(str_len + 2);
        Ok(if has_escapes {
            (
                Token::String(match unescape(&s[1..s.len() - 1]) {
                    Ok(unescaped) => Arc::from(unescaped),
                    Err(err) => return Err(err),
                }),
                self.span(old_loc),
            )
        } else {
            (Token::Str(&s[1..s.len() - 1]), self.span(old_loc))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    fn collect(source: &str, ws: WhitespaceConfig) -> Vec<String> {
        let mut tokenizer = Tokenizer::new(source, "<string>", Default::default(), ws);
        let mut rv = Vec::new();
        while let Some((token, _)) = tokenizer.next_token().unwrap() {
            rv.push(match token {
                Token::TemplateData(data) => format!("data:{data}"),
                Token::Ident(ident) => format!("ident:{ident}"),
                other => other.to_string(),
            });
        }
        rv
    }

    #[test]
    fn test_find_marker() {
        let syntax = SyntaxConfig::default();
        assert!(find_start_marker("{", &syntax).is_none());
        assert!(find_start_marker("foo", &syntax).is_none());
        assert!(find_start_marker("foo {", &syntax).is_none());
        assert_eq!(find_start_marker("foo {{", &syntax), Some((4, false)));
        assert_eq!(find_start_marker("foo {{-", &syntax), Some((4, true)));
    }

    #[test]
    fn test_find_marker_custom_syntax() {
        let syntax_config = SyntaxConfig::builder()
            .block_delimiters("%{", "}%")
            .variable_delimiters("[[", "]]")
            .comment_delimiters("/*", "*/")
            .build()
            .expect("failed to create syntax config");

        assert_eq!(find_start_marker("%{", &syntax_config), Some((0, false)));
        assert!(find_start_marker("/", &syntax_config).is_none());
        assert!(find_start_marker("foo [", &syntax_config).is_none());
        assert_eq!(find_start_marker("foo /*", &syntax_config), Some((4, false)));
        assert_eq!(find_start_marker("foo [[-", &syntax_config), Some((4, true)));
    }

    #[test]
    fn test_is_basic_tag() {
        assert_eq!(skip_basic_tag(" raw %}", "raw", "%}"), Some((7, false)));
        assert_eq!(skip_basic_tag(" raw %}", "endraw", "%}"), None);
        assert_eq!(skip_basic_tag("  raw  %}", "raw", "%}"), Some((9, false)));
        assert_eq!(skip_basic_tag("-  raw  -%}", "raw", "%}"), Some((11, true)));
    }

    #[test]
    fn test_basic_identifiers() {
        assert_eq!(lex_identifier("foo_bar_baz"), 11);
        assert_eq!(lex_identifier("_foo_bar_baz"), 12);
        assert_eq!(lex_identifier("_42world"), 8);
        assert_eq!(lex_identifier("world42"), 7);
        assert_eq!(lex_identifier("42world"), 0);
    }

    #[test]
    fn test_trim_blocks() {
        let ws = WhitespaceConfig {
            trim_blocks: true,
            keep_trailing_newline: true,
            ..Default::default()
        };
        assert_eq!(
            collect("{% if x %}\nfoo\n{% endif %}\n", ws),
            vec![
                "start of block",
                "ident:if",
                "ident:x",
                "end of block",
                "data:foo\n",
                "start of block",
                "ident:endif",
                "end of block",
            ],
        );
    }

    #[test]
    fn test_lstrip_blocks() {
        let ws = WhitespaceConfig {
            lstrip_blocks: true,
            keep_trailing_newline: true,
            ..Default::default()
        };
        assert_eq!(
            collect("x\n    {% if x %}y{% endif %}", ws),
            vec![
                "data:x\n",
                "start of block",
                "ident:if",
                "ident:x",
                "end of block",
                "data:y",
                "start of block",
                "ident:endif",
                "end of block",
            ],
        );
    }

    #[test]
    fn test_trailing_newline() {
        let ws = WhitespaceConfig::default();
        assert_eq!(collect("foo\n", ws), vec!["data:foo"]);
        let ws = WhitespaceConfig {
            keep_trailing_newline: true,
            ..Default::default()
        };
        assert_eq!(collect("foo\n", ws), vec!["data:foo\n"]);
    }

    #[test]
    fn test_line_statements() {
        let syntax = SyntaxConfig::builder()
            .line_statement_prefix("#")
            .line_comment_prefix("##")
            .build()
            .unwrap();
        let mut tokenizer = Tokenizer::new(
            "# for item in seq\n{{ item }} ## tail comment\n# endfor\ndone",
            "<string>",
            syntax,
            WhitespaceConfig {
                keep_trailing_newline: true,
                ..Default::default()
            },
        );
        let mut rv = Vec::new();
        while let Some((token, _)) = tokenizer.next_token().unwrap() {
            rv.push(token.to_string());
        }
        assert_eq!(
            rv,
            vec![
                "start of block",
                "identifier",
                "identifier",
                "identifier",
                "end of block",
                "start of variable block",
                "identifier",
                "end of variable block",
                "template-data",
                "template-data",
                "start of block",
                "identifier",
                "end of block",
                "template-data",
            ],
        );
    }
}
