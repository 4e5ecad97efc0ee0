// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Two-layer lexer, per §4.2: a context-free [`RawLexer`] that only knows
//! about characters, punctuation and comment nesting, wrapped by a
//! context-sensitive [`TokenNormalizer`] that tracks which field of a
//! `equation~units~comment|` block it is in and reclassifies identifiers
//! against the [`crate::functions`] registry.

use crate::common::{Diag, ErrorCode};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Pos {
    pub line: u32,
    pub col: u32,
}

/// Tokens the character-level layer can produce without knowing what
/// section of the file it is in. `Newline` is significant here: Vensim's
/// `TABBED ARRAY` rows and sketch lines are newline-delimited, and the
/// normalizer needs to see line boundaries the raw layer would otherwise
/// treat as ordinary whitespace.
#[derive(Clone, Debug, PartialEq)]
pub enum RawToken {
    Ident(String),
    Number(String),
    Quoted(String),
    /// A single- or double-character operator/punctuation glyph.
    Punct(&'static str),
    Newline,
    Eof,
}

pub struct RawLexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    col: u32,
    pushback: Vec<(RawToken, Pos)>,
}

const THREE_CHAR_PUNCT: &[&str] = &["<->"];
const TWO_CHAR_PUNCT: &[&str] = &["<=", ">=", "<>", ":="];
const ONE_CHAR_PUNCT: &[char] = &[
    '=', '+', '-', '*', '/', '^', '(', ')', '[', ']', ',', ':', '<', '>', '~', '|', '!', '&', ';',
    '?',
];

impl<'a> RawLexer<'a> {
    pub fn new(src: &'a str) -> Self {
        RawLexer {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
            pushback: Vec::new(),
        }
    }

    pub fn pos(&self) -> Pos {
        Pos {
            line: self.line,
            col: self.col,
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    pub fn putback(&mut self, tok: RawToken, pos: Pos) {
        self.pushback.push((tok, pos));
    }

    /// Skip a `{ ... }` comment, honoring nesting (Vensim allows a brace
    /// comment to contain another brace pair verbatim).
    fn skip_brace_comment(&mut self) -> Result<(), Diag> {
        let mut depth = 1u32;
        let start = self.pos();
        while depth > 0 {
            match self.bump() {
                Some('{') => depth += 1,
                Some('}') => depth -= 1,
                Some(_) => {}
                None => {
                    return Err(Diag {
                        line: start.line,
                        column: start.col,
                        file: None,
                        code: ErrorCode::UnclosedComment,
                        message: "unterminated { } comment".to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn skip_trivial_whitespace(&mut self) {
        while let Some(c) = self.peek_char() {
            if c == ' ' || c == '\t' || c == '\r' {
                self.bump();
            } else {
                break;
            }
        }
    }

    /// Produce the next raw token, skipping brace comments entirely (they
    /// carry no lexical content of their own — callers that need comment
    /// text read it from the `~`-delimited comment field instead).
    pub fn next(&mut self) -> Result<(RawToken, Pos), Diag> {
        if let Some(pending) = self.pushback.pop() {
            return Ok(pending);
        }

        loop {
            self.skip_trivial_whitespace();
            let start = self.pos();
            let Some(c) = self.peek_char() else {
                return Ok((RawToken::Eof, start));
            };

            if c == '\n' {
                self.bump();
                return Ok((RawToken::Newline, start));
            }

            if c == '{' {
                self.bump();
                self.skip_brace_comment()?;
                continue;
            }

            if c == '"' {
                self.bump();
                let mut s = String::new();
                loop {
                    match self.bump() {
                        Some('"') => break,
                        Some('\\') => {
                            if let Some(escaped) = self.bump() {
                                s.push(escaped);
                            }
                        }
                        Some(other) => s.push(other),
                        None => {
                            return Err(Diag {
                                line: start.line,
                                column: start.col,
                                file: None,
                                code: ErrorCode::UnclosedQuotedIdent,
                                message: "unterminated quoted identifier".to_string(),
                            });
                        }
                    }
                }
                return Ok((RawToken::Quoted(s), start));
            }

            if c.is_ascii_digit() || (c == '.' && self.peek_is_digit_after_dot()) {
                let mut s = String::new();
                let mut seen_dot = false;
                let mut seen_exp = false;
                while let Some(c) = self.peek_char() {
                    if c.is_ascii_digit() {
                        s.push(c);
                        self.bump();
                    } else if c == '.' && !seen_dot && !seen_exp {
                        seen_dot = true;
                        s.push(c);
                        self.bump();
                    } else if (c == 'e' || c == 'E') && !seen_exp {
                        seen_exp = true;
                        s.push(c);
                        self.bump();
                        if matches!(self.peek_char(), Some('+') | Some('-')) {
                            s.push(self.bump().unwrap());
                        }
                    } else {
                        break;
                    }
                }
                return Ok((RawToken::Number(s), start));
            }

            if is_ident_start(c) {
                let mut s = String::new();
                while let Some(c) = self.peek_char() {
                    if is_ident_continue(c) {
                        s.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                return Ok((RawToken::Ident(s), start));
            }

            for three in THREE_CHAR_PUNCT {
                if self.src[self.pos..].starts_with(three) {
                    self.bump();
                    self.bump();
                    self.bump();
                    return Ok((RawToken::Punct(three), start));
                }
            }

            for two in TWO_CHAR_PUNCT {
                if self.src[self.pos..].starts_with(two) {
                    self.bump();
                    self.bump();
                    return Ok((RawToken::Punct(two), start));
                }
            }

            if ONE_CHAR_PUNCT.contains(&c) {
                self.bump();
                let s: &'static str = match c {
                    '=' => "=",
                    '+' => "+",
                    '-' => "-",
                    '*' => "*",
                    '/' => "/",
                    '^' => "^",
                    '(' => "(",
                    ')' => ")",
                    '[' => "[",
                    ']' => "]",
                    ',' => ",",
                    ':' => ":",
                    '<' => "<",
                    '>' => ">",
                    '~' => "~",
                    '|' => "|",
                    '!' => "!",
                    '&' => "&",
                    ';' => ";",
                    '?' => "?",
                    _ => unreachable!(),
                };
                return Ok((RawToken::Punct(s), start));
            }

            // unrecognized character: report and skip it so the lexer makes
            // forward progress (§7 error-recovery requirement).
            self.bump();
            return Err(Diag {
                line: start.line,
                column: start.col,
                file: None,
                code: ErrorCode::UnrecognizedToken,
                message: format!("unrecognized character '{c}'"),
            });
        }
    }

    /// The unconsumed suffix of the source buffer, used once the caller
    /// stops pulling equation tokens to hand the sketch/settings tail to
    /// [`crate::view::parse`].
    pub fn remaining(&self) -> &'a str {
        &self.src[self.pos..]
    }

    /// True when the unconsumed source, right after any leading spaces/tabs
    /// on the current line, starts a `***...` group delimiter (§4.2).
    pub fn at_group_delimiter(&self) -> bool {
        self.src[self.pos..]
            .trim_start_matches([' ', '\t'])
            .starts_with("***")
    }

    /// Consume a whole `***...` / name / `***...` group header, per §4.2:
    /// "consume the name on the following line up to whitespace or `}`;
    /// dots in the name map to hyphens". Also swallows the optional
    /// `~ comment` trailer and closing `|` the reference translator's group
    /// records carry, the same way an ordinary equation block ends.
    pub fn read_group(&mut self) -> Result<String, Diag> {
        self.skip_to_eol();
        self.skip_newline();
        self.skip_trivial_whitespace();

        let mut name = String::new();
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() || c == '}' {
                break;
            }
            name.push(if c == '.' { '-' } else { c });
            self.bump();
        }
        self.skip_to_eol();
        self.skip_newline();

        while self.peek_char().is_some() && !self.at_group_delimiter() {
            self.skip_to_eol();
            self.skip_newline();
        }
        self.skip_trivial_whitespace();
        while self.peek_char() == Some('*') {
            self.bump();
        }

        loop {
            match self.bump() {
                Some('|') | None => break,
                _ => {}
            }
        }

        Ok(name)
    }

    fn skip_to_eol(&mut self) {
        while let Some(c) = self.peek_char() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn skip_newline(&mut self) {
        if self.peek_char() == Some('\n') {
            self.bump();
        }
    }

    fn peek_is_digit_after_dot(&self) -> bool {
        self.src[self.pos..]
            .chars()
            .nth(1)
            .is_some_and(|c| c.is_ascii_digit())
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '\\' || c == '$' || c == '%' || c == '\''
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '\\' || c == '$' || c == '%' || c == '\'' || c == ' '
}

/// Which field of an `equation~units~comment|` block (or which bracketed
/// construct) the normalizer is currently inside.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Mode {
    TopLevel,
    InEquation,
    InUnits,
    InComment,
    /// Reading successive numeric rows of a `TABBED ARRAY` body.
    InTabbedArray,
}

/// A normalized token, with identifiers reclassified against the built-in
/// table and section boundaries made explicit.
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Ident(String),
    Number(f64),
    Quoted(String),
    Punct(&'static str),
    /// Separator between the equation/units/comment fields of one block.
    FieldSep,
    /// `|`, terminating one variable's equation block.
    BlockEnd,
    TabRow(Vec<f64>),
    /// Verbatim capture of a `GET XLS`/`GET DIRECT`/`GET VDF`/`GET DATA`
    /// opaque argument list, up through the next `~`.
    Opaque(String),
    /// A `***...` group marker, carrying its (dots-to-hyphens) name.
    Group(String),
    Eof,
}

pub struct TokenNormalizer<'a> {
    raw: RawLexer<'a>,
    mode: Mode,
    /// Count of `~` seen since the start of the current block; 0 = equation
    /// field, 1 = units field, 2 = comment field.
    field_index: u8,
    /// Start position of the most recently returned token, for diagnostics.
    last_pos: Pos,
}

impl<'a> TokenNormalizer<'a> {
    pub fn new(src: &'a str) -> Self {
        TokenNormalizer {
            raw: RawLexer::new(src),
            mode: Mode::TopLevel,
            field_index: 0,
            last_pos: Pos { line: 1, col: 1 },
        }
    }

    /// The source position of the most recently returned token, per
    /// `spec.md` §4.3's "on syntax error, emit `line:col in file`".
    pub fn pos(&self) -> Pos {
        self.last_pos
    }

    /// True once the raw stream reaches the `\\\---/// Sketch information`
    /// marker line that separates model equations from the view section.
    pub fn at_sketch_boundary(&mut self) -> Result<bool, Diag> {
        let rest = &self.raw.src[self.raw.pos..];
        Ok(rest.trim_start().starts_with("\\\\\\---///"))
    }

    /// The unconsumed suffix of the source buffer (the sketch section plus
    /// settings tail, once equation parsing has stopped at the boundary).
    pub fn remaining(&self) -> &'a str {
        self.raw.remaining()
    }

    /// Read the remainder of the current line verbatim, used for `GET *`
    /// directives whose argument grammar this translator does not interpret
    /// (§1 Non-goals: opaque external-data directives pass through as text).
    pub fn read_opaque_line(&mut self) -> String {
        let start = self.raw.pos;
        while let Some(c) = self.raw.peek_char() {
            if c == '\n' || c == '~' || c == '|' {
                break;
            }
            self.raw.bump();
        }
        self.raw.src[start..self.raw.pos].trim().to_string()
    }

    pub fn next(&mut self) -> Result<Token, Diag> {
        loop {
            if self.mode == Mode::TopLevel && self.raw.at_group_delimiter() {
                let pos = self.raw.pos();
                self.last_pos = pos;
                let name = self.raw.read_group()?;
                self.field_index = 0;
                self.mode = Mode::TopLevel;
                return Ok(Token::Group(name));
            }

            let (raw, pos) = self.raw.next()?;
            self.last_pos = pos;
            match raw {
                RawToken::Eof => return Ok(Token::Eof),
                RawToken::Newline => {
                    if self.mode == Mode::InTabbedArray {
                        continue;
                    }
                    continue;
                }
                RawToken::Punct("~") => {
                    self.field_index += 1;
                    self.mode = match self.field_index {
                        1 => Mode::InUnits,
                        2 => Mode::InComment,
                        _ => Mode::InComment,
                    };
                    return Ok(Token::FieldSep);
                }
                RawToken::Punct("|") => {
                    self.field_index = 0;
                    self.mode = Mode::TopLevel;
                    return Ok(Token::BlockEnd);
                }
                RawToken::Punct(p) => {
                    self.mode = Mode::InEquation;
                    return Ok(Token::Punct(p));
                }
                RawToken::Ident(name) => {
                    self.mode = Mode::InEquation;
                    return Ok(Token::Ident(name));
                }
                RawToken::Quoted(s) => {
                    self.mode = Mode::InEquation;
                    return Ok(Token::Quoted(s));
                }
                RawToken::Number(text) => {
                    self.mode = Mode::InEquation;
                    let value: f64 = text.parse().unwrap_or(f64::NAN);
                    return Ok(Token::Number(value));
                }
            }
        }
    }

    /// Read one comma/tab/space separated numeric row, for a `TABBED ARRAY`
    /// body, terminating at the next newline.
    pub fn read_tabbed_row(&mut self) -> Result<Token, Diag> {
        self.mode = Mode::InTabbedArray;
        let mut values = Vec::new();
        loop {
            self.raw.skip_trivial_whitespace();
            match self.raw.peek_char() {
                Some('\n') | None => break,
                Some(',') => {
                    self.raw.bump();
                }
                Some(_) => {
                    let (tok, pos) = self.raw.next()?;
                    match tok {
                        RawToken::Number(text) => {
                            values.push(text.parse().unwrap_or(f64::NAN));
                        }
                        RawToken::Newline => {
                            self.raw.putback(RawToken::Newline, pos);
                            break;
                        }
                        other => {
                            self.raw.putback(other, pos);
                            break;
                        }
                    }
                }
            }
        }
        Ok(Token::TabRow(values))
    }

    /// Read a whole `TABBED ARRAY` body: successive tab/space/comma
    /// separated numeric rows, newline-delimited, stopping at the closing
    /// `)` the caller still needs to consume.
    pub fn read_number_table(&mut self) -> Result<Vec<f64>, Diag> {
        let mut values = Vec::new();
        loop {
            let Token::TabRow(row) = self.read_tabbed_row()? else {
                unreachable!("read_tabbed_row always returns TabRow")
            };
            values.extend(row);
            self.raw.skip_trivial_whitespace();
            match self.raw.peek_char() {
                Some('\n') => {
                    self.raw.bump();
                }
                _ => break,
            }
            self.raw.skip_trivial_whitespace();
            if matches!(self.raw.peek_char(), Some(')') | None) {
                break;
            }
        }
        self.mode = Mode::InEquation;
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(src: &str) -> Vec<Token> {
        let mut n = TokenNormalizer::new(src);
        let mut out = Vec::new();
        loop {
            let tok = n.next().unwrap();
            let done = tok == Token::Eof;
            out.push(tok);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn splits_equation_units_comment_fields() {
        let toks = lex_all("Births=births rate*Population~Widgets/Year~a comment|");
        assert!(toks.contains(&Token::FieldSep));
        assert!(toks.contains(&Token::BlockEnd));
    }

    #[test]
    fn skips_brace_comments_anywhere() {
        let toks = lex_all("X=1{this is a comment with {nested} braces}+2~~|");
        let numbers: Vec<f64> = toks
            .iter()
            .filter_map(|t| match t {
                Token::Number(n) => Some(*n),
                _ => None,
            })
            .collect();
        assert_eq!(numbers, vec![1.0, 2.0]);
    }

    #[test]
    fn reads_quoted_identifiers() {
        let toks = lex_all("\"My Var\"=1~~|");
        assert!(toks.contains(&Token::Quoted("My Var".to_string())));
    }

    #[test]
    fn recognizes_equivalence_operator() {
        let toks = lex_all("A<->B~~|");
        assert!(toks.contains(&Token::Punct("<->")));
    }

    #[test]
    fn tabbed_row_reads_until_newline() {
        let mut n = TokenNormalizer::new("1,2,3\n4,5,6\n");
        let row = n.read_tabbed_row().unwrap();
        assert_eq!(row, Token::TabRow(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn unrecognized_character_reports_unrecognized_token() {
        let mut lexer = RawLexer::new("A#B");
        lexer.next().unwrap();
        let err = lexer.next().unwrap_err();
        assert_eq!(err.code, ErrorCode::UnrecognizedToken);
    }

    #[test]
    fn pos_tracks_line_and_column_across_tokens() {
        let mut n = TokenNormalizer::new("A=1~~|\nB=2~~|");
        n.next().unwrap(); // A
        assert_eq!(n.pos().line, 1);
        while n.next().unwrap() != Token::BlockEnd {}
        let tok = n.next().unwrap(); // B, on line 2
        assert_eq!(tok, Token::Ident("B".to_string()));
        assert_eq!(n.pos().line, 2);
        assert_eq!(n.pos().col, 1);
    }

    #[test]
    fn brackets_tokenize_as_punct_for_subscripts() {
        let toks = lex_all("Sales[East]=1~~|");
        assert!(toks.contains(&Token::Punct("[")));
        assert!(toks.contains(&Token::Punct("]")));
    }

    #[test]
    fn group_header_tokenizes_as_a_single_group_token_with_dots_mapped_to_hyphens() {
        let src = "***\n\t.Control\n***~\n\t\tSimulation Control Parameters\n\t|\nX=1~~|\n";
        let mut n = TokenNormalizer::new(src);
        assert_eq!(n.next().unwrap(), Token::Group("-Control".to_string()));
        assert_eq!(n.next().unwrap(), Token::Ident("X".to_string()));
    }
}
