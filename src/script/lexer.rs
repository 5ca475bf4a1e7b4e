//! Shell script lexer
//!
//! Tokenizes the shell's expression subset: member chains, calls, object
//! and array literals, strings, numbers, regex literals and `;`.
//!
//! The language has no division operator, so a `/` always opens a regex
//! literal unless it starts a `//` line comment.

use std::ops::Range;

use crate::error::{ParseError, Result};

/// Token types
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Identifier or keyword
    Ident(String),
    Dot,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Semicolon,
    Minus,
    Plus,
    Bang,
    /// String literal, escapes resolved
    String(String),
    /// Number literal, as written
    Number(String),
    /// Regex literal: pattern and flags
    Regex { pattern: String, flags: String },
    EOF,
}

impl TokenKind {
    /// Short description used in syntax errors.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("'{name}'"),
            TokenKind::String(s) => format!("string \"{s}\""),
            TokenKind::Number(n) => format!("number {n}"),
            TokenKind::Regex { pattern, flags } => format!("regex /{pattern}/{flags}"),
            TokenKind::EOF => "end of input".to_string(),
            TokenKind::Dot => "'.'".to_string(),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::LBrace => "'{'".to_string(),
            TokenKind::RBrace => "'}'".to_string(),
            TokenKind::LBracket => "'['".to_string(),
            TokenKind::RBracket => "']'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::Colon => "':'".to_string(),
            TokenKind::Semicolon => "';'".to_string(),
            TokenKind::Minus => "'-'".to_string(),
            TokenKind::Plus => "'+'".to_string(),
            TokenKind::Bang => "'!'".to_string(),
        }
    }
}

/// Token with position information
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Range<usize>,
}

impl Token {
    pub fn new(kind: TokenKind, span: Range<usize>) -> Self {
        Self { kind, span }
    }
}

pub struct Lexer {
    input: Vec<char>,
    pos: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
        }
    }

    /// Tokenize the entire input. The last token is always `EOF`.
    pub fn tokenize(input: &str) -> Result<Vec<Token>> {
        let mut lexer = Self::new(input);
        let mut tokens = Vec::new();

        loop {
            let token = lexer.next_token()?;
            let is_eof = matches!(token.kind, TokenKind::EOF);
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Token> {
        self.skip_trivia();

        let start = self.pos;

        if self.is_at_end() {
            return Ok(Token::new(TokenKind::EOF, start..start));
        }

        let ch = self.current_char();
        let single = match ch {
            '.' => Some(TokenKind::Dot),
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            '{' => Some(TokenKind::LBrace),
            '}' => Some(TokenKind::RBrace),
            '[' => Some(TokenKind::LBracket),
            ']' => Some(TokenKind::RBracket),
            ',' => Some(TokenKind::Comma),
            ':' => Some(TokenKind::Colon),
            ';' => Some(TokenKind::Semicolon),
            '-' => Some(TokenKind::Minus),
            '+' => Some(TokenKind::Plus),
            '!' => Some(TokenKind::Bang),
            _ => None,
        };
        if let Some(kind) = single {
            self.advance();
            return Ok(Token::new(kind, start..self.pos));
        }

        match ch {
            '\'' | '"' => self.scan_string(ch, start),
            '/' => self.scan_regex(start),
            '0'..='9' => Ok(self.scan_number(start)),
            c if c.is_alphabetic() || c == '_' || c == '$' => Ok(self.scan_identifier(start)),
            _ => Err(ParseError::UnexpectedChar { ch, position: start }.into()),
        }
    }

    fn scan_string(&mut self, quote: char, start: usize) -> Result<Token> {
        self.advance(); // opening quote

        let mut value = String::new();

        loop {
            if self.is_at_end() {
                return Err(ParseError::UnterminatedString(start).into());
            }
            let ch = self.current_char();
            if ch == quote {
                self.advance();
                break;
            }
            if ch == '\\' {
                self.advance();
                if self.is_at_end() {
                    return Err(ParseError::UnterminatedString(start).into());
                }
                match self.current_char() {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    '0' => value.push('\0'),
                    'u' => value.push(self.scan_unicode_escape()),
                    other => value.push(other),
                }
            } else {
                value.push(ch);
            }
            self.advance();
        }

        Ok(Token::new(TokenKind::String(value), start..self.pos))
    }

    /// `\uXXXX`; leaves the position on the last hex digit. Malformed
    /// escapes yield a literal `u`.
    fn scan_unicode_escape(&mut self) -> char {
        let digits: String = self.input.iter().skip(self.pos + 1).take(4).collect();
        if digits.len() == 4 {
            if let Some(c) = u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32) {
                self.pos += 4;
                return c;
            }
        }
        'u'
    }

    fn scan_regex(&mut self, start: usize) -> Result<Token> {
        self.advance(); // opening slash

        let mut pattern = String::new();
        let mut in_class = false;

        loop {
            if self.is_at_end() || self.current_char() == '\n' {
                return Err(ParseError::UnterminatedRegex(start).into());
            }
            let ch = self.current_char();
            match ch {
                '\\' => {
                    pattern.push(ch);
                    self.advance();
                    if self.is_at_end() {
                        return Err(ParseError::UnterminatedRegex(start).into());
                    }
                    pattern.push(self.current_char());
                }
                '[' => {
                    in_class = true;
                    pattern.push(ch);
                }
                ']' => {
                    in_class = false;
                    pattern.push(ch);
                }
                '/' if !in_class => {
                    self.advance();
                    break;
                }
                _ => pattern.push(ch),
            }
            self.advance();
        }

        let mut flags = String::new();
        while !self.is_at_end() && self.current_char().is_ascii_alphabetic() {
            flags.push(self.current_char());
            self.advance();
        }

        Ok(Token::new(TokenKind::Regex { pattern, flags }, start..self.pos))
    }

    /// Integer, decimal or exponent form.
    fn scan_number(&mut self, start: usize) -> Token {
        let mut value = String::new();

        while !self.is_at_end() && self.current_char().is_ascii_digit() {
            value.push(self.current_char());
            self.advance();
        }

        if self.current_char() == '.' && self.peek_char(1).is_ascii_digit() {
            value.push('.');
            self.advance();
            while !self.is_at_end() && self.current_char().is_ascii_digit() {
                value.push(self.current_char());
                self.advance();
            }
        }

        if matches!(self.current_char(), 'e' | 'E') {
            let signed = matches!(self.peek_char(1), '+' | '-');
            let digit_at = if signed { 2 } else { 1 };
            if self.peek_char(digit_at).is_ascii_digit() {
                for _ in 0..digit_at {
                    value.push(self.current_char());
                    self.advance();
                }
                while !self.is_at_end() && self.current_char().is_ascii_digit() {
                    value.push(self.current_char());
                    self.advance();
                }
            }
        }

        Token::new(TokenKind::Number(value), start..self.pos)
    }

    fn scan_identifier(&mut self, start: usize) -> Token {
        let mut value = String::new();

        while !self.is_at_end() {
            let ch = self.current_char();
            if ch.is_alphanumeric() || ch == '_' || ch == '$' {
                value.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        Token::new(TokenKind::Ident(value), start..self.pos)
    }

    /// Whitespace and `//` comments.
    fn skip_trivia(&mut self) {
        while !self.is_at_end() {
            let ch = self.current_char();
            if ch.is_whitespace() {
                self.advance();
            } else if ch == '/' && self.peek_char(1) == '/' {
                while !self.is_at_end() && self.current_char() != '\n' {
                    self.advance();
                }
            } else {
                break;
            }
        }
    }

    fn current_char(&self) -> char {
        self.peek_char(0)
    }

    fn peek_char(&self, offset: usize) -> char {
        self.input.get(self.pos + offset).copied().unwrap_or('\0')
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            self.pos += 1;
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.input.len()
    }
}
