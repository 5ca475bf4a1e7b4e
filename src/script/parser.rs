//! Script parser
//!
//! Recursive descent over the tokens of [`super::lexer`]. Statements are
//! separated by `;` or by a line break.

use super::ast::*;
use super::lexer::{Lexer, Token, TokenKind};
use crate::error::{ParseError, Result};

pub struct Parser {
    source: Vec<char>,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(input: &str) -> Result<Self> {
        let tokens = Lexer::tokenize(input)?;
        Ok(Self {
            source: input.chars().collect(),
            tokens,
            pos: 0,
        })
    }

    /// Parse a whole program.
    pub fn parse_program(input: &str) -> Result<Program> {
        let mut parser = Self::new(input)?;
        let mut statements = Vec::new();

        loop {
            while parser.match_token(&TokenKind::Semicolon) {}
            if parser.check(&TokenKind::EOF) {
                break;
            }
            statements.push(parser.parse_expression()?);

            if parser.match_token(&TokenKind::Semicolon) || parser.check(&TokenKind::EOF) {
                continue;
            }
            if !parser.newline_before_current() {
                return Err(parser.unexpected("';' or end of input"));
            }
        }

        Ok(Program { statements })
    }

    /// Parse the input as a single expression.
    pub fn parse(input: &str) -> Result<Expr> {
        let mut parser = Self::new(input)?;
        let expr = parser.parse_expression()?;
        if !parser.check(&TokenKind::EOF) {
            return Err(parser.unexpected("end of input"));
        }
        Ok(expr)
    }

    fn parse_expression(&mut self) -> Result<Expr> {
        self.parse_unary()
    }

    /// Parse unary expression: -x, +x, !x
    fn parse_unary(&mut self) -> Result<Expr> {
        let start = self.current_pos();

        let operator = if self.match_token(&TokenKind::Minus) {
            Some(UnaryOperator::Minus)
        } else if self.match_token(&TokenKind::Plus) {
            Some(UnaryOperator::Plus)
        } else if self.match_token(&TokenKind::Bang) {
            Some(UnaryOperator::Not)
        } else {
            None
        };

        match operator {
            Some(operator) => {
                let argument = self.parse_unary()?;
                let end = self.previous_pos();
                Ok(Expr::Unary(Box::new(UnaryExpr::new(operator, argument, start..end))))
            }
            None => self.parse_member_or_call(),
        }
    }

    /// Parse member expression, call expression, or new expression
    fn parse_member_or_call(&mut self) -> Result<Expr> {
        let start = self.current_pos();

        let mut expr = if self.check_ident("new") {
            self.advance();
            self.parse_new_expression(start)?
        } else {
            self.parse_primary()?
        };

        loop {
            if self.match_token(&TokenKind::Dot) {
                let prop_name = self.expect_identifier("property name after '.'")?;
                let end = self.previous_pos();
                expr = Expr::Member(Box::new(MemberExpr::new(
                    expr,
                    MemberProperty::Ident(prop_name),
                    start..end,
                )));
            } else if self.match_token(&TokenKind::LBracket) {
                let property = self.parse_expression()?;
                self.expect_token(&TokenKind::RBracket, "']' after computed member")?;
                let end = self.previous_pos();
                expr = Expr::Member(Box::new(MemberExpr::new(
                    expr,
                    MemberProperty::Computed(property),
                    start..end,
                )));
            } else if self.match_token(&TokenKind::LParen) {
                let arguments = self.parse_arguments()?;
                self.expect_token(&TokenKind::RParen, "')' after arguments")?;
                let end = self.previous_pos();
                expr = Expr::Call(Box::new(CallExpr::new(expr, arguments, start..end)));
            } else {
                break;
            }
        }

        Ok(expr)
    }

    /// Parse new expression: new Ctor(args)
    fn parse_new_expression(&mut self, start: usize) -> Result<Expr> {
        let callee = self.parse_primary()?;

        let arguments = if self.match_token(&TokenKind::LParen) {
            let args = self.parse_arguments()?;
            self.expect_token(&TokenKind::RParen, "')' after new arguments")?;
            args
        } else {
            vec![]
        };

        let end = self.previous_pos();
        Ok(Expr::New(Box::new(NewExpr::new(callee, arguments, start..end))))
    }

    /// Parse primary expression (literals, identifiers, objects, arrays)
    fn parse_primary(&mut self) -> Result<Expr> {
        let start = self.current_pos();
        let Some(token) = self.current() else {
            return Err(ParseError::SyntaxError("Unexpected end of input".to_string()).into());
        };

        match token.kind.clone() {
            TokenKind::String(s) => {
                self.advance();
                Ok(Expr::String(s))
            }
            TokenKind::Number(n) => {
                let value = n
                    .parse::<f64>()
                    .map_err(|_| ParseError::SyntaxError(format!("Invalid number: {}", n)))?;
                self.advance();
                Ok(Expr::Number(value))
            }
            TokenKind::Regex { pattern, flags } => {
                self.advance();
                Ok(Expr::Regex { pattern, flags })
            }
            TokenKind::Ident(name) => {
                self.advance();
                match name.as_str() {
                    "true" => Ok(Expr::Boolean(true)),
                    "false" => Ok(Expr::Boolean(false)),
                    "null" | "undefined" => Ok(Expr::Null),
                    "Infinity" => Ok(Expr::Number(f64::INFINITY)),
                    "NaN" => Ok(Expr::Number(f64::NAN)),
                    _ => Ok(Expr::Ident(name)),
                }
            }
            TokenKind::LBrace => self.parse_object(start),
            TokenKind::LBracket => self.parse_array(start),
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect_token(&TokenKind::RParen, "')' after expression")?;
                Ok(expr)
            }
            _ => Err(self.unexpected("an expression")),
        }
    }

    /// Parse object literal: { key: value, ... }
    fn parse_object(&mut self, start: usize) -> Result<Expr> {
        self.expect_token(&TokenKind::LBrace, "'{'")?;

        let mut properties = Vec::new();

        while !self.check(&TokenKind::RBrace) {
            let prop_start = self.current_pos();
            let key = self.parse_property_key()?;
            self.expect_token(&TokenKind::Colon, "':' after property key")?;
            let value = self.parse_expression()?;
            let prop_end = self.previous_pos();
            properties.push(Property::new(key, value, prop_start..prop_end));

            // Trailing comma allowed
            if !self.match_token(&TokenKind::Comma) && !self.check(&TokenKind::RBrace) {
                return Err(self.unexpected("',' or '}' after property"));
            }
        }

        self.expect_token(&TokenKind::RBrace, "'}'")?;
        let end = self.previous_pos();

        Ok(Expr::Object(ObjectExpr::new(properties, start..end)))
    }

    /// Parse property key (identifier, string, or number)
    fn parse_property_key(&mut self) -> Result<PropertyKey> {
        let key = match self.current().map(|t| &t.kind) {
            Some(TokenKind::Ident(name)) => PropertyKey::Ident(name.clone()),
            Some(TokenKind::String(s)) => PropertyKey::String(s.clone()),
            Some(TokenKind::Number(n)) => PropertyKey::Number(n.clone()),
            _ => return Err(self.unexpected("property key")),
        };
        self.advance();
        Ok(key)
    }

    /// Parse array literal: [elem1, elem2, ...]
    fn parse_array(&mut self, start: usize) -> Result<Expr> {
        self.expect_token(&TokenKind::LBracket, "'['")?;

        let mut elements = Vec::new();

        while !self.check(&TokenKind::RBracket) {
            elements.push(self.parse_expression()?);
            if !self.match_token(&TokenKind::Comma) && !self.check(&TokenKind::RBracket) {
                return Err(self.unexpected("',' or ']' after array element"));
            }
        }

        self.expect_token(&TokenKind::RBracket, "']'")?;
        let end = self.previous_pos();

        Ok(Expr::Array(ArrayExpr::new(elements, start..end)))
    }

    /// Parse function arguments: arg1, arg2, ...
    fn parse_arguments(&mut self) -> Result<Vec<Expr>> {
        let mut arguments = Vec::new();

        while !self.check(&TokenKind::RParen) {
            arguments.push(self.parse_expression()?);
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }

        Ok(arguments)
    }

    // Token manipulation methods

    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.current()
            .is_some_and(|t| std::mem::discriminant(&t.kind) == std::mem::discriminant(kind))
    }

    fn check_ident(&self, name: &str) -> bool {
        matches!(self.current(), Some(Token { kind: TokenKind::Ident(n), .. }) if n == name)
    }

    fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn expect_token(&mut self, kind: &TokenKind, expected: &str) -> Result<()> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn expect_identifier(&mut self, expected: &str) -> Result<String> {
        match self.current().map(|t| &t.kind) {
            Some(TokenKind::Ident(name)) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn unexpected(&self, expected: &str) -> crate::error::ShellError {
        let found = self
            .current()
            .map(|t| t.kind.describe())
            .unwrap_or_else(|| "end of input".to_string());
        ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found,
        }
        .into()
    }

    /// Whether a line break separates the previous token from the current one.
    fn newline_before_current(&self) -> bool {
        let from = self.previous_pos();
        let to = self.current_pos();
        self.source
            .get(from..to)
            .is_some_and(|gap| gap.contains(&'\n'))
    }

    fn current_pos(&self) -> usize {
        if let Some(token) = self.current() {
            token.span.start
        } else if let Some(last) = self.tokens.last() {
            last.span.end
        } else {
            0
        }
    }

    fn previous_pos(&self) -> usize {
        if self.pos > 0 {
            if let Some(token) = self.tokens.get(self.pos - 1) {
                return token.span.end;
            }
        }
        0
    }
}
