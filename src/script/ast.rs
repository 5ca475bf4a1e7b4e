//! Script AST
//!
//! A program is a list of `;`-separated expression statements. The value of
//! a program is the value of its last statement.

use std::ops::Range;

/// Span information for source locations
pub type Span = Range<usize>;

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Object literal: { key: value, ... }
    Object(ObjectExpr),
    /// Array literal: [1, 2, 3]
    Array(ArrayExpr),
    String(String),
    Number(f64),
    Boolean(bool),
    /// `null` or `undefined`
    Null,
    /// Regex literal: /pattern/flags
    Regex { pattern: String, flags: String },
    Ident(String),
    /// obj.prop or obj[expr]
    Member(Box<MemberExpr>),
    /// fn(args)
    Call(Box<CallExpr>),
    /// new Ctor(args)
    New(Box<NewExpr>),
    /// -x, +x, !x
    Unary(Box<UnaryExpr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectExpr {
    pub properties: Vec<Property>,
    pub span: Span,
}

impl ObjectExpr {
    pub fn new(properties: Vec<Property>, span: Span) -> Self {
        Self { properties, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub key: PropertyKey,
    pub value: Expr,
    pub span: Span,
}

impl Property {
    pub fn new(key: PropertyKey, value: Expr, span: Span) -> Self {
        Self { key, value, span }
    }
}

/// Property key (identifier, string, or number)
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKey {
    Ident(String),
    String(String),
    Number(String),
}

impl PropertyKey {
    pub fn as_string(&self) -> String {
        match self {
            PropertyKey::Ident(s) | PropertyKey::String(s) | PropertyKey::Number(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayExpr {
    pub elements: Vec<Expr>,
    pub span: Span,
}

impl ArrayExpr {
    pub fn new(elements: Vec<Expr>, span: Span) -> Self {
        Self { elements, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberExpr {
    pub object: Box<Expr>,
    pub property: MemberProperty,
    pub span: Span,
}

impl MemberExpr {
    pub fn new(object: Expr, property: MemberProperty, span: Span) -> Self {
        Self {
            object: Box::new(object),
            property,
            span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemberProperty {
    /// Static: obj.prop
    Ident(String),
    /// Computed: obj[expr]
    Computed(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallExpr {
    pub callee: Box<Expr>,
    pub arguments: Vec<Expr>,
    pub span: Span,
}

impl CallExpr {
    pub fn new(callee: Expr, arguments: Vec<Expr>, span: Span) -> Self {
        Self {
            callee: Box::new(callee),
            arguments,
            span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewExpr {
    pub callee: Box<Expr>,
    pub arguments: Vec<Expr>,
    pub span: Span,
}

impl NewExpr {
    pub fn new(callee: Expr, arguments: Vec<Expr>, span: Span) -> Self {
        Self {
            callee: Box::new(callee),
            arguments,
            span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnaryExpr {
    pub operator: UnaryOperator,
    pub argument: Box<Expr>,
    pub span: Span,
}

impl UnaryExpr {
    pub fn new(operator: UnaryOperator, argument: Expr, span: Span) -> Self {
        Self {
            operator,
            argument: Box::new(argument),
            span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Minus,
    Plus,
    Not,
}
