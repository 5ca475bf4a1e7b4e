//! Expression evaluator
//!
//! Walks the AST against a [`Scope`]. Member access and calls on proxies
//! are forwarded to the proxy; plain values support field lookup and array
//! indexing only.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use mongodb::bson::{Bson, DateTime, Document, oid::ObjectId};
use tracing::debug;

use super::ast::{Expr, MemberProperty, Program, UnaryOperator};
use super::parser::Parser;
use crate::bridge::{OpaqueValue, RegexLiteral, Scope, ShellValue};
use crate::error::{Result, ScriptError};
use crate::translator::convert;

/// Evaluates script text against a scope of proxies.
#[async_trait]
pub trait ScriptEvaluator: Send + Sync {
    async fn evaluate(&self, source: &str, scope: &Scope) -> Result<ShellValue>;
}

/// Global functions available without a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Builtin {
    ObjectId,
    Date,
    NumberInt,
    NumberLong,
    NumberDecimal,
    DbRef,
    Print,
    PrintJson,
}

impl Builtin {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "ObjectId" => Some(Self::ObjectId),
            "ISODate" | "Date" => Some(Self::Date),
            "NumberInt" => Some(Self::NumberInt),
            "NumberLong" => Some(Self::NumberLong),
            "NumberDecimal" => Some(Self::NumberDecimal),
            "DBRef" => Some(Self::DbRef),
            "print" => Some(Self::Print),
            "printjson" => Some(Self::PrintJson),
            _ => None,
        }
    }
}

/// Evaluator for the shell's expression language.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExpressionEvaluator;

impl ExpressionEvaluator {
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, program: &Program, scope: &Scope) -> Result<ShellValue> {
        let mut last = ShellValue::Null;
        for statement in &program.statements {
            last = self.eval(statement, scope).await?;
        }
        Ok(last)
    }

    fn eval<'a>(&'a self, expr: &'a Expr, scope: &'a Scope) -> BoxFuture<'a, Result<ShellValue>> {
        async move {
            match expr {
                Expr::Null => Ok(ShellValue::Null),
                Expr::Boolean(b) => Ok(ShellValue::Bool(*b)),
                Expr::Number(n) => Ok(ShellValue::Number(*n)),
                Expr::String(s) => Ok(ShellValue::String(s.clone())),
                Expr::Regex { pattern, flags } => {
                    Ok(ShellValue::Regex(RegexLiteral::new(pattern.clone(), flags.clone())))
                }
                Expr::Object(obj) => {
                    let mut entries = Vec::with_capacity(obj.properties.len());
                    for property in &obj.properties {
                        let value = self.eval(&property.value, scope).await?;
                        entries.push((property.key.as_string(), value));
                    }
                    Ok(ShellValue::Object(entries))
                }
                Expr::Array(arr) => Ok(ShellValue::Array(self.eval_all(&arr.elements, scope).await?)),
                Expr::Ident(name) => resolve(name, scope),
                Expr::Member(member) => {
                    let object = self.eval(&member.object, scope).await?;
                    let name = self.property_name(&member.property, scope).await?;
                    member_of(&object, &name)
                }
                Expr::Call(call) => {
                    let args = self.eval_all(&call.arguments, scope).await?;
                    self.call(&call.callee, args, scope).await
                }
                Expr::New(new) => {
                    let args = self.eval_all(&new.arguments, scope).await?;
                    match new.callee.as_ref() {
                        Expr::Ident(name) => match Builtin::from_name(name) {
                            Some(builtin) => call_builtin(builtin, &args, scope),
                            None => Err(ScriptError::TypeError(format!("{name} is not a constructor")).into()),
                        },
                        _ => Err(ScriptError::TypeError("expression is not a constructor".into()).into()),
                    }
                }
                Expr::Unary(unary) => {
                    let value = self.eval(&unary.argument, scope).await?;
                    Ok(match unary.operator {
                        UnaryOperator::Not => ShellValue::Bool(!value.truthy()),
                        UnaryOperator::Plus => ShellValue::Number(to_number(&value)),
                        UnaryOperator::Minus => ShellValue::Number(-to_number(&value)),
                    })
                }
            }
        }
        .boxed()
    }

    async fn eval_all(&self, exprs: &[Expr], scope: &Scope) -> Result<Vec<ShellValue>> {
        let mut values = Vec::with_capacity(exprs.len());
        for expr in exprs {
            values.push(self.eval(expr, scope).await?);
        }
        Ok(values)
    }

    async fn property_name(&self, property: &MemberProperty, scope: &Scope) -> Result<String> {
        match property {
            MemberProperty::Ident(name) => Ok(name.clone()),
            MemberProperty::Computed(expr) => Ok(self.eval(expr, scope).await?.to_string()),
        }
    }

    async fn call(&self, callee: &Expr, args: Vec<ShellValue>, scope: &Scope) -> Result<ShellValue> {
        match callee {
            Expr::Member(member) => {
                let object = self.eval(&member.object, scope).await?;
                let name = self.property_name(&member.property, scope).await?;
                match &object {
                    ShellValue::Proxy(proxy) => proxy.invoke(&name, &args).await,
                    ShellValue::Null => Err(ScriptError::TypeError(format!(
                        "Cannot read properties of null (reading '{name}')"
                    ))
                    .into()),
                    other => match other.field(&name) {
                        Some(ShellValue::Method(method)) => method.receiver.invoke(&method.name, &args).await,
                        _ => Err(ScriptError::TypeError(format!(
                            "{}.{} is not a function",
                            other.type_name(),
                            name
                        ))
                        .into()),
                    },
                }
            }
            Expr::Ident(name) if scope.get(name).is_none() => match Builtin::from_name(name) {
                Some(builtin) => call_builtin(builtin, &args, scope),
                None => Err(ScriptError::ReferenceError(name.clone()).into()),
            },
            other => match self.eval(other, scope).await? {
                ShellValue::Method(method) => method.receiver.invoke(&method.name, &args).await,
                value => Err(ScriptError::TypeError(format!("{value} is not a function")).into()),
            },
        }
    }
}

#[async_trait]
impl ScriptEvaluator for ExpressionEvaluator {
    async fn evaluate(&self, source: &str, scope: &Scope) -> Result<ShellValue> {
        let program = Parser::parse_program(source)?;
        debug!("evaluating {} statement(s)", program.statements.len());
        self.run(&program, scope).await
    }
}

fn resolve(name: &str, scope: &Scope) -> Result<ShellValue> {
    if let Some(value) = scope.get(name) {
        return Ok(value.clone());
    }
    match Builtin::from_name(name) {
        Some(_) => Ok(ShellValue::Opaque(OpaqueValue {
            type_name: "function".to_string(),
            text: format!("[Function: {name}]"),
            wrapped: None,
        })),
        None => Err(ScriptError::ReferenceError(name.to_string()).into()),
    }
}

fn member_of(object: &ShellValue, name: &str) -> Result<ShellValue> {
    match object {
        ShellValue::Proxy(proxy) => Ok(proxy.get_member(name)),
        ShellValue::Null => Err(ScriptError::TypeError(format!(
            "Cannot read properties of null (reading '{name}')"
        ))
        .into()),
        other => {
            let indexed = name.parse::<usize>().ok().and_then(|idx| other.index(idx));
            Ok(indexed.or_else(|| other.field(name)).unwrap_or(ShellValue::Null))
        }
    }
}

fn to_number(value: &ShellValue) -> f64 {
    match value {
        ShellValue::Null => 0.0,
        ShellValue::Bool(b) => f64::from(u8::from(*b)),
        ShellValue::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        other => other.as_f64().unwrap_or(f64::NAN),
    }
}

fn call_builtin(builtin: Builtin, args: &[ShellValue], scope: &Scope) -> Result<ShellValue> {
    let first = args.first();
    match builtin {
        Builtin::ObjectId => match first.and_then(ShellValue::as_str) {
            Some(hex) => ObjectId::parse_str(hex)
                .map(|oid| ShellValue::Canonical(Bson::ObjectId(oid)))
                .map_err(|_| ScriptError::TypeError(format!("invalid ObjectId: {hex}")).into()),
            None => Ok(ShellValue::Canonical(Bson::ObjectId(ObjectId::new()))),
        },
        Builtin::Date => {
            let date = match first {
                None => DateTime::now(),
                Some(ShellValue::String(text)) => parse_date(text)?,
                Some(other) => match other.as_f64() {
                    Some(millis) => DateTime::from_millis(millis as i64),
                    None => return Err(ScriptError::TypeError(format!("invalid date: {other}")).into()),
                },
            };
            Ok(ShellValue::Canonical(Bson::DateTime(date)))
        }
        Builtin::NumberInt => {
            let n = first.map(to_number).unwrap_or(0.0);
            Ok(ShellValue::Canonical(Bson::Int32(n as i32)))
        }
        Builtin::NumberLong => {
            let n = match first {
                Some(ShellValue::String(s)) => s
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| ScriptError::TypeError(format!("invalid NumberLong: {s}")))?,
                Some(other) => to_number(other) as i64,
                None => 0,
            };
            Ok(ShellValue::Canonical(Bson::Int64(n)))
        }
        Builtin::NumberDecimal => {
            let text = first.map(|v| v.to_string()).unwrap_or_else(|| "0".to_string());
            Ok(ShellValue::Opaque(OpaqueValue {
                type_name: "NumberDecimal".to_string(),
                text,
                wrapped: None,
            }))
        }
        Builtin::DbRef => {
            let (Some(collection), Some(id)) = (first.and_then(ShellValue::as_str), args.get(1)) else {
                return Err(ScriptError::TypeError("DBRef requires a collection and an id".into()).into());
            };
            let mut reference = Document::new();
            reference.insert("$ref", collection);
            reference.insert("$id", convert(id));
            Ok(ShellValue::from(reference))
        }
        Builtin::Print => {
            let line: Vec<String> = args.iter().map(|v| v.to_string()).collect();
            scope.print(line.join(" "));
            Ok(ShellValue::Null)
        }
        Builtin::PrintJson => {
            let value = first.map(convert).unwrap_or(Bson::Null);
            let json = serde_json::to_string_pretty(&value.into_relaxed_extjson())
                .map_err(|e| ScriptError::RuntimeError(e.to_string()))?;
            scope.print(json);
            Ok(ShellValue::Null)
        }
    }
}

/// ISO-8601 forms accepted by `ISODate`: full RFC 3339, a date alone, or a
/// date-time without zone (taken as UTC).
fn parse_date(text: &str) -> Result<DateTime> {
    let candidates = [
        text.to_string(),
        format!("{text}T00:00:00Z"),
        format!("{text}Z"),
    ];
    candidates
        .iter()
        .find_map(|c| DateTime::parse_rfc3339_str(c).ok())
        .ok_or_else(|| ScriptError::TypeError(format!("invalid date: {text}")).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn eval(source: &str) -> Result<ShellValue> {
        ExpressionEvaluator::new().evaluate(source, &Scope::new()).await
    }

    #[tokio::test]
    async fn test_literals_and_unary() {
        assert!(matches!(eval("-5").await.unwrap(), ShellValue::Number(n) if n == -5.0));
        assert!(matches!(eval("!0").await.unwrap(), ShellValue::Bool(true)));
        let obj = eval("{a: [1, 'x'], 'b': null}").await.unwrap();
        assert_eq!(obj.field("a").and_then(|a| a.field("length")).and_then(|v| v.as_f64()), Some(2.0));
        assert!(obj.field("b").is_some_and(|v| v.is_null()));
    }

    #[tokio::test]
    async fn test_last_statement_wins() {
        assert_eq!(eval("1; 2; 'three'").await.unwrap().as_str(), Some("three"));
        assert!(eval("").await.unwrap().is_null());
    }

    #[tokio::test]
    async fn test_member_on_plain_values() {
        assert!(matches!(eval("[10, 20][1]").await.unwrap(), ShellValue::Number(n) if n == 20.0));
        assert!(matches!(eval("({a: {b: 3}}).a.b").await.unwrap(), ShellValue::Number(n) if n == 3.0));
        assert!(eval("({a: 1}).missing").await.unwrap().is_null());
        assert!(matches!(eval("/ab+c/i").await.unwrap(), ShellValue::Regex(r) if r.text == "/ab+c/i"));
    }

    #[tokio::test]
    async fn test_reference_and_type_errors() {
        let err = eval("nope.find()").await.unwrap_err();
        assert_eq!(err.to_string(), "ReferenceError: nope is not defined");

        let err = eval("'abc'.toUpperCase()").await.unwrap_err();
        assert_eq!(err.to_string(), "TypeError: string.toUpperCase is not a function");

        let err = eval("null.x").await.unwrap_err();
        assert!(err.to_string().starts_with("TypeError: Cannot read properties of null"));
    }

    #[tokio::test]
    async fn test_builtins() {
        let oid = eval("ObjectId('507f1f77bcf86cd799439011')").await.unwrap();
        assert!(matches!(oid, ShellValue::Canonical(Bson::ObjectId(o)) if o.to_hex() == "507f1f77bcf86cd799439011"));
        assert!(eval("ObjectId('zz')").await.is_err());

        let date = eval("ISODate('2024-01-02')").await.unwrap();
        assert!(matches!(date, ShellValue::Canonical(Bson::DateTime(d)) if d.timestamp_millis() == 1_704_153_600_000));
        assert!(matches!(eval("new Date(0)").await.unwrap(), ShellValue::Canonical(Bson::DateTime(_))));

        assert!(matches!(eval("NumberLong('9007199254740993')").await.unwrap(),
            ShellValue::Canonical(Bson::Int64(9_007_199_254_740_993))));
        assert!(matches!(eval("NumberInt(7)").await.unwrap(), ShellValue::Canonical(Bson::Int32(7))));

        let reference = eval("DBRef('users', 5)").await.unwrap();
        assert_eq!(reference.field("$ref").and_then(|v| v.as_str().map(String::from)), Some("users".into()));
    }

    #[tokio::test]
    async fn test_print_collects_output() {
        let scope = Scope::new();
        let evaluator = ExpressionEvaluator::new();
        evaluator.evaluate("print('a', 1); printjson({k: 2})", &scope).await.unwrap();
        let out = scope.take_output();
        assert_eq!(out[0], "a 1");
        assert!(out[1].contains("\"k\": 2"));
    }
}
