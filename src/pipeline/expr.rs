//! Row predicates and derived-column expressions.
//!
//! Both are stored structurally in recipes and also accept a short text form
//! for the command line:
//!
//! ```
//! use tidyframe::pipeline::expr::{DeriveSpec, Predicate};
//!
//! let keep: Predicate = "price > 0".parse()?;
//! let total: DeriveSpec = "total = price * quantity".parse()?;
//! assert_eq!(keep.column, "price");
//! assert_eq!(total.name, "total");
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! Column names containing spaces or operator characters can be quoted with
//! backticks or double quotes.

use anyhow::{Result, bail};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Comparison used by a [`Predicate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    IsNull,
    IsNotNull,
    OneOf,
}

impl CompareOp {
    pub fn needs_value(self) -> bool {
        !matches!(self, Self::IsNull | Self::IsNotNull)
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::IsNull => "is_null",
            Self::IsNotNull => "is_not_null",
            Self::OneOf => "in",
        }
    }
}

/// Keep rows where `column <op> value` holds.
///
/// Rows where the comparison is null (a missing cell) are dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub column: String,
    pub op: CompareOp,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
}

impl Predicate {
    pub fn new(column: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    /// Checks that the value fits the operator, independent of any data.
    ///
    /// # Errors
    ///
    /// Returns error describing the mismatch.
    pub fn check(&self) -> Result<()> {
        match (self.op, &self.value) {
            (CompareOp::IsNull | CompareOp::IsNotNull, _) => Ok(()),
            (CompareOp::OneOf, Value::Array(items)) => {
                if let Some(bad) = items.iter().find(|v| !is_scalar(v)) {
                    bail!("'in' list for '{}' holds a non-scalar value {bad}", self.column);
                }
                Ok(())
            }
            (CompareOp::OneOf, other) => {
                bail!("'in' for '{}' needs a list, got {other}", self.column)
            }
            (op, Value::Null) => bail!(
                "'{}' comparison on '{}' needs a value",
                op.symbol(),
                self.column
            ),
            (op, v) if !is_scalar(v) => bail!(
                "'{}' comparison on '{}' needs a scalar value, got {v}",
                op.symbol(),
                self.column
            ),
            (CompareOp::Gt | CompareOp::Ge | CompareOp::Lt | CompareOp::Le, Value::Bool(_)) => {
                bail!("cannot order-compare '{}' with a boolean", self.column)
            }
            _ => Ok(()),
        }
    }

    /// Build the Polars filter expression.
    ///
    /// # Errors
    ///
    /// Returns error if the value does not fit the operator.
    pub fn to_expr(&self) -> Result<Expr> {
        self.check()?;
        let column = col(self.column.as_str());

        let expr = match self.op {
            CompareOp::IsNull => column.is_null(),
            CompareOp::IsNotNull => column.is_not_null(),
            CompareOp::OneOf => {
                let items = match &self.value {
                    Value::Array(items) => items.as_slice(),
                    _ => &[],
                };
                items
                    .iter()
                    .map(|v| column.clone().eq(value_lit(v)))
                    .reduce(|acc, e| acc.or(e))
                    .unwrap_or_else(|| lit(false))
            }
            CompareOp::Eq => column.eq(value_lit(&self.value)),
            CompareOp::Ne => column.neq(value_lit(&self.value)),
            CompareOp::Gt => column.gt(value_lit(&self.value)),
            CompareOp::Ge => column.gt_eq(value_lit(&self.value)),
            CompareOp::Lt => column.lt(value_lit(&self.value)),
            CompareOp::Le => column.lt_eq(value_lit(&self.value)),
        };
        Ok(expr)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.op.needs_value() {
            write!(f, "{} {} {}", self.column, self.op.symbol(), self.value)
        } else {
            write!(f, "{} {}", self.column, self.op.symbol())
        }
    }
}

impl FromStr for Predicate {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let text = s.trim();
        if text.is_empty() {
            bail!("empty filter predicate");
        }

        for (word, op) in [
            ("is_not_null", CompareOp::IsNotNull),
            ("is_null", CompareOp::IsNull),
        ] {
            if let Some(column) = text.strip_suffix(word)
                && column.ends_with(char::is_whitespace)
            {
                return Ok(Self::new(unquote(column.trim()), op, Value::Null));
            }
        }

        if let Some((column, list)) = split_outside_quotes(text, " in ") {
            let list = list.trim();
            let inner = list
                .strip_prefix('[')
                .and_then(|l| l.strip_suffix(']'))
                .ok_or_else(|| anyhow::anyhow!("'in' expects a [list], got '{list}'"))?;
            let items = split_list(inner).into_iter().map(parse_value).collect();
            return Ok(Self::new(
                unquote(column.trim()),
                CompareOp::OneOf,
                Value::Array(items),
            ));
        }

        let (idx, token, op) = find_compare_op(text)
            .ok_or_else(|| anyhow::anyhow!("no comparison operator in '{text}'"))?;
        let column = unquote(text[..idx].trim());
        let value = text[idx + token.len()..].trim();
        if column.is_empty() {
            bail!("missing column name in '{text}'");
        }
        if value.is_empty() {
            bail!("missing value in '{text}'");
        }

        let predicate = Self::new(column, op, parse_value(value));
        predicate.check()?;
        Ok(predicate)
    }
}

/// Arithmetic operator of an [`Expression`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Self::Add),
            '-' => Some(Self::Sub),
            '*' => Some(Self::Mul),
            '/' => Some(Self::Div),
            _ => None,
        }
    }

    fn symbol(self) -> char {
        match self {
            Self::Add => '+',
            Self::Sub => '-',
            Self::Mul => '*',
            Self::Div => '/',
        }
    }
}

/// A column reference or a numeric constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Number(f64),
    Column(String),
}

impl Operand {
    pub fn column(&self) -> Option<&str> {
        match self {
            Self::Column(name) => Some(name),
            Self::Number(_) => None,
        }
    }

    fn to_expr(&self) -> Expr {
        match self {
            Self::Number(n) => lit(*n),
            Self::Column(name) => col(name.as_str()),
        }
    }

    fn parse(text: &str) -> Self {
        let text = text.trim();
        if !is_quoted(text)
            && let Ok(n) = text.parse::<f64>()
            && n.is_finite()
        {
            return Self::Number(n);
        }
        Self::Column(unquote(text))
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Column(name) => write!(f, "{name}"),
        }
    }
}

/// `left <op> right`, e.g. `price * quantity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub left: Operand,
    pub op: ArithOp,
    pub right: Operand,
}

impl Expression {
    pub fn new(left: Operand, op: ArithOp, right: Operand) -> Self {
        Self { left, op, right }
    }

    /// Columns this expression reads.
    pub fn columns(&self) -> Vec<&str> {
        [&self.left, &self.right]
            .into_iter()
            .filter_map(Operand::column)
            .collect()
    }

    pub fn to_expr(&self) -> Expr {
        let left = self.left.to_expr();
        let right = self.right.to_expr();
        match self.op {
            ArithOp::Add => left + right,
            ArithOp::Sub => left - right,
            ArithOp::Mul => left * right,
            // Always true division, also for integer columns.
            ArithOp::Div => left.cast(DataType::Float64) / right.cast(DataType::Float64),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.left, self.op.symbol(), self.right)
    }
}

impl FromStr for Expression {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let text = s.trim();
        let (idx, op) = find_arith_op(text)
            .ok_or_else(|| anyhow::anyhow!("no arithmetic operator (+ - * /) in '{text}'"))?;
        let (left, right) = (text[..idx].trim(), text[idx + 1..].trim());
        if left.is_empty() || right.is_empty() {
            bail!("expression '{text}' needs two operands");
        }
        Ok(Self::new(Operand::parse(left), op, Operand::parse(right)))
    }
}

/// `name = expression`, the text form of a derive step.
#[derive(Debug, Clone, PartialEq)]
pub struct DeriveSpec {
    pub name: String,
    pub expression: Expression,
}

impl FromStr for DeriveSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (name, expression) = s
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("derive must look like 'name = a * b', got '{s}'"))?;
        let name = unquote(name.trim());
        if name.is_empty() {
            bail!("derive '{s}' has no column name");
        }
        Ok(Self {
            name,
            expression: expression.parse()?,
        })
    }
}

fn is_scalar(v: &Value) -> bool {
    matches!(v, Value::Bool(_) | Value::Number(_) | Value::String(_))
}

fn value_lit(v: &Value) -> Expr {
    match v {
        Value::Bool(b) => lit(*b),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => lit(i),
            (None, Some(f)) => lit(f),
            (None, None) => lit(NULL),
        },
        Value::String(s) => lit(s.as_str()),
        Value::Null | Value::Array(_) | Value::Object(_) => lit(NULL),
    }
}

fn parse_value(text: &str) -> Value {
    let text = text.trim();
    if is_quoted(text) {
        return Value::String(unquote(text));
    }
    match text {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(i) = text.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = text.parse::<f64>()
        && let Some(n) = serde_json::Number::from_f64(f)
    {
        return Value::Number(n);
    }
    Value::String(text.to_owned())
}

fn is_quoted(text: &str) -> bool {
    text.len() >= 2
        && ['"', '\'', '`']
            .iter()
            .any(|&q| text.starts_with(q) && text.ends_with(q))
}

fn unquote(text: &str) -> String {
    if is_quoted(text) {
        text[1..text.len() - 1].to_owned()
    } else {
        text.to_owned()
    }
}

/// Byte offsets of `text` that are not inside a quoted section.
fn unquoted_positions(text: &str) -> Vec<(usize, char)> {
    let mut quote: Option<char> = None;
    let mut out = Vec::new();
    for (i, c) in text.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if matches!(c, '"' | '\'' | '`') => quote = Some(c),
            None => out.push((i, c)),
        }
    }
    out
}

fn split_outside_quotes<'a>(text: &'a str, needle: &str) -> Option<(&'a str, &'a str)> {
    unquoted_positions(text)
        .into_iter()
        .map(|(i, _)| i)
        .find(|&i| text[i..].starts_with(needle))
        .map(|i| (&text[..i], &text[i + needle.len()..]))
}

fn split_list(inner: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for (i, c) in unquoted_positions(inner) {
        if c == ',' {
            parts.push(&inner[start..i]);
            start = i + 1;
        }
    }
    parts.push(&inner[start..]);
    parts.into_iter().map(str::trim).filter(|p| !p.is_empty()).collect()
}

fn find_compare_op(text: &str) -> Option<(usize, &'static str, CompareOp)> {
    const TOKENS: [(&str, CompareOp); 7] = [
        (">=", CompareOp::Ge),
        ("<=", CompareOp::Le),
        ("!=", CompareOp::Ne),
        ("==", CompareOp::Eq),
        (">", CompareOp::Gt),
        ("<", CompareOp::Lt),
        ("=", CompareOp::Eq),
    ];

    unquoted_positions(text).into_iter().find_map(|(i, _)| {
        TOKENS
            .iter()
            .find(|(token, _)| text[i..].starts_with(token))
            .map(|&(token, op)| (i, token, op))
    })
}

// An operator only counts when it follows an operand, so `a - -1` splits on the first `-`.
fn find_arith_op(text: &str) -> Option<(usize, ArithOp)> {
    unquoted_positions(text).into_iter().find_map(|(i, c)| {
        let op = ArithOp::from_char(c)?;
        let follows_operand = text[..i]
            .trim_end()
            .chars()
            .next_back()
            .is_some_and(|p| ArithOp::from_char(p).is_none());
        follows_operand.then_some((i, op))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_comparisons() -> Result<()> {
        let p: Predicate = "price > 0".parse()?;
        assert_eq!(p, Predicate::new("price", CompareOp::Gt, 0));

        let p: Predicate = "discount<=0.5".parse()?;
        assert_eq!(p.op, CompareOp::Le);
        assert_eq!(p.value, serde_json::json!(0.5));

        let p: Predicate = r#"city == "Leeds""#.parse()?;
        assert_eq!(p.value, Value::String("Leeds".to_owned()));

        let p: Predicate = "`unit price` != 3".parse()?;
        assert_eq!(p.column, "unit price");
        assert_eq!(p.op, CompareOp::Ne);

        let p: Predicate = "active = true".parse()?;
        assert_eq!(p.value, Value::Bool(true));
        Ok(())
    }

    #[test]
    fn test_parse_null_checks_and_lists() -> Result<()> {
        let p: Predicate = "email is_not_null".parse()?;
        assert_eq!(p.op, CompareOp::IsNotNull);
        assert_eq!(p.value, Value::Null);

        let p: Predicate = r#"city in [Leeds, "New York", 3]"#.parse()?;
        assert_eq!(p.op, CompareOp::OneOf);
        assert_eq!(p.value, serde_json::json!(["Leeds", "New York", 3]));
        Ok(())
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("price".parse::<Predicate>().is_err());
        assert!("> 3".parse::<Predicate>().is_err());
        assert!("price >".parse::<Predicate>().is_err());
        assert!("city in Leeds".parse::<Predicate>().is_err());
    }

    #[test]
    fn test_check_rejects_mismatched_values() {
        assert!(Predicate::new("a", CompareOp::Gt, Value::Null).check().is_err());
        assert!(Predicate::new("a", CompareOp::OneOf, 3).check().is_err());
        assert!(Predicate::new("a", CompareOp::Lt, true).check().is_err());
        assert!(
            Predicate::new("a", CompareOp::OneOf, serde_json::json!([[1]]))
                .check()
                .is_err()
        );
        assert!(Predicate::new("a", CompareOp::IsNull, Value::Null).check().is_ok());
    }

    #[test]
    fn test_predicate_filters_frame() -> Result<()> {
        let df = df!(
            "price" => &[Some(3.0), Some(-1.0), None, Some(0.0), Some(7.5)],
            "city" => &["Leeds", "York", "Leeds", "Hull", "York"]
        )?;

        let positive: Predicate = "price > 0".parse()?;
        let out = df.clone().lazy().filter(positive.to_expr()?).collect()?;
        assert_eq!(out.height(), 2);

        let cities: Predicate = "city in [Leeds, Hull]".parse()?;
        let out = df.lazy().filter(cities.to_expr()?).collect()?;
        assert_eq!(out.height(), 3);
        Ok(())
    }

    #[test]
    fn test_parse_expressions() -> Result<()> {
        let e: Expression = "price * quantity".parse()?;
        assert_eq!(
            e,
            Expression::new(
                Operand::Column("price".to_owned()),
                ArithOp::Mul,
                Operand::Column("quantity".to_owned())
            )
        );
        assert_eq!(e.columns(), vec!["price", "quantity"]);

        let e: Expression = "amount - -1.5".parse()?;
        assert_eq!(e.op, ArithOp::Sub);
        assert_eq!(e.right, Operand::Number(-1.5));

        let e: Expression = r#""net-total"/2"#.parse()?;
        assert_eq!(e.left, Operand::Column("net-total".to_owned()));
        assert_eq!(e.op, ArithOp::Div);

        assert!("price".parse::<Expression>().is_err());
        assert!("* price".parse::<Expression>().is_err());
        Ok(())
    }

    #[test]
    fn test_derive_spec() -> Result<()> {
        let d: DeriveSpec = "total = price * quantity".parse()?;
        assert_eq!(d.name, "total");
        assert_eq!(d.expression.to_string(), "price * quantity");
        assert!("= a * b".parse::<DeriveSpec>().is_err());
        assert!("total price".parse::<DeriveSpec>().is_err());
        Ok(())
    }

    #[test]
    fn test_division_is_true_division() -> Result<()> {
        let df = df!("a" => &[7i64, 1], "b" => &[2i64, 4])?;
        let e: Expression = "a / b".parse()?;
        let out = df.lazy().select([e.to_expr().alias("ratio")]).collect()?;
        let ratio = out.column("ratio")?.as_materialized_series().f64()?.get(0);
        assert_eq!(ratio, Some(3.5));
        Ok(())
    }

    #[test]
    fn test_operand_serde_is_untagged() -> Result<()> {
        let e: Expression =
            serde_json::from_str(r#"{"left": "price", "op": "mul", "right": 1.2}"#)?;
        assert_eq!(e.left, Operand::Column("price".to_owned()));
        assert_eq!(e.right, Operand::Number(1.2));
        Ok(())
    }

    #[test]
    fn test_non_finite_words_are_column_names() -> Result<()> {
        let e: Expression = "price * nan".parse()?;
        assert_eq!(e.right, Operand::Column("nan".to_owned()));
        let e: Expression = "inf - infinity".parse()?;
        assert_eq!(e.columns(), vec!["inf", "infinity"]);

        let reloaded: Expression = serde_json::from_str(&serde_json::to_string(&e)?)?;
        assert_eq!(reloaded, e);
        Ok(())
    }
}
