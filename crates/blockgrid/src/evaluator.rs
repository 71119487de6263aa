//! Runs a [`Program`] once per grid cell.
//!
//! Every cell gets a fresh scope seeded with `x`, `y` and `p`. A runtime error
//! aborts only the cell that raised it; that cell falls back to
//! [`Pixel::Unset`] and the rest of the grid is still computed.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::ast::{BinaryOperator, DataType, Expression, Literal, LiteralValue, Program, Statement};

pub const PIXEL_VARIABLE: &str = "p";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSize {
    pub width: usize,
    pub height: usize,
}

impl GridSize {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    pub fn cells(&self) -> usize {
        self.width.saturating_mul(self.height)
    }
}

/// One output cell. `Unset` is the sentinel for cells that failed or never
/// assigned `p`; it serializes as `null`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum Pixel {
    Unset,
    Color(String),
}

impl Pixel {
    pub fn color(name: impl Into<String>) -> Self {
        Pixel::Color(name.into())
    }
}

impl fmt::Display for Pixel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pixel::Unset => f.write_str("."),
            Pixel::Color(name) => f.write_str(name),
        }
    }
}

/// `height` rows of `width` cells each.
pub type Grid = Vec<Vec<Pixel>>;

pub fn blank_grid(size: GridSize) -> Grid {
    vec![vec![Pixel::Unset; size.width]; size.height]
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Unset,
    Bool(bool),
    Int(i64),
    Color(String),
    Text(String),
}

impl Value {
    fn kind_name(&self) -> &'static str {
        match self {
            Value::Unset => "unset",
            Value::Bool(_) => "bool",
            Value::Int(_) => "number",
            Value::Color(_) => "color",
            Value::Text(_) => "string",
        }
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            Value::Color(text) | Value::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Unset => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Color(text) | Value::Text(text) => !text.is_empty(),
        }
    }

    fn into_pixel(self) -> Pixel {
        match self {
            Value::Unset => Pixel::Unset,
            Value::Color(text) | Value::Text(text) => Pixel::Color(text),
            Value::Int(n) => Pixel::Color(n.to_string()),
            Value::Bool(b) => Pixel::Color(b.to_string()),
        }
    }
}

impl From<&Literal> for Value {
    fn from(literal: &Literal) -> Self {
        match (&literal.value, literal.datatype) {
            (LiteralValue::Int(n), _) => Value::Int(*n),
            (LiteralValue::Text(text), DataType::Color) => Value::Color(text.clone()),
            (LiteralValue::Text(text), _) => Value::Text(text.clone()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error("Undefined variable: {0}")]
    UndefinedVariable(String),
    #[error("Type mismatch: cannot apply `{op}` to {left} and {right}")]
    TypeMismatch {
        op: BinaryOperator,
        left: &'static str,
        right: &'static str,
    },
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Arithmetic overflow in `{0}`")]
    Overflow(BinaryOperator),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CellError {
    pub x: usize,
    pub y: usize,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    pub grid: Grid,
    pub errors: Vec<CellError>,
}

impl Evaluation {
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }

    fn from_rows(rows: Vec<(Vec<Pixel>, Vec<CellError>)>) -> Self {
        let mut grid = Vec::with_capacity(rows.len());
        let mut errors = vec![];
        for (row, row_errors) in rows {
            grid.push(row);
            errors.extend(row_errors);
        }
        debug!(rows = grid.len(), errors = errors.len(), "Evaluated grid");
        Self { grid, errors }
    }
}

#[tracing::instrument(level = "trace", skip_all, fields(width = size.width, height = size.height))]
pub fn evaluate(program: &Program, size: GridSize) -> Evaluation {
    let rows = (0..size.height)
        .map(|y| evaluate_row(program, y, size.width))
        .collect();
    Evaluation::from_rows(rows)
}

/// Same result as [`evaluate`], with rows spread across `pool`.
#[tracing::instrument(level = "trace", skip_all, fields(width = size.width, height = size.height))]
pub fn evaluate_parallel(program: &Program, size: GridSize, pool: &ThreadPool) -> Evaluation {
    let rows = pool.install(|| {
        (0..size.height)
            .into_par_iter()
            .map(|y| evaluate_row(program, y, size.width))
            .collect()
    });
    Evaluation::from_rows(rows)
}

fn evaluate_row(program: &Program, y: usize, width: usize) -> (Vec<Pixel>, Vec<CellError>) {
    let mut row = Vec::with_capacity(width);
    let mut errors = vec![];
    for x in 0..width {
        match evaluate_cell(program, x, y) {
            Ok(pixel) => row.push(pixel),
            Err(err) => {
                trace!(x, y, error = %err, "Cell failed");
                errors.push(CellError {
                    x,
                    y,
                    message: err.to_string(),
                });
                row.push(Pixel::Unset);
            }
        }
    }
    (row, errors)
}

pub fn evaluate_cell(program: &Program, x: usize, y: usize) -> Result<Pixel, RuntimeError> {
    let mut scope = Scope::new(x, y);
    execute_block(&program.statements, &mut scope)?;
    Ok(scope.take_pixel())
}

/// Variable bindings for a single cell.
#[derive(Debug)]
struct Scope {
    variables: HashMap<String, Value>,
}

impl Scope {
    fn new(x: usize, y: usize) -> Self {
        let mut variables = HashMap::new();
        variables.insert("x".to_string(), Value::Int(x as i64));
        variables.insert("y".to_string(), Value::Int(y as i64));
        variables.insert(PIXEL_VARIABLE.to_string(), Value::Unset);
        Self { variables }
    }

    fn get(&self, name: &str) -> Result<&Value, RuntimeError> {
        self.variables
            .get(name)
            .ok_or_else(|| RuntimeError::UndefinedVariable(name.to_string()))
    }

    fn set(&mut self, name: &str, value: Value) {
        self.variables.insert(name.to_string(), value);
    }

    fn take_pixel(mut self) -> Pixel {
        self.variables
            .remove(PIXEL_VARIABLE)
            .map(Value::into_pixel)
            .unwrap_or(Pixel::Unset)
    }
}

fn execute_block(statements: &[Statement], scope: &mut Scope) -> Result<(), RuntimeError> {
    for statement in statements {
        execute_statement(statement, scope)?;
    }
    Ok(())
}

fn execute_statement(statement: &Statement, scope: &mut Scope) -> Result<(), RuntimeError> {
    match statement {
        Statement::Assignment { target, value } => {
            let value = evaluate_expression(value, scope)?;
            scope.set(target, value);
        }
        Statement::Conditional {
            condition,
            then_body,
            else_body,
        } => {
            if evaluate_expression(condition, scope)?.is_truthy() {
                execute_block(then_body, scope)?;
            } else if let Some(else_body) = else_body {
                execute_block(else_body, scope)?;
            }
        }
    }
    Ok(())
}

fn evaluate_expression(expression: &Expression, scope: &Scope) -> Result<Value, RuntimeError> {
    match expression {
        Expression::Literal(literal) => Ok(Value::from(literal)),
        Expression::Variable(name) => scope.get(name).cloned(),
        Expression::BinaryOp { op, left, right } => {
            let left = evaluate_expression(left, scope)?;
            let right = evaluate_expression(right, scope)?;
            evaluate_binary_op(*op, &left, &right)
        }
    }
}

fn evaluate_binary_op(
    op: BinaryOperator,
    left: &Value,
    right: &Value,
) -> Result<Value, RuntimeError> {
    let mismatch = || RuntimeError::TypeMismatch {
        op,
        left: left.kind_name(),
        right: right.kind_name(),
    };

    match op {
        BinaryOperator::Eq => Ok(Value::Bool(values_equal(left, right))),
        BinaryOperator::Neq => Ok(Value::Bool(!values_equal(left, right))),
        BinaryOperator::Lt | BinaryOperator::Gt | BinaryOperator::Le | BinaryOperator::Ge => {
            let ordering = compare_values(left, right).ok_or_else(mismatch)?;
            Ok(Value::Bool(match op {
                BinaryOperator::Lt => ordering == Ordering::Less,
                BinaryOperator::Gt => ordering == Ordering::Greater,
                BinaryOperator::Le => ordering != Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        BinaryOperator::Add
        | BinaryOperator::Sub
        | BinaryOperator::Mul
        | BinaryOperator::Div
        | BinaryOperator::Mod => {
            let (Value::Int(a), Value::Int(b)) = (left, right) else {
                return Err(mismatch());
            };
            if matches!(op, BinaryOperator::Div | BinaryOperator::Mod) && *b == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            let result = match op {
                BinaryOperator::Add => a.checked_add(*b),
                BinaryOperator::Sub => a.checked_sub(*b),
                BinaryOperator::Mul => a.checked_mul(*b),
                BinaryOperator::Div => a.checked_div(*b),
                _ => a.checked_rem(*b),
            };
            result.map(Value::Int).ok_or(RuntimeError::Overflow(op))
        }
    }
}

/// Colors and strings compare by text; other kinds only equal themselves.
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.as_text(), right.as_text()) {
        (Some(a), Some(b)) => a == b,
        _ => left == right,
    }
}

fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        _ => Some(left.as_text()?.cmp(right.as_text()?)),
    }
}
