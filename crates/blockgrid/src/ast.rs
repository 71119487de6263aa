use std::fmt;

use serde::Serialize;

use crate::token::Operator;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Program {
    pub statements: Vec<Statement>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Statement {
    Assignment {
        target: String,
        value: Expression,
    },
    Conditional {
        condition: Expression,
        then_body: Vec<Statement>,
        /// Present (possibly empty) only when a matching `else` line exists.
        else_body: Option<Vec<Statement>>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Expression {
    Literal(Literal),
    Variable(String),
    BinaryOp {
        op: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
}

impl Expression {
    pub fn binary(op: BinaryOperator, left: Expression, right: Expression) -> Self {
        Expression::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Literal {
    pub value: LiteralValue,
    pub datatype: DataType,
}

impl Literal {
    pub fn number(value: i64) -> Self {
        Self {
            value: LiteralValue::Int(value),
            datatype: DataType::Number,
        }
    }

    pub fn color(name: impl Into<String>) -> Self {
        Self {
            value: LiteralValue::Text(name.into()),
            datatype: DataType::Color,
        }
    }

    pub fn string(text: impl Into<String>) -> Self {
        Self {
            value: LiteralValue::Text(text.into()),
            datatype: DataType::String,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum LiteralValue {
    Int(i64),
    Text(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Number,
    Color,
    String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum BinaryOperator {
    Eq,
    Neq,
    Lt,
    Gt,
    Le,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOperator {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::Neq
                | BinaryOperator::Lt
                | BinaryOperator::Gt
                | BinaryOperator::Le
                | BinaryOperator::Ge
        )
    }

    pub fn is_arithmetic(self) -> bool {
        !self.is_comparison()
    }

    pub fn symbol(self) -> &'static str {
        Operator::from(self).as_str()
    }
}

impl TryFrom<Operator> for BinaryOperator {
    type Error = Operator;

    /// Fails only for `=`, which is not a binary operator.
    fn try_from(op: Operator) -> Result<Self, Self::Error> {
        match op {
            Operator::Assign => Err(op),
            Operator::Eq => Ok(BinaryOperator::Eq),
            Operator::Neq => Ok(BinaryOperator::Neq),
            Operator::Lt => Ok(BinaryOperator::Lt),
            Operator::Gt => Ok(BinaryOperator::Gt),
            Operator::Le => Ok(BinaryOperator::Le),
            Operator::Ge => Ok(BinaryOperator::Ge),
            Operator::Add => Ok(BinaryOperator::Add),
            Operator::Sub => Ok(BinaryOperator::Sub),
            Operator::Mul => Ok(BinaryOperator::Mul),
            Operator::Div => Ok(BinaryOperator::Div),
            Operator::Mod => Ok(BinaryOperator::Mod),
        }
    }
}

impl From<BinaryOperator> for Operator {
    fn from(op: BinaryOperator) -> Self {
        match op {
            BinaryOperator::Eq => Operator::Eq,
            BinaryOperator::Neq => Operator::Neq,
            BinaryOperator::Lt => Operator::Lt,
            BinaryOperator::Gt => Operator::Gt,
            BinaryOperator::Le => Operator::Le,
            BinaryOperator::Ge => Operator::Ge,
            BinaryOperator::Add => Operator::Add,
            BinaryOperator::Sub => Operator::Sub,
            BinaryOperator::Mul => Operator::Mul,
            BinaryOperator::Div => Operator::Div,
            BinaryOperator::Mod => Operator::Mod,
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
