//! The flattened program model handed over by the editing surface.
//!
//! A program is a [`Structure`]: an ordered list of [`Line`]s whose nesting is
//! encoded by parent ids rather than by real tree structure. Each line holds
//! slots, and each slot holds at most one [`PlacedToken`].

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "=")]
    Assign,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Neq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
    #[serde(rename = "%")]
    Mod,
}

impl Operator {
    pub const ALL: [Operator; 12] = [
        Operator::Assign,
        Operator::Eq,
        Operator::Neq,
        Operator::Lt,
        Operator::Gt,
        Operator::Le,
        Operator::Ge,
        Operator::Add,
        Operator::Sub,
        Operator::Mul,
        Operator::Div,
        Operator::Mod,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Assign => "=",
            Operator::Eq => "==",
            Operator::Neq => "!=",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Mod => "%",
        }
    }
}

impl FromStr for Operator {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operator::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown operator {}", s))
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Keyword {
    If,
    Else,
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Keyword::If => f.write_str("if"),
            Keyword::Else => f.write_str("else"),
        }
    }
}

/// A typed unit of code. Serialized as `{"kind": ..., "value": ...}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Token {
    Variable(String),
    /// Kept as text; the parser decides whether it is a valid integer.
    Number(String),
    Operator(Operator),
    Color(String),
    Control(Keyword),
}

impl Token {
    pub fn variable(name: impl Into<String>) -> Self {
        Token::Variable(name.into())
    }

    pub fn number(text: impl Into<String>) -> Self {
        Token::Number(text.into())
    }

    pub fn color(name: impl Into<String>) -> Self {
        Token::Color(name.into())
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Token::Variable(_) => "variable",
            Token::Number(_) => "number",
            Token::Operator(_) => "operator",
            Token::Color(_) => "color",
            Token::Control(_) => "control",
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Variable(text) | Token::Number(text) | Token::Color(text) => f.write_str(text),
            Token::Operator(op) => op.fmt(f),
            Token::Control(keyword) => keyword.fmt(f),
        }
    }
}

impl From<Operator> for Token {
    fn from(op: Operator) -> Self {
        Token::Operator(op)
    }
}

impl From<Keyword> for Token {
    fn from(keyword: Keyword) -> Self {
        Token::Control(keyword)
    }
}

/// A token instance sitting in a slot. The instance id only matters to the
/// editing surface.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedToken {
    #[serde(default = "Uuid::now_v7")]
    pub instance: Uuid,
    pub token: Token,
}

impl PlacedToken {
    pub fn new(token: Token) -> Self {
        Self {
            instance: Uuid::now_v7(),
            token,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    #[default]
    Expression,
    Condition,
    Assignment,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    pub id: String,
    /// Advisory only; the parser classifies lines by their tokens.
    #[serde(default)]
    pub kind: LineKind,
    #[serde(default)]
    pub indent: u32,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub slots: Vec<Option<PlacedToken>>,
}

impl Line {
    /// Builds a line with one filled slot per token.
    pub fn new(id: impl Into<String>, tokens: impl IntoIterator<Item = Token>) -> Self {
        Self {
            id: id.into(),
            kind: LineKind::default(),
            indent: 0,
            parent: None,
            slots: tokens
                .into_iter()
                .map(|token| Some(PlacedToken::new(token)))
                .collect(),
        }
    }

    pub fn blank(id: impl Into<String>) -> Self {
        Self::new(id, Vec::<Token>::new())
    }

    pub fn with_parent(mut self, parent: impl Into<String>, indent: u32) -> Self {
        self.parent = Some(parent.into());
        self.indent = indent;
        self
    }

    /// The non-empty slots, in slot order.
    pub fn tokens(&self) -> impl Iterator<Item = &Token> + '_ {
        self.slots.iter().flatten().map(|placed| &placed.token)
    }

    pub fn first_token(&self) -> Option<&Token> {
        self.tokens().next()
    }

    pub fn is_if(&self) -> bool {
        matches!(self.first_token(), Some(Token::Control(Keyword::If)))
    }

    pub fn is_else(&self) -> bool {
        matches!(self.first_token(), Some(Token::Control(Keyword::Else)))
    }

    pub fn is_empty(&self) -> bool {
        self.first_token().is_none()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Structure {
    pub lines: Vec<Line>,
}

impl Structure {
    pub fn new(lines: Vec<Line>) -> Self {
        Self { lines }
    }

    pub fn index(&self) -> LineIndex<'_> {
        LineIndex::new(&self.lines)
    }
}

/// Arena view over a structure: lines by position plus an id lookup table.
/// When ids repeat, the first occurrence wins.
#[derive(Debug)]
pub struct LineIndex<'a> {
    lines: &'a [Line],
    by_id: HashMap<&'a str, usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(lines: &'a [Line]) -> Self {
        let mut by_id = HashMap::with_capacity(lines.len());
        for (index, line) in lines.iter().enumerate() {
            by_id.entry(line.id.as_str()).or_insert(index);
        }
        Self { lines, by_id }
    }

    pub fn lines(&self) -> &'a [Line] {
        self.lines
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    /// Positions of the lines naming `parent_id` as their parent, in order.
    pub fn children_of(&self, parent_id: &'a str) -> impl Iterator<Item = usize> + 'a {
        self.lines
            .iter()
            .enumerate()
            .filter(move |(_, line)| line.parent.as_deref() == Some(parent_id))
            .map(|(index, _)| index)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }
}
