//! Rebuilds a [`Program`] from the flattened, parent-pointer line list.
//!
//! Lines are visited in sequence order. Every line is attempted, so a single
//! call reports every defect in the structure. Any error discards the program.

use std::fmt;

use serde::Serialize;
use tracing::{debug, trace};

use crate::ast::{BinaryOperator, Expression, Literal, Program, Statement};
use crate::token::{Keyword, Line, LineIndex, Operator, Structure, Token};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseErrorCategory {
    Syntax,
    Semantic,
}

impl fmt::Display for ParseErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorCategory::Syntax => f.write_str("syntax"),
            ParseErrorCategory::Semantic => f.write_str("semantic"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{category} error on line {line_index}: {message}")]
pub struct ParseError {
    /// Position of the offending line in the structure.
    pub line_index: usize,
    pub line_id: String,
    pub message: String,
    pub category: ParseErrorCategory,
}

/// A failure that is not yet attached to a line.
#[derive(Debug)]
struct LineError {
    message: String,
    category: ParseErrorCategory,
}

impl LineError {
    fn syntax(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            category: ParseErrorCategory::Syntax,
        }
    }

    fn semantic(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            category: ParseErrorCategory::Semantic,
        }
    }

    fn at(self, line_index: usize, line: &Line) -> ParseError {
        ParseError {
            line_index,
            line_id: line.id.clone(),
            message: self.message,
            category: self.category,
        }
    }
}

#[tracing::instrument(level = "trace", skip_all, fields(lines = structure.lines.len()))]
pub fn parse(structure: &Structure) -> Result<Program, Vec<ParseError>> {
    let mut parser = StructuralParser::new(structure.index());

    let mut statements = vec![];
    for position in 0..parser.index.len() {
        if parser.consumed[position] {
            continue;
        }
        if let Some(statement) = parser.parse_line(position) {
            statements.push(statement);
        }
    }

    if parser.errors.is_empty() {
        debug!(statements = statements.len(), "Parsed structure");
        Ok(Program { statements })
    } else {
        debug!(errors = parser.errors.len(), "Structure has parse errors");
        Err(parser.errors)
    }
}

struct StructuralParser<'a> {
    index: LineIndex<'a>,
    /// Lines already turned into (part of) a statement. Doubles as the guard
    /// that keeps cyclic parent references from recursing forever.
    consumed: Vec<bool>,
    errors: Vec<ParseError>,
}

impl<'a> StructuralParser<'a> {
    fn new(index: LineIndex<'a>) -> Self {
        let consumed = vec![false; index.len()];
        Self {
            index,
            consumed,
            errors: vec![],
        }
    }

    fn line(&self, position: usize) -> &'a Line {
        &self.index.lines()[position]
    }

    fn parse_line(&mut self, position: usize) -> Option<Statement> {
        self.consumed[position] = true;
        let line = self.line(position);
        let tokens = line.tokens().collect::<Vec<_>>();
        trace!(line = %line.id, tokens = tokens.len(), "Parsing line");

        let result = match tokens.first() {
            None => return None,
            Some(Token::Control(Keyword::Else)) => {
                trace!(line = %line.id, "Skipping else line without a matching if");
                return None;
            }
            Some(Token::Control(Keyword::If)) => self.parse_conditional(position, &tokens),
            Some(Token::Variable(_)) => parse_assignment(&tokens),
            Some(_) if tokens.contains(&&Token::Operator(Operator::Assign)) => {
                parse_assignment(&tokens)
            }
            Some(_) => Err(LineError::syntax("unrecognized line pattern")),
        };

        match result {
            Ok(statement) => Some(statement),
            Err(err) => {
                self.errors.push(err.at(position, line));
                None
            }
        }
    }

    fn parse_conditional(
        &mut self,
        position: usize,
        tokens: &[&Token],
    ) -> Result<Statement, LineError> {
        let condition = parse_condition(tokens)?;
        let line = self.line(position);

        let then_body = self.gather_children(&line.id);
        let else_body = match self.find_else(position) {
            Some(else_position) => {
                self.consumed[else_position] = true;
                let else_line = self.line(else_position);
                trace!(if_line = %line.id, else_line = %else_line.id, "Matched else line");
                Some(self.gather_children(&else_line.id))
            }
            None => None,
        };

        Ok(Statement::Conditional {
            condition,
            then_body,
            else_body,
        })
    }

    /// Parses the unconsumed, non-`else` children of `parent_id` in order.
    fn gather_children(&mut self, parent_id: &'a str) -> Vec<Statement> {
        let children = self.index.children_of(parent_id).collect::<Vec<_>>();
        let mut body = vec![];
        for child in children {
            // Checked per child: parsing an earlier sibling may consume later ones.
            if self.consumed[child] || self.line(child).is_else() {
                continue;
            }
            if let Some(statement) = self.parse_line(child) {
                body.push(statement);
            }
        }
        body
    }

    /// The first later `else` sibling, unless another `if` sibling comes first.
    fn find_else(&self, if_position: usize) -> Option<usize> {
        let parent = self.line(if_position).parent.as_deref();
        for candidate in if_position + 1..self.index.len() {
            let line = self.line(candidate);
            if line.parent.as_deref() != parent {
                continue;
            }
            if line.is_if() {
                return None;
            }
            if line.is_else() && !self.consumed[candidate] {
                return Some(candidate);
            }
        }
        None
    }
}

fn parse_condition(tokens: &[&Token]) -> Result<Expression, LineError> {
    let [_, left, op, right, ..] = tokens else {
        return Err(LineError::syntax(
            "invalid condition: expected `if <value> <comparison> <value>`",
        ));
    };

    let op = match op {
        Token::Operator(op) => BinaryOperator::try_from(*op)
            .ok()
            .filter(|op| op.is_comparison()),
        _ => None,
    }
    .ok_or_else(|| {
        LineError::syntax(format!(
            "invalid condition: `{op}` is not a comparison operator"
        ))
    })?;

    Ok(Expression::binary(
        op,
        parse_value(left)?,
        parse_value(right)?,
    ))
}

fn parse_assignment(tokens: &[&Token]) -> Result<Statement, LineError> {
    let target = match tokens.first() {
        Some(Token::Variable(name)) => name.clone(),
        _ => return Err(LineError::semantic("invalid assignment target")),
    };

    if tokens.get(1) != Some(&&Token::Operator(Operator::Assign)) {
        return Err(LineError::syntax("missing `=` operator"));
    }

    let first = tokens
        .get(2)
        .ok_or_else(|| LineError::syntax("missing value"))?;

    let value = match &tokens[3..] {
        [] => parse_value(first)?,
        [Token::Operator(op), rest @ ..] => {
            let op = BinaryOperator::try_from(*op)
                .ok()
                .filter(|op| op.is_arithmetic())
                .ok_or_else(|| LineError::syntax("unexpected token after value"))?;
            let right = match rest {
                [right] => parse_value(right)?,
                [] => return Err(LineError::syntax("missing value")),
                _ => return Err(LineError::syntax("unexpected token after value")),
            };
            Expression::binary(op, parse_value(first)?, right)
        }
        _ => return Err(LineError::syntax("unexpected token after value")),
    };

    Ok(Statement::Assignment { target, value })
}

fn parse_value(token: &Token) -> Result<Expression, LineError> {
    match token {
        Token::Variable(name) => Ok(Expression::Variable(name.clone())),
        Token::Color(name) => Ok(Expression::Literal(Literal::color(name.clone()))),
        Token::Number(text) => text
            .parse::<i64>()
            .map(|value| Expression::Literal(Literal::number(value)))
            .map_err(|_| LineError::syntax(format!("invalid number: `{text}`"))),
        Token::Operator(_) | Token::Control(_) => Err(LineError::syntax(format!(
            "invalid value: `{token}` is not a variable, number or color"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOperator, Literal};
    use crate::token::{Keyword, Line, Operator, Structure, Token};

    fn var(name: &str) -> Token {
        Token::variable(name)
    }

    fn assign(id: &str, target: &str, value: Token) -> Line {
        Line::new(id, [var(target), Operator::Assign.into(), value])
    }

    fn if_line(id: &str, left: Token, op: Operator, right: Token) -> Line {
        Line::new(id, [Keyword::If.into(), left, op.into(), right])
    }

    fn else_line(id: &str) -> Line {
        Line::new(id, [Keyword::Else.into()])
    }

    fn assign_color(target: &str, color: &str) -> Statement {
        Statement::Assignment {
            target: target.to_string(),
            value: Expression::Literal(Literal::color(color)),
        }
    }

    #[test]
    fn empty_structure_is_empty_program() {
        let program = parse(&Structure::default()).expect("parse empty structure");
        assert!(program.statements.is_empty());
    }

    #[test]
    fn if_else_collects_children_into_both_branches() {
        let structure = Structure::new(vec![
            if_line("c", var("x"), Operator::Eq, Token::number("2")),
            assign("t", "p", Token::color("red")).with_parent("c", 1),
            else_line("e"),
            assign("f", "p", Token::color("blue")).with_parent("e", 1),
        ]);
        let program = parse(&structure).expect("parse conditional");
        assert_eq!(
            program.statements,
            vec![Statement::Conditional {
                condition: Expression::binary(
                    BinaryOperator::Eq,
                    Expression::Variable("x".to_string()),
                    Expression::Literal(Literal::number(2)),
                ),
                then_body: vec![assign_color("p", "red")],
                else_body: Some(vec![assign_color("p", "blue")]),
            }]
        );
    }

    #[test]
    fn else_search_stops_at_next_sibling_if() {
        let structure = Structure::new(vec![
            if_line("a", var("x"), Operator::Lt, Token::number("1")),
            if_line("b", var("y"), Operator::Lt, Token::number("1")),
            else_line("e"),
        ]);
        let program = parse(&structure).expect("parse");
        let else_bodies = program
            .statements
            .iter()
            .map(|statement| match statement {
                Statement::Conditional { else_body, .. } => else_body.is_some(),
                Statement::Assignment { .. } => false,
            })
            .collect::<Vec<_>>();
        assert_eq!(else_bodies, vec![false, true]);
    }

    #[test]
    fn else_must_share_parent_with_if() {
        let structure = Structure::new(vec![
            if_line("a", var("x"), Operator::Lt, Token::number("1")),
            else_line("e").with_parent("a", 1),
        ]);
        let program = parse(&structure).expect("parse");
        assert_eq!(
            program.statements,
            vec![Statement::Conditional {
                condition: Expression::binary(
                    BinaryOperator::Lt,
                    Expression::Variable("x".to_string()),
                    Expression::Literal(Literal::number(1)),
                ),
                then_body: vec![],
                else_body: None,
            }]
        );
    }

    #[test]
    fn nested_if_inside_then_body_matches_its_own_else() {
        let structure = Structure::new(vec![
            if_line("outer", var("x"), Operator::Gt, Token::number("0")),
            if_line("inner", var("y"), Operator::Gt, Token::number("0")).with_parent("outer", 1),
            assign("a", "p", Token::color("red")).with_parent("inner", 2),
            else_line("inner-else").with_parent("outer", 1),
            assign("b", "p", Token::color("blue")).with_parent("inner-else", 2),
        ]);
        let program = parse(&structure).expect("parse nested");
        let Statement::Conditional {
            then_body,
            else_body,
            ..
        } = &program.statements[0]
        else {
            panic!("expected conditional");
        };
        assert!(else_body.is_none());
        assert_eq!(then_body.len(), 1);
        assert!(matches!(
            &then_body[0],
            Statement::Conditional { else_body: Some(body), .. } if body == &vec![assign_color("p", "blue")]
        ));
    }

    #[test]
    fn stray_else_and_empty_lines_are_skipped() {
        let structure = Structure::new(vec![
            Line::blank("empty"),
            else_line("stray"),
            assign("a", "p", Token::color("red")),
        ]);
        let program = parse(&structure).expect("parse");
        assert_eq!(program.statements, vec![assign_color("p", "red")]);
    }

    #[test]
    fn collects_every_line_error() {
        let structure = Structure::new(vec![
            Line::new("a", [var("p"), Operator::Assign.into()]),
            Line::new("b", [Token::color("red"), Operator::Assign.into(), var("x")]),
            Line::new("c", [Keyword::If.into(), var("x"), Operator::Add.into(), var("y")]),
            Line::new("d", [Keyword::If.into(), var("x")]),
            Line::new("e", [var("p"), Token::color("red")]),
            Line::new("f", [Token::number("3")]),
            assign("g", "p", Token::number("3a")),
        ]);
        let errors = parse(&structure).expect_err("parse should fail");
        let summary = errors
            .iter()
            .map(|err| (err.line_index, err.category, err.message.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            summary,
            vec![
                (0, ParseErrorCategory::Syntax, "missing value"),
                (1, ParseErrorCategory::Semantic, "invalid assignment target"),
                (
                    2,
                    ParseErrorCategory::Syntax,
                    "invalid condition: `+` is not a comparison operator"
                ),
                (
                    3,
                    ParseErrorCategory::Syntax,
                    "invalid condition: expected `if <value> <comparison> <value>`"
                ),
                (4, ParseErrorCategory::Syntax, "missing `=` operator"),
                (5, ParseErrorCategory::Syntax, "unrecognized line pattern"),
                (6, ParseErrorCategory::Syntax, "invalid number: `3a`"),
            ]
        );
    }

    #[test]
    fn errors_serialize_with_lowercase_category() {
        let structure = Structure::new(vec![Line::new(
            "a",
            [var("p"), Operator::Assign.into()],
        )]);
        let errors = parse(&structure).expect_err("parse should fail");
        insta::assert_json_snapshot!(errors, @r###"
        [
          {
            "line_index": 0,
            "line_id": "a",
            "message": "missing value",
            "category": "syntax"
          }
        ]
        "###);
    }

    #[test]
    fn arithmetic_assignment_builds_binary_value() {
        let structure = Structure::new(vec![Line::new(
            "a",
            [
                var("a"),
                Operator::Assign.into(),
                var("x"),
                Operator::Mod.into(),
                Token::number("2"),
            ],
        )]);
        let program = parse(&structure).expect("parse");
        assert_eq!(
            program.statements,
            vec![Statement::Assignment {
                target: "a".to_string(),
                value: Expression::binary(
                    BinaryOperator::Mod,
                    Expression::Variable("x".to_string()),
                    Expression::Literal(Literal::number(2)),
                ),
            }]
        );
    }

    #[test]
    fn trailing_tokens_after_value_are_rejected() {
        let structure = Structure::new(vec![
            Line::new(
                "a",
                [var("p"), Operator::Assign.into(), var("x"), var("y")],
            ),
            Line::new(
                "b",
                [var("p"), Operator::Assign.into(), var("x"), Operator::Lt.into(), var("y")],
            ),
        ]);
        let errors = parse(&structure).expect_err("parse should fail");
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .all(|err| err.message == "unexpected token after value"));
    }

    #[test]
    fn cyclic_parents_terminate() {
        let structure = Structure::new(vec![
            if_line("a", var("x"), Operator::Eq, Token::number("0")).with_parent("b", 1),
            if_line("b", var("y"), Operator::Eq, Token::number("0")).with_parent("a", 1),
            if_line("self", var("x"), Operator::Eq, Token::number("1")).with_parent("self", 1),
        ]);
        let program = parse(&structure).expect("parse cyclic structure");
        assert_eq!(program.statements.len(), 2);
    }

    #[test]
    fn dangling_parent_is_parsed_at_top_level() {
        let structure = Structure::new(vec![
            assign("a", "p", Token::color("green")).with_parent("ghost", 1),
        ]);
        let program = parse(&structure).expect("parse");
        assert_eq!(program.statements, vec![assign_color("p", "green")]);
    }

    #[test]
    fn children_of_a_broken_if_are_still_checked() {
        let structure = Structure::new(vec![
            Line::new("c", [Keyword::If.into(), var("x")]),
            Line::new("t", [var("p"), Operator::Assign.into()]).with_parent("c", 1),
        ]);
        let errors = parse(&structure).expect_err("parse should fail");
        assert_eq!(
            errors.iter().map(|err| err.line_id.as_str()).collect::<Vec<_>>(),
            vec!["c", "t"]
        );
    }
}
