use std::collections::HashMap;
use std::fmt;
use std::io::IsTerminal;
use std::ops::Range;
use std::path::Path;

use ariadne::{sources, Config, Label, Report, ReportKind};

use crate::evaluator::CellError;
use crate::parser::{ParseError, ParseErrorCategory};
use crate::pipeline::RunOutcome;
use crate::token::Structure;

const INDENT: &str = "    ";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiagnosticStage {
    Snapshot,
    Parse,
    Evaluate,
    Io,
}

impl fmt::Display for DiagnosticStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagnosticStage::Snapshot => "snapshot",
            DiagnosticStage::Parse => "parse",
            DiagnosticStage::Evaluate => "evaluate",
            DiagnosticStage::Io => "io",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceLabel {
    pub file_id: String,
    pub span: Range<usize>,
    pub message: String,
}

#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub code: String,
    pub stage: DiagnosticStage,
    pub message: String,
    pub labels: Vec<SourceLabel>,
    pub notes: Vec<String>,
    pub help: Option<String>,
    pub sources: HashMap<String, String>,
}

impl Diagnostic {
    pub fn new(
        code: impl Into<String>,
        stage: DiagnosticStage,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            stage,
            message: message.into(),
            labels: Vec::new(),
            notes: Vec::new(),
            help: None,
            sources: HashMap::new(),
        }
    }

    pub fn with_source(mut self, file_id: impl Into<String>, source: impl Into<String>) -> Self {
        self.sources.insert(file_id.into(), source.into());
        self
    }

    pub fn with_label(
        mut self,
        file_id: impl Into<String>,
        span: Range<usize>,
        message: impl Into<String>,
    ) -> Self {
        self.labels.push(SourceLabel {
            file_id: file_id.into(),
            span,
            message: message.into(),
        });
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn render_plain(&self) -> String {
        self.render_with_color(false)
    }

    fn render_with_color(&self, use_color: bool) -> String {
        // ariadne prints only the header of a report without labels.
        let Some(primary) = self.labels.first() else {
            return self.fallback_render();
        };

        let mut report = Report::build(
            ReportKind::Error,
            (primary.file_id.clone(), sanitize_span(&primary.span)),
        )
        .with_code(self.code.clone())
        .with_message(format!(
            "error[{}:{}]: {}",
            self.stage, self.code, self.message
        ))
        .with_config(Config::default().with_color(use_color));

        for label in &self.labels {
            report = report.with_label(
                Label::new((label.file_id.clone(), sanitize_span(&label.span)))
                    .with_message(label.message.clone()),
            );
        }

        for note in &self.notes {
            report = report.with_note(note.clone());
        }

        if let Some(help) = &self.help {
            report = report.with_help(help.clone());
        }

        let mut source_entries = self
            .sources
            .iter()
            .map(|(id, src)| (id.clone(), src.clone()))
            .collect::<Vec<_>>();
        if !self.sources.contains_key(&primary.file_id) {
            source_entries.push((primary.file_id.clone(), String::new()));
        }

        let mut output = Vec::new();
        match report.finish().write(sources(source_entries), &mut output) {
            Ok(()) => String::from_utf8_lossy(&output).trim_end().to_string(),
            Err(_) => self.fallback_render(),
        }
    }

    fn fallback_render(&self) -> String {
        let mut out = format!("error[{}:{}]: {}", self.stage, self.code, self.message);
        for note in &self.notes {
            out.push_str("\nnote: ");
            out.push_str(note);
        }
        if let Some(help) = &self.help {
            out.push_str("\nhelp: ");
            out.push_str(help);
        }
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_plain())
    }
}

#[derive(Clone, Debug, Default)]
pub struct DiagnosticBundle {
    pub diagnostics: Vec<Diagnostic>,
}

impl DiagnosticBundle {
    pub fn single(diagnostic: Diagnostic) -> Self {
        Self {
            diagnostics: vec![diagnostic],
        }
    }

    /// Every parse error of a failed run, or one entry per distinct runtime
    /// failure of an evaluated one.
    pub fn from_outcome(
        outcome: &RunOutcome,
        structure: &Structure,
        source_path: Option<&Path>,
    ) -> Self {
        let file_id = file_id_from_path(source_path);
        if !outcome.parse_errors.is_empty() {
            let listing = StructureListing::new(structure);
            return Self {
                diagnostics: outcome
                    .parse_errors
                    .iter()
                    .map(|error| diagnostic_from_parse_error(error, &listing, &file_id))
                    .collect(),
            };
        }
        Self {
            diagnostics: diagnostics_from_runtime_errors(&outcome.runtime_errors),
        }
    }

    pub fn render_plain(&self) -> String {
        self.render_all(false)
    }

    pub fn render_terminal_auto(&self) -> String {
        self.render_all(std::io::stderr().is_terminal())
    }

    fn render_all(&self, use_color: bool) -> String {
        self.diagnostics
            .iter()
            .map(|diagnostic| diagnostic.render_with_color(use_color))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl fmt::Display for DiagnosticBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_plain())
    }
}

/// A textual rendering of a structure, one text line per structure line,
/// with the character span each line occupies.
#[derive(Clone, Debug)]
pub struct StructureListing {
    pub text: String,
    spans: Vec<Range<usize>>,
}

impl StructureListing {
    pub fn new(structure: &Structure) -> Self {
        let mut text = String::new();
        let mut spans = Vec::with_capacity(structure.lines.len());
        let mut offset = 0;
        for line in &structure.lines {
            let mut rendered = INDENT.repeat(line.indent as usize);
            let tokens = line.tokens().map(|token| token.to_string()).collect::<Vec<_>>();
            rendered.push_str(&tokens.join(" "));

            let start = offset + line.indent as usize * INDENT.len();
            let end = offset + rendered.chars().count();
            spans.push(start..end);

            text.push_str(&rendered);
            text.push('\n');
            offset = end + 1;
        }
        Self { text, spans }
    }

    pub fn span(&self, line_index: usize) -> Range<usize> {
        self.spans
            .get(line_index)
            .cloned()
            .map(|span| sanitize_span(&span))
            .unwrap_or(0..1)
    }
}

pub fn diagnostic_from_parse_error(
    error: &ParseError,
    listing: &StructureListing,
    file_id: &str,
) -> Diagnostic {
    let code = match error.category {
        ParseErrorCategory::Syntax => "BG-PARSE-001",
        ParseErrorCategory::Semantic => "BG-PARSE-002",
    };
    Diagnostic::new(
        code,
        DiagnosticStage::Parse,
        format!("{} error", error.category),
    )
    .with_source(file_id, listing.text.clone())
    .with_label(file_id, listing.span(error.line_index), error.message.clone())
    .with_note(format!(
        "on line {} (id `{}`)",
        error.line_index, error.line_id
    ))
}

/// Groups cell failures by message, keeping first-seen order.
pub fn diagnostics_from_runtime_errors(errors: &[CellError]) -> Vec<Diagnostic> {
    let mut groups: Vec<(&str, usize, &CellError)> = Vec::new();
    for error in errors {
        match groups
            .iter_mut()
            .find(|(message, _, _)| *message == error.message)
        {
            Some((_, count, _)) => *count += 1,
            None => groups.push((error.message.as_str(), 1, error)),
        }
    }

    groups
        .into_iter()
        .map(|(message, count, first)| {
            let diagnostic = Diagnostic::new("BG-EVAL-001", DiagnosticStage::Evaluate, message)
                .with_note(format!(
                    "{count} cell(s) affected, first at x={}, y={}",
                    first.x, first.y
                ));
            if message.starts_with("Undefined variable") {
                diagnostic.with_help("assign the variable before it is read, or use x, y or p")
            } else {
                diagnostic
            }
        })
        .collect()
}

pub fn diagnostic_from_anyhow(
    stage: DiagnosticStage,
    code: impl Into<String>,
    message: impl Into<String>,
    error: &anyhow::Error,
) -> Diagnostic {
    let mut diagnostic = Diagnostic::new(code, stage, message);

    let mut causes = error.chain();
    if let Some(primary) = causes.next() {
        diagnostic.message = format!("{}: {}", diagnostic.message, primary);
    }
    for cause in causes {
        diagnostic = diagnostic.with_note(format!("caused by: {cause}"));
    }

    diagnostic
}

pub fn file_id_from_path(path: Option<&Path>) -> String {
    path.map(|value| value.display().to_string())
        .unwrap_or_else(|| "<memory>".to_string())
}

pub fn sanitize_span(span: &Range<usize>) -> Range<usize> {
    if span.end <= span.start {
        span.start..span.start.saturating_add(1)
    } else {
        span.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::GridSize;
    use crate::pipeline::run;
    use crate::token::{Keyword, Line, Operator, Token};

    fn structure() -> Structure {
        Structure::new(vec![
            Line::new(
                "c",
                [
                    Keyword::If.into(),
                    Token::variable("x"),
                    Operator::Eq.into(),
                    Token::number("1"),
                ],
            ),
            Line::new("t", [Token::variable("p"), Operator::Assign.into()]).with_parent("c", 1),
        ])
    }

    #[test]
    fn listing_spans_cover_rendered_tokens() {
        let structure = structure();
        let listing = StructureListing::new(&structure);
        assert_eq!(listing.text, "if x == 1\n    p =\n");
        let text = listing.text.chars().collect::<Vec<_>>();
        let second = listing.span(1);
        assert_eq!(text[second].iter().collect::<String>(), "p =");
    }

    #[test]
    fn parse_errors_render_with_line_label() {
        let structure = structure();
        let outcome = run(&structure, GridSize::new(1, 1));
        let bundle = DiagnosticBundle::from_outcome(&outcome, &structure, None);
        assert_eq!(bundle.diagnostics.len(), 1);
        let text = bundle.render_plain();
        assert!(text.contains("BG-PARSE-001"));
        assert!(text.contains("missing value"));
        assert!(!text.contains("\u{1b}["));
    }

    #[test]
    fn runtime_errors_are_grouped_by_message() {
        let errors = (0..3)
            .map(|x| CellError {
                x,
                y: 0,
                message: "Undefined variable: q".to_string(),
            })
            .chain([CellError {
                x: 0,
                y: 1,
                message: "Division by zero".to_string(),
            }])
            .collect::<Vec<_>>();
        let diagnostics = diagnostics_from_runtime_errors(&errors);
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].notes, vec!["3 cell(s) affected, first at x=0, y=0"]);
        assert!(diagnostics[0].help.is_some());
        assert!(diagnostics[1].help.is_none());
    }

    #[test]
    fn anyhow_causes_become_notes() {
        let error = anyhow::anyhow!("root cause").context("outer context");
        let diagnostic = diagnostic_from_anyhow(
            DiagnosticStage::Snapshot,
            "BG-SNAPSHOT-001",
            "load failed",
            &error,
        );
        assert_eq!(diagnostic.message, "load failed: outer context");
        assert_eq!(diagnostic.notes, vec!["caused by: root cause"]);
        assert_eq!(
            diagnostic.render_plain(),
            "error[snapshot:BG-SNAPSHOT-001]: load failed: outer context\nnote: caused by: root cause"
        );
    }
}
