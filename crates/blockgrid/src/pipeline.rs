use rayon::ThreadPool;
use serde::Serialize;
use tracing::info;

use crate::evaluator::{self, blank_grid, CellError, Evaluation, Grid, GridSize};
use crate::parser::{self, ParseError};
use crate::token::Structure;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    pub success: bool,
    pub grid: Grid,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parse_errors: Vec<ParseError>,
    pub runtime_errors: Vec<CellError>,
}

impl RunOutcome {
    fn parse_failure(size: GridSize, parse_errors: Vec<ParseError>) -> Self {
        info!(errors = parse_errors.len(), "Parsing failed; skipping evaluation");
        Self {
            success: false,
            grid: blank_grid(size),
            parse_errors,
            runtime_errors: vec![],
        }
    }

    fn evaluated(evaluation: Evaluation) -> Self {
        let success = evaluation.success();
        info!(
            success,
            runtime_errors = evaluation.errors.len(),
            "Grid evaluated"
        );
        Self {
            success,
            grid: evaluation.grid,
            parse_errors: vec![],
            runtime_errors: evaluation.errors,
        }
    }
}

/// Parses `structure` and, only if that succeeds, evaluates it over the grid.
pub fn run(structure: &Structure, size: GridSize) -> RunOutcome {
    match parser::parse(structure) {
        Ok(program) => RunOutcome::evaluated(evaluator::evaluate(&program, size)),
        Err(errors) => RunOutcome::parse_failure(size, errors),
    }
}

pub fn run_with_pool(structure: &Structure, size: GridSize, pool: &ThreadPool) -> RunOutcome {
    match parser::parse(structure) {
        Ok(program) => {
            RunOutcome::evaluated(evaluator::evaluate_parallel(&program, size, pool))
        }
        Err(errors) => RunOutcome::parse_failure(size, errors),
    }
}
