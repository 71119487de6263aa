//! Structural parsing and per-cell grid evaluation for block-built programs.
//!
//! A program arrives as a flattened [`token::Structure`]. [`parser::parse`]
//! rebuilds its syntax tree, [`evaluator::evaluate`] runs that tree once per
//! grid cell, and [`pipeline::run`] ties the two together.

pub mod ast;
pub mod diagnostics;
pub mod evaluator;
pub mod parser;
pub mod pipeline;
pub mod registry;
pub mod snapshot;
pub mod token;

pub use evaluator::{evaluate, evaluate_parallel, CellError, Evaluation, Grid, GridSize, Pixel};
pub use parser::{parse, ParseError, ParseErrorCategory};
pub use pipeline::{run, run_with_pool, RunOutcome};
