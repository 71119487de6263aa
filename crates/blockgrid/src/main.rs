use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use blockgrid::diagnostics::{
    diagnostic_from_anyhow, Diagnostic, DiagnosticBundle, DiagnosticStage,
};
use blockgrid::registry::BlockRegistry;
use blockgrid::snapshot::{self, Snapshot};
use blockgrid::token::Structure;
use blockgrid::{parse, run, run_with_pool, Grid, GridSize, RunOutcome};
use clap::Parser;
use rayon::ThreadPoolBuilder;
use tracing::{debug, info, trace, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

fn main() -> anyhow::Result<()> {
    initialize_logging();

    let blockgrid = Blockgrid::parse();

    match blockgrid.subcmd {
        BlockgridSubcommand::Run(opts) => run_snapshot(opts),
        BlockgridSubcommand::Parse(opts) => parse_snapshot(opts),
        BlockgridSubcommand::Blocks => print_blocks(),
    }
}

fn run_snapshot(opts: RunOpts) -> anyhow::Result<()> {
    let structure = load_structure(&opts.snapshot)?;
    let size = GridSize::new(opts.width, opts.height);

    let outcome = match opts.threads {
        Some(threads) => {
            let pool = ThreadPoolBuilder::new().num_threads(threads).build()?;
            debug!(threads, "Evaluating on a thread pool");
            run_with_pool(&structure, size, &pool)
        }
        None => run(&structure, size),
    };

    let outcome_path = match write_outcome(&outcome, &opts.out) {
        Ok(path) => path,
        Err(diagnostic) => {
            eprintln!(
                "{}",
                DiagnosticBundle::single(diagnostic).render_terminal_auto()
            );
            anyhow::bail!("could not write the run outcome to {}", opts.out.display());
        }
    };
    info!(outcome_path = %outcome_path.display(), "Run outcome written");

    println!("{}", render_grid(&outcome.grid));
    report_failures(&outcome, &structure, &opts.snapshot)
}

fn write_outcome(outcome: &RunOutcome, out: &Path) -> Result<PathBuf, Diagnostic> {
    let write = || -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(out)
            .with_context(|| format!("failed to create {}", out.display()))?;
        let path = out.join("outcome.json");
        std::fs::write(&path, serde_json::to_string_pretty(outcome)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    };
    write().map_err(|err| {
        diagnostic_from_anyhow(
            DiagnosticStage::Io,
            "BG-IO-001",
            "could not write run outcome",
            &err,
        )
    })
}

fn report_failures(
    outcome: &RunOutcome,
    structure: &Structure,
    snapshot_path: &Path,
) -> anyhow::Result<()> {
    if outcome.success {
        return Ok(());
    }

    let bundle = DiagnosticBundle::from_outcome(outcome, structure, Some(snapshot_path));
    eprintln!("{}", bundle.render_terminal_auto());
    Err(anyhow::anyhow!(
        "run failed with {} parse error(s) and {} runtime error(s)",
        outcome.parse_errors.len(),
        outcome.runtime_errors.len()
    ))
}

fn parse_snapshot(opts: ParseOpts) -> anyhow::Result<()> {
    let structure = load_structure(&opts.snapshot)?;

    match parse(&structure) {
        Ok(program) => {
            println!("{}", serde_json::to_string_pretty(&program)?);
            Ok(())
        }
        Err(errors) => {
            let outcome = RunOutcome {
                success: false,
                grid: Grid::new(),
                parse_errors: errors,
                runtime_errors: vec![],
            };
            report_failures(&outcome, &structure, &opts.snapshot)
        }
    }
}

fn print_blocks() -> anyhow::Result<()> {
    let registry = BlockRegistry::standard();
    println!("{}", serde_json::to_string_pretty(&registry)?);
    Ok(())
}

fn load_structure(path: &Path) -> anyhow::Result<Structure> {
    let structure = snapshot::load(path)
        .and_then(Snapshot::into_structure)
        .with_context(|| format!("failed to load snapshot {}", path.display()));

    let structure = match structure {
        Ok(structure) => structure,
        Err(err) => {
            let diagnostic = diagnostic_from_anyhow(
                DiagnosticStage::Snapshot,
                "BG-SNAPSHOT-001",
                "could not prepare structure",
                &err,
            );
            eprintln!(
                "{}",
                DiagnosticBundle::single(diagnostic).render_terminal_auto()
            );
            anyhow::bail!("could not load snapshot {}", path.display());
        }
    };
    trace!(lines = structure.lines.len(), "Loaded snapshot");

    for block in BlockRegistry::standard().unknown_tokens(&structure) {
        warn!(
            line_index = block.line_index,
            slot = block.slot,
            kind = block.token.kind_name(),
            token = %block.token,
            "Token is not part of the block catalog"
        );
    }

    Ok(structure)
}

fn render_grid(grid: &Grid) -> String {
    grid.iter()
        .map(|row| {
            row.iter()
                .map(|pixel| pixel.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn initialize_logging() {
    let env_filter = env::var("RUST_LOG").unwrap_or_default();
    let env_filter = EnvFilter::from_str(&env_filter).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_filter(env_filter))
        .init();
}

#[derive(clap::Parser)]
#[clap(name = "blockgrid", about = "Parse and evaluate block programs over a grid.")]
struct Blockgrid {
    #[clap(subcommand)]
    subcmd: BlockgridSubcommand,
}

#[derive(clap::Subcommand)]
enum BlockgridSubcommand {
    /// Parse a snapshot and evaluate it over a grid
    Run(RunOpts),
    /// Parse a snapshot and print its syntax tree
    Parse(ParseOpts),
    /// Print the catalog of placeable blocks
    Blocks,
}

#[derive(clap::Parser, Debug)]
struct RunOpts {
    /// Path to the snapshot JSON file
    snapshot: PathBuf,

    /// Grid width in cells
    #[clap(long, default_value_t = 10)]
    width: usize,

    /// Grid height in cells
    #[clap(long, default_value_t = 10)]
    height: usize,

    /// Evaluate rows on a pool with this many threads
    #[clap(short, long)]
    threads: Option<usize>,

    /// Directory for the JSON outcome
    #[clap(short, long, default_value = "target/blockgrid")]
    out: PathBuf,
}

#[derive(clap::Parser, Debug)]
struct ParseOpts {
    /// Path to the snapshot JSON file
    snapshot: PathBuf,
}
