//! `termlattice` command-line frontend: loads a module in the textual IR
//! format of [`termlattice::ir::text`] and runs the bounded-termination
//! analysis over it, printing results in spec's paragraph format.
//!
//! Subcommand/format names (`print<bounded-termination>`,
//! `print<function-bounded-termination>`) are kept as the CLI's own
//! identifiers so output can be traced back to the analysis names even
//! though there is no pass-manager pipeline behind them here.

use std::fs;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use termlattice::ir::{text, CallGraph, IdentityDemangler};
use termlattice::module::ModuleAnalyzer;
use termlattice::printer;
use thiserror::Error;

#[derive(Parser)]
#[command(name = "termlattice")]
#[command(about = "Bounded-termination analysis over a textual IR module", long_about = None)]
struct Args {
    /// Path to a module in the textual IR format.
    path: PathBuf,

    /// Analyze only this function (`print<function-bounded-termination>`),
    /// instead of the whole module.
    #[arg(long)]
    function: Option<String>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Increase log verbosity (`-v` for debug, `-vv` for trace).
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    /// `print<bounded-termination>`: the spec's plain-text paragraph format.
    Text,
    /// Call graph annotated with verdicts, as Graphviz `dot`.
    #[cfg(feature = "graph")]
    Dot,
}

/// Failure modes for the CLI itself. The analysis core has no error
/// conditions of its own (spec.md §7) — everything here is I/O or input
/// shape, surfaced to a human rather than absorbed into the lattice.
#[derive(Debug, Error)]
enum CliError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Parse(#[from] text::IrParseError),
    #[error("no function named {0:?} in this module")]
    FunctionNotFound(String),
}

fn main() -> Result<(), CliError> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(log_level).init();

    let source = fs::read_to_string(&args.path).map_err(|source| CliError::Io {
        path: args.path.clone(),
        source,
    })?;
    let module = text::parse_module(&source)?;

    if let Some(name) = &args.function {
        let target = module
            .functions()
            .into_iter()
            .find(|&f| module.function(f).name() == name)
            .ok_or_else(|| CliError::FunctionNotFound(name.clone()))?;
        let outcome = termlattice::function::FunctionAnalyzer.analyze(module.function(target));
        print!("{}", printer::format_function_result(name, &outcome));
        return Ok(());
    }

    let results = ModuleAnalyzer.analyze(
        &module,
        |f| module.function(f).clone(),
        &IdentityDemangler,
    );

    match args.format {
        Format::Text => {
            let text = printer::format_module_results(
                &results,
                |f| module.function(f).name().to_owned(),
                &IdentityDemangler,
            );
            print!("{text}");
        }
        #[cfg(feature = "graph")]
        Format::Dot => {
            let dot = printer::format_call_graph_dot(
                &module,
                &results,
                |f| module.function(f).name().to_owned(),
                &IdentityDemangler,
            );
            print!("{dot}");
        }
    }

    Ok(())
}
