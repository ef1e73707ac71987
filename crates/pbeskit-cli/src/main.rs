//! Command-line interface for the pbeskit PBES instantiation toolkit.

use clap::{Parser, Subcommand, ValueEnum};
use miette::Diagnostic;
use pbeskit_cli::schema::{load, BesDoc, InputDoc, SchemaError};
use pbeskit_instantiate::{
    EnumErrorFallback, InstantiateConfig, InstantiationError, Instantiator, Strategy,
};
use pbeskit_rewrite::RewriteStrategy;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    #[error("failed to read file: {message}")]
    IoError { message: String },

    #[error("parse error: {message}")]
    #[diagnostic(code(pbeskit::parse_error))]
    ParseError { message: String },

    #[error("input error: {0}")]
    #[diagnostic(code(pbeskit::input_error))]
    SchemaError(#[from] SchemaError),

    #[error("instantiation error: {0}")]
    #[diagnostic(code(pbeskit::instantiation_error))]
    InstantiationError(#[from] InstantiationError),

    #[error("{message}")]
    Other { message: String },
}

type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "pbeskit", version)]
#[command(about = "PBES to BES instantiation toolkit", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, ValueEnum)]
enum StrategyArg {
    #[default]
    Lazy,
    Finite,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, ValueEnum)]
enum OnEnumErrorArg {
    #[default]
    Keep,
    Drop,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, ValueEnum)]
enum FormatArg {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Instantiate a PBES into a ground BES
    Instantiate {
        /// Input file (JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Write output to file instead of stdout
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,

        /// Instantiation strategy
        #[arg(long, value_enum, default_value_t = StrategyArg::Lazy)]
        strategy: StrategyArg,

        /// Rewrite strategy (innermost, jitty, ...)
        #[arg(long, default_value = "innermost")]
        rewriter: String,

        /// Maximum yields per quantifier occurrence (0 = unlimited)
        #[arg(long, default_value = "0")]
        enum_bound: usize,

        /// What to do with an equation whose quantifier cannot be expanded
        #[arg(long, value_enum, default_value_t = OnEnumErrorArg::Keep)]
        on_enum_error: OnEnumErrorArg,

        /// Do not fail when the initial instantiation cannot be resolved
        #[arg(long)]
        ignore_initial_state: bool,

        /// Output format
        #[arg(long, value_enum, default_value_t = FormatArg::Text)]
        format: FormatArg,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show the equations and sorts of a PBES without instantiating it
    Info {
        /// Input file (JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

fn main() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .build(),
        )
    }))
    .ok();

    let cli = Cli::parse();

    let filter = if matches!(&cli.command, Commands::Instantiate { verbose: true, .. }) {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    let result = match cli.command {
        Commands::Instantiate {
            file,
            output,
            strategy,
            rewriter,
            enum_bound,
            on_enum_error,
            ignore_initial_state,
            format,
            verbose: _,
        } => cmd_instantiate(
            &file,
            output.as_ref(),
            strategy,
            &rewriter,
            enum_bound,
            on_enum_error,
            ignore_initial_state,
            format,
        ),
        Commands::Info { file } => cmd_info(&file),
    };

    if let Err(e) = result {
        eprintln!("{:?}", miette::Report::new(e));
        std::process::exit(1);
    }
}

fn read_doc(file: &PathBuf) -> CliResult<InputDoc> {
    let source = fs::read_to_string(file).map_err(|e| CliError::IoError {
        message: e.to_string(),
    })?;
    serde_json::from_str(&source).map_err(|e| CliError::ParseError {
        message: e.to_string(),
    })
}

#[allow(clippy::too_many_arguments)]
fn cmd_instantiate(
    file: &PathBuf,
    output: Option<&PathBuf>,
    strategy: StrategyArg,
    rewriter: &str,
    enum_bound: usize,
    on_enum_error: OnEnumErrorArg,
    ignore_initial_state: bool,
    format: FormatArg,
) -> CliResult<()> {
    let rewrite_strategy: RewriteStrategy =
        rewriter.parse().map_err(|e: pbeskit_rewrite::StrategyParseError| {
            CliError::Other {
                message: e.to_string(),
            }
        })?;

    let doc = read_doc(file)?;
    let mut loaded = load(&doc, rewrite_strategy)?;

    let config = InstantiateConfig {
        strategy: match strategy {
            StrategyArg::Lazy => Strategy::Lazy,
            StrategyArg::Finite => Strategy::Finite,
        },
        enum_bound: (enum_bound > 0).then_some(enum_bound),
        on_enum_error: match on_enum_error {
            OnEnumErrorArg::Keep => EnumErrorFallback::KeepSymbolic,
            OnEnumErrorArg::Drop => EnumErrorFallback::DropEquation,
        },
        ignore_initial_state,
    };

    info!(
        equations = loaded.pbes.equations.len(),
        rules = loaded.rewriter.rule_count(),
        "instantiating"
    );
    let start = Instant::now();
    let inst = Instantiator::new(&loaded.spec, &loaded.rewriter, config);
    let bes = inst.run(&mut loaded.pool, &mut loaded.idgen, &loaded.pbes)?;
    info!(
        equations = bes.equations.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "done"
    );

    let rendered = match format {
        FormatArg::Text => bes.to_text(&loaded.pool),
        FormatArg::Json => {
            let doc = BesDoc::from_bes(&loaded.pool, &bes);
            serde_json::to_string_pretty(&doc).map_err(|e| CliError::Other {
                message: e.to_string(),
            })?
        }
    };

    match output {
        Some(path) => {
            fs::write(path, &rendered).map_err(|e| CliError::IoError {
                message: e.to_string(),
            })?;
            println!("wrote {} equations to {}", bes.equations.len(), path.display());
        }
        None => print!("{}", rendered),
    }

    Ok(())
}

fn cmd_info(file: &PathBuf) -> CliResult<()> {
    let doc = read_doc(file)?;
    let loaded = load(&doc, RewriteStrategy::default())?;

    for sort in &doc.sorts {
        let finite = loaded
            .spec
            .lookup(&sort.name)
            .map(|id| loaded.spec.is_certainly_finite(id))
            .unwrap_or(false);
        println!(
            "sort {} ({} constructors{})",
            sort.name,
            sort.constructors.len(),
            if finite { ", finite" } else { "" }
        );
    }
    println!("{} rewrite rules", loaded.rewriter.rule_count());
    for eq in &loaded.pbes.equations {
        let params: Vec<&str> = eq
            .var
            .params
            .iter()
            .map(|p| loaded.pool.symbol_name(p.name))
            .collect();
        println!(
            "{} {}({})",
            eq.fixpoint,
            loaded.pool.symbol_name(eq.var.name),
            params.join(", ")
        );
    }
    println!("init {}", loaded.pool.expr_to_string(&loaded.pbes.initial));

    Ok(())
}
