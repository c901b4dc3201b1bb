//! Co-expresselog worker main executable.

pub mod artifact;
pub mod clique;
pub mod common;
pub mod config;
pub mod error;
pub mod input;
pub mod network;
pub mod pair;
pub mod pipeline;
pub mod summary;

use clap::{Args as ClapArgs, Parser, Subcommand};
use console::{Emoji, Term};

/// CLI parser based on clap.
#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Co-expresselog discovery heavy lifting",
    long_about = "This tool performs the heavy lifting for cross-species co-expression \
                  conservation analysis: per-species network construction, pairwise \
                  conservation testing, and clique aggregation"
)]
struct Cli {
    /// Commonly used arguments
    #[command(flatten)]
    common: common::Args,

    /// The sub command to run
    #[command(subcommand)]
    command: Commands,
}

/// Enum supporting the parsing of top-level commands.
#[allow(clippy::large_enum_variant)]
#[derive(Debug, Subcommand)]
enum Commands {
    /// Species-network related commands.
    Network(Network),
    /// Species-pair related commands.
    Pair(Pair),
    /// Clique related commands.
    Clique(Clique),
    /// Full-pipeline related commands.
    Pipeline(Pipeline),
}

/// Parsing of "network *" sub commands.
#[derive(Debug, ClapArgs)]
#[command(args_conflicts_with_subcommands = true)]
struct Network {
    /// The sub command to run
    #[command(subcommand)]
    command: NetworkCommands,
}

/// Enum supporting the parsing of "network *" sub commands.
#[derive(Debug, Subcommand)]
enum NetworkCommands {
    Build(network::Args),
}

/// Parsing of "pair *" sub commands.
#[derive(Debug, ClapArgs)]
#[command(args_conflicts_with_subcommands = true)]
struct Pair {
    /// The sub command to run
    #[command(subcommand)]
    command: PairCommands,
}

/// Enum supporting the parsing of "pair *" sub commands.
#[derive(Debug, Subcommand)]
enum PairCommands {
    Compare(pair::Args),
}

/// Parsing of "clique *" sub commands.
#[derive(Debug, ClapArgs)]
#[command(args_conflicts_with_subcommands = true)]
struct Clique {
    /// The sub command to run
    #[command(subcommand)]
    command: CliqueCommands,
}

/// Enum supporting the parsing of "clique *" sub commands.
#[derive(Debug, Subcommand)]
enum CliqueCommands {
    Aggregate(clique::Args),
}

/// Parsing of "pipeline *" sub commands.
#[derive(Debug, ClapArgs)]
#[command(args_conflicts_with_subcommands = true)]
struct Pipeline {
    /// The sub command to run
    #[command(subcommand)]
    command: PipelineCommands,
}

/// Enum supporting the parsing of "pipeline *" sub commands.
#[derive(Debug, Subcommand)]
enum PipelineCommands {
    Run(pipeline::Args),
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Build a tracing subscriber according to the configuration in `cli.common`.
    let collector = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(match cli.common.verbose.log_level() {
            Some(level) => match level {
                log::Level::Error => tracing::Level::ERROR,
                log::Level::Warn => tracing::Level::WARN,
                log::Level::Info => tracing::Level::INFO,
                log::Level::Debug => tracing::Level::DEBUG,
                log::Level::Trace => tracing::Level::TRACE,
            },
            None => tracing::Level::INFO,
        })
        .compact()
        .finish();

    // Install collector and go into sub commands.
    let term = Term::stderr();
    tracing::subscriber::with_default(collector, || {
        match &cli.command {
            Commands::Network(network) => match &network.command {
                NetworkCommands::Build(args) => network::run(&cli.common, args)?,
            },
            Commands::Pair(pair) => match &pair.command {
                PairCommands::Compare(args) => pair::run(&cli.common, args)?,
            },
            Commands::Clique(clique) => match &clique.command {
                CliqueCommands::Aggregate(args) => clique::run(&cli.common, args)?,
            },
            Commands::Pipeline(pipeline) => match &pipeline.command {
                PipelineCommands::Run(args) => pipeline::run(&cli.common, args)?,
            },
        }

        Ok::<(), anyhow::Error>(())
    })?;
    term.write_line(&format!("All done. Have a nice day!{}", Emoji(" 😃", "")))?;

    Ok(())
}
