//! lockstep CLI - Command-line interface
//!
//! This binary provides a command-line interface to the lockstep library.
//! Every command builds a tree of work units, hands it to a root host, and
//! maps the end state of the tree to an exit code.

mod commands;
mod error;
mod runner;
mod ui;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::estimate::EstimateArgs;
use commands::keystore::KeystoreCommands;
use commands::wordlist::WordlistCommands;
use error::CliError;
use runner::CliRunner;

#[derive(Parser)]
#[command(name = "lockstep")]
#[command(version = lockstep::VERSION)]
#[command(about = "Keystore and wordlist tooling on a bounded task orchestrator", long_about = None)]
struct Cli {
    /// Enable debug logging regardless of RUST_LOG
    #[arg(long, global = true)]
    debug: bool,

    /// Maximum number of units running at once (default: from config)
    #[arg(long, global = true, value_name = "N")]
    max_concurrent: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate how long brute-forcing a keystore would take
    Estimate(EstimateArgs),

    /// Inspect keystores
    #[command(subcommand)]
    Keystore(KeystoreCommands),

    /// Download, verify, and query wordlists
    #[command(subcommand)]
    Wordlist(WordlistCommands),

    /// View and modify configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = dispatch(cli).await {
        e.exit();
    }
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let runner = || CliRunner::new(cli.debug, cli.max_concurrent);

    match cli.command {
        // Config commands work on the file directly and skip logging setup
        Commands::Config(command) => commands::config::run(command),
        Commands::Estimate(args) => commands::estimate::run(&runner()?, args).await,
        Commands::Keystore(command) => commands::keystore::run(&runner()?, command).await,
        Commands::Wordlist(command) => commands::wordlist::run(&runner()?, command).await,
    }
}
