use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;

#[derive(Debug, Parser)]
#[command(name = "proofgen-cli")]
#[command(about = "Offline tools for Chainpoint v3 proof files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Schema-validate a proof and print the value each anchor commits to.
    Verify(cmd::verify::VerifyArgs),
    /// Print the proof header and branch outline.
    Inspect(cmd::inspect::InspectArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Verify(args) => cmd::verify::run(args)?,
        Command::Inspect(args) => cmd::inspect::run(args)?,
    }

    Ok(())
}
