mod commands;
mod logging;

use clap::Parser;

use crate::commands::{Commands, RunError};

/// Parallel and blocked Gibbs sampling for Pitman-Yor sequence models.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

fn main() {
    let args = Args::parse();
    if let Err(e) = args.command.logging().setup_logging() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
    match args.command.run() {
        Ok(()) => {}
        Err(RunError::Config(e, usage)) => {
            eprintln!("{}", usage);
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
        Err(RunError::Other(e)) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    }
}
