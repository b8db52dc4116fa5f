pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "siteline",
    about = "Siteline operator CLI",
    long_about = "Operate the Siteline lifecycle engine: migrations, demo fixtures, readiness checks, and transition-table inspection.",
    after_help = "Examples:\n  siteline doctor --json\n  siteline migrate\n  siteline transitions work-orders"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic lifecycle demo fixtures and verify their contract")]
    Seed,
    #[command(about = "Validate config, transition tables, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Print the authoritative transition tables, optionally for one resource")]
    Transitions {
        #[arg(help = "Resource slug (e.g. work-orders); omit for all entity types")]
        resource: Option<String>,
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Transitions { resource, json } => {
            commands::transitions::run(resource.as_deref(), json)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
