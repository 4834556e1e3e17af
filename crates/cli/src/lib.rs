pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "concierge",
    about = "Concierge operator CLI",
    long_about = "Operate the property concierge: migrations, demo data, config inspection, readiness checks, and single-turn routing traces.",
    after_help = "Examples:\n  concierge doctor --json\n  concierge seed\n  concierge route --offline \"2 bedroom apartment in Girne under 500\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo listings and knowledge articles, then verify them")]
    Seed {
        #[arg(long, help = "Remove the demo rows instead of loading them")]
        clean: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, LLM and WhatsApp readiness, and database schema")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Route one message and print the intent, decision and reply as JSON")]
    Route {
        #[arg(help = "The user message to route")]
        message: String,
        #[arg(long, default_value = "cli", help = "Conversation to load and update")]
        conversation_id: String,
        #[arg(long, help = "Use heuristics only and never send WhatsApp messages")]
        offline: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed { clean } => commands::seed::run(clean),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Route { message, conversation_id, offline } => {
            commands::route::run(&conversation_id, &message, offline)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
