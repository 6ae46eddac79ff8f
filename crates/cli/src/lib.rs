pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "coverly",
    about = "Coverly operator CLI",
    long_about = "Ask coverage questions against a demo user's policy set, inspect effective \
configuration, and run readiness checks.",
    after_help = "Examples:\n  coverly ask --user alice \"Is my car covered if it's stolen?\"\n  coverly ask --user carol \"Is flood damage covered?\" --clarify \"my house\"\n  coverly doctor --json\n  coverly config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run one coverage question through the pipeline and print the outcome")]
    Ask {
        #[arg(help = "The coverage question, in plain English")]
        question: String,
        #[arg(long, default_value = "carol", help = "Demo user whose policy set is in scope")]
        user: String,
        #[arg(long, help = "Answer to a previous clarification prompt; restarts the pipeline")]
        clarify: Option<String>,
        #[arg(long, help = "Emit the full pipeline run as JSON")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, policy documents, and model endpoint readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Ask { question, user, clarify, json } => {
            commands::ask::run(&question, &user, clarify.as_deref(), json)
        }
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
