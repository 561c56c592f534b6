//! Weft CLI entry point.
//!
//! Binary name: `weft`
//!
//! Parses CLI arguments, initializes tracing and the SQLite-backed engine,
//! then dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;
use weft_observe::{TracingOptions, init_tracing, shutdown_tracing, verbosity_filter};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&TracingOptions {
        filter: verbosity_filter(cli.verbose, cli.quiet).to_string(),
        json_logs: cli.log_json,
        otel: cli.otel,
    })
    .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;

    let result = dispatch(cli).await;
    shutdown_tracing();
    result
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    // These don't need app state.
    match &cli.command {
        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            generate(*shell, &mut cmd, "weft", &mut std::io::stdout());
            return Ok(());
        }
        Commands::Validate { file } => {
            return cli::workflow::handle_validate(file, cli.json).await;
        }
        _ => {}
    }

    let state = AppState::init().await?;
    let json = cli.json;

    match cli.command {
        Commands::Run { target, input, vars } => {
            cli::execution::handle_run(&target, input.as_deref(), &vars, &state, json).await?;
        }
        Commands::Register { file } => {
            cli::workflow::handle_register(&file, &state, json).await?;
        }
        Commands::List => {
            cli::workflow::handle_list(&state, json).await?;
        }
        Commands::Delete { name } => {
            cli::workflow::handle_delete(&name, &state, json).await?;
        }
        Commands::Export {
            name,
            format,
            output,
        } => {
            cli::workflow::handle_export(&name, format, output.as_deref(), &state).await?;
        }
        Commands::History { workflow, limit } => {
            cli::execution::handle_history(workflow.as_deref(), limit, &state, json).await?;
        }
        Commands::Status { execution_id } => {
            cli::execution::handle_status(&execution_id, &state, json).await?;
        }
        Commands::Resume { execution_id } => {
            cli::execution::handle_resume(&execution_id, &state, json).await?;
        }
        Commands::Completions { .. } | Commands::Validate { .. } => unreachable!("handled above"),
    }

    Ok(())
}
