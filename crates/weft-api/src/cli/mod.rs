//! CLI command definitions for the `weft` binary.
//!
//! Uses clap derive macros for argument parsing. Workflow-level commands
//! live in [`workflow`], execution-level commands in [`execution`].

pub mod execution;
pub mod workflow;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

/// Run and inspect workflow executions.
#[derive(Parser)]
#[command(name = "weft", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check a workflow spec file without running it.
    Validate {
        /// Path to a JSON or YAML workflow spec.
        file: PathBuf,
    },

    /// Run a workflow from a spec file or by registered name.
    Run {
        /// Spec file path, registered workflow name, or workflow UUID.
        target: String,

        /// JSON object layered over the workflow's variables.
        #[arg(long)]
        input: Option<String>,

        /// Single variable override (`key=value`, value parsed as JSON when possible).
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,
    },

    /// Register (or update) a workflow definition from a spec file.
    Register {
        /// Path to a JSON or YAML workflow spec.
        file: PathBuf,
    },

    /// List registered workflows.
    #[command(alias = "ls")]
    List,

    /// Delete a registered workflow.
    #[command(alias = "rm")]
    Delete {
        /// Workflow name or UUID.
        name: String,
    },

    /// Export a registered workflow as a spec document.
    Export {
        /// Workflow name or UUID.
        name: String,

        /// Output format.
        #[arg(long, value_enum, default_value_t = ExportFormat::Yaml)]
        format: ExportFormat,

        /// Write to a file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show recent executions, optionally for one workflow.
    History {
        /// Workflow name or UUID.
        workflow: Option<String>,

        /// Maximum number of executions to display.
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Show the state of one execution.
    Status {
        /// Execution UUID.
        execution_id: String,
    },

    /// Continue a paused execution.
    Resume {
        /// Execution UUID.
        execution_id: String,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Yaml,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_accepts_input_and_vars() {
        let cli = Cli::try_parse_from([
            "weft", "run", "nightly", "--input", r#"{"a":1}"#, "--var", "b=2", "--var", "c=x",
        ])
        .unwrap();
        match cli.command {
            Commands::Run { target, input, vars } => {
                assert_eq!(target, "nightly");
                assert_eq!(input.as_deref(), Some(r#"{"a":1}"#));
                assert_eq!(vars, vec!["b=2", "c=x"]);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn export_defaults_to_yaml() {
        let cli = Cli::try_parse_from(["weft", "export", "nightly", "--json"]).unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Export { format, output, .. } => {
                assert_eq!(format, ExportFormat::Yaml);
                assert!(output.is_none());
            }
            _ => panic!("expected export"),
        }
    }
}
