//! CLI argument definitions and command handlers.

pub mod status;
pub mod submit;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "wloom", version, about = "Workloom durable execution engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit machine-readable JSON output
    #[arg(long, global = true)]
    pub json: bool,

    /// Bridge tracing spans to OpenTelemetry (stdout exporter)
    #[arg(long, global = true)]
    pub otel: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port to listen on (overrides config.toml)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind (overrides config.toml)
        #[arg(long)]
        host: Option<String>,

        /// Also run the worker pools inside this process
        #[arg(long)]
        with_workers: bool,
    },

    /// Run the activity and workflow worker pools
    Work,

    /// Start a hash workflow for a local file
    Submit {
        /// Path of the file to hash
        file: std::path::PathBuf,

        /// Comma-separated algorithms (defaults to all five)
        #[arg(short, long, value_delimiter = ',')]
        algorithms: Vec<String>,

        /// Poll until the workflow finishes, then print the result
        #[arg(short, long)]
        wait: bool,
    },

    /// Show a workflow's status, or list recent workflows
    Status {
        /// Workflow instance id (lists recent instances when omitted)
        workflow_id: Option<Uuid>,

        /// Maximum number of instances to list
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}
