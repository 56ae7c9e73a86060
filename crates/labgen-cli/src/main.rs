//! labgen CLI tool.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::OutputFormat;

#[derive(Parser)]
#[command(name = "labgen")]
#[command(about = "Generate home-lab deployment bundles from one configuration", long_about = None)]
struct Cli {
    /// Log at debug level regardless of RUST_LOG
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration document
    Validate {
        /// Path to the configuration file
        #[arg(env = "LABGEN_CONFIG", default_value = "homelab.kdl")]
        path: PathBuf,
    },
    /// Show which machines every service resolves to
    Plan {
        /// Path to the configuration file
        #[arg(env = "LABGEN_CONFIG", default_value = "homelab.kdl")]
        path: PathBuf,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Generate deployment bundles for every target unit
    Generate {
        /// Path to the configuration file
        #[arg(env = "LABGEN_CONFIG", default_value = "homelab.kdl")]
        path: PathBuf,

        /// Output root directory
        #[arg(long, env = "LABGEN_OUT", default_value = "./generated")]
        out: PathBuf,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Assemble bundles and list their files without writing
        #[arg(long)]
        dry_run: bool,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let success = match cli.command {
        Commands::Validate { path } => commands::validate(&path)?,
        Commands::Plan { path, format } => commands::plan::run(&path, format)?,
        Commands::Generate {
            path,
            out,
            format,
            dry_run,
        } => {
            if dry_run {
                commands::generate::dry_run(&path, format)?
            } else {
                commands::generate::run(&path, &out, format).await?
            }
        }
    };

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
