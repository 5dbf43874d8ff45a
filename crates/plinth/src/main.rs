//! Plinth CLI - static site asset pipeline with a live-reloading dev server.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod config;
mod pipeline;

use config::Config;

#[derive(Parser)]
#[command(name = "plinth")]
#[command(about = "Build a static site, then serve it with live reload")]
#[command(version)]
pub struct Cli {
    /// Run one stage instead of the full pipeline
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to plinth.toml config file
    #[arg(short, long, default_value = "plinth.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean, then run every build task
    Build,

    /// Remove the output directory
    Clean,

    /// Re-run tasks as sources change
    Watch,

    /// Start the application server behind the live reload proxy
    Serve {
        /// Do not open browser
        #[arg(long)]
        no_open: bool,
    },

    /// Publish the output directory to the hosting branch
    Deploy,

    /// Run a single task (fonts, library, video, favicon, images, styles,
    /// scripts, html, clean)
    Task {
        /// Task name
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt().with_env_filter(filter).with_target(false).init();

    let config = Config::load(&cli.config)?;

    match cli.command {
        None => pipeline::run(&config).await?,
        Some(Commands::Build) => commands::build::run(&config).await?,
        Some(Commands::Clean) => commands::task::run(&config, "clean").await?,
        Some(Commands::Watch) => commands::watch::run(&config).await?,
        Some(Commands::Serve { no_open }) => commands::serve::run(&config, !no_open).await?,
        Some(Commands::Deploy) => commands::deploy::run(&config).await?,
        Some(Commands::Task { name }) => commands::task::run(&config, &name).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_runs_pipeline() {
        let cli = Cli::try_parse_from(["plinth"]).unwrap();

        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from("plinth.toml"));
    }

    #[test]
    fn parses_task_and_flags() {
        let cli =
            Cli::try_parse_from(["plinth", "-v", "--config", "site.toml", "task", "scss"]).unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("site.toml"));
        assert!(matches!(cli.command, Some(Commands::Task { ref name }) if name == "scss"));
    }
}
