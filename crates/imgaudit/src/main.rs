//! imgaudit - container image auditor for workflow dumps
//!
//! Main entry point for the imgaudit CLI.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};

mod commands;

use commands::{assert_public, assert_published, checksums, config, list, rewrite};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// imgaudit - container image auditor for workflow dumps
#[derive(Parser)]
#[command(name = "imgaudit")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Workflow directory to scan (default: from config, else ./workflows)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// User configuration directory
    #[arg(long, global = true, env = "IMGAUDIT_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Rewrite dev registry references to the public namespace, in place
    RewriteToPublic(rewrite::RewriteArgs),

    /// Fail unless every image reference is in the public namespace
    AssertPublicOnly(assert_public::AssertPublicArgs),

    /// Fail unless every image reference resolves on its registry
    AssertPublished(assert_published::AssertPublishedArgs),

    /// List image references found in the workflow dumps
    List(list::ListArgs),

    /// Recompute lambda checksums of a workflow dump through Onezone
    RecalculateChecksums(checksums::ChecksumsArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean for --json.
    let filter = if cli.verbose {
        "imgaudit=debug,imgaudit_core=debug,imgaudit_registry=debug,imgaudit_onezone=debug,imgaudit_config=debug,info"
    } else {
        "imgaudit=info,imgaudit_core=info,imgaudit_registry=info,imgaudit_onezone=info,imgaudit_config=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(cli.verbose)
                .with_writer(std::io::stderr)
                .with_filter(env_filter),
        )
        .init();

    let loaded = imgaudit_config::load_config_with_options(None, cli.config_dir.as_deref())
        .context("failed to load configuration")?;

    let root = cli.root.unwrap_or_else(|| loaded.config.scan().root);

    // Create context for commands
    let ctx = commands::Context {
        root,
        json_output: cli.json,
        verbose: cli.verbose,
        config_dir: cli.config_dir,
        config: loaded.config,
    };

    // Dispatch to command handlers
    match cli.command {
        Commands::RewriteToPublic(args) => rewrite::run(args, &ctx).await,
        Commands::AssertPublicOnly(args) => assert_public::run(args, &ctx).await,
        Commands::AssertPublished(args) => assert_published::run(args, &ctx).await,
        Commands::List(args) => list::run(args, &ctx).await,
        Commands::RecalculateChecksums(args) => checksums::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
