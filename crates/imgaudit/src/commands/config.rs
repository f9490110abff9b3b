//! Config command - configuration management.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};
use console::style;

use imgaudit_config::{self, ImgauditConfig, PROJECT_CONFIG_FILE};

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the resolved configuration and where it came from
    Show,

    /// Show the user configuration file path
    Path,

    /// Initialize a config file with defaults
    Init {
        /// Create project-local config (./imgaudit.toml) instead of user config
        #[arg(long)]
        local: bool,
    },
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx).await,
        ConfigCommand::Path => cmd_path(ctx).await,
        ConfigCommand::Init { local } => cmd_init(ctx, local).await,
    }
}

fn user_config_path(ctx: &Context) -> Option<PathBuf> {
    match ctx.config_dir {
        Some(ref dir) => Some(dir.join("config.toml")),
        None => imgaudit_config::user_config_path(),
    }
}

async fn cmd_show(ctx: &Context) -> Result<()> {
    let loaded = imgaudit_config::load_config_with_options(None, ctx.config_dir.as_deref())?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&loaded.config)?);
        return Ok(());
    }

    println!("# imgaudit configuration\n");

    println!("Config file search order (later overrides earlier):");
    for source in &loaded.sources {
        let status = if source.loaded {
            "✓ loaded"
        } else {
            "· not found"
        };
        println!("  {} {}", status, source.path.display());
    }
    println!();

    let scan = loaded.config.scan();
    let registry = loaded.config.registry();
    let onezone = loaded.config.onezone();

    println!("{}", style("Scan:").bold());
    println!("  root:       {}", ctx.root.display());
    println!("  extension:  {}", scan.extension);
    println!("  image key:  {}", scan.image_key);
    println!();

    println!("{}", style("Registry:").bold());
    println!("  dev prefix:    {}", registry.dev_prefix);
    println!("  public prefix: {}", registry.public_prefix);
    println!("  probe:         {}", registry.probe);
    println!("  concurrency:   {}", registry.concurrency);
    if let Some(timeout) = registry.timeout_secs {
        println!("  timeout:       {}s", timeout);
    }
    if let Some(ref mirror) = registry.mirror {
        println!("  mirror:        {}", mirror);
    }
    println!();

    println!("{}", style("Onezone:").bold());
    println!("  domain:        {}", onezone.domain);
    println!("  invalid certs: {}", onezone.accept_invalid_certs);
    println!("  timeout:       {}s", onezone.timeout_secs);
    println!();

    if !loaded.warnings.is_empty() {
        println!("Warnings:");
        for w in &loaded.warnings {
            println!("  ⚠ {}", w);
        }
        println!();
    }

    if ctx.verbose {
        println!("---\nRaw config:\n");
        println!("{}", loaded.config.to_toml()?);
    }

    Ok(())
}

async fn cmd_path(ctx: &Context) -> Result<()> {
    if let Some(path) = user_config_path(ctx) {
        println!("{}", path.display());
    } else {
        eprintln!("Could not determine config directory");
    }
    Ok(())
}

async fn cmd_init(ctx: &Context, local: bool) -> Result<()> {
    let path = if local {
        PathBuf::from(PROJECT_CONFIG_FILE)
    } else {
        user_config_path(ctx)
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
    };

    if path.exists() {
        println!("Config file already exists: {}", path.display());
        return Ok(());
    }

    imgaudit_config::save_config(&ImgauditConfig::with_defaults(), &path)?;
    println!("Created {}", path.display());
    Ok(())
}
