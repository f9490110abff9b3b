//! Recalculate-checksums command - refreshes lambda checksums of a workflow
//! dump through a Onezone instance.

use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Args;
use console::{Style, style};
use imgaudit_onezone::{
    ChecksumReport, OnezoneClient, load_dump, recalculate_checksums, save_dump,
    workflow_dump_path,
};
use serde::Serialize;

use super::Context;

/// Arguments for the recalculate-checksums command.
#[derive(Args, Debug)]
pub struct ChecksumsArgs {
    /// Workflow name; the dump is <root>/<WORKFLOW_NAME>.json
    pub workflow_name: String,

    /// Onezone REST access token
    #[arg(short, long, env = "ONEZONE_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Onezone domain (default: from config, else dev-onezone.default.svc.cluster.local)
    #[arg(short, long)]
    pub domain: Option<String>,
}

/// Recalculation output for JSON.
#[derive(Debug, Serialize)]
struct ChecksumsOutput<'a> {
    workflow: &'a str,
    path: String,
    saved: bool,
    #[serde(flatten)]
    report: &'a ChecksumReport,
}

/// Run the recalculate-checksums command.
pub async fn run(args: ChecksumsArgs, ctx: &Context) -> Result<()> {
    let onezone = ctx.config.onezone();
    let domain = args.domain.unwrap_or(onezone.domain);

    let path = workflow_dump_path(&ctx.root, &args.workflow_name);
    let mut dump = load_dump(&path)?;

    let client = OnezoneClient::builder()
        .domain(&domain)
        .token(args.token)
        .accept_invalid_certs(onezone.accept_invalid_certs)
        .timeout(Duration::from_secs(onezone.timeout_secs))
        .build()?;

    let report = recalculate_checksums(&client, &mut dump)
        .await
        .with_context(|| format!("failed to recalculate checksums via {}", domain))?;

    let saved = report.changed();
    if saved {
        save_dump(&path, &dump)?;
    }

    if ctx.json_output {
        let output = ChecksumsOutput {
            workflow: &args.workflow_name,
            path: path.display().to_string(),
            saved,
            report: &report,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let green = Style::new().green();
    let dim = Style::new().dim();

    for revision in &report.revisions {
        let name = revision.name.as_deref().unwrap_or(&revision.lambda_id);
        let status = if revision.changed() {
            green.apply_to(format!("checksum changed to \"{}\"", revision.current))
        } else {
            dim.apply_to("checksum unchanged".to_string())
        };
        println!(
            "Lambda {} rev. {}: {}",
            style(name).bold(),
            revision.revision,
            status
        );
    }

    if saved {
        println!("Saved {}", path.display());
    } else {
        println!("{}", dim.apply_to("No checksum changed; dump left as is"));
    }

    Ok(())
}
