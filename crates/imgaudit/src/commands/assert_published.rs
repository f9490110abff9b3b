//! Assert-published command - every image must resolve on its registry.

use anyhow::Result;
use clap::Args;
use console::{Style, Term};
use imgaudit_config::ProbeKind;
use imgaudit_core::{ManifestStatus, check_published, unpublished_from};
use imgaudit_registry::build_probe;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::debug;

use super::{Context, FailureOutput, ensure_complete, failure_output};

/// Arguments for the assert-published command.
#[derive(Args, Debug)]
pub struct AssertPublishedArgs {
    /// Manifest probe: docker or http (default: from config, else docker)
    #[arg(long)]
    pub probe: Option<ProbeKind>,

    /// Maximum number of concurrent registry queries
    #[arg(long)]
    pub concurrency: Option<usize>,
}

/// Per-reference result for JSON.
#[derive(Debug, Serialize)]
struct CheckOutput {
    reference: String,
    published: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

/// Assertion output for JSON.
#[derive(Debug, Serialize)]
struct AssertPublishedOutput {
    probe: String,
    images: Vec<CheckOutput>,
    failures: Vec<FailureOutput>,
}

/// Run the assert-published command.
pub async fn run(args: AssertPublishedArgs, ctx: &Context) -> Result<()> {
    let mut registry = ctx.config.registry();
    if let Some(probe) = args.probe {
        registry.probe = probe;
    }
    if let Some(concurrency) = args.concurrency {
        registry.concurrency = concurrency;
    }

    let report = ctx.scan()?;
    let probe = build_probe(&registry)?;
    debug!(
        probe = probe.name(),
        images = report.images.len(),
        concurrency = registry.concurrency,
        "checking publication"
    );

    let progress = if !ctx.json_output && !report.images.is_empty() && Term::stderr().is_term() {
        let bar = ProgressBar::new(report.images.len() as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {wide_msg}")?
                .progress_chars("#>-"),
        );
        Some(bar)
    } else {
        None
    };

    let results = check_published(
        &report.images,
        probe.as_ref(),
        registry.concurrency,
        |reference, _| {
            if let Some(ref bar) = progress {
                bar.set_message(reference.to_string());
                bar.inc(1);
            }
        },
    )
    .await;

    if let Some(bar) = progress {
        bar.finish_and_clear();
    }

    if ctx.json_output {
        let output = AssertPublishedOutput {
            probe: probe.name().to_string(),
            images: results
                .iter()
                .map(|(reference, status)| CheckOutput {
                    reference: reference.clone(),
                    published: status.is_published(),
                    reason: match status {
                        ManifestStatus::Published => None,
                        ManifestStatus::Unconfirmed { reason } => Some(reason.clone()),
                    },
                })
                .collect(),
            failures: failure_output(&report.failures),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if ctx.verbose {
        let green = Style::new().green();
        let red = Style::new().red();
        for (reference, status) in &results {
            match status {
                ManifestStatus::Published => println!("  {} {}", green.apply_to("●"), reference),
                ManifestStatus::Unconfirmed { .. } => {
                    println!("  {} {}", red.apply_to("●"), reference)
                }
            }
        }
    }

    let total = results.len();
    unpublished_from(&report.images, results)?;

    if !ctx.json_output {
        let green = Style::new().green();
        println!(
            "{} all {} image reference(s) are published",
            green.apply_to("✓"),
            total
        );
    }

    ensure_complete(&report.failures)
}
