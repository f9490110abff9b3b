//! List command - shows the image references of the workflow tree.

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use imgaudit_core::ImageSet;
use serde::Serialize;

use super::{Context, FailureOutput, ensure_complete, failure_output};

/// Arguments for the list command.
#[derive(Args, Debug)]
pub struct ListArgs {}

/// List output for JSON.
#[derive(Debug, Serialize)]
struct ListOutput<'a> {
    images: &'a ImageSet,
    failures: Vec<FailureOutput>,
}

/// Run the list command.
pub async fn run(_args: ListArgs, ctx: &Context) -> Result<()> {
    let report = ctx.scan()?;

    if ctx.json_output {
        let output = ListOutput {
            images: &report.images,
            failures: failure_output(&report.failures),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if report.images.is_empty() {
        let dim = Style::new().dim();
        println!(
            "{}",
            dim.apply_to(format!("No image references under {}", ctx.root.display()))
        );
    } else {
        let dim = Style::new().dim();
        for (reference, sources) in report.images.iter() {
            println!("{}", style(reference).bold());
            if ctx.verbose {
                for source in sources {
                    println!("  {}", dim.apply_to(source.display()));
                }
            }
        }
        if ctx.verbose {
            println!();
            println!(
                "{}",
                dim.apply_to(format!(
                    "{} image(s) in {} document(s)",
                    report.images.len(),
                    report.documents.len()
                ))
            );
        }
    }

    ensure_complete(&report.failures)
}
