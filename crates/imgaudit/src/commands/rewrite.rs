//! Rewrite-to-public command - moves dev registry references to the public
//! namespace.

use anyhow::Result;
use clap::Args;
use console::Style;
use imgaudit_core::{DocumentRewrite, RegistryPrefixes, rewrite_tree};
use serde::Serialize;

use super::{Context, FailureOutput, ensure_complete, failure_output};

/// Arguments for the rewrite-to-public command.
#[derive(Args, Debug)]
pub struct RewriteArgs {
    /// Dev registry prefix to replace (default: from config, else docker.onedata.org)
    pub dev_prefix: Option<String>,

    /// Public prefix to substitute (default: from config, else onedata)
    pub public_prefix: Option<String>,

    /// Show what would change without writing any file
    #[arg(long)]
    pub dry_run: bool,
}

/// Rewrite output for JSON.
#[derive(Debug, Serialize)]
struct RewriteOutput<'a> {
    dev_prefix: &'a str,
    public_prefix: &'a str,
    dry_run: bool,
    documents: Vec<&'a DocumentRewrite>,
    occurrences: usize,
    failures: Vec<FailureOutput>,
}

/// Run the rewrite-to-public command.
pub async fn run(args: RewriteArgs, ctx: &Context) -> Result<()> {
    let registry = ctx.config.registry();
    let prefixes = RegistryPrefixes::new(
        args.dev_prefix.unwrap_or(registry.dev_prefix),
        args.public_prefix.unwrap_or(registry.public_prefix),
    )?;

    let report = rewrite_tree(&ctx.root, &prefixes, &ctx.scan_options(), args.dry_run)?;

    if ctx.json_output {
        let output = RewriteOutput {
            dev_prefix: prefixes.dev(),
            public_prefix: prefixes.public(),
            dry_run: args.dry_run,
            documents: report.changed().collect(),
            occurrences: report.occurrences(),
            failures: failure_output(&report.failures),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        let green = Style::new().green();
        let dim = Style::new().dim();

        for document in report.changed() {
            println!("{}", document.path.display());
            for replacement in &document.replacements {
                println!(
                    "  {} {} {}{}",
                    replacement.from,
                    dim.apply_to("→"),
                    green.apply_to(&replacement.to),
                    if replacement.occurrences > 1 {
                        format!(" (x{})", replacement.occurrences)
                    } else {
                        String::new()
                    }
                );
            }
        }

        let changed = report.changed().count();
        let summary = if changed == 0 {
            format!("No references under '{}' found", prefixes.dev())
        } else if args.dry_run {
            format!(
                "Would rewrite {} reference(s) in {} document(s) (dry run)",
                report.occurrences(),
                changed
            )
        } else {
            format!(
                "Rewrote {} reference(s) in {} document(s)",
                report.occurrences(),
                changed
            )
        };
        println!("{}", dim.apply_to(summary));
    }

    ensure_complete(&report.failures)
}
