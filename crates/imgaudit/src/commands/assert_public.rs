//! Assert-public-only command - every image must live in the public namespace.

use anyhow::Result;
use clap::Args;
use console::Style;
use imgaudit_core::{Offender, assert_public_only, find_non_public};
use serde::Serialize;

use super::{Context, FailureOutput, ensure_complete, failure_output};

/// Arguments for the assert-public-only command.
#[derive(Args, Debug)]
pub struct AssertPublicArgs {
    /// Public prefix every reference must start with (default: from config, else onedata)
    #[arg(long)]
    pub public_prefix: Option<String>,
}

/// Assertion output for JSON.
#[derive(Debug, Serialize)]
struct AssertPublicOutput<'a> {
    public_prefix: &'a str,
    images: usize,
    offenders: &'a [Offender],
    failures: Vec<FailureOutput>,
}

/// Run the assert-public-only command.
pub async fn run(args: AssertPublicArgs, ctx: &Context) -> Result<()> {
    let prefix = args
        .public_prefix
        .unwrap_or_else(|| ctx.config.registry().public_prefix);
    let report = ctx.scan()?;

    if ctx.json_output {
        let offenders = find_non_public(&report.images, &prefix);
        let output = AssertPublicOutput {
            public_prefix: &prefix,
            images: report.images.len(),
            offenders: &offenders,
            failures: failure_output(&report.failures),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    assert_public_only(&report.images, &prefix)?;

    if !ctx.json_output {
        let green = Style::new().green();
        println!(
            "{} all {} image reference(s) start with '{}'",
            green.apply_to("✓"),
            report.images.len(),
            prefix
        );
    }

    ensure_complete(&report.failures)
}
