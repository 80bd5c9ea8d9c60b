//! phenocohort: cohort assembly CLI
//!
//! Builds the exposure / phenotypic-age cohort from a directory of survey
//! extracts and prints the audit trail and summary.

use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;

use phenocohort::cli::{Cli, Commands};
use phenocohort::pipeline::run_pipeline_with;
use phenocohort::report::{
    display_alias_resolutions, display_clipping, display_imputation, display_ledger,
    CohortSummary,
};
use phenocohort::utils::{
    create_spinner, finish_with_success, finish_with_warning, hidden_spinner, print_banner,
    print_completion, print_config, print_info, print_step_header, print_success,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let config = cli
        .resolve_config()
        .context("Failed to resolve configuration")?;

    if let Some(Commands::PrintConfig) = &cli.command {
        println!("{}", config.to_json()?);
        return Ok(());
    }

    if !cli.quiet {
        print_banner(env!("CARGO_PKG_VERSION"));
        print_config(&config);
        print_step_header(1, "Cohort Assembly");
    }

    let start = Instant::now();
    let spinner = if cli.quiet {
        hidden_spinner()
    } else {
        create_spinner("Starting...")
    };
    let output = run_pipeline_with(&config, |stage| spinner.set_message(stage.to_string()))
        .with_context(|| {
            format!(
                "Cohort assembly failed for {}",
                config.loader.data_dir.display()
            )
        })?;

    if output.clipping.any_clipped() {
        finish_with_warning(&spinner, "Cohort assembled with clipped scores");
    } else {
        finish_with_success(&spinner, "Cohort assembled");
    }

    if !cli.quiet {
        for (kind, rows) in &output.source_rows {
            let detail = rows
                .iter()
                .map(|(cycle, n)| format!("{}={}", cycle, n))
                .collect::<Vec<_>>()
                .join(", ");
            print_info(&format!("{}: {}", kind, detail));
        }
        println!(
            "      Elapsed: {}",
            style(format!("{:.2?}", start.elapsed())).dim()
        );

        print_step_header(2, "Audit");
        display_alias_resolutions(&output.alias_resolutions);
        display_ledger(&output.ledger);
        display_imputation(&output.imputation);
        display_clipping(&output.clipping);
        print_success("Audit complete");
    }

    let summary = CohortSummary::from_cohort(&output.cohort)
        .context("Failed to summarize cohort")?;
    summary.display();

    if !cli.quiet {
        print_completion(output.cohort.height());
    }

    Ok(())
}
