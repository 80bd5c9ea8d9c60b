//! Terminal styling for the cohort builder output

use console::{style, Emoji};

use crate::config::PipelineConfig;

pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "[*] ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", ">> ");
pub static FOLDER: Emoji<'_, '_> = Emoji("📂 ", "");
pub static CHART: Emoji<'_, '_> = Emoji("📊 ", "");
pub static DNA: Emoji<'_, '_> = Emoji("🧬 ", "");

/// Print the application banner
pub fn print_banner(version: &str) {
    println!();
    println!(
        "    {} {}",
        style("phenocohort").cyan().bold(),
        style(format!("v{}", version)).dim()
    );
    println!(
        "    {}",
        style("Exposure cohorts scored by phenotypic age").dim()
    );
    println!("    {}", style("━".repeat(50)).dim());
    println!();
}

/// Print configuration card
pub fn print_config(config: &PipelineConfig) {
    let box_width = 56;
    let line = "─".repeat(box_width - 2);

    println!("    ┌{}┐", line);
    println!("    │ {}", style("⚙️  Configuration").cyan().bold());
    println!("    ├{}┤", line);
    println!(
        "    │  {} Data dir:     {}",
        FOLDER,
        truncate_string(&config.loader.data_dir.display().to_string(), 34)
    );
    println!(
        "    │  {} Min age:      {}",
        CHART,
        style(format!("{:.0}", config.eligibility.min_age)).yellow()
    );
    println!(
        "    │  {} Outlier |z| > {}",
        CHART,
        style(format!("{:.1}", config.eligibility.outlier_z)).yellow()
    );
    println!(
        "    │  {} Completeness: {}",
        DNA,
        style(&config.eligibility.completeness).yellow()
    );
    println!(
        "    │  {} Imputation:   {}",
        DNA,
        style(config.imputation).yellow()
    );
    println!(
        "    │  {} Score range:  [{}, {}]",
        DNA,
        config.clipping.score.lo,
        config.clipping.score.hi
    );
    println!("    └{}┘", line);
    println!();
}

/// Print a step header with styling
pub fn print_step_header(step_num: u8, title: &str) {
    println!();
    println!(
        "    {} {} {}",
        style(format!("STEP {}", step_num)).cyan().bold(),
        style("│").dim(),
        style(title).white().bold()
    );
    println!("    {}", style("─".repeat(50)).dim());
}

pub fn print_success(message: &str) {
    println!("    {} {}", style("✓").green().bold(), style(message).green());
}

pub fn print_info(message: &str) {
    println!("    {} {}", INFO, message);
}

/// Print the final completion message
pub fn print_completion(subjects: usize) {
    println!();
    println!(
        "    {} {}",
        ROCKET,
        style(format!("Cohort assembled: {} subjects", subjects))
            .green()
            .bold()
    );
    println!();
}

fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let tail: String = s
            .chars()
            .rev()
            .take(max_len.saturating_sub(3))
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("...{}", tail)
    }
}
