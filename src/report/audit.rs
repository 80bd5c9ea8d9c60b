//! Audit tables: exclusion flow, alias resolution, imputation and clipping

use comfy_table::{presets::UTF8_FULL_CONDENSED, Attribute, Cell, Color, Table};
use console::style;

use crate::pipeline::{
    AliasResolution, ClipReport, ClipStage, ExclusionLedger, FillSource, ImputationReport,
};

fn section(icon: &str, title: &str) {
    println!();
    println!("    {} {}", style(icon).cyan(), style(title).white().bold());
    println!("    {}", style("─".repeat(50)).dim());
    println!();
}

fn print_indented(table: &Table) {
    for line in table.to_string().lines() {
        println!("    {}", line);
    }
}

fn bold_header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|l| Cell::new(l).add_attribute(Attribute::Bold))
        .collect()
}

/// Render the exclusion ledger
pub fn display_ledger(ledger: &ExclusionLedger) {
    section("🧮", "EXCLUSION FLOW");

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(bold_header(&["Stage", "Remaining", "Removed"]));

    let mut previous: Option<usize> = None;
    for entry in ledger.entries() {
        let removed = previous.map(|p| p.saturating_sub(entry.count)).unwrap_or(0);
        table.add_row(vec![
            Cell::new(&entry.stage),
            Cell::new(entry.count),
            Cell::new(removed).fg(if removed > 0 { Color::Red } else { Color::White }),
        ]);
        previous = Some(entry.count);
    }
    print_indented(&table);
}

/// Render which raw column supplied each canonical field
pub fn display_alias_resolutions(resolutions: &[AliasResolution]) {
    section("🔗", "ALIAS RESOLUTION");

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(bold_header(&["Table", "Field", "Sources", "Cells"]));

    for r in resolutions {
        let sources = r
            .used
            .iter()
            .filter(|u| u.cells > 0)
            .map(|u| format!("{} ({})", u.alias, u.cells))
            .collect::<Vec<_>>()
            .join(", ");
        let color = if r.used.iter().filter(|u| u.cells > 0).count() > 1 {
            Color::Yellow
        } else {
            Color::White
        };
        table.add_row(vec![
            Cell::new(&r.table),
            Cell::new(&r.canonical),
            Cell::new(sources).fg(color),
            Cell::new(r.total_cells()),
        ]);
    }
    print_indented(&table);
}

pub fn display_imputation(report: &ImputationReport) {
    section("🩹", "IMPUTATION");

    if report.total_filled() == 0 {
        println!("      {}", style("No missing biomarker values").dim());
        return;
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(bold_header(&["Biomarker", "Source", "Value", "Cells filled"]));
    for rec in report
        .records
        .iter()
        .filter(|r| r.source != FillSource::NotNeeded)
    {
        table.add_row(vec![
            Cell::new(rec.biomarker),
            Cell::new(rec.source).fg(if rec.source == FillSource::LiteratureDefault {
                Color::Yellow
            } else {
                Color::Cyan
            }),
            Cell::new(
                rec.fill_value
                    .map(|v| format!("{:.3}", v))
                    .unwrap_or_default(),
            ),
            Cell::new(rec.cells_filled),
        ]);
    }
    print_indented(&table);
}

pub fn display_clipping(report: &ClipReport) {
    section("✂️", "NUMERICAL CLIPPING");

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(bold_header(&["Stage", "Rows", "Fraction"]));
    for stage in ClipStage::ALL {
        let n = report.count(stage);
        table.add_row(vec![
            Cell::new(stage),
            Cell::new(n).fg(if n > 0 { Color::Yellow } else { Color::White }),
            Cell::new(format!("{:.2}%", 100.0 * report.fraction(stage))),
        ]);
    }
    print_indented(&table);
}
