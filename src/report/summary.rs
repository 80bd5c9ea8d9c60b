//! Cohort summary statistics

use std::collections::BTreeMap;

use comfy_table::{presets::UTF8_FULL_CONDENSED, Attribute, Cell, Color, Table};
use console::style;
use polars::prelude::*;

use crate::error::Result;
use crate::pipeline::fields;

/// Lower bounds of the age strata; the last group is open-ended
pub const AGE_GROUP_STARTS: [f64; 6] = [18.0, 30.0, 40.0, 50.0, 60.0, 70.0];
pub const AGE_GROUP_LABELS: [&str; 6] = ["18-29", "30-39", "40-49", "50-59", "60-69", "70+"];

/// Mean, sample SD, min and max of one column
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Describe {
    pub n: usize,
    pub mean: f64,
    pub sd: f64,
    pub min: f64,
    pub max: f64,
}

impl Describe {
    pub fn from_values(values: &[f64]) -> Self {
        let n = values.len();
        if n == 0 {
            return Self::default();
        }
        let mean = values.iter().sum::<f64>() / n as f64;
        let sd = if n > 1 {
            (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
        } else {
            0.0
        };
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Self {
            n,
            mean,
            sd,
            min,
            max,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgeStratum {
    pub label: &'static str,
    pub n: usize,
    pub mean_score: f64,
    pub mean_acceleration: f64,
}

/// Headline statistics of a scored cohort
#[derive(Debug, Clone, Default)]
pub struct CohortSummary {
    pub subjects: usize,
    pub score: Describe,
    pub acceleration: Describe,
    pub mean_age: f64,
    pub per_cycle: BTreeMap<String, usize>,
    pub age_groups: Vec<AgeStratum>,
}

fn floats(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    match df.column(name) {
        Ok(column) => {
            let values = column.cast(&DataType::Float64)?;
            Ok(values.f64()?.into_iter().collect())
        }
        Err(_) => Ok(vec![None; df.height()]),
    }
}

fn age_group(age: f64) -> Option<usize> {
    AGE_GROUP_STARTS.iter().rposition(|start| age >= *start)
}

impl CohortSummary {
    pub fn from_cohort(cohort: &DataFrame) -> Result<Self> {
        let scores = floats(cohort, fields::PHENOAGE)?;
        let accels = floats(cohort, fields::PHENOAGE_ACCEL)?;
        let ages = floats(cohort, fields::AGE)?;

        let observed_ages: Vec<f64> = ages.iter().flatten().copied().collect();
        let mean_age = Describe::from_values(&observed_ages).mean;

        let mut per_cycle = BTreeMap::new();
        if let Ok(column) = cohort.column(fields::CYCLE) {
            let cycles = column.cast(&DataType::String)?;
            for cycle in cycles.str()?.into_iter().flatten() {
                *per_cycle.entry(cycle.to_string()).or_insert(0) += 1;
            }
        }

        let mut groups: Vec<(Vec<f64>, Vec<f64>)> = vec![(Vec::new(), Vec::new()); 6];
        for row in 0..cohort.height() {
            if let (Some(age), Some(score), Some(accel)) = (ages[row], scores[row], accels[row]) {
                if let Some(g) = age_group(age) {
                    groups[g].0.push(score);
                    groups[g].1.push(accel);
                }
            }
        }
        let age_groups = groups
            .into_iter()
            .enumerate()
            .filter(|(_, (s, _))| !s.is_empty())
            .map(|(i, (s, a))| AgeStratum {
                label: AGE_GROUP_LABELS[i],
                n: s.len(),
                mean_score: Describe::from_values(&s).mean,
                mean_acceleration: Describe::from_values(&a).mean,
            })
            .collect();

        Ok(Self {
            subjects: cohort.height(),
            score: Describe::from_values(&scores.iter().flatten().copied().collect::<Vec<_>>()),
            acceleration: Describe::from_values(
                &accels.iter().flatten().copied().collect::<Vec<_>>(),
            ),
            mean_age,
            per_cycle,
            age_groups,
        })
    }

    pub fn display(&self) {
        println!();
        println!(
            "    {} {}",
            style("📋").cyan(),
            style("COHORT SUMMARY").white().bold()
        );
        println!("    {}", style("─".repeat(50)).dim());
        println!();

        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED);
        table.set_header(vec![
            Cell::new("Measure").add_attribute(Attribute::Bold),
            Cell::new("Mean").add_attribute(Attribute::Bold),
            Cell::new("SD").add_attribute(Attribute::Bold),
            Cell::new("Min").add_attribute(Attribute::Bold),
            Cell::new("Max").add_attribute(Attribute::Bold),
        ]);
        for (label, d) in [("PhenoAge", &self.score), ("Acceleration", &self.acceleration)] {
            table.add_row(vec![
                Cell::new(label),
                Cell::new(format!("{:.2}", d.mean)).fg(Color::Cyan),
                Cell::new(format!("{:.2}", d.sd)),
                Cell::new(format!("{:.2}", d.min)),
                Cell::new(format!("{:.2}", d.max)),
            ]);
        }
        for line in table.to_string().lines() {
            println!("    {}", line);
        }

        println!();
        println!(
            "      Subjects: {}   Mean age: {}",
            style(self.subjects).green().bold(),
            style(format!("{:.1}", self.mean_age)).yellow()
        );
        for (cycle, n) in &self.per_cycle {
            println!("        {} cycle {}: {}", style("•").dim(), cycle, n);
        }

        if !self.age_groups.is_empty() {
            println!();
            let mut strata = Table::new();
            strata.load_preset(UTF8_FULL_CONDENSED);
            strata.set_header(vec![
                Cell::new("Age group").add_attribute(Attribute::Bold),
                Cell::new("N").add_attribute(Attribute::Bold),
                Cell::new("Mean PhenoAge").add_attribute(Attribute::Bold),
                Cell::new("Mean accel").add_attribute(Attribute::Bold),
            ]);
            for g in &self.age_groups {
                let accel_color = if g.mean_acceleration > 0.0 {
                    Color::Red
                } else {
                    Color::Green
                };
                strata.add_row(vec![
                    Cell::new(g.label),
                    Cell::new(g.n),
                    Cell::new(format!("{:.2}", g.mean_score)),
                    Cell::new(format!("{:+.2}", g.mean_acceleration)).fg(accel_color),
                ]);
            }
            for line in strata.to_string().lines() {
                println!("    {}", line);
            }
        }
    }
}
