use crate::model::{Advisory, AdvisoryLevel};
use anyhow::Result;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct AdvisoryRow {
    #[tabled(rename = "Level")]
    level: String,
    #[tabled(rename = "Package")]
    package: String,
    #[tabled(rename = "Description")]
    description: String,
}

pub fn print_cli_table(advisories: &[Advisory]) -> Result<()> {
    println!();

    if advisories.is_empty() {
        println!("No advisories found.");
        return Ok(());
    }

    println!("Found {} advisories:", advisories.len());
    println!();

    let mut sorted = advisories.to_vec();
    sorted.sort_by_key(|a| match a.level {
        AdvisoryLevel::Fatal => 0,
        AdvisoryLevel::Warn => 1,
    });

    let rows: Vec<AdvisoryRow> = sorted
        .iter()
        .map(|a| AdvisoryRow {
            level: a.level.to_string(),
            package: truncate(&a.package, 50),
            description: truncate(&first_line(&a.description), 60),
        })
        .collect();

    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);

    // Summary
    let fatal = advisories
        .iter()
        .filter(|a| a.level == AdvisoryLevel::Fatal)
        .count();
    let warn = advisories.len() - fatal;
    println!();
    println!("Summary: {} fatal, {} warnings", fatal, warn);

    Ok(())
}

/// Descriptions are multi-paragraph; the table shows the first line only.
fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or_default().to_string()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
