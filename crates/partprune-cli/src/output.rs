//! Report rendering.

use anyhow::Result;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use serde::Serialize;

use crate::commands::{PartitionsReport, PlacementReport, PruneReport};
use crate::OutputFormat;

fn print_json<T: Serialize>(report: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

fn table(columns: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    let header: Vec<Cell> = columns
        .iter()
        .map(|c| Cell::new(c).fg(Color::Cyan))
        .collect();
    table.set_header(header);
    table
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

pub fn print_partitions(report: &PartitionsReport, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(report);
    }

    match report.kind {
        Some(kind) => println!(
            "{} ({}) partitioned by {} on {} {}",
            report.table,
            report.class_id,
            kind,
            or_dash(report.key),
            or_dash(report.domain)
        ),
        None => {
            println!("{} ({}) is not partitioned", report.table, report.class_id);
            return Ok(());
        }
    }

    let mut out = table(&["class", "name", "heap", "repr", "bounds"]);
    for p in &report.partitions {
        out.add_row(vec![
            Cell::new(p.class_id.0),
            Cell::new(&p.name),
            Cell::new(p.heap_id.0),
            Cell::new(p.repr_id.0),
            Cell::new(&p.bounds),
        ]);
    }
    println!("{out}");
    Ok(())
}

pub fn print_prune(report: &PruneReport, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(report);
    }

    if report.total == 0 {
        println!("{} ({}) is not partitioned", report.table, report.class_id);
        return Ok(());
    }
    println!(
        "{}: {} of {} partitions selected",
        report.table,
        report.selected.len(),
        report.total
    );
    if report.selected.is_empty() {
        return Ok(());
    }

    let mut out = table(&["class", "name", "heap", "index"]);
    for p in &report.selected {
        out.add_row(vec![
            Cell::new(p.class_id.0),
            Cell::new(&p.name),
            Cell::new(p.heap_id.0),
            Cell::new(or_dash(p.index_id.map(|i| i.0))),
        ]);
    }
    println!("{out}");
    Ok(())
}

pub fn print_placement(report: &PlacementReport, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(report);
    }

    match (&report.target, &report.partition) {
        (Some(target), Some(name)) => {
            println!(
                "{} row of {} goes to {} ({}), heap {}, repr {}{}",
                if report.update { "Updated" } else { "Inserted" },
                report.table,
                name,
                target.class_id,
                target.heap_id.0,
                target.repr_id.0,
                if report.repr_changed { " (representation changed)" } else { "" }
            );
        }
        _ => println!("{} is not partitioned, row stays in place", report.table),
    }
    Ok(())
}
