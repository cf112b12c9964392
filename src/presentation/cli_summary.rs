use crate::application::monitoring::PerfReport;
use crate::domain::stats::{DiffStats, DuplicationStats};
use crate::domain::value_objects::SourceLabel;
use colored::*;
use tabled::settings::{object::Columns, Alignment, Modify, Style};
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct SummaryRow {
    metric: String,
    value: String,
}

/// Print the diff counters. Written to stderr so that console output of
/// the diff itself stays machine-readable on stdout.
pub fn print_summary(old: &str, new: &str, stats: &DiffStats) {
    eprintln!();
    eprintln!("{}", "STREAMDIFF SUMMARY".bold().cyan());
    eprintln!("{} → {}", old.blue(), new.green());
    eprintln!();

    if !stats.has_changes() {
        eprintln!(
            "{}",
            format!("No changes detected ({} row(s) compared).", stats.total_comparisons).italic()
        );
        eprintln!();
        return;
    }

    let rows = vec![
        SummaryRow {
            metric: "Added".into(),
            value: stats.added.to_string().green().to_string(),
        },
        SummaryRow {
            metric: "Deleted".into(),
            value: stats.deleted.to_string().red().to_string(),
        },
        SummaryRow {
            metric: "Modified".into(),
            value: stats.modified.to_string().yellow().to_string(),
        },
        SummaryRow {
            metric: "Same".into(),
            value: stats.same.to_string().dimmed().to_string(),
        },
        SummaryRow {
            metric: "Total compared".into(),
            value: stats.total_comparisons.to_string(),
        },
        SummaryRow {
            metric: "Total changes".into(),
            value: stats.total_changes.to_string().bold().to_string(),
        },
        SummaryRow {
            metric: "Change %".into(),
            value: format!("{:.2}", stats.change_percent).bold().to_string(),
        },
    ];

    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..=1)).with(Alignment::right()))
        .to_string();
    eprintln!("{table}");
    eprintln!();
}

// ─── Duplicate summary ────────────────────────────────────────────────────────

#[derive(Tabled)]
struct DuplicateRow {
    source: String,
    #[tabled(rename = "unique keys")]
    unique_keys: String,
    #[tabled(rename = "duplicated keys")]
    duplicated_keys: String,
    #[tabled(rename = "rows folded")]
    duplicate_rows: String,
    #[tabled(rename = "min/avg/max per key")]
    spread: String,
}

/// Print per-source duplicate figures. Sources without a duplicate policy
/// are skipped.
pub fn print_duplication_summary(stats: &[(SourceLabel, DuplicationStats)]) {
    if stats.is_empty() {
        return;
    }

    eprintln!("{}", "DUPLICATE KEYS".bold().cyan());

    let rows: Vec<DuplicateRow> = stats
        .iter()
        .map(|(side, s)| DuplicateRow {
            source: side.to_string().bold().to_string(),
            unique_keys: s.unique_keys.to_string(),
            duplicated_keys: if s.duplicated_keys > 0 {
                s.duplicated_keys.to_string().yellow().to_string()
            } else {
                "0".green().to_string()
            },
            duplicate_rows: s.duplicate_rows.to_string(),
            spread: format!(
                "{}/{:.2}/{}",
                s.min_duplicates_per_key, s.avg_duplicates_per_key, s.max_duplicates_per_key
            ),
        })
        .collect();

    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..=4)).with(Alignment::right()))
        .to_string();
    eprintln!("{table}");
    eprintln!();
}

// ─── Performance summary ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct PerfRow {
    operation: String,
    source: String,
    #[tabled(rename = "rows")]
    rows: String,
    #[tabled(rename = "time (ms)")]
    duration_ms: String,
}

/// Print a performance timing table to stderr.
pub fn print_perf_summary(report: &PerfReport) {
    if report.timings.is_empty() {
        return;
    }

    eprintln!("{}", "PERFORMANCE".bold().cyan());

    let rows: Vec<PerfRow> = report
        .timings
        .iter()
        .map(|t| PerfRow {
            operation: t.operation.dimmed().to_string(),
            source: t.source.bold().to_string(),
            rows: t.rows.to_string(),
            duration_ms: format_duration(t.duration_ms),
        })
        .collect();

    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..=3)).with(Alignment::right()))
        .to_string();

    eprintln!("{table}");

    eprintln!(
        "  Total: {} row(s) read  ·  {} ms elapsed",
        report.total_rows_read().to_string().bold(),
        format_duration(report.total_ms()),
    );
    eprintln!();
}

fn format_duration(ms: u128) -> String {
    if ms >= 1_000 {
        format!("{:.1}s", ms as f64 / 1_000.0).yellow().to_string()
    } else if ms >= 100 {
        ms.to_string().yellow().to_string()
    } else {
        ms.to_string().green().to_string()
    }
}
