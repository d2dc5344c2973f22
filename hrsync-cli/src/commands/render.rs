//! Terminal rendering shared by `sync` and `trigger`.

use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use hrsync_sync::{InstitutionReport, ProgressEvent, RunReport, Summary, SyncResult, SyncStatus};

#[derive(Tabled)]
struct InstitutionRow {
    #[tabled(rename = "institution")]
    name: String,
    #[tabled(rename = "ok")]
    successful: usize,
    #[tabled(rename = "partial")]
    partial: usize,
    #[tabled(rename = "failed")]
    failed: usize,
    #[tabled(rename = "skipped")]
    skipped: usize,
    #[tabled(rename = "note")]
    note: String,
}

#[derive(Tabled)]
struct FailureRow {
    #[tabled(rename = "employee")]
    subject: String,
    #[tabled(rename = "institution")]
    institution: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "attempts")]
    attempts: u32,
    #[tabled(rename = "reason")]
    reason: String,
}

pub fn status_label(status: SyncStatus) -> String {
    let label = status.as_str().to_uppercase();
    match status {
        SyncStatus::Success => label.green().bold().to_string(),
        SyncStatus::Partial => label.yellow().bold().to_string(),
        SyncStatus::Failed => label.red().bold().to_string(),
        SyncStatus::Skipped => label.bright_black().to_string(),
    }
}

/// One line per `progress` event; `complete` is rendered by the caller.
pub fn print_progress(event: &ProgressEvent) {
    if let ProgressEvent::Progress {
        current,
        total,
        subject_name,
        status,
        message,
        ..
    } = event
    {
        println!(
            "[{current:>width$}/{total}] {:<8} {subject_name} {}",
            status_label(*status),
            format!("({message})").bright_black(),
            width = total.to_string().len(),
        );
    }
}

pub fn summary_line(summary: &Summary) -> String {
    format!(
        "{} total | {} ok | {} partial | {} failed | {} skipped",
        summary.total,
        summary.successful.to_string().green(),
        summary.partial.to_string().yellow(),
        summary.failed.to_string().red(),
        summary.skipped,
    )
}

pub fn print_failures<'a>(results: impl IntoIterator<Item = &'a SyncResult>) {
    let rows: Vec<FailureRow> = results
        .into_iter()
        .filter(|r| matches!(r.status, SyncStatus::Failed | SyncStatus::Partial))
        .map(|r| FailureRow {
            subject: format!("{} ({})", r.subject_name, r.identifier),
            institution: r.institution.clone(),
            status: r.status.as_str().to_string(),
            attempts: r.attempts,
            reason: r.message.clone(),
        })
        .collect();
    if rows.is_empty() {
        return;
    }
    println!("{}", "Needs attention:".bold());
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

/// End-of-run report: totals, per-institution breakdown, then failures.
pub fn print_run_report(report: &RunReport) {
    let separator = "■".repeat(67).bright_black().to_string();
    println!("{separator}");
    println!(
        "{} sync {}: {}",
        report.artifact,
        if report.cancelled {
            "cancelled".yellow().to_string()
        } else {
            "finished".to_string()
        },
        summary_line(&report.summary)
    );
    if report.resumed_from > 0 {
        println!("resumed after {} already-processed employee(s)", report.resumed_from);
    }

    if !report.institutions.is_empty() {
        let mut table = Table::new(report.institutions.iter().map(institution_row));
        table.with(Style::rounded());
        println!("{table}");
    }
    print_failures(&report.results);
    println!("{separator}");
}

fn institution_row(institution: &InstitutionReport) -> InstitutionRow {
    InstitutionRow {
        name: institution.name.clone(),
        successful: institution.summary.successful,
        partial: institution.summary.partial,
        failed: institution.summary.failed,
        skipped: institution.summary.skipped,
        note: institution.error.clone().unwrap_or_default(),
    }
}
