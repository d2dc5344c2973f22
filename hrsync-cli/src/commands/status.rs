//! `hrsync status`: checkpoint visibility per artifact family.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use hrsync_core::Config;
use hrsync_sync::{checkpoint, Checkpoint};

/// Arguments for `hrsync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct CheckpointRow {
    #[tabled(rename = "artifact")]
    artifact: String,
    #[tabled(rename = "state")]
    state: String,
    #[tabled(rename = "scope")]
    scope: String,
    #[tabled(rename = "position")]
    position: String,
    #[tabled(rename = "ok")]
    successful: usize,
    #[tabled(rename = "partial")]
    partial: usize,
    #[tabled(rename = "failed")]
    failed: usize,
    #[tabled(rename = "skipped")]
    skipped: usize,
    #[tabled(rename = "updated")]
    updated: String,
}

impl StatusArgs {
    pub fn run(self, config: &Config) -> Result<()> {
        let checkpoints = checkpoint::load_all_at(&config.data_dir).with_context(|| {
            format!("failed to read checkpoints under {}", config.data_dir.display())
        })?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&checkpoints)
                    .context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        print_table(&checkpoints, Utc::now());
        Ok(())
    }
}

fn print_table(checkpoints: &[Checkpoint], now: DateTime<Utc>) {
    println!(
        "hrsync v{} | {} checkpoint(s)",
        env!("CARGO_PKG_VERSION"),
        checkpoints.len()
    );
    if checkpoints.is_empty() {
        println!("No runs recorded yet. Run `hrsync sync <artifact>` first.");
        return;
    }

    let rows: Vec<CheckpointRow> = checkpoints.iter().map(|cp| row(cp, now)).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if checkpoints.iter().any(|cp| !cp.finished) {
        println!("Unfinished runs can be continued with `hrsync sync <artifact> --resume`.");
    }
}

fn row(cp: &Checkpoint, now: DateTime<Utc>) -> CheckpointRow {
    let state = if cp.finished {
        "FINISHED".green().bold().to_string()
    } else {
        "IN PROGRESS".yellow().bold().to_string()
    };
    let position = match &cp.institution_id {
        Some(id) => format!(
            "{id} @ {} ({} done)",
            cp.last_offset,
            cp.completed_institutions.len()
        ),
        None => "not started".to_string(),
    };
    CheckpointRow {
        artifact: cp.artifact.to_string(),
        state,
        scope: cp.scope.clone(),
        position,
        successful: cp.summary.successful,
        partial: cp.summary.partial,
        failed: cp.summary.failed,
        skipped: cp.summary.skipped,
        updated: format_age(cp.timestamp, now),
    }
}

/// Coarse relative age: `just now`, `5m ago`, `3h ago`, `2d ago`.
fn format_age(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0);
    match secs {
        0..=59 => "just now".to_string(),
        60..=3_599 => format!("{}m ago", secs / 60),
        3_600..=86_399 => format!("{}h ago", secs / 3_600),
        _ => format!("{}d ago", secs / 86_400),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn ages_are_bucketed() {
        let now = Utc::now();
        assert_eq!(format_age(now, now), "just now");
        assert_eq!(format_age(now - Duration::minutes(5), now), "5m ago");
        assert_eq!(format_age(now - Duration::hours(3), now), "3h ago");
        assert_eq!(format_age(now - Duration::days(2), now), "2d ago");
        assert_eq!(format_age(now + Duration::minutes(1), now), "just now");
    }
}
