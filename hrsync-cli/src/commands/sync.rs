//! `hrsync sync`: run the pipeline in the foreground.

use anyhow::{Context, Result};
use clap::Args;

use hrsync_core::{ArtifactKind, Config, InstitutionId};
use hrsync_sync::{FnSink, Pipeline, ProgressEvent, RunOptions, Scope, Selection};

use super::render;

/// Arguments for `hrsync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Artifact family: photos, documents or certificates.
    pub artifact: ArtifactKind,

    /// Only these institutions (repeatable).
    #[arg(long = "institution", value_name = "ID", conflicts_with_all = ["after", "name"])]
    pub institutions: Vec<String>,

    /// Every institution sorted after this one (by name). Fails if the name
    /// is unknown or ambiguous.
    #[arg(long, value_name = "NAME", conflicts_with = "name")]
    pub after: Option<String>,

    /// Institutions whose name contains this text.
    #[arg(long, value_name = "TEXT")]
    pub name: Option<String>,

    /// Cap on the number of institutions.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Continue from the stored checkpoint for this artifact.
    #[arg(long)]
    pub resume: bool,

    /// Photos only: one institution-level HRIMS call instead of one per employee.
    #[arg(long)]
    pub bulk: bool,

    /// Print the run report as JSON instead of tables.
    #[arg(long)]
    pub json: bool,

    /// Suppress per-employee progress lines.
    #[arg(long)]
    pub quiet: bool,
}

impl SyncArgs {
    pub fn run(self, config: &Config) -> Result<()> {
        if self.bulk && self.artifact != ArtifactKind::Photos {
            anyhow::bail!("--bulk only applies to photos");
        }
        config
            .hrims
            .validate()
            .context("HRIMS connection is not configured")?;

        let pipeline = Pipeline::from_config(config);
        let mut options = RunOptions::new(self.artifact, self.selection());
        options.resume = self.resume;
        options.bulk = self.bulk;

        let show_progress = !self.quiet && !self.json;
        let mut sink = FnSink(|event: ProgressEvent| {
            if show_progress {
                render::print_progress(&event);
            }
            true
        });
        let report = pipeline
            .run(&options, &mut sink)
            .with_context(|| format!("{} sync failed for {}", self.artifact, options.selection))?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize run report")?
            );
        } else {
            render::print_run_report(&report);
        }
        Ok(())
    }

    fn selection(&self) -> Selection {
        let scope = if !self.institutions.is_empty() {
            Scope::Ids(
                self.institutions
                    .iter()
                    .map(|id| InstitutionId::from(id.trim()))
                    .collect(),
            )
        } else if let Some(after) = &self.after {
            Scope::After(after.clone())
        } else if let Some(name) = &self.name {
            Scope::NameContains(name.clone())
        } else {
            Scope::All
        };
        Selection {
            scope,
            limit: self.limit,
        }
    }
}
