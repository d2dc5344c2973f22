//! `hrsync trigger`: start a run on a server and follow its stream.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use hrsync_core::{ArtifactKind, Config};
use hrsync_server::{trigger, StreamFrame, SyncRequest};

use super::render;

/// Arguments for `hrsync trigger`.
#[derive(Args, Debug)]
pub struct TriggerArgs {
    /// Artifact family: photos, documents or certificates.
    pub artifact: ArtifactKind,

    /// Institution to sync; omit for every institution.
    #[arg(long = "institution", value_name = "ID")]
    pub institution: Option<String>,

    /// Server base URL. Defaults to `http://<server.bind>`.
    #[arg(long)]
    pub url: Option<String>,

    /// Photos only: queue document and certificate runs afterwards.
    #[arg(long)]
    pub follow_up: bool,

    #[arg(long)]
    pub resume: bool,

    #[arg(long)]
    pub bulk: bool,
}

impl TriggerArgs {
    pub fn run(self, config: &Config) -> Result<()> {
        let url = self
            .url
            .clone()
            .unwrap_or_else(|| format!("http://{}", config.server.bind));
        let request = SyncRequest {
            institution_id: self.institution.clone(),
            stream: true,
            follow_up: self.follow_up,
            resume: self.resume,
            bulk: self.bulk,
        };

        let outcome = trigger(&url, self.artifact, &request, |frame| match frame {
            StreamFrame::Event(event) => render::print_progress(event),
            StreamFrame::Error(message) => eprintln!("{} {message}", "error:".red().bold()),
        })
        .with_context(|| format!("{} run on {url} failed", self.artifact))?;

        println!(
            "{} sync {}: {}",
            self.artifact,
            if outcome.cancelled {
                "cancelled".yellow().to_string()
            } else {
                "finished".to_string()
            },
            render::summary_line(&outcome.summary)
        );
        render::print_failures(&outcome.results);
        if self.follow_up && self.artifact == ArtifactKind::Photos {
            println!("document and certificate follow-ups queued on the server");
        }
        Ok(())
    }
}
