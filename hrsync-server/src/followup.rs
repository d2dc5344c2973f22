//! Follow-up queue: document and certificate runs requested by a photo run.
//!
//! Jobs go through an explicit `mpsc` queue drained by one worker task, so
//! follow-ups never overlap each other. `enqueue` returns a
//! [`FollowUpHandle`]; callers that care await it, everyone else drops it and
//! the outcome is only logged.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};

use hrsync_core::ArtifactKind;
use hrsync_sync::{NullSink, Pipeline, RunOptions, Selection, Summary};

use crate::error::ServerError;
use crate::flight::InFlight;

struct FollowUpJob {
    artifact: ArtifactKind,
    selection: Selection,
    respond_to: oneshot::Sender<Result<Summary, String>>,
}

/// Sending side of the queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct FollowUpQueue {
    tx: mpsc::Sender<FollowUpJob>,
}

/// Awaitable result of one queued follow-up run.
#[derive(Debug)]
pub struct FollowUpHandle {
    rx: oneshot::Receiver<Result<Summary, String>>,
}

impl FollowUpHandle {
    pub async fn wait(self) -> Result<Summary, String> {
        self.rx
            .await
            .unwrap_or_else(|_| Err("follow-up worker stopped".to_string()))
    }
}

impl FollowUpQueue {
    /// Spawn the worker and return the queue feeding it.
    pub fn start(
        pipeline: Arc<Pipeline>,
        flights: InFlight,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> (Self, tokio::task::JoinHandle<Result<(), ServerError>>) {
        let (tx, rx) = mpsc::channel::<FollowUpJob>(64);
        let worker = tokio::spawn(worker_task(pipeline, flights, rx, shutdown_rx));
        (Self { tx }, worker)
    }

    pub async fn enqueue(
        &self,
        artifact: ArtifactKind,
        selection: Selection,
    ) -> Result<FollowUpHandle, ServerError> {
        let (respond_to, rx) = oneshot::channel();
        self.tx
            .send(FollowUpJob {
                artifact,
                selection,
                respond_to,
            })
            .await
            .map_err(|_| ServerError::ChannelClosed("follow-up queue"))?;
        Ok(FollowUpHandle { rx })
    }

    /// Queue document and certificate runs for the institutions a photo run
    /// covered. Handles are returned in that order.
    pub async fn enqueue_after_photos(
        &self,
        selection: &Selection,
    ) -> Result<Vec<FollowUpHandle>, ServerError> {
        let mut handles = Vec::with_capacity(2);
        for artifact in [ArtifactKind::Documents, ArtifactKind::Certificates] {
            handles.push(self.enqueue(artifact, selection.clone()).await?);
        }
        Ok(handles)
    }
}

async fn worker_task(
    pipeline: Arc<Pipeline>,
    flights: InFlight,
    mut rx: mpsc::Receiver<FollowUpJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), ServerError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = rx.recv() => {
                let Some(job) = maybe_job else { break };
                let outcome = run_job(&pipeline, &flights, job.artifact, job.selection).await;
                match &outcome {
                    Ok(summary) => tracing::info!(
                        artifact = %job.artifact,
                        successful = summary.successful,
                        partial = summary.partial,
                        failed = summary.failed,
                        skipped = summary.skipped,
                        "follow-up sync completed",
                    ),
                    Err(err) => tracing::warn!(artifact = %job.artifact, error = %err, "follow-up sync failed"),
                }
                let _ = job.respond_to.send(outcome);
            }
        }
    }
    Ok(())
}

async fn run_job(
    pipeline: &Arc<Pipeline>,
    flights: &InFlight,
    artifact: ArtifactKind,
    selection: Selection,
) -> Result<Summary, String> {
    let guard = flights.acquire(artifact).map_err(|e| e.to_string())?;
    let pipeline = pipeline.clone();
    let options = RunOptions::new(artifact, selection);
    tokio::task::spawn_blocking(move || {
        let _guard = guard;
        pipeline.run(&options, &mut NullSink)
    })
    .await
    .map_err(|err| format!("follow-up task join error: {err}"))?
    .map(|report| report.summary)
    .map_err(|err| err.to_string())
}
