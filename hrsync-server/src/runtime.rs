use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::Path;
use axum::http::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::ReceiverStream;

use hrsync_core::{directory, ArtifactKind, Config};
use hrsync_sync::{
    checkpoint, Checkpoint, FnSink, NullSink, Pipeline, ProgressEvent, ProgressSink,
    RunOptions, RunReport, Selection,
};

use crate::error::{io_err, ServerError};
use crate::flight::{FlightGuard, InFlight};
use crate::followup::FollowUpQueue;
use crate::protocol::{encode_error, encode_frame, SyncRequest, SyncResponse, EVENT_STREAM};

/// Frames buffered between the pipeline and a slow HTTP client before the
/// pipeline blocks.
const FRAME_BUFFER: usize = 64;

/// Shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub flights: InFlight,
    pub follow_ups: FollowUpQueue,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/hrims/sync/checkpoints/{artifact}", get(get_checkpoint))
        .route("/api/hrims/sync/{artifact}", post(trigger_sync))
        .layer(Extension(state))
}

/// Start the server runtime and block the current thread until it exits.
pub fn start_blocking(config: &Config) -> Result<(), ServerError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config.clone()))
}

/// Bind `server.bind` and serve until ctrl-c.
pub async fn run(config: Config) -> Result<(), ServerError> {
    let listener = TcpListener::bind(&config.server.bind)
        .await
        .map_err(|e| io_err(&config.server.bind, e))?;
    serve(listener, Arc::new(Pipeline::from_config(&config))).await
}

/// Serve on an already-bound listener: HTTP server, follow-up worker and
/// signal handler, joined together.
pub async fn serve(listener: TcpListener, pipeline: Arc<Pipeline>) -> Result<(), ServerError> {
    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    let flights = InFlight::new();
    let (follow_ups, worker_handle) =
        FollowUpQueue::start(pipeline.clone(), flights.clone(), shutdown_tx.subscribe());
    let state = AppState {
        pipeline,
        flights,
        follow_ups,
    };

    let addr = listener
        .local_addr()
        .map_err(|e| io_err("listener address", e))?;
    tracing::info!(%addr, "hrsync server listening");

    let http_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = axum::serve(listener, router(state))
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .map_err(|e| io_err(addr.to_string(), e));
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down server");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(ServerError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (http_result, worker_result, signal_result) =
        tokio::join!(http_handle, worker_handle, signal_handle);

    handle_join("http_server", http_result)?;
    handle_join("follow_up_worker", worker_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

async fn get_checkpoint(
    Extension(state): Extension<AppState>,
    Path(artifact): Path<String>,
) -> Result<Json<Checkpoint>, ServerError> {
    let artifact = parse_artifact(&artifact)?;
    let data_dir = state.pipeline.data_dir().to_path_buf();
    let loaded = tokio::task::spawn_blocking(move || checkpoint::load_at(&data_dir, artifact))
        .await
        .map_err(|err| ServerError::Protocol(format!("checkpoint task join error: {err}")))??;
    loaded
        .map(Json)
        .ok_or(ServerError::NoCheckpoint { artifact })
}

async fn trigger_sync(
    Extension(state): Extension<AppState>,
    Path(artifact): Path<String>,
    headers: HeaderMap,
    Json(request): Json<SyncRequest>,
) -> Result<Response, ServerError> {
    let artifact = parse_artifact(&artifact)?;
    if request.bulk && artifact != ArtifactKind::Photos {
        return Err(ServerError::InvalidInput(
            "bulk mode only applies to photos".to_string(),
        ));
    }
    let selection = selection_for(&request)?;
    let flight = state.flights.acquire(artifact)?;

    let mut options = RunOptions::new(artifact, selection);
    options.resume = request.resume;
    options.bulk = request.bulk;
    // Setup errors become a status code before any frame is written.
    preflight(&state.pipeline, options.clone()).await?;
    tracing::info!(
        artifact = %artifact,
        selection = %options.selection,
        stream = wants_stream(&request, &headers),
        "sync requested"
    );

    if wants_stream(&request, &headers) {
        return Ok(stream_run(state, flight, options, request.follow_up));
    }

    let selection = options.selection.clone();
    let report = run_blocking(&state.pipeline, flight, options, NullSink).await?;
    queue_follow_ups(&state, &report, &selection, request.follow_up).await;
    Ok(Json(SyncResponse {
        summary: report.summary,
        results: report.results,
    })
    .into_response())
}

/// Run the pipeline on a blocking worker and turn its events into
/// `data:` frames. A closed channel means the client went away; the sink
/// reports that back and the pipeline stops after the current employee.
fn stream_run(
    state: AppState,
    flight: FlightGuard,
    options: RunOptions,
    follow_up: bool,
) -> Response {
    let (tx, rx) = mpsc::channel::<String>(FRAME_BUFFER);
    let frames = tx.clone();
    let sink = FnSink(move |event: ProgressEvent| match encode_frame(&event) {
        Ok(frame) => frames.blocking_send(frame).is_ok(),
        Err(err) => {
            tracing::error!(error = %err, "failed to encode progress frame");
            true
        }
    });

    tokio::spawn(async move {
        let selection = options.selection.clone();
        match run_blocking(&state.pipeline, flight, options, sink).await {
            Ok(report) => queue_follow_ups(&state, &report, &selection, follow_up).await,
            Err(err) => {
                tracing::error!(error = %err, "streamed sync failed");
                let _ = tx.send(encode_error(&err.to_string())).await;
            }
        }
    });

    let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    (
        [(CONTENT_TYPE, EVENT_STREAM), (CACHE_CONTROL, "no-cache")],
        Body::from_stream(stream),
    )
        .into_response()
}

async fn run_blocking<S>(
    pipeline: &Arc<Pipeline>,
    flight: FlightGuard,
    options: RunOptions,
    mut sink: S,
) -> Result<RunReport, ServerError>
where
    S: ProgressSink + Send + 'static,
{
    let pipeline = pipeline.clone();
    let report = tokio::task::spawn_blocking(move || {
        let _flight = flight;
        pipeline.run(&options, &mut sink)
    })
    .await
    .map_err(|err| ServerError::Protocol(format!("sync task join error: {err}")))??;
    tracing::info!(
        artifact = %report.artifact,
        successful = report.summary.successful,
        partial = report.summary.partial,
        failed = report.summary.failed,
        skipped = report.summary.skipped,
        cancelled = report.cancelled,
        "sync finished"
    );
    Ok(report)
}

async fn preflight(pipeline: &Arc<Pipeline>, options: RunOptions) -> Result<(), ServerError> {
    let pipeline = pipeline.clone();
    tokio::task::spawn_blocking(move || pipeline.preflight(&options).map(|_| ()))
        .await
        .map_err(|err| ServerError::Protocol(format!("preflight task join error: {err}")))??;
    Ok(())
}

async fn queue_follow_ups(
    state: &AppState,
    report: &RunReport,
    selection: &Selection,
    requested: bool,
) {
    if !requested || report.artifact != ArtifactKind::Photos || report.cancelled {
        return;
    }
    match state.follow_ups.enqueue_after_photos(selection).await {
        Ok(_) => tracing::info!(selection = %selection, "queued document and certificate follow-ups"),
        Err(err) => tracing::warn!(error = %err, "could not queue follow-up syncs"),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_artifact(raw: &str) -> Result<ArtifactKind, ServerError> {
    raw.parse().map_err(ServerError::InvalidInput)
}

fn selection_for(request: &SyncRequest) -> Result<Selection, ServerError> {
    match request.institution_id.as_deref().map(str::trim) {
        None => Ok(Selection::all()),
        Some("") => Err(ServerError::InvalidInput(
            "institutionId must not be empty".to_string(),
        )),
        Some(id) if !directory::is_valid_institution_id(id) => Err(ServerError::InvalidInput(
            format!("institutionId '{id}' is not a valid institution id"),
        )),
        Some(id) => Ok(Selection::institution(id)),
    }
}

fn wants_stream(request: &SyncRequest, headers: &HeaderMap) -> bool {
    request.stream
        || headers
            .get(ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains(EVENT_STREAM))
}

fn handle_join(
    task: &str,
    result: Result<Result<(), ServerError>, tokio::task::JoinError>,
) -> Result<(), ServerError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(ServerError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

/// `RUST_LOG` filter (default `info`); `HRSYNC_LOG_FORMAT=json` switches to
/// one JSON object per line.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("HRSYNC_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let _ = if json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
    } else {
        fmt().with_env_filter(filter).with_target(false).try_init()
    };
}
