//! HTTP trigger for the sync pipeline: axum router, streamed progress
//! frames, single-flight guard and the follow-up queue.

mod error;
pub mod flight;
pub mod followup;
pub mod protocol;
mod runtime;

pub use error::{ErrorBody, ServerError};
pub use flight::{FlightGuard, InFlight};
pub use followup::{FollowUpHandle, FollowUpQueue};
pub use protocol::{
    encode_frame, health, trigger, FrameDecoder, StreamFrame, SyncRequest, SyncResponse,
    TriggerOutcome,
};
pub use runtime::{init_tracing, router, run, serve, start_blocking, AppState};
