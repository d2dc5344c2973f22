//! Wire format of the sync trigger, shared by the server and the blocking
//! trigger client.
//!
//! A streamed run is a sequence of `data: <json>\n\n` frames. Every frame
//! carries a `type`: `progress` for each resolved employee, exactly one
//! `complete` at the end, or `error` when the run could not start after the
//! stream was opened.

use std::io::{BufRead, BufReader};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use hrsync_core::ArtifactKind;
use hrsync_sync::{ProgressEvent, Summary, SyncResult};

use crate::error::ServerError;

/// Body of `POST /api/hrims/sync/{artifact}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    /// Absent means every institution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub institution_id: Option<String>,
    #[serde(default)]
    pub stream: bool,
    /// Photos only: queue document and certificate runs for the same
    /// institution once the photo run completes.
    #[serde(default)]
    pub follow_up: bool,
    #[serde(default)]
    pub resume: bool,
    #[serde(default)]
    pub bulk: bool,
}

/// Buffered (non-streaming) response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResponse {
    pub summary: Summary,
    pub results: Vec<SyncResult>,
}

/// One decoded stream frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    Event(ProgressEvent),
    Error(String),
}

pub const EVENT_STREAM: &str = "text/event-stream";

/// `data: <json>\n\n`
pub fn encode_frame<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    Ok(format!("data: {}\n\n", serde_json::to_string(value)?))
}

pub fn encode_error(message: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({ "type": "error", "message": message })
    )
}

/// Reassembles frames from a line-oriented reader.
///
/// Multiple `data:` lines in one frame are joined with `\n`; lines that are
/// not `data:` fields (comments, `event:`) are ignored.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    data: Vec<String>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line without its terminator. Returns a frame when `line`
    /// is the blank line that closes one.
    pub fn push_line(&mut self, line: &str) -> Option<Result<StreamFrame, serde_json::Error>> {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            if self.data.is_empty() {
                return None;
            }
            let payload = self.data.join("\n");
            self.data.clear();
            return Some(decode_payload(&payload));
        }
        if let Some(rest) = line.strip_prefix("data:") {
            self.data.push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
        }
        None
    }

    /// Anything left over when the stream ends without a closing blank line.
    pub fn finish(&mut self) -> Option<Result<StreamFrame, serde_json::Error>> {
        self.push_line("")
    }
}

fn decode_payload(payload: &str) -> Result<StreamFrame, serde_json::Error> {
    let value: Value = serde_json::from_str(payload)?;
    if value.get("type").and_then(Value::as_str) == Some("error") {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Ok(StreamFrame::Error(message));
    }
    Ok(StreamFrame::Event(serde_json::from_value(value)?))
}

// ---------------------------------------------------------------------------
// Trigger client
// ---------------------------------------------------------------------------

/// Final state of a triggered run as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerOutcome {
    pub summary: Summary,
    pub results: Vec<SyncResult>,
    pub cancelled: bool,
}

/// Start a streamed run on the server at `base_url` and block until its
/// `complete` frame arrives. Every frame is handed to `on_frame` first.
pub fn trigger(
    base_url: &str,
    artifact: ArtifactKind,
    request: &SyncRequest,
    mut on_frame: impl FnMut(&StreamFrame),
) -> Result<TriggerOutcome, ServerError> {
    let url = format!("{}/api/hrims/sync/{artifact}", base_url.trim_end_matches('/'));
    let body = SyncRequest {
        stream: true,
        ..request.clone()
    };
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(5))
        .build();
    let response = agent
        .post(&url)
        .set("Accept", EVENT_STREAM)
        .send_json(serde_json::to_value(&body)?)
        .map_err(|err| remote_error(&url, err))?;

    let reader = BufReader::new(response.into_reader());
    let mut decoder = FrameDecoder::new();
    let mut lines = reader.lines();
    loop {
        let frame = match lines.next() {
            Some(line) => {
                let line = line.map_err(|e| crate::error::io_err(&url, e))?;
                decoder.push_line(&line)
            }
            None => match decoder.finish() {
                Some(frame) => Some(frame),
                None => break,
            },
        };
        let Some(frame) = frame else { continue };
        let frame = frame?;
        on_frame(&frame);
        match frame {
            StreamFrame::Event(ProgressEvent::Complete {
                results,
                summary,
                cancelled,
            }) => {
                return Ok(TriggerOutcome {
                    summary,
                    results,
                    cancelled,
                })
            }
            StreamFrame::Error(message) => {
                return Err(ServerError::Remote {
                    status: 200,
                    message,
                })
            }
            StreamFrame::Event(_) => {}
        }
    }
    Err(ServerError::Protocol(
        "stream ended without a complete frame".to_string(),
    ))
}

/// `GET /health`
pub fn health(base_url: &str) -> Result<bool, ServerError> {
    let url = format!("{}/health", base_url.trim_end_matches('/'));
    let value: Value = ureq::get(&url)
        .timeout(Duration::from_secs(5))
        .call()
        .map_err(|err| remote_error(&url, err))?
        .into_json()
        .map_err(|e| crate::error::io_err(&url, e))?;
    Ok(value.get("ok").and_then(Value::as_bool).unwrap_or(false))
}

fn remote_error(url: &str, err: ureq::Error) -> ServerError {
    match err {
        ureq::Error::Status(status, response) => {
            let message = response
                .into_json::<Value>()
                .ok()
                .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| "no error body".to_string());
            ServerError::Remote { status, message }
        }
        ureq::Error::Transport(transport) => ServerError::Unreachable {
            url: url.to_string(),
            message: transport.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hrsync_sync::SyncStatus;

    fn feed(decoder: &mut FrameDecoder, text: &str) -> Vec<StreamFrame> {
        text.split('\n')
            .filter_map(|line| decoder.push_line(line))
            .map(|frame| frame.expect("valid frame"))
            .collect()
    }

    #[test]
    fn encoded_frames_decode_in_order() {
        let progress = ProgressEvent::Progress {
            current: 1,
            total: 2,
            subject_name: "Asha".to_string(),
            status: SyncStatus::Success,
            message: "Photo synced".to_string(),
            running_summary: Summary::default(),
        };
        let complete = ProgressEvent::Complete {
            results: vec![],
            summary: Summary::default(),
            cancelled: false,
        };
        let wire = format!(
            "{}{}",
            encode_frame(&progress).unwrap(),
            encode_frame(&complete).unwrap()
        );
        assert!(wire.starts_with("data: {\"type\":\"progress\""));

        let mut decoder = FrameDecoder::new();
        let frames = feed(&mut decoder, &wire);
        assert_eq!(
            frames,
            vec![StreamFrame::Event(progress), StreamFrame::Event(complete)]
        );
    }

    #[test]
    fn error_frames_and_multiline_data() {
        let mut decoder = FrameDecoder::new();
        let frames = feed(&mut decoder, &encode_error("institution 'x' not found"));
        assert_eq!(
            frames,
            vec![StreamFrame::Error("institution 'x' not found".to_string())]
        );

        let frames = feed(
            &mut decoder,
            ": keep-alive\r\ndata: {\"type\":\"error\",\r\ndata: \"message\":\"split\"}\r\n\r\n",
        );
        assert_eq!(frames, vec![StreamFrame::Error("split".to_string())]);
    }

    #[test]
    fn unterminated_trailing_frame_is_flushed_by_finish() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push_line(r#"data: {"type":"error","message":"late"}"#).is_none());
        let frame = decoder.finish().expect("frame").expect("valid");
        assert_eq!(frame, StreamFrame::Error("late".to_string()));
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn request_body_uses_camel_case_and_defaults() {
        let request: SyncRequest =
            serde_json::from_str(r#"{"institutionId":"inst-1","followUp":true}"#).unwrap();
        assert_eq!(request.institution_id.as_deref(), Some("inst-1"));
        assert!(request.follow_up);
        assert!(!request.stream);
        assert!(!request.bulk);
    }
}
