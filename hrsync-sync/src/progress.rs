//! Progress Reporter.
//!
//! The pipeline hands every resolved subject to a [`ProgressReporter`], which
//! keeps the running [`Summary`] and forwards one [`ProgressEvent::Progress`]
//! per subject to a [`ProgressSink`]. [`ProgressReporter::complete`] consumes
//! the reporter, so the terminal [`ProgressEvent::Complete`] is sent exactly
//! once and nothing can follow it.
//!
//! Wire framing (`data: <json>\n\n`) belongs to the transport, not here.

use serde::{Deserialize, Serialize};

/// Final classification of one subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Success,
    Partial,
    Failed,
    Skipped,
}

impl SyncStatus {
    /// Classify from how many artifacts were requested and obtained.
    ///
    /// Nothing requested, or everything obtained, is `success`.
    pub fn from_counts(requested: usize, obtained: usize) -> Self {
        if obtained >= requested {
            SyncStatus::Success
        } else if obtained > 0 {
            SyncStatus::Partial
        } else {
            SyncStatus::Failed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Success => "success",
            SyncStatus::Partial => "partial",
            SyncStatus::Failed => "failed",
            SyncStatus::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Running or final counts. `total` always equals the sum of the others.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total: usize,
    pub successful: usize,
    pub partial: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Summary {
    pub fn record(&mut self, status: SyncStatus) {
        self.total += 1;
        match status {
            SyncStatus::Success => self.successful += 1,
            SyncStatus::Partial => self.partial += 1,
            SyncStatus::Failed => self.failed += 1,
            SyncStatus::Skipped => self.skipped += 1,
        }
    }

    pub fn merge(&mut self, other: &Summary) {
        self.total += other.total;
        self.successful += other.successful;
        self.partial += other.partial;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }

    pub fn is_consistent(&self) -> bool {
        self.successful + self.partial + self.failed + self.skipped == self.total
    }
}

/// Per-subject result record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    /// Employee id.
    pub identifier: String,
    pub subject_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub institution: String,
    pub status: SyncStatus,
    pub message: String,
    #[serde(default)]
    pub attempts: u32,
}

/// One streamed event. Serialized with a `type` discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProgressEvent {
    Progress {
        current: usize,
        total: usize,
        #[serde(rename = "subjectName")]
        subject_name: String,
        status: SyncStatus,
        message: String,
        #[serde(rename = "runningSummary")]
        running_summary: Summary,
    },
    Complete {
        results: Vec<SyncResult>,
        summary: Summary,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        cancelled: bool,
    },
}

impl ProgressEvent {
    pub fn is_complete(&self) -> bool {
        matches!(self, ProgressEvent::Complete { .. })
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Consumer of progress events.
pub trait ProgressSink {
    /// Deliver one event. Returns `false` once the consumer is gone; the
    /// pipeline treats that as cancellation.
    fn send(&mut self, event: ProgressEvent) -> bool;
}

impl ProgressSink for Vec<ProgressEvent> {
    fn send(&mut self, event: ProgressEvent) -> bool {
        self.push(event);
        true
    }
}

impl<S: ProgressSink + ?Sized> ProgressSink for &mut S {
    fn send(&mut self, event: ProgressEvent) -> bool {
        (**self).send(event)
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn send(&mut self, _event: ProgressEvent) -> bool {
        true
    }
}

/// Adapts a closure into a [`ProgressSink`].
pub struct FnSink<F>(pub F);

impl<F: FnMut(ProgressEvent) -> bool> ProgressSink for FnSink<F> {
    fn send(&mut self, event: ProgressEvent) -> bool {
        (self.0)(event)
    }
}

// ---------------------------------------------------------------------------
// Reporter
// ---------------------------------------------------------------------------

pub struct ProgressReporter<S: ProgressSink> {
    sink: S,
    total: usize,
    current: usize,
    summary: Summary,
    results: Vec<SyncResult>,
    connected: bool,
}

impl<S: ProgressSink> ProgressReporter<S> {
    pub fn new(sink: S, total: usize) -> Self {
        Self::resume(sink, total, 0, Summary::default())
    }

    /// Continue numbering after `offset` subjects that an earlier run already
    /// resolved into `seed`.
    pub fn resume(sink: S, total: usize, offset: usize, seed: Summary) -> Self {
        Self {
            sink,
            total,
            current: offset,
            summary: seed,
            results: Vec::new(),
            connected: true,
        }
    }

    /// Record one resolved subject and emit its `progress` event.
    ///
    /// Returns `false` once the sink has reported a disconnect.
    pub fn record(&mut self, result: SyncResult) -> bool {
        self.current += 1;
        self.summary.record(result.status);
        if self.connected {
            self.connected = self.sink.send(ProgressEvent::Progress {
                current: self.current,
                total: self.total,
                subject_name: result.subject_name.clone(),
                status: result.status,
                message: result.message.clone(),
                running_summary: self.summary,
            });
            if !self.connected {
                tracing::info!("progress consumer disconnected at {}/{}", self.current, self.total);
            }
        }
        self.results.push(result);
        self.connected
    }

    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Emit the terminal `complete` event and hand back results and summary.
    pub fn complete(mut self, cancelled: bool) -> (Vec<SyncResult>, Summary) {
        if self.connected {
            self.connected = self.sink.send(ProgressEvent::Complete {
                results: self.results.clone(),
                summary: self.summary,
                cancelled,
            });
        }
        (self.results, self.summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn result(name: &str, status: SyncStatus) -> SyncResult {
        SyncResult {
            identifier: name.to_lowercase(),
            subject_name: name.to_string(),
            institution: String::new(),
            status,
            message: String::new(),
            attempts: 0,
        }
    }

    #[rstest]
    #[case(1, 1, SyncStatus::Success)]
    #[case(0, 0, SyncStatus::Success)]
    #[case(4, 2, SyncStatus::Partial)]
    #[case(4, 0, SyncStatus::Failed)]
    #[case(1, 0, SyncStatus::Failed)]
    fn classification(#[case] requested: usize, #[case] obtained: usize, #[case] expected: SyncStatus) {
        assert_eq!(SyncStatus::from_counts(requested, obtained), expected);
    }

    #[test]
    fn current_is_one_to_n_and_complete_is_last() {
        let mut events = Vec::new();
        let mut reporter = ProgressReporter::new(&mut events, 3);
        reporter.record(result("A", SyncStatus::Skipped));
        reporter.record(result("B", SyncStatus::Success));
        reporter.record(result("C", SyncStatus::Skipped));
        let (results, summary) = reporter.complete(false);

        let currents: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Progress { current, .. } => Some(*current),
                ProgressEvent::Complete { .. } => None,
            })
            .collect();
        assert_eq!(currents, vec![1, 2, 3]);
        assert!(events.last().is_some_and(ProgressEvent::is_complete));
        assert_eq!(events.iter().filter(|e| e.is_complete()).count(), 1);
        assert_eq!(results.len(), 3);
        assert_eq!(summary.total, 3);
        assert_eq!((summary.successful, summary.skipped), (1, 2));
        assert!(summary.is_consistent());
    }

    #[test]
    fn resume_continues_numbering_and_summary() {
        let seed = Summary {
            total: 2,
            successful: 2,
            ..Summary::default()
        };
        let mut events = Vec::new();
        let mut reporter = ProgressReporter::resume(&mut events, 3, 2, seed);
        reporter.record(result("C", SyncStatus::Failed));
        let (_, summary) = reporter.complete(false);

        assert!(matches!(events[0], ProgressEvent::Progress { current: 3, total: 3, .. }));
        assert_eq!(summary.total, 3);
        assert_eq!(summary.failed, 1);
    }

    #[test]
    fn disconnect_stops_sending_but_keeps_counting() {
        let mut delivered = 0;
        let sink = FnSink(|_event: ProgressEvent| {
            delivered += 1;
            delivered < 2
        });
        let mut reporter = ProgressReporter::new(sink, 3);
        assert!(reporter.record(result("A", SyncStatus::Success)));
        assert!(!reporter.record(result("B", SyncStatus::Success)));
        assert!(!reporter.record(result("C", SyncStatus::Success)));
        let (_, summary) = reporter.complete(true);
        assert_eq!(summary.total, 3);
        assert_eq!(delivered, 2);
    }

    #[test]
    fn events_serialize_with_type_tag_and_camel_case() {
        let event = ProgressEvent::Progress {
            current: 1,
            total: 2,
            subject_name: "Asha".to_string(),
            status: SyncStatus::Partial,
            message: "2 of 4 documents".to_string(),
            running_summary: Summary {
                total: 1,
                partial: 1,
                ..Summary::default()
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["subjectName"], "Asha");
        assert_eq!(json["status"], "partial");
        assert_eq!(json["runningSummary"]["partial"], 1);

        let complete = ProgressEvent::Complete {
            results: vec![],
            summary: Summary::default(),
            cancelled: false,
        };
        let json = serde_json::to_value(&complete).unwrap();
        assert_eq!(json["type"], "complete");
        assert!(json.get("cancelled").is_none());
    }
}
