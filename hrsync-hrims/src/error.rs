//! Error types for hrsync-hrims.

use std::time::Duration;

use thiserror::Error;

/// Failure of one outbound HRIMS call.
///
/// Display strings are surfaced verbatim in sync results.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// HRIMS answered with a non-success HTTP status.
    #[error("HRIMS API error: {0}")]
    Status(u16),

    /// The call exceeded its timeout.
    #[error("Timeout after {} minutes", format_minutes(.0))]
    Timeout(Duration),

    /// Connection refused, reset, DNS failure, or the body could not be read.
    #[error("No response from server")]
    NoResponse,

    /// HRIMS answered but the body was empty.
    #[error("No data found in response")]
    NoData,

    /// The body ran past the client's size ceiling. Never truncated.
    #[error("Response larger than {limit} bytes")]
    TooLarge { limit: u64 },
}

impl FetchError {
    /// Timeouts and connection failures are worth another attempt; anything
    /// HRIMS actually answered is definitive.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Timeout(_) | FetchError::NoResponse)
    }
}

/// Failure to extract an artifact from an HRIMS response body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    /// Body was empty, `null`, or not parseable as any known shape.
    #[error("No data found in response")]
    NoData,

    /// Body parsed, but no extraction strategy recognized it.
    #[error("unrecognized HRIMS response shape for {kind}")]
    UnrecognizedShape { kind: &'static str },
}

/// Render a duration as minutes without trailing zeros: 30s → `0.5`, 30m → `30`.
pub(crate) fn format_minutes(duration: &Duration) -> String {
    let minutes = duration.as_secs_f64() / 60.0;
    if minutes.fract() == 0.0 {
        format!("{}", minutes as u64)
    } else {
        let rendered = format!("{minutes:.2}");
        rendered.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_uses_minutes() {
        assert_eq!(
            FetchError::Timeout(Duration::from_secs(30 * 60)).to_string(),
            "Timeout after 30 minutes"
        );
        assert_eq!(
            FetchError::Timeout(Duration::from_secs(30)).to_string(),
            "Timeout after 0.5 minutes"
        );
        assert_eq!(
            FetchError::Timeout(Duration::from_secs(10)).to_string(),
            "Timeout after 0.17 minutes"
        );
    }

    #[test]
    fn fixed_messages() {
        assert_eq!(FetchError::Status(502).to_string(), "HRIMS API error: 502");
        assert_eq!(FetchError::NoResponse.to_string(), "No response from server");
        assert_eq!(FetchError::NoData.to_string(), "No data found in response");
    }

    #[test]
    fn only_network_failures_are_transient() {
        assert!(FetchError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(FetchError::NoResponse.is_transient());
        assert!(!FetchError::Status(404).is_transient());
        assert!(!FetchError::Status(500).is_transient());
        assert!(!FetchError::NoData.is_transient());
        assert!(!FetchError::TooLarge { limit: 1 }.is_transient());
    }
}
