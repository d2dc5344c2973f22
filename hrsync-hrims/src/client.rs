//! External Fetch Client: one authenticated, timeout-bounded HRIMS call per
//! artifact request.
//!
//! Every request is `POST <base_url><endpoint>` with the JSON body
//! `{"RequestId": "<id>", "SearchCriteria": "<key>"}` and two static
//! credential headers: `ApiKey` and `Authorization: Bearer <token>`.

use std::io::Read;
use std::time::Duration;

use hrsync_core::{ArtifactKind, HrimsConfig, SearchKey};
use serde_json::json;

use crate::error::FetchError;

/// Hard ceiling on a single response body (bulk institution photo dumps
/// are large, but not unbounded).
const MAX_BODY_BYTES: u64 = 512 * 1024 * 1024;

/// Raw HRIMS response: body bytes plus the declared content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn json(body: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: Some("application/json".to_string()),
            body: body.into(),
        }
    }
}

/// The outbound HRIMS seam. The pipeline only talks to this trait.
pub trait HrimsApi: Send + Sync {
    /// Fetch one artifact family for a single employee.
    fn fetch(&self, key: &SearchKey, kind: ArtifactKind) -> Result<RawResponse, FetchError>;

    /// Fetch every employee photo of an institution in one bulk call.
    fn fetch_institution_photos(&self, key: &SearchKey) -> Result<RawResponse, FetchError>;
}

/// `ureq`-backed [`HrimsApi`] implementation.
pub struct HrimsClient {
    agent: ureq::Agent,
    config: HrimsConfig,
}

impl HrimsClient {
    /// Build a client from already-resolved configuration.
    pub fn new(config: HrimsConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10).min(config.timeout()))
            .build();
        Self { agent, config }
    }

    fn url(&self) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.endpoint.trim_start_matches('/')
        )
    }

    fn request_id(&self, kind: ArtifactKind) -> &str {
        match kind {
            ArtifactKind::Photos => &self.config.request_ids.photo,
            ArtifactKind::Documents => &self.config.request_ids.documents,
            ArtifactKind::Certificates => &self.config.request_ids.certificates,
        }
    }

    fn post(
        &self,
        request_id: &str,
        key: &SearchKey,
        timeout: Duration,
    ) -> Result<RawResponse, FetchError> {
        let url = self.url();
        tracing::debug!("POST {url} request_id={request_id} key={key}");

        let result = self
            .agent
            .post(&url)
            .timeout(timeout)
            .set("ApiKey", &self.config.api_key)
            .set("Authorization", &format!("Bearer {}", self.config.token))
            .set("Accept", "application/json")
            .send_json(json!({
                "RequestId": request_id,
                "SearchCriteria": key.value(),
            }));

        let response = match result {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => return Err(FetchError::Status(code)),
            Err(ureq::Error::Transport(transport)) => {
                return Err(classify_transport(&transport, timeout))
            }
        };

        let content_type = response.header("Content-Type").map(str::to_string);
        let body = read_body(response.into_reader(), MAX_BODY_BYTES, timeout)?;

        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(FetchError::NoData);
        }
        Ok(RawResponse { content_type, body })
    }
}

impl HrimsApi for HrimsClient {
    fn fetch(&self, key: &SearchKey, kind: ArtifactKind) -> Result<RawResponse, FetchError> {
        self.post(self.request_id(kind), key, self.config.timeout())
    }

    fn fetch_institution_photos(&self, key: &SearchKey) -> Result<RawResponse, FetchError> {
        self.post(
            &self.config.request_ids.institution_photos,
            key,
            self.config.bulk_timeout(),
        )
    }
}

/// Read at most `limit` bytes. One byte past the limit means the body was
/// cut short, which is an error rather than a silently truncated artifact.
fn read_body(reader: impl Read, limit: u64, timeout: Duration) -> Result<Vec<u8>, FetchError> {
    let mut body = Vec::new();
    reader
        .take(limit + 1)
        .read_to_end(&mut body)
        .map_err(|err| classify_io(&err, timeout))?;
    if body.len() as u64 > limit {
        tracing::warn!("HRIMS response exceeded {limit} bytes; discarding");
        return Err(FetchError::TooLarge { limit });
    }
    Ok(body)
}

fn classify_transport(transport: &ureq::Transport, timeout: Duration) -> FetchError {
    let io = std::error::Error::source(transport)
        .and_then(|source| source.downcast_ref::<std::io::Error>());
    if let Some(io) = io {
        return classify_io(io, timeout);
    }
    let message = transport.to_string().to_ascii_lowercase();
    if message.contains("timed out") || message.contains("timeout") {
        FetchError::Timeout(timeout)
    } else {
        tracing::debug!("transport failure ({:?}): {transport}", transport.kind());
        FetchError::NoResponse
    }
}

fn classify_io(err: &std::io::Error, timeout: Duration) -> FetchError {
    match err.kind() {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
            FetchError::Timeout(timeout)
        }
        _ => FetchError::NoResponse,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;

    fn config(base_url: String) -> HrimsConfig {
        HrimsConfig {
            base_url,
            api_key: "key-123".to_string(),
            token: "tok-456".to_string(),
            timeout_secs: 2,
            ..HrimsConfig::default()
        }
    }

    /// Serve exactly one HTTP exchange; returns the raw request head+body.
    fn serve_once(status_line: &'static str, body: &'static str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream.try_clone().expect("clone"));
            let mut request = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).expect("read line");
                if let Some(v) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = v.trim().parse().unwrap_or(0);
                }
                request.push_str(&line);
                if line == "\r\n" || line.is_empty() {
                    break;
                }
            }
            let mut body_buf = vec![0u8; content_length];
            reader.read_exact(&mut body_buf).expect("read body");
            request.push_str(&String::from_utf8_lossy(&body_buf));

            let response = format!(
                "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).expect("write");
            request
        });
        (format!("http://{addr}"), handle)
    }

    #[test]
    fn sends_credentials_and_search_criteria() {
        let (base, handle) = serve_once("HTTP/1.1 200 OK", r#"{"data":{"Picture":"aGVsbG8="}}"#);
        let client = HrimsClient::new(config(base));

        let raw = client
            .fetch(&SearchKey::Payroll("P1".to_string()), ArtifactKind::Photos)
            .expect("fetch");
        assert!(String::from_utf8_lossy(&raw.body).contains("Picture"));

        let request = handle.join().expect("server thread").to_ascii_lowercase();
        assert!(request.starts_with("post /api/employees"), "got: {request}");
        assert!(request.contains("apikey: key-123"));
        assert!(request.contains("authorization: bearer tok-456"));
        assert!(request.contains(r#""searchcriteria":"p1""#));
        assert!(request.contains(r#""requestid":"203""#));
    }

    #[test]
    fn non_success_status_maps_to_api_error() {
        let (base, handle) = serve_once("HTTP/1.1 404 Not Found", "{}");
        let client = HrimsClient::new(config(base));
        let err = client
            .fetch(&SearchKey::Payroll("P1".to_string()), ArtifactKind::Documents)
            .unwrap_err();
        handle.join().expect("server thread");
        assert_eq!(err, FetchError::Status(404));
        assert_eq!(err.to_string(), "HRIMS API error: 404");
    }

    #[test]
    fn empty_body_is_no_data() {
        let (base, handle) = serve_once("HTTP/1.1 200 OK", "");
        let client = HrimsClient::new(config(base));
        let err = client
            .fetch(&SearchKey::Payroll("P1".to_string()), ArtifactKind::Photos)
            .unwrap_err();
        handle.join().expect("server thread");
        assert_eq!(err, FetchError::NoData);
    }

    #[test]
    fn oversized_body_is_refused_not_truncated() {
        let timeout = Duration::from_secs(1);
        let err = read_body(&b"12345"[..], 4, timeout).unwrap_err();
        assert_eq!(err, FetchError::TooLarge { limit: 4 });
        assert!(!err.is_transient());

        assert_eq!(read_body(&b"1234"[..], 4, timeout).unwrap(), b"1234");
    }

    #[test]
    fn refused_connection_is_no_response() {
        // Bind then drop to obtain a port nobody listens on.
        let port = TcpListener::bind("127.0.0.1:0")
            .expect("bind")
            .local_addr()
            .expect("addr")
            .port();
        let client = HrimsClient::new(config(format!("http://127.0.0.1:{port}")));
        let err = client
            .fetch(&SearchKey::Payroll("P1".to_string()), ArtifactKind::Photos)
            .unwrap_err();
        assert_eq!(err, FetchError::NoResponse);
        assert!(err.is_transient());
    }

    #[test]
    fn slow_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            thread::sleep(Duration::from_millis(1500));
            drop(stream);
        });
        let mut cfg = config(format!("http://{addr}"));
        cfg.timeout_secs = 1;
        let client = HrimsClient::new(cfg);
        let err = client
            .fetch(&SearchKey::Payroll("P1".to_string()), ArtifactKind::Photos)
            .unwrap_err();
        handle.join().expect("server thread");
        assert_eq!(err, FetchError::Timeout(Duration::from_secs(1)));
    }
}
