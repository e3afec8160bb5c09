//! Control plane of the remote streaming service.
//!
//! The service is consumed as a plain request/response contract:
//!
//! | Operation | Request |
//! |---|---|
//! | start UDP stream | `GET /stream/udp/{device}?target=&port=&codec=&w=&h=&fps=&duration=` |
//! | feedback | `POST /stream/{device}/feedback?type=idr` |
//! | live MJPEG body | `GET /stream/live/{device}?codec=mjpeg&...` |
//!
//! Error responses carry `{"error": "<code>", "details": "<text>"}`.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::LiveStream;

/// Longest slice of an error body quoted in a [`TransportError::Status`].
const MAX_ERROR_BODY: usize = 200;

/// Feedback a receiver can send back to the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedbackKind {
    /// Ask the encoder for a fresh reference (IDR) frame.
    ReferenceFrame,
}

impl FeedbackKind {
    /// Query-string value understood by the service.
    pub fn as_str(self) -> &'static str {
        match self {
            FeedbackKind::ReferenceFrame => "idr",
        }
    }
}

impl std::fmt::Display for FeedbackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of a UDP stream start request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpStreamRequest {
    /// Capture device on the service side (e.g. `video0`).
    pub device: String,
    /// Host the service should send datagrams to.
    pub target: String,
    /// Port the service should send datagrams to.
    pub port: u16,
    /// Codec wire name (`mjpeg`, `h264`).
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// How long the service keeps sending.
    pub duration: Duration,
    /// Encoder bitrate in kbps (service default when `None`).
    pub bitrate_kbps: Option<u32>,
    /// Encoder GOP length (service default when `None`).
    pub gop: Option<u32>,
}

impl UdpStreamRequest {
    /// Query parameters in the order the request sends them.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("target", self.target.clone()),
            ("port", self.port.to_string()),
            ("codec", self.codec.clone()),
            ("w", self.width.to_string()),
            ("h", self.height.to_string()),
            ("fps", self.fps.to_string()),
            ("duration", self.duration.as_secs().max(1).to_string()),
        ];
        if let Some(bitrate) = self.bitrate_kbps {
            pairs.push(("bitrate", bitrate.to_string()));
        }
        if let Some(gop) = self.gop {
            pairs.push(("gop", gop.to_string()));
        }
        pairs
    }
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    error: String,
    #[serde(default)]
    details: Option<String>,
}

/// Blocking client for the service's control plane.
#[derive(Clone)]
pub struct ControlClient {
    agent: ureq::Agent,
    base_url: String,
    timeout: Duration,
}

impl ControlClient {
    /// Create a client for `base_url` (e.g. `http://capture-host:8080`).
    ///
    /// `timeout` bounds connecting and each individual read, so a live body
    /// that stalls for longer than `timeout` fails instead of hanging.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .build();
        Self {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Ask the service to start sending datagrams. Requires a 2xx answer.
    pub fn start_udp_stream(&self, request: &UdpStreamRequest) -> Result<()> {
        let url = format!("{}/stream/udp/{}", self.base_url, request.device);
        let mut req = self.agent.get(&url).timeout(self.timeout);
        for (key, value) in request.query_pairs() {
            req = req.query(key, &value);
        }

        info!(%url, target = %request.target, port = request.port, codec = %request.codec, "requesting udp stream");
        call(&url, req)?;
        Ok(())
    }

    /// Send one feedback message. Best effort, bounded by `timeout`.
    pub fn send_feedback(&self, device: &str, kind: FeedbackKind, timeout: Duration) -> Result<()> {
        let url = format!("{}/stream/{}/feedback", self.base_url, device);
        let req = self
            .agent
            .post(&url)
            .timeout(timeout)
            .query("type", kind.as_str());

        debug!(%url, kind = %kind, "sending feedback");
        call(&url, req)?;
        Ok(())
    }

    /// Open the live chunked body for `device`.
    ///
    /// `params` are appended after `codec=mjpeg`; a caller-supplied `codec`
    /// overrides it. Anything but `200 OK` closes the response and fails.
    pub fn open_live(&self, device: &str, params: &[(String, String)]) -> Result<LiveStream> {
        let url = format!("{}/stream/live/{}", self.base_url, device);
        let mut req = self
            .agent
            .get(&url)
            .set("Accept", "multipart/x-mixed-replace");
        if !params.iter().any(|(key, _)| key == "codec") {
            req = req.query("codec", "mjpeg");
        }
        for (key, value) in params {
            req = req.query(key, value);
        }

        info!(%url, "opening live stream");
        let response = call(&url, req)?;
        if response.status() != 200 {
            let status = response.status();
            let body = response.into_string().unwrap_or_default();
            return Err(TransportError::Status {
                url,
                status,
                message: error_message(&body),
            });
        }

        Ok(LiveStream::from_http(url, response.into_reader()))
    }
}

impl std::fmt::Debug for ControlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlClient")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn call(url: &str, request: ureq::Request) -> Result<ureq::Response> {
    match request.call() {
        Ok(response) => Ok(response),
        Err(ureq::Error::Status(status, response)) => {
            let body = response.into_string().unwrap_or_default();
            Err(TransportError::Status {
                url: url.to_string(),
                status,
                message: error_message(&body),
            })
        }
        Err(ureq::Error::Transport(transport)) => Err(TransportError::Request {
            url: url.to_string(),
            message: transport.to_string(),
        }),
    }
}

/// Human-readable message from an error body.
///
/// Prefers the service's `{"error", "details"}` shape and falls back to the
/// leading bytes of the raw body.
fn error_message(body: &str) -> String {
    if let Ok(err) = serde_json::from_str::<ServiceError>(body) {
        return match err.details {
            Some(details) if !details.is_empty() => format!("{}: {}", err.error, details),
            _ => err.error,
        };
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    match trimmed.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => trimmed[..idx].to_string(),
        None => trimmed.to_string(),
    }
}
