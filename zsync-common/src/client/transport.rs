//! HTTP transport seam.
//!
//! [`TrackerClient`](super::TrackerClient) builds [`HttpRequest`] values and
//! hands them to a [`Transport`]. Production code uses [`UreqTransport`];
//! tests substitute the in-memory [`MockTracker`](crate::MockTracker).

use crate::errors::ErrorCode;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// HTTP verbs used against the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    /// Single-file `multipart/form-data` upload.
    Multipart {
        field: String,
        file_name: String,
        bytes: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    /// Absolute URL including the query string.
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn json(&self) -> Option<&Value> {
        match &self.body {
            Some(RequestBody::Json(value)) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json(status: u16, body: &Value) -> Self {
        Self::new(status, body.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Errors raised while talking to the tracker.
#[derive(Debug, Error)]
pub enum TransportError {
    /// 403 or 405: the test-management add-on refuses service.
    #[error("license expired or access denied: HTTP {status} from {method} {path}")]
    LicenseExpired {
        method: HttpMethod,
        path: String,
        status: u16,
    },

    #[error("HTTP {status} from {method} {path}: {body}")]
    Http {
        method: HttpMethod,
        path: String,
        status: u16,
        body: String,
    },

    #[error("{method} {path} failed: {message}")]
    Request {
        method: HttpMethod,
        path: String,
        message: String,
    },

    #[error("unexpected response from {path}: {message}")]
    Decode { path: String, message: String },

    #[error("failed to read attachment {}: {source}", path.display())]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TransportError {
    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::LicenseExpired { status, .. } | Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::LicenseExpired { .. } => ErrorCode::TransportLicenseExpired,
            Self::Http { status: 404, .. } => ErrorCode::TransportLinkTargetNotFound,
            Self::Http { .. } => ErrorCode::TransportHttpError,
            Self::Request { .. } => ErrorCode::TransportRequestFailed,
            Self::Decode { .. } => ErrorCode::TransportDecodeError,
            Self::Attachment { .. } => ErrorCode::ReportUploadFailed,
        }
    }
}

/// Executes HTTP requests on behalf of the tracker client.
pub trait Transport: Send + Sync {
    /// Perform `request` and return the response whatever its status.
    ///
    /// Only failures to send or read are errors; status mapping is done by
    /// the caller.
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Blocking transport backed by a shared `ureq` agent.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self { agent }
    }
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

fn multipart_boundary() -> String {
    format!("zsync-{}", Uuid::new_v4().simple())
}

/// Escape a quoted form-data parameter the way browsers do: `"`, CR and LF
/// are percent-encoded so the value cannot break out of its quotes.
fn quote_param(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '"' => quoted.push_str("%22"),
            '\r' => quoted.push_str("%0D"),
            '\n' => quoted.push_str("%0A"),
            _ => quoted.push(ch),
        }
    }
    quoted
}

/// Encode a single-file multipart body.
pub fn encode_multipart(boundary: &str, field: &str, file_name: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(bytes.len() + 256);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            quote_param(field),
            quote_param(file_name)
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = request.url.as_str();
        let headers = request.headers.as_slice();

        let result = match (request.method, &request.body) {
            (HttpMethod::Get, _) => with_headers(self.agent.get(url), headers).call(),
            (HttpMethod::Delete, _) => with_headers(self.agent.delete(url), headers).call(),
            (method, body) => {
                let builder = match method {
                    HttpMethod::Put => self.agent.put(url),
                    _ => self.agent.post(url),
                };
                let builder = with_headers(builder, headers);
                match body {
                    Some(RequestBody::Json(value)) => builder.send_json(value),
                    Some(RequestBody::Multipart {
                        field,
                        file_name,
                        bytes,
                    }) => {
                        let boundary = multipart_boundary();
                        let payload = encode_multipart(&boundary, field, file_name, bytes);
                        builder
                            .header(
                                "Content-Type",
                                format!("multipart/form-data; boundary={boundary}"),
                            )
                            .send(&payload[..])
                    }
                    None => builder.send_empty(),
                }
            }
        };

        let mut response = result.map_err(|err| TransportError::Request {
            method: request.method,
            path: request.url.clone(),
            message: err.to_string(),
        })?;
        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|err| TransportError::Request {
                method: request.method,
                path: request.url.clone(),
                message: err.to_string(),
            })?;
        Ok(HttpResponse { status, body })
    }
}
