//! HTTP transport for the `/_sql` endpoint.
//!
//! [`Transport`] is the seam a caller can swap out (a fake in tests, a
//! tracing proxy, whatever); [`ReqwestTransport`] is the one the client
//! actually builds by default. Connection reuse, gzip compression and
//! auth-header selection all live here so callers never construct a
//! request by hand.

use std::io::Write;
use std::time::Duration as StdDuration;
use std::time::Instant;

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use reqwest::header;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::{CrateDbError, Error, Result};

/// Wall-clock timing for a single round trip. This is the transport's own
/// view — just the time the HTTP exchange took; the façade subtracts the
/// server-reported `duration` from it to get the transport-only share.
#[derive(Debug, Clone, Copy, Default)]
pub struct Durations {
    pub request_ms: f64,
}

/// Wire sizes for a single round trip. `request_uncompressed_bytes` is
/// always the pre-compression payload length, so it equals `request_bytes`
/// whenever compression didn't trigger.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sizes {
    pub request_bytes: usize,
    pub response_bytes: usize,
    pub request_uncompressed_bytes: Option<usize>,
}

/// The raw, still-undecoded response body plus the instrumentation a
/// caller can log or export.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub body: serde_json::Value,
    pub durations: Durations,
    pub sizes: Sizes,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `body` to `path` (relative to the configured base URL) and
    /// return the decoded JSON envelope, or a [`Error::ServerError`] if
    /// the server answered with a structured error.
    ///
    /// `cancellation`, if given, aborts the in-flight request and yields a
    /// [`Error::RequestError`] the moment the token fires.
    async fn send(
        &self,
        path: &str,
        body: serde_json::Value,
        cancellation: Option<&CancellationToken>,
    ) -> Result<RawResponse>;
}

#[derive(Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    config: ClientConfig,
}

impl ReqwestTransport {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().pool_max_idle_per_host(config.max_connections);
        if config.keep_alive {
            builder = builder.tcp_keepalive(Some(StdDuration::from_secs(60)));
        }
        let client = builder.build()?;
        Ok(ReqwestTransport { client, config })
    }

    fn should_compress(&self, payload_len: usize) -> bool {
        self.config.enable_compression && payload_len >= self.config.compression_threshold
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        path: &str,
        body: serde_json::Value,
        cancellation: Option<&CancellationToken>,
    ) -> Result<RawResponse> {
        let url = format!("{}{}", self.config.base_url(), path);
        let payload = serde_json::to_vec(&body)?;
        let uncompressed_bytes = payload.len();

        let mut request = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json")
            .header(header::CONNECTION, if self.config.keep_alive { "keep-alive" } else { "close" });

        if let Some(schema) = &self.config.default_schema {
            request = request.header("Default-Schema", schema);
        }

        request = match &self.config.jwt {
            Some(jwt) => request.bearer_auth(jwt),
            None => request.basic_auth(&self.config.user, Some(&self.config.password)),
        };

        let compressed = self.should_compress(uncompressed_bytes);
        let wire_body = if compressed {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&payload).map_err(|e| Error::RequestError {
                message: format!("failed to gzip request body: {e}"),
                cause: Some(Box::new(e)),
            })?;
            request = request.header(header::CONTENT_ENCODING, "gzip");
            encoder.finish().map_err(|e| Error::RequestError {
                message: format!("failed to finalize gzip stream: {e}"),
                cause: Some(Box::new(e)),
            })?
        } else {
            payload
        };
        let request_bytes = wire_body.len();

        let start = Instant::now();
        let send_fut = request.body(wire_body).send();
        let response = match cancellation {
            Some(token) => tokio::select! {
                res = send_fut => res?,
                _ = token.cancelled() => {
                    return Err(Error::RequestError {
                        message: "request cancelled".to_string(),
                        cause: None,
                    });
                }
            },
            None => send_fut.await?,
        };
        let status = response.status();
        let text = response.text().await?;
        let elapsed = start.elapsed();
        let response_bytes = text.len();

        if !status.is_success() {
            return Err(parse_server_error(status, &text));
        }

        let value: serde_json::Value = serde_json::from_str(&text)?;
        Ok(RawResponse {
            body: value,
            durations: Durations {
                request_ms: elapsed.as_secs_f64() * 1000.0,
            },
            sizes: Sizes {
                request_bytes,
                response_bytes,
                request_uncompressed_bytes: Some(uncompressed_bytes),
            },
        })
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    code: i64,
    #[serde(default)]
    error_trace: Option<String>,
}

fn parse_server_error(status: reqwest::StatusCode, text: &str) -> Error {
    let status = http::StatusCode::from_u16(status.as_u16()).unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR);
    match serde_json::from_str::<ErrorEnvelope>(text) {
        Ok(envelope) => Error::ServerError(CrateDbError {
            message: envelope.error.message,
            code: envelope.error.code,
            error_trace: envelope.error.error_trace,
            status,
        }),
        Err(_) => Error::ServerError(CrateDbError {
            message: text.to_string(),
            code: -1,
            error_trace: None,
            status,
        }),
    }
}
