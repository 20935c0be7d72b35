use http::StatusCode;

/// Structured error returned by the server for a non-200 response.
#[derive(Clone)]
pub struct CrateDbError {
    pub message: String,
    pub code: i64,
    pub error_trace: Option<String>,
    pub status: StatusCode,
}

impl std::fmt::Display for CrateDbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CrateDB error {} (status {}): {}",
            self.code,
            self.status.as_u16(),
            self.message
        )
    }
}

impl std::fmt::Debug for CrateDbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

#[derive(thiserror::Error)]
pub enum Error {
    /// The server answered with a non-200 status and a structured error body.
    #[error("server: {0}")]
    ServerError(CrateDbError),

    /// Any transport-layer failure: DNS, connect, reset, timeout, or an
    /// unexpected runtime error while preparing or sending the request.
    #[error("request: {message}")]
    RequestError {
        message: String,
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The response body could not be parsed as JSON, or a typed column
    /// conversion failed.
    #[error("deserialization: {0}")]
    DeserializationError(String),

    /// A caller-supplied argument failed a fail-fast check before any I/O
    /// was attempted.
    #[error("validation: {0}")]
    ValidationError(String),
}

// thiserror's derived Debug prints every field of every variant, which for
// this crate means dumping the full response body or a chained transport
// error. Callers mostly log with `{}`, but `{:?}` should read the same.
impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::RequestError {
            message: e.to_string(),
            cause: Some(Box::new(e)),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::DeserializationError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_delegates_to_display() {
        let err = Error::ValidationError("bad input".to_string());
        assert_eq!(format!("{err:?}"), format!("{err}"));
    }

    #[test]
    fn server_error_display_includes_status_and_code() {
        let err = CrateDbError {
            message: "relation unknown".to_string(),
            code: 4041,
            error_trace: None,
            status: StatusCode::NOT_FOUND,
        };
        let rendered = err.to_string();
        assert!(rendered.contains("4041"));
        assert!(rendered.contains("404"));
        assert!(rendered.contains("relation unknown"));
    }
}
