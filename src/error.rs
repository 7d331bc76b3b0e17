use std::time::Duration;

/// Failure talking to the hosting API.
///
/// This is the only error kind the audit components produce. Authentication
/// failures, rate limiting and transient network errors are not told apart;
/// callers decide per repository whether to abort or skip.
#[derive(Debug, thiserror::Error)]
pub enum RemoteApiError {
    /// The server answered with a non-success status.
    #[error("GET {url} returned HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// No usable response: connection, TLS or an undecodable body.
    #[error("GET {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: Box<octocrab::Error>,
    },

    #[error("GET {url} timed out after {after:?}")]
    Timeout { url: String, after: Duration },

    /// The response decoded but carried data we cannot use.
    #[error("unexpected response from {url}: {reason}")]
    Unexpected { url: String, reason: String },
}

impl RemoteApiError {
    /// HTTP status code, when the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            RemoteApiError::Status { url, .. }
            | RemoteApiError::Request { url, .. }
            | RemoteApiError::Timeout { url, .. }
            | RemoteApiError::Unexpected { url, .. } => url,
        }
    }

    /// Worth retrying: server-side errors, rate limiting, timeouts and
    /// requests that never got an answer.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteApiError::Status { status, .. } => *status >= 500 || *status == 429,
            RemoteApiError::Request { .. } | RemoteApiError::Timeout { .. } => true,
            RemoteApiError::Unexpected { .. } => false,
        }
    }
}
