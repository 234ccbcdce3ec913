use std::fmt;

/// Client-side error types.
///
/// Every remote failure collapses into one of these variants and carries the
/// text the transport or the service provided. Nothing here is retried
/// automatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The request never produced a response (connection refused, DNS, timeout).
    Transport(String),
    /// The service answered with a non-success status.
    Status {
        /// HTTP status code.
        status: u16,
        /// Human-readable text extracted from the response body.
        message: String,
    },
    /// The bearer token was missing, expired or rejected (HTTP 401).
    Unauthorized(String),
    /// The usage gate refused the submission before any request was made.
    QuotaExceeded(String),
    /// The current plan does not include the requested capability.
    FeatureUnavailable(String),
    /// Caller input was rejected locally.
    InvalidInput(String),
    /// A response body could not be decoded.
    Decode(String),
    /// A batch submission is already running on this store.
    SubmissionInFlight,
    /// Local token storage could not be read or written.
    Storage(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<ClientError>,
        /// Additional context message.
        context: String,
    },
}

impl ClientError {
    /// Returns true when this error (or the error it wraps) is an auth failure.
    pub fn is_unauthorized(&self) -> bool {
        match self {
            ClientError::Unauthorized(_) => true,
            ClientError::WithContext { source, .. } => source.is_unauthorized(),
            _ => false,
        }
    }

    /// Returns true for errors produced locally, without touching the network.
    pub fn is_local_rejection(&self) -> bool {
        match self {
            ClientError::QuotaExceeded(_)
            | ClientError::FeatureUnavailable(_)
            | ClientError::InvalidInput(_)
            | ClientError::SubmissionInFlight => true,
            ClientError::WithContext { source, .. } => source.is_local_rejection(),
            _ => false,
        }
    }

    /// HTTP status of the failed call, if the service answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            ClientError::Unauthorized(_) => Some(401),
            ClientError::WithContext { source, .. } => source.status(),
            _ => None,
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Transport(msg) => write!(f, "Network error: {}", msg),
            ClientError::Status { status, message } => {
                write!(f, "Request failed ({}): {}", status, message)
            }
            ClientError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ClientError::QuotaExceeded(msg) => write!(f, "{}", msg),
            ClientError::FeatureUnavailable(msg) => write!(f, "{}", msg),
            ClientError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            ClientError::Decode(msg) => write!(f, "Unexpected response: {}", msg),
            ClientError::SubmissionInFlight => {
                write!(f, "A submission is already in progress")
            }
            ClientError::Storage(msg) => write!(f, "Token storage error: {}", msg),
            ClientError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for ClientError {}

impl From<reqwest::Error> for ClientError {
    /// Converts a `reqwest::Error` into a `ClientError`.
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Transport(format!("request timed out: {}", err))
        } else if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `ClientError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, ClientError>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F>(self, f: F) -> Result<T, ClientError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, ClientError> {
    fn context(self, context: impl Into<String>) -> Result<T, ClientError> {
        self.map_err(|e| ClientError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, ClientError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| ClientError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}

/// Extension for std::io::Error used by the token file store
impl<T> ResultExt<T> for Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T, ClientError> {
        self.map_err(|e| ClientError::WithContext {
            source: Box::new(ClientError::Storage(e.to_string())),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, ClientError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| ClientError::WithContext {
            source: Box::new(ClientError::Storage(e.to_string())),
            context: f(),
        })
    }
}
