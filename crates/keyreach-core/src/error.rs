use std::fmt;
use thiserror::Error;

/// A failed HTTP exchange. Always propagated, never swallowed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("invalid header value for '{name}'")]
    InvalidHeader { name: String },

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        let url = e
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        if e.is_timeout() {
            TransportError::Timeout { url }
        } else {
            TransportError::Request {
                url,
                message: e.to_string(),
            }
        }
    }
}

/// Top-level analyzer failure. These abort the analysis with no local recovery.
#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("missing required credential field '{0}'")]
    MissingCredential(String),

    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to decode response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unexpected status {status} from {endpoint}")]
    UnexpectedStatus { endpoint: String, status: u16 },

    #[error("grant source error: {0}")]
    Source(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Why a single walk branch failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchFailure {
    Transport(TransportError),
    Timeout,
    UnexpectedStatus(u16),
    Decode(String),
    Panicked(String),
}

impl fmt::Display for BranchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchFailure::Transport(e) => write!(f, "{}", e),
            BranchFailure::Timeout => write!(f, "deadline exceeded"),
            BranchFailure::UnexpectedStatus(status) => write!(f, "unexpected status {}", status),
            BranchFailure::Decode(msg) => write!(f, "failed to decode response: {}", msg),
            BranchFailure::Panicked(msg) => write!(f, "task panicked: {}", msg),
        }
    }
}

/// One failed branch of a resource walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchError {
    /// Label of the collection being fetched (e.g. `environments`).
    pub collection: String,
    /// Fully qualified name of the parent resource, if the branch had one.
    pub parent: Option<String>,
    pub failure: BranchFailure,
}

impl fmt::Display for BranchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parent {
            Some(parent) => write!(f, "{} of {}: {}", self.collection, parent, self.failure),
            None => write!(f, "{}: {}", self.collection, self.failure),
        }
    }
}

impl std::error::Error for BranchError {}

/// Every branch error of one walk, joined into a single error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkError {
    pub branches: Vec<BranchError>,
}

impl WalkError {
    /// Join collected branch errors; `None` when nothing failed.
    pub fn join(branches: Vec<BranchError>) -> Option<Self> {
        if branches.is_empty() {
            None
        } else {
            Some(Self { branches })
        }
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }
}

impl fmt::Display for WalkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.branches.iter().map(ToString::to_string).collect();
        write!(
            f,
            "{} branch(es) failed: {}",
            self.branches.len(),
            parts.join("; ")
        )
    }
}

impl std::error::Error for WalkError {}

/// A grant statement that could not be processed. Reported per statement.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot process grant '{statement}': {reason}")]
pub struct GrantParseError {
    pub statement: String,
    pub reason: String,
}
