use thiserror::Error;

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("document error: {0}")]
    Document(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("subscription error: {0}")]
    Subscription(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl MergeError {
    /// Category of an error that reached the binary, looking through
    /// `anyhow` context layers.
    pub fn classify(err: &anyhow::Error) -> MergeErrorKind {
        if let Some(me) = err.downcast_ref::<MergeError>() {
            return me.kind();
        }
        if err.downcast_ref::<std::io::Error>().is_some() {
            return MergeErrorKind::Io;
        }
        MergeErrorKind::Other
    }

    /// Get the kind/category of this error.
    pub fn kind(&self) -> MergeErrorKind {
        match self {
            MergeError::Io(_) => MergeErrorKind::Io,
            MergeError::Document(_) => MergeErrorKind::Document,
            MergeError::Config(_) => MergeErrorKind::Config,
            MergeError::Pattern { .. } => MergeErrorKind::Pattern,
            MergeError::Fetch(_) => MergeErrorKind::Fetch,
            MergeError::Subscription(_) => MergeErrorKind::Subscription,
            MergeError::Other(_) => MergeErrorKind::Other,
        }
    }
}

// The request url is dropped: its query may carry a subscription token.
impl From<reqwest::Error> for MergeError {
    fn from(e: reqwest::Error) -> Self {
        let e = e.without_url();
        if e.is_timeout() {
            MergeError::Fetch(format!("request timed out: {}", e))
        } else {
            MergeError::Fetch(e.to_string())
        }
    }
}

/// Lightweight error category for pattern matching without borrowing the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeErrorKind {
    Io,
    Document,
    Config,
    Pattern,
    Fetch,
    Subscription,
    Other,
}

impl MergeErrorKind {
    /// Process exit status: 2 for bad invocation (options, rules), 1 otherwise.
    pub fn exit_code(self) -> i32 {
        match self {
            MergeErrorKind::Config | MergeErrorKind::Pattern => 2,
            _ => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MergeErrorKind::Io => "IO",
            MergeErrorKind::Document => "DOCUMENT",
            MergeErrorKind::Config => "CONFIG",
            MergeErrorKind::Pattern => "PATTERN",
            MergeErrorKind::Fetch => "FETCH",
            MergeErrorKind::Subscription => "SUBSCRIPTION",
            MergeErrorKind::Other => "OTHER",
        }
    }
}

pub type Result<T, E = MergeError> = std::result::Result<T, E>;
