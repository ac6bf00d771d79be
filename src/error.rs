//! Error types for every stage of a conversion.
//!
//! Each collaborator has its own error enum so mocks and real clients report
//! failures in the same shape. The pipeline wraps them in [`ConvertError`]
//! without altering them.

/// Failure while downloading the source document.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Connection, TLS, timeout or body-read failure.
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("GET {url} returned HTTP {status}")]
    Status { status: u16, url: String },

    #[error("download cancelled")]
    Cancelled,
}

/// Failure while opening the document container or walking its body.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Bytes are not a readable zip container.
    #[error("invalid document container: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("document part {0} is missing from the container")]
    MissingPart(String),

    #[error("malformed XML in {part}: {message}")]
    Xml { part: String, message: String },

    /// Decompressed part is larger than the parser accepts.
    #[error("document part {part} exceeds {limit} bytes")]
    PartTooLarge { part: String, limit: u64 },

    #[error("main document part has no body element")]
    MissingBody,

    #[error("I/O error while reading document part: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure reported by the speech service or while streaming its audio.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("speech API key is not configured (set AZURE_SPEECH_KEY)")]
    MissingApiKey,

    #[error("invalid speech endpoint {endpoint}: {message}")]
    InvalidEndpoint { endpoint: String, message: String },

    #[error("speech transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success answer: quota, unsupported length or characters, upstream failure.
    #[error("speech service rejected request with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("speech synthesis cancelled")]
    Cancelled,
}

/// Umbrella error returned by the conversion pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error(transparent)]
    Transport(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
}

impl ConvertError {
    /// Short stage label used in log fields.
    pub fn stage(&self) -> &'static str {
        match self {
            ConvertError::Transport(_) => "fetch",
            ConvertError::Parse(_) => "parse",
            ConvertError::Synthesis(_) => "synthesis",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            ConvertError::Transport(FetchError::Cancelled)
                | ConvertError::Synthesis(SynthesisError::Cancelled)
        )
    }
}
