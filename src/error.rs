use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

/// Fatal for the run: the media server cannot be used at all.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Plex server at {url} is unreachable: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Plex rejected the access token (status {status})")]
    Unauthorized { status: u16 },

    #[error("Library section '{name}' not found (available: {})", .available.join(", "))]
    SectionNotFound { name: String, available: Vec<String> },

    #[error("Plex returned status {status} for {url}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("Invalid response from Plex: {0}")]
    InvalidResponse(String),

    #[error("Failed to build Plex HTTP client: {0}")]
    Client(String),
}

/// A single metadata field could not be read. Recovered by the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("field '{0}' is missing")]
    Missing(&'static str),

    #[error("field '{0}' has an unexpected type")]
    WrongType(&'static str),
}

/// Per-show lookup failure. The show is still exported with unknown totals.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    #[error("no TVMaze match for '{0}'")]
    NotFound(String),

    #[error("ambiguous TVMaze match for '{title}': {}", .candidates.join(" | "))]
    Ambiguous {
        title: String,
        candidates: Vec<String>,
    },

    #[error("'{0}' shares its lookup key with another library show")]
    DuplicateLibraryTitle(String),

    #[error("rate limited by TVMaze after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("TVMaze request failed: {0}")]
    Request(String),

    #[error("failed to parse TVMaze response: {0}")]
    Parse(String),
}
