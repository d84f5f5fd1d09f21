use std::path::PathBuf;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request to {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("request to {url} returned http status {status}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("request to {url} returned an empty body")]
    EmptyBody { url: String },

    #[error("invalid request header {name:?}")]
    InvalidHeader { name: String },
}

impl FetchError {
    /// Worth another attempt under the retry budget.
    pub fn is_transient(&self) -> bool {
        !matches!(self, FetchError::InvalidHeader { .. })
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("no segment matching <prefix>_<rendition>_<index>.<ext> in playlist {url}")]
    NoSegments { url: String },

    #[error("invalid playlist url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("malformed media playlist {url}: {reason}")]
    Malformed { url: String, reason: String },

    #[error("segment index {index} is beyond the limit of {limit} tracked segments")]
    IndexLimit { index: u64, limit: u64 },

    #[error("inline playlist has no source url to fetch from")]
    MissingSource,

    #[error("segment naming changed upstream: no entry under {expected_prefix}")]
    SchemeDrift { expected_prefix: String },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("no segment finished downloading, nothing to assemble")]
    Empty,
}

#[derive(thiserror::Error, Debug)]
pub enum ArchiveError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("{action} {}: {source}", path.display())]
    Filesystem {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Assembly(#[from] AssemblyError),
}

impl ArchiveError {
    pub(crate) fn fs(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArchiveError::Filesystem { action, path: path.into(), source }
    }
}
