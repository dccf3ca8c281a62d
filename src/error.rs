//! Error types for bindery operations.

use thiserror::Error;

/// Errors that can occur while fetching, distilling, or packaging an article.
#[derive(Error, Debug)]
pub enum Error {
    /// The article could not be represented as a readable document.
    #[error("unsupported URL: {0:?}")]
    UnsupportedUrl(String),

    #[error("unable to parse url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unable to get {url:?}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected status code: {0}")]
    UnexpectedStatus(u16),

    #[error("HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("no body tag found")]
    NoBody,

    #[error("epub generation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// The XHTML serializer refuses to render a void element with children.
    #[error("void element <{0}> has child nodes")]
    VoidElementWithChildren(String),

    #[error("sink: {0}")]
    Sink(String),
}

pub type Result<T> = std::result::Result<T, Error>;
