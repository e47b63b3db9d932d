use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Failures while loading a track document. Always fatal.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("cannot read {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed XML {0}")]
    Malformed(String),

    #[error("document has no root element")]
    NoRoot,

    #[error("document ends inside an open element ({open} still open)")]
    Truncated { open: usize },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("unknown track format: {0}")]
    UnknownFormat(String),

    #[error("invalid lookup endpoint {url}: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("elevation lookup transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("elevation lookup still rate limited after retry")]
    RateLimited,

    #[error("elevation lookup returned HTTP {0}")]
    LookupStatus(StatusCode),

    #[error("malformed elevation lookup response: {0}")]
    MalformedResponse(String),

    #[error(
        "{unresolved} of {total} coordinates have no elevation ({:.1}% > {:.1}%)",
        .fraction * 100.0,
        .threshold * 100.0
    )]
    ThresholdExceeded {
        unresolved: usize,
        total: usize,
        fraction: f64,
        threshold: f64,
    },

    #[error("document has not been parsed yet")]
    NotParsed,

    #[error("cannot write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        match e {
            quick_xml::Error::Io(io) => {
                Self::Io(std::io::Error::new(io.kind(), io.to_string()))
            }
            other => Self::Parse(ParseError::Malformed(other.to_string())),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
