use thiserror::Error;

use crate::version::VersionParseError;

#[derive(Error, Debug)]
pub enum AppCastError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("app cast request to {url} failed with HTTP {status}{body_snippet}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        body_snippet: String,
    },

    #[error("invalid app cast URL {url:?}: {details}")]
    InvalidUrl { url: String, details: String },

    #[error("malformed app cast: {0}")]
    Malformed(String),

    #[error("failed to serialize app cast: {0}")]
    Serialize(String),

    #[error(transparent)]
    Version(#[from] VersionParseError),

    #[error("app cast signature is invalid")]
    InvalidSignature,

    #[error("app cast fetch was canceled")]
    Canceled,
}

impl AppCastError {
    pub fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub fn http(context: &'static str, source: reqwest::Error) -> Self {
        Self::Http { context, source }
    }

    pub fn malformed(details: impl Into<String>) -> Self {
        Self::Malformed(details.into())
    }

    pub fn serialize_from<E>(error: E) -> Self
    where
        E: std::fmt::Display,
    {
        Self::Serialize(error.to_string())
    }
}
