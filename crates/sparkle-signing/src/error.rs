use thiserror::Error;

/// Why key material could not be used. Checkers log these and fall back
/// to the no-key state.
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("public key is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("expected a {expected}-byte Ed25519 public key, got {actual} bytes")]
    Length { expected: usize, actual: usize },

    #[error("malformed DSA key XML: {0}")]
    Xml(String),

    #[error("DSA key is missing <{0}>")]
    MissingComponent(&'static str),

    #[error("public key was rejected: {0}")]
    Rejected(String),
}

impl KeyError {
    pub fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }
}
