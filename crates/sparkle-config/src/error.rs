use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode configuration: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("configuration store is unavailable: {0}")]
    Unavailable(String),
}

impl ConfigError {
    pub fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }
}
