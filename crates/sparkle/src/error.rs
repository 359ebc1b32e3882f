use std::path::PathBuf;

use sparkle_config::ConfigError;
use sparkle_core::{CoreError, InstallUpdateFailureReason};
use sparkle_platform::AppPathsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("failed to resolve application paths: {0}")]
    Paths(#[from] AppPathsError),
    #[error("no settings file at {}; write one or pass --settings", .0.display())]
    MissingSettings(PathBuf),
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings file {}: {source}", path.display())]
    Settings {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("another updater is already running for this application")]
    AlreadyRunning,
    #[error("could not determine whether an update is available")]
    CouldNotDetermine,
    #[error("update failed: {0}")]
    Update(InstallUpdateFailureReason),
    #[error("invalid version {0:?}")]
    InvalidVersion(String),
}

impl HostError {
    pub fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    /// Process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::MissingSettings(_) | Self::Settings { .. } | Self::InvalidVersion(_) => 2,
            Self::AlreadyRunning => 3,
            Self::CouldNotDetermine => 4,
            Self::Update(_) => 5,
            Self::Paths(_)
            | Self::Io { .. }
            | Self::Core(_)
            | Self::Config(_)
            | Self::Encode(_) => 1,
        }
    }
}
