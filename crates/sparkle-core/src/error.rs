use std::path::Path;

use serde::{Deserialize, Serialize};
use sparkle_appcast::AppCastError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    Zip {
        context: &'static str,
        #[source]
        source: zip::result::ZipError,
    },
    #[error(transparent)]
    AppCast(#[from] AppCastError),
    #[error("{0}")]
    Invalid(String),
}

impl CoreError {
    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub(crate) fn zip(context: &'static str, source: zip::result::ZipError) -> Self {
        Self::Zip { context, source }
    }

    pub(crate) fn io_with_path(context: &'static str, path: &Path, source: &std::io::Error) -> Self {
        Self::io(
            context,
            std::io::Error::new(source.kind(), format!("{}: {source}", path.display())),
        )
    }
}

/// Why an update never reached the installer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallUpdateFailureReason {
    #[error("the downloaded file failed signature verification")]
    InvalidSignature,
    #[error("the downloaded installer file is missing")]
    FileNotFound,
    #[error("no installer command is known for this file type")]
    CouldNotBuildInstallerCommand,
    #[error("installation was canceled by the application")]
    CanceledByUserViaEvent,
    #[error("the installer process could not be started")]
    InstallerLaunchFailed,
    #[error("the update could not be downloaded")]
    DownloadFailed,
    #[error("the download or its verification was canceled")]
    DownloadCanceled,
}
