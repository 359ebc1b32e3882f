use std::path::PathBuf;

use chrono::{DateTime, Utc};
use sparkle_appcast::AppCastItem;
use sparkle_signing::ValidationResult;

use crate::download::DownloadProgress;
use crate::error::InstallUpdateFailureReason;
use crate::evaluator::UpdateStatus;

pub(crate) const EVENT_CAPACITY: usize = 256;

/// Everything the updater reports to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdaterEvent {
    LoopStarted,
    LoopFinished,
    CheckStarted,
    CheckFinished(UpdateStatus),
    UpdateDetected(Box<AppCastItem>),
    DownloadStarted { url: String, path: PathBuf },
    DownloadProgress(DownloadProgress),
    DownloadFinished { path: PathBuf },
    DownloadError(String),
    DownloadCanceled,
    SignatureChecked(ValidationResult),
    UserSkipped { version: String },
    RemindMeLater { until: DateTime<Utc> },
    InstallUpdateFailed(InstallUpdateFailureReason),
    /// The installer is running; the host should exit now.
    CloseApplication,
}
