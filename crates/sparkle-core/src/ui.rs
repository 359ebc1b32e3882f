use std::path::Path;

use async_trait::async_trait;
use log::{info, warn};
use sparkle_appcast::AppCastItem;

use crate::download::DownloadProgress;
use crate::error::InstallUpdateFailureReason;

/// The user's answer to an "update available" prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateAvailableResponse {
    InstallUpdate,
    SkipUpdate,
    RemindMeLater,
    Dismissed,
}

/// Presentation collaborator. Every method has a log-only default, so the
/// updater works with no UI attached.
#[async_trait]
pub trait UserInterface: Send + Sync {
    /// `is_critical` means skip and remind-later should not be offered; the
    /// updater ignores those answers for critical updates either way.
    async fn show_update_available(
        &self,
        updates: &[AppCastItem],
        is_critical: bool,
    ) -> UpdateAvailableResponse {
        if let Some(top) = updates.first() {
            info!(
                "Update {} available{}",
                top.version,
                if is_critical { " (critical)" } else { "" }
            );
        }
        UpdateAvailableResponse::Dismissed
    }

    /// Shown on a user-requested check when the newest item was skipped.
    /// Returning true installs it anyway.
    async fn show_version_skipped(&self, item: &AppCastItem) -> bool {
        info!("Version {} was skipped earlier", item.version);
        false
    }

    async fn show_no_update(&self) {
        info!("No update available");
    }

    async fn show_could_not_determine(&self) {
        warn!("Could not determine whether an update is available");
    }

    fn show_download_progress(&self, _progress: &DownloadProgress) {}

    async fn show_download_error(&self, message: &str) {
        warn!("Update download failed: {message}");
    }

    async fn show_install_failed(&self, reason: InstallUpdateFailureReason) {
        warn!("Update installation failed: {reason}");
    }
}

/// A [`UserInterface`] that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOnlyInterface;

impl UserInterface for LogOnlyInterface {}

/// Host override of what happens to a detected update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextUpdateAction {
    ShowStandardUserInterface,
    PerformUpdateUnattended,
    ProhibitUpdate,
}

/// Host application callbacks around the update cycle.
#[async_trait]
pub trait UpdaterHooks: Send + Sync {
    /// Runs before anything is downloaded. `None` keeps the behaviour of the
    /// configured [`crate::UserInteractionMode`].
    async fn update_detected(&self, _updates: &[AppCastItem]) -> Option<NextUpdateAction> {
        None
    }

    /// Last chance to save state before the installer starts. Returning
    /// false aborts the install and keeps the downloaded file.
    async fn prepare_to_exit(&self, _item: &AppCastItem, _installer: &Path) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl UpdaterHooks for DefaultHooks {}
