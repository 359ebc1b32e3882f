//! Update orchestration: deciding whether an update applies, downloading
//! it, checking its signature and handing it to the platform installer.

mod appcast_handler;
mod download;
mod error;
mod evaluator;
mod events;
mod installer;
mod settings;
mod ui;
mod updater;

pub use appcast_handler::AppCastHandler;
pub use download::{
    DEFAULT_DOWNLOAD_FILE_NAME, DOWNLOAD_CHUNK_SIZE, DownloadError, DownloadEvent,
    DownloadProgress, UpdateDownloader,
};
pub use error::{CoreError, InstallUpdateFailureReason};
pub use evaluator::{UpdateEvaluator, UpdateInfo, UpdateStatus};
pub use events::UpdaterEvent;
pub use installer::{
    InstallOutcome, InstallPlan, InstallerCommand, InstallerKind, InstallerOptions,
    ProcessLauncher, SystemProcessLauncher, build_installer_command, execute_install_plan,
};
pub use settings::{MIN_CHECK_INTERVAL, UpdaterSettings, UserInteractionMode};
pub use ui::{
    DefaultHooks, LogOnlyInterface, NextUpdateAction, UpdateAvailableResponse, UpdaterHooks,
    UserInterface,
};
pub use updater::{SparkleUpdater, SparkleUpdaterBuilder};
