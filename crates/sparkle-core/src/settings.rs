use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sparkle_appcast::HttpOptions;

use crate::installer::InstallerOptions;

/// Shortest pause between scheduled checks; smaller intervals are raised to
/// it.
pub const MIN_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// What happens once an update is found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserInteractionMode {
    /// Ask the user through the [`crate::UserInterface`].
    #[default]
    NotSilent,
    /// Download in the background, then ask.
    DownloadNoInstall,
    /// Download and install without asking.
    DownloadAndInstall,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdaterSettings {
    pub app_cast_url: String,

    pub installed_version: String,

    #[serde(default)]
    pub interaction_mode: UserInteractionMode,

    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    #[serde(default = "default_remind_later")]
    pub remind_later_secs: u64,

    /// Where artifacts are saved; the per-app cache directory when unset.
    #[serde(default)]
    pub download_dir: Option<PathBuf>,

    #[serde(default)]
    pub installer: InstallerOptions,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default)]
    pub user_agent: Option<String>,
}

fn default_check_interval() -> u64 {
    24 * 60 * 60
}

fn default_remind_later() -> u64 {
    24 * 60 * 60
}

fn default_http_timeout() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    15
}

impl UpdaterSettings {
    #[must_use]
    pub fn new(app_cast_url: impl Into<String>, installed_version: impl Into<String>) -> Self {
        Self {
            app_cast_url: app_cast_url.into(),
            installed_version: installed_version.into(),
            interaction_mode: UserInteractionMode::default(),
            check_interval_secs: default_check_interval(),
            remind_later_secs: default_remind_later(),
            download_dir: None,
            installer: InstallerOptions::default(),
            http_timeout_secs: default_http_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            user_agent: None,
        }
    }

    #[must_use]
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs).max(MIN_CHECK_INTERVAL)
    }

    #[must_use]
    pub fn remind_later(&self) -> Duration {
        Duration::from_secs(self.remind_later_secs)
    }

    #[must_use]
    pub fn http_options(&self) -> HttpOptions {
        let mut options = HttpOptions {
            timeout: Duration::from_secs(self.http_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            ..HttpOptions::default()
        };
        if let Some(agent) = &self.user_agent {
            options.user_agent.clone_from(agent);
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_in_defaults() {
        let settings: UpdaterSettings = serde_json::from_str(
            r#"{"app_cast_url":"https://example.com/appcast.xml","installed_version":"1.0.0","interaction_mode":"download_and_install"}"#,
        )
        .expect("partial settings should deserialize");

        assert_eq!(settings.interaction_mode, UserInteractionMode::DownloadAndInstall);
        assert_eq!(settings.check_interval(), Duration::from_secs(86_400));
        assert_eq!(settings.http_timeout_secs, 60);
        assert!(settings.installer.custom_args.is_empty());
    }

    #[test]
    fn check_interval_has_a_floor() {
        let mut settings = UpdaterSettings::new("https://example.com/appcast.xml", "1.0.0");
        settings.check_interval_secs = 0;
        assert_eq!(settings.check_interval(), MIN_CHECK_INTERVAL);

        settings.check_interval_secs = 3600;
        assert_eq!(settings.check_interval(), Duration::from_secs(3600));
    }

    #[test]
    fn http_options_carry_timeouts_and_agent() {
        let mut settings = UpdaterSettings::new("https://example.com/appcast.xml", "1.0.0");
        settings.http_timeout_secs = 5;
        settings.user_agent = Some("Rocket/1.0".to_string());

        let options = settings.http_options();
        assert_eq!(options.timeout, Duration::from_secs(5));
        assert_eq!(options.connect_timeout, Duration::from_secs(15));
        assert_eq!(options.user_agent, "Rocket/1.0");
    }
}
