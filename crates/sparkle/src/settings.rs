use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sparkle_appcast::{AppCastFilter, ChannelAppCastFilter, DefaultAppCastFilter};
use sparkle_core::{InstallerOptions, UpdaterSettings, UserInteractionMode};
use sparkle_signing::{DsaChecker, Ed25519Checker, PublicKeySource, SecurityMode, SignatureVerifier};

use crate::error::HostError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureScheme {
    #[default]
    Ed25519,
    Dsa,
}

/// Settings of the headless host, read from `settings.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSettings {
    pub app_cast_url: String,

    pub installed_version: String,

    #[serde(default)]
    pub interaction_mode: UserInteractionMode,

    #[serde(default)]
    pub security_mode: SecurityMode,

    #[serde(default)]
    pub signature_scheme: SignatureScheme,

    /// Base64 Ed25519 key or DSA `<DSAKeyValue>` XML.
    #[serde(default)]
    pub public_key: Option<String>,

    #[serde(default)]
    pub public_key_file: Option<PathBuf>,

    /// Empty means every channel-less item, as with the default filter.
    #[serde(default)]
    pub channels: Vec<String>,

    #[serde(default)]
    pub downgrade_to_stable: bool,

    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    #[serde(default = "default_remind_later")]
    pub remind_later_secs: u64,

    #[serde(default)]
    pub download_dir: Option<PathBuf>,

    #[serde(default)]
    pub installer: InstallerOptions,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default)]
    pub user_agent: Option<String>,

    #[serde(default)]
    pub debug_logging: bool,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,
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

pub const DEFAULT_MAX_LOG_SIZE_BYTES: u64 = 5 * 1024 * 1024;

fn default_max_log_size_bytes() -> u64 {
    DEFAULT_MAX_LOG_SIZE_BYTES
}

impl HostSettings {
    pub fn load(path: &Path) -> Result<Self, HostError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(HostError::MissingSettings(path.to_path_buf()));
            }
            Err(error) => return Err(HostError::io("failed to read settings", error)),
        };
        serde_json::from_str(&content).map_err(|source| HostError::Settings {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn updater_settings(&self) -> UpdaterSettings {
        let mut settings = UpdaterSettings::new(&self.app_cast_url, &self.installed_version);
        settings.interaction_mode = self.interaction_mode;
        settings.check_interval_secs = self.check_interval_secs;
        settings.remind_later_secs = self.remind_later_secs;
        settings.download_dir.clone_from(&self.download_dir);
        settings.installer = self.installer.clone();
        settings.http_timeout_secs = self.http_timeout_secs;
        settings.user_agent.clone_from(&self.user_agent);
        settings
    }

    pub fn key_source(&self) -> PublicKeySource {
        PublicKeySource {
            literal: self.public_key.clone(),
            embedded: None,
            file: self.public_key_file.clone(),
        }
    }

    pub fn verifier(&self) -> SignatureVerifier {
        let source = self.key_source();
        if source.is_empty() {
            return SignatureVerifier::None(self.security_mode);
        }
        match self.signature_scheme {
            SignatureScheme::Ed25519 => {
                SignatureVerifier::Ed25519(Ed25519Checker::new(self.security_mode, &source))
            }
            SignatureScheme::Dsa => {
                SignatureVerifier::Dsa(DsaChecker::new(self.security_mode, &source))
            }
        }
    }

    pub fn filter(&self) -> Arc<dyn AppCastFilter> {
        if self.channels.is_empty() {
            return Arc::new(DefaultAppCastFilter::default());
        }
        let mut filter = ChannelAppCastFilter::with_channels(self.channels.iter().cloned());
        filter.downgrade_to_stable = self.downgrade_to_stable;
        Arc::new(filter)
    }
}

#[cfg(test)]
mod tests {
    use sparkle_signing::SignatureChecker;

    use super::*;

    fn minimal() -> HostSettings {
        serde_json::from_str(
            r#"{"app_cast_url":"https://updates.example.com/appcast.xml","installed_version":"1.2.0"}"#,
        )
        .expect("minimal settings should deserialize")
    }

    #[test]
    fn minimal_settings_use_strict_defaults() {
        let settings = minimal();
        assert_eq!(settings.security_mode, SecurityMode::Strict);
        assert_eq!(settings.signature_scheme, SignatureScheme::Ed25519);
        assert_eq!(settings.max_log_size_bytes, 5 * 1024 * 1024);

        let verifier = settings.verifier();
        assert_eq!(verifier.kind(), "none");
        assert_eq!(verifier.security_mode(), SecurityMode::Strict);
    }

    #[test]
    fn updater_settings_carry_host_values() {
        let mut settings = minimal();
        settings.interaction_mode = UserInteractionMode::DownloadNoInstall;
        settings.check_interval_secs = 600;
        settings.installer.custom_args = vec!["--quiet".to_string()];

        let updater = settings.updater_settings();
        assert_eq!(updater.app_cast_url, "https://updates.example.com/appcast.xml");
        assert_eq!(updater.installed_version, "1.2.0");
        assert_eq!(updater.interaction_mode, UserInteractionMode::DownloadNoInstall);
        assert_eq!(updater.check_interval_secs, 600);
        assert_eq!(updater.installer.custom_args, vec!["--quiet"]);
    }

    #[test]
    fn configured_key_selects_the_scheme() {
        let mut settings = minimal();
        settings.public_key = Some("not a key".to_string());
        assert_eq!(settings.verifier().kind(), "ed25519");
        assert!(!settings.verifier().has_valid_key_information());

        settings.signature_scheme = SignatureScheme::Dsa;
        assert_eq!(settings.verifier().kind(), "dsa");
    }

    #[test]
    fn missing_file_is_reported_by_path() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = dir.path().join("settings.json");
        assert!(matches!(
            HostSettings::load(&path),
            Err(HostError::MissingSettings(missing)) if missing == path
        ));

        std::fs::write(&path, "{ not json").expect("settings should be written");
        assert!(matches!(
            HostSettings::load(&path),
            Err(HostError::Settings { .. })
        ));
    }
}
