use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AppPathsError {
    #[error("Could not determine home directory")]
    HomeDirUnavailable,
    #[error("Could not determine config directory")]
    ConfigDirUnavailable,
    #[error("Could not determine cache directory")]
    CacheDirUnavailable,
    #[error("Could not determine data directory")]
    DataDirUnavailable,
    #[error("Application identity must have a non-empty product name")]
    EmptyIdentity,
}

/// Who the persisted updater state belongs to.
///
/// Two applications from the same company get separate directories; an empty
/// company collapses to just the product name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppIdentity {
    pub company: String,
    pub product: String,
}

impl AppIdentity {
    #[must_use]
    pub fn new(company: impl Into<String>, product: impl Into<String>) -> Self {
        Self {
            company: company.into(),
            product: product.into(),
        }
    }

    fn relative_dir(&self) -> Result<PathBuf, AppPathsError> {
        let product = sanitize_component(&self.product);
        if product.is_empty() {
            return Err(AppPathsError::EmptyIdentity);
        }
        let company = sanitize_component(&self.company);
        if company.is_empty() {
            Ok(PathBuf::from(product))
        } else {
            Ok(PathBuf::from(company).join(product))
        }
    }
}

fn sanitize_component(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect::<String>()
        .trim_matches('.')
        .to_string()
}

pub struct AppPaths {
    pub config_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl AppPaths {
    /// Build the directories for `identity` on the current platform.
    ///
    /// # Errors
    /// Returns an error when a required base directory (for example the user
    /// home/config/cache/data directory) cannot be determined, or when the
    /// identity has no product name.
    pub fn for_app(identity: &AppIdentity) -> Result<Self, AppPathsError> {
        let relative = identity.relative_dir()?;

        #[cfg(target_os = "macos")]
        {
            let home = dirs::home_dir().ok_or(AppPathsError::HomeDirUnavailable)?;
            Ok(Self {
                config_dir: home.join("Library/Application Support").join(&relative),
                cache_dir: home.join("Library/Caches").join(&relative),
                data_dir: home.join("Library/Application Support").join(&relative),
            })
        }

        #[cfg(not(target_os = "macos"))]
        {
            Ok(Self {
                config_dir: dirs::config_dir()
                    .ok_or(AppPathsError::ConfigDirUnavailable)?
                    .join(&relative),
                cache_dir: dirs::cache_dir()
                    .ok_or(AppPathsError::CacheDirUnavailable)?
                    .join(&relative),
                data_dir: dirs::data_dir()
                    .ok_or(AppPathsError::DataDirUnavailable)?
                    .join(&relative),
            })
        }
    }

    /// Persisted updater state (last check, skipped version, first run).
    #[must_use]
    pub fn updater_state_file(&self) -> PathBuf {
        self.config_dir.join("sparkle-updater.json")
    }

    #[must_use]
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }

    /// Where downloaded update packages are staged before installation.
    #[must_use]
    pub fn download_dir(&self) -> PathBuf {
        self.cache_dir.join("updates")
    }

    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join("debug.log")
    }

    /// Ensure all application directories exist on disk.
    ///
    /// # Errors
    /// Returns an error if any directory cannot be created.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.cache_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::{AppIdentity, AppPaths, AppPathsError};

    fn test_paths() -> AppPaths {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock should be after unix epoch")
            .as_nanos();
        let root = std::env::temp_dir().join(format!(
            "sparkle-platform-paths-test-{}-{}",
            std::process::id(),
            nonce
        ));
        AppPaths {
            config_dir: root.join("config"),
            cache_dir: root.join("cache"),
            data_dir: root.join("data"),
        }
    }

    #[test]
    fn file_paths_use_expected_filenames() {
        let paths = test_paths();

        assert!(
            paths
                .updater_state_file()
                .ends_with(std::path::Path::new("config").join("sparkle-updater.json"))
        );
        assert!(
            paths
                .download_dir()
                .ends_with(std::path::Path::new("cache").join("updates"))
        );
        assert!(
            paths
                .log_file()
                .ends_with(std::path::Path::new("data").join("debug.log"))
        );
    }

    #[test]
    fn ensure_dirs_creates_all_directories() {
        let paths = test_paths();
        let root = paths
            .config_dir
            .parent()
            .expect("config dir should have a parent")
            .to_path_buf();

        paths
            .ensure_dirs()
            .expect("ensure_dirs should create application directories");

        assert!(paths.config_dir.is_dir());
        assert!(paths.cache_dir.is_dir());
        assert!(paths.data_dir.is_dir());

        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn identity_joins_company_and_product() {
        let identity = AppIdentity::new("Acme Corp", "Rocket/Launcher");
        let relative = identity
            .relative_dir()
            .expect("identity with a product should resolve");
        assert_eq!(
            relative,
            std::path::Path::new("Acme Corp").join("Rocket_Launcher")
        );

        let no_company = AppIdentity::new("  ", "Rocket");
        assert_eq!(
            no_company.relative_dir().expect("product alone is enough"),
            std::path::PathBuf::from("Rocket")
        );
    }

    #[test]
    fn identity_without_product_is_rejected() {
        let identity = AppIdentity::new("Acme", " .. ");
        assert_eq!(
            identity.relative_dir(),
            Err(AppPathsError::EmptyIdentity)
        );
    }
}
