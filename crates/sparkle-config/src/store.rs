use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;
use log::{debug, warn};
use sparkle_platform::AppPaths;

use crate::error::ConfigError;
use crate::snapshot::SavedConfiguration;

/// Load/save contract for the persisted updater state. Saves write a
/// complete snapshot, so a concurrent reader sees either the old or the new
/// state, never a mix.
pub trait ConfigurationStore: Send + Sync {
    /// # Errors
    /// Returns an error when the backing store cannot be read at all.
    fn load(&self) -> Result<SavedConfiguration, ConfigError>;

    /// # Errors
    /// Returns an error when the snapshot cannot be written.
    fn save(&self, snapshot: &SavedConfiguration) -> Result<(), ConfigError>;

    /// Apply `change` to the stored snapshot and save the result, so fields
    /// written by another handle since this one loaded are kept.
    ///
    /// # Errors
    /// Returns an error when the snapshot cannot be read or written.
    fn update(
        &self,
        change: &mut dyn FnMut(&mut SavedConfiguration),
    ) -> Result<SavedConfiguration, ConfigError> {
        let mut snapshot = self.load()?;
        change(&mut snapshot);
        self.save(&snapshot)?;
        Ok(snapshot)
    }
}

/// JSON document on disk.
#[derive(Debug, Clone)]
pub struct JsonConfigurationStore {
    path: PathBuf,
}

impl JsonConfigurationStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn for_app(paths: &AppPaths) -> Self {
        Self::new(paths.updater_state_file())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }
}

impl ConfigurationStore for JsonConfigurationStore {
    fn load(&self) -> Result<SavedConfiguration, ConfigError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!("No saved updater state at {}", self.path.display());
                return Ok(SavedConfiguration::default());
            }
            Err(error) => return Err(ConfigError::io("failed to read updater state", error)),
        };

        Ok(serde_json::from_str(&content).unwrap_or_else(|error| {
            warn!(
                "Ignoring unreadable updater state at {}: {error}",
                self.path.display()
            );
            SavedConfiguration::default()
        }))
    }

    fn save(&self, snapshot: &SavedConfiguration) -> Result<(), ConfigError> {
        self.locked(|| self.write(snapshot))
    }

    fn update(
        &self,
        change: &mut dyn FnMut(&mut SavedConfiguration),
    ) -> Result<SavedConfiguration, ConfigError> {
        self.locked(|| {
            let mut snapshot = self.load()?;
            change(&mut snapshot);
            self.write(&snapshot)?;
            Ok(snapshot)
        })
    }
}

impl JsonConfigurationStore {
    /// Run `action` while holding the exclusive lock on the sibling lock
    /// file, so writers in other processes serialise.
    fn locked<T>(
        &self,
        action: impl FnOnce() -> Result<T, ConfigError>,
    ) -> Result<T, ConfigError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|error| ConfigError::io("failed to create config directory", error))?;
        }
        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())
            .map_err(|error| ConfigError::io("failed to open updater state lock", error))?;
        lock_file
            .lock_exclusive()
            .map_err(|error| ConfigError::io("failed to lock updater state", error))?;

        let result = action();
        if let Err(error) = FileExt::unlock(&lock_file) {
            debug!("Failed to release updater state lock: {error}");
        }
        result
    }

    fn write(&self, snapshot: &SavedConfiguration) -> Result<(), ConfigError> {
        let data = serde_json::to_vec_pretty(snapshot)?;
        write_atomic(&self.path, &data)
            .map_err(|error| ConfigError::io("failed to write updater state", error))
    }
}

/// Keeps the snapshot in memory. Used by tests and by hosts that persist
/// state themselves.
#[derive(Debug, Default)]
pub struct MemoryConfigurationStore {
    saved: Mutex<Option<SavedConfiguration>>,
}

impl MemoryConfigurationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_snapshot(snapshot: SavedConfiguration) -> Self {
        Self {
            saved: Mutex::new(Some(snapshot)),
        }
    }

    /// The last snapshot saved, if any.
    #[must_use]
    pub fn saved(&self) -> Option<SavedConfiguration> {
        self.saved
            .lock()
            .map_or_else(|poisoned| poisoned.into_inner().clone(), |guard| guard.clone())
    }
}

impl ConfigurationStore for MemoryConfigurationStore {
    fn load(&self) -> Result<SavedConfiguration, ConfigError> {
        Ok(self.saved().unwrap_or_default())
    }

    fn save(&self, snapshot: &SavedConfiguration) -> Result<(), ConfigError> {
        let mut guard = self
            .saved
            .lock()
            .map_err(|_| ConfigError::Unavailable("memory store lock poisoned".to_string()))?;
        *guard = Some(snapshot.clone());
        Ok(())
    }

    fn update(
        &self,
        change: &mut dyn FnMut(&mut SavedConfiguration),
    ) -> Result<SavedConfiguration, ConfigError> {
        let mut guard = self
            .saved
            .lock()
            .map_err(|_| ConfigError::Unavailable("memory store lock poisoned".to_string()))?;
        let mut snapshot = guard.clone().unwrap_or_default();
        change(&mut snapshot);
        *guard = Some(snapshot.clone());
        Ok(snapshot)
    }
}

/// Stage `data` in a temp file beside `path`, sync it, then rename it over
/// `path`. A failed rename deletes the staged file.
fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "state path has no parent")
    })?;
    let prefix = path
        .file_name()
        .and_then(std::ffi::OsStr::to_str)
        .map_or_else(|| ".state.".to_string(), |name| format!(".{name}."));

    let mut staged = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(parent)?;
    staged.write_all(data)?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|error| error.error)?;
    Ok(())
}
