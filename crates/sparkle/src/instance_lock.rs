use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use fs2::FileExt;

use crate::error::HostError;

/// Held while `sparkle run` owns the update loop of an application, so two
/// loops never download the same update.
pub struct UpdaterLock {
    _file: File,
}

impl UpdaterLock {
    pub fn acquire(path: &Path) -> Result<Self, HostError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|error| HostError::io("failed to create lock directory", error))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|error| HostError::io("failed to open updater lock file", error))?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(error) if error.kind() == std::io::ErrorKind::WouldBlock => {
                return Err(HostError::AlreadyRunning);
            }
            Err(error) if error.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                return Err(HostError::AlreadyRunning);
            }
            Err(error) => return Err(HostError::io("failed to lock updater lock file", error)),
        }

        file.set_len(0)
            .and_then(|()| file.seek(SeekFrom::Start(0)).map(|_| ()))
            .and_then(|()| writeln!(file, "{}", std::process::id()))
            .map_err(|error| HostError::io("failed to write updater lock file", error))?;

        Ok(Self { _file: file })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lock_is_refused_until_the_first_is_dropped() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = dir.path().join("updater.lock");

        let first = UpdaterLock::acquire(&path).expect("first lock should succeed");
        assert!(matches!(
            UpdaterLock::acquire(&path),
            Err(HostError::AlreadyRunning)
        ));

        drop(first);
        UpdaterLock::acquire(&path).expect("lock should be free again");
    }
}
