#[cfg(debug_assertions)]
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use simplelog::{CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, WriteLogger};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Appends to the log file, opening it again whenever it vanished since the
/// last write (deleted by the user or rotated by another updater run).
struct ReopeningLogFile {
    path: PathBuf,
    file: Option<File>,
}

impl ReopeningLogFile {
    fn open(path: PathBuf) -> io::Result<Self> {
        let file = append_to(&path)?;
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    fn current(&mut self) -> io::Result<&mut File> {
        if !self.path.exists() {
            self.file = None;
        }
        if self.file.is_none() {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            self.file = Some(append_to(&self.path)?);
        }
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("log file not available"))
    }
}

fn append_to(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

impl Write for ReopeningLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.current()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.as_mut().map_or(Ok(()), Write::flush)
    }
}

/// `debug.log` -> `debug.log.1`.
fn previous_generation(log_path: &Path) -> PathBuf {
    let mut name = log_path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".1");
    log_path.with_file_name(name)
}

/// Move a log larger than `max_size` aside, replacing the previous
/// generation, so the updater starts a fresh file. Two generations at most
/// are kept.
fn rotate_oversized_log(log_path: &Path, max_size: u64) {
    let oversized = std::fs::metadata(log_path).is_ok_and(|metadata| metadata.len() > max_size);
    if !oversized {
        return;
    }
    if let Err(error) = std::fs::rename(log_path, previous_generation(log_path)) {
        eprintln!("Could not rotate {}: {error}", log_path.display());
    }
}

/// Install the global logger: the log file always, plus stderr in debug
/// builds. Records from crates outside the updater are dropped.
pub fn init_logging(log_path: &Path, verbose: bool, max_log_size: u64) {
    rotate_oversized_log(log_path, max_log_size);

    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .add_filter_allow_str("sparkle")
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    #[cfg(debug_assertions)]
    loggers.push(TermLogger::new(
        LevelFilter::Debug,
        config.clone(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ));
    match ReopeningLogFile::open(log_path.to_path_buf()) {
        Ok(writer) => loggers.push(WriteLogger::new(LevelFilter::Debug, config, writer)),
        Err(error) => eprintln!("Logging to {} is unavailable: {error}", log_path.display()),
    }

    if !loggers.is_empty() {
        let _ = CombinedLogger::init(loggers);
    }
    set_verbose(verbose);
    log::debug!("Logging to {}", log_path.display());
}

/// Checks, downloads and installs are always recorded at `Info`; verbose
/// mode adds the `Debug` detail.
pub fn set_verbose(verbose: bool) {
    log::set_max_level(if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    });
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    #[test]
    fn log_file_is_recreated_after_deletion() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let log_path = temp_dir.path().join("logs").join("debug.log");
        std::fs::create_dir_all(temp_dir.path().join("logs")).expect("log dir should be created");
        let mut writer =
            ReopeningLogFile::open(log_path.clone()).expect("writer should open log file");

        writer
            .write_all(b"checking for updates\n")
            .expect("initial write should succeed");
        std::fs::remove_dir_all(temp_dir.path().join("logs")).expect("log dir should be removable");
        writer
            .write_all(b"update available\n")
            .expect("writer should recreate the file");

        let contents =
            std::fs::read_to_string(&log_path).expect("recreated file should be readable");
        assert_eq!(contents, "update available\n");
    }

    #[test]
    fn oversized_log_moves_to_the_previous_generation() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let log_path = temp_dir.path().join("debug.log");
        let previous = temp_dir.path().join("debug.log.1");
        std::fs::write(&previous, "oldest run\n").expect("old generation should be written");
        std::fs::write(&log_path, "check-1\ncheck-2\ncheck-3\n")
            .expect("test log file should be written");

        rotate_oversized_log(&log_path, 10);

        assert!(!log_path.exists());
        assert_eq!(
            std::fs::read_to_string(&previous).expect("rotated log should be readable"),
            "check-1\ncheck-2\ncheck-3\n"
        );
    }

    #[test]
    fn small_log_is_left_alone() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let log_path = temp_dir.path().join("debug.log");
        std::fs::write(&log_path, "one line\n").expect("test log file should be written");

        rotate_oversized_log(&log_path, 1024);

        assert_eq!(
            std::fs::read_to_string(&log_path).expect("log should be readable"),
            "one line\n"
        );
        assert!(!previous_generation(&log_path).exists());
    }

    #[test]
    fn verbose_flag_adds_debug_detail() {
        set_verbose(true);
        assert_eq!(log::max_level(), log::LevelFilter::Debug);

        set_verbose(false);
        assert_eq!(log::max_level(), log::LevelFilter::Info);
    }
}
