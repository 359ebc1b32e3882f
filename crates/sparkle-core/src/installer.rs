use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sparkle_platform::{ConsoleWindow, InstallerSpawn};

use crate::error::{CoreError, InstallUpdateFailureReason};

/// Installer formats recognised by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallerKind {
    Exe,
    Msi,
    Msp,
    Pkg,
    Dmg,
    Deb,
    Rpm,
    AppImage,
    Shell,
    Zip,
}

impl InstallerKind {
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        Some(match extension.as_str() {
            "exe" => Self::Exe,
            "msi" => Self::Msi,
            "msp" => Self::Msp,
            "pkg" | "mpkg" => Self::Pkg,
            "dmg" => Self::Dmg,
            "deb" => Self::Deb,
            "rpm" => Self::Rpm,
            "appimage" => Self::AppImage,
            "sh" => Self::Shell,
            "zip" => Self::Zip,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallerOptions {
    /// Appended after the installer's own arguments.
    #[serde(default)]
    pub custom_args: Vec<String>,
    /// Required for `.zip` updates: where the archive is extracted.
    #[serde(default)]
    pub install_dir: Option<PathBuf>,
    /// Started after a `.zip` update was extracted. Relative paths resolve
    /// against `install_dir`.
    #[serde(default)]
    pub relaunch_executable: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub kind: InstallerKind,
}

impl InstallerCommand {
    fn new(program: impl Into<PathBuf>, kind: InstallerKind) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            kind,
        }
    }

    fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn path_arg(self, path: &Path) -> Self {
        let arg = path.to_string_lossy().into_owned();
        self.arg(arg)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallPlan {
    Launch(InstallerCommand),
    ExtractZip {
        archive: PathBuf,
        destination: PathBuf,
        relaunch: Option<InstallerCommand>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// An installer process is running; the host should exit so it can
    /// replace files.
    ExitForInstaller,
    /// Files were replaced in place; the new version runs after a restart.
    RestartRequired,
}

/// Build the command that installs `path`.
///
/// # Errors
/// Returns [`InstallUpdateFailureReason::CouldNotBuildInstallerCommand`] for
/// unknown file types and for `.zip` updates without an install directory.
pub fn build_installer_command(
    path: &Path,
    silent: bool,
    options: &InstallerOptions,
) -> Result<InstallPlan, InstallUpdateFailureReason> {
    let Some(kind) = InstallerKind::from_path(path) else {
        warn!("No installer command for {}", path.display());
        return Err(InstallUpdateFailureReason::CouldNotBuildInstallerCommand);
    };

    let command = match kind {
        InstallerKind::Exe => {
            let command = InstallerCommand::new(path, kind);
            if silent { command.arg("/S") } else { command }
        }
        InstallerKind::Msi | InstallerKind::Msp => {
            let verb = if kind == InstallerKind::Msi { "/i" } else { "/p" };
            InstallerCommand::new("msiexec", kind)
                .arg(verb)
                .path_arg(path)
                .arg(if silent { "/qn" } else { "/passive" })
        }
        InstallerKind::Pkg | InstallerKind::Dmg => {
            InstallerCommand::new("open", kind).path_arg(path)
        }
        InstallerKind::Deb => InstallerCommand::new("pkexec", kind)
            .arg("dpkg")
            .arg("-i")
            .path_arg(path),
        InstallerKind::Rpm => InstallerCommand::new("pkexec", kind)
            .arg("rpm")
            .arg("-U")
            .path_arg(path),
        InstallerKind::AppImage => InstallerCommand::new(path, kind),
        InstallerKind::Shell => InstallerCommand::new("sh", kind).path_arg(path),
        InstallerKind::Zip => return zip_plan(path, options),
    };

    let mut command = command;
    command.args.extend(options.custom_args.iter().cloned());
    Ok(InstallPlan::Launch(command))
}

fn zip_plan(
    archive: &Path,
    options: &InstallerOptions,
) -> Result<InstallPlan, InstallUpdateFailureReason> {
    let Some(destination) = options.install_dir.clone() else {
        warn!("Zip update {} needs an install directory", archive.display());
        return Err(InstallUpdateFailureReason::CouldNotBuildInstallerCommand);
    };
    let relaunch = options.relaunch_executable.as_ref().map(|executable| {
        let mut command = InstallerCommand::new(destination.join(executable), InstallerKind::Zip);
        command.args.extend(options.custom_args.iter().cloned());
        command
    });
    Ok(InstallPlan::ExtractZip {
        archive: archive.to_path_buf(),
        destination,
        relaunch,
    })
}

/// Starts installer processes. Only the spawn result is observed, never the
/// installer's exit code.
pub trait ProcessLauncher: Send + Sync {
    /// # Errors
    /// Returns the OS error when the process cannot be spawned.
    fn launch(&self, command: &InstallerCommand) -> std::io::Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessLauncher;

impl ProcessLauncher for SystemProcessLauncher {
    fn launch(&self, command: &InstallerCommand) -> std::io::Result<()> {
        info!(
            "Launching installer: {} {}",
            command.program.display(),
            command.args.join(" ")
        );
        let window = if matches!(
            command.kind,
            InstallerKind::Msi | InstallerKind::Msp | InstallerKind::Deb | InstallerKind::Rpm
        ) {
            ConsoleWindow::Hidden
        } else {
            ConsoleWindow::Shown
        };
        std::process::Command::new(&command.program)
            .args(&command.args)
            .detach_from_updater(window)
            .spawn()
            .map(|_| ())
    }
}

/// Carry out `plan`.
///
/// # Errors
/// Returns [`InstallUpdateFailureReason::InstallerLaunchFailed`] when the
/// process cannot be spawned or the archive cannot be extracted.
pub fn execute_install_plan(
    plan: &InstallPlan,
    launcher: &dyn ProcessLauncher,
) -> Result<InstallOutcome, InstallUpdateFailureReason> {
    match plan {
        InstallPlan::Launch(command) => {
            if command.kind == InstallerKind::AppImage {
                make_executable(&command.program);
            }
            launcher.launch(command).map_err(|error| {
                warn!("Failed to launch {}: {error}", command.program.display());
                InstallUpdateFailureReason::InstallerLaunchFailed
            })?;
            Ok(InstallOutcome::ExitForInstaller)
        }
        InstallPlan::ExtractZip {
            archive,
            destination,
            relaunch,
        } => {
            extract_zip(archive, destination).map_err(|error| {
                warn!("Failed to extract {}: {error}", archive.display());
                InstallUpdateFailureReason::InstallerLaunchFailed
            })?;
            let Some(command) = relaunch else {
                return Ok(InstallOutcome::RestartRequired);
            };
            launcher.launch(command).map_err(|error| {
                warn!("Failed to relaunch {}: {error}", command.program.display());
                InstallUpdateFailureReason::InstallerLaunchFailed
            })?;
            Ok(InstallOutcome::ExitForInstaller)
        }
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(error) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)) {
        warn!("Failed to mark {} executable: {error}", path.display());
    }
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) {}

pub(crate) fn extract_zip(zip_path: &Path, dest: &Path) -> Result<(), CoreError> {
    let file = std::fs::File::open(zip_path)
        .map_err(|error| CoreError::io_with_path("failed to open update archive", zip_path, &error))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|error| CoreError::zip("failed to read update archive", error))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|error| CoreError::zip("failed to read archive entry", error))?;
        let Some(name) = entry.enclosed_name() else {
            warn!("Skipping archive entry {:?} outside the install directory", entry.name());
            continue;
        };
        let out_path = dest.join(name);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|error| {
                CoreError::io_with_path("failed to create install directory", &out_path, &error)
            })?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                CoreError::io_with_path("failed to create install directory", parent, &error)
            })?;
        }
        let mut outfile = std::fs::File::create(&out_path).map_err(|error| {
            CoreError::io_with_path("failed to create installed file", &out_path, &error)
        })?;
        std::io::copy(&mut entry, &mut outfile).map_err(|error| {
            CoreError::io_with_path("failed to write installed file", &out_path, &error)
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                let _ = std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode));
            }
        }
    }

    debug!("Extracted {} into {}", zip_path.display(), dest.display());
    Ok(())
}
