use std::process::{Command, Stdio};

#[cfg(unix)]
use std::os::unix::process::CommandExt as _;
#[cfg(windows)]
use std::os::windows::process::CommandExt as _;

#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Whether an installer gets a console window on Windows. Ignored elsewhere.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConsoleWindow {
    #[default]
    Shown,
    Hidden,
}

/// Spawn settings for installers, which must outlive the updater that
/// starts them.
pub trait InstallerSpawn {
    /// Give the child its own process group, so a Ctrl-C aimed at the
    /// updater does not reach it, and close its stdin.
    fn detach_from_updater(&mut self, window: ConsoleWindow) -> &mut Self;
}

impl InstallerSpawn for Command {
    fn detach_from_updater(&mut self, window: ConsoleWindow) -> &mut Self {
        self.stdin(Stdio::null());

        #[cfg(unix)]
        self.process_group(0);

        #[cfg(windows)]
        {
            let flags = match window {
                ConsoleWindow::Shown => CREATE_NEW_PROCESS_GROUP,
                ConsoleWindow::Hidden => CREATE_NEW_PROCESS_GROUP | CREATE_NO_WINDOW,
            };
            self.creation_flags(flags);
        }
        #[cfg(not(windows))]
        let _ = window;

        self
    }
}
