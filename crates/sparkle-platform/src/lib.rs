//! Platform helpers shared by the updater crates: the OS tag of the running
//! platform, per-application directories, and process-spawning adapters.

mod commands;
mod os;
mod paths;

pub use commands::{ConsoleWindow, InstallerSpawn};
pub use os::OperatingSystem;
pub use paths::{AppIdentity, AppPaths, AppPathsError};
