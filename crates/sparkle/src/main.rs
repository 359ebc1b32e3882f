mod commands;
mod console;
mod error;
mod instance_lock;
mod logging;
mod settings;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use sparkle_platform::{AppIdentity, AppPaths};

use crate::commands::ConfigChange;
use crate::console::ConsoleInterface;
use crate::error::HostError;
use crate::settings::{DEFAULT_MAX_LOG_SIZE_BYTES, HostSettings};

#[derive(Debug, Parser)]
#[command(name = "sparkle", version, about = "Check for, download and install application updates")]
struct Cli {
    /// Company the application is published under
    #[arg(long, env = "SPARKLE_COMPANY", default_value = "")]
    company: String,

    /// Application whose updates are managed
    #[arg(long, env = "SPARKLE_PRODUCT")]
    product: String,

    /// Settings file [default: settings.json in the app config directory]
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Write debug output to the log
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Report whether an update is available without acting on it
    Check {
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Keep checking in the background until interrupted
    Run {
        /// Seconds between checks [default: from settings]
        #[arg(long)]
        interval_secs: Option<u64>,
        /// Do not check right away
        #[arg(long)]
        no_initial_check: bool,
        /// Check right away even on the first run or before the interval
        #[arg(long, conflicts_with = "no_initial_check")]
        force_initial_check: bool,
        /// Install offered updates without asking
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Check once and install an available update
    Install {
        /// Install without asking
        #[arg(short = 'y', long)]
        yes: bool,
        /// Pass the installer's silent flags
        #[arg(long, requires = "yes")]
        silent: bool,
        /// Open release notes in the browser
        #[arg(long)]
        open_notes: bool,
    },
    /// Inspect or change the persisted updater state
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Print the persisted state
    Show,
    /// Turn scheduled checks on
    Enable,
    /// Turn scheduled checks off
    Disable,
    /// Stop offering a version
    Skip { version: String },
    /// Offer the skipped version again
    ClearSkip,
    /// Cancel a pending remind-me-later deferral
    ClearReminder,
}

impl From<ConfigAction> for ConfigChange {
    fn from(action: ConfigAction) -> Self {
        match action {
            ConfigAction::Show => Self::Show,
            ConfigAction::Enable => Self::Enable,
            ConfigAction::Disable => Self::Disable,
            ConfigAction::Skip { version } => Self::Skip(version),
            ConfigAction::ClearSkip => Self::ClearSkip,
            ConfigAction::ClearReminder => Self::ClearReminder,
        }
    }
}

async fn run(cli: Cli) -> Result<(), HostError> {
    let identity = AppIdentity::new(cli.company, cli.product);
    let paths = AppPaths::for_app(&identity)?;
    paths
        .ensure_dirs()
        .map_err(|error| HostError::io("failed to create application directories", error))?;

    let command = match cli.command {
        Command::Config { action } => {
            logging::init_logging(&paths.log_file(), cli.verbose, DEFAULT_MAX_LOG_SIZE_BYTES);
            return commands::config(&paths, &action.into());
        }
        command => command,
    };

    let settings_path = cli.settings.unwrap_or_else(|| paths.settings_file());
    let settings = HostSettings::load(&settings_path)?;
    logging::init_logging(
        &paths.log_file(),
        cli.verbose || settings.debug_logging,
        settings.max_log_size_bytes,
    );
    log::info!("Managing updates of {} {}", identity.product, settings.installed_version);

    match command {
        Command::Check { json } => {
            let updater =
                commands::build_updater(&settings, identity, ConsoleInterface::default())?;
            commands::check(&updater, json).await
        }
        Command::Run {
            interval_secs,
            no_initial_check,
            force_initial_check,
            yes,
        } => {
            let console = ConsoleInterface {
                assume_yes: yes,
                open_notes: false,
            };
            let updater = commands::build_updater(&settings, identity, console)?;
            commands::run(
                &updater,
                &paths,
                !no_initial_check,
                force_initial_check,
                interval_secs.map(Duration::from_secs),
            )
            .await
        }
        Command::Install {
            yes,
            silent,
            open_notes,
        } => {
            let console = ConsoleInterface {
                assume_yes: yes,
                open_notes,
            };
            let updater = commands::build_updater(&settings, identity, console)?;
            commands::install(&updater, yes, silent).await
        }
        Command::Config { .. } => Ok(()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            log::error!("{error}");
            eprintln!("sparkle: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}
