use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use serde_json::json;
use sparkle_appcast::SemVerLike;
use sparkle_config::{ConfigurationStore, JsonConfigurationStore};
use sparkle_core::{InstallUpdateFailureReason, SparkleUpdater, UpdateStatus, UpdaterEvent};
use sparkle_platform::{AppIdentity, AppPaths};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::console::{ConsoleInterface, describe};
use crate::error::HostError;
use crate::instance_lock::UpdaterLock;
use crate::settings::HostSettings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigChange {
    Show,
    Enable,
    Disable,
    Skip(String),
    ClearSkip,
    ClearReminder,
}

pub fn build_updater(
    settings: &HostSettings,
    identity: AppIdentity,
    console: ConsoleInterface,
) -> Result<SparkleUpdater, HostError> {
    Ok(SparkleUpdater::builder(settings.updater_settings())
        .identity(identity)
        .verifier(settings.verifier())
        .filter(settings.filter())
        .user_interface(Arc::new(console))
        .build()?)
}

pub async fn check(updater: &SparkleUpdater, as_json: bool) -> Result<(), HostError> {
    let info = updater
        .check_for_updates()
        .await
        .ok_or(HostError::CouldNotDetermine)?;

    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "status": info.status,
                "updates": info.updates,
            }))?
        );
    } else {
        println!("{}", info.status);
        for item in &info.updates {
            println!("  {}", describe(item));
        }
    }

    if info.status == UpdateStatus::CouldNotDetermine {
        return Err(HostError::CouldNotDetermine);
    }
    Ok(())
}

pub async fn install(
    updater: &SparkleUpdater,
    unattended: bool,
    silent: bool,
) -> Result<(), HostError> {
    let mut events = updater.subscribe();

    if !unattended {
        updater.check_for_updates_at_user_request().await;
        return match reported_install_failure(&mut events) {
            Some(reason) => Err(HostError::Update(reason)),
            None => Ok(()),
        };
    }

    let info = updater
        .check_for_updates()
        .await
        .ok_or(HostError::CouldNotDetermine)?;
    let top = match info.status {
        UpdateStatus::CouldNotDetermine => return Err(HostError::CouldNotDetermine),
        UpdateStatus::UpdateNotAvailable => {
            println!("You are running the latest version.");
            return Ok(());
        }
        UpdateStatus::UpdateAvailable | UpdateStatus::UserSkipped => match info.top() {
            Some(top) => top,
            None => return Ok(()),
        },
    };

    println!("Installing {}", describe(top));
    let path = updater
        .download_update(top)
        .await
        .map_err(HostError::Update)?;
    eprintln!();
    updater
        .install_update(top, &path, silent)
        .await
        .map_err(HostError::Update)?;
    println!("Installer started.");
    Ok(())
}

pub async fn run(
    updater: &SparkleUpdater,
    paths: &AppPaths,
    do_initial_check: bool,
    force_initial_check: bool,
    interval: Option<Duration>,
) -> Result<(), HostError> {
    let _lock = UpdaterLock::acquire(&paths.data_dir.join("updater.lock"))?;
    let mut events = updater.subscribe();
    updater.start_loop(do_initial_check, force_initial_check, interval);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping the update loop");
                break;
            }
            event = events.recv() => match event {
                Ok(UpdaterEvent::CheckFinished(status)) => println!("{status}"),
                Ok(UpdaterEvent::CloseApplication) => {
                    println!("Installer started.");
                    break;
                }
                Ok(UpdaterEvent::LoopFinished) | Err(RecvError::Closed) => break,
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => warn!("Missed {missed} updater events"),
            }
        }
    }

    updater.stop_loop();
    Ok(())
}

pub fn config(paths: &AppPaths, change: &ConfigChange) -> Result<(), HostError> {
    let store = JsonConfigurationStore::for_app(paths);
    if *change == ConfigChange::Show {
        println!("{}", serde_json::to_string_pretty(&store.load()?)?);
        return Ok(());
    }

    let skipped = match change {
        ConfigChange::Skip(version) => {
            let version = version.trim();
            version
                .parse::<SemVerLike>()
                .map_err(|_| HostError::InvalidVersion(version.to_string()))?;
            version.to_string()
        }
        _ => String::new(),
    };

    store.update(&mut |state| match change {
        ConfigChange::Show => {}
        ConfigChange::Enable => state.check_for_update = true,
        ConfigChange::Disable => state.check_for_update = false,
        ConfigChange::Skip(_) => state.last_version_skipped.clone_from(&skipped),
        ConfigChange::ClearSkip => state.last_version_skipped.clear(),
        ConfigChange::ClearReminder => state.remind_me_later_until = None,
    })?;
    info!("Updated updater state: {change:?}");
    Ok(())
}

/// The install failure reported on `events`, if any. Events dropped because
/// the receiver fell behind are skipped over, not treated as the end.
fn reported_install_failure(
    events: &mut broadcast::Receiver<UpdaterEvent>,
) -> Option<InstallUpdateFailureReason> {
    loop {
        match events.try_recv() {
            Ok(UpdaterEvent::InstallUpdateFailed(reason)) => return Some(reason),
            Ok(_) => {}
            Err(TryRecvError::Lagged(skipped)) => debug!("Skipped {skipped} updater events"),
            Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
        }
    }
}
