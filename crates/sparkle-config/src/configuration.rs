use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use sparkle_appcast::{SemVerLike, VersionParseError};

use crate::snapshot::SavedConfiguration;
use crate::store::ConfigurationStore;

/// Persisted updater state for one application identity.
///
/// Every mutation is applied to the stored snapshot and saved, so changes
/// made through another handle (another process, say) since the last load
/// are kept. Save failures are logged and the mutation still applies in
/// memory for this run.
pub struct Configuration {
    store: Box<dyn ConfigurationStore>,
    installed_version: String,
    state: SavedConfiguration,
    is_first_run: bool,
    previous_version_of_software_ran: String,
}

impl std::fmt::Debug for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configuration")
            .field("installed_version", &self.installed_version)
            .field("state", &self.state)
            .field("is_first_run", &self.is_first_run)
            .finish_non_exhaustive()
    }
}

impl Configuration {
    /// Load state and record this run. On the first run `did_run_once` is
    /// persisted immediately, so a crash later in the run does not repeat
    /// first-run behaviour.
    pub fn new(store: Box<dyn ConfigurationStore>, installed_version: impl Into<String>) -> Self {
        let installed_version = installed_version.into();
        let mut state = store.load().unwrap_or_else(|error| {
            warn!("Failed to load updater state, starting fresh: {error}");
            SavedConfiguration::default()
        });

        let is_first_run = !state.did_run_once;
        let previous_version_of_software_ran = state.previous_version_run.clone();
        let needs_save = is_first_run || state.previous_version_run != installed_version;

        state.did_run_once = true;
        state.previous_version_run.clone_from(&installed_version);

        let mut configuration = Self {
            store,
            installed_version,
            state,
            is_first_run,
            previous_version_of_software_ran,
        };
        if configuration.is_first_run {
            info!("First run of {}", configuration.installed_version);
        }
        if needs_save {
            let version = configuration.installed_version.clone();
            configuration.modify(|state| {
                state.did_run_once = true;
                state.previous_version_run.clone_from(&version);
            });
        }
        configuration
    }

    fn modify(&mut self, mut change: impl FnMut(&mut SavedConfiguration)) {
        match self.store.update(&mut change) {
            Ok(state) => self.state = state,
            Err(error) => {
                warn!("Failed to save updater state: {error}");
                change(&mut self.state);
            }
        }
    }

    #[must_use]
    pub fn installed_version(&self) -> &str {
        &self.installed_version
    }

    #[must_use]
    pub fn is_first_run(&self) -> bool {
        self.is_first_run
    }

    #[must_use]
    pub fn did_run_once(&self) -> bool {
        self.state.did_run_once
    }

    /// Version recorded by the previous run, empty on the first run.
    #[must_use]
    pub fn previous_version_of_software_ran(&self) -> &str {
        &self.previous_version_of_software_ran
    }

    #[must_use]
    pub fn was_updated_since_last_run(&self) -> bool {
        !self.previous_version_of_software_ran.is_empty()
            && self.previous_version_of_software_ran != self.installed_version
    }

    #[must_use]
    pub fn check_for_update(&self) -> bool {
        self.state.check_for_update
    }

    #[must_use]
    pub fn last_check_time(&self) -> Option<DateTime<Utc>> {
        self.state.last_check_time
    }

    #[must_use]
    pub fn last_version_skipped(&self) -> &str {
        &self.state.last_version_skipped
    }

    #[must_use]
    pub fn last_config_update(&self) -> Option<DateTime<Utc>> {
        self.state.last_config_update
    }

    #[must_use]
    pub fn remind_me_later_until(&self) -> Option<DateTime<Utc>> {
        self.state.remind_me_later_until
    }

    #[must_use]
    pub fn snapshot(&self) -> SavedConfiguration {
        self.state.clone()
    }

    pub fn set_check_for_update(&mut self, enabled: bool) {
        self.modify(|state| state.check_for_update = enabled);
    }

    pub fn touch_check_time(&mut self) {
        self.touch_check_time_at(Utc::now());
    }

    pub fn touch_check_time_at(&mut self, now: DateTime<Utc>) {
        self.modify(|state| state.last_check_time = Some(now));
    }

    pub fn touch_profile_time(&mut self) {
        self.touch_profile_time_at(Utc::now());
    }

    pub fn touch_profile_time_at(&mut self, now: DateTime<Utc>) {
        self.modify(|state| state.last_config_update = Some(now));
    }

    /// Both timestamps in one write, as after every check attempt.
    pub fn touch_after_check_at(&mut self, now: DateTime<Utc>) {
        self.modify(|state| {
            state.last_check_time = Some(now);
            state.last_config_update = Some(now);
        });
    }

    /// Remember `version` as skipped. An empty string clears the skip.
    ///
    /// # Errors
    /// Returns an error, leaving the stored value untouched, when `version`
    /// is neither empty nor a parsable version.
    pub fn set_version_to_skip(&mut self, version: &str) -> Result<(), VersionParseError> {
        let version = version.trim();
        if !version.is_empty() {
            version.parse::<SemVerLike>()?;
        }
        debug!("Skipping version {version:?}");
        self.modify(|state| state.last_version_skipped = version.to_string());
        Ok(())
    }

    pub fn clear_skipped_version(&mut self) {
        self.modify(|state| state.last_version_skipped.clear());
    }

    pub fn set_remind_me_later(&mut self, until: DateTime<Utc>) {
        self.modify(|state| state.remind_me_later_until = Some(until));
    }

    pub fn clear_remind_me_later(&mut self) {
        self.modify(|state| state.remind_me_later_until = None);
    }

    #[must_use]
    pub fn remind_later_active(&self, now: DateTime<Utc>) -> bool {
        self.state
            .remind_me_later_until
            .is_some_and(|until| until > now)
    }

    /// Re-read the store, picking up writes from other processes.
    pub fn reload(&mut self) {
        match self.store.load() {
            Ok(state) => self.state = state,
            Err(error) => warn!("Failed to reload updater state: {error}"),
        }
    }
}
