use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything the updater persists for one application, written as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedConfiguration {
    #[serde(default = "default_true")]
    pub check_for_update: bool,
    #[serde(default)]
    pub last_check_time: Option<DateTime<Utc>>,
    /// Empty, or a version string the user chose to skip.
    #[serde(default)]
    pub last_version_skipped: String,
    #[serde(default)]
    pub did_run_once: bool,
    #[serde(default)]
    pub last_config_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub previous_version_run: String,
    #[serde(default)]
    pub remind_me_later_until: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl Default for SavedConfiguration {
    fn default() -> Self {
        Self {
            check_for_update: default_true(),
            last_check_time: None,
            last_version_skipped: String::new(),
            did_run_once: false,
            last_config_update: None,
            previous_version_run: String::new(),
            remind_me_later_until: None,
        }
    }
}
