use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};
use sparkle_appcast::{AppCast, AppCastFilter, AppCastItem, SemVerLike, sort_newest_first};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    UpdateAvailable,
    UpdateNotAvailable,
    UserSkipped,
    CouldNotDetermine,
}

impl std::fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::UpdateAvailable => "update available",
            Self::UpdateNotAvailable => "no update available",
            Self::UserSkipped => "update skipped by user",
            Self::CouldNotDetermine => "could not determine update status",
        };
        f.write_str(label)
    }
}

/// Outcome of one check: the status plus the candidates, newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateInfo {
    pub status: UpdateStatus,
    pub updates: Vec<AppCastItem>,
}

impl UpdateInfo {
    #[must_use]
    pub fn could_not_determine() -> Self {
        Self {
            status: UpdateStatus::CouldNotDetermine,
            updates: Vec::new(),
        }
    }

    #[must_use]
    pub fn top(&self) -> Option<&AppCastItem> {
        self.updates.first()
    }

    #[must_use]
    pub fn is_critical(&self) -> bool {
        self.top().is_some_and(|item| item.is_critical_update)
    }
}

/// Turns a fetched app cast into an [`UpdateInfo`].
///
/// The filter is treated as a black box: its output is re-sorted before
/// the newest item is picked. Critical flags are reported, never acted on.
#[derive(Clone)]
pub struct UpdateEvaluator {
    filter: Arc<dyn AppCastFilter>,
}

impl UpdateEvaluator {
    #[must_use]
    pub fn new(filter: Arc<dyn AppCastFilter>) -> Self {
        Self { filter }
    }

    /// `fetched` is `None` when the fetch or parse failed.
    #[must_use]
    pub fn evaluate(
        &self,
        fetched: Option<&AppCast>,
        installed_version: &str,
        last_version_skipped: &str,
    ) -> UpdateInfo {
        let Some(app_cast) = fetched else {
            return UpdateInfo::could_not_determine();
        };

        let mut updates = self.filter.filtered(installed_version, &app_cast.items);
        if updates.is_empty() {
            return UpdateInfo {
                status: UpdateStatus::UpdateNotAvailable,
                updates,
            };
        }
        sort_newest_first(&mut updates);

        let status = if updates
            .first()
            .is_some_and(|top| is_skipped(&top.version, last_version_skipped))
        {
            debug!("Newest candidate {} was skipped by the user", updates[0].version);
            UpdateStatus::UserSkipped
        } else {
            UpdateStatus::UpdateAvailable
        };

        UpdateInfo { status, updates }
    }
}

fn is_skipped(version: &SemVerLike, last_version_skipped: &str) -> bool {
    let skipped = last_version_skipped.trim();
    if skipped.is_empty() {
        return false;
    }
    skipped
        .parse::<SemVerLike>()
        .map_or_else(|_| version.as_str() == skipped, |parsed| parsed == *version)
}
