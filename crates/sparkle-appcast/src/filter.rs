use log::debug;
use sparkle_platform::OperatingSystem;

use crate::item::AppCastItem;
use crate::version::SemVerLike;

/// Narrows a parsed item list before evaluation.
///
/// Implementations must be pure: no I/O and no mutation of the input. The
/// output order is not guaranteed, callers re-sort when they need to.
pub trait AppCastFilter: Send + Sync {
    fn filtered(&self, installed_version: &str, items: &[AppCastItem]) -> Vec<AppCastItem>;
}

fn parse_installed(installed_version: &str) -> Option<SemVerLike> {
    match installed_version.parse::<SemVerLike>() {
        Ok(version) => Some(version),
        Err(error) => {
            debug!("Installed version {installed_version:?} is unusable ({error}); keeping all items");
            None
        }
    }
}

fn is_newer(item: &AppCastItem, installed: Option<&SemVerLike>) -> bool {
    installed.is_none_or(|installed| item.version > *installed)
}

fn matches_os(item: &AppCastItem, os: Option<OperatingSystem>) -> bool {
    os.is_none_or(|os| item.is_for(os))
}

/// Keeps items built for the running OS and, optionally, only those newer
/// than the installed version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultAppCastFilter {
    /// `None` disables the OS check.
    pub os: Option<OperatingSystem>,
    pub remove_older_items: bool,
}

impl Default for DefaultAppCastFilter {
    fn default() -> Self {
        Self {
            os: OperatingSystem::current(),
            remove_older_items: true,
        }
    }
}

impl DefaultAppCastFilter {
    #[must_use]
    pub fn for_os(os: OperatingSystem) -> Self {
        Self {
            os: Some(os),
            ..Self::default()
        }
    }
}

impl AppCastFilter for DefaultAppCastFilter {
    fn filtered(&self, installed_version: &str, items: &[AppCastItem]) -> Vec<AppCastItem> {
        let installed = parse_installed(installed_version);
        items
            .iter()
            .filter(|item| matches_os(item, self.os))
            .filter(|item| !self.remove_older_items || is_newer(item, installed.as_ref()))
            .cloned()
            .collect()
    }
}

/// Release-track filter.
///
/// An item matches when its channel is one of `channels` (case-insensitive)
/// or, with `keep_items_without_channel`, when it has no channel at all.
/// With `downgrade_to_stable`, a pre-release install that has nothing newer
/// on the selected tracks is offered the newest matching stable item, even
/// though it is older.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelAppCastFilter {
    pub channels: Vec<String>,
    pub keep_items_without_channel: bool,
    pub remove_older_items: bool,
    pub downgrade_to_stable: bool,
    pub os: Option<OperatingSystem>,
}

impl Default for ChannelAppCastFilter {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            keep_items_without_channel: true,
            remove_older_items: true,
            downgrade_to_stable: false,
            os: OperatingSystem::current(),
        }
    }
}

impl ChannelAppCastFilter {
    #[must_use]
    pub fn with_channels<I, S>(channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            channels: channels.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    fn matches_channel(&self, item: &AppCastItem) -> bool {
        match item.channel.as_deref().map(str::trim) {
            None | Some("") => self.keep_items_without_channel,
            Some(channel) => self
                .channels
                .iter()
                .any(|wanted| wanted.trim().eq_ignore_ascii_case(channel)),
        }
    }
}

impl AppCastFilter for ChannelAppCastFilter {
    fn filtered(&self, installed_version: &str, items: &[AppCastItem]) -> Vec<AppCastItem> {
        let installed = parse_installed(installed_version);
        let matching: Vec<&AppCastItem> = items
            .iter()
            .filter(|item| matches_os(item, self.os) && self.matches_channel(item))
            .collect();

        let newer: Vec<AppCastItem> = matching
            .iter()
            .filter(|item| !self.remove_older_items || is_newer(item, installed.as_ref()))
            .map(|item| (*item).clone())
            .collect();

        if !newer.is_empty() || !self.downgrade_to_stable {
            return newer;
        }
        let Some(installed) = installed.filter(SemVerLike::is_pre_release) else {
            return newer;
        };

        matching
            .into_iter()
            .filter(|item| !item.version.is_pre_release() && item.version != installed)
            .max_by(|a, b| a.version.cmp(&b.version))
            .map(|item| vec![item.clone()])
            .unwrap_or_default()
    }
}
