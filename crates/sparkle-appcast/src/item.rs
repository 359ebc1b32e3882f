use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sparkle_platform::OperatingSystem;
use url::Url;

use crate::error::AppCastError;
use crate::version::SemVerLike;

/// OS tag assumed for items that do not declare one.
pub const DEFAULT_OPERATING_SYSTEM: &str = "windows";

/// One release advertised by an app cast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppCastItem {
    pub version: SemVerLike,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "url")]
    pub download_link: String,
    /// Base64 signature over the downloaded file; empty when the feed has none.
    #[serde(rename = "signature", default)]
    pub download_signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<DateTime<Utc>>,
    #[serde(rename = "os", default = "default_operating_system")]
    pub operating_system: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(rename = "critical", default)]
    pub is_critical_update: bool,
    #[serde(rename = "size", default)]
    pub update_size: u64,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_notes_link: Option<String>,
    /// Inline release notes (the item's `<description>`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_operating_system() -> String {
    DEFAULT_OPERATING_SYSTEM.to_string()
}

impl AppCastItem {
    #[must_use]
    pub fn new(version: SemVerLike, download_link: impl Into<String>) -> Self {
        Self {
            version,
            short_version: None,
            title: None,
            download_link: download_link.into(),
            download_signature: String::new(),
            publication_date: None,
            operating_system: default_operating_system(),
            channel: None,
            is_critical_update: false,
            update_size: 0,
            mime_type: None,
            release_notes_link: None,
            description: None,
        }
    }

    #[must_use]
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.download_signature = signature.into();
        self
    }

    #[must_use]
    pub fn with_operating_system(mut self, os: impl Into<String>) -> Self {
        self.operating_system = os.into();
        self
    }

    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    #[must_use]
    pub fn critical(mut self) -> Self {
        self.is_critical_update = true;
        self
    }

    #[must_use]
    pub fn has_signature(&self) -> bool {
        !self.download_signature.trim().is_empty()
    }

    /// The OS this item targets, or `None` for an unrecognised tag.
    #[must_use]
    pub fn target_os(&self) -> Option<OperatingSystem> {
        OperatingSystem::from_tag(&self.operating_system)
    }

    #[must_use]
    pub fn is_for(&self, os: OperatingSystem) -> bool {
        self.target_os() == Some(os)
    }

    /// Parsed download link.
    ///
    /// # Errors
    /// Returns an error when the stored link is not an absolute URL.
    pub fn download_url(&self) -> Result<Url, AppCastError> {
        Url::parse(&self.download_link).map_err(|error| AppCastError::InvalidUrl {
            url: self.download_link.clone(),
            details: error.to_string(),
        })
    }

    /// Make `download_link` and `release_notes_link` absolute against the
    /// URL the feed was fetched from. Links that are already absolute, or
    /// that cannot be joined, are kept as-is.
    pub(crate) fn resolve_links(&mut self, base: &Url) {
        self.download_link = resolve_link(base, &self.download_link);
        if let Some(link) = self.release_notes_link.take() {
            self.release_notes_link = Some(resolve_link(base, &link));
        }
    }
}

fn resolve_link(base: &Url, link: &str) -> String {
    if Url::parse(link).is_ok() {
        return link.to_string();
    }
    base.join(link)
        .map_or_else(|_| link.to_string(), |joined| joined.to_string())
}

/// Parsed app cast: channel metadata plus items, newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppCast {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub items: Vec<AppCastItem>,
}

impl AppCast {
    #[must_use]
    pub fn from_items(items: Vec<AppCastItem>) -> Self {
        let mut cast = Self {
            items,
            ..Self::default()
        };
        cast.sort_items();
        cast
    }

    /// Sort newest first. The sort is stable, so equal versions keep feed
    /// order.
    pub fn sort_items(&mut self) {
        sort_newest_first(&mut self.items);
    }

    #[must_use]
    pub fn latest(&self) -> Option<&AppCastItem> {
        self.items.first()
    }

    pub(crate) fn resolve_links(&mut self, base: &Url) {
        for item in &mut self.items {
            item.resolve_links(base);
        }
    }
}

/// Stable newest-first ordering shared by the parser and the evaluator.
pub fn sort_newest_first(items: &mut [AppCastItem]) {
    items.sort_by(|a, b| b.version.cmp(&a.version));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(version: &str, link: &str) -> AppCastItem {
        AppCastItem::new(
            version.parse().expect("test version should parse"),
            link,
        )
    }

    #[test]
    fn from_items_sorts_newest_first_and_keeps_feed_order_for_ties() {
        let cast = AppCast::from_items(vec![
            item("1.0.0", "https://example.com/a"),
            item("2.0.0", "https://example.com/b"),
            item("1.0", "https://example.com/c"),
            item("1.5.0", "https://example.com/d"),
        ]);

        let links: Vec<_> = cast
            .items
            .iter()
            .map(|item| item.download_link.as_str())
            .collect();
        assert_eq!(
            links,
            vec![
                "https://example.com/b",
                "https://example.com/d",
                "https://example.com/a",
                "https://example.com/c",
            ]
        );
    }

    #[test]
    fn resolve_links_joins_relative_links_only() {
        let base = Url::parse("https://updates.example.com/app/appcast.xml")
            .expect("base url should parse");
        let mut relative = item("1.0.0", "builds/app-1.0.0.msi");
        relative.release_notes_link = Some("../notes/1.0.0.md".to_string());
        relative.resolve_links(&base);
        assert_eq!(
            relative.download_link,
            "https://updates.example.com/app/builds/app-1.0.0.msi"
        );
        assert_eq!(
            relative.release_notes_link.as_deref(),
            Some("https://updates.example.com/notes/1.0.0.md")
        );

        let mut absolute = item("1.0.0", "https://cdn.example.net/app.msi");
        absolute.resolve_links(&base);
        assert_eq!(absolute.download_link, "https://cdn.example.net/app.msi");
    }

    #[test]
    fn untagged_items_target_windows() {
        let untagged = item("1.0.0", "https://example.com/a");
        assert!(untagged.is_for(OperatingSystem::Windows));
        assert!(!untagged.is_for(OperatingSystem::Linux));

        let linux = untagged.clone().with_operating_system("Linux");
        assert!(linux.is_for(OperatingSystem::Linux));
    }

    #[test]
    fn download_url_rejects_relative_links() {
        let relative = item("1.0.0", "app.msi");
        assert!(matches!(
            relative.download_url(),
            Err(AppCastError::InvalidUrl { .. })
        ));
    }
}
