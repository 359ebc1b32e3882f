use log::warn;
use serde::Deserialize;
use url::Url;

use crate::error::AppCastError;
use crate::item::{AppCast, AppCastItem};
use crate::serializer::{AppCastSerializer, strip_bom};

/// JSON rendition of the same item model as the XML feed.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonAppCastSerializer {
    pretty: bool,
}

impl JsonAppCastSerializer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }
}

/// Channel fields are typed, items stay raw so a bad item can be skipped
/// without failing the document.
#[derive(Deserialize)]
struct RawAppCast {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    language: Option<String>,
    items: Vec<serde_json::Value>,
}

impl AppCastSerializer for JsonAppCastSerializer {
    fn deserialize_with_base(
        &self,
        text: &str,
        base: Option<&Url>,
    ) -> Result<AppCast, AppCastError> {
        let raw: RawAppCast = serde_json::from_str(strip_bom(text))
            .map_err(|error| AppCastError::malformed(format!("invalid JSON app cast: {error}")))?;

        let items = raw
            .items
            .into_iter()
            .enumerate()
            .filter_map(
                |(index, value)| match serde_json::from_value::<AppCastItem>(value) {
                    Ok(item) => Some(item),
                    Err(error) => {
                        warn!("Skipping app cast item #{index}: {error}");
                        None
                    }
                },
            )
            .collect();

        let mut cast = AppCast {
            title: raw.title,
            link: raw.link,
            description: raw.description,
            language: raw.language,
            items,
        };
        if let Some(base) = base {
            cast.resolve_links(base);
        }
        cast.sort_items();
        Ok(cast)
    }

    fn serialize(&self, cast: &AppCast) -> Result<String, AppCastError> {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(cast)
        } else {
            serde_json::to_string(cast)
        };
        rendered.map_err(AppCastError::serialize_from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_items_with_unparsable_versions() {
        let text = r#"{
            "title": "Rocket",
            "items": [
                { "version": "1.0.0", "url": "https://example.com/1.0.0.exe" },
                { "version": "banana", "url": "https://example.com/banana.exe" },
                { "url": "https://example.com/missing-version.exe" },
                { "version": "1.1.0", "url": "1.1.0.exe", "signature": "c2ln", "critical": true }
            ]
        }"#;
        let base = Url::parse("https://example.com/feed/appcast.json")
            .expect("base url should parse");

        let cast = JsonAppCastSerializer::new()
            .deserialize_with_base(text, Some(&base))
            .expect("feed should parse");

        let versions: Vec<_> = cast.items.iter().map(|item| item.version.as_str()).collect();
        assert_eq!(versions, ["1.1.0", "1.0.0"]);
        assert_eq!(cast.items[0].download_link, "https://example.com/feed/1.1.0.exe");
        assert_eq!(cast.items[0].download_signature, "c2ln");
        assert!(cast.items[0].is_critical_update);
        assert_eq!(cast.items[1].operating_system, "windows");
    }

    #[test]
    fn missing_items_array_is_malformed() {
        let error = JsonAppCastSerializer::new()
            .deserialize(r#"{ "title": "Rocket" }"#)
            .expect_err("document without items should be rejected");
        assert!(matches!(error, AppCastError::Malformed(_)));
    }

    #[test]
    fn serialized_cast_parses_back_to_the_same_items() {
        let cast = AppCast::from_items(vec![
            AppCastItem::new(
                "2.0.0".parse().expect("version should parse"),
                "https://example.com/2.0.0.msi",
            )
            .with_signature("c2ln")
            .with_channel("beta"),
            AppCastItem::new(
                "1.9.3".parse().expect("version should parse"),
                "https://example.com/1.9.3.msi",
            ),
        ]);
        let serializer = JsonAppCastSerializer::new().pretty();

        let text = serializer.serialize(&cast).expect("cast should serialize");
        let parsed = serializer.deserialize(&text).expect("cast should parse back");

        assert_eq!(parsed, cast);
    }

    #[test]
    fn empty_item_list_round_trips() {
        let serializer = JsonAppCastSerializer::new();
        let text = serializer
            .serialize(&AppCast::default())
            .expect("empty cast should serialize");
        let parsed = serializer.deserialize(&text).expect("empty cast should parse");
        assert!(parsed.items.is_empty());
    }
}
