use std::path::Path;

use async_trait::async_trait;
use url::Url;

use crate::error::AppCastError;
use crate::item::AppCast;

/// Turns feed text into an [`AppCast`] and back.
///
/// Implementations skip individual items they cannot understand (logging a
/// warning) but fail the whole call when the document itself is unusable.
/// Returned casts are sorted newest first.
#[async_trait]
pub trait AppCastSerializer: Send + Sync {
    /// Parse `text`, resolving relative links against `base` when given.
    ///
    /// # Errors
    /// Returns [`AppCastError::Malformed`] when the document is structurally
    /// invalid.
    fn deserialize_with_base(&self, text: &str, base: Option<&Url>)
    -> Result<AppCast, AppCastError>;

    /// # Errors
    /// Returns an error when the cast cannot be rendered.
    fn serialize(&self, cast: &AppCast) -> Result<String, AppCastError>;

    /// # Errors
    /// See [`AppCastSerializer::deserialize_with_base`].
    fn deserialize(&self, text: &str) -> Result<AppCast, AppCastError> {
        self.deserialize_with_base(text, None)
    }

    /// # Errors
    /// Returns an error when the file cannot be read or parsed.
    fn deserialize_from_path(&self, path: &Path) -> Result<AppCast, AppCastError> {
        let text = std::fs::read_to_string(path)
            .map_err(|error| AppCastError::io("failed to read app cast file", error))?;
        self.deserialize(strip_bom(&text))
    }

    /// # Errors
    /// Returns an error when the cast cannot be rendered or written.
    fn serialize_to_path(&self, cast: &AppCast, path: &Path) -> Result<(), AppCastError> {
        let text = self.serialize(cast)?;
        std::fs::write(path, text)
            .map_err(|error| AppCastError::io("failed to write app cast file", error))
    }

    /// # Errors
    /// Returns an error when the file cannot be read or parsed.
    async fn deserialize_from_path_async(&self, path: &Path) -> Result<AppCast, AppCastError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|error| AppCastError::io("failed to read app cast file", error))?;
        self.deserialize(strip_bom(&text))
    }

    /// # Errors
    /// Returns an error when the cast cannot be rendered or written.
    async fn serialize_to_path_async(&self, cast: &AppCast, path: &Path) -> Result<(), AppCastError> {
        let text = self.serialize(cast)?;
        tokio::fs::write(path, text)
            .await
            .map_err(|error| AppCastError::io("failed to write app cast file", error))
    }
}

pub(crate) fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}
