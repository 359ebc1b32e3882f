use std::path::PathBuf;

use log::{debug, warn};

use crate::error::KeyError;

/// Resources compiled into the host binary, as `(file name, contents)`.
pub type EmbeddedResources = &'static [(&'static str, &'static [u8])];

/// Where a checker finds its public key. Sources are tried in the order
/// literal, embedded resource, file; the first one present wins.
#[derive(Debug, Clone, Default)]
pub struct PublicKeySource {
    pub literal: Option<String>,
    pub embedded: Option<(EmbeddedResources, String)>,
    pub file: Option<PathBuf>,
}

impl PublicKeySource {
    #[must_use]
    pub fn literal(key: impl Into<String>) -> Self {
        Self {
            literal: Some(key.into()),
            ..Self::default()
        }
    }

    /// First resource whose file name contains `name_fragment`.
    #[must_use]
    pub fn embedded(resources: EmbeddedResources, name_fragment: impl Into<String>) -> Self {
        Self {
            embedded: Some((resources, name_fragment.into())),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            file: Some(path.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.literal.is_none() && self.embedded.is_none() && self.file.is_none()
    }

    /// Key text from the highest-priority source, or `None` when no source
    /// yields anything.
    #[must_use]
    pub fn resolve(&self) -> Option<String> {
        if let Some(literal) = self.literal.as_deref().map(str::trim)
            && !literal.is_empty()
        {
            return Some(literal.to_string());
        }

        if let Some((resources, fragment)) = &self.embedded {
            match find_embedded(resources, fragment) {
                Some(bytes) => return Some(String::from_utf8_lossy(bytes).trim().to_string()),
                None => debug!("No embedded resource matches {fragment:?}"),
            }
        }

        if let Some(path) = &self.file {
            match read_key_file(path) {
                Ok(text) => return Some(text),
                Err(error) => warn!("Failed to load public key from {}: {error}", path.display()),
            }
        }

        None
    }
}

fn find_embedded(resources: EmbeddedResources, fragment: &str) -> Option<&'static [u8]> {
    resources
        .iter()
        .find(|(name, _)| name.contains(fragment))
        .map(|(_, bytes)| *bytes)
}

fn read_key_file(path: &std::path::Path) -> Result<String, KeyError> {
    std::fs::read_to_string(path)
        .map(|text| text.trim().to_string())
        .map_err(|error| KeyError::io("failed to read public key file", error))
}

#[cfg(test)]
mod tests {
    use super::*;

    static RESOURCES: EmbeddedResources = &[
        ("assets/icon.png", b"not a key".as_slice()),
        ("assets/NetUpdate_Ed25519.pub", b"  embedded-key\n".as_slice()),
    ];

    #[test]
    fn literal_wins_over_every_other_source() {
        let source = PublicKeySource {
            literal: Some("literal-key".to_string()),
            embedded: Some((RESOURCES, "Ed25519".to_string())),
            file: Some(PathBuf::from("/does/not/exist.pub")),
        };
        assert_eq!(source.resolve().as_deref(), Some("literal-key"));
    }

    #[test]
    fn embedded_resource_is_matched_by_file_name_fragment() {
        let source = PublicKeySource::embedded(RESOURCES, "Ed25519.pub");
        assert_eq!(source.resolve().as_deref(), Some("embedded-key"));
    }

    #[test]
    fn falls_back_to_file_when_nothing_else_matches() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = dir.path().join("key.pub");
        std::fs::write(&path, "file-key\n").expect("key file should be written");

        let source = PublicKeySource {
            literal: Some("   ".to_string()),
            embedded: Some((RESOURCES, "dsa".to_string())),
            file: Some(path),
        };
        assert_eq!(source.resolve().as_deref(), Some("file-key"));
    }

    #[test]
    fn missing_file_resolves_to_nothing() {
        let source = PublicKeySource::file("/does/not/exist.pub");
        assert!(source.resolve().is_none());
        assert!(PublicKeySource::default().is_empty());
    }
}
