use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A loosely semantic version: any number of numeric components, an optional
/// pre-release suffix and optional build metadata.
///
/// `1.2`, `1.2.0` and `1.2.0.0` compare equal; `1.2.0-beta.2` sorts before
/// `1.2.0`; build metadata never affects ordering.
#[derive(Debug, Clone)]
pub struct SemVerLike {
    components: Vec<u64>,
    pre_release: String,
    build: String,
    text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionParseError {
    #[error("Expected a dotted numeric version, got: {input:?}")]
    InvalidFormat { input: String },
    #[error("Invalid version component #{index}: {value:?}")]
    InvalidComponent { index: usize, value: String },
}

impl SemVerLike {
    #[must_use]
    pub fn components(&self) -> &[u64] {
        &self.components
    }

    #[must_use]
    pub fn pre_release(&self) -> Option<&str> {
        (!self.pre_release.is_empty()).then_some(self.pre_release.as_str())
    }

    #[must_use]
    pub fn build_metadata(&self) -> Option<&str> {
        (!self.build.is_empty()).then_some(self.build.as_str())
    }

    /// The version as it appeared in the input, trimmed and without a
    /// leading `v`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn is_pre_release(&self) -> bool {
        !self.pre_release.is_empty()
    }

    fn component(&self, index: usize) -> u64 {
        self.components.get(index).copied().unwrap_or(0)
    }
}

impl FromStr for SemVerLike {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let text = trimmed
            .strip_prefix(['v', 'V'])
            .unwrap_or(trimmed)
            .to_string();
        let invalid = || VersionParseError::InvalidFormat {
            input: s.to_string(),
        };

        if text.is_empty() {
            return Err(invalid());
        }

        let (rest, build) = match text.split_once('+') {
            Some((rest, build)) if !build.is_empty() => (rest, build),
            Some(_) => return Err(invalid()),
            None => (text.as_str(), ""),
        };
        let (core, pre_release) = match rest.split_once('-') {
            Some((core, pre)) if !pre.is_empty() => (core, pre),
            Some(_) => return Err(invalid()),
            None => (rest, ""),
        };

        let components = core
            .split('.')
            .enumerate()
            .map(|(index, part)| {
                part.parse::<u64>()
                    .map_err(|_| VersionParseError::InvalidComponent {
                        index,
                        value: part.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            components,
            pre_release: pre_release.to_string(),
            build: build.to_string(),
            text,
        })
    }
}

impl Ord for SemVerLike {
    fn cmp(&self, other: &Self) -> Ordering {
        let width = self.components.len().max(other.components.len());
        for index in 0..width {
            match self.component(index).cmp(&other.component(index)) {
                Ordering::Equal => {}
                unequal => return unequal,
            }
        }

        match (self.pre_release.is_empty(), other.pre_release.is_empty()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => compare_pre_release(&self.pre_release, &other.pre_release),
        }
    }
}

fn compare_pre_release(left: &str, right: &str) -> Ordering {
    match (semver::Prerelease::new(left), semver::Prerelease::new(right)) {
        (Ok(left), Ok(right)) => left.cmp(&right),
        _ => left.cmp(right),
    }
}

impl PartialOrd for SemVerLike {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SemVerLike {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SemVerLike {}

impl fmt::Display for SemVerLike {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl Serialize for SemVerLike {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for SemVerLike {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Whether `candidate` is strictly newer than `installed`.
///
/// An unparsable installed version fails open: any parsable candidate counts
/// as newer, so a corrupted version string never blocks updates. An
/// unparsable candidate is never newer.
#[must_use]
pub fn is_newer_version(candidate: &str, installed: &str) -> bool {
    let Ok(candidate) = candidate.parse::<SemVerLike>() else {
        return false;
    };
    match installed.parse::<SemVerLike>() {
        Ok(installed) => candidate > installed,
        Err(_) => true,
    }
}
