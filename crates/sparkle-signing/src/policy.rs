use serde::{Deserialize, Serialize};

/// How strictly signatures are required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// Verify only when both a key and a signature exist; otherwise accept.
    Unsafe,
    /// Verify when a key is configured; without one, accept unsigned data.
    UseIfPossible,
    /// Always require a key and a valid signature.
    #[default]
    Strict,
    /// Like `UseIfPossible` for downloads, and skip the feed signature.
    OnlyVerifySoftwareDownloads,
}

impl SecurityMode {
    /// Whether the app cast text itself should be verified.
    #[must_use]
    pub fn verifies_app_cast(self) -> bool {
        matches!(self, Self::UseIfPossible | Self::Strict)
    }
}

impl std::fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Unsafe => "unsafe",
            Self::UseIfPossible => "use_if_possible",
            Self::Strict => "strict",
            Self::OnlyVerifySoftwareDownloads => "only_verify_software_downloads",
        };
        f.write_str(label)
    }
}

impl std::str::FromStr for SecurityMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "unsafe" => Ok(Self::Unsafe),
            "use_if_possible" => Ok(Self::UseIfPossible),
            "strict" => Ok(Self::Strict),
            "only_verify_software_downloads" => Ok(Self::OnlyVerifySoftwareDownloads),
            other => Err(format!("unknown security mode {other:?}")),
        }
    }
}

/// Outcome of a signature check. `Unchecked` means policy allowed the data
/// through without a verification, which is not the same as `Valid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationResult {
    Valid,
    Invalid,
    Unchecked,
}

impl ValidationResult {
    /// `Valid` or `Unchecked`: the caller may proceed.
    #[must_use]
    pub fn is_acceptable(self) -> bool {
        !matches!(self, Self::Invalid)
    }
}

/// Verdict reached without running the algorithm, or `None` when the
/// signature has to be verified.
///
/// `unsafe_skips_verification` selects the Ed25519 behaviour, where
/// `Unsafe` never verifies even with a key and a signature present.
pub(crate) fn precheck(
    mode: SecurityMode,
    has_key: bool,
    has_signature: bool,
    unsafe_skips_verification: bool,
) -> Option<ValidationResult> {
    use ValidationResult::{Invalid, Unchecked};

    match (mode, has_key, has_signature) {
        (SecurityMode::Unsafe, true, true) if unsafe_skips_verification => Some(Unchecked),
        (SecurityMode::Unsafe, true, true) => None,
        (SecurityMode::Unsafe, _, _) => Some(Unchecked),
        (SecurityMode::Strict, false, _) => Some(Invalid),
        (_, false, _) => Some(Unchecked),
        (_, true, false) => Some(Invalid),
        (_, true, true) => None,
    }
}
