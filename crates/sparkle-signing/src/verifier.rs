use std::path::Path;

use crate::dsa_checker::DsaChecker;
use crate::ed25519_checker::Ed25519Checker;
use crate::policy::{SecurityMode, ValidationResult, precheck};

/// Verifies detached base64 signatures under a [`SecurityMode`].
///
/// No method panics or returns an error: decode failures, unreadable files
/// and mismatches all come back as [`ValidationResult::Invalid`].
pub trait SignatureChecker: Send + Sync {
    fn security_mode(&self) -> SecurityMode;

    fn set_security_mode(&mut self, mode: SecurityMode);

    fn has_valid_key_information(&self) -> bool;

    fn verify_signature(&self, signature: &str, data: &[u8]) -> ValidationResult;

    /// Like [`SignatureChecker::verify_signature_of_file`], giving up with
    /// `Invalid` as soon as `abort` returns true between chunks.
    fn verify_signature_of_file_with_abort(
        &self,
        signature: &str,
        path: &Path,
        abort: &dyn Fn() -> bool,
    ) -> ValidationResult;

    fn verify_signature_of_file(&self, signature: &str, path: &Path) -> ValidationResult {
        self.verify_signature_of_file_with_abort(signature, path, &|| false)
    }

    fn verify_signature_of_string(&self, signature: &str, text: &str) -> ValidationResult {
        self.verify_signature(signature, text.as_bytes())
    }
}

/// The configured verification scheme.
#[derive(Debug, Clone)]
pub enum SignatureVerifier {
    /// No key material at all; the policy table alone decides.
    None(SecurityMode),
    Dsa(DsaChecker),
    Ed25519(Ed25519Checker),
}

impl Default for SignatureVerifier {
    fn default() -> Self {
        Self::None(SecurityMode::default())
    }
}

impl SignatureVerifier {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None(_) => "none",
            Self::Dsa(_) => "dsa",
            Self::Ed25519(_) => "ed25519",
        }
    }

    fn no_key_verdict(mode: SecurityMode, signature: &str) -> ValidationResult {
        precheck(mode, false, !signature.trim().is_empty(), false)
            .unwrap_or(ValidationResult::Invalid)
    }
}

impl SignatureChecker for SignatureVerifier {
    fn security_mode(&self) -> SecurityMode {
        match self {
            Self::None(mode) => *mode,
            Self::Dsa(checker) => checker.security_mode(),
            Self::Ed25519(checker) => checker.security_mode(),
        }
    }

    fn set_security_mode(&mut self, mode: SecurityMode) {
        match self {
            Self::None(current) => *current = mode,
            Self::Dsa(checker) => checker.set_security_mode(mode),
            Self::Ed25519(checker) => checker.set_security_mode(mode),
        }
    }

    fn has_valid_key_information(&self) -> bool {
        match self {
            Self::None(_) => false,
            Self::Dsa(checker) => checker.has_valid_key_information(),
            Self::Ed25519(checker) => checker.has_valid_key_information(),
        }
    }

    fn verify_signature(&self, signature: &str, data: &[u8]) -> ValidationResult {
        match self {
            Self::None(mode) => Self::no_key_verdict(*mode, signature),
            Self::Dsa(checker) => checker.verify_signature(signature, data),
            Self::Ed25519(checker) => checker.verify_signature(signature, data),
        }
    }

    fn verify_signature_of_file_with_abort(
        &self,
        signature: &str,
        path: &Path,
        abort: &dyn Fn() -> bool,
    ) -> ValidationResult {
        match self {
            Self::None(mode) => Self::no_key_verdict(*mode, signature),
            Self::Dsa(checker) => checker.verify_signature_of_file_with_abort(signature, path, abort),
            Self::Ed25519(checker) => {
                checker.verify_signature_of_file_with_abort(signature, path, abort)
            }
        }
    }
}
