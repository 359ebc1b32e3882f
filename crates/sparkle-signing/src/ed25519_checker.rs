use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ed25519_dalek::{PUBLIC_KEY_LENGTH, Signature, Verifier, VerifyingKey};
use log::{debug, warn};

use crate::chunked::{ChunkOutcome, for_each_chunk};
use crate::error::KeyError;
use crate::key::PublicKeySource;
use crate::policy::{SecurityMode, ValidationResult, precheck};
use crate::verifier::SignatureChecker;

/// Parse a base64-encoded 32-byte Ed25519 public key.
///
/// # Errors
/// Returns an error when the text is not base64, has the wrong length, or
/// is not a valid curve point.
pub fn parse_public_key(text: &str) -> Result<VerifyingKey, KeyError> {
    let bytes = STANDARD.decode(text.trim())?;
    let array: [u8; PUBLIC_KEY_LENGTH] =
        bytes.as_slice().try_into().map_err(|_| KeyError::Length {
            expected: PUBLIC_KEY_LENGTH,
            actual: bytes.len(),
        })?;
    VerifyingKey::from_bytes(&array).map_err(|error| KeyError::Rejected(error.to_string()))
}

fn decode_signature(signature: &str) -> Option<Signature> {
    let bytes = STANDARD
        .decode(signature.trim())
        .inspect_err(|error| debug!("Ed25519 signature is not base64: {error}"))
        .ok()?;
    Signature::from_slice(&bytes)
        .inspect_err(|error| debug!("Ed25519 signature has the wrong shape: {error}"))
        .ok()
}

/// Ed25519 verification.
#[derive(Debug, Clone)]
pub struct Ed25519Checker {
    mode: SecurityMode,
    key: Option<VerifyingKey>,
}

impl Ed25519Checker {
    /// Load the key from `source`. A missing or unusable key leaves the
    /// checker without key information.
    #[must_use]
    pub fn new(mode: SecurityMode, source: &PublicKeySource) -> Self {
        let key = source
            .resolve()
            .and_then(|text| match parse_public_key(&text) {
                Ok(key) => Some(key),
                Err(error) => {
                    warn!("Ignoring Ed25519 public key: {error}");
                    None
                }
            });
        Self { mode, key }
    }

    #[must_use]
    pub fn from_base64(mode: SecurityMode, key: &str) -> Self {
        Self::new(mode, &PublicKeySource::literal(key))
    }

    #[must_use]
    pub fn with_key(mode: SecurityMode, key: VerifyingKey) -> Self {
        Self {
            mode,
            key: Some(key),
        }
    }

    fn precheck(&self, signature: &str) -> Option<ValidationResult> {
        precheck(
            self.mode,
            self.key.is_some(),
            !signature.trim().is_empty(),
            true,
        )
    }

    fn verdict(key: &VerifyingKey, signature: &Signature, data: &[u8]) -> ValidationResult {
        if key.verify(data, signature).is_ok() {
            ValidationResult::Valid
        } else {
            ValidationResult::Invalid
        }
    }
}

impl SignatureChecker for Ed25519Checker {
    fn security_mode(&self) -> SecurityMode {
        self.mode
    }

    fn set_security_mode(&mut self, mode: SecurityMode) {
        self.mode = mode;
    }

    fn has_valid_key_information(&self) -> bool {
        self.key.is_some()
    }

    fn verify_signature(&self, signature: &str, data: &[u8]) -> ValidationResult {
        if let Some(verdict) = self.precheck(signature) {
            return verdict;
        }
        let (Some(key), Some(signature)) = (self.key.as_ref(), decode_signature(signature)) else {
            return ValidationResult::Invalid;
        };
        Self::verdict(key, &signature, data)
    }

    fn verify_signature_of_file_with_abort(
        &self,
        signature: &str,
        path: &Path,
        abort: &dyn Fn() -> bool,
    ) -> ValidationResult {
        if let Some(verdict) = self.precheck(signature) {
            return verdict;
        }
        let (Some(key), Some(signature)) = (self.key.as_ref(), decode_signature(signature)) else {
            return ValidationResult::Invalid;
        };

        // Ed25519 signs the whole message, so the file is held in memory.
        // Reading it in chunks only lets `abort` cut the read short.
        let capacity = std::fs::metadata(path)
            .ok()
            .and_then(|metadata| usize::try_from(metadata.len()).ok())
            .unwrap_or_default();
        let mut contents = Vec::with_capacity(capacity);
        match for_each_chunk(path, abort, |chunk| contents.extend_from_slice(chunk)) {
            Ok(ChunkOutcome::Completed) => Self::verdict(key, &signature, &contents),
            Ok(ChunkOutcome::Aborted) => {
                debug!("Ed25519 verification of {} aborted", path.display());
                ValidationResult::Invalid
            }
            Err(error) => {
                warn!("Failed to read {} for verification: {error}", path.display());
                ValidationResult::Invalid
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::{Signer, SigningKey};

    use super::*;

    fn signing_key() -> SigningKey {
        SigningKey::from_bytes(&[7_u8; 32])
    }

    fn public_key_base64() -> String {
        STANDARD.encode(signing_key().verifying_key().as_bytes())
    }

    fn sign(data: &[u8]) -> String {
        STANDARD.encode(signing_key().sign(data).to_bytes())
    }

    #[test]
    fn valid_signature_verifies_and_tampering_does_not() {
        let checker = Ed25519Checker::from_base64(SecurityMode::Strict, &public_key_base64());
        assert!(checker.has_valid_key_information());

        let signature = sign(b"release payload");
        assert_eq!(
            checker.verify_signature(&signature, b"release payload"),
            ValidationResult::Valid
        );
        assert_eq!(
            checker.verify_signature(&signature, b"release payl0ad"),
            ValidationResult::Invalid
        );
        assert_eq!(
            checker.verify_signature_of_string(&signature, "release payload"),
            ValidationResult::Valid
        );
    }

    #[test]
    fn garbage_signatures_are_invalid_not_errors() {
        let checker = Ed25519Checker::from_base64(SecurityMode::UseIfPossible, &public_key_base64());
        assert_eq!(
            checker.verify_signature("%%% not base64 %%%", b"data"),
            ValidationResult::Invalid
        );
        assert_eq!(
            checker.verify_signature(&STANDARD.encode([1_u8; 10]), b"data"),
            ValidationResult::Invalid
        );
    }

    #[test]
    fn strict_mode_rejects_empty_signatures_with_or_without_key() {
        let with_key = Ed25519Checker::from_base64(SecurityMode::Strict, &public_key_base64());
        let without_key = Ed25519Checker::new(SecurityMode::Strict, &PublicKeySource::default());
        for data in [b"".as_slice(), b"anything".as_slice()] {
            assert_eq!(with_key.verify_signature("", data), ValidationResult::Invalid);
            assert_eq!(without_key.verify_signature("", data), ValidationResult::Invalid);
        }
    }

    #[test]
    fn unsafe_mode_never_checks() {
        let checker = Ed25519Checker::from_base64(SecurityMode::Unsafe, &public_key_base64());
        assert_eq!(
            checker.verify_signature(&sign(b"a"), b"b"),
            ValidationResult::Unchecked
        );
        assert_eq!(checker.verify_signature("", b"b"), ValidationResult::Unchecked);
        assert_eq!(
            checker.verify_signature("bogus", b"b"),
            ValidationResult::Unchecked
        );
    }

    #[test]
    fn unusable_key_material_leaves_no_key() {
        for key in ["not base64!", "AAAA", ""] {
            let checker = Ed25519Checker::from_base64(SecurityMode::UseIfPossible, key);
            assert!(!checker.has_valid_key_information(), "{key:?}");
            assert_eq!(
                checker.verify_signature("", b"data"),
                ValidationResult::Unchecked
            );
        }
    }

    #[test]
    fn file_verification_reads_in_chunks_and_honours_abort() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = dir.path().join("update.bin");
        let payload: Vec<u8> = (0..200_000_u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &payload).expect("payload should be written");

        let checker = Ed25519Checker::from_base64(SecurityMode::Strict, &public_key_base64());
        let signature = sign(&payload);

        assert_eq!(
            checker.verify_signature_of_file(&signature, &path),
            ValidationResult::Valid
        );
        assert_eq!(
            checker.verify_signature_of_file_with_abort(&signature, &path, &|| true),
            ValidationResult::Invalid
        );
        assert_eq!(
            checker.verify_signature_of_file(&signature, &dir.path().join("missing.bin")),
            ValidationResult::Invalid
        );
    }
}
