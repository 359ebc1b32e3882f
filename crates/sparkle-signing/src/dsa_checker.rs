use std::path::Path;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use dsa::signature::DigestVerifier;
use dsa::{BigUint, Components, Signature, VerifyingKey};
use log::{debug, warn};
use quick_xml::Reader;
use quick_xml::events::Event;
use sha1::{Digest, Sha1};

use crate::chunked::{ChunkOutcome, for_each_chunk};
use crate::error::KeyError;
use crate::key::PublicKeySource;
use crate::policy::{SecurityMode, ValidationResult, precheck};
use crate::verifier::SignatureChecker;

/// Parse a public key in the `<DSAKeyValue>` XML container format, where
/// `P`, `Q`, `G` and `Y` are base64 big-endian integers. Other elements
/// (`J`, `Seed`, `PgenCounter`) are ignored.
///
/// # Errors
/// Returns an error when the XML is malformed, a component is missing or
/// not base64, or the parameters are rejected.
pub fn parse_public_key(xml: &str) -> Result<VerifyingKey, KeyError> {
    let mut reader = Reader::from_str(xml.trim());
    reader.config_mut().trim_text(true);

    let (mut p, mut q, mut g, mut y) = (None, None, None, None);
    let mut current: Option<String> = None;
    loop {
        match reader
            .read_event()
            .map_err(|error| KeyError::Xml(error.to_string()))?
        {
            Event::Start(element) => {
                current = Some(String::from_utf8_lossy(element.local_name().as_ref()).into_owned());
            }
            Event::Text(text) => {
                let Some(name) = current.as_deref() else {
                    continue;
                };
                let slot = match name {
                    "P" => &mut p,
                    "Q" => &mut q,
                    "G" => &mut g,
                    "Y" => &mut y,
                    _ => continue,
                };
                let text = text
                    .unescape()
                    .map_err(|error| KeyError::Xml(error.to_string()))?;
                *slot = Some(BigUint::from_bytes_be(&STANDARD.decode(text.trim())?));
            }
            Event::End(_) => current = None,
            Event::Eof => break,
            _ => {}
        }
    }

    let components = Components::from_components(
        p.ok_or(KeyError::MissingComponent("P"))?,
        q.ok_or(KeyError::MissingComponent("Q"))?,
        g.ok_or(KeyError::MissingComponent("G"))?,
    )
    .map_err(|error| KeyError::Rejected(error.to_string()))?;
    VerifyingKey::from_components(components, y.ok_or(KeyError::MissingComponent("Y"))?)
        .map_err(|error| KeyError::Rejected(error.to_string()))
}

/// DSA over SHA-1, the legacy scheme.
///
/// Signatures are accepted as raw `r || s` (each half the length of `Q`) or
/// DER-encoded.
#[derive(Clone)]
pub struct DsaChecker {
    mode: SecurityMode,
    key: Option<Arc<VerifyingKey>>,
}

impl std::fmt::Debug for DsaChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DsaChecker")
            .field("mode", &self.mode)
            .field("has_key", &self.key.is_some())
            .finish()
    }
}

impl DsaChecker {
    #[must_use]
    pub fn new(mode: SecurityMode, source: &PublicKeySource) -> Self {
        let key = source
            .resolve()
            .and_then(|text| match parse_public_key(&text) {
                Ok(key) => Some(Arc::new(key)),
                Err(error) => {
                    warn!("Ignoring DSA public key: {error}");
                    None
                }
            });
        Self { mode, key }
    }

    #[must_use]
    pub fn from_xml(mode: SecurityMode, xml: &str) -> Self {
        Self::new(mode, &PublicKeySource::literal(xml))
    }

    #[must_use]
    pub fn with_key(mode: SecurityMode, key: VerifyingKey) -> Self {
        Self {
            mode,
            key: Some(Arc::new(key)),
        }
    }

    fn precheck(&self, signature: &str) -> Option<ValidationResult> {
        precheck(
            self.mode,
            self.key.is_some(),
            !signature.trim().is_empty(),
            false,
        )
    }

    fn decode_signature(key: &VerifyingKey, signature: &str) -> Option<Signature> {
        let bytes = STANDARD
            .decode(signature.trim())
            .inspect_err(|error| debug!("DSA signature is not base64: {error}"))
            .ok()?;
        let half = key.components().q().bits().div_ceil(8);
        if bytes.len() == half * 2 {
            let (r, s) = bytes.split_at(half);
            return Signature::from_components(BigUint::from_bytes_be(r), BigUint::from_bytes_be(s))
                .ok();
        }
        Signature::try_from(bytes.as_slice())
            .inspect_err(|error| debug!("DSA signature is neither raw nor DER: {error}"))
            .ok()
    }

    fn verdict(key: &VerifyingKey, signature: &Signature, digest: Sha1) -> ValidationResult {
        if key.verify_digest(digest, signature).is_ok() {
            ValidationResult::Valid
        } else {
            ValidationResult::Invalid
        }
    }
}

impl SignatureChecker for DsaChecker {
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
        let Some(key) = self.key.as_deref() else {
            return ValidationResult::Invalid;
        };
        let Some(signature) = Self::decode_signature(key, signature) else {
            return ValidationResult::Invalid;
        };
        Self::verdict(key, &signature, Sha1::new_with_prefix(data))
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
        let Some(key) = self.key.as_deref() else {
            return ValidationResult::Invalid;
        };
        let Some(signature) = Self::decode_signature(key, signature) else {
            return ValidationResult::Invalid;
        };

        let mut hasher = Sha1::new();
        match for_each_chunk(path, abort, |chunk| hasher.update(chunk)) {
            Ok(ChunkOutcome::Completed) => Self::verdict(key, &signature, hasher),
            Ok(ChunkOutcome::Aborted) => {
                debug!("DSA verification of {} aborted", path.display());
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
    use std::sync::OnceLock;

    use dsa::signature::DigestSigner;
    use dsa::{KeySize, SigningKey};

    use super::*;

    fn signing_key() -> &'static SigningKey {
        static KEY: OnceLock<SigningKey> = OnceLock::new();
        KEY.get_or_init(|| {
            let mut rng = rand::thread_rng();
            #[allow(deprecated)]
            let components = Components::generate(&mut rng, KeySize::DSA_1024_160);
            SigningKey::generate(&mut rng, components)
        })
    }

    fn key_xml() -> String {
        let key = signing_key().verifying_key();
        let encode = |value: &BigUint| STANDARD.encode(value.to_bytes_be());
        format!(
            "<DSAKeyValue>\n  <P>{}</P>\n  <Q>{}</Q>\n  <G>{}</G>\n  <Y>{}</Y>\n  <Seed>AAAA</Seed>\n</DSAKeyValue>",
            encode(key.components().p()),
            encode(key.components().q()),
            encode(key.components().g()),
            encode(key.y()),
        )
    }

    fn padded(value: &BigUint, width: usize) -> Vec<u8> {
        let bytes = value.to_bytes_be();
        let mut out = vec![0_u8; width - bytes.len()];
        out.extend_from_slice(&bytes);
        out
    }

    fn sign_raw(data: &[u8]) -> String {
        let signature: Signature = signing_key().sign_digest(Sha1::new_with_prefix(data));
        let mut raw = padded(signature.r(), 20);
        raw.extend(padded(signature.s(), 20));
        STANDARD.encode(raw)
    }

    #[test]
    fn xml_key_round_trips_into_a_working_checker() {
        let checker = DsaChecker::from_xml(SecurityMode::Strict, &key_xml());
        assert!(checker.has_valid_key_information());

        let signature = sign_raw(b"appcast body");
        assert_eq!(
            checker.verify_signature(&signature, b"appcast body"),
            ValidationResult::Valid
        );
        assert_eq!(
            checker.verify_signature(&signature, b"appcast b0dy"),
            ValidationResult::Invalid
        );
    }

    #[test]
    fn der_encoded_signatures_are_accepted() {
        use dsa::signature::SignatureEncoding;

        let checker = DsaChecker::with_key(
            SecurityMode::UseIfPossible,
            signing_key().verifying_key().clone(),
        );
        let signature: Signature = signing_key().sign_digest(Sha1::new_with_prefix(b"payload"));
        let der = STANDARD.encode(signature.to_vec());

        assert_eq!(
            checker.verify_signature(&der, b"payload"),
            ValidationResult::Valid
        );
    }

    #[test]
    fn unsafe_mode_still_verifies_when_key_and_signature_exist() {
        let checker = DsaChecker::from_xml(SecurityMode::Unsafe, &key_xml());
        assert_eq!(
            checker.verify_signature(&sign_raw(b"a"), b"b"),
            ValidationResult::Invalid
        );
        assert_eq!(checker.verify_signature("", b"b"), ValidationResult::Unchecked);
    }

    #[test]
    fn file_hash_matches_in_memory_hash() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = dir.path().join("setup.exe");
        let payload = vec![0x5a_u8; 150_000];
        std::fs::write(&path, &payload).expect("payload should be written");

        let checker = DsaChecker::from_xml(SecurityMode::Strict, &key_xml());
        let signature = sign_raw(&payload);
        assert_eq!(
            checker.verify_signature_of_file(&signature, &path),
            ValidationResult::Valid
        );
        assert_eq!(
            checker.verify_signature_of_file_with_abort(&signature, &path, &|| true),
            ValidationResult::Invalid
        );
    }

    #[test]
    fn malformed_key_xml_leaves_no_key() {
        for xml in [
            "<DSAKeyValue><P>AQ==</P></DSAKeyValue>",
            "<DSAKeyValue><P>!!</P><Q>AQ==</Q><G>AQ==</G><Y>AQ==</Y></DSAKeyValue>",
            "<DSAKeyValue><P>AQ==",
        ] {
            let checker = DsaChecker::from_xml(SecurityMode::Strict, xml);
            assert!(!checker.has_valid_key_information(), "{xml}");
            assert_eq!(checker.verify_signature("c2ln", b"x"), ValidationResult::Invalid);
        }
        assert!(matches!(
            parse_public_key("<DSAKeyValue><P>AQ==</P></DSAKeyValue>"),
            Err(KeyError::MissingComponent("Q"))
        ));
    }
}
