//! Detached-signature verification for app casts and downloads.

mod chunked;
pub mod dsa_checker;
pub mod ed25519_checker;
mod error;
mod key;
mod policy;
mod verifier;

pub use dsa_checker::DsaChecker;
pub use ed25519_checker::Ed25519Checker;
pub use error::KeyError;
pub use key::{EmbeddedResources, PublicKeySource};
pub use policy::{SecurityMode, ValidationResult};
pub use verifier::{SignatureChecker, SignatureVerifier};
