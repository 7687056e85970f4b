//! Admin key verification for the data administration routes.

mod extractor;

use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

pub use extractor::AdminAuth;

/// The configured admin key, if any.
///
/// Held as a `SecretString` so it never shows up in logs or debug output.
/// Without a configured key every admin request is refused.
#[derive(Clone)]
pub struct AdminKey(Option<SecretString>);

impl AdminKey {
    pub fn new(key: Option<String>) -> Self {
        Self(key.filter(|k| !k.is_empty()).map(SecretString::from))
    }

    pub fn is_configured(&self) -> bool {
        self.0.is_some()
    }

    /// Constant-time comparison against the configured key.
    pub fn verify(&self, provided: &str) -> bool {
        match &self.0 {
            // ct_eq answers false for unequal lengths without an early exit.
            Some(secret) => secret
                .expose_secret()
                .as_bytes()
                .ct_eq(provided.as_bytes())
                .into(),
            None => false,
        }
    }
}

impl std::fmt::Debug for AdminKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(_) => write!(f, "AdminKey([REDACTED])"),
            None => write!(f, "AdminKey(None)"),
        }
    }
}
