//! One-time age X25519 identities.
//!
//! Text forms are the standard age encodings: `AGE-SECRET-KEY-1…` for the
//! identity and `age1…` for the recipient, so envelopes interoperate with
//! any age implementation.
//!
//! Identity files hold one record per line; blank lines and `#` comments
//! are ignored.

use std::fmt;
use std::str::FromStr;

use age::secrecy::ExposeSecret;
use cbactions_core::config::SecretString;
use cbactions_core::{BridgeError, Result};
use zeroize::Zeroizing;

pub const SECRET_KEY_PREFIX: &str = "AGE-SECRET-KEY-1";
pub const RECIPIENT_PREFIX: &str = "age1";

/// Public half of an identity: the address envelopes are sealed to.
#[derive(Clone)]
pub struct Recipient(age::x25519::Recipient);

impl Recipient {
    pub(crate) fn as_age(&self) -> &age::x25519::Recipient {
        &self.0
    }
}

impl PartialEq for Recipient {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl Eq for Recipient {}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Recipient({})", self)
    }
}

impl FromStr for Recipient {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        age::x25519::Recipient::from_str(s.trim())
            .map(Self)
            .map_err(|e| BridgeError::Crypto(format!("malformed recipient: {}", e)))
    }
}

/// An asymmetric key pair generated for a single bridge crossing.
///
/// The secret half is zeroed on drop and never written to disk in plaintext.
#[derive(Clone)]
pub struct OneTimeIdentity(age::x25519::Identity);

impl OneTimeIdentity {
    /// Generate a fresh identity from the OS CSPRNG.
    pub fn generate() -> Self {
        Self(age::x25519::Identity::generate())
    }

    pub fn recipient(&self) -> Recipient {
        Recipient(self.0.to_public())
    }

    /// Textual form of the secret key, suitable for wrapping.
    pub fn to_secret_text(&self) -> SecretString {
        let secret = self.0.to_string();
        Zeroizing::new(secret.expose_secret().to_string())
    }

    pub(crate) fn as_age(&self) -> &age::x25519::Identity {
        &self.0
    }
}

impl fmt::Debug for OneTimeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OneTimeIdentity")
            .field("recipient", &self.recipient())
            .finish_non_exhaustive()
    }
}

impl FromStr for OneTimeIdentity {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        age::x25519::Identity::from_str(s.trim())
            .map(Self)
            .map_err(|e| BridgeError::Crypto(format!("malformed identity: {}", e)))
    }
}

/// Parse an identity file: one record per line, at least one record.
pub fn parse_identities(text: &str) -> Result<Vec<OneTimeIdentity>> {
    let identities = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(OneTimeIdentity::from_str)
        .collect::<Result<Vec<_>>>()?;
    if identities.is_empty() {
        return Err(BridgeError::Crypto("no identities found".to_string()));
    }
    Ok(identities)
}
