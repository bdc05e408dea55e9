//! Custodian key seam: wrapping the one-time identity for transport.
//!
//! A [`KeyCustodian`] is a remote service holding a master key the bridge
//! never sees. It gates recovery of the one-time identity only; payload
//! plaintext never passes through it.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cbactions_core::{BridgeError, Result};
use hkdf::Hkdf;
use rand_core::{OsRng, RngCore};
use sha2::Sha256;
use zeroize::Zeroizing;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};

use crate::identity::{parse_identities, OneTimeIdentity};

/// Opaque encrypt/decrypt under a custodian-held key.
pub trait KeyCustodian: Send + Sync {
    /// Service name for logs and errors.
    fn name(&self) -> &str;

    /// Encrypt `plaintext` under the key named by `key_ref`.
    fn encrypt(&self, key_ref: &str, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt a blob produced by [`KeyCustodian::encrypt`]. The key is
    /// implied by the ciphertext; `key_ref`, when given, pins it.
    fn decrypt(&self, key_ref: Option<&str>, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>>;
}

/// Wrap an identity's secret text under `key_ref`, returning base64 text.
pub fn wrap_key(custodian: &dyn KeyCustodian, key_ref: &str, identity_text: &str) -> Result<String> {
    let blob = custodian.encrypt(key_ref, identity_text.as_bytes())?;
    tracing::debug!(custodian = custodian.name(), bytes = blob.len(), "wrapped one-time identity");
    Ok(STANDARD.encode(blob))
}

/// Recover the identities from base64 wrapped-key text.
pub fn unwrap_key(
    custodian: &dyn KeyCustodian,
    key_ref: Option<&str>,
    wrapped: &str,
) -> Result<Vec<OneTimeIdentity>> {
    let blob = STANDARD.decode(wrapped.trim())?;
    let plaintext = custodian.decrypt(key_ref, &blob)?;
    let text = std::str::from_utf8(&plaintext)
        .map_err(|_| BridgeError::Crypto("unwrapped identity is not UTF-8".to_string()))?;
    parse_identities(text)
}

const LOCAL_SERVICE: &str = "local-custodian";
const LOCAL_KDF_INFO: &[u8] = b"cbactions/local-custodian/v1:";
const NONCE_LEN: usize = 12;

/// Custodian backed by a master key held in this process.
///
/// For deployments without a managed key service, and for tests. Blob
/// format: `[2: key_ref length BE][key_ref][12: nonce][ciphertext+tag]`;
/// each key reference gets its own HKDF-derived key.
pub struct LocalCustodian {
    master: Zeroizing<[u8; 32]>,
}

impl LocalCustodian {
    pub fn new(master: [u8; 32]) -> Self {
        Self {
            master: Zeroizing::new(master),
        }
    }

    pub fn generate() -> Self {
        let mut master = [0u8; 32];
        OsRng.fill_bytes(&mut master);
        Self::new(master)
    }

    /// Load a master key from base64 text (e.g. the contents of a key file).
    pub fn from_base64(text: &str) -> Result<Self> {
        let raw = Zeroizing::new(STANDARD.decode(text.trim())?);
        let master: [u8; 32] = raw.as_slice().try_into().map_err(|_| {
            BridgeError::Config(format!(
                "local custodian key must be 32 bytes, got {}",
                raw.len()
            ))
        })?;
        Ok(Self::new(master))
    }

    pub fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(STANDARD.encode(self.master.as_slice()))
    }

    fn cipher_for(&self, key_ref: &str) -> Result<Aes256Gcm> {
        let hk = Hkdf::<Sha256>::new(None, self.master.as_slice());
        let mut key = Zeroizing::new([0u8; 32]);
        hk.expand_multi_info(&[LOCAL_KDF_INFO, key_ref.as_bytes()], &mut key[..])
            .map_err(|e| BridgeError::remote(LOCAL_SERVICE, format!("key derivation: {}", e)))?;
        Aes256Gcm::new_from_slice(&key[..])
            .map_err(|e| BridgeError::remote(LOCAL_SERVICE, format!("cipher init: {}", e)))
    }
}

impl KeyCustodian for LocalCustodian {
    fn name(&self) -> &str {
        LOCAL_SERVICE
    }

    fn encrypt(&self, key_ref: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
        let ref_len = u16::try_from(key_ref.len())
            .map_err(|_| BridgeError::remote(LOCAL_SERVICE, "key reference too long"))?;
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let sealed = self
            .cipher_for(key_ref)?
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| BridgeError::remote(LOCAL_SERVICE, "encryption failed"))?;

        let mut blob = Vec::with_capacity(2 + key_ref.len() + NONCE_LEN + sealed.len());
        blob.extend_from_slice(&ref_len.to_be_bytes());
        blob.extend_from_slice(key_ref.as_bytes());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&sealed);
        Ok(blob)
    }

    fn decrypt(&self, key_ref: Option<&str>, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let malformed = || BridgeError::remote(LOCAL_SERVICE, "malformed ciphertext blob");
        if ciphertext.len() < 2 {
            return Err(malformed());
        }
        let ref_len = usize::from(u16::from_be_bytes([ciphertext[0], ciphertext[1]]));
        let rest = &ciphertext[2..];
        if rest.len() < ref_len + NONCE_LEN {
            return Err(malformed());
        }
        let (embedded_ref, rest) = rest.split_at(ref_len);
        let embedded_ref = std::str::from_utf8(embedded_ref).map_err(|_| malformed())?;
        if let Some(expected) = key_ref {
            if expected != embedded_ref {
                return Err(BridgeError::remote(
                    LOCAL_SERVICE,
                    format!("ciphertext was encrypted under {}, not {}", embedded_ref, expected),
                ));
            }
        }
        let (nonce, sealed) = rest.split_at(NONCE_LEN);
        let plaintext = self
            .cipher_for(embedded_ref)?
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| BridgeError::remote(LOCAL_SERVICE, "decryption failed"))?;
        Ok(Zeroizing::new(plaintext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{open, seal};

    #[test]
    fn test_wrap_unwrap_identity_decrypts_same_envelopes() {
        let custodian = LocalCustodian::generate();
        let id = OneTimeIdentity::generate();
        let sealed = seal(&id.recipient(), b"echo hi").unwrap();

        let wrapped = wrap_key(&custodian, "alias/cbactions", &id.to_secret_text()).unwrap();
        assert!(!wrapped.contains("AGE-SECRET-KEY-1"));

        let recovered = unwrap_key(&custodian, None, &wrapped).unwrap();
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].recipient(), id.recipient());
        assert_eq!(open(&recovered, &sealed).unwrap().as_slice(), b"echo hi");
    }

    #[test]
    fn test_unwrap_with_pinned_key_ref() {
        let custodian = LocalCustodian::generate();
        let id = OneTimeIdentity::generate();
        let wrapped = wrap_key(&custodian, "key-a", &id.to_secret_text()).unwrap();

        assert!(unwrap_key(&custodian, Some("key-a"), &wrapped).is_ok());
        let err = unwrap_key(&custodian, Some("key-b"), &wrapped).unwrap_err();
        assert!(matches!(err, BridgeError::RemoteService { .. }));
    }

    #[test]
    fn test_other_custodian_cannot_unwrap() {
        let a = LocalCustodian::generate();
        let b = LocalCustodian::generate();
        let id = OneTimeIdentity::generate();
        let wrapped = wrap_key(&a, "k", &id.to_secret_text()).unwrap();
        let err = unwrap_key(&b, None, &wrapped).unwrap_err();
        assert!(matches!(err, BridgeError::RemoteService { .. }));
    }

    #[test]
    fn test_unwrap_rejects_non_identity_plaintext() {
        let custodian = LocalCustodian::generate();
        let wrapped = wrap_key(&custodian, "k", "hello world").unwrap();
        let err = unwrap_key(&custodian, None, &wrapped).unwrap_err();
        assert!(matches!(err, BridgeError::Crypto(_)));
    }

    #[test]
    fn test_unwrap_rejects_bad_base64() {
        let custodian = LocalCustodian::generate();
        let err = unwrap_key(&custodian, None, "%%%").unwrap_err();
        assert!(matches!(err, BridgeError::Encoding(_)));
    }

    #[test]
    fn test_master_key_base64_roundtrip() {
        let a = LocalCustodian::generate();
        let b = LocalCustodian::from_base64(&a.to_base64()).unwrap();
        let blob = a.encrypt("k", b"x").unwrap();
        assert_eq!(b.decrypt(None, &blob).unwrap().as_slice(), b"x");
        assert!(LocalCustodian::from_base64("c2hvcnQ=").is_err());
    }
}
