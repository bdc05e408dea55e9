//! Envelope: authenticated encryption of a byte stream to one recipient.
//!
//! The envelope is a binary age v1 file (X25519 recipient stanza, STREAM
//! payload) carried as standard-alphabet base64, so either side can be
//! replaced by any age implementation.

use std::io::{self, Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cbactions_core::{BridgeError, Result};
use zeroize::Zeroizing;

use crate::identity::{OneTimeIdentity, Recipient};

/// First line of every binary envelope.
pub const AGE_HEADER: &[u8] = b"age-encryption.org/v1\n";

/// Streaming envelope encryptor.
///
/// Plaintext written here is chunked and sealed by age; call
/// [`EnvelopeWriter::finish`] to seal the final chunk.
pub struct EnvelopeWriter<W: Write> {
    inner: age::stream::StreamWriter<W>,
}

impl<W: Write> EnvelopeWriter<W> {
    /// Write the envelope header to `inner` and prepare to seal to `recipient`.
    pub fn new(inner: W, recipient: &Recipient) -> Result<Self> {
        let recipients: Vec<Box<dyn age::Recipient + Send>> =
            vec![Box::new(recipient.as_age().clone())];
        let encryptor = age::Encryptor::with_recipients(recipients)
            .ok_or_else(|| BridgeError::Crypto("no envelope recipients".to_string()))?;
        let inner = encryptor
            .wrap_output(inner)
            .map_err(|e| BridgeError::Crypto(format!("writing envelope header: {}", e)))?;
        Ok(Self { inner })
    }

    /// Seal the final chunk and hand back the inner writer.
    pub fn finish(self) -> Result<W> {
        self.inner
            .finish()
            .map_err(|e| BridgeError::io("sealing final envelope chunk", e))
    }
}

impl<W: Write> Write for EnvelopeWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.inner.write(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Encrypt `plaintext` to `recipient`, returning base64 envelope text.
pub fn seal(recipient: &Recipient, plaintext: &[u8]) -> Result<String> {
    let mut writer = EnvelopeWriter::new(Vec::new(), recipient)?;
    writer
        .write_all(plaintext)
        .map_err(|e| BridgeError::Crypto(format!("sealing envelope: {}", e)))?;
    let bytes = writer.finish()?;
    Ok(STANDARD.encode(bytes))
}

/// Decrypt base64 envelope text with the first matching identity.
///
/// Fails with `Encoding` on invalid base64 and `Crypto` when the envelope is
/// malformed, truncated, or addressed to none of `identities`.
pub fn open(identities: &[OneTimeIdentity], envelope: &str) -> Result<Zeroizing<Vec<u8>>> {
    let raw = STANDARD.decode(envelope.trim())?;
    if identities.is_empty() {
        return Err(BridgeError::Crypto("no identities supplied".to_string()));
    }
    let decryptor = match age::Decryptor::new(&raw[..]) {
        Ok(age::Decryptor::Recipients(d)) => d,
        Ok(_) => {
            return Err(BridgeError::Crypto(
                "envelope is passphrase-encrypted".to_string(),
            ))
        }
        Err(e) => return Err(BridgeError::Crypto(format!("malformed envelope: {}", e))),
    };
    let mut reader = decryptor
        .decrypt(identities.iter().map(|i| i.as_age() as &dyn age::Identity))
        .map_err(|e| match e {
            age::DecryptError::NoMatchingKeys => {
                BridgeError::Crypto("no identity matched the envelope".to_string())
            }
            other => BridgeError::Crypto(format!("opening envelope: {}", other)),
        })?;
    let mut plaintext = Zeroizing::new(Vec::with_capacity(raw.len()));
    reader
        .read_to_end(&mut plaintext)
        .map_err(|e| BridgeError::Crypto(format!("envelope payload rejected: {}", e)))?;
    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHUNK_SIZE: usize = 64 * 1024;

    fn roundtrip(payload: &[u8]) {
        let id = OneTimeIdentity::generate();
        let sealed = seal(&id.recipient(), payload).unwrap();
        let opened = open(&[id], &sealed).unwrap();
        assert_eq!(opened.as_slice(), payload);
    }

    #[test]
    fn test_roundtrip_sizes() {
        roundtrip(b"");
        roundtrip(b"echo hi");
        roundtrip("multi-byte: héllo ✓ 日本".as_bytes());
        roundtrip(&vec![7u8; CHUNK_SIZE]);
        roundtrip(&vec![1u8; 3 * CHUNK_SIZE + 17]);
    }

    #[test]
    fn test_envelope_is_age_v1() {
        let id = OneTimeIdentity::generate();
        let sealed = seal(&id.recipient(), b"payload").unwrap();
        let raw = STANDARD.decode(&sealed).unwrap();
        assert!(raw.starts_with(AGE_HEADER));
        assert!(raw
            .windows(b"-> X25519 ".len())
            .any(|w| w == b"-> X25519 "));
    }

    #[test]
    fn test_streaming_writes() {
        let id = OneTimeIdentity::generate();
        let data: Vec<u8> = (0..(2 * CHUNK_SIZE + 5)).map(|i| (i % 251) as u8).collect();
        let mut w = EnvelopeWriter::new(Vec::new(), &id.recipient()).unwrap();
        for piece in data.chunks(1000) {
            w.write_all(piece).unwrap();
        }
        let bytes = w.finish().unwrap();
        let opened = open(&[id], &STANDARD.encode(bytes)).unwrap();
        assert_eq!(opened.as_slice(), data.as_slice());
    }

    #[test]
    fn test_wrong_identity_rejected() {
        let id = OneTimeIdentity::generate();
        let other = OneTimeIdentity::generate();
        let sealed = seal(&id.recipient(), b"secret").unwrap();
        let err = open(&[other], &sealed).unwrap_err();
        assert!(err.to_string().contains("no identity matched"));
    }

    #[test]
    fn test_matching_identity_found_in_set() {
        let id = OneTimeIdentity::generate();
        let sealed = seal(&id.recipient(), b"payload").unwrap();
        let set = vec![OneTimeIdentity::generate(), id, OneTimeIdentity::generate()];
        assert_eq!(open(&set, &sealed).unwrap().as_slice(), b"payload");
    }

    #[test]
    fn test_truncated_envelope_rejected() {
        let secret = OneTimeIdentity::generate().to_secret_text();
        let identity = || secret.parse::<OneTimeIdentity>().unwrap();
        let sealed = seal(&identity().recipient(), &vec![3u8; CHUNK_SIZE + 100]).unwrap();
        let mut raw = STANDARD.decode(&sealed).unwrap();

        raw.truncate(raw.len() - 50);
        let err = open(&[identity()], &STANDARD.encode(&raw)).unwrap_err();
        assert!(matches!(err, BridgeError::Crypto(_)));

        raw.truncate(AGE_HEADER.len() + 10);
        let err = open(&[identity()], &STANDARD.encode(&raw)).unwrap_err();
        assert!(matches!(err, BridgeError::Crypto(_)));
    }

    #[test]
    fn test_tampered_chunk_rejected() {
        let id = OneTimeIdentity::generate();
        let sealed = seal(&id.recipient(), &vec![5u8; CHUNK_SIZE + 10]).unwrap();
        let mut raw = STANDARD.decode(&sealed).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let err = open(&[id], &STANDARD.encode(&raw)).unwrap_err();
        assert!(matches!(err, BridgeError::Crypto(_)));
    }

    #[test]
    fn test_malformed_inputs() {
        let secret = OneTimeIdentity::generate().to_secret_text();
        let identity = || secret.parse::<OneTimeIdentity>().unwrap();
        assert!(matches!(
            open(&[identity()], "not base64!!"),
            Err(BridgeError::Encoding(_))
        ));
        assert!(matches!(
            open(&[identity()], &STANDARD.encode(b"CBAE\x01garbage")),
            Err(BridgeError::Crypto(_))
        ));
        let sealed = seal(&identity().recipient(), b"x").unwrap();
        assert!(matches!(open(&[], &sealed), Err(BridgeError::Crypto(_))));
    }
}
