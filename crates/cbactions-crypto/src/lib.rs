//! Envelope Crypto Module.
//!
//! A fresh [`OneTimeIdentity`] is generated for every bridge crossing.
//! Payloads are sealed to its public half ([`envelope::seal`]); the secret
//! half is wrapped by a remote [`KeyCustodian`] ([`wrap_key`]) so only a caller
//! authorized against the custodian key can recover it on the other side.
//! No long-lived secret is shared between the two sides.

pub mod custodian;
pub mod envelope;
pub mod identity;

pub use custodian::{unwrap_key, wrap_key, KeyCustodian, LocalCustodian};
pub use envelope::{open, seal, EnvelopeWriter};
pub use identity::{parse_identities, OneTimeIdentity, Recipient};
