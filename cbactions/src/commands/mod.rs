//! Subcommand implementations.
//!
//! - `entrypoint`: inside half, runs on the job host
//! - `spawnclient`: outside half, launched by the listener as its worker
//! - `launch`: start one virtualized listener instance
//! - `keygen`: identity and custodian key generation

#[cfg(unix)]
pub mod entrypoint;
pub mod keygen;
#[cfg(unix)]
pub mod launch;
#[cfg(unix)]
pub mod spawnclient;

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use zeroize::Zeroizing;

use cbactions_aws::{CredentialProvider, KmsCustodian};
use cbactions_core::config::{AwsConfig, CustodianConfig};
use cbactions_crypto::{KeyCustodian, LocalCustodian};

/// Build the configured key custodian.
pub fn build_custodian(config: &CustodianConfig) -> Result<Box<dyn KeyCustodian>> {
    match config {
        CustodianConfig::Local(path) => {
            let text = Zeroizing::new(
                fs::read_to_string(path)
                    .with_context(|| format!("reading custodian key {}", path.display()))?,
            );
            let custodian = LocalCustodian::from_base64(text.trim())
                .with_context(|| format!("loading custodian key {}", path.display()))?;
            Ok(Box::new(custodian))
        }
        CustodianConfig::Kms => {
            let aws = AwsConfig::from_env()?;
            let credentials = Arc::new(CredentialProvider::from_env()?);
            Ok(Box::new(KmsCustodian::new(&aws, credentials)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbactions_crypto::{unwrap_key, wrap_key, OneTimeIdentity};

    #[test]
    fn test_local_custodian_from_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("master.key");
        let master = LocalCustodian::generate();
        fs::write(&path, format!("{}\n", master.to_base64().as_str())).unwrap();

        let custodian = build_custodian(&CustodianConfig::Local(path)).unwrap();
        assert_eq!(custodian.name(), "local-custodian");

        let identity = OneTimeIdentity::generate();
        let wrapped = wrap_key(custodian.as_ref(), "runners", &identity.to_secret_text()).unwrap();
        let opened = unwrap_key(&master, None, &wrapped).unwrap();
        assert_eq!(opened[0].recipient(), identity.recipient());
    }

    #[test]
    fn test_missing_key_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = build_custodian(&CustodianConfig::Local(dir.path().join("absent.key")))
            .err()
            .unwrap();
        assert!(format!("{:#}", err).contains("absent.key"));
    }
}
