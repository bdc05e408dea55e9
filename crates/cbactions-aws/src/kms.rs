//! KMS as the key custodian.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use cbactions_core::config::AwsConfig;
use cbactions_core::{BridgeError, Result};
use cbactions_crypto::KeyCustodian;

use crate::client::JsonClient;
use crate::credentials::CredentialProvider;

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct EncryptRequest<'a> {
    key_id: &'a str,
    plaintext: Zeroizing<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EncryptResponse {
    ciphertext_blob: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DecryptRequest<'a> {
    ciphertext_blob: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    key_id: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DecryptResponse {
    plaintext: Zeroizing<String>,
}

pub struct KmsCustodian {
    client: JsonClient,
}

impl KmsCustodian {
    pub fn new(config: &AwsConfig, credentials: Arc<CredentialProvider>) -> Result<Self> {
        Ok(Self {
            client: JsonClient::new(
                "kms",
                "TrentService",
                &config.region,
                config.kms_endpoint.as_deref(),
                credentials,
            )?,
        })
    }
}

impl KeyCustodian for KmsCustodian {
    fn name(&self) -> &str {
        "kms"
    }

    fn encrypt(&self, key_ref: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
        let request = EncryptRequest {
            key_id: key_ref,
            plaintext: Zeroizing::new(STANDARD.encode(plaintext)),
        };
        let response: EncryptResponse = self.client.call("Encrypt", &request)?;
        STANDARD
            .decode(response.ciphertext_blob)
            .map_err(|e| BridgeError::remote("kms", format!("Encrypt returned bad base64: {}", e)))
    }

    fn decrypt(&self, key_ref: Option<&str>, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let request = DecryptRequest {
            ciphertext_blob: STANDARD.encode(ciphertext),
            key_id: key_ref,
        };
        let response: DecryptResponse = self.client.call("Decrypt", &request)?;
        STANDARD
            .decode(response.plaintext.as_bytes())
            .map(Zeroizing::new)
            .map_err(|e| BridgeError::remote("kms", format!("Decrypt returned bad base64: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{serve, static_credentials};

    fn aws_config(endpoint: &str) -> AwsConfig {
        AwsConfig {
            region: "us-east-1".to_string(),
            kms_endpoint: Some(endpoint.to_string()),
            codebuild_endpoint: None,
        }
    }

    #[test]
    fn test_encrypt_sends_key_and_base64_plaintext() {
        let blob = STANDARD.encode(b"wrapped-bytes");
        let (url, server) = serve(vec![(200, format!(r#"{{"CiphertextBlob":"{}","KeyId":"k"}}"#, blob))]);
        let kms = KmsCustodian::new(&aws_config(&url), static_credentials()).unwrap();

        let out = kms.encrypt("arn:aws:kms:us-east-1:1:key/k", b"AGE-SECRET-KEY-1x").unwrap();
        assert_eq!(out, b"wrapped-bytes");

        let reqs = server.join().unwrap();
        let req = &reqs[0];
        assert_eq!(req.header("x-amz-target"), Some("TrentService.Encrypt"));
        let body = req.json();
        assert_eq!(body["KeyId"], "arn:aws:kms:us-east-1:1:key/k");
        assert_eq!(body["Plaintext"], STANDARD.encode(b"AGE-SECRET-KEY-1x"));
    }

    #[test]
    fn test_decrypt_omits_key_id_when_unpinned() {
        let (url, server) = serve(vec![(200, format!(r#"{{"Plaintext":"{}"}}"#, STANDARD.encode(b"id")))]);
        let kms = KmsCustodian::new(&aws_config(&url), static_credentials()).unwrap();

        let out = kms.decrypt(None, b"blob").unwrap();
        assert_eq!(out.as_slice(), b"id");

        let body = server.join().unwrap()[0].json();
        assert_eq!(body["CiphertextBlob"], STANDARD.encode(b"blob"));
        assert!(body.get("KeyId").is_none());
    }

    #[test]
    fn test_kms_failure_is_remote_service_error() {
        let (url, server) = serve(vec![(
            400,
            r#"{"__type":"InvalidCiphertextException"}"#.to_string(),
        )]);
        let kms = KmsCustodian::new(&aws_config(&url), static_credentials()).unwrap();
        let err = kms.decrypt(Some("k"), b"blob").unwrap_err();
        server.join().unwrap();
        assert!(err.to_string().contains("InvalidCiphertextException"));
    }
}
