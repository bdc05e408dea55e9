//! AWS credential discovery.
//!
//! Chain, first match wins: env keys, shared credentials file, container
//! endpoint, EC2 instance metadata (IMDSv2).

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use cbactions_core::config::env_keys::aws;
use cbactions_core::config::{env_optional, SecretString};
use cbactions_core::{BridgeError, Result};

/// Container credentials endpoint host (ECS task roles, CodeBuild).
const CONTAINER_ENDPOINT: &str = "http://169.254.170.2";
const IMDS_ENDPOINT: &str = "http://169.254.169.254";
const IMDS_TOKEN_PATH: &str = "/latest/api/token";
const IMDS_CREDENTIALS_PATH: &str = "/latest/meta-data/iam/security-credentials/";
const IMDS_TOKEN_TTL_SECS: &str = "21600";
const DEFAULT_PROFILE: &str = "default";

/// Refresh fetched credentials this long before they expire.
fn refresh_margin() -> chrono::Duration {
    chrono::Duration::minutes(5)
}

#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: SecretString,
    pub session_token: Option<SecretString>,
}

impl Credentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: SecretString::new(secret_access_key.into()),
            session_token: session_token.map(SecretString::new),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("session_token", &self.session_token.is_some())
            .finish_non_exhaustive()
    }
}

/// Where credentials come from.
pub enum CredentialSource {
    Static(Credentials),
    Container {
        url: String,
        authorization: Option<SecretString>,
    },
    InstanceMetadata {
        endpoint: String,
    },
}

/// Resolves credentials, caching fetched credentials until near expiry.
pub struct CredentialProvider {
    source: CredentialSource,
    cached: Mutex<Option<(Credentials, Option<DateTime<Utc>>)>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerCredentials {
    access_key_id: String,
    secret_access_key: String,
    token: Option<String>,
    expiration: Option<String>,
}

impl CredentialProvider {
    pub fn new(source: CredentialSource) -> Self {
        Self {
            source,
            cached: Mutex::new(None),
        }
    }

    /// Resolve the source from the process environment and home directory.
    pub fn from_env() -> Result<Self> {
        let lookup = |key: &str| env_optional(key, &[]);
        let home = dirs::home_dir();
        source_from(&lookup, home.as_deref()).map(Self::new)
    }

    pub fn credentials(&self) -> Result<Credentials> {
        if let CredentialSource::Static(creds) = &self.source {
            return Ok(creds.clone());
        }

        let mut cached = self
            .cached
            .lock()
            .map_err(|_| BridgeError::remote("credentials", "credential cache lock poisoned"))?;
        if let Some((ref creds, expiry)) = *cached {
            let fresh = expiry.map_or(true, |at| Utc::now() + refresh_margin() < at);
            if fresh {
                return Ok(creds.clone());
            }
        }

        let fetched = self.fetch()?;
        *cached = Some(fetched.clone());
        Ok(fetched.0)
    }

    fn fetch(&self) -> Result<(Credentials, Option<DateTime<Utc>>)> {
        match &self.source {
            CredentialSource::Static(creds) => Ok((creds.clone(), None)),
            CredentialSource::Container { url, authorization } => {
                fetch_container_credentials(url, authorization.as_ref().map(|t| t.as_str()))
            }
            CredentialSource::InstanceMetadata { endpoint } => fetch_instance_credentials(endpoint),
        }
    }
}

fn source_from(
    lookup: &dyn Fn(&str) -> Option<String>,
    home: Option<&Path>,
) -> Result<CredentialSource> {
    if let (Some(key), Some(secret)) = (
        lookup(aws::AWS_ACCESS_KEY_ID),
        lookup(aws::AWS_SECRET_ACCESS_KEY),
    ) {
        tracing::debug!("using AWS credentials from environment");
        return Ok(CredentialSource::Static(Credentials::new(
            key,
            secret,
            lookup(aws::AWS_SESSION_TOKEN),
        )));
    }

    let explicit_profile = lookup(aws::AWS_PROFILE);
    let profile = explicit_profile.as_deref().unwrap_or(DEFAULT_PROFILE);
    let file = lookup(aws::AWS_SHARED_CREDENTIALS_FILE)
        .map(PathBuf::from)
        .or_else(|| home.map(|h| h.join(".aws").join("credentials")));
    if let Some(path) = file {
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                if let Some(creds) = profile_credentials(&text, profile) {
                    tracing::debug!(profile, path = %path.display(), "using AWS credentials profile");
                    return Ok(CredentialSource::Static(creds));
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(BridgeError::io(format!("reading {}", path.display()), e)),
        }
    }
    if explicit_profile.is_some() {
        return Err(BridgeError::Config(format!(
            "AWS profile {:?} not found in the shared credentials file",
            profile
        )));
    }

    if let Some(relative) = lookup(aws::AWS_CONTAINER_CREDENTIALS_RELATIVE_URI) {
        return Ok(CredentialSource::Container {
            url: format!("{}{}", CONTAINER_ENDPOINT, relative),
            authorization: None,
        });
    }
    if let Some(url) = lookup(aws::AWS_CONTAINER_CREDENTIALS_FULL_URI) {
        return Ok(CredentialSource::Container {
            url,
            authorization: lookup(aws::AWS_CONTAINER_AUTHORIZATION_TOKEN).map(SecretString::new),
        });
    }

    let imds_disabled = lookup(aws::AWS_EC2_METADATA_DISABLED)
        .map_or(false, |v| v.eq_ignore_ascii_case("true"));
    if !imds_disabled {
        return Ok(CredentialSource::InstanceMetadata {
            endpoint: lookup(aws::AWS_EC2_METADATA_SERVICE_ENDPOINT)
                .unwrap_or_else(|| IMDS_ENDPOINT.to_string()),
        });
    }

    Err(BridgeError::Config(format!(
        "no AWS credentials: set {}/{}, a credentials profile, or {}",
        aws::AWS_ACCESS_KEY_ID,
        aws::AWS_SECRET_ACCESS_KEY,
        aws::AWS_CONTAINER_CREDENTIALS_RELATIVE_URI
    )))
}

/// Keys of `[profile]` in a shared credentials file. `None` unless both the
/// key id and the secret are present.
fn profile_credentials(text: &str, profile: &str) -> Option<Credentials> {
    let mut in_section = false;
    let mut key = None;
    let mut secret = None;
    let mut token = None;
    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_section = name.trim() == profile;
            continue;
        }
        if !in_section {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            let v = v.trim().to_string();
            match k.trim() {
                "aws_access_key_id" => key = Some(v),
                "aws_secret_access_key" => secret = Some(v),
                "aws_session_token" => token = Some(v),
                _ => {}
            }
        }
    }
    Some(Credentials::new(key?, secret?, token))
}

fn http_agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(2))
        .timeout_read(Duration::from_secs(5))
        .build()
}

fn response_text(result: std::result::Result<ureq::Response, ureq::Error>, url: &str) -> Result<String> {
    result
        .map_err(|e| BridgeError::remote("credentials", format!("{}: {}", url, e)))?
        .into_string()
        .map_err(|e| BridgeError::remote("credentials", format!("reading response: {}", e)))
}

fn fetch_instance_credentials(endpoint: &str) -> Result<(Credentials, Option<DateTime<Utc>>)> {
    let agent = http_agent();
    let base = endpoint.trim_end_matches('/');

    let token_url = format!("{}{}", base, IMDS_TOKEN_PATH);
    let token = response_text(
        agent
            .put(&token_url)
            .set("X-aws-ec2-metadata-token-ttl-seconds", IMDS_TOKEN_TTL_SECS)
            .call(),
        &token_url,
    )?;
    let token = SecretString::new(token.trim().to_string());

    let roles_url = format!("{}{}", base, IMDS_CREDENTIALS_PATH);
    let roles = response_text(
        agent
            .get(&roles_url)
            .set("X-aws-ec2-metadata-token", token.as_str())
            .call(),
        &roles_url,
    )?;
    let role = roles
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| BridgeError::remote("credentials", "instance has no IAM role attached"))?;

    let role_url = format!("{}{}", roles_url, role);
    let body = response_text(
        agent
            .get(&role_url)
            .set("X-aws-ec2-metadata-token", token.as_str())
            .call(),
        &role_url,
    )?;
    let parsed = parse_container_credentials(&body)?;
    tracing::debug!(role, expires = ?parsed.1, "fetched instance metadata credentials");
    Ok(parsed)
}

fn fetch_container_credentials(
    url: &str,
    authorization: Option<&str>,
) -> Result<(Credentials, Option<DateTime<Utc>>)> {
    let mut request = http_agent().get(url);
    if let Some(token) = authorization {
        request = request.set("Authorization", token);
    }
    let body = response_text(request.call(), url)?;
    let parsed = parse_container_credentials(&body)?;
    tracing::debug!(expires = ?parsed.1, "fetched container credentials");
    Ok(parsed)
}

fn parse_container_credentials(body: &str) -> Result<(Credentials, Option<DateTime<Utc>>)> {
    let raw: ContainerCredentials = serde_json::from_str(body).map_err(|e| {
        BridgeError::remote("credentials", format!("malformed credentials response: {}", e))
    })?;
    let expiry = match raw.expiration {
        Some(ref text) => Some(
            DateTime::parse_from_rfc3339(text)
                .map_err(|e| {
                    BridgeError::remote("credentials", format!("bad Expiration {:?}: {}", text, e))
                })?
                .with_timezone(&Utc),
        ),
        None => None,
    };
    Ok((
        Credentials::new(raw.access_key_id, raw.secret_access_key, raw.token),
        expiry,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::serve;
    use std::collections::HashMap;

    fn resolve(vars: &[(&str, &str)], home: Option<&Path>) -> Result<CredentialSource> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let lookup = move |key: &str| map.get(key).cloned();
        source_from(&lookup, home)
    }

    fn static_key(source: Result<CredentialSource>) -> String {
        match source {
            Ok(CredentialSource::Static(c)) => c.access_key_id,
            _ => panic!("expected static credentials"),
        }
    }

    const CREDENTIALS_FILE: &str = "\
# shared credentials
[default]
aws_access_key_id = AKIDDEFAULT
aws_secret_access_key = default-secret

[ci]
aws_access_key_id=AKIDCI
aws_secret_access_key=ci-secret
aws_session_token = ci-token
; no secret here
[broken]
aws_access_key_id = AKIDBROKEN
";

    #[test]
    fn test_profile_parsing() {
        let d = profile_credentials(CREDENTIALS_FILE, "default").unwrap();
        assert_eq!(d.access_key_id, "AKIDDEFAULT");
        assert_eq!(d.secret_access_key.as_str(), "default-secret");
        assert!(d.session_token.is_none());

        let ci = profile_credentials(CREDENTIALS_FILE, "ci").unwrap();
        assert_eq!(ci.access_key_id, "AKIDCI");
        assert_eq!(ci.session_token.as_deref().map(String::as_str), Some("ci-token"));

        assert!(profile_credentials(CREDENTIALS_FILE, "broken").is_none());
        assert!(profile_credentials(CREDENTIALS_FILE, "absent").is_none());
    }

    #[test]
    fn test_env_keys_take_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("credentials");
        std::fs::write(&file, CREDENTIALS_FILE).unwrap();
        let source = resolve(
            &[
                ("AWS_ACCESS_KEY_ID", "AKIDENV"),
                ("AWS_SECRET_ACCESS_KEY", "s"),
                ("AWS_SHARED_CREDENTIALS_FILE", file.to_str().unwrap()),
            ],
            None,
        );
        assert_eq!(static_key(source), "AKIDENV");
    }

    #[test]
    fn test_default_profile_from_home() {
        let home = tempfile::tempdir().unwrap();
        std::fs::create_dir(home.path().join(".aws")).unwrap();
        std::fs::write(home.path().join(".aws/credentials"), CREDENTIALS_FILE).unwrap();
        let source = resolve(&[("AWS_CONTAINER_CREDENTIALS_RELATIVE_URI", "/v2/x")], Some(home.path()));
        assert_eq!(static_key(source), "AKIDDEFAULT");
    }

    #[test]
    fn test_named_profile_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("creds.ini");
        std::fs::write(&file, CREDENTIALS_FILE).unwrap();
        let vars = [
            ("AWS_PROFILE", "ci"),
            ("AWS_SHARED_CREDENTIALS_FILE", file.to_str().unwrap()),
        ];
        assert_eq!(static_key(resolve(&vars, None)), "AKIDCI");

        let vars = [
            ("AWS_PROFILE", "absent"),
            ("AWS_SHARED_CREDENTIALS_FILE", file.to_str().unwrap()),
        ];
        assert!(matches!(resolve(&vars, None), Err(BridgeError::Config(_))));
    }

    #[test]
    fn test_container_then_instance_metadata() {
        let home = tempfile::tempdir().unwrap();
        match resolve(&[("AWS_CONTAINER_CREDENTIALS_RELATIVE_URI", "/v2/creds")], Some(home.path())) {
            Ok(CredentialSource::Container { url, authorization }) => {
                assert_eq!(url, "http://169.254.170.2/v2/creds");
                assert!(authorization.is_none());
            }
            _ => panic!("expected container source"),
        }

        match resolve(&[], Some(home.path())) {
            Ok(CredentialSource::InstanceMetadata { endpoint }) => assert_eq!(endpoint, IMDS_ENDPOINT),
            _ => panic!("expected instance metadata source"),
        }
        match resolve(&[("AWS_EC2_METADATA_SERVICE_ENDPOINT", "http://[fd00:ec2::254]")], None) {
            Ok(CredentialSource::InstanceMetadata { endpoint }) => {
                assert_eq!(endpoint, "http://[fd00:ec2::254]")
            }
            _ => panic!("expected instance metadata source"),
        }
        assert!(matches!(
            resolve(&[("AWS_EC2_METADATA_DISABLED", "true")], Some(home.path())),
            Err(BridgeError::Config(_))
        ));
    }

    #[test]
    fn test_instance_metadata_fetch_uses_session_token() {
        let creds = r#"{
            "Code": "Success",
            "LastUpdated": "2026-10-17T10:00:00Z",
            "Type": "AWS-HMAC",
            "AccessKeyId": "ASIAIMDS",
            "SecretAccessKey": "imds-secret",
            "Token": "imds-session",
            "Expiration": "2099-01-01T00:00:00Z"
        }"#;
        let (url, server) = serve(vec![
            (200, "imds-token".to_string()),
            (200, "runner-role\n".to_string()),
            (200, creds.to_string()),
        ]);
        let provider = CredentialProvider::new(CredentialSource::InstanceMetadata {
            endpoint: format!("{}/", url),
        });
        assert_eq!(provider.credentials().unwrap().access_key_id, "ASIAIMDS");
        // Cached: the server only answers three requests.
        assert_eq!(provider.credentials().unwrap().access_key_id, "ASIAIMDS");

        let reqs = server.join().unwrap();
        assert!(reqs[0].request_line.starts_with("PUT /latest/api/token "));
        assert_eq!(reqs[0].header("x-aws-ec2-metadata-token-ttl-seconds"), Some("21600"));
        assert!(reqs[1]
            .request_line
            .starts_with("GET /latest/meta-data/iam/security-credentials/ "));
        assert_eq!(reqs[1].header("x-aws-ec2-metadata-token"), Some("imds-token"));
        assert!(reqs[2]
            .request_line
            .starts_with("GET /latest/meta-data/iam/security-credentials/runner-role "));
        assert_eq!(reqs[2].header("x-aws-ec2-metadata-token"), Some("imds-token"));
    }

    #[test]
    fn test_parse_container_response() {
        let body = r#"{
            "RoleArn": "arn:aws:iam::111122223333:role/codebuild",
            "AccessKeyId": "ASIAEXAMPLE",
            "SecretAccessKey": "secret",
            "Token": "session",
            "Expiration": "2026-10-17T12:00:00Z"
        }"#;
        let (creds, expiry) = parse_container_credentials(body).unwrap();
        assert_eq!(creds.access_key_id, "ASIAEXAMPLE");
        assert_eq!(creds.secret_access_key.as_str(), "secret");
        assert_eq!(creds.session_token.as_deref().map(String::as_str), Some("session"));
        assert_eq!(expiry.unwrap().to_rfc3339(), "2026-10-17T12:00:00+00:00");
    }

    #[test]
    fn test_parse_container_response_rejects_garbage() {
        assert!(matches!(
            parse_container_credentials("<html>"),
            Err(BridgeError::RemoteService { .. })
        ));
        assert!(parse_container_credentials(
            r#"{"AccessKeyId":"a","SecretAccessKey":"b","Expiration":"soon"}"#
        )
        .is_err());
    }

    #[test]
    fn test_static_source_returns_same_credentials() {
        let p = CredentialProvider::new(CredentialSource::Static(Credentials::new("AKID", "s", None)));
        assert_eq!(p.credentials().unwrap().access_key_id, "AKID");
    }

    #[test]
    fn test_debug_hides_secret() {
        let c = Credentials::new("AKID", "super-secret", Some("tok".into()));
        let dbg = format!("{:?}", c);
        assert!(!dbg.contains("super-secret"));
        assert!(!dbg.contains("tok\""));
    }
}
