//! Minimal AWS JSON-1.1 protocol client over ureq.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use zeroize::Zeroizing;

use cbactions_core::{BridgeError, Result};

use crate::credentials::CredentialProvider;
use crate::sigv4::{sign, SignableRequest};

const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

fn make_agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(10))
        .timeout_read(Duration::from_secs(60))
        .build()
}

/// One AWS service endpoint speaking the JSON-1.1 protocol.
pub struct JsonClient {
    agent: ureq::Agent,
    endpoint: String,
    host: String,
    region: String,
    /// SigV4 signing name, e.g. `kms`, `codebuild`.
    service: &'static str,
    /// `X-Amz-Target` prefix, e.g. `TrentService`.
    target_prefix: &'static str,
    credentials: Arc<CredentialProvider>,
}

impl JsonClient {
    pub fn new(
        service: &'static str,
        target_prefix: &'static str,
        region: &str,
        endpoint: Option<&str>,
        credentials: Arc<CredentialProvider>,
    ) -> Result<Self> {
        let endpoint = match endpoint {
            Some(e) => e.trim_end_matches('/').to_string(),
            None => format!("https://{}.{}.amazonaws.com", service, region),
        };
        let host = endpoint_host(&endpoint)?;
        Ok(Self {
            agent: make_agent(),
            endpoint,
            host,
            region: region.to_string(),
            service,
            target_prefix,
            credentials,
        })
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    /// POST `operation` with a JSON body and decode the JSON response.
    pub fn call<B: Serialize, R: DeserializeOwned>(&self, operation: &str, body: &B) -> Result<R> {
        let payload = Zeroizing::new(serde_json::to_vec(body).map_err(|e| {
            BridgeError::Encoding(format!("serializing {} request: {}", operation, e))
        })?);
        let target = format!("{}.{}", self.target_prefix, operation);
        let credentials = self.credentials.credentials()?;

        let mut request = SignableRequest {
            method: "POST",
            path: "/",
            query: "",
            headers: vec![
                ("host".to_string(), self.host.clone()),
                ("content-type".to_string(), CONTENT_TYPE.to_string()),
                ("x-amz-target".to_string(), target.clone()),
            ],
            payload: &payload,
        };
        sign(&mut request, &credentials, &self.region, self.service, Utc::now());

        let mut http = self.agent.post(&format!("{}/", self.endpoint));
        for (name, value) in &request.headers {
            // ureq derives Host from the URL.
            if name != "host" {
                http = http.set(name, value);
            }
        }

        tracing::debug!(service = self.service, target = %target, "aws request");
        let response = http.send_bytes(&payload).map_err(|e| self.describe_error(operation, e))?;
        response.into_json::<R>().map_err(|e| {
            BridgeError::remote(self.service, format!("{}: malformed response: {}", operation, e))
        })
    }

    fn describe_error(&self, operation: &str, err: ureq::Error) -> BridgeError {
        match err {
            ureq::Error::Status(code, response) => {
                let body = response.into_string().unwrap_or_default();
                BridgeError::remote(
                    self.service,
                    format!("{} returned HTTP {}: {}", operation, code, service_error(&body)),
                )
            }
            ureq::Error::Transport(t) => BridgeError::remote(
                self.service,
                format!("cannot reach {}: {}", self.endpoint, t),
            ),
        }
    }
}

/// `host[:port]` of an endpoint URL.
fn endpoint_host(endpoint: &str) -> Result<String> {
    let rest = endpoint
        .strip_prefix("https://")
        .or_else(|| endpoint.strip_prefix("http://"))
        .ok_or_else(|| BridgeError::Config(format!("endpoint must be an http(s) URL: {}", endpoint)))?;
    let host = rest.split('/').next().unwrap_or_default();
    if host.is_empty() {
        return Err(BridgeError::Config(format!("endpoint has no host: {}", endpoint)));
    }
    Ok(host.to_string())
}

/// Pull `__type` and `message` out of an AWS JSON error body.
fn service_error(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.chars().take(200).collect();
    };
    let kind = value
        .get("__type")
        .and_then(|v| v.as_str())
        .map(|t| t.rsplit('#').next().unwrap_or(t))
        .unwrap_or("UnknownError");
    let message = value
        .get("message")
        .or_else(|| value.get("Message"))
        .and_then(|v| v.as_str())
        .unwrap_or("");
    format!("{} {}", kind, message).trim_end().to_string()
}
