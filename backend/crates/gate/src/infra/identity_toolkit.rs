//! Identity Toolkit REST Provider
//!
//! Password sign-in against an Identity Toolkit compatible endpoint
//! (`accounts:signInWithPassword`). The provider session lives in this
//! process only; signing out forgets it locally.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::broadcast::IdentityBroadcast;

use crate::domain::entity::Identity;
use crate::domain::provider::{IdentityError, IdentityProvider, IdentityReceiver};
use crate::domain::value_object::Email;
use crate::error::{GateError, GateResult};

/// Public Identity Toolkit endpoint
pub const DEFAULT_ENDPOINT: &str = "https://identitytoolkit.googleapis.com/v1";

/// Provider error codes that mean "wrong email or password"
const CREDENTIAL_ERRORS: [&str; 4] = [
    "INVALID_PASSWORD",
    "EMAIL_NOT_FOUND",
    "INVALID_LOGIN_CREDENTIALS",
    "USER_DISABLED",
];

#[derive(Clone)]
pub struct IdentityToolkitConfig {
    pub api_key: String,
    pub endpoint: String,
    pub timeout: Duration,
}

impl IdentityToolkitConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// HTTP client shared by every client's provider handle
    pub fn http_client(&self) -> GateResult<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(self.timeout)
            .build()
            .map_err(|e| GateError::Config(format!("HTTP client: {e}")))
    }

    fn sign_in_url(&self) -> String {
        format!(
            "{}/accounts:signInWithPassword?key={}",
            self.endpoint.trim_end_matches('/'),
            urlencoding::encode(&self.api_key)
        )
    }
}

impl std::fmt::Debug for IdentityToolkitConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityToolkitConfig")
            .field("api_key", &"[REDACTED]")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    email: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Map a provider error message to an [`IdentityError`].
/// Messages look like `CODE` or `CODE : detail`.
fn classify(message: &str) -> IdentityError {
    let code = message.split(" : ").next().unwrap_or(message).trim();
    if CREDENTIAL_ERRORS.contains(&code) {
        IdentityError::InvalidCredentials
    } else {
        IdentityError::Network(format!("identity provider rejected sign-in: {code}"))
    }
}

/// One client's handle on the REST identity service
pub struct IdentityToolkitProvider {
    http: reqwest::Client,
    config: Arc<IdentityToolkitConfig>,
    broadcast: Mutex<IdentityBroadcast>,
}

impl IdentityToolkitProvider {
    pub fn new(http: reqwest::Client, config: Arc<IdentityToolkitConfig>) -> Self {
        Self {
            http,
            config,
            broadcast: Mutex::new(IdentityBroadcast::default()),
        }
    }

    async fn request_sign_in(&self, email: &Email, password: &str) -> Result<Identity, IdentityError> {
        let response = self
            .http
            .post(self.config.sign_in_url())
            .json(&SignInRequest {
                email: email.as_str(),
                password,
                return_secure_token: true,
            })
            .send()
            .await
            .map_err(|e| IdentityError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let body: SignInResponse = response
                .json()
                .await
                .map_err(|e| IdentityError::Network(format!("malformed sign-in response: {e}")))?;
            return Ok(Identity::new(body.local_id, body.email));
        }

        match response.json::<ErrorEnvelope>().await {
            Ok(envelope) => Err(classify(&envelope.error.message)),
            Err(_) => Err(IdentityError::Network(format!("identity provider returned {status}"))),
        }
    }
}

impl IdentityProvider for IdentityToolkitProvider {
    async fn sign_in(&self, email: &Email, password: &str) -> Result<Identity, IdentityError> {
        let identity = self.request_sign_in(email, password).await?;
        tracing::debug!(uid = %identity.uid, "Identity provider accepted credentials");
        self.broadcast.lock().publish(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        self.broadcast.lock().publish(None);
        Ok(())
    }

    fn subscribe(&self) -> IdentityReceiver {
        self.broadcast.lock().subscribe(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode, routing::post};
    use serde_json::{Value, json};

    #[test]
    fn test_classify() {
        for code in CREDENTIAL_ERRORS {
            assert_eq!(classify(code), IdentityError::InvalidCredentials);
        }
        assert_eq!(
            classify("INVALID_LOGIN_CREDENTIALS : extra detail"),
            IdentityError::InvalidCredentials
        );
        assert!(matches!(
            classify("TOO_MANY_ATTEMPTS_TRY_LATER : Access disabled"),
            IdentityError::Network(_)
        ));
    }

    #[test]
    fn test_sign_in_url() {
        let config = IdentityToolkitConfig::new("k y").with_endpoint("http://localhost:9099/v1/");
        assert_eq!(
            config.sign_in_url(),
            "http://localhost:9099/v1/accounts:signInWithPassword?key=k%20y"
        );
    }

    #[test]
    fn test_debug_hides_key() {
        let debug = format!("{:?}", IdentityToolkitConfig::new("secret-key"));
        assert!(!debug.contains("secret-key"));
    }

    async fn stub_endpoint(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        if body["password"] == "right" {
            (
                StatusCode::OK,
                Json(json!({ "localId": "uid-42", "email": body["email"], "idToken": "t" })),
            )
        } else {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": { "code": 400, "message": "INVALID_LOGIN_CREDENTIALS" } })),
            )
        }
    }

    async fn provider() -> IdentityToolkitProvider {
        let app = Router::new().route("/v1/accounts:signInWithPassword", post(stub_endpoint));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = IdentityToolkitConfig::new("test-key").with_endpoint(format!("http://{addr}/v1"));
        IdentityToolkitProvider::new(config.http_client().unwrap(), Arc::new(config))
    }

    #[tokio::test]
    async fn test_sign_in_round_trip() {
        let provider = provider().await;
        let mut rx = provider.subscribe();
        assert_eq!(rx.recv().await, Some(None));

        let email = Email::new("alms@example.org").unwrap();
        let identity = provider.sign_in(&email, "right").await.unwrap();
        assert_eq!(identity.uid, "uid-42");
        assert_eq!(identity.email(), Some("alms@example.org"));
        assert_eq!(rx.recv().await, Some(Some(identity)));

        let err = provider.sign_in(&email, "wrong").await.unwrap_err();
        assert_eq!(err, IdentityError::InvalidCredentials);

        provider.sign_out().await.unwrap();
        assert_eq!(rx.recv().await, Some(None));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let config = IdentityToolkitConfig::new("k").with_endpoint("http://127.0.0.1:1/v1");
        let provider = IdentityToolkitProvider::new(config.http_client().unwrap(), Arc::new(config));
        let email = Email::new("alms@example.org").unwrap();
        let err = provider.sign_in(&email, "pw").await.unwrap_err();
        assert!(matches!(err, IdentityError::Network(_)));
    }
}
