//! Account identity for the user partition of cloud sync.
//!
//! The strategy is picked once at startup: the Identity Toolkit REST API when
//! cloud credentials are configured, or an in-process simulated account
//! otherwise. Either way the signed-in user survives restarts through the
//! `auth_session` key of the local store.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::clock::Clock;
use crate::config::{AuthMode, CloudConfig};
use crate::store::{keys, read_json, KvStore};

use super::CloudError;

const IDENTITY_BASE: &str = "https://identitytoolkit.googleapis.com/v1";
const SECURE_TOKEN_BASE: &str = "https://securetoken.googleapis.com/v1";

/// Tokens this close to expiry are renewed before use.
const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
  pub uid: String,
  pub email: String,
  #[serde(default)]
  pub display_name: Option<String>,
  #[serde(default)]
  pub id_token: Option<String>,
  #[serde(default)]
  pub refresh_token: Option<String>,
  #[serde(default)]
  pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize)]
struct StoredSession {
  provider: String,
  user: AuthUser,
}

/// The signed-in user, mirrored to the local store.
struct Session {
  store: Arc<dyn KvStore>,
  provider: &'static str,
  user: Mutex<Option<AuthUser>>,
}

impl Session {
  /// Restore the persisted user if it was created by the same provider.
  fn restore(store: Arc<dyn KvStore>, provider: &'static str) -> Self {
    let user = match read_json::<StoredSession>(store.as_ref(), keys::AUTH_SESSION) {
      Ok(Some(stored)) if stored.provider == provider => Some(stored.user),
      Ok(Some(stored)) => {
        tracing::info!(
          stored = %stored.provider,
          active = provider,
          "ignoring session from another auth provider"
        );
        None
      }
      Ok(None) => None,
      Err(e) => {
        tracing::warn!(error = %e, "failed to restore auth session");
        None
      }
    };

    Self {
      store,
      provider,
      user: Mutex::new(user),
    }
  }

  fn current(&self) -> Option<AuthUser> {
    self
      .user
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  fn set(&self, user: Option<AuthUser>) {
    let result = match &user {
      Some(user) => {
        let stored = StoredSession {
          provider: self.provider.to_string(),
          user: user.clone(),
        };
        serde_json::to_string(&stored)
          .map_err(color_eyre::Report::from)
          .and_then(|encoded| self.store.set(keys::AUTH_SESSION, &encoded))
      }
      None => self.store.remove(keys::AUTH_SESSION),
    };
    if let Err(e) = result {
      tracing::warn!(error = %e, "failed to persist auth session");
    }

    *self.user.lock().unwrap_or_else(PoisonError::into_inner) = user;
  }
}

/// Client for the Identity Toolkit and Secure Token REST endpoints.
pub struct IdentityToolkitAuth {
  http: reqwest::Client,
  api_key: String,
  identity_base: String,
  token_base: String,
  clock: Arc<dyn Clock>,
  session: Session,
}

/// Account fields returned by sign-in and sign-up.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
  local_id: String,
  #[serde(default)]
  email: Option<String>,
  #[serde(default)]
  display_name: Option<String>,
  id_token: String,
  refresh_token: String,
  expires_in: String,
}

#[derive(Deserialize)]
struct RefreshResponse {
  id_token: String,
  refresh_token: String,
  expires_in: String,
}

impl IdentityToolkitAuth {
  pub fn new(
    config: &CloudConfig,
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
  ) -> Result<Self, CloudError> {
    Self::with_endpoints(
      &config.api_key,
      IDENTITY_BASE,
      SECURE_TOKEN_BASE,
      store,
      clock,
      timeout,
    )
  }

  pub fn with_endpoints(
    api_key: &str,
    identity_base: &str,
    token_base: &str,
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
  ) -> Result<Self, CloudError> {
    let http = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| CloudError::Network(format!("Failed to build HTTP client: {}", e)))?;

    Ok(Self {
      http,
      api_key: api_key.to_string(),
      identity_base: identity_base.trim_end_matches('/').to_string(),
      token_base: token_base.trim_end_matches('/').to_string(),
      clock,
      session: Session::restore(store, "real"),
    })
  }

  pub fn current_user(&self) -> Option<AuthUser> {
    self.session.current()
  }

  pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, CloudError> {
    self.account_request("accounts:signInWithPassword", email, password).await
  }

  pub async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, CloudError> {
    self.account_request("accounts:signUp", email, password).await
  }

  pub fn sign_out(&self) {
    self.session.set(None);
  }

  pub async fn send_password_reset(&self, email: &str) -> Result<(), CloudError> {
    let body = json!({ "requestType": "PASSWORD_RESET", "email": email });
    let url = format!("{}/accounts:sendOobCode", self.identity_base);
    self.post(&url, &body).await?;
    Ok(())
  }

  /// A usable ID token for the signed-in user, renewed when near expiry.
  pub async fn id_token(&self) -> Result<Option<String>, CloudError> {
    let Some(user) = self.session.current() else {
      return Ok(None);
    };

    let fresh = user
      .expires_at
      .map(|at| at - ChronoDuration::seconds(REFRESH_MARGIN_SECS) > self.clock.now())
      .unwrap_or(false);
    if fresh {
      return Ok(user.id_token);
    }

    let Some(refresh_token) = user.refresh_token.clone() else {
      return Ok(user.id_token);
    };

    tracing::debug!(uid = %user.uid, "refreshing ID token");
    let url = format!("{}/token", self.token_base);
    let body = json!({ "grant_type": "refresh_token", "refresh_token": refresh_token });
    let refreshed: RefreshResponse = serde_json::from_value(self.post(&url, &body).await?)
      .map_err(|e| CloudError::Parse(format!("Invalid token response: {}", e)))?;

    let renewed = AuthUser {
      expires_at: Some(self.expiry(&refreshed.expires_in)),
      id_token: Some(refreshed.id_token),
      refresh_token: Some(refreshed.refresh_token),
      ..user
    };
    let token = renewed.id_token.clone();
    self.session.set(Some(renewed));
    Ok(token)
  }

  async fn account_request(
    &self,
    endpoint: &str,
    email: &str,
    password: &str,
  ) -> Result<AuthUser, CloudError> {
    let body = json!({ "email": email, "password": password, "returnSecureToken": true });
    let url = format!("{}/{}", self.identity_base, endpoint);

    let account: AccountResponse = serde_json::from_value(self.post(&url, &body).await?)
      .map_err(|e| CloudError::Parse(format!("Invalid account response: {}", e)))?;

    let user = AuthUser {
      uid: account.local_id,
      email: account.email.unwrap_or_else(|| email.to_string()),
      display_name: account.display_name.filter(|n| !n.is_empty()),
      id_token: Some(account.id_token),
      refresh_token: Some(account.refresh_token),
      expires_at: Some(self.expiry(&account.expires_in)),
    };
    tracing::info!(uid = %user.uid, "signed in");
    self.session.set(Some(user.clone()));
    Ok(user)
  }

  async fn post(&self, url: &str, body: &Value) -> Result<Value, CloudError> {
    let response = self
      .http
      .post(url)
      .query(&[("key", self.api_key.as_str())])
      .json(body)
      .send()
      .await?;

    let status = response.status();
    let payload: Value = response.json().await.unwrap_or(Value::Null);
    if status.is_success() {
      return Ok(payload);
    }

    // The identity service reports failures as {"error": {"message": "EMAIL_NOT_FOUND"}}
    match payload["error"]["message"].as_str() {
      Some(message) if status.is_client_error() => Err(CloudError::Auth(message.to_string())),
      message => Err(CloudError::Http {
        status: status.as_u16(),
        message: message.unwrap_or("no details").to_string(),
      }),
    }
  }

  fn expiry(&self, expires_in: &str) -> DateTime<Utc> {
    let secs = expires_in.parse::<i64>().unwrap_or(3600);
    self.clock.now() + ChronoDuration::seconds(secs)
  }
}

/// Local stand-in for an identity service, used when the cloud is not configured.
pub struct SimulatedAuth {
  session: Session,
}

impl SimulatedAuth {
  pub fn new(store: Arc<dyn KvStore>) -> Self {
    Self {
      session: Session::restore(store, "simulated"),
    }
  }

  pub fn current_user(&self) -> Option<AuthUser> {
    self.session.current()
  }

  /// Accept any well-formed credentials and mint a fresh user.
  pub fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, CloudError> {
    if !email.contains('@') {
      return Err(CloudError::Auth("INVALID_EMAIL".to_string()));
    }
    if password.is_empty() {
      return Err(CloudError::Auth("MISSING_PASSWORD".to_string()));
    }

    let user = AuthUser {
      uid: format!("sim_{}", uuid::Uuid::new_v4().simple()),
      email: email.to_string(),
      display_name: email.split('@').next().map(String::from),
      id_token: None,
      refresh_token: None,
      expires_at: None,
    };
    tracing::info!(uid = %user.uid, "signed in with simulated account");
    self.session.set(Some(user.clone()));
    Ok(user)
  }

  pub fn sign_out(&self) {
    self.session.set(None);
  }
}

/// The identity strategy chosen at startup.
pub enum Auth {
  Real(IdentityToolkitAuth),
  Simulated(SimulatedAuth),
}

impl Auth {
  /// Pick the strategy from the configured mode and what the environment offers.
  pub fn select(
    mode: AuthMode,
    cloud: Option<&CloudConfig>,
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
  ) -> Self {
    let cloud = match (mode, cloud) {
      (AuthMode::Simulated, _) => None,
      (AuthMode::Real, None) => {
        tracing::warn!("real auth requested without cloud configuration, using simulated auth");
        None
      }
      (_, cloud) => cloud,
    };

    match cloud {
      Some(config) => match IdentityToolkitAuth::new(config, store.clone(), clock, timeout) {
        Ok(real) => Self::Real(real),
        Err(e) => {
          tracing::warn!(error = %e, "identity client unavailable, using simulated auth");
          Self::Simulated(SimulatedAuth::new(store))
        }
      },
      None => Self::Simulated(SimulatedAuth::new(store)),
    }
  }

  pub fn is_simulated(&self) -> bool {
    matches!(self, Self::Simulated(_))
  }

  pub fn current_user(&self) -> Option<AuthUser> {
    match self {
      Self::Real(auth) => auth.current_user(),
      Self::Simulated(auth) => auth.current_user(),
    }
  }

  /// Bearer token for cloud requests, if any.
  ///
  /// A failed renewal is logged and the request goes out unauthenticated.
  pub async fn id_token(&self) -> Option<String> {
    match self {
      Self::Real(auth) => match auth.id_token().await {
        Ok(token) => token,
        Err(e) => {
          tracing::warn!(error = %e, "failed to renew ID token");
          None
        }
      },
      Self::Simulated(_) => None,
    }
  }

  pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, CloudError> {
    match self {
      Self::Real(auth) => auth.sign_in(email, password).await,
      Self::Simulated(auth) => auth.sign_in(email, password),
    }
  }

  pub async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, CloudError> {
    match self {
      Self::Real(auth) => auth.sign_up(email, password).await,
      // Simulated accounts have nothing to register
      Self::Simulated(auth) => auth.sign_in(email, password),
    }
  }

  pub fn sign_out(&self) {
    match self {
      Self::Real(auth) => auth.sign_out(),
      Self::Simulated(auth) => auth.sign_out(),
    }
  }

  pub async fn send_password_reset(&self, email: &str) -> Result<(), CloudError> {
    match self {
      Self::Real(auth) => auth.send_password_reset(email).await,
      Self::Simulated(_) => {
        tracing::info!(%email, "simulated password reset requested");
        Ok(())
      }
    }
  }
}
