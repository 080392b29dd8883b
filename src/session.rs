//! First-factor sessions against the SSO portal
//!
//! One helper owns at most one session and at most one ephemeral identity at
//! a time. Requests made through the helper carry the session cookie when one
//! is stored and are sent unauthenticated otherwise.

use crate::config::ServiceEndpoints;
use crate::error::{ProbeError, Result, WithWarnings};
use crate::http::{ensure_success, response_cookies};
use crate::identity::{validate_credentials, EphemeralIdentity, IdentityHelper};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Cookie issued by a successful first-factor login.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub username: String,
    pub cookie_name: String,
    pub cookie_value: String,
}

impl Session {
    pub fn cookie_header(&self) -> String {
        format!("{}={}", self.cookie_name, self.cookie_value)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("username", &self.username)
            .field("cookie_name", &self.cookie_name)
            .finish_non_exhaustive()
    }
}

pub struct SessionHelper {
    client: Client,
    endpoints: Arc<ServiceEndpoints>,
    identity: IdentityHelper,
    session: RwLock<Option<Session>>,
    ephemeral: Mutex<Option<EphemeralIdentity>>,
}

impl SessionHelper {
    pub fn new(client: Client, endpoints: Arc<ServiceEndpoints>, identity: IdentityHelper) -> Self {
        Self {
            client,
            endpoints,
            identity,
            session: RwLock::new(None),
            ephemeral: Mutex::new(None),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn endpoints(&self) -> &ServiceEndpoints {
        &self.endpoints
    }

    pub fn identity(&self) -> &IdentityHelper {
        &self.identity
    }

    pub async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    pub async fn session_cookie(&self) -> Option<String> {
        self.session.read().await.as_ref().map(|s| s.cookie_value.clone())
    }

    /// The identity created by [`SessionHelper::login_with_ephemeral_user`], if still alive.
    pub async fn ephemeral_identity(&self) -> Option<EphemeralIdentity> {
        self.ephemeral.lock().await.clone()
    }

    /// Authenticate against the first-factor endpoint and store the session
    /// cookie. Credentials are checked locally before anything is sent.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session> {
        validate_credentials(username, password)?;

        let url = self.endpoints.sso("/api/firstfactor");
        debug!("POST {} as {}", url, username);
        let response = self
            .client
            .post(&url)
            .json(&json!({
                "username": username,
                "password": password,
                "keepMeLoggedIn": false,
            }))
            .send()
            .await?;

        let status = response.status();
        match status {
            StatusCode::OK => {
                let cookie_name = &self.endpoints.session_cookie_name;
                let cookie_value = response_cookies(&response)
                    .into_iter()
                    .find(|(name, _)| name == cookie_name)
                    .map(|(_, value)| value)
                    .ok_or_else(|| {
                        ProbeError::Token(format!("login response did not set '{}'", cookie_name))
                    })?;

                let session = Session {
                    username: username.to_string(),
                    cookie_name: cookie_name.clone(),
                    cookie_value,
                };
                *self.session.write().await = Some(session.clone());
                info!("Logged in as {}", username);
                Ok(session)
            }
            StatusCode::UNAUTHORIZED => {
                let body = response.text().await.unwrap_or_default();
                Err(ProbeError::InvalidCredentials(body))
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(ProbeError::http(status.as_u16(), body))
            }
        }
    }

    /// Create a throwaway account in `groups` and log in as it. Any identity
    /// left over from an earlier call is cleaned up first.
    pub async fn login_with_ephemeral_user(
        &self,
        groups: &[&str],
    ) -> Result<WithWarnings<EphemeralIdentity>> {
        let mut warnings = self.cleanup_ephemeral_user().await;

        let created = self.identity.create_identity(groups).await?;
        warnings.extend(created.warnings);
        let identity = created.value;
        *self.ephemeral.lock().await = Some(identity.clone());

        self.login(&identity.username, &identity.password).await?;
        Ok(WithWarnings { value: identity, warnings })
    }

    /// Delete the stored ephemeral identity, if any, and drop the session.
    /// Never fails; problems come back as warnings.
    pub async fn cleanup_ephemeral_user(&self) -> Vec<String> {
        let identity = self.ephemeral.lock().await.take();
        *self.session.write().await = None;

        let Some(identity) = identity else {
            return Vec::new();
        };

        match self.identity.delete_identity(&identity.username).await {
            Ok(outcome) => outcome.warnings,
            Err(e) => {
                warn!("Cleanup of {} failed: {}", identity.username, e);
                vec![format!("identity '{}' not deleted: {}", identity.username, e)]
            }
        }
    }

    /// End the session on the portal. The local session is cleared even when
    /// the portal rejects the call.
    pub async fn logout(&self) -> Result<()> {
        let request = self.authenticated_request(Method::POST, &self.endpoints.sso("/api/logout")).await;
        *self.session.write().await = None;
        ensure_success(request.send().await?).await?;
        Ok(())
    }

    /// A request builder carrying the session cookie when one is stored.
    pub async fn authenticated_request(&self, method: Method, url: &str) -> RequestBuilder {
        let request = self.client.request(method, url);
        match self.session.read().await.as_ref() {
            Some(session) => request.header(reqwest::header::COOKIE, session.cookie_header()),
            None => request,
        }
    }

    pub async fn authenticated_get(&self, url: &str) -> Result<Response> {
        Ok(self.authenticated_request(Method::GET, url).await.send().await?)
    }

    pub async fn authenticated_post<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<Response> {
        Ok(self.authenticated_request(Method::POST, url).await.json(body).send().await?)
    }

    /// Whether the portal still accepts the stored session. Transport errors
    /// count as `false`.
    pub async fn verify_auth(&self) -> bool {
        let request = self
            .authenticated_request(Method::GET, &self.endpoints.sso("/api/verify"))
            .await
            .header("X-Original-URL", self.endpoints.sso("/"));

        match request.send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Session verification failed: {}", e);
                false
            }
        }
    }
}
