//! Credential acquisition, one handshake per service
//!
//! Each `acquire_*` call performs the service's own login or issuance
//! contract and stores the result, replacing any earlier credential.

use super::{StoredCredential, TokenManager};
use crate::config::Service;
use crate::error::{ProbeError, Result};
use crate::http::{cookie_header, ensure_success, response_cookies, string_field};
use reqwest::header;
use serde_json::{json, Value};
use tracing::{info, warn};

const GRAFANA_SESSION_COOKIE: &str = "grafana_session";
const OPEN_WEBUI_TOKEN_COOKIE: &str = "token";
const MASTODON_SCOPES: &str = "read write";
const OOB_REDIRECT: &str = "urn:ietf:wg:oauth:2.0:oob";

/// A Grafana service account created during this run, with the login
/// session that created it.
pub(crate) struct GrafanaAccount {
    id: String,
    cookie: String,
}

fn probe_label(kind: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("stack-probe-{}-{}", kind, &id[..8])
}

fn required(value: &Option<String>, variable: &str) -> Result<String> {
    value
        .clone()
        .ok_or_else(|| ProbeError::Configuration(format!("{} is not set", variable)))
}

impl TokenManager {
    /// Log in to Grafana, create a service account and issue a token for it.
    pub async fn acquire_grafana_token(&self, username: &str, password: &str) -> Result<String> {
        let base = self.endpoints.url(Service::Grafana).to_string();

        let login = self
            .client
            .post(format!("{}/login", base))
            .json(&json!({"user": username, "password": password}))
            .send()
            .await?;
        let login = ensure_success(login).await?;
        let session: Vec<(String, String)> = response_cookies(&login)
            .into_iter()
            .filter(|(name, _)| name == GRAFANA_SESSION_COOKIE)
            .collect();
        if session.is_empty() {
            return Err(ProbeError::Token("Grafana login did not set a session cookie".to_string()));
        }
        let cookie = cookie_header(&session);

        let account: Value = ensure_success(
            self.client
                .post(format!("{}/api/serviceaccounts", base))
                .header(header::COOKIE, &cookie)
                .json(&json!({"name": probe_label("sa"), "role": "Admin", "isDisabled": false}))
                .send()
                .await?,
        )
        .await?
        .json()
        .await?;
        let account_id = string_field(&account, "id")?;
        let replaced = self
            .grafana_account
            .lock()
            .await
            .replace(GrafanaAccount { id: account_id.clone(), cookie: cookie.clone() });
        if let Some(previous) = replaced {
            if let Err(e) = self.delete_grafana_account(&previous).await {
                warn!("Could not delete Grafana service account {}: {}", previous.id, e);
            }
        }

        let issued: Value = ensure_success(
            self.client
                .post(format!("{}/api/serviceaccounts/{}/tokens", base, account_id))
                .header(header::COOKIE, &cookie)
                .json(&json!({"name": probe_label("token")}))
                .send()
                .await?,
        )
        .await?
        .json()
        .await?;
        let token = string_field(&issued, "key")?;

        self.store_credential(Service::Grafana, StoredCredential::Token(token.clone())).await?;
        info!("Acquired Grafana service account token");
        Ok(token)
    }

    async fn delete_grafana_account(&self, account: &GrafanaAccount) -> Result<()> {
        let url = self
            .endpoints
            .service_url(Service::Grafana, &format!("/api/serviceaccounts/{}", account.id));
        ensure_success(self.client.delete(url).header(header::COOKIE, &account.cookie).send().await?).await?;
        info!("Deleted Grafana service account {}", account.id);
        Ok(())
    }

    /// Delete accounts created on backing services during this run. Failures
    /// come back as warnings.
    pub async fn release_provisioned(&self) -> Vec<String> {
        let Some(account) = self.grafana_account.lock().await.take() else {
            return Vec::new();
        };
        match self.delete_grafana_account(&account).await {
            Ok(()) => Vec::new(),
            Err(e) => vec![format!("Grafana service account {} not deleted: {}", account.id, e)],
        }
    }

    /// Long-lived access token provisioned out of band.
    pub async fn acquire_homeassistant_token(&self) -> Result<String> {
        let token = required(&self.endpoints.credentials.homeassistant_token, "HOMEASSISTANT_TOKEN")?;
        self.store_credential(Service::HomeAssistant, StoredCredential::Token(token.clone())).await?;
        Ok(token)
    }

    pub async fn acquire_qdrant_key(&self) -> Result<String> {
        let key = required(&self.endpoints.credentials.qdrant_api_key, "QDRANT_API_KEY")?;
        self.store_credential(Service::Qdrant, StoredCredential::Token(key.clone())).await?;
        Ok(key)
    }

    pub async fn acquire_bookstack_token(&self) -> Result<(String, String)> {
        let creds = &self.endpoints.credentials;
        let id = required(&creds.bookstack_token_id, "BOOKSTACK_TOKEN_ID")?;
        let secret = required(&creds.bookstack_token_secret, "BOOKSTACK_TOKEN_SECRET")?;
        self.store_credential(
            Service::BookStack,
            StoredCredential::TokenPair { id: id.clone(), secret: secret.clone() },
        )
        .await?;
        Ok((id, secret))
    }

    /// Register an OAuth application, then use the password grant with it.
    pub async fn acquire_mastodon_token(&self, username: &str, password: &str) -> Result<String> {
        let base = self.endpoints.url(Service::Mastodon).to_string();

        let app: Value = ensure_success(
            self.client
                .post(format!("{}/api/v1/apps", base))
                .form(&[
                    ("client_name", "stack-probe"),
                    ("redirect_uris", OOB_REDIRECT),
                    ("scopes", MASTODON_SCOPES),
                ])
                .send()
                .await?,
        )
        .await?
        .json()
        .await?;
        let client_id = string_field(&app, "client_id")?;
        let client_secret = string_field(&app, "client_secret")?;

        let grant: Value = ensure_success(
            self.client
                .post(format!("{}/oauth/token", base))
                .form(&[
                    ("grant_type", "password"),
                    ("client_id", client_id.as_str()),
                    ("client_secret", client_secret.as_str()),
                    ("username", username),
                    ("password", password),
                    ("scope", MASTODON_SCOPES),
                ])
                .send()
                .await?,
        )
        .await?
        .json()
        .await?;
        let token = string_field(&grant, "access_token")?;

        self.store_credential(Service::Mastodon, StoredCredential::Token(token.clone())).await?;
        info!("Acquired Mastodon access token");
        Ok(token)
    }

    /// Issue a personal access token using basic authentication.
    pub async fn acquire_forgejo_token(&self, username: &str, password: &str) -> Result<String> {
        let url = format!(
            "{}/api/v1/users/{}/tokens",
            self.endpoints.url(Service::Forgejo),
            urlencoding::encode(username)
        );
        let issued: Value = ensure_success(
            self.client
                .post(url)
                .basic_auth(username, Some(password))
                .json(&json!({"name": probe_label("pat"), "scopes": ["all"]}))
                .send()
                .await?,
        )
        .await?
        .json()
        .await?;
        let token = string_field(&issued, "sha1")?;

        self.store_credential(Service::Forgejo, StoredCredential::Token(token.clone())).await?;
        Ok(token)
    }

    pub async fn acquire_seafile_token(&self, username: &str, password: &str) -> Result<String> {
        let issued: Value = ensure_success(
            self.client
                .post(self.endpoints.service_url(Service::Seafile, "/api2/auth-token/"))
                .form(&[("username", username), ("password", password)])
                .send()
                .await?,
        )
        .await?
        .json()
        .await?;
        let token = string_field(&issued, "token")?;

        self.store_credential(Service::Seafile, StoredCredential::Token(token.clone())).await?;
        Ok(token)
    }

    /// Sign in and keep every cookie set by the response. When the token is
    /// only returned in the body it is stored as the `token` cookie.
    pub async fn acquire_open_webui_session(&self, email: &str, password: &str) -> Result<Vec<(String, String)>> {
        let response = ensure_success(
            self.client
                .post(self.endpoints.service_url(Service::OpenWebUi, "/api/v1/auths/signin"))
                .json(&json!({"email": email, "password": password}))
                .send()
                .await?,
        )
        .await?;

        let mut cookies = response_cookies(&response);
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !cookies.iter().any(|(name, _)| name == OPEN_WEBUI_TOKEN_COOKIE) {
            if let Ok(token) = string_field(&body, "token") {
                cookies.push((OPEN_WEBUI_TOKEN_COOKIE.to_string(), token));
            }
        }
        if cookies.is_empty() {
            return Err(ProbeError::Token("Open WebUI sign-in returned no session".to_string()));
        }

        self.store_credential(Service::OpenWebUi, StoredCredential::Cookies(cookies.clone())).await?;
        Ok(cookies)
    }

    /// Acquire a credential for `service` using the configured stack
    /// administrator where the scheme needs a login.
    pub async fn acquire(&self, service: Service) -> Result<()> {
        let creds = &self.endpoints.credentials;
        let admin = || -> Result<(String, String)> {
            Ok((
                required(&creds.admin_user, "STACK_ADMIN_USER")?,
                required(&creds.admin_password, "STACK_ADMIN_PASSWORD")?,
            ))
        };

        match service {
            Service::Grafana => {
                let (user, password) = admin()?;
                self.acquire_grafana_token(&user, &password).await?;
            }
            Service::HomeAssistant => {
                self.acquire_homeassistant_token().await?;
            }
            Service::Qdrant => {
                self.acquire_qdrant_key().await?;
            }
            Service::BookStack => {
                self.acquire_bookstack_token().await?;
            }
            Service::Mastodon => {
                let (user, password) = admin()?;
                self.acquire_mastodon_token(&user, &password).await?;
            }
            Service::Forgejo => {
                let (user, password) = admin()?;
                self.acquire_forgejo_token(&user, &password).await?;
            }
            Service::Seafile => {
                let (user, password) = admin()?;
                self.acquire_seafile_token(&user, &password).await?;
            }
            Service::OpenWebUi => {
                let (user, password) = admin()?;
                self.acquire_open_webui_session(&user, &password).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ServiceEndpoints, Topology};
    use std::sync::Arc;
    use wiremock::matchers::{body_string_contains, header, method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn manager_with(configure: impl FnOnce(&mut ServiceEndpoints)) -> TokenManager {
        let mut endpoints = ServiceEndpoints::for_topology(Topology::HostMapped);
        configure(&mut endpoints);
        let endpoints = Arc::new(endpoints);
        TokenManager::new(endpoints.http_client().unwrap(), endpoints)
    }

    #[tokio::test]
    async fn test_grafana_service_account_flow() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(
                ResponseTemplate::new(200)
                    .append_header("Set-Cookie", "grafana_session=gs-1; Path=/")
                    .set_body_json(json!({"message": "Logged in"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/serviceaccounts"))
            .and(header("cookie", "grafana_session=gs-1"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 7})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/serviceaccounts/7/tokens"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"key": "glsa_xyz"})))
            .mount(&server)
            .await;

        let uri = server.uri();
        let tokens = manager_with(|e| {
            e.services.insert(Service::Grafana, uri);
        });

        assert_eq!(tokens.acquire_grafana_token("admin", "pw").await.unwrap(), "glsa_xyz");
        assert_eq!(tokens.credential(Service::Grafana).await, Some(StoredCredential::Token("glsa_xyz".into())));
    }

    #[tokio::test]
    async fn test_grafana_service_accounts_are_deleted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).append_header("Set-Cookie", "grafana_session=gs-2; Path=/"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/serviceaccounts"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 11})))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/serviceaccounts"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 12})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/api/serviceaccounts/\d+/tokens$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"key": "glsa_rotating"})))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/serviceaccounts/11"))
            .and(header("cookie", "grafana_session=gs-2"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/serviceaccounts/12"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let uri = server.uri();
        let tokens = manager_with(|e| {
            e.services.insert(Service::Grafana, uri);
        });

        tokens.acquire_grafana_token("admin", "pw").await.unwrap();
        tokens.acquire_grafana_token("admin", "pw").await.unwrap();
        assert!(tokens.release_provisioned().await.is_empty());
        assert!(tokens.release_provisioned().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_account_deletion_is_a_warning() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/serviceaccounts/5"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let uri = server.uri();
        let tokens = manager_with(|e| {
            e.services.insert(Service::Grafana, uri);
        });
        *tokens.grafana_account.lock().await =
            Some(GrafanaAccount { id: "5".to_string(), cookie: "grafana_session=old".to_string() });

        let warnings = tokens.release_provisioned().await;
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("Grafana service account 5"), "{}", warnings[0]);
    }

    #[tokio::test]
    async fn test_mastodon_registers_app_then_uses_password_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/apps"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"client_id": "cid", "client_secret": "cs"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=password"))
            .and(body_string_contains("client_id=cid"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "mt"})))
            .mount(&server)
            .await;

        let uri = server.uri();
        let tokens = manager_with(|e| {
            e.services.insert(Service::Mastodon, uri);
        });
        assert_eq!(tokens.acquire_mastodon_token("admin@stack.local", "pw").await.unwrap(), "mt");
        assert!(tokens.has_token(Service::Mastodon).await);
    }

    #[tokio::test]
    async fn test_forgejo_token_uses_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/users/admin/tokens"))
            .and(header("authorization", "Basic YWRtaW46cHc="))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"sha1": "f00d"})))
            .mount(&server)
            .await;

        let uri = server.uri();
        let tokens = manager_with(|e| {
            e.services.insert(Service::Forgejo, uri);
        });
        assert_eq!(tokens.acquire_forgejo_token("admin", "pw").await.unwrap(), "f00d");
    }

    #[tokio::test]
    async fn test_open_webui_falls_back_to_body_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auths/signin"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "jwt-1"})))
            .mount(&server)
            .await;

        let uri = server.uri();
        let tokens = manager_with(|e| {
            e.services.insert(Service::OpenWebUi, uri);
        });
        let cookies = tokens.acquire_open_webui_session("admin@stack.local", "pw").await.unwrap();
        assert_eq!(cookies, vec![("token".to_string(), "jwt-1".to_string())]);
    }

    #[tokio::test]
    async fn test_seafile_rejection_is_an_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api2/auth-token/"))
            .respond_with(ResponseTemplate::new(400).set_body_string("Unable to login"))
            .mount(&server)
            .await;

        let uri = server.uri();
        let tokens = manager_with(|e| {
            e.services.insert(Service::Seafile, uri);
        });
        let err = tokens.acquire_seafile_token("admin", "wrong").await.unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert!(!tokens.has_token(Service::Seafile).await);
    }

    #[tokio::test]
    async fn test_preprovisioned_credentials_come_from_configuration() {
        let tokens = manager_with(|e| {
            e.credentials.bookstack_token_id = Some("tid".into());
            e.credentials.bookstack_token_secret = Some("ts".into());
        });

        tokens.acquire(Service::BookStack).await.unwrap();
        assert!(tokens.has_token(Service::BookStack).await);

        let err = tokens.acquire(Service::Qdrant).await.unwrap_err();
        assert!(matches!(err, ProbeError::Configuration(ref m) if m.contains("QDRANT_API_KEY")));
        let err = tokens.acquire(Service::Grafana).await.unwrap_err();
        assert!(matches!(err, ProbeError::Configuration(ref m) if m.contains("STACK_ADMIN_USER")));
    }
}
