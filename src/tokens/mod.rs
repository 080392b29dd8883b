//! Per-service credential store
//!
//! Backing services disagree on how clients authenticate. The manager keeps
//! one credential per [`Service`] and attaches it according to that service's
//! [`AuthScheme`]. A service without a stored credential is not an error: its
//! requests simply go out unauthenticated.

pub mod acquire;
pub mod scheme;

use crate::config::{Service, ServiceEndpoints};
use crate::error::{ProbeError, Result};
use crate::http::cookie_header;
use reqwest::{header, Client, Method, RequestBuilder, Response};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

pub use scheme::AuthScheme;

#[derive(Clone, PartialEq, Eq)]
pub enum StoredCredential {
    Token(String),
    TokenPair { id: String, secret: String },
    Cookies(Vec<(String, String)>),
}

impl StoredCredential {
    fn fits(&self, scheme: AuthScheme) -> bool {
        matches!(
            (self, scheme),
            (StoredCredential::Token(_), AuthScheme::BearerToken { .. })
                | (StoredCredential::TokenPair { .. }, AuthScheme::TokenPair { .. })
                | (StoredCredential::Cookies(_), AuthScheme::CookieSession)
        )
    }

    fn kind(&self) -> &'static str {
        match self {
            StoredCredential::Token(_) => "token",
            StoredCredential::TokenPair { .. } => "token pair",
            StoredCredential::Cookies(_) => "cookie session",
        }
    }
}

impl std::fmt::Debug for StoredCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoredCredential::Token(_) => f.write_str("Token(<redacted>)"),
            StoredCredential::TokenPair { id, .. } => {
                f.debug_struct("TokenPair").field("id", id).finish_non_exhaustive()
            }
            StoredCredential::Cookies(cookies) => {
                let names: Vec<&str> = cookies.iter().map(|(n, _)| n.as_str()).collect();
                f.debug_tuple("Cookies").field(&names).finish()
            }
        }
    }
}

pub struct TokenManager {
    client: Client,
    endpoints: Arc<ServiceEndpoints>,
    store: RwLock<HashMap<Service, StoredCredential>>,
    grafana_account: Mutex<Option<acquire::GrafanaAccount>>,
}

impl TokenManager {
    pub fn new(client: Client, endpoints: Arc<ServiceEndpoints>) -> Self {
        Self {
            client,
            endpoints,
            store: RwLock::new(HashMap::new()),
            grafana_account: Mutex::new(None),
        }
    }

    pub fn endpoints(&self) -> &ServiceEndpoints {
        &self.endpoints
    }

    /// Store or replace the credential for `service`. The credential must match
    /// the service's scheme.
    pub async fn store_credential(&self, service: Service, credential: StoredCredential) -> Result<()> {
        let scheme = service.auth_scheme();
        if !credential.fits(scheme) {
            return Err(ProbeError::Token(format!(
                "{} uses {} authentication, got a {}",
                service,
                scheme.label(),
                credential.kind()
            )));
        }
        debug!("Stored {} credential for {}", credential.kind(), service);
        self.store.write().await.insert(service, credential);
        Ok(())
    }

    pub async fn credential(&self, service: Service) -> Option<StoredCredential> {
        self.store.read().await.get(&service).cloned()
    }

    pub async fn has_token(&self, service: Service) -> bool {
        self.store.read().await.contains_key(&service)
    }

    /// Returns whether a credential was removed.
    pub async fn clear_token(&self, service: Service) -> bool {
        self.store.write().await.remove(&service).is_some()
    }

    pub async fn clear_all(&self) {
        self.store.write().await.clear();
    }

    pub async fn stored_services(&self) -> Vec<Service> {
        let mut services: Vec<Service> = self.store.read().await.keys().copied().collect();
        services.sort();
        services
    }

    /// Attach the stored credential for `service`, if any.
    pub async fn authorize(&self, service: Service, request: RequestBuilder) -> RequestBuilder {
        let store = self.store.read().await;
        let Some(credential) = store.get(&service) else {
            return request;
        };

        match (service.auth_scheme(), credential) {
            (AuthScheme::BearerToken { header, prefix }, StoredCredential::Token(token)) => {
                request.header(header, format!("{}{}", prefix, token))
            }
            (AuthScheme::TokenPair { header, prefix }, StoredCredential::TokenPair { id, secret }) => {
                request.header(header, format!("{}{}:{}", prefix, id, secret))
            }
            (AuthScheme::CookieSession, StoredCredential::Cookies(cookies)) => {
                request.header(header::COOKIE, cookie_header(cookies))
            }
            // store_credential rejects mismatches
            _ => request,
        }
    }

    pub async fn authenticated_request(&self, service: Service, method: Method, url: &str) -> RequestBuilder {
        self.authorize(service, self.client.request(method, url)).await
    }

    pub async fn authenticated_get(&self, service: Service, url: &str) -> Result<Response> {
        Ok(self.authenticated_request(service, Method::GET, url).await.send().await?)
    }

    pub async fn authenticated_post<T: Serialize + ?Sized>(
        &self,
        service: Service,
        url: &str,
        body: &T,
    ) -> Result<Response> {
        Ok(self.authenticated_request(service, Method::POST, url).await.json(body).send().await?)
    }

    /// String-keyed entry point; unknown names fail instead of going out
    /// unauthenticated.
    pub async fn authenticated_get_by_name(&self, service: &str, url: &str) -> Result<Response> {
        self.authenticated_get(Service::from_name(service)?, url).await
    }
}
