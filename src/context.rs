//! Per-run orchestrator owning every helper
//!
//! Built once per run from the endpoint registry. Helpers never live in
//! globals, so two contexts never share sessions or tokens.

use crate::config::ServiceEndpoints;
use crate::directory::DirectoryClient;
use crate::error::Result;
use crate::identity::IdentityHelper;
use crate::oidc::OidcHelper;
use crate::session::SessionHelper;
use crate::tokens::TokenManager;
use reqwest::Client;
use std::sync::Arc;
use tracing::info;

pub struct ProbeContext {
    pub endpoints: Arc<ServiceEndpoints>,
    pub client: Client,
    pub session: Arc<SessionHelper>,
    pub oidc: OidcHelper,
    pub tokens: TokenManager,
}

impl ProbeContext {
    /// Directory access comes from the LDAP settings in `endpoints`.
    pub fn new(endpoints: ServiceEndpoints) -> Result<Self> {
        let identity = IdentityHelper::from_endpoints(&endpoints);
        Self::build(endpoints, identity)
    }

    pub fn with_directory(endpoints: ServiceEndpoints, directory: Arc<dyn DirectoryClient>) -> Result<Self> {
        Self::build(endpoints, IdentityHelper::new(directory))
    }

    fn build(endpoints: ServiceEndpoints, identity: IdentityHelper) -> Result<Self> {
        let endpoints = Arc::new(endpoints);
        let client = endpoints.http_client()?;
        let session = Arc::new(SessionHelper::new(client.clone(), endpoints.clone(), identity));
        let oidc = OidcHelper::new(session.clone());
        let tokens = TokenManager::new(client.clone(), endpoints.clone());

        info!(topology = ?endpoints.topology, sso = %endpoints.sso_url, "Probe context ready");
        Ok(Self { endpoints, client, session, oidc, tokens })
    }

    pub fn identity(&self) -> &IdentityHelper {
        self.session.identity()
    }

    /// Remove the ephemeral identity, delete provisioned service accounts and
    /// forget every stored credential.
    pub async fn teardown(&self) -> Vec<String> {
        let mut warnings = self.session.cleanup_ephemeral_user().await;
        warnings.extend(self.tokens.release_provisioned().await);
        self.tokens.clear_all().await;
        warnings
    }
}
