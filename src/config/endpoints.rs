//! Service endpoint registry
//!
//! Translates logical service names into base URLs and credentials for the
//! two supported deployment topologies: probes running inside the stack's
//! container network, and probes running on the host against published ports.

use crate::error::{ProbeError, Result};
use reqwest::{redirect, Client};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Where the probes run relative to the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topology {
    /// Inside the container network; services are addressed by DNS name.
    InNetwork,
    /// On the host; services are addressed through published ports.
    HostMapped,
}

impl Topology {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "in-network" | "container" | "docker" => Some(Topology::InNetwork),
            "host-mapped" | "localhost" | "host" => Some(Topology::HostMapped),
            _ => None,
        }
    }

    /// `PROBE_TOPOLOGY` wins, then `TEST_ENV=container`, then a `/.dockerenv` marker.
    pub fn detect() -> Self {
        if let Some(topology) = env_opt("PROBE_TOPOLOGY").and_then(|v| Topology::parse(&v)) {
            return topology;
        }
        let test_env = env_opt("TEST_ENV").unwrap_or_default();
        if test_env.trim().eq_ignore_ascii_case("container") || Path::new("/.dockerenv").exists() {
            Topology::InNetwork
        } else {
            Topology::HostMapped
        }
    }
}

/// Backing services whose credentials are managed per service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Service {
    Grafana,
    HomeAssistant,
    Qdrant,
    BookStack,
    Mastodon,
    Forgejo,
    Seafile,
    OpenWebUi,
}

impl Service {
    pub const ALL: [Service; 8] = [
        Service::Grafana,
        Service::HomeAssistant,
        Service::Qdrant,
        Service::BookStack,
        Service::Mastodon,
        Service::Forgejo,
        Service::Seafile,
        Service::OpenWebUi,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Service::Grafana => "grafana",
            Service::HomeAssistant => "homeassistant",
            Service::Qdrant => "qdrant",
            Service::BookStack => "bookstack",
            Service::Mastodon => "mastodon",
            Service::Forgejo => "forgejo",
            Service::Seafile => "seafile",
            Service::OpenWebUi => "open-webui",
        }
    }

    /// Resolve a logical name. Unknown names are an error, never a silent no-op.
    pub fn from_name(name: &str) -> Result<Self> {
        let wanted = name.trim().to_lowercase();
        Service::ALL
            .iter()
            .copied()
            .find(|s| s.name() == wanted || s.env_prefix().to_lowercase() == wanted)
            .ok_or_else(|| ProbeError::UnknownService(name.to_string()))
    }

    fn env_prefix(self) -> &'static str {
        match self {
            Service::Grafana => "GRAFANA",
            Service::HomeAssistant => "HOMEASSISTANT",
            Service::Qdrant => "QDRANT",
            Service::BookStack => "BOOKSTACK",
            Service::Mastodon => "MASTODON",
            Service::Forgejo => "FORGEJO",
            Service::Seafile => "SEAFILE",
            Service::OpenWebUi => "OPEN_WEBUI",
        }
    }

    fn default_url(self, topology: Topology) -> &'static str {
        match (self, topology) {
            (Service::Grafana, Topology::InNetwork) => "http://grafana:3000",
            (Service::Grafana, Topology::HostMapped) => "http://localhost:3000",
            (Service::HomeAssistant, Topology::InNetwork) => "http://homeassistant:8123",
            (Service::HomeAssistant, Topology::HostMapped) => "http://localhost:8123",
            (Service::Qdrant, Topology::InNetwork) => "http://qdrant:6333",
            (Service::Qdrant, Topology::HostMapped) => "http://localhost:6333",
            (Service::BookStack, Topology::InNetwork) => "http://bookstack:80",
            (Service::BookStack, Topology::HostMapped) => "http://localhost:6875",
            (Service::Mastodon, Topology::InNetwork) => "http://mastodon-web:3000",
            (Service::Mastodon, Topology::HostMapped) => "http://localhost:3001",
            (Service::Forgejo, Topology::InNetwork) => "http://forgejo:3000",
            (Service::Forgejo, Topology::HostMapped) => "http://localhost:3002",
            (Service::Seafile, Topology::InNetwork) => "http://seafile:80",
            (Service::Seafile, Topology::HostMapped) => "http://localhost:8082",
            (Service::OpenWebUi, Topology::InNetwork) => "http://open-webui:8080",
            (Service::OpenWebUi, Topology::HostMapped) => "http://localhost:8081",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Service {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self> {
        Service::from_name(s)
    }
}

/// Secrets and identities the helpers need. Absent values disable the
/// helpers that depend on them.
#[derive(Clone, Default)]
pub struct Credentials {
    pub ldap_base_dn: String,
    pub ldap_admin_dn: String,
    pub ldap_admin_password: Option<String>,
    pub admin_user: Option<String>,
    pub admin_password: Option<String>,
    pub oidc_client_id: Option<String>,
    pub oidc_client_secret: Option<String>,
    pub oidc_redirect_uri: Option<String>,
    pub homeassistant_token: Option<String>,
    pub bookstack_token_id: Option<String>,
    pub bookstack_token_secret: Option<String>,
    pub qdrant_api_key: Option<String>,
}

// Never print secrets, only whether they are present.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn mask(v: &Option<String>) -> &'static str {
            if v.is_some() {
                "<set>"
            } else {
                "<unset>"
            }
        }
        f.debug_struct("Credentials")
            .field("ldap_base_dn", &self.ldap_base_dn)
            .field("ldap_admin_dn", &self.ldap_admin_dn)
            .field("ldap_admin_password", &mask(&self.ldap_admin_password))
            .field("admin_user", &self.admin_user)
            .field("admin_password", &mask(&self.admin_password))
            .field("oidc_client_id", &self.oidc_client_id)
            .field("oidc_client_secret", &mask(&self.oidc_client_secret))
            .field("oidc_redirect_uri", &self.oidc_redirect_uri)
            .field("homeassistant_token", &mask(&self.homeassistant_token))
            .field("bookstack_token_id", &self.bookstack_token_id)
            .field("bookstack_token_secret", &mask(&self.bookstack_token_secret))
            .field("qdrant_api_key", &mask(&self.qdrant_api_key))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEndpoints {
    pub topology: Topology,
    /// SSO portal serving the first-factor, verify and OIDC endpoints.
    pub sso_url: String,
    pub ldap_url: String,
    pub services: BTreeMap<Service, String>,
    #[serde(skip)]
    pub credentials: Credentials,
    pub session_cookie_name: String,
    pub http_timeout_seconds: u64,
}

impl ServiceEndpoints {
    /// Defaults for a topology with no environment overrides applied.
    pub fn for_topology(topology: Topology) -> Self {
        let (sso_url, ldap_url) = match topology {
            Topology::InNetwork => ("http://authelia:9091", "ldap://ldap:389"),
            Topology::HostMapped => ("http://localhost:9091", "ldap://localhost:10389"),
        };

        Self {
            topology,
            sso_url: sso_url.to_string(),
            ldap_url: ldap_url.to_string(),
            services: Service::ALL
                .iter()
                .map(|s| (*s, s.default_url(topology).to_string()))
                .collect(),
            credentials: Credentials {
                ldap_base_dn: "dc=stack,dc=local".to_string(),
                ldap_admin_dn: "cn=admin,dc=stack,dc=local".to_string(),
                ..Credentials::default()
            },
            session_cookie_name: "authelia_session".to_string(),
            http_timeout_seconds: 30,
        }
    }

    pub fn from_env() -> Self {
        Self::for_topology(Topology::detect()).with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(url) = env_opt("AUTHELIA_URL").or_else(|| env_opt("SSO_URL")) {
            self.sso_url = url;
        }
        if let Some(url) = env_opt("LDAP_URL") {
            self.ldap_url = url;
        }
        for service in Service::ALL {
            if let Some(url) = env_opt(&format!("{}_URL", service.env_prefix())) {
                self.services.insert(service, url);
            }
        }

        let creds = &mut self.credentials;
        if let Some(base_dn) = env_opt("LDAP_BASE_DN") {
            creds.ldap_admin_dn = format!("cn=admin,{}", base_dn);
            creds.ldap_base_dn = base_dn;
        }
        if let Some(admin_dn) = env_opt("LDAP_ADMIN_DN") {
            creds.ldap_admin_dn = admin_dn;
        }
        creds.ldap_admin_password = env_opt("LDAP_ADMIN_PASSWORD");
        creds.admin_user = env_opt("STACK_ADMIN_USER");
        creds.admin_password = env_opt("STACK_ADMIN_PASSWORD");
        creds.oidc_client_id = env_opt("OIDC_CLIENT_ID");
        creds.oidc_client_secret = env_opt("OIDC_CLIENT_SECRET");
        creds.oidc_redirect_uri = env_opt("OIDC_REDIRECT_URI");
        creds.homeassistant_token = env_opt("HOMEASSISTANT_TOKEN");
        creds.bookstack_token_id = env_opt("BOOKSTACK_TOKEN_ID");
        creds.bookstack_token_secret = env_opt("BOOKSTACK_TOKEN_SECRET");
        creds.qdrant_api_key = env_opt("QDRANT_API_KEY");

        if let Some(name) = env_opt("SESSION_COOKIE_NAME") {
            self.session_cookie_name = name;
        }
        self.http_timeout_seconds = std::env::var("PROBE_HTTP_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);

        self
    }

    /// Base URL of a backing service, without trailing slash.
    pub fn url(&self, service: Service) -> &str {
        self.services
            .get(&service)
            .map(|u| u.trim_end_matches('/'))
            .unwrap_or_else(|| service.default_url(self.topology))
    }

    /// Join a path onto the SSO portal base URL.
    pub fn sso(&self, path: &str) -> String {
        join(&self.sso_url, path)
    }

    /// Join a path onto a backing service's base URL.
    pub fn service_url(&self, service: Service, path: &str) -> String {
        join(self.url(service), path)
    }

    /// The shared HTTP client. Redirects are never followed: the OIDC flow
    /// reads `Location` headers itself.
    pub fn http_client(&self) -> Result<Client> {
        Ok(Client::builder()
            .timeout(Duration::from_secs(self.http_timeout_seconds))
            .redirect(redirect::Policy::none())
            .danger_accept_invalid_certs(true) // lab stacks run self-signed certificates
            .build()?)
    }
}

fn join(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
