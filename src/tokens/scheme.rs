//! Static capability table: how each service expects its credential

use crate::config::Service;

/// Way a stored credential is attached to an outgoing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// A single token sent as `<header>: <prefix><token>`.
    BearerToken { header: &'static str, prefix: &'static str },
    /// An id/secret pair sent as `<header>: <prefix><id>:<secret>`.
    TokenPair { header: &'static str, prefix: &'static str },
    /// Session cookies returned by a login endpoint.
    CookieSession,
}

const AUTHORIZATION: &str = "Authorization";

impl Service {
    pub fn auth_scheme(self) -> AuthScheme {
        match self {
            Service::Grafana | Service::HomeAssistant | Service::Mastodon => {
                AuthScheme::BearerToken { header: AUTHORIZATION, prefix: "Bearer " }
            }
            Service::Qdrant => AuthScheme::BearerToken { header: "api-key", prefix: "" },
            Service::BookStack => AuthScheme::TokenPair { header: AUTHORIZATION, prefix: "Token " },
            Service::Forgejo => AuthScheme::BearerToken { header: AUTHORIZATION, prefix: "token " },
            Service::Seafile => AuthScheme::BearerToken { header: AUTHORIZATION, prefix: "Token " },
            Service::OpenWebUi => AuthScheme::CookieSession,
        }
    }
}

impl AuthScheme {
    pub fn label(&self) -> &'static str {
        match self {
            AuthScheme::BearerToken { .. } => "token",
            AuthScheme::TokenPair { .. } => "token pair",
            AuthScheme::CookieSession => "cookie session",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_formats() {
        assert_eq!(
            Service::Qdrant.auth_scheme(),
            AuthScheme::BearerToken { header: "api-key", prefix: "" }
        );
        assert_eq!(
            Service::Forgejo.auth_scheme(),
            AuthScheme::BearerToken { header: "Authorization", prefix: "token " }
        );
        assert!(matches!(Service::BookStack.auth_scheme(), AuthScheme::TokenPair { .. }));
        assert_eq!(Service::OpenWebUi.auth_scheme(), AuthScheme::CookieSession);
    }
}
