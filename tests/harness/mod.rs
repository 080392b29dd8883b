#![allow(dead_code)]

use serde_json::Value;
use stack_probe::directory::InMemoryDirectory;
use stack_probe::{ProbeContext, ServiceEndpoints, Topology};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SESSION_COOKIE: &str = "authelia_session";

/// Context whose SSO portal is `server` and whose directory lives in memory.
pub fn context_for(server: &MockServer) -> (ProbeContext, Arc<InMemoryDirectory>) {
    context_with(server, |_| {})
}

/// As [`context_for`], with the endpoint registry adjusted by `configure`.
pub fn context_with(
    server: &MockServer,
    configure: impl FnOnce(&mut ServiceEndpoints),
) -> (ProbeContext, Arc<InMemoryDirectory>) {
    let endpoints = endpoints_for(server, configure);
    let directory = Arc::new(InMemoryDirectory::with_groups(&["users", "admins"]));
    let ctx = ProbeContext::with_directory(endpoints, directory.clone()).unwrap();
    (ctx, directory)
}

/// Registry pointing the SSO portal at `server`, with no credentials beyond
/// what `configure` adds.
pub fn endpoints_for(server: &MockServer, configure: impl FnOnce(&mut ServiceEndpoints)) -> ServiceEndpoints {
    let mut endpoints = ServiceEndpoints::for_topology(Topology::HostMapped);
    endpoints.sso_url = server.uri();
    configure(&mut endpoints);
    endpoints
}

/// First-factor endpoint accepting any credentials and issuing `cookie`.
pub async fn mount_first_factor(server: &MockServer, cookie: &str) {
    Mock::given(method("POST"))
        .and(path("/api/firstfactor"))
        .respond_with(ResponseTemplate::new(200).append_header(
            "Set-Cookie",
            format!("{}={}; Path=/; HttpOnly", SESSION_COOKIE, cookie).as_str(),
        ))
        .mount(server)
        .await;
}

pub fn unsigned_jwt(claims: &Value) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","kid":"probe"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.c2lnbmF0dXJl", header, payload)
}
