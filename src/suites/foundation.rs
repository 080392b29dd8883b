//! Reachability of the SSO portal and its OIDC metadata

use crate::config::Service;
use crate::context::ProbeContext;
use crate::runner::{expect_contains, expect_status, expect_true, TestRunner};
use url::Url;

pub async fn run(runner: &mut TestRunner, ctx: &ProbeContext) {
    let mut suite = runner.suite("Foundation");

    suite
        .test("Endpoint registry resolves every service", || async move {
            for service in Service::ALL {
                let url = ctx.endpoints.url(service);
                expect_true(Url::parse(url).is_ok(), &format!("{} has an invalid URL: {}", service, url))?;
            }
            Ok(())
        })
        .await;

    suite
        .test("SSO portal health endpoint answers", || async move {
            let response = ctx.client.get(ctx.endpoints.sso("/api/health")).send().await?;
            expect_status(response.status().as_u16(), &[200])
        })
        .await;

    suite
        .test("OIDC discovery advertises the authorization endpoint", || async move {
            let document = ctx.oidc.discovery().await?;
            expect_true(document["issuer"].is_string(), "discovery document has no issuer")?;
            expect_contains(
                document["authorization_endpoint"].as_str().unwrap_or_default(),
                "/api/oidc/authorization",
                "authorization_endpoint",
            )
        })
        .await;

    suite
        .test("JWKS publishes at least one signing key", || async move {
            let jwks = ctx.oidc.jwks().await?;
            let keys = jwks["keys"].as_array().map(Vec::len).unwrap_or(0);
            expect_true(keys > 0, "JWKS has no keys")
        })
        .await;
}
