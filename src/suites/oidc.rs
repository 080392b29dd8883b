//! OIDC authorization code suite
//!
//! The flow tests depend on each other: when the code flow fails, the tests
//! that need its tokens are skipped.

use crate::context::ProbeContext;
use crate::error::ProbeError;
use crate::oidc::{decode_id_token, OidcClient, OidcTokens, DEFAULT_SCOPE};
use crate::runner::{expect_eq, expect_true, TestRunner};

const FLOW_TESTS: [&str; 4] = [
    "Authorization code flow issues tokens",
    "ID token names the logged-in user",
    "Access token is accepted by userinfo",
    "Refresh grant issues a new access token",
];

pub async fn run(runner: &mut TestRunner, ctx: &ProbeContext) {
    let mut suite = runner.suite("OIDC");

    suite
        .test("Userinfo rejects a forged access token", || async move {
            expect_true(!ctx.oidc.validate_token("not-a-real-token").await, "forged token accepted")
        })
        .await;

    let client = match OidcClient::from_endpoints(&ctx.endpoints) {
        Ok(client) => client,
        Err(e) => {
            for name in FLOW_TESTS {
                suite.skip(name, &e.to_string());
            }
            return;
        }
    };
    if !ctx.identity().is_enabled() {
        for name in FLOW_TESTS {
            suite.skip(name, "directory access not configured (LDAP_ADMIN_PASSWORD)");
        }
        return;
    }

    let mut issued: Option<(String, OidcTokens)> = None;
    let slot = &mut issued;
    let client = &client;

    suite
        .test(FLOW_TESTS[0], || async move {
            let identity = ctx.session.login_with_ephemeral_user(&["users"]).await?.into_inner();
            let tokens = ctx
                .oidc
                .perform_full_flow(&identity.username, &identity.password, client, DEFAULT_SCOPE)
                .await?;
            expect_true(!tokens.access_token.is_empty(), "empty access token")?;
            expect_eq(tokens.token_type.to_lowercase().as_str(), "bearer", "token_type")?;
            *slot = Some((identity.username, tokens));
            Ok(())
        })
        .await;

    let Some((username, tokens)) = issued else {
        for name in &FLOW_TESTS[1..] {
            suite.skip(name, "authorization code flow failed");
        }
        ctx.session.cleanup_ephemeral_user().await;
        return;
    };
    let (username, tokens) = (&username, &tokens);

    suite
        .test(FLOW_TESTS[1], || async move {
            let id_token = tokens
                .id_token
                .as_deref()
                .ok_or_else(|| ProbeError::assertion("token response has no id_token"))?;
            let claims = decode_id_token(id_token)?;
            let named = ["sub", "preferred_username"]
                .iter()
                .any(|claim| claims.get(*claim).and_then(|v| v.as_str()) == Some(username.as_str()));
            expect_true(named, &format!("neither sub nor preferred_username is {}", username))
        })
        .await;

    suite
        .test(FLOW_TESTS[2], || async move {
            expect_true(ctx.oidc.validate_token(&tokens.access_token).await, "access token rejected")
        })
        .await;

    match tokens.refresh_token.as_deref() {
        Some(refresh_token) => {
            suite
                .test(FLOW_TESTS[3], || async move {
                    let refreshed = ctx
                        .oidc
                        .refresh_access_token(&client.client_id, &client.client_secret, refresh_token)
                        .await?;
                    expect_true(ctx.oidc.validate_token(&refreshed.access_token).await, "refreshed token rejected")
                })
                .await;
        }
        None => {
            suite.skip(FLOW_TESTS[3], "client is not granted offline_access");
        }
    }

    for warning in ctx.session.cleanup_ephemeral_user().await {
        tracing::warn!("{}", warning);
    }
}
