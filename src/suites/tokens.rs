//! Per-service credential acquisition and use

use crate::config::{Service, ServiceEndpoints};
use crate::context::ProbeContext;
use crate::error::ProbeError;
use crate::runner::{expect_status, expect_true, TestRunner};

/// An endpoint that requires authentication on each service.
fn probe_path(service: Service) -> &'static str {
    match service {
        Service::Grafana => "/api/user",
        Service::HomeAssistant => "/api/",
        Service::Qdrant => "/collections",
        Service::BookStack => "/api/books",
        Service::Mastodon => "/api/v1/accounts/verify_credentials",
        Service::Forgejo => "/api/v1/user",
        Service::Seafile => "/api2/auth/ping/",
        Service::OpenWebUi => "/api/v1/auths/",
    }
}

/// Configuration the acquisition for `service` cannot do without.
fn missing_configuration(service: Service, endpoints: &ServiceEndpoints) -> Option<&'static str> {
    let creds = &endpoints.credentials;
    match service {
        Service::HomeAssistant => creds.homeassistant_token.is_none().then_some("HOMEASSISTANT_TOKEN not set"),
        Service::Qdrant => creds.qdrant_api_key.is_none().then_some("QDRANT_API_KEY not set"),
        Service::BookStack => (creds.bookstack_token_id.is_none() || creds.bookstack_token_secret.is_none())
            .then_some("BOOKSTACK_TOKEN_ID/BOOKSTACK_TOKEN_SECRET not set"),
        Service::Grafana
        | Service::Mastodon
        | Service::Forgejo
        | Service::Seafile
        | Service::OpenWebUi => (creds.admin_user.is_none() || creds.admin_password.is_none())
            .then_some("STACK_ADMIN_USER/STACK_ADMIN_PASSWORD not set"),
    }
}

pub async fn run(runner: &mut TestRunner, ctx: &ProbeContext) {
    let mut suite = runner.suite("Service tokens");

    suite
        .test("Unknown service names are rejected", || async move {
            match ctx.tokens.authenticated_get_by_name("not-a-service", &ctx.endpoints.sso("/")).await {
                Err(ProbeError::UnknownService(_)) => Ok(()),
                Err(e) => Err(e),
                Ok(_) => Err(ProbeError::assertion("request sent for an unknown service")),
            }
        })
        .await;

    for service in Service::ALL {
        let acquire_name = format!("Acquire {} credential ({})", service, service.auth_scheme().label());
        let request_name = format!("{} accepts the acquired credential", service);

        let missing = missing_configuration(service, &ctx.endpoints);
        let acquired = suite
            .skip_if(&acquire_name, missing, || async move {
                ctx.tokens.acquire(service).await?;
                expect_true(ctx.tokens.has_token(service).await, "credential not stored")
            })
            .await
            .is_success();

        if !acquired {
            suite.skip(&request_name, missing.unwrap_or("credential acquisition failed"));
            continue;
        }

        suite
            .test(&request_name, || async move {
                let url = ctx.endpoints.service_url(service, probe_path(service));
                let response = ctx.tokens.authenticated_get(service, &url).await?;
                expect_status(response.status().as_u16(), &[200])
            })
            .await;
    }
}
