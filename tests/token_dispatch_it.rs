use stack_probe::{Service, StoredCredential};
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod harness;
use harness::context_for;

#[tokio::test]
async fn request_without_token_goes_out_unauthenticated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/user"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/user"))
        .and(header_exists("cookie"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/user"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let (ctx, _) = context_for(&server);
    let url = format!("{}/api/user", server.uri());

    for service in Service::ALL {
        let response = ctx.tokens.authenticated_get(service, &url).await.unwrap();
        assert_eq!(response.status(), 401, "{} sent a credential it does not have", service);
    }
}

#[tokio::test]
async fn tokens_are_not_shared_across_services() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/states"))
        .and(header("authorization", "Bearer ha-token"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/states"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let (ctx, _) = context_for(&server);
    ctx.tokens
        .store_credential(Service::HomeAssistant, StoredCredential::Token("ha-token".into()))
        .await
        .unwrap();
    let url = format!("{}/api/states", server.uri());

    assert_eq!(ctx.tokens.authenticated_get(Service::HomeAssistant, &url).await.unwrap().status(), 200);
    assert_eq!(ctx.tokens.authenticated_get(Service::Grafana, &url).await.unwrap().status(), 401);

    assert!(ctx.tokens.clear_token(Service::HomeAssistant).await);
    assert_eq!(ctx.tokens.authenticated_get(Service::HomeAssistant, &url).await.unwrap().status(), 401);
}
