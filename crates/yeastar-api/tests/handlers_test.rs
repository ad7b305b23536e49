//! HTTP handler tests over the in-memory repositories

use actix_web::{http::StatusCode, test, web, App};
use serde_json::{json, Value};
use std::sync::Arc;
use yeastar_api::{configure_routes, json_config, query_config, AppState};
use yeastar_cache::MemoryCache;
use yeastar_core::{
    config::{LinkingConfig, PbxConfig, WebhookConfig},
    traits::CallLogRepository,
};
use yeastar_db::memory::{MemoryAgentRepository, MemoryCallLogRepository, MemoryPartyRepository};
use yeastar_pbx::EventNormalizer;
use yeastar_services::{EntityLinker, ExtensionMapper, WebhookProcessor};

struct Fixture {
    state: AppState,
    call_logs: Arc<MemoryCallLogRepository>,
}

fn fixture(webhook: WebhookConfig) -> Fixture {
    let linking = LinkingConfig::default();
    let call_logs = Arc::new(MemoryCallLogRepository::new());
    let parties = Arc::new(MemoryPartyRepository::new());
    let agents = Arc::new(MemoryAgentRepository::new());

    let mapper = Arc::new(ExtensionMapper::new(
        agents,
        Some(Arc::new(MemoryCache::new())),
        300,
    ));
    let normalizer = EventNormalizer::from_config(&linking, &PbxConfig::default()).unwrap();
    let processor = Arc::new(WebhookProcessor::new(
        normalizer,
        call_logs.clone(),
        mapper.clone(),
        EntityLinker::new(parties, &linking),
    ));

    Fixture {
        state: AppState::new(processor, call_logs.clone(), mapper, webhook),
        call_logs,
    }
}

fn with_secret(secret: &str) -> WebhookConfig {
    WebhookConfig {
        secret: Some(secret.to_string()),
        ..WebhookConfig::default()
    }
}

macro_rules! init_app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state))
                .app_data(query_config())
                .app_data(json_config(64 * 1024))
                .configure(configure_routes),
        )
        .await
    };
}

fn webhook(body: Value) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/api/v1/webhook/yeastar")
        .set_json(body)
}

#[actix_web::test]
async fn webhook_lifecycle_is_acknowledged() {
    let f = fixture(WebhookConfig::default());
    let app = init_app!(f.state.clone());

    let resp: Value = test::call_and_read_body_json(
        &app,
        webhook(json!({"call_id": "c1", "type": "answered", "from": "+1555", "ext": "101"}))
            .to_request(),
    )
    .await;
    assert_eq!(resp["ok"], true);
    assert_eq!(resp["call_id"], "c1");
    assert_eq!(resp["outcome"], "created");
    assert_eq!(resp["status"], "answered");

    let resp: Value = test::call_and_read_body_json(
        &app,
        webhook(json!({"call_id": "c1", "type": "ended", "duration": 42})).to_request(),
    )
    .await;
    assert_eq!(resp["outcome"], "updated");
    assert_eq!(resp["status"], "ended");

    let resp: Value = test::call_and_read_body_json(
        &app,
        webhook(json!({"call_id": "c1", "type": "ended", "duration": 42})).to_request(),
    )
    .await;
    assert_eq!(resp["outcome"], "duplicate");

    let log = f.call_logs.find_by_call_id("c1").await.unwrap().unwrap();
    assert_eq!(log.duration, Some(42));
}

#[actix_web::test]
async fn unknown_event_type_is_accepted() {
    let f = fixture(WebhookConfig::default());
    let app = init_app!(f.state.clone());

    let resp: Value = test::call_and_read_body_json(
        &app,
        webhook(json!({"call_id": "c2", "type": "transfer"})).to_request(),
    )
    .await;

    assert_eq!(resp["ok"], true);
    assert_eq!(resp["outcome"], "unrecognized");
    assert!(resp.get("status").is_none());
    assert!(f.call_logs.is_empty());
}

#[actix_web::test]
async fn malformed_bodies_are_rejected() {
    let f = fixture(WebhookConfig::default());
    let app = init_app!(f.state.clone());

    let req = test::TestRequest::post()
        .uri("/api/v1/webhook/yeastar")
        .insert_header(("content-type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "malformed_payload");
    assert_eq!(body["status"], 400);

    let resp = test::call_service(&app, webhook(json!({"type": "answered"})).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "missing_field");

    let resp = test::call_service(&app, webhook(json!(["c1", "answered"])).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    assert!(f.call_logs.is_empty());
}

#[actix_web::test]
async fn secret_is_enforced_when_configured() {
    let f = fixture(with_secret("s3cret"));
    let app = init_app!(f.state.clone());
    let body = json!({"call_id": "c3", "type": "ringing"});

    let resp = test::call_service(&app, webhook(body.clone()).to_request()).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let err: Value = test::read_body_json(resp).await;
    assert_eq!(err["error"], "missing_webhook_secret");

    let resp = test::call_service(
        &app,
        webhook(body.clone())
            .insert_header(("X-Yeastar-Secret", "wrong"))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let err: Value = test::read_body_json(resp).await;
    assert_eq!(err["error"], "invalid_webhook_secret");
    assert!(f.call_logs.is_empty());

    let resp = test::call_service(
        &app,
        webhook(body)
            .insert_header(("X-Webhook-Secret", "s3cret"))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = test::call_service(
        &app,
        webhook(json!({"call_id": "c3", "type": "answered", "secret": "s3cret"})).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    assert_eq!(f.call_logs.len(), 1);
}

#[actix_web::test]
async fn disabled_connector_stores_nothing() {
    let f = fixture(WebhookConfig {
        enabled: false,
        ..WebhookConfig::default()
    });
    let app = init_app!(f.state.clone());

    let resp: Value = test::call_and_read_body_json(
        &app,
        webhook(json!({"call_id": "c4", "type": "ringing"})).to_request(),
    )
    .await;

    assert_eq!(resp, json!({"ok": false, "message": "connector disabled"}));
    assert!(f.call_logs.is_empty());
}

#[actix_web::test]
async fn call_logs_are_listed_and_fetched() {
    let f = fixture(WebhookConfig::default());
    let app = init_app!(f.state.clone());

    for (call_id, event) in [("c5", "answered"), ("c6", "missed"), ("c6", "bogus")] {
        test::call_service(
            &app,
            webhook(json!({"call_id": call_id, "type": event})).to_request(),
        )
        .await;
    }

    let resp: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/api/v1/call-logs?page=1&per_page=10")
            .to_request(),
    )
    .await;
    assert_eq!(resp["pagination"]["total"], 2);
    assert_eq!(resp["data"].as_array().unwrap().len(), 2);

    let resp: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/api/v1/call-logs?status=missed")
            .to_request(),
    )
    .await;
    assert_eq!(resp["pagination"]["total"], 1);
    assert_eq!(resp["data"][0]["call_id"], "c6");
    assert_eq!(resp["data"][0]["last_event_type"], "bogus");

    let resp: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/api/v1/call-logs/c5").to_request(),
    )
    .await;
    assert_eq!(resp["data"]["status"], "answered");
    assert_eq!(resp["data"]["answered"], true);

    let resp: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/api/v1/call-logs/c6/events")
            .to_request(),
    )
    .await;
    let events = resp["data"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1]["recognized"], false);

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/v1/call-logs/nope").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/v1/call-logs?status=dropped")
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/v1/call-logs?per_page=0")
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/v1/call-logs?page=9223372036854775807")
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn agent_mappings_round_trip() {
    let f = fixture(WebhookConfig::default());
    let app = init_app!(f.state.clone());

    let resp = test::call_service(
        &app,
        test::TestRequest::put()
            .uri("/api/v1/agents/101")
            .set_json(json!({"agent_name": "Front desk", "user_id": "alice@example.com"}))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/api/v1/agents/101").to_request(),
    )
    .await;
    assert_eq!(resp["data"]["user_id"], "alice@example.com");
    assert_eq!(resp["data"]["mapped"], true);

    // The mapping reaches new deliveries
    let resp: Value = test::call_and_read_body_json(
        &app,
        webhook(json!({"call_id": "c7", "type": "answered", "ext": "101"})).to_request(),
    )
    .await;
    assert_eq!(resp["outcome"], "created");
    let log = f.call_logs.find_by_call_id("c7").await.unwrap().unwrap();
    assert_eq!(log.agent_user.as_deref(), Some("alice@example.com"));

    let resp = test::call_service(
        &app,
        test::TestRequest::put()
            .uri("/api/v1/agents/102")
            .set_json(json!({"agent_name": ""}))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = test::call_service(
        &app,
        test::TestRequest::delete().uri("/api/v1/agents/101").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = test::call_service(
        &app,
        test::TestRequest::delete().uri("/api/v1/agents/101").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/api/v1/agents").to_request(),
    )
    .await;
    assert!(resp["data"].as_array().unwrap().is_empty());
}

#[actix_web::test]
async fn sync_requires_pbx_configuration() {
    let f = fixture(WebhookConfig::default());
    let app = init_app!(f.state.clone());

    let resp = test::call_service(
        &app,
        test::TestRequest::post().uri("/api/v1/sync").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[actix_web::test]
async fn health_reports_dependencies() {
    let f = fixture(WebhookConfig::default());
    let app = init_app!(f.state.clone());

    let resp: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/api/v1/health").to_request(),
    )
    .await;

    assert_eq!(resp["status"], "healthy");
    assert_eq!(resp["database"], "disabled");
    assert_eq!(resp["cache"], "disabled");
    assert_eq!(resp["webhook_enabled"], true);
}
