//! Health check
//!
//! Always answers 200 while the process is up. Dependencies are reported
//! as `ok`, `error`, or `disabled` so a load balancer can tell a degraded
//! instance from a dead one.

use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::warn;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check));
}

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let database = match &state.pool {
        Some(pool) => match sqlx::query("SELECT 1").execute(pool).await {
            Ok(_) => "ok",
            Err(e) => {
                warn!("Health check: database unreachable: {}", e);
                "error"
            }
        },
        None => "disabled",
    };

    let cache = match &state.redis {
        Some(redis) => match redis.ping().await {
            Ok(()) => "ok",
            Err(e) => {
                warn!("Health check: redis unreachable: {}", e);
                "error"
            }
        },
        None => "disabled",
    };

    let healthy = database != "error" && cache != "error";

    HttpResponse::Ok().json(json!({
        "status": if healthy { "healthy" } else { "degraded" },
        "service": "yeastar-connector",
        "version": env!("CARGO_PKG_VERSION"),
        "webhook_enabled": state.webhook.enabled,
        "sync": state.sync.as_ref().map(|s| json!({ "last_sync": s.last_sync() })),
        "database": database,
        "cache": cache,
    }))
}
