//! API layer for the Yeastar connector
//!
//! Webhook receiver, call log read API, extension mapping admin API, and
//! the manual sync trigger, all under `/api/v1`.

#![forbid(unsafe_code)]

pub mod dto;
pub mod handlers;
pub mod state;

use actix_web::{web, HttpResponse};

pub use dto::{ApiResponse, PaginationParams};
pub use handlers::{
    configure_agents, configure_call_logs, configure_health, configure_sync, configure_webhook,
};
pub use state::AppState;

/// Mount every route under `/api/v1`
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .configure(configure_health)
            .configure(configure_webhook)
            .configure(configure_call_logs)
            .configure(configure_agents)
            .configure(configure_sync),
    );
}

/// Query string errors rendered like every other API error
pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err, _req| {
        let message = err.to_string();
        actix_web::error::InternalError::from_response(
            err,
            HttpResponse::BadRequest().json(serde_json::json!({
                "error": "invalid_query",
                "message": message,
                "status": 400,
            })),
        )
        .into()
    })
}

/// JSON body errors rendered like every other API error
pub fn json_config(limit: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(limit)
        .error_handler(|err, _req| {
            let message = err.to_string();
            actix_web::error::InternalError::from_response(
                err,
                HttpResponse::BadRequest().json(serde_json::json!({
                    "error": "invalid_body",
                    "message": message,
                    "status": 400,
                })),
            )
            .into()
        })
}
