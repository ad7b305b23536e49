//! Manual PBX sync trigger

use crate::dto::ApiResponse;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use tracing::{info, instrument};
use yeastar_core::AppError;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/sync", web::post().to(trigger_sync));
}

/// Run one sync pass and return its counts
///
/// `POST /api/v1/sync`
#[instrument(skip(state))]
pub async fn trigger_sync(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let sync = state
        .sync
        .as_ref()
        .ok_or_else(|| AppError::Conflict("PBX sync is not configured".to_string()))?;

    info!("Manual PBX sync requested");
    let report = sync.run_once().await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(report)))
}
