//! Call log read API

use crate::dto::{ApiResponse, CallEventResponse, CallLogFilterParams, CallLogResponse};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use tracing::{debug, instrument, warn};
use validator::Validate;
use yeastar_core::AppError;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/call-logs")
            .route("", web::get().to(list_call_logs))
            .route("/{call_id}", web::get().to(get_call_log))
            .route("/{call_id}/events", web::get().to(list_call_events)),
    );
}

/// List call logs, newest first
///
/// ```text
/// GET /api/v1/call-logs?status=missed&direction=inbound&from=2025-01-01&page=1&per_page=50
/// ```
#[instrument(skip(state, query))]
pub async fn list_call_logs(
    state: web::Data<AppState>,
    query: web::Query<CallLogFilterParams>,
) -> Result<HttpResponse, AppError> {
    query.validate().map_err(|e| {
        warn!("Invalid call log query: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let filter = query.to_filter()?;
    let pagination = &query.pagination;

    debug!(
        page = pagination.page,
        per_page = pagination.per_page,
        "Listing call logs"
    );

    let (logs, total) = state
        .call_logs
        .list_filtered(&filter, pagination.limit(), pagination.offset())
        .await?;

    let data: Vec<CallLogResponse> = logs.into_iter().map(CallLogResponse::from).collect();

    Ok(HttpResponse::Ok().json(pagination.paginate(data, total)))
}

/// `GET /api/v1/call-logs/{call_id}`
#[instrument(skip(state))]
pub async fn get_call_log(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let call_id = path.into_inner();

    let log = state
        .call_logs
        .find_by_call_id(&call_id)
        .await?
        .ok_or_else(|| AppError::CallLogNotFound(call_id.clone()))?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(CallLogResponse::from(log))))
}

/// Audit trail of a call, oldest first
///
/// Unrecognized deliveries can exist without a call log, so the trail is
/// returned whenever either exists.
#[instrument(skip(state))]
pub async fn list_call_events(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let call_id = path.into_inner();

    let events = state.call_logs.list_events(&call_id).await?;
    if events.is_empty() && state.call_logs.find_by_call_id(&call_id).await?.is_none() {
        return Err(AppError::CallLogNotFound(call_id));
    }

    let data: Vec<CallEventResponse> = events.into_iter().map(CallEventResponse::from).collect();
    Ok(HttpResponse::Ok().json(ApiResponse::success(data)))
}
