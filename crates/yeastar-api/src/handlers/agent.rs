//! Extension mapping admin API

use crate::dto::{AgentResponse, AgentUpsertRequest, ApiResponse};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use tracing::{info, instrument, warn};
use validator::Validate;
use yeastar_core::AppError;

const MAX_EXTENSION_LEN: usize = 32;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/agents")
            .route("", web::get().to(list_agents))
            .route("/{extension}", web::get().to(get_agent))
            .route("/{extension}", web::put().to(upsert_agent))
            .route("/{extension}", web::delete().to(delete_agent)),
    );
}

fn extension_param(raw: String) -> Result<String, AppError> {
    let extension = raw.trim();
    if extension.is_empty() || extension.len() > MAX_EXTENSION_LEN {
        return Err(AppError::InvalidInput(format!("Invalid extension '{}'", raw)));
    }
    Ok(extension.to_string())
}

/// `GET /api/v1/agents`
#[instrument(skip(state))]
pub async fn list_agents(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let agents: Vec<AgentResponse> = state
        .mapper
        .list()
        .await?
        .into_iter()
        .map(AgentResponse::from)
        .collect();

    Ok(HttpResponse::Ok().json(ApiResponse::success(agents)))
}

/// `GET /api/v1/agents/{extension}`
#[instrument(skip(state))]
pub async fn get_agent(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let extension = extension_param(path.into_inner())?;
    let agent = state.mapper.get(&extension).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(AgentResponse::from(agent))))
}

/// Create or replace a mapping
///
/// `PUT /api/v1/agents/{extension}`
#[instrument(skip(state, req))]
pub async fn upsert_agent(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<AgentUpsertRequest>,
) -> Result<HttpResponse, AppError> {
    let extension = extension_param(path.into_inner())?;
    req.validate().map_err(|e| {
        warn!("Agent mapping validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let agent = state
        .mapper
        .save(&extension, req.agent_name.trim(), req.user_id.as_deref().map(str::trim))
        .await?;

    info!(extension = %extension, "Agent mapping saved");
    Ok(HttpResponse::Ok().json(ApiResponse::success(AgentResponse::from(agent))))
}

/// `DELETE /api/v1/agents/{extension}`
#[instrument(skip(state))]
pub async fn delete_agent(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let extension = extension_param(path.into_inner())?;
    state.mapper.remove(&extension).await?;

    info!(extension = %extension, "Agent mapping deleted");
    Ok(HttpResponse::Ok().json(ApiResponse::with_message(
        extension,
        "Agent mapping deleted",
    )))
}
