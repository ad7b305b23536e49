//! Yeastar connector server
//!
//! Receives Yeastar PBX call webhooks, stores one call log per call, links
//! calls to Customers and Leads, and optionally pulls extensions and CDRs
//! from the PBX OpenAPI.

use actix_cors::Cors;
use actix_web::{http::header, middleware, web, App, HttpResponse, HttpServer};
use std::env;
use std::fmt::Display;
use std::io;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use yeastar_api::{configure_routes, json_config, query_config, AppState};
use yeastar_cache::RedisCache;
use yeastar_core::{traits::CacheService, AppConfig};
use yeastar_db::{
    create_pool, run_migrations, PgAgentRepository, PgCallLogRepository, PgPartyRepository,
};
use yeastar_pbx::{EventNormalizer, PbxClient};
use yeastar_services::{EntityLinker, ExtensionMapper, SyncService, WebhookProcessor};

/// Initialize tracing/logging
///
/// `RUST_LOG` wins when set; otherwise `LOG_LEVEL` applies to the
/// connector crates. `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let crates = [
            "yeastar_connector",
            "yeastar_api",
            "yeastar_services",
            "yeastar_pbx",
            "yeastar_db",
            "yeastar_cache",
            "yeastar_core",
        ];
        let directives: Vec<String> = crates
            .iter()
            .map(|c| format!("{}={}", c, log_level))
            .chain(["actix_web=info".to_string(), "sqlx=warn".to_string()])
            .collect();
        EnvFilter::new(directives.join(","))
    });

    let json = env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let (plain_layer, json_layer) = if json {
        (None, Some(fmt::layer().json().with_target(true)))
    } else {
        (
            Some(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true),
            ),
            None,
        )
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(plain_layer)
        .with(json_layer)
        .init();
}

fn startup_error<E: Display>(context: &'static str) -> impl FnOnce(E) -> io::Error {
    move |e| io::Error::other(format!("{}: {}", context, e))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    info!(
        "Starting Yeastar connector v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = AppConfig::load().map_err(startup_error("Invalid configuration"))?;

    info!("Connecting to database...");
    let pool = create_pool(&config.database.url, Some(config.database.max_connections))
        .await
        .map_err(startup_error("Failed to create database pool"))?;

    if config.database.run_migrations {
        run_migrations(&pool)
            .await
            .map_err(startup_error("Failed to apply migrations"))?;
    }

    let redis = match config.redis.url.as_deref().filter(|u| !u.is_empty()) {
        Some(url) => match RedisCache::new(url).await {
            Ok(cache) => {
                info!("Redis cache enabled");
                Some(Arc::new(cache))
            }
            Err(e) => {
                warn!("Redis unavailable, extension lookups go to the database: {}", e);
                None
            }
        },
        None => None,
    };

    let call_logs = Arc::new(PgCallLogRepository::new(pool.clone()));
    let parties = Arc::new(PgPartyRepository::new(pool.clone()));
    let agents = Arc::new(PgAgentRepository::new(pool.clone()));

    let mapper = Arc::new(ExtensionMapper::new(
        agents,
        redis.clone().map(|r| r as Arc<dyn CacheService>),
        config.redis.agent_ttl_secs,
    ));

    let normalizer = EventNormalizer::from_config(&config.linking, &config.pbx)
        .map_err(startup_error("Invalid PBX timezone"))?;
    let linker = EntityLinker::new(parties, &config.linking);
    let processor = Arc::new(WebhookProcessor::new(
        normalizer,
        call_logs.clone(),
        mapper.clone(),
        linker,
    ));

    let mut state = AppState::new(
        processor.clone(),
        call_logs,
        mapper.clone(),
        config.webhook.clone(),
    )
    .with_pool(pool);

    if let Some(redis) = redis {
        state = state.with_redis(redis);
    }

    let sync = if config.pbx.has_credentials() {
        let client = PbxClient::from_config(&config.pbx)
            .map_err(startup_error("Failed to build PBX client"))?;
        let sync = Arc::new(SyncService::new(
            Arc::new(client),
            processor,
            mapper,
            config.pbx.clone(),
        ));
        state = state.with_sync(sync.clone());
        Some(sync)
    } else {
        info!("PBX credentials not configured, sync disabled");
        None
    };

    let sync_handle = match &sync {
        Some(sync) if config.pbx.sync_enabled => Some(sync.clone().spawn()),
        _ => None,
    };

    if !config.webhook.enabled {
        warn!("Webhook processing is disabled; deliveries will be acknowledged and dropped");
    }

    let bind_addr = config.server_addr();
    let workers = config.server.workers;
    let cors_origins = config.server.cors_origins.clone();
    let max_payload = config.webhook.max_payload_bytes;

    info!(
        "Starting HTTP server on {} with {} workers",
        bind_addr, workers
    );

    let server = HttpServer::new(move || {
        let origins = cors_origins.clone();
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _req_head| {
                origin
                    .to_str()
                    .map(|o| origins.split(',').any(|allowed| allowed.trim() == o))
                    .unwrap_or(false)
            })
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                header::AUTHORIZATION,
                header::ACCEPT,
                header::CONTENT_TYPE,
                header::HeaderName::from_static("x-yeastar-secret"),
                header::HeaderName::from_static("x-webhook-secret"),
            ])
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(state.clone()))
            .app_data(web::PayloadConfig::new(max_payload))
            .app_data(json_config(max_payload))
            .app_data(query_config())
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(middleware::NormalizePath::trim())
            .configure(configure_routes)
            .route(
                "/",
                web::get().to(|| async {
                    HttpResponse::Found()
                        .append_header(("Location", "/api/v1/health"))
                        .finish()
                }),
            )
    })
    .workers(workers)
    .bind(&bind_addr)?
    .run();

    let result = server.await;

    if let Some(handle) = sync_handle {
        if let Err(e) = handle.shutdown().await {
            warn!("PBX sync did not stop cleanly: {}", e);
        }
    }

    info!("Yeastar connector stopped");
    result
}
