use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
    Router,
};
use domain::ports::Stores;
use domain::services::{
    AtomicOrFallbackRegistrar, DeviceRegistrar, DeviceRegistry, EventValidator,
    LeaderboardService, SyncService,
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::middleware::{
    init_metrics, metrics_handler, metrics_middleware, rate_limit::rate_limit_middleware,
    trace_id, RateLimitTier, RateLimiter, RateLimiters,
};
use crate::routes::{admin, devices, health, leaderboard, sync, user};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub stores: Stores,
    pub registrar: Arc<dyn DeviceRegistrar>,
    pub devices: DeviceRegistry,
    pub sync: SyncService,
    pub leaderboard: LeaderboardService,
    pub validator: EventValidator,
    /// Present when backed by Postgres; used for pool gauges.
    pub pool: Option<PgPool>,
}

impl AppState {
    pub fn new(config: Config, stores: Stores, pool: Option<PgPool>) -> Self {
        let registrar: Arc<dyn DeviceRegistrar> = Arc::new(AtomicOrFallbackRegistrar::new(&stores));
        let validator = config.limits.event_validator();

        Self {
            devices: DeviceRegistry::new(&stores),
            sync: SyncService::new(stores.clone(), registrar.clone(), validator),
            leaderboard: LeaderboardService::new(stores.clone(), config.limits.leaderboard_size),
            config: Arc::new(config),
            stores,
            registrar,
            validator,
            pool,
        }
    }
}

fn rate_limited(
    router: Router<AppState>,
    limiter: Option<Arc<dyn RateLimiter>>,
) -> Router<AppState> {
    match limiter {
        Some(limiter) => router.route_layer(middleware::from_fn_with_state(
            limiter,
            rate_limit_middleware,
        )),
        None => router,
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

pub fn create_app(config: Config, stores: Stores, pool: Option<PgPool>) -> Router {
    init_metrics();

    let state = AppState::new(config, stores, pool);
    let config = state.config.clone();
    let limiters = RateLimiters::from_config(&config.security.rate_limit);

    // Extension sync traffic, including the legacy aliases.
    let ingestion_routes = Router::new()
        .route("/api/v1/sync", post(sync::sync_events).get(sync::sync_stats))
        .route(
            "/api/extension/sync",
            post(sync::sync_events)
                .get(sync::sync_stats)
                .delete(sync::unregister_device),
        )
        .route(
            "/api/sync/scores",
            post(sync::sync_events).get(sync::sync_stats),
        );
    let ingestion_routes = rate_limited(ingestion_routes, limiters.tier(RateLimitTier::Ingestion));

    let verify_routes = Router::new().route(
        "/api/v1/device/verify",
        get(devices::verify_device).post(devices::verify_device_sync),
    );
    let verify_routes = rate_limited(verify_routes, limiters.tier(RateLimitTier::Auth));

    let api_routes = Router::new()
        .route(
            "/api/v1/devices",
            get(devices::list_devices)
                .post(devices::register_device)
                .delete(devices::remove_device),
        )
        .route("/api/devices/register", post(devices::register_device))
        .route(
            "/api/extension/devices",
            post(devices::register_device).delete(devices::remove_device),
        )
        .route("/api/v1/device/status", post(devices::device_status))
        .route("/api/v1/user", delete(user::delete_account))
        .route("/api/v1/user/me", get(user::me))
        .route("/api/v1/user/score", get(user::score).post(user::score_for))
        .route("/api/v1/user/activity", get(user::activity))
        .route("/api/v1/leaderboard", get(leaderboard::get_leaderboard));
    let api_routes = rate_limited(api_routes, limiters.tier(RateLimitTier::Api));

    let admin_routes = Router::new().route("/api/v1/admin/cleanup", post(admin::cleanup_anomalies));
    let admin_routes = rate_limited(admin_routes, limiters.tier(RateLimitTier::Admin));

    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    Router::new()
        .merge(ingestion_routes)
        .merge(verify_routes)
        .merge(api_routes)
        .merge(admin_routes)
        .merge(public_routes)
        // Bottom layers run first.
        .layer(DefaultBodyLimit::max(config.server.max_body_size))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors_layer(&config.security.cors_origins))
        .with_state(state)
}
