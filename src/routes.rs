//! HTTP routing table.
//!
//! `/health` and `/api/v1/auth/login` are public. Every other route sits
//! behind the bearer token middleware; permissions are checked per handler.

use axum::{
    Router,
    http::HeaderValue,
    middleware as axum_middleware,
    routing::{get, post, put},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{error::AppError, handlers, middleware, state::AppState};

/// Build the application router.
///
/// # Errors
///
/// Fails if `CORS_ALLOWED_ORIGIN` is not a valid header value.
pub fn create_router(state: AppState) -> anyhow::Result<Router> {
    let cors = cors_layer(state.config.cors_allowed_origin.as_deref())?;

    let authenticated_routes = Router::new()
        // Session
        .route("/api/v1/auth/logout", post(handlers::auth::logout))
        .route("/api/v1/auth/me", get(handlers::auth::me))
        // Users
        .route(
            "/api/v1/users",
            get(handlers::users::list_users).post(handlers::users::create_user),
        )
        .route(
            "/api/v1/users/{id}",
            get(handlers::users::get_user)
                .put(handlers::users::update_user)
                .delete(handlers::users::delete_user),
        )
        // Revenue reports
        .route("/api/v1/revenue/summary", get(handlers::revenue::summary))
        .route(
            "/api/v1/revenue/timeseries",
            get(handlers::revenue::timeseries),
        )
        .route(
            "/api/v1/revenue/breakdown",
            get(handlers::revenue::breakdown),
        )
        .route(
            "/api/v1/revenue/transactions",
            get(handlers::revenue::transactions),
        )
        // Commission rules
        .route(
            "/api/v1/revenue/commission-rules",
            get(handlers::revenue::list_commission_rules)
                .post(handlers::revenue::create_commission_rule),
        )
        .route(
            "/api/v1/revenue/commission-rules/{id}",
            put(handlers::revenue::update_commission_rule)
                .delete(handlers::revenue::delete_commission_rule),
        )
        // Templates
        .route(
            "/api/v1/templates",
            get(handlers::templates::list_templates).post(handlers::templates::create_template),
        )
        .route(
            "/api/v1/templates/{id}",
            get(handlers::templates::get_template)
                .put(handlers::templates::update_template)
                .delete(handlers::templates::delete_template),
        )
        // Scheduled reports
        .route(
            "/api/v1/scheduled-reports",
            get(handlers::scheduled_reports::list_schedules)
                .post(handlers::scheduled_reports::create_schedule),
        )
        .route(
            "/api/v1/scheduled-reports/{id}",
            get(handlers::scheduled_reports::get_schedule)
                .put(handlers::scheduled_reports::update_schedule)
                .delete(handlers::scheduled_reports::delete_schedule),
        )
        .route(
            "/api/v1/scheduled-reports/{id}/run",
            post(handlers::scheduled_reports::run_schedule),
        )
        // Exports
        .route(
            "/api/v1/exports",
            get(handlers::exports::list_exports).post(handlers::exports::create_export),
        )
        .route(
            "/api/v1/exports/{id}",
            get(handlers::exports::get_export).delete(handlers::exports::delete_export),
        )
        .route(
            "/api/v1/exports/{id}/download",
            get(handlers::exports::download_export),
        )
        // Audit logs
        .route(
            "/api/v1/audit-logs",
            get(handlers::audit_logs::list_audit_logs)
                .post(handlers::audit_logs::create_audit_log),
        )
        .route(
            "/api/v1/audit-logs/{id}",
            get(handlers::audit_logs::get_audit_log)
                .delete(handlers::audit_logs::delete_audit_log),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    let app = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/api/v1/auth/login", post(handlers::auth::login))
        .merge(authenticated_routes)
        .fallback(route_not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(app)
}

/// Any origin when none is configured, otherwise exactly the configured one.
fn cors_layer(allowed_origin: Option<&str>) -> anyhow::Result<CorsLayer> {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match allowed_origin {
        None => Ok(layer.allow_origin(Any)),
        Some(origin) => {
            let origin: HeaderValue = origin
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid CORS origin {:?}: {}", origin, e))?;
            Ok(layer.allow_origin(origin))
        }
    }
}

async fn route_not_found() -> AppError {
    AppError::NotFound("Route")
}

async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}
