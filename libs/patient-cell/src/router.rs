use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::*;

pub fn patient_routes(config: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(search_patients))
        .route("/{id}", get(get_patient))
        .route("/by-user/{user_id}", get(get_patient_by_user))
        .layer(middleware::from_fn_with_state(config.clone(), auth_middleware))
        .with_state(config)
}

pub fn health_plan_routes(config: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(list_health_plans))
        .route("/{id}", get(get_health_plan))
        .layer(middleware::from_fn_with_state(config.clone(), auth_middleware))
        .with_state(config)
}
