// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn appointment_routes(state: Arc<AppConfig>) -> Router {
    // All appointment operations require authentication
    Router::new()
        .route("/", post(handlers::book_appointment).get(handlers::search_appointments))
        .route("/validate", post(handlers::validate_appointment))
        .route(
            "/{appointment_id}",
            get(handlers::get_appointment)
                .put(handlers::update_appointment)
                .patch(handlers::patch_appointment)
                .delete(handlers::cancel_appointment),
        )
        .route("/doctors/{doctor_id}", get(handlers::get_doctor_appointments))
        .route("/patients/{patient_id}", get(handlers::get_patient_appointments))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
