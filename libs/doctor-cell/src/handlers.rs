use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::error::AppError;
use shared_utils::extractor::AppQuery;

use crate::models::DoctorSearchQuery;
use crate::services::DoctorService;

#[axum::debug_handler]
pub async fn list_doctors(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    AppQuery(query): AppQuery<DoctorSearchQuery>,
) -> Result<Json<Value>, AppError> {
    let service = DoctorService::new(&config);

    let doctors = service.list_doctors(query, auth.token()).await?;

    Ok(Json(json!({
        "doctors": doctors,
        "total": doctors.len()
    })))
}

#[axum::debug_handler]
pub async fn get_doctor(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = DoctorService::new(&config);

    let doctor = service.get_doctor(doctor_id, auth.token()).await?;

    Ok(Json(json!(doctor)))
}
