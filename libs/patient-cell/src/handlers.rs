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

use crate::models::PatientSearchQuery;
use crate::services::{HealthPlanService, PatientService};

#[axum::debug_handler]
pub async fn search_patients(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    AppQuery(query): AppQuery<PatientSearchQuery>,
) -> Result<Json<Value>, AppError> {
    let service = PatientService::new(&config);

    let patients = service.search_patients(query, auth.token()).await?;

    Ok(Json(json!({
        "patients": patients,
        "total": patients.len()
    })))
}

#[axum::debug_handler]
pub async fn get_patient(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = PatientService::new(&config);

    let patient = service.get_patient(patient_id, auth.token()).await?;

    Ok(Json(json!(patient)))
}

#[axum::debug_handler]
pub async fn get_patient_by_user(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let service = PatientService::new(&config);

    let patient = service.get_patient_by_user(&user_id, auth.token()).await?;

    Ok(Json(json!(patient)))
}

#[axum::debug_handler]
pub async fn list_health_plans(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = HealthPlanService::new(&config);

    let plans = service.list_health_plans(auth.token()).await?;

    Ok(Json(json!({
        "health_plans": plans,
        "total": plans.len()
    })))
}

#[axum::debug_handler]
pub async fn get_health_plan(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(plan_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = HealthPlanService::new(&config);

    let plan = service.get_health_plan(plan_id, auth.token()).await?;

    Ok(Json(json!(plan)))
}
