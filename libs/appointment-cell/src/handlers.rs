// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use doctor_cell::{DoctorError, DoctorService};
use patient_cell::{HealthPlanService, PatientError, PatientService};
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::{AppJson, AppQuery};

use crate::models::{
    Appointment, AppointmentError, AppointmentFilter, AppointmentRequest, AppointmentResponse,
    AvailabilityCheckRequest, PatchAppointmentRequest,
};
use crate::services::booking::AppointmentBookingService;

// ==============================================================================
// REFERENCE CHECKS
// ==============================================================================

fn doctor_error(e: DoctorError) -> AppointmentError {
    match e {
        DoctorError::NotFound => AppointmentError::DoctorNotFound,
        DoctorError::DatabaseError(msg) => AppointmentError::DatabaseError(msg),
    }
}

fn patient_error(e: PatientError) -> AppointmentError {
    match e {
        PatientError::NotFound | PatientError::NoPatientForUser => AppointmentError::PatientNotFound,
        PatientError::HealthPlanNotFound => AppointmentError::HealthPlanNotFound,
        PatientError::DatabaseError(msg) => AppointmentError::DatabaseError(msg),
    }
}

/// Every supplied reference must point to an active row.
async fn ensure_references(
    config: &AppConfig,
    token: &str,
    doctor_id: Option<Uuid>,
    patient_id: Option<Uuid>,
    health_plan_id: Option<Uuid>,
) -> Result<(), AppointmentError> {
    let doctors = DoctorService::new(config);
    let patients = PatientService::new(config);
    let plans = HealthPlanService::new(config);

    futures::try_join!(
        async {
            match doctor_id {
                Some(id) => doctors.get_doctor(id, token).await.map(|_| ()).map_err(doctor_error),
                None => Ok(()),
            }
        },
        async {
            match patient_id {
                Some(id) => patients.get_patient(id, token).await.map(|_| ()).map_err(patient_error),
                None => Ok(()),
            }
        },
        async {
            match health_plan_id {
                Some(id) => plans.get_health_plan(id, token).await.map(|_| ()).map_err(patient_error),
                None => Ok(()),
            }
        },
    )?;

    Ok(())
}

fn appointment_json(appointment: Appointment) -> Value {
    json!(AppointmentResponse::from(appointment))
}

fn appointments_json(appointments: Vec<Appointment>) -> Value {
    let total = appointments.len();
    let appointments: Vec<AppointmentResponse> =
        appointments.into_iter().map(AppointmentResponse::from).collect();

    json!({
        "appointments": appointments,
        "total": total
    })
}

// ==============================================================================
// WRITE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    AppJson(request): AppJson<AppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let token = auth.token();

    ensure_references(
        &config,
        token,
        Some(request.doctor_id),
        Some(request.patient_id),
        Some(request.recurrence_type_id),
    )
    .await?;

    let service = AppointmentBookingService::new(&config, token);
    let appointment = service.book_appointment(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "appointment": AppointmentResponse::from(appointment),
            "message": "Appointment booked successfully"
        })),
    ))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(config): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    AppJson(request): AppJson<AppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    ensure_references(
        &config,
        token,
        Some(request.doctor_id),
        Some(request.patient_id),
        Some(request.recurrence_type_id),
    )
    .await?;

    let service = AppointmentBookingService::new(&config, token);
    let appointment = service.update_appointment(appointment_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": AppointmentResponse::from(appointment),
        "message": "Appointment updated successfully"
    })))
}

#[axum::debug_handler]
pub async fn patch_appointment(
    State(config): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    AppJson(patch): AppJson<PatchAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    ensure_references(
        &config,
        token,
        patch.doctor_id,
        patch.patient_id,
        patch.recurrence_type_id,
    )
    .await?;

    let service = AppointmentBookingService::new(&config, token);
    let appointment = service.patch_appointment(appointment_id, patch).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": AppointmentResponse::from(appointment),
        "message": "Appointment updated successfully"
    })))
}

/// Soft delete, allowed only for the account that owns the patient record.
#[axum::debug_handler]
pub async fn cancel_appointment(
    State(config): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<StatusCode, AppError> {
    let token = auth.token();
    let service = AppointmentBookingService::new(&config, token);

    let appointment = service.get_appointment(appointment_id).await?;

    let owner = match PatientService::new(&config)
        .get_patient(appointment.patient_id, token)
        .await
    {
        Ok(patient) => Some(patient),
        Err(PatientError::NotFound) => None,
        Err(e) => return Err(patient_error(e).into()),
    };

    if !owner.is_some_and(|patient| patient.is_owned_by(&user.id)) {
        warn!("User {} tried to cancel appointment {} of another patient", user.id, appointment_id);
        return Err(AppointmentError::Forbidden.into());
    }

    service.cancel_appointment(appointment_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn validate_appointment(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    AppJson(request): AppJson<AvailabilityCheckRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&config, auth.token());

    let result = service.check_availability(request).await?;

    Ok(Json(json!(result)))
}

// ==============================================================================
// READ HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_appointment(
    State(config): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&config, auth.token());

    let appointment = service.get_appointment(appointment_id).await?;

    Ok(Json(appointment_json(appointment)))
}

#[axum::debug_handler]
pub async fn search_appointments(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    AppQuery(filter): AppQuery<AppointmentFilter>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&config, auth.token());

    let appointments = service.search_appointments(filter).await?;

    Ok(Json(appointments_json(appointments)))
}

#[axum::debug_handler]
pub async fn get_doctor_appointments(
    State(config): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    DoctorService::new(&config)
        .get_doctor(doctor_id, token)
        .await
        .map_err(doctor_error)?;

    let service = AppointmentBookingService::new(&config, token);
    let appointments = service
        .search_appointments(AppointmentFilter::for_doctor(doctor_id))
        .await?;

    Ok(Json(appointments_json(appointments)))
}

#[axum::debug_handler]
pub async fn get_patient_appointments(
    State(config): State<Arc<AppConfig>>,
    Path(patient_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    PatientService::new(&config)
        .get_patient(patient_id, token)
        .await
        .map_err(patient_error)?;

    let service = AppointmentBookingService::new(&config, token);
    let appointments = service
        .search_appointments(AppointmentFilter::for_patient(patient_id))
        .await?;

    Ok(Json(appointments_json(appointments)))
}
