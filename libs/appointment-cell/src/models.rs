// libs/appointment-cell/src/models.rs
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use uuid::Uuid;

use shared_models::error::AppError;

use crate::services::validation::{SchedulingError, CONSULTATION_MINUTES};

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

/// Row of the `appointments` table. Cancellation flips `is_active`; rows are
/// never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    /// Health plan used as the appointment's recurrence label.
    pub recurrence_type_id: Uuid,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub labels: AppointmentLabels,
}

/// Display names of the related rows, embedded by the store on reads and
/// writes. Absent when the row was not loaded through `APPOINTMENT_SELECT`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppointmentLabels {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doctor_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doctor_expertise: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence_name: Option<String>,
}

/// Appointment columns plus the related names, flattened by PostgREST's
/// spread embeds.
pub const APPOINTMENT_SELECT: &str = "select=*,\
    ...doctors(doctor_name:name,doctor_expertise:expertise),\
    ...patients(patient_name:name),\
    ...health_plans(recurrence_name:name)";

impl Appointment {
    /// Wall-clock end of the consultation. Wraps past midnight.
    pub fn end_time(&self) -> NaiveTime {
        self.time + Duration::minutes(CONSULTATION_MINUTES as i64)
    }

    pub fn status(&self) -> AppointmentStatus {
        if self.is_active {
            AppointmentStatus::Active
        } else {
            AppointmentStatus::Cancelled
        }
    }
}

/// Derived from `is_active`. Cancellation is one-way.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Active,
    Cancelled,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Active => write!(f, "active"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Column values written on insert or full update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppointmentDraft {
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub recurrence_type_id: Uuid,
}

impl From<&Appointment> for AppointmentDraft {
    fn from(appointment: &Appointment) -> Self {
        Self {
            doctor_id: appointment.doctor_id,
            patient_id: appointment.patient_id,
            date: appointment.date,
            time: appointment.time,
            recurrence_type_id: appointment.recurrence_type_id,
        }
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

/// Body of `POST /appointments` and `PUT /appointments/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentRequest {
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    #[serde(deserialize_with = "deserialize_clock_time")]
    pub time: NaiveTime,
    pub recurrence_type_id: Uuid,
}

impl From<AppointmentRequest> for AppointmentDraft {
    fn from(request: AppointmentRequest) -> Self {
        Self {
            doctor_id: request.doctor_id,
            patient_id: request.patient_id,
            date: request.date,
            time: request.time,
            recurrence_type_id: request.recurrence_type_id,
        }
    }
}

/// Body of `PATCH /appointments/{id}`; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatchAppointmentRequest {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "deserialize_optional_clock_time")]
    pub time: Option<NaiveTime>,
    pub recurrence_type_id: Option<Uuid>,
}

impl PatchAppointmentRequest {
    pub fn apply_to(&self, current: &Appointment) -> AppointmentDraft {
        AppointmentDraft {
            doctor_id: self.doctor_id.unwrap_or(current.doctor_id),
            patient_id: self.patient_id.unwrap_or(current.patient_id),
            date: self.date.unwrap_or(current.date),
            time: self.time.unwrap_or(current.time),
            recurrence_type_id: self.recurrence_type_id.unwrap_or(current.recurrence_type_id),
        }
    }
}

/// Body of `POST /appointments/validate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityCheckRequest {
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    #[serde(deserialize_with = "deserialize_clock_time")]
    pub time: NaiveTime,
    pub exclude_appointment_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailabilityCheckResponse {
    pub available: bool,
    pub field: Option<String>,
    pub reason: Option<String>,
}

/// Pass-through filters for listing active appointments.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppointmentFilter {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl AppointmentFilter {
    pub fn for_doctor(doctor_id: Uuid) -> Self {
        Self {
            doctor_id: Some(doctor_id),
            ..Self::default()
        }
    }

    pub fn for_patient(patient_id: Uuid) -> Self {
        Self {
            patient_id: Some(patient_id),
            ..Self::default()
        }
    }

    /// A date range needs both ends, in order.
    pub fn validate(&self) -> Result<(), AppointmentError> {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) if start > end => Err(AppointmentError::ValidationError(
                "start_date must not be after end_date".to_string(),
            )),
            (Some(_), None) | (None, Some(_)) => Err(AppointmentError::ValidationError(
                "start_date and end_date are both required (format: YYYY-MM-DD)".to_string(),
            )),
            _ => Ok(()),
        }
    }

    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.doctor_id.map_or(true, |id| appointment.doctor_id == id)
            && self.patient_id.map_or(true, |id| appointment.patient_id == id)
            && self.date.map_or(true, |date| appointment.date == date)
            && self.start_date.map_or(true, |start| appointment.date >= start)
            && self.end_date.map_or(true, |end| appointment.date <= end)
    }
}

/// API representation: the stored row plus derived `end_time` and `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentResponse {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub end_time: String,
    pub status: AppointmentStatus,
}

impl From<Appointment> for AppointmentResponse {
    fn from(appointment: Appointment) -> Self {
        let end_time = appointment.end_time().format("%H:%M").to_string();
        let status = appointment.status();
        Self {
            appointment,
            end_time,
            status,
        }
    }
}

fn parse_clock_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}

/// Accepts `HH:MM` as well as `HH:MM:SS`.
fn deserialize_clock_time<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_clock_time(&raw).ok_or_else(|| {
        serde::de::Error::custom(format!("invalid time '{}', expected HH:MM", raw))
    })
}

fn deserialize_optional_clock_time<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) => parse_clock_time(&raw).map(Some).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid time '{}', expected HH:MM", raw))
        }),
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Doctor not found or inactive")]
    DoctorNotFound,

    #[error("Patient not found or inactive")]
    PatientNotFound,

    #[error("Health plan not found or inactive")]
    HealthPlanNotFound,

    #[error("You are not allowed to cancel this appointment")]
    Forbidden,

    #[error(transparent)]
    Scheduling(#[from] SchedulingError),

    /// The store's exclusion constraint rejected the write after validation passed.
    #[error("This time slot was just booked by another request")]
    SlotTaken,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::Scheduling(e) => AppError::field(e.field(), e.to_string()),
            AppointmentError::NotFound
            | AppointmentError::DoctorNotFound
            | AppointmentError::PatientNotFound
            | AppointmentError::HealthPlanNotFound => AppError::NotFound(err.to_string()),
            AppointmentError::Forbidden => AppError::Forbidden(err.to_string()),
            AppointmentError::SlotTaken => AppError::Conflict(err.to_string()),
            AppointmentError::ValidationError(msg) => AppError::BadRequest(msg),
            AppointmentError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
