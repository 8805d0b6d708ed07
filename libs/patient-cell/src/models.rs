use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::error::AppError;

/// Patient record, linked one-to-one to an account identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    pub id: Uuid,
    /// Account identity (JWT `sub`) that owns this record.
    pub user_id: String,
    pub name: String,
    pub phone: String,
    pub health_plan_id: Uuid,
    /// Embedded from `health_plans` when the row is read through `PATIENT_SELECT`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_plan_name: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Patient columns plus the plan name, flattened by PostgREST's spread embed.
pub const PATIENT_SELECT: &str = "select=*,...health_plans(health_plan_name:name)";

impl Patient {
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}

/// Health plan. Appointments also reference it as their "recurrence type" label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthPlan {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientSearchQuery {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub health_plan_id: Option<Uuid>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

#[derive(Debug, thiserror::Error)]
pub enum PatientError {
    #[error("Patient not found or inactive")]
    NotFound,

    #[error("No patient record found for this user")]
    NoPatientForUser,

    #[error("Health plan not found or inactive")]
    HealthPlanNotFound,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<PatientError> for AppError {
    fn from(err: PatientError) -> Self {
        match err {
            PatientError::NotFound
            | PatientError::NoPatientForUser
            | PatientError::HealthPlanNotFound => AppError::NotFound(err.to_string()),
            PatientError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
