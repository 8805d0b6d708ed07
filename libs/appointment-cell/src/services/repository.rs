// libs/appointment-cell/src/services/repository.rs
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, error};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{SupabaseClient, SupabaseError};

use crate::models::{
    Appointment, AppointmentDraft, AppointmentError, AppointmentFilter, APPOINTMENT_SELECT,
};

/// Storage seam for appointments. Every `find`/`list` only sees active rows.
#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    async fn find_active_by_id(&self, id: Uuid) -> Result<Option<Appointment>, AppointmentError>;

    /// Active appointments of a doctor on a date, in scan order.
    async fn find_active_by_doctor_and_date(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, AppointmentError>;

    /// Active appointments of a patient on a date, in scan order.
    async fn find_active_by_patient_and_date(
        &self,
        patient_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, AppointmentError>;

    /// Newest date first, then latest time first.
    async fn list_active(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, AppointmentError>;

    async fn insert(&self, draft: &AppointmentDraft) -> Result<Appointment, AppointmentError>;

    /// Fails with `NotFound` when the row is missing or already cancelled.
    async fn update(&self, id: Uuid, draft: &AppointmentDraft) -> Result<Appointment, AppointmentError>;

    /// Soft delete. Fails with `NotFound` when there is no active row to cancel.
    async fn deactivate(&self, id: Uuid) -> Result<Appointment, AppointmentError>;
}

const SCAN_ORDER: &str = "order=time.asc,created_at.asc,id.asc";
const LIST_ORDER: &str = "order=date.desc,time.desc";

/// PostgREST-backed repository scoped to one caller's token.
pub struct SupabaseAppointmentRepository {
    supabase: SupabaseClient,
    auth_token: String,
}

impl SupabaseAppointmentRepository {
    pub fn new(config: &AppConfig, auth_token: impl Into<String>) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            auth_token: auth_token.into(),
        }
    }

    async fn select(&self, query: &str) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!("/rest/v1/appointments?{}&{}", query, APPOINTMENT_SELECT);
        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &path, Some(&self.auth_token), None)
            .await
            .map_err(map_store_error)?;

        parse_rows(rows)
    }

    async fn write(&self, method: Method, path: &str, body: Value) -> Result<Vec<Appointment>, AppointmentError> {
        let rows: Vec<Value> = self.supabase
            .request_returning(method, path, Some(&self.auth_token), body)
            .await
            .map_err(map_store_error)?;

        parse_rows(rows)
    }
}

fn parse_rows(rows: Vec<Value>) -> Result<Vec<Appointment>, AppointmentError> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<Appointment>, _>>()
        .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e)))
}

/// The exclusion constraints surface as 409s from PostgREST.
fn map_store_error(err: SupabaseError) -> AppointmentError {
    match err {
        SupabaseError::Conflict(msg) => {
            error!("Store rejected overlapping appointment: {}", msg);
            AppointmentError::SlotTaken
        }
        other => AppointmentError::DatabaseError(other.to_string()),
    }
}

fn draft_body(draft: &AppointmentDraft) -> Value {
    json!({
        "doctor_id": draft.doctor_id,
        "patient_id": draft.patient_id,
        "date": draft.date.format("%Y-%m-%d").to_string(),
        "time": draft.time.format("%H:%M:%S").to_string(),
        "recurrence_type_id": draft.recurrence_type_id,
    })
}

fn filter_query(filter: &AppointmentFilter) -> String {
    let mut query_parts = vec!["is_active=eq.true".to_string()];

    if let Some(doctor_id) = filter.doctor_id {
        query_parts.push(format!("doctor_id=eq.{}", doctor_id));
    }
    if let Some(patient_id) = filter.patient_id {
        query_parts.push(format!("patient_id=eq.{}", patient_id));
    }
    if let Some(date) = filter.date {
        query_parts.push(format!("date=eq.{}", date));
    }
    if let Some(start) = filter.start_date {
        query_parts.push(format!("date=gte.{}", start));
    }
    if let Some(end) = filter.end_date {
        query_parts.push(format!("date=lte.{}", end));
    }

    query_parts.push(LIST_ORDER.to_string());
    query_parts.join("&")
}

#[async_trait]
impl AppointmentRepository for SupabaseAppointmentRepository {
    async fn find_active_by_id(&self, id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        debug!("Fetching appointment: {}", id);
        let rows = self.select(&format!("id=eq.{}&is_active=eq.true", id)).await?;
        Ok(rows.into_iter().next())
    }

    async fn find_active_by_doctor_and_date(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Scanning appointments of doctor {} on {}", doctor_id, date);
        self.select(&format!(
            "doctor_id=eq.{}&date=eq.{}&is_active=eq.true&{}",
            doctor_id, date, SCAN_ORDER
        ))
        .await
    }

    async fn find_active_by_patient_and_date(
        &self,
        patient_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Scanning appointments of patient {} on {}", patient_id, date);
        self.select(&format!(
            "patient_id=eq.{}&date=eq.{}&is_active=eq.true&{}",
            patient_id, date, SCAN_ORDER
        ))
        .await
    }

    async fn list_active(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Listing appointments with filter: {:?}", filter);
        self.select(&filter_query(filter)).await
    }

    async fn insert(&self, draft: &AppointmentDraft) -> Result<Appointment, AppointmentError> {
        let mut body = draft_body(draft);
        body["is_active"] = json!(true);

        let path = format!("/rest/v1/appointments?{}", APPOINTMENT_SELECT);
        self.write(Method::POST, &path, body)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppointmentError::DatabaseError("Insert returned no row".to_string()))
    }

    async fn update(&self, id: Uuid, draft: &AppointmentDraft) -> Result<Appointment, AppointmentError> {
        let mut body = draft_body(draft);
        body["updated_at"] = json!(Utc::now().to_rfc3339());

        let path = format!("/rest/v1/appointments?id=eq.{}&is_active=eq.true&{}", id, APPOINTMENT_SELECT);
        self.write(Method::PATCH, &path, body)
            .await?
            .into_iter()
            .next()
            .ok_or(AppointmentError::NotFound)
    }

    async fn deactivate(&self, id: Uuid) -> Result<Appointment, AppointmentError> {
        let body = json!({
            "is_active": false,
            "updated_at": Utc::now().to_rfc3339(),
        });

        let path = format!("/rest/v1/appointments?id=eq.{}&is_active=eq.true&{}", id, APPOINTMENT_SELECT);
        self.write(Method::PATCH, &path, body)
            .await?
            .into_iter()
            .next()
            .ok_or(AppointmentError::NotFound)
    }
}
