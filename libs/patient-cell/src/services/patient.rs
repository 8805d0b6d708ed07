use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Patient, PatientError, PatientSearchQuery, PATIENT_SELECT};

pub struct PatientService {
    supabase: SupabaseClient,
}

impl PatientService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn get_patient(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        debug!("Fetching patient: {}", patient_id);

        let path = format!(
            "/rest/v1/patients?id=eq.{}&is_active=eq.true&{}",
            patient_id, PATIENT_SELECT
        );
        self.fetch_one(&path, auth_token)
            .await?
            .ok_or(PatientError::NotFound)
    }

    /// Patient record owned by the given account identity.
    pub async fn get_patient_by_user(
        &self,
        user_id: &str,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        debug!("Fetching patient for user: {}", user_id);

        let path = format!(
            "/rest/v1/patients?user_id=eq.{}&is_active=eq.true&{}",
            urlencoding::encode(user_id),
            PATIENT_SELECT
        );
        self.fetch_one(&path, auth_token)
            .await?
            .ok_or(PatientError::NoPatientForUser)
    }

    pub async fn search_patients(
        &self,
        query: PatientSearchQuery,
        auth_token: &str,
    ) -> Result<Vec<Patient>, PatientError> {
        debug!("Searching patients with query: {:?}", query);

        let mut query_parts = vec!["is_active=eq.true".to_string(), PATIENT_SELECT.to_string()];

        if let Some(name) = query.name.as_deref().filter(|n| !n.trim().is_empty()) {
            query_parts.push(format!("name=ilike.*{}*", urlencoding::encode(name.trim())));
        }
        if let Some(phone) = query.phone.as_deref().filter(|p| !p.trim().is_empty()) {
            query_parts.push(format!("phone=ilike.*{}*", urlencoding::encode(phone.trim())));
        }
        if let Some(plan_id) = query.health_plan_id {
            query_parts.push(format!("health_plan_id=eq.{}", plan_id));
        }

        query_parts.push("order=name.asc".to_string());
        query_parts.push(format!("limit={}", query.limit.unwrap_or(50)));
        query_parts.push(format!("offset={}", query.offset.unwrap_or(0)));

        let path = format!("/rest/v1/patients?{}", query_parts.join("&"));
        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Patient>, _>>()
            .map_err(|e| PatientError::DatabaseError(format!("Failed to parse patients: {}", e)))
    }

    async fn fetch_one(&self, path: &str, auth_token: &str) -> Result<Option<Patient>, PatientError> {
        let rows: Vec<Value> = self.supabase
            .request(Method::GET, path, Some(auth_token), None)
            .await
            .map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .next()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| PatientError::DatabaseError(format!("Failed to parse patient: {}", e)))
    }
}
