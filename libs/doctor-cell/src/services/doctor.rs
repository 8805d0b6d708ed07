use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Doctor, DoctorError, DoctorSearchQuery};

const DEFAULT_PAGE_SIZE: i32 = 50;

/// Read-only access to the doctors table. Inactive doctors are invisible.
pub struct DoctorService {
    supabase: SupabaseClient,
}

impl DoctorService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn list_doctors(
        &self,
        query: DoctorSearchQuery,
        auth_token: &str,
    ) -> Result<Vec<Doctor>, DoctorError> {
        debug!("Listing doctors with query: {:?}", query);

        let mut query_parts = vec!["is_active=eq.true".to_string()];

        if let Some(name) = query.name.as_deref().filter(|n| !n.trim().is_empty()) {
            query_parts.push(format!("name=ilike.*{}*", urlencoding::encode(name.trim())));
        }
        if let Some(expertise) = query.expertise.as_deref().filter(|e| !e.trim().is_empty()) {
            query_parts.push(format!("expertise=ilike.*{}*", urlencoding::encode(expertise.trim())));
        }

        query_parts.push("order=name.asc".to_string());
        query_parts.push(format!("limit={}", query.limit.unwrap_or(DEFAULT_PAGE_SIZE)));
        query_parts.push(format!("offset={}", query.offset.unwrap_or(0)));

        let path = format!("/rest/v1/doctors?{}", query_parts.join("&"));
        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Doctor>, _>>()
            .map_err(|e| DoctorError::DatabaseError(format!("Failed to parse doctors: {}", e)))
    }

    /// Fetches an active doctor; a missing or deactivated row is `NotFound`.
    pub async fn get_doctor(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<Doctor, DoctorError> {
        debug!("Fetching doctor: {}", doctor_id);

        let path = format!("/rest/v1/doctors?id=eq.{}&is_active=eq.true", doctor_id);
        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        let row = rows.into_iter().next().ok_or(DoctorError::NotFound)?;

        serde_json::from_value(row)
            .map_err(|e| DoctorError::DatabaseError(format!("Failed to parse doctor: {}", e)))
    }
}
