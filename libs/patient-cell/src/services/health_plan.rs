use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{HealthPlan, PatientError};

pub struct HealthPlanService {
    supabase: SupabaseClient,
}

impl HealthPlanService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn list_health_plans(&self, auth_token: &str) -> Result<Vec<HealthPlan>, PatientError> {
        let rows: Vec<Value> = self.supabase
            .request(
                Method::GET,
                "/rest/v1/health_plans?is_active=eq.true&order=name.asc",
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<HealthPlan>, _>>()
            .map_err(|e| PatientError::DatabaseError(format!("Failed to parse health plans: {}", e)))
    }

    pub async fn get_health_plan(
        &self,
        plan_id: Uuid,
        auth_token: &str,
    ) -> Result<HealthPlan, PatientError> {
        debug!("Fetching health plan: {}", plan_id);

        let path = format!("/rest/v1/health_plans?id=eq.{}&is_active=eq.true", plan_id);
        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        let row = rows.into_iter().next().ok_or(PatientError::HealthPlanNotFound)?;

        serde_json::from_value(row)
            .map_err(|e| PatientError::DatabaseError(format!("Failed to parse health plan: {}", e)))
    }
}
