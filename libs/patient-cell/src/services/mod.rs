pub mod health_plan;
pub mod patient;

pub use health_plan::HealthPlanService;
pub use patient::PatientService;
