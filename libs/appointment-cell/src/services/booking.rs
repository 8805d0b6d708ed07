// libs/appointment-cell/src/services/booking.rs
use chrono::{Local, NaiveDate};
use tracing::{debug, info, warn};
use uuid::Uuid;
use std::sync::Arc;

use shared_config::AppConfig;

use crate::models::{
    Appointment, AppointmentDraft, AppointmentError, AppointmentFilter, AppointmentRequest,
    AvailabilityCheckRequest, AvailabilityCheckResponse, PatchAppointmentRequest,
};
use crate::services::repository::{AppointmentRepository, SupabaseAppointmentRepository};
use crate::services::validation::{ProposedAppointment, SchedulingError, SchedulingValidator};

/// Appointment write path: every create or move goes through the
/// scheduling validator before it reaches the repository.
pub struct AppointmentBookingService {
    repository: Arc<dyn AppointmentRepository>,
    validator: SchedulingValidator,
    today: Option<NaiveDate>,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig, auth_token: &str) -> Self {
        Self::with_repository(Arc::new(SupabaseAppointmentRepository::new(config, auth_token)))
    }

    pub fn with_repository(repository: Arc<dyn AppointmentRepository>) -> Self {
        Self {
            repository,
            validator: SchedulingValidator::default(),
            today: None,
        }
    }

    /// Pins the date used for the past-date rule.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }

    /// Runs the validator against a fresh snapshot of the doctor's and the
    /// patient's day.
    pub async fn check_proposal(
        &self,
        proposed: &ProposedAppointment,
        editing_id: Option<Uuid>,
    ) -> Result<(), AppointmentError> {
        let today = self.today();

        self.validator.check_bounds(proposed, today).map_err(|e| self.rejected(proposed, e))?;

        let (doctor_day, patient_day) = futures::try_join!(
            self.repository.find_active_by_doctor_and_date(proposed.doctor_id, proposed.date),
            self.repository.find_active_by_patient_and_date(proposed.patient_id, proposed.date),
        )?;

        let mut snapshot = doctor_day;
        snapshot.extend(patient_day.into_iter().filter(|a| a.doctor_id != proposed.doctor_id));

        debug!("Validating proposal against {} existing appointments", snapshot.len());

        self.validator
            .check_conflicts(proposed, &snapshot, editing_id, today)
            .map_err(|e| self.rejected(proposed, e))
    }

    fn rejected(&self, proposed: &ProposedAppointment, e: SchedulingError) -> AppointmentError {
        warn!("Rejected proposal for doctor {} / patient {} on {} at {}: {}",
              proposed.doctor_id, proposed.patient_id, proposed.date, proposed.time, e);
        AppointmentError::Scheduling(e)
    }

    /// Dry run of the validator. Rejections are reported, not raised.
    pub async fn check_availability(
        &self,
        request: AvailabilityCheckRequest,
    ) -> Result<AvailabilityCheckResponse, AppointmentError> {
        let proposed = ProposedAppointment {
            doctor_id: request.doctor_id,
            patient_id: request.patient_id,
            date: request.date,
            time: request.time,
        };

        match self.check_proposal(&proposed, request.exclude_appointment_id).await {
            Ok(()) => Ok(AvailabilityCheckResponse {
                available: true,
                field: None,
                reason: None,
            }),
            Err(AppointmentError::Scheduling(e)) => Ok(e.into()),
            Err(e) => Err(e),
        }
    }

    pub async fn book_appointment(
        &self,
        request: AppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let draft = AppointmentDraft::from(request);
        info!("Booking appointment for doctor {} / patient {} on {} at {}",
              draft.doctor_id, draft.patient_id, draft.date, draft.time);

        self.check_proposal(&proposed_from(&draft), None).await?;

        let appointment = self.repository.insert(&draft).await?;
        info!("Appointment {} booked", appointment.id);

        Ok(appointment)
    }

    /// Full replacement of the appointment's fields.
    pub async fn update_appointment(
        &self,
        appointment_id: Uuid,
        request: AppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        self.get_appointment(appointment_id).await?;
        self.store_update(appointment_id, AppointmentDraft::from(request)).await
    }

    /// Merges the supplied fields into the stored appointment, then
    /// validates the result as a whole.
    pub async fn patch_appointment(
        &self,
        appointment_id: Uuid,
        patch: PatchAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.get_appointment(appointment_id).await?;
        self.store_update(appointment_id, patch.apply_to(&current)).await
    }

    async fn store_update(
        &self,
        appointment_id: Uuid,
        draft: AppointmentDraft,
    ) -> Result<Appointment, AppointmentError> {
        info!("Updating appointment {} to {} at {}", appointment_id, draft.date, draft.time);

        self.check_proposal(&proposed_from(&draft), Some(appointment_id)).await?;

        let appointment = self.repository.update(appointment_id, &draft).await?;
        info!("Appointment {} updated", appointment_id);

        Ok(appointment)
    }

    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.repository.deactivate(appointment_id).await?;
        info!("Appointment {} cancelled", appointment_id);
        Ok(appointment)
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        self.repository
            .find_active_by_id(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound)
    }

    pub async fn search_appointments(
        &self,
        filter: AppointmentFilter,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        filter.validate()?;
        self.repository.list_active(&filter).await
    }
}

fn proposed_from(draft: &AppointmentDraft) -> ProposedAppointment {
    ProposedAppointment {
        doctor_id: draft.doctor_id,
        patient_id: draft.patient_id,
        date: draft.date,
        time: draft.time,
    }
}

impl From<SchedulingError> for AvailabilityCheckResponse {
    fn from(e: SchedulingError) -> Self {
        Self {
            available: false,
            field: Some(e.field().to_string()),
            reason: Some(e.to_string()),
        }
    }
}
