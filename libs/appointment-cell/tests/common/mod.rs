#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use appointment_cell::{
    Appointment, AppointmentDraft, AppointmentError, AppointmentFilter, AppointmentLabels,
    AppointmentRepository,
};

/// Repository backed by a vector, for exercising the booking service
/// without a store.
#[derive(Default)]
pub struct InMemoryAppointmentRepository {
    rows: Mutex<Vec<Appointment>>,
    day_scans: AtomicUsize,
}

impl InMemoryAppointmentRepository {
    pub fn with_rows(rows: Vec<Appointment>) -> Self {
        Self {
            rows: Mutex::new(rows),
            day_scans: AtomicUsize::new(0),
        }
    }

    pub fn rows(&self) -> Vec<Appointment> {
        self.rows.lock().unwrap().clone()
    }

    /// Doctor and patient day scans served so far.
    pub fn day_scans(&self) -> usize {
        self.day_scans.load(Ordering::SeqCst)
    }

    fn active_where(&self, keep: impl Fn(&Appointment) -> bool) -> Vec<Appointment> {
        let mut rows: Vec<Appointment> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.is_active && keep(a))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.time
                .cmp(&b.time)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        rows
    }
}

#[async_trait]
impl AppointmentRepository for InMemoryAppointmentRepository {
    async fn find_active_by_id(&self, id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        Ok(self.active_where(|a| a.id == id).into_iter().next())
    }

    async fn find_active_by_doctor_and_date(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.day_scans.fetch_add(1, Ordering::SeqCst);
        Ok(self.active_where(|a| a.doctor_id == doctor_id && a.date == date))
    }

    async fn find_active_by_patient_and_date(
        &self,
        patient_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.day_scans.fetch_add(1, Ordering::SeqCst);
        Ok(self.active_where(|a| a.patient_id == patient_id && a.date == date))
    }

    async fn list_active(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, AppointmentError> {
        let mut rows = self.active_where(|a| filter.matches(a));
        rows.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.time.cmp(&a.time)));
        Ok(rows)
    }

    async fn insert(&self, draft: &AppointmentDraft) -> Result<Appointment, AppointmentError> {
        let now = Utc::now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            doctor_id: draft.doctor_id,
            patient_id: draft.patient_id,
            date: draft.date,
            time: draft.time,
            recurrence_type_id: draft.recurrence_type_id,
            is_active: true,
            created_at: now,
            updated_at: now,
            labels: AppointmentLabels::default(),
        };
        self.rows.lock().unwrap().push(appointment.clone());
        Ok(appointment)
    }

    async fn update(&self, id: Uuid, draft: &AppointmentDraft) -> Result<Appointment, AppointmentError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|a| a.id == id && a.is_active)
            .ok_or(AppointmentError::NotFound)?;
        row.doctor_id = draft.doctor_id;
        row.patient_id = draft.patient_id;
        row.date = draft.date;
        row.time = draft.time;
        row.recurrence_type_id = draft.recurrence_type_id;
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn deactivate(&self, id: Uuid) -> Result<Appointment, AppointmentError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|a| a.id == id && a.is_active)
            .ok_or(AppointmentError::NotFound)?;
        row.is_active = false;
        row.updated_at = Utc::now();
        Ok(row.clone())
    }
}

pub fn clinic_today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 6, 3).unwrap()
}

pub fn at(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

pub fn appointment(doctor_id: Uuid, patient_id: Uuid, date: NaiveDate, time: NaiveTime) -> Appointment {
    let created = Utc::now() - Duration::days(1);
    Appointment {
        id: Uuid::new_v4(),
        doctor_id,
        patient_id,
        date,
        time,
        recurrence_type_id: Uuid::new_v4(),
        is_active: true,
        created_at: created,
        updated_at: created,
        labels: AppointmentLabels::default(),
    }
}
