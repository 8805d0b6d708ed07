// libs/appointment-cell/src/services/validation.rs
use chrono::{NaiveDate, NaiveTime, Timelike};
use tracing::debug;
use uuid::Uuid;

use crate::models::Appointment;

/// Length of every consultation.
pub const CONSULTATION_MINUTES: u32 = 40;

const SECONDS_PER_DAY: u32 = 24 * 60 * 60;

// ==============================================================================
// RULES
// ==============================================================================

/// Fixed scheduling rules of the clinic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulingRules {
    pub consultation_minutes: u32,
    pub opening: NaiveTime,
    pub closing: NaiveTime,
}

impl Default for SchedulingRules {
    fn default() -> Self {
        Self {
            consultation_minutes: CONSULTATION_MINUTES,
            opening: NaiveTime::MIN + chrono::Duration::hours(8),
            closing: NaiveTime::MIN + chrono::Duration::hours(18),
        }
    }
}

impl SchedulingRules {
    /// Today is bookable, anything before it is not.
    pub fn validate_date(&self, date: NaiveDate, today: NaiveDate) -> Result<(), SchedulingError> {
        if date < today {
            return Err(SchedulingError::InvalidDate);
        }
        Ok(())
    }

    pub fn validate_time(&self, time: NaiveTime) -> Result<(), SchedulingError> {
        if time < self.opening || time >= self.closing {
            return Err(SchedulingError::InvalidTime(TimeViolation::OutsideBusinessHours {
                opening: self.opening,
                closing: self.closing,
            }));
        }

        let window = self.window(time);
        if window.end_secs > seconds_of(self.closing) {
            return Err(SchedulingError::InvalidTime(TimeViolation::EndsAfterClosing {
                duration_minutes: self.consultation_minutes,
                closing: self.closing,
            }));
        }

        Ok(())
    }

    pub fn window(&self, start: NaiveTime) -> ConsultationWindow {
        ConsultationWindow::new(start, self.consultation_minutes)
    }
}

fn seconds_of(time: NaiveTime) -> u32 {
    time.num_seconds_from_midnight()
}

fn clock_label(secs: u32) -> String {
    let secs = secs % SECONDS_PER_DAY;
    format!("{:02}:{:02}", secs / 3600, (secs % 3600) / 60)
}

// ==============================================================================
// INTERVALS
// ==============================================================================

/// Half-open `[start, end)` interval in seconds from midnight of the
/// appointment's date. `end` is allowed to run past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsultationWindow {
    pub start_secs: u32,
    pub end_secs: u32,
}

impl ConsultationWindow {
    pub fn new(start: NaiveTime, duration_minutes: u32) -> Self {
        let start_secs = seconds_of(start);
        Self {
            start_secs,
            end_secs: start_secs + duration_minutes * 60,
        }
    }

    /// Adjacent windows (`a.end == b.start`) do not overlap.
    pub fn overlaps(&self, other: &ConsultationWindow) -> bool {
        self.start_secs < other.end_secs && other.start_secs < self.end_secs
    }

    pub fn start_label(&self) -> String {
        clock_label(self.start_secs)
    }

    pub fn end_label(&self) -> String {
        clock_label(self.end_secs)
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeViolation {
    OutsideBusinessHours { opening: NaiveTime, closing: NaiveTime },
    EndsAfterClosing { duration_minutes: u32, closing: NaiveTime },
}

impl std::fmt::Display for TimeViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeViolation::OutsideBusinessHours { opening, closing } => write!(
                f,
                "Time must be between {} and {}.",
                opening.format("%H:%M"),
                closing.format("%H:%M")
            ),
            TimeViolation::EndsAfterClosing { duration_minutes, closing } => write!(
                f,
                "Consultations last {} minutes. This time would end the consultation after {}.",
                duration_minutes,
                closing.format("%H:%M")
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulingError {
    #[error("Cannot schedule an appointment for a past date.")]
    InvalidDate,

    #[error("{0}")]
    InvalidTime(TimeViolation),

    #[error("Schedule conflict! The doctor already has an appointment at {start} (ends at {end}). Consultations last {duration_minutes} minutes.")]
    DoctorConflict {
        appointment_id: Uuid,
        start: String,
        end: String,
        duration_minutes: u32,
    },

    #[error("Schedule conflict! The patient already has an appointment at {start} (ends at {end}). Consultations last {duration_minutes} minutes.")]
    PatientConflict {
        appointment_id: Uuid,
        start: String,
        end: String,
        duration_minutes: u32,
    },
}

impl SchedulingError {
    /// Request field the rejection is reported on.
    pub fn field(&self) -> &'static str {
        match self {
            SchedulingError::InvalidDate => "date",
            SchedulingError::InvalidTime(_)
            | SchedulingError::DoctorConflict { .. }
            | SchedulingError::PatientConflict { .. } => "time",
        }
    }
}

// ==============================================================================
// PIPELINE
// ==============================================================================

/// The appointment a caller wants to create or move to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProposedAppointment {
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

/// Snapshot every check runs against. Candidate lists are already restricted
/// to active rows on the proposed date, minus the edited appointment, and
/// sorted in scan order.
pub struct ValidationContext<'a> {
    pub rules: &'a SchedulingRules,
    pub today: NaiveDate,
    pub doctor_candidates: Vec<&'a Appointment>,
    pub patient_candidates: Vec<&'a Appointment>,
}

impl<'a> ValidationContext<'a> {
    pub fn build(
        rules: &'a SchedulingRules,
        proposed: &ProposedAppointment,
        existing: &'a [Appointment],
        editing_id: Option<Uuid>,
        today: NaiveDate,
    ) -> Self {
        let relevant = |a: &&Appointment| {
            a.is_active && a.date == proposed.date && Some(a.id) != editing_id
        };

        let mut doctor_candidates: Vec<&Appointment> = existing
            .iter()
            .filter(relevant)
            .filter(|a| a.doctor_id == proposed.doctor_id)
            .collect();
        let mut patient_candidates: Vec<&Appointment> = existing
            .iter()
            .filter(relevant)
            .filter(|a| a.patient_id == proposed.patient_id)
            .collect();

        sort_in_scan_order(&mut doctor_candidates);
        sort_in_scan_order(&mut patient_candidates);

        Self {
            rules,
            today,
            doctor_candidates,
            patient_candidates,
        }
    }
}

/// Start time, then creation time, then id.
pub fn sort_in_scan_order(appointments: &mut [&Appointment]) {
    appointments.sort_by(|a, b| {
        a.time
            .cmp(&b.time)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
}

pub type Check = fn(&ProposedAppointment, &ValidationContext<'_>) -> Result<(), SchedulingError>;

/// Executed in order; the first failure wins.
pub const PIPELINE: [(&str, Check); 4] = [
    ("date", check_date),
    ("time", check_time),
    ("doctor_conflict", check_doctor_conflict),
    ("patient_conflict", check_patient_conflict),
];

/// Leading `PIPELINE` entries that need no stored appointments.
pub const BOUNDS_CHECKS: usize = 2;

fn check_date(proposed: &ProposedAppointment, ctx: &ValidationContext<'_>) -> Result<(), SchedulingError> {
    ctx.rules.validate_date(proposed.date, ctx.today)
}

fn check_time(proposed: &ProposedAppointment, ctx: &ValidationContext<'_>) -> Result<(), SchedulingError> {
    ctx.rules.validate_time(proposed.time)
}

fn first_overlap<'a>(
    rules: &SchedulingRules,
    proposed: &ProposedAppointment,
    candidates: &[&'a Appointment],
) -> Option<(&'a Appointment, ConsultationWindow)> {
    let window = rules.window(proposed.time);
    candidates.iter().find_map(|existing| {
        let existing_window = rules.window(existing.time);
        window
            .overlaps(&existing_window)
            .then_some((*existing, existing_window))
    })
}

fn check_doctor_conflict(
    proposed: &ProposedAppointment,
    ctx: &ValidationContext<'_>,
) -> Result<(), SchedulingError> {
    match first_overlap(ctx.rules, proposed, &ctx.doctor_candidates) {
        Some((existing, window)) => Err(SchedulingError::DoctorConflict {
            appointment_id: existing.id,
            start: window.start_label(),
            end: window.end_label(),
            duration_minutes: ctx.rules.consultation_minutes,
        }),
        None => Ok(()),
    }
}

fn check_patient_conflict(
    proposed: &ProposedAppointment,
    ctx: &ValidationContext<'_>,
) -> Result<(), SchedulingError> {
    match first_overlap(ctx.rules, proposed, &ctx.patient_candidates) {
        Some((existing, window)) => Err(SchedulingError::PatientConflict {
            appointment_id: existing.id,
            start: window.start_label(),
            end: window.end_label(),
            duration_minutes: ctx.rules.consultation_minutes,
        }),
        None => Ok(()),
    }
}

/// Stateless scheduling validator.
#[derive(Debug, Clone, Default)]
pub struct SchedulingValidator {
    rules: SchedulingRules,
}

impl SchedulingValidator {
    pub fn new(rules: SchedulingRules) -> Self {
        Self { rules }
    }

    fn run(
        &self,
        checks: &[(&str, Check)],
        proposed: &ProposedAppointment,
        ctx: &ValidationContext<'_>,
    ) -> Result<(), SchedulingError> {
        for (name, check) in checks {
            if let Err(e) = check(proposed, ctx) {
                debug!("Proposal for doctor {} on {} {} failed check '{}'",
                       proposed.doctor_id, proposed.date, proposed.time, name);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Date and time rules only. Runs before the day's appointments are loaded.
    pub fn check_bounds(
        &self,
        proposed: &ProposedAppointment,
        today: NaiveDate,
    ) -> Result<(), SchedulingError> {
        let ctx = ValidationContext::build(&self.rules, proposed, &[], None, today);
        self.run(&PIPELINE[..BOUNDS_CHECKS], proposed, &ctx)
    }

    /// Doctor then patient overlap, for a proposal whose bounds already passed.
    pub fn check_conflicts(
        &self,
        proposed: &ProposedAppointment,
        existing: &[Appointment],
        editing_id: Option<Uuid>,
        today: NaiveDate,
    ) -> Result<(), SchedulingError> {
        let ctx = ValidationContext::build(&self.rules, proposed, existing, editing_id, today);
        self.run(&PIPELINE[BOUNDS_CHECKS..], proposed, &ctx)
    }

    /// Whole pipeline. `existing` may hold anything; only active rows on the
    /// proposed date for the same doctor or patient are considered.
    pub fn validate(
        &self,
        proposed: &ProposedAppointment,
        existing: &[Appointment],
        editing_id: Option<Uuid>,
        today: NaiveDate,
    ) -> Result<(), SchedulingError> {
        self.check_bounds(proposed, today)?;
        self.check_conflicts(proposed, existing, editing_id, today)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{Duration, TimeZone, Utc};

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 5, 10).unwrap()
    }

    fn existing(doctor_id: Uuid, patient_id: Uuid, time: NaiveTime) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            doctor_id,
            patient_id,
            date: today(),
            time,
            recurrence_type_id: Uuid::new_v4(),
            is_active: true,
            created_at: Utc.with_ymd_and_hms(2030, 5, 1, 12, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2030, 5, 1, 12, 0, 0).unwrap(),
            labels: Default::default(),
        }
    }

    fn proposal(doctor_id: Uuid, patient_id: Uuid, time: NaiveTime) -> ProposedAppointment {
        ProposedAppointment {
            doctor_id,
            patient_id,
            date: today(),
            time,
        }
    }

    #[test]
    fn business_hour_boundaries() {
        let rules = SchedulingRules::default();

        assert!(rules.validate_time(t(8, 0)).is_ok());
        assert!(rules.validate_time(t(17, 20)).is_ok());

        assert_matches!(
            rules.validate_time(t(7, 59)),
            Err(SchedulingError::InvalidTime(TimeViolation::OutsideBusinessHours { .. }))
        );
        assert_matches!(
            rules.validate_time(t(17, 21)),
            Err(SchedulingError::InvalidTime(TimeViolation::EndsAfterClosing { .. }))
        );
        assert_matches!(
            rules.validate_time(t(17, 59)),
            Err(SchedulingError::InvalidTime(TimeViolation::EndsAfterClosing { .. }))
        );
        assert_matches!(
            rules.validate_time(t(18, 0)),
            Err(SchedulingError::InvalidTime(TimeViolation::OutsideBusinessHours { .. }))
        );
    }

    #[test]
    fn past_dates_are_rejected() {
        let rules = SchedulingRules::default();

        assert_eq!(
            rules.validate_date(today() - Duration::days(1), today()),
            Err(SchedulingError::InvalidDate)
        );
        assert!(rules.validate_date(today(), today()).is_ok());
        assert!(rules.validate_date(today() + Duration::days(30), today()).is_ok());
    }

    #[test]
    fn overlap_is_half_open_and_symmetric() {
        let a = ConsultationWindow::new(t(9, 0), 40);
        let adjacent = ConsultationWindow::new(t(9, 40), 40);
        let inside = ConsultationWindow::new(t(9, 20), 40);

        assert!(!a.overlaps(&adjacent));
        assert!(!adjacent.overlaps(&a));
        assert!(a.overlaps(&inside));
        assert!(inside.overlaps(&a));
        assert!(a.overlaps(&a));
    }

    #[test]
    fn windows_near_midnight_do_not_wrap() {
        let late = ConsultationWindow::new(t(23, 50), 40);
        let early = ConsultationWindow::new(t(0, 10), 40);

        assert!(!late.overlaps(&early));
        assert_eq!(late.end_label(), "00:30");
    }

    #[test]
    fn same_doctor_overlap_is_a_doctor_conflict() {
        let doctor = Uuid::new_v4();
        let booked = existing(doctor, Uuid::new_v4(), t(9, 0));
        let validator = SchedulingValidator::default();

        let result = validator.validate(
            &proposal(doctor, Uuid::new_v4(), t(9, 20)),
            &[booked.clone()],
            None,
            today(),
        );

        let err = result.unwrap_err();
        assert_eq!(err.field(), "time");
        assert_matches!(
            err,
            SchedulingError::DoctorConflict { appointment_id, ref start, ref end, duration_minutes: 40 }
                if appointment_id == booked.id && start == "09:00" && end == "09:40"
        );
    }

    #[test]
    fn back_to_back_is_allowed() {
        let doctor = Uuid::new_v4();
        let validator = SchedulingValidator::default();

        let result = validator.validate(
            &proposal(doctor, Uuid::new_v4(), t(9, 40)),
            &[existing(doctor, Uuid::new_v4(), t(9, 0))],
            None,
            today(),
        );

        assert!(result.is_ok());
    }

    #[test]
    fn patient_conflict_with_a_different_doctor() {
        let patient = Uuid::new_v4();
        let validator = SchedulingValidator::default();

        let result = validator.validate(
            &proposal(Uuid::new_v4(), patient, t(10, 10)),
            &[existing(Uuid::new_v4(), patient, t(10, 0))],
            None,
            today(),
        );

        assert_matches!(result, Err(SchedulingError::PatientConflict { .. }));
    }

    #[test]
    fn doctor_conflict_is_reported_before_patient_conflict() {
        let doctor = Uuid::new_v4();
        let patient = Uuid::new_v4();
        let validator = SchedulingValidator::default();

        let result = validator.validate(
            &proposal(doctor, patient, t(11, 0)),
            &[
                existing(Uuid::new_v4(), patient, t(11, 0)),
                existing(doctor, Uuid::new_v4(), t(11, 30)),
            ],
            None,
            today(),
        );

        assert_matches!(result, Err(SchedulingError::DoctorConflict { ref start, .. }) if start == "11:30");
    }

    #[test]
    fn first_conflict_in_scan_order_wins() {
        let doctor = Uuid::new_v4();
        let validator = SchedulingValidator::default();

        let later = existing(doctor, Uuid::new_v4(), t(14, 30));
        let earlier = existing(doctor, Uuid::new_v4(), t(13, 50));

        let result = validator.validate(
            &proposal(doctor, Uuid::new_v4(), t(14, 10)),
            &[later, earlier.clone()],
            None,
            today(),
        );

        assert_matches!(
            result,
            Err(SchedulingError::DoctorConflict { appointment_id, .. }) if appointment_id == earlier.id
        );
    }

    #[test]
    fn equal_start_times_fall_back_to_creation_order() {
        let doctor = Uuid::new_v4();
        let mut first = existing(doctor, Uuid::new_v4(), t(15, 0));
        let mut second = existing(doctor, Uuid::new_v4(), t(15, 0));
        first.created_at = Utc.with_ymd_and_hms(2030, 4, 1, 8, 0, 0).unwrap();
        second.created_at = Utc.with_ymd_and_hms(2030, 4, 2, 8, 0, 0).unwrap();

        let mut candidates = vec![&second, &first];
        sort_in_scan_order(&mut candidates);

        assert_eq!(candidates[0].id, first.id);
    }

    #[test]
    fn editing_excludes_the_appointment_itself() {
        let doctor = Uuid::new_v4();
        let patient = Uuid::new_v4();
        let booked = existing(doctor, patient, t(9, 0));
        let validator = SchedulingValidator::default();

        let unchanged = proposal(doctor, patient, t(9, 0));
        assert!(validator
            .validate(&unchanged, &[booked.clone()], Some(booked.id), today())
            .is_ok());

        let shifted = proposal(doctor, patient, t(9, 20));
        assert!(validator
            .validate(&shifted, &[booked.clone()], Some(booked.id), today())
            .is_ok());
    }

    #[test]
    fn cancelled_appointments_do_not_block() {
        let doctor = Uuid::new_v4();
        let mut cancelled = existing(doctor, Uuid::new_v4(), t(9, 0));
        cancelled.is_active = false;
        let validator = SchedulingValidator::default();

        let result = validator.validate(
            &proposal(doctor, Uuid::new_v4(), t(9, 0)),
            &[cancelled],
            None,
            today(),
        );

        assert!(result.is_ok());
    }

    #[test]
    fn other_dates_are_ignored() {
        let doctor = Uuid::new_v4();
        let mut tomorrow = existing(doctor, Uuid::new_v4(), t(9, 0));
        tomorrow.date = today() + Duration::days(1);
        let validator = SchedulingValidator::default();

        let result = validator.validate(
            &proposal(doctor, Uuid::new_v4(), t(9, 0)),
            &[tomorrow],
            None,
            today(),
        );

        assert!(result.is_ok());
    }

    #[test]
    fn date_is_checked_before_time() {
        let validator = SchedulingValidator::default();
        let mut past = proposal(Uuid::new_v4(), Uuid::new_v4(), t(6, 0));
        past.date = today() - Duration::days(3);

        let err = validator.validate(&past, &[], None, today()).unwrap_err();
        assert_eq!(err, SchedulingError::InvalidDate);
        assert_eq!(err.field(), "date");
    }

    #[test]
    fn conflict_message_names_the_booked_slot() {
        let err = SchedulingError::PatientConflict {
            appointment_id: Uuid::nil(),
            start: "10:00".to_string(),
            end: "10:40".to_string(),
            duration_minutes: 40,
        };
        let message = err.to_string();
        assert!(message.contains("10:00"));
        assert!(message.contains("10:40"));
        assert_eq!(err.field(), "time");
    }

    #[test]
    fn bounds_stage_ignores_existing_appointments() {
        let doctor = Uuid::new_v4();
        let validator = SchedulingValidator::default();
        let proposed = proposal(doctor, Uuid::new_v4(), t(9, 0));

        assert!(validator.check_bounds(&proposed, today()).is_ok());
        assert_matches!(
            validator.check_conflicts(&proposed, &[existing(doctor, Uuid::new_v4(), t(9, 0))], None, today()),
            Err(SchedulingError::DoctorConflict { .. })
        );
        assert_matches!(
            validator.check_bounds(&proposal(doctor, Uuid::new_v4(), t(18, 0)), today()),
            Err(SchedulingError::InvalidTime(_))
        );
    }

    #[test]
    fn pipeline_stages_split_bounds_from_conflicts() {
        let names: Vec<&str> = PIPELINE.iter().map(|(name, _)| *name).collect();
        assert_eq!(&names[..BOUNDS_CHECKS], &["date", "time"]);
        assert_eq!(&names[BOUNDS_CHECKS..], &["doctor_conflict", "patient_conflict"]);
    }
}
