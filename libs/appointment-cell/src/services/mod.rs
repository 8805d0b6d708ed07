pub mod booking;
pub mod repository;
pub mod validation;

pub use booking::AppointmentBookingService;
pub use repository::{AppointmentRepository, SupabaseAppointmentRepository};
pub use validation::{
    ConsultationWindow, ProposedAppointment, SchedulingError, SchedulingRules,
    SchedulingValidator, TimeViolation,
};
