/*!
 * Data Models Module
 *
 * Contains database models, identifier types, and webhook schemas.
 */

pub mod appointment;
pub mod cache;
pub mod clinic;
pub mod ids;
pub mod patient;
pub mod practitioner;
pub mod service;
pub mod session;
pub mod webhook;

pub use appointment::{Appointment, AppointmentStatus};
pub use cache::{
    AvailabilityCacheEntry, CacheTier, PatientLookupEntry, ServiceMatchEntry,
};
pub use clinic::{Clinic, Location};
pub use ids::{
    AppointmentId, BusinessId, ClinicId, PatientId, PractitionerId, ServiceId, SessionId,
};
pub use patient::Patient;
pub use practitioner::{weekday_index, Practitioner, ScheduleBlock};
pub use service::Service;
pub use session::{BookingContext, BookingLock, FailedBookingAttempt, SlotKey};
pub use webhook::{
    AvailablePractitionersPayload, AvailablePractitionersRequest, BookAppointmentRequest,
    BookingPayload, CancelAppointmentRequest, CancellationPayload, CheckAvailabilityPayload,
    CheckAvailabilityRequest, ConfirmLocationPayload, ConfirmLocationRequest,
    FindNextAvailablePayload, FindNextAvailableRequest, LocationInfo,
    LocationPractitionersPayload, LocationPractitionersRequest, PractitionerInfo,
    PractitionerInfoPayload, PractitionerQueryRequest, PractitionerServicesPayload,
    RejectSlotsPayload, RejectSlotsRequest, ResolveLocationPayload, ResolveLocationRequest,
    ServiceInfo, TimeSlotInfo, WebhookEnvelope,
};
