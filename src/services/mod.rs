/*!
 * Services Module
 *
 * Contains business logic and service layer implementations.
 */

pub mod availability_service;
pub mod booking_service;
pub mod catalog_service;
pub mod patient_service;
pub mod session_service;

pub use availability_service::{
    AvailabilityService, DayAvailability, FoundSlot, NextAvailableQuery,
};
pub use booking_service::{
    BookingConfirmation, BookingService, CancelBookingRequest, CreateBookingRequest,
};
pub use catalog_service::CatalogService;
pub use patient_service::PatientService;
pub use session_service::{SessionService, SlotFilter};
