/*!
 * PMS Client Module
 *
 * The single outbound adapter to the external practice-management system.
 */

pub mod client;
pub mod error;
pub mod types;

pub use client::{PmsClient, PmsClientFactory, MAX_AVAILABILITY_SPAN_DAYS};
pub use error::PmsError;
