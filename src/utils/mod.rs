/*!
 * Utilities Module
 *
 * Contains utility functions for error handling, time conversion,
 * and validation.
 */

pub mod errors;
pub mod time;
pub mod validators;

pub use errors::{AppError, ErrorCode, Result};
pub use validators::{split_patient_name, PhoneValidator};
