/*!
 * PMS Error Taxonomy
 *
 * Typed errors surfaced by the PMS client. The client never rewrites
 * user-facing messages; upper layers decide what the voice agent hears.
 */

use thiserror::Error;

use crate::utils::errors::{AppError, ErrorCode};

/// Errors surfaced by the PMS client
#[derive(Debug, Clone, Error)]
pub enum PmsError {
    #[error("PMS credentials rejected")]
    Unauthorized,
    #[error("PMS denied access to the resource")]
    Forbidden,
    #[error("PMS resource not found")]
    NotFound,
    #[error("PMS rate limit exceeded")]
    RateLimited,
    #[error("availability window invalid: {0}")]
    InvalidTimeFrame(String),
    #[error("slot no longer available")]
    SlotTaken,
    #[error("requested time is outside business hours")]
    OutsideBusinessHours,
    #[error("transient PMS failure: {0}")]
    Transient(String),
    #[error("PMS error: {0}")]
    Upstream(String),
}

impl PmsError {
    /// Whether a retry can possibly succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Transient(_))
    }
}

impl From<reqwest::Error> for PmsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            Self::Transient(err.to_string())
        } else {
            Self::Upstream(err.to_string())
        }
    }
}

impl From<PmsError> for AppError {
    fn from(err: PmsError) -> Self {
        let code = match &err {
            PmsError::Unauthorized | PmsError::Forbidden => ErrorCode::UpstreamError,
            PmsError::NotFound => ErrorCode::UpstreamError,
            PmsError::RateLimited => ErrorCode::RateLimited,
            PmsError::InvalidTimeFrame(_) => ErrorCode::InvalidDate,
            PmsError::SlotTaken => ErrorCode::SlotTaken,
            PmsError::OutsideBusinessHours => ErrorCode::OutsideBusinessHours,
            PmsError::Transient(_) => ErrorCode::NetworkError,
            PmsError::Upstream(_) => ErrorCode::UpstreamError,
        };
        AppError::new(code, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(PmsError::RateLimited.is_retryable());
        assert!(PmsError::Transient("connection reset".into()).is_retryable());
        assert!(!PmsError::SlotTaken.is_retryable());
        assert!(!PmsError::Unauthorized.is_retryable());
    }

    #[test]
    fn test_maps_to_stable_codes() {
        let app: AppError = PmsError::SlotTaken.into();
        assert_eq!(app.code, ErrorCode::SlotTaken);
        let app: AppError = PmsError::RateLimited.into();
        assert_eq!(app.code, ErrorCode::RateLimited);
    }
}
