/*!
 * Entity Identifier Types
 *
 * Distinct nominal types per ID kind so a practitioner id can never be
 * passed where a business id is expected. PMS-originated ids are opaque
 * strings; locally minted ids are UUIDs.
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
        )]
        #[sqlx(transparent)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
        )]
        #[sqlx(transparent)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

uuid_id!(
    /// Locally minted clinic identifier
    ClinicId
);
uuid_id!(
    /// Locally minted patient identifier
    PatientId
);
uuid_id!(
    /// Locally minted appointment identifier
    AppointmentId
);

string_id!(
    /// PMS business (location) identifier
    BusinessId
);
string_id!(
    /// PMS practitioner identifier
    PractitionerId
);
string_id!(
    /// PMS appointment type (service) identifier
    ServiceId
);
string_id!(
    /// Voice call session identifier
    SessionId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_id_round_trip() {
        let id = BusinessId::new("1717010852512540252");
        assert_eq!(id.as_str(), "1717010852512540252");
        assert_eq!(id.to_string(), "1717010852512540252");

        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"1717010852512540252\"");
        let back: BusinessId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_uuid_id_serializes_transparent() {
        let id = ClinicId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: ClinicId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
