use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! name_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

name_newtype!(Position);
name_newtype!(CandidateId);
name_newtype!(SessionToken);
name_newtype!(DeviceId);

impl DeviceId {
    /// Stable per-installation identity, generated once and reused across
    /// sessions so the backend can correlate repeat sign-in attempts.
    pub fn generate() -> Self {
        Self(format!("device-{}", uuid::Uuid::new_v4().simple()))
    }
}

/// Identity fields collected at sign-in. All four are required by the
/// backend; the client rejects blank fields before making the call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterIdentity {
    pub institutional_email: String,
    pub personal_email: String,
    pub matric_number: String,
    pub full_name: String,
}

impl VoterIdentity {
    pub fn is_complete(&self) -> bool {
        !(self.institutional_email.trim().is_empty()
            || self.personal_email.trim().is_empty()
            || self.matric_number.trim().is_empty()
            || self.full_name.trim().is_empty())
    }
}

/// Client-side session established by a successful sign-in. Destroyed on
/// completed voting, explicit logout, or deadline expiry. The backend is
/// the source of truth for recorded votes; this record only makes the
/// wizard resumable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterSession {
    pub institutional_email: String,
    pub session_token: SessionToken,
    pub device_id: Option<DeviceId>,
    pub remaining_positions: Vec<Position>,
    pub deadline: DateTime<Utc>,
}

/// A backend-acknowledged vote buffered locally until the whole ballot is
/// finalized. An entry exists for a position iff the backend accepted a
/// vote for it in the current session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferedVote {
    pub candidate_id: CandidateId,
    pub candidate_name: String,
}
