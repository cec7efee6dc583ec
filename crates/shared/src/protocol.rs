//! Wire shapes for the election backend. Field names are camelCase on the
//! wire; the backend mixes success payloads and error flags in the same
//! object, so response structs keep every field optional and let the client
//! interpret the combination.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{CandidateId, DeviceId, Position, SessionToken};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInRequest {
    pub institutional_email: String,
    pub personal_email: String,
    pub matric_number: String,
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInResponse {
    #[serde(default)]
    pub institutional_email: Option<String>,
    #[serde(default)]
    pub session_token: Option<SessionToken>,
    #[serde(default)]
    pub remaining_positions: Option<Vec<Position>>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub already_voted: bool,
    #[serde(default)]
    pub email_blocked: bool,
    #[serde(default)]
    pub device_blocked: bool,
    #[serde(default)]
    pub ip_blocked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub institutional_email: String,
    pub session_token: SessionToken,
    pub candidate_id: CandidateId,
    pub position: Position,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,
}

/// `{ ok }` or `{ error }` acknowledgement used by `POST /api/vote`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteVotingRequest {
    pub institutional_email: String,
    pub session_token: SessionToken,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteVotingResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, rename = "duplicateIP")]
    pub duplicate_ip: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSummary {
    pub id: CandidateId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Per-candidate tally row inside the public results payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateVotes {
    pub name: String,
    pub votes: u64,
}

/// Payload of `GET /api/public/votes`, keyed by position name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsResponse {
    #[serde(default)]
    pub vote_counts: BTreeMap<String, Vec<CandidateVotes>>,
    #[serde(default)]
    pub total_valid_votes: u64,
    #[serde(default)]
    pub total_votes: u64,
    #[serde(default)]
    pub last_updated: Option<String>,
}

/// One row of the public vote log (`GET /api/public/all-votes`). The
/// backend omits fields for legacy rows, so everything is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteLogEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub matric_number: Option<String>,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// `GET /api/admin/votes` returns the raw tally map without the public
/// wrapper fields.
pub type AdminVotesResponse = BTreeMap<String, Vec<CandidateVotes>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminLoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupCounts {
    #[serde(default)]
    pub users: u64,
    #[serde(default)]
    pub votes: u64,
    #[serde(default)]
    pub candidates: u64,
}

/// Payload of `GET /api/backup/status`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupStatus {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub counts: BackupCounts,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_in_request_serializes_camel_case() {
        let request = SignInRequest {
            institutional_email: "a@school.edu".into(),
            personal_email: "a@mail.com".into(),
            matric_number: "22/03sen001".into(),
            full_name: "Ada Obi".into(),
            device_id: None,
        };
        let json = serde_json::to_value(&request).expect("serialize");
        assert!(json.get("institutionalEmail").is_some());
        assert!(json.get("matricNumber").is_some());
        assert!(json.get("deviceId").is_none());
    }

    #[test]
    fn sign_in_response_tolerates_failure_shape() {
        let response: SignInResponse =
            serde_json::from_str(r#"{"error":"invalid matric number","alreadyVoted":true}"#)
                .expect("deserialize");
        assert!(response.already_voted);
        assert_eq!(response.error.as_deref(), Some("invalid matric number"));
        assert!(response.session_token.is_none());
    }

    #[test]
    fn complete_voting_response_reads_duplicate_ip_flag() {
        let response: CompleteVotingResponse =
            serde_json::from_str(r#"{"error":"duplicate network identity","duplicateIP":true}"#)
                .expect("deserialize");
        assert!(response.duplicate_ip);
        assert!(!response.ok);
    }
}
