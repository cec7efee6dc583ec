//! Read-only clients for the public results page, the vote log, the
//! admin tally, and the backup endpoints. No local state; every call is a
//! plain fetch against the backend.

use reqwest::{Client, StatusCode};
use url::Url;

use shared::{
    error::VoteClientError,
    protocol::{
        AdminLoginRequest, AdminVotesResponse, BackupStatus, CandidateVotes, ResultsResponse,
        VoteLogEntry,
    },
};

/// Which backup export to download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupKind {
    /// Everything: users, votes, and candidates in one JSON document.
    Full,
    /// Registered users only.
    Users,
    /// The raw votes table.
    VotesTable,
}

impl BackupKind {
    fn path_segment(self) -> &'static str {
        match self {
            Self::Full => "download",
            Self::Users => "users",
            Self::VotesTable => "votes-table",
        }
    }
}

pub struct ResultsClient {
    http: Client,
    base: Url,
}

impl ResultsClient {
    pub fn new(server_url: &str) -> Result<Self, VoteClientError> {
        let base = Url::parse(server_url.trim()).map_err(|err| {
            VoteClientError::validation(format!("invalid server url '{server_url}': {err}"))
        })?;
        if base.cannot_be_a_base() {
            return Err(VoteClientError::validation(format!(
                "server url '{server_url}' cannot carry api paths"
            )));
        }
        Ok(Self {
            http: Client::new(),
            base,
        })
    }

    /// Aggregated public tallies (`GET /api/public/votes`).
    pub async fn fetch_results(&self) -> Result<ResultsResponse, VoteClientError> {
        let response = self
            .http
            .get(self.endpoint(&["api", "public", "votes"])?)
            .send()
            .await
            .map_err(VoteClientError::network)?;
        let status = response.status();
        if !status.is_success() {
            return Err(VoteClientError::network(format!(
                "failed to fetch results ({status})"
            )));
        }
        response.json().await.map_err(VoteClientError::network)
    }

    /// Anonymized per-vote log (`GET /api/public/all-votes`).
    pub async fn fetch_vote_log(&self) -> Result<Vec<VoteLogEntry>, VoteClientError> {
        let response = self
            .http
            .get(self.endpoint(&["api", "public", "all-votes"])?)
            .send()
            .await
            .map_err(VoteClientError::network)?;
        let status = response.status();
        if !status.is_success() {
            return Err(VoteClientError::network(format!(
                "failed to fetch vote log ({status})"
            )));
        }
        response.json().await.map_err(VoteClientError::network)
    }

    /// Raw tally map for administrators (`GET /api/admin/votes`). The token
    /// comes from [`ResultsClient::admin_login`].
    pub async fn fetch_admin_votes(
        &self,
        token: &str,
    ) -> Result<AdminVotesResponse, VoteClientError> {
        let response = self
            .http
            .get(self.endpoint(&["api", "admin", "votes"])?)
            .bearer_auth(token)
            .send()
            .await
            .map_err(VoteClientError::network)?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(VoteClientError::SessionExpired);
        }
        if !status.is_success() {
            return Err(VoteClientError::network(format!(
                "failed to fetch admin tally ({status})"
            )));
        }
        response.json().await.map_err(VoteClientError::network)
    }

    /// Exchanges admin credentials for a bearer token.
    pub async fn admin_login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<String, VoteClientError> {
        let request = AdminLoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response = self
            .http
            .post(self.endpoint(&["api", "admin", "login"])?)
            .json(&request)
            .send()
            .await
            .map_err(VoteClientError::network)?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(VoteClientError::validation("invalid admin credentials"));
        }
        if !status.is_success() {
            return Err(VoteClientError::network(format!(
                "admin login failed ({status})"
            )));
        }
        let body: serde_json::Value = response.json().await.map_err(VoteClientError::network)?;
        body.get("token")
            .and_then(|t| t.as_str())
            .map(str::to_string)
            .ok_or_else(|| VoteClientError::network("malformed admin login response"))
    }

    /// Backup counts and reachability check (`GET /api/backup/status`).
    pub async fn fetch_backup_status(&self) -> Result<BackupStatus, VoteClientError> {
        let response = self
            .http
            .get(self.endpoint(&["api", "backup", "status"])?)
            .send()
            .await
            .map_err(VoteClientError::network)?;
        let status = response.status();
        if !status.is_success() {
            return Err(VoteClientError::network(format!(
                "failed to fetch backup status ({status})"
            )));
        }
        response.json().await.map_err(VoteClientError::network)
    }

    /// Downloads a backup export as raw JSON bytes, suitable for writing
    /// straight to a file.
    pub async fn download_backup(&self, kind: BackupKind) -> Result<Vec<u8>, VoteClientError> {
        let response = self
            .http
            .get(self.endpoint(&["api", "backup", kind.path_segment()])?)
            .send()
            .await
            .map_err(VoteClientError::network)?;
        let status = response.status();
        if !status.is_success() {
            return Err(VoteClientError::network(format!(
                "backup download failed ({status})"
            )));
        }
        let bytes = response.bytes().await.map_err(VoteClientError::network)?;
        Ok(bytes.to_vec())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, VoteClientError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| VoteClientError::validation("server url cannot carry api paths"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// Candidates tied for the highest tally in one position. Empty when nobody
/// has a vote yet; a position with only zero-vote candidates has no winner.
pub fn winners(tally: &[CandidateVotes]) -> Vec<&CandidateVotes> {
    let top = tally.iter().map(|c| c.votes).max().unwrap_or(0);
    if top == 0 {
        return Vec::new();
    }
    tally.iter().filter(|c| c.votes == top).collect()
}
