//! Client-side controller for the sequential election voting flow: one
//! candidate selection per position, each vote acknowledged by the backend
//! before the wizard advances, and the whole ballot committed in a single
//! completion call at the end. Session and buffered votes live behind the
//! [`SessionStore`] port so the controller runs against real storage or a
//! test double; time goes through the [`Clock`] port so deadline expiry is
//! deterministic under test.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, StatusCode};
use tracing::{info, warn};
use url::Url;

use shared::{
    domain::{BufferedVote, CandidateId, DeviceId, Position, VoterIdentity, VoterSession},
    error::VoteClientError,
    protocol::{
        AckResponse, CandidateSummary, CompleteVotingRequest, CompleteVotingResponse,
        SignInRequest, SignInResponse, VoteRequest,
    },
};

pub mod audit;
pub mod results;

pub use results::ResultsClient;

const DEFAULT_SESSION_TTL_MINUTES: i64 = 30;

/// Port over the client-local durable store (session record, buffered
/// votes, device identity).
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load_session(&self) -> Result<Option<VoterSession>>;
    async fn save_session(&self, session: &VoterSession) -> Result<()>;
    async fn clear_session(&self) -> Result<()>;
    async fn record_buffered_vote(&self, position: &Position, vote: &BufferedVote) -> Result<()>;
    async fn buffered_votes(&self) -> Result<Vec<(Position, BufferedVote)>>;
    async fn ensure_device_id(&self) -> Result<DeviceId>;
}

#[async_trait]
impl SessionStore for storage::Storage {
    async fn load_session(&self) -> Result<Option<VoterSession>> {
        storage::Storage::load_session(self).await
    }

    async fn save_session(&self, session: &VoterSession) -> Result<()> {
        storage::Storage::save_session(self, session).await
    }

    async fn clear_session(&self) -> Result<()> {
        storage::Storage::clear_session(self).await
    }

    async fn record_buffered_vote(&self, position: &Position, vote: &BufferedVote) -> Result<()> {
        storage::Storage::record_buffered_vote(self, position, vote).await
    }

    async fn buffered_votes(&self) -> Result<Vec<(Position, BufferedVote)>> {
        storage::Storage::buffered_votes(self).await
    }

    async fn ensure_device_id(&self) -> Result<DeviceId> {
        storage::Storage::ensure_device_id(self).await
    }
}

/// Time source for the session deadline. Expiry is an absolute timestamp
/// comparison, not an interval timer.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardPhase {
    /// No session; sign-in required.
    Idle,
    /// Candidate fetch for the current position is due.
    Loading,
    /// Candidate list shown; nothing submitted for the current position.
    AwaitingSelection,
    /// Vote POST in flight; user interaction disabled.
    Submitting,
    /// Backend confirmed the current position; waiting for explicit advance.
    Submitted,
    /// Completion POST in flight or retryable after failure.
    Finalizing,
    /// Ballot committed; all local state cleared. Terminal.
    Done,
    /// Deadline elapsed; all local state discarded. Terminal.
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// The wizard moved on to this position; candidates need loading.
    NextPosition(Position),
    /// Every position was covered and the ballot was committed.
    Completed,
}

#[derive(Debug, Clone)]
pub struct WizardConfig {
    pub server_url: String,
    pub session_ttl: Duration,
}

impl WizardConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            session_ttl: Duration::minutes(DEFAULT_SESSION_TTL_MINUTES),
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }
}

/// Drives the voter through each required position exactly once.
///
/// All operations take `&mut self`, so a second submission can never be in
/// flight while one is pending; the `Submitting`/`Finalizing` phases double
/// as the busy flag for a UI.
pub struct VotingWizard {
    http: Client,
    base: Url,
    session_ttl: Duration,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    phase: WizardPhase,
    session: Option<VoterSession>,
    queue: Vec<Position>,
    cursor: usize,
    candidates: Vec<CandidateSummary>,
    pending: HashMap<Position, BufferedVote>,
}

impl VotingWizard {
    pub fn new(
        config: WizardConfig,
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, VoteClientError> {
        let base = Url::parse(config.server_url.trim()).map_err(|err| {
            VoteClientError::validation(format!(
                "invalid server url '{}': {err}",
                config.server_url
            ))
        })?;
        if base.cannot_be_a_base() {
            return Err(VoteClientError::validation(format!(
                "server url '{}' cannot carry api paths",
                config.server_url
            )));
        }
        Ok(Self {
            http: Client::new(),
            base,
            session_ttl: config.session_ttl,
            store,
            clock,
            phase: WizardPhase::Idle,
            session: None,
            queue: Vec::new(),
            cursor: 0,
            candidates: Vec::new(),
            pending: HashMap::new(),
        })
    }

    pub fn phase(&self) -> WizardPhase {
        self.phase
    }

    pub fn session(&self) -> Option<&VoterSession> {
        self.session.as_ref()
    }

    /// The position the wizard is currently collecting a vote for.
    pub fn current_position(&self) -> Option<&Position> {
        self.queue.get(self.cursor)
    }

    pub fn remaining_positions(&self) -> &[Position] {
        &self.queue
    }

    pub fn candidates(&self) -> &[CandidateSummary] {
        &self.candidates
    }

    pub fn pending_votes(&self) -> &HashMap<Position, BufferedVote> {
        &self.pending
    }

    /// Exchanges the identity fields for a backend session and persists it.
    /// Any buffered votes from an abandoned earlier session are discarded;
    /// the backend's `remainingPositions` is authoritative after sign-in.
    pub async fn sign_in(&mut self, identity: &VoterIdentity) -> Result<(), VoteClientError> {
        if !identity.is_complete() {
            return Err(VoteClientError::validation("all fields are required"));
        }

        let device_id = self
            .store
            .ensure_device_id()
            .await
            .map_err(|err| VoteClientError::storage(format!("{err:#}")))?;

        let request = SignInRequest {
            institutional_email: identity.institutional_email.clone(),
            personal_email: identity.personal_email.clone(),
            matric_number: identity.matric_number.clone(),
            full_name: identity.full_name.clone(),
            device_id: Some(device_id.clone()),
        };
        let response = self
            .http
            .post(self.endpoint(&["api", "sign-in"])?)
            .json(&request)
            .send()
            .await
            .map_err(VoteClientError::network)?;
        let status = response.status();
        let body: SignInResponse = response.json().await.map_err(VoteClientError::network)?;

        if body.already_voted {
            return Err(VoteClientError::conflict("you have already voted"));
        }
        if body.email_blocked {
            return Err(VoteClientError::conflict(
                "this personal email has already been used by another student",
            ));
        }
        if body.device_blocked {
            return Err(VoteClientError::conflict(
                "this device has already been used by another voter",
            ));
        }
        if body.ip_blocked {
            return Err(VoteClientError::conflict(
                "this network address has already been used by another voter",
            ));
        }
        if let Some(error) = body.error {
            return Err(classify_rejection(status, Some(error)));
        }
        if !status.is_success() {
            return Err(VoteClientError::network(format!("sign-in failed ({status})")));
        }

        let (Some(session_token), Some(remaining_positions)) =
            (body.session_token, body.remaining_positions)
        else {
            return Err(VoteClientError::network(
                "malformed sign-in response: missing session fields",
            ));
        };

        let session = VoterSession {
            institutional_email: body
                .institutional_email
                .unwrap_or_else(|| identity.institutional_email.clone()),
            session_token,
            device_id: Some(device_id),
            remaining_positions,
            deadline: self.clock.now() + self.session_ttl,
        };

        self.store
            .clear_session()
            .await
            .map_err(|err| VoteClientError::storage(format!("{err:#}")))?;
        self.store
            .save_session(&session)
            .await
            .map_err(|err| VoteClientError::storage(format!("{err:#}")))?;

        info!(
            voter = %session.institutional_email,
            positions = session.remaining_positions.len(),
            "sign-in accepted"
        );

        self.session = Some(session);
        self.pending.clear();
        self.rebuild_queue().await?;
        self.cursor = 0;
        self.candidates.clear();
        self.phase = if self.queue.is_empty() {
            WizardPhase::Finalizing
        } else {
            WizardPhase::Loading
        };
        Ok(())
    }

    /// Reconstructs an interrupted session from storage. Positions already
    /// buffered are never re-offered; the queue becomes the stored remaining
    /// list minus buffered positions, in backend order, with the cursor at
    /// its start. Returns `false` when there is nothing to resume.
    pub async fn resume(&mut self) -> Result<bool, VoteClientError> {
        let loaded = self
            .store
            .load_session()
            .await
            .map_err(|err| VoteClientError::storage(format!("{err:#}")))?;
        let Some(session) = loaded else {
            self.phase = WizardPhase::Idle;
            return Ok(false);
        };

        if self.clock.now() >= session.deadline {
            self.session = Some(session);
            self.teardown(WizardPhase::Expired).await;
            return Err(VoteClientError::SessionExpired);
        }

        let buffered = self
            .store
            .buffered_votes()
            .await
            .map_err(|err| VoteClientError::storage(format!("{err:#}")))?;
        self.pending = buffered.into_iter().collect();
        self.session = Some(session);
        self.rebuild_queue().await?;
        self.cursor = 0;
        self.candidates.clear();
        self.phase = if self.queue.is_empty() {
            WizardPhase::Finalizing
        } else {
            WizardPhase::Loading
        };
        info!(
            remaining = self.queue.len(),
            buffered = self.pending.len(),
            "session resumed"
        );
        Ok(true)
    }

    /// Fetches the candidate list for the current position.
    pub async fn load_candidates(&mut self) -> Result<&[CandidateSummary], VoteClientError> {
        self.check_expired().await?;
        if !matches!(
            self.phase,
            WizardPhase::Loading | WizardPhase::AwaitingSelection
        ) {
            return Err(VoteClientError::validation(
                "no position is awaiting candidates",
            ));
        }
        let position = self
            .current_position()
            .cloned()
            .ok_or_else(|| VoteClientError::validation("no position left to vote on"))?;

        let url = self.endpoint(&["api", "candidates", position.as_str()])?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(VoteClientError::network)?;
        let status = response.status();
        if !status.is_success() {
            return Err(VoteClientError::network(format!(
                "failed to load candidates for {position} ({status})"
            )));
        }
        let list: Vec<CandidateSummary> =
            response.json().await.map_err(VoteClientError::network)?;

        self.check_expired().await?;
        self.candidates = list;
        self.phase = WizardPhase::AwaitingSelection;
        Ok(&self.candidates)
    }

    /// Submits the selection for the current position. Exactly one network
    /// call; on success the vote is buffered in storage and memory before
    /// the wizard reports `Submitted`. A storage failure after the backend
    /// acknowledged the vote is surfaced instead of silently advancing.
    pub async fn submit_vote(
        &mut self,
        position: &Position,
        candidate_id: &CandidateId,
    ) -> Result<(), VoteClientError> {
        self.check_expired().await?;
        if self.phase != WizardPhase::AwaitingSelection {
            return Err(VoteClientError::validation(
                "no candidate list is active for voting",
            ));
        }
        let current = self
            .current_position()
            .cloned()
            .ok_or_else(|| VoteClientError::validation("no position left to vote on"))?;
        if position != &current {
            return Err(VoteClientError::validation(format!(
                "expected a vote for {current}, got {position}"
            )));
        }
        let Some(candidate) = self
            .candidates
            .iter()
            .find(|c| &c.id == candidate_id)
            .cloned()
        else {
            return Err(VoteClientError::validation(
                "select one of the listed candidates",
            ));
        };
        let Some(session) = self.session.clone() else {
            self.teardown(WizardPhase::Expired).await;
            return Err(VoteClientError::SessionExpired);
        };

        self.phase = WizardPhase::Submitting;
        let request = VoteRequest {
            institutional_email: session.institutional_email.clone(),
            session_token: session.session_token.clone(),
            candidate_id: candidate.id.clone(),
            position: current.clone(),
            device_id: session.device_id.clone(),
        };
        let sent = self
            .http
            .post(self.endpoint(&["api", "vote"])?)
            .json(&request)
            .send()
            .await;
        let response = match sent {
            Ok(response) => response,
            Err(err) => {
                self.phase = WizardPhase::AwaitingSelection;
                return Err(VoteClientError::network(err));
            }
        };
        let status = response.status();
        let body: AckResponse = match response.json().await {
            Ok(body) => body,
            Err(err) => {
                self.phase = WizardPhase::AwaitingSelection;
                return Err(VoteClientError::network(err));
            }
        };

        // The deadline may have elapsed while the request was in flight;
        // the late result must not mutate buffered state.
        self.check_expired().await?;

        if !status.is_success() || !body.ok {
            self.phase = WizardPhase::AwaitingSelection;
            let err = classify_rejection(status, body.error);
            if matches!(err, VoteClientError::SessionExpired) {
                self.teardown(WizardPhase::Expired).await;
            }
            return Err(err);
        }

        let vote = BufferedVote {
            candidate_id: candidate.id.clone(),
            candidate_name: candidate.name.clone(),
        };
        if let Err(err) = self.store.record_buffered_vote(&current, &vote).await {
            // The backend holds the vote; re-submitting would be rejected as
            // a duplicate, so the UI must surface this instead of advancing.
            warn!(position = %current, "acknowledged vote could not be buffered: {err:#}");
            self.phase = WizardPhase::AwaitingSelection;
            return Err(VoteClientError::storage(format!("{err:#}")));
        }
        self.pending.insert(current.clone(), vote);
        self.phase = WizardPhase::Submitted;
        info!(position = %current, candidate = %candidate.id, "vote recorded");
        Ok(())
    }

    /// Moves past a submitted position. When the queue is exhausted the
    /// ballot is finalized in the same call.
    pub async fn advance(&mut self) -> Result<AdvanceOutcome, VoteClientError> {
        self.check_expired().await?;
        if self.phase != WizardPhase::Submitted {
            return Err(VoteClientError::validation(
                "confirm a vote for the current position before advancing",
            ));
        }
        self.cursor += 1;
        self.candidates.clear();
        if self.cursor >= self.queue.len() {
            self.phase = WizardPhase::Finalizing;
            self.finalize().await?;
            return Ok(AdvanceOutcome::Completed);
        }
        self.phase = WizardPhase::Loading;
        Ok(AdvanceOutcome::NextPosition(self.queue[self.cursor].clone()))
    }

    /// Commits the whole ballot. Requires a buffered vote for every queued
    /// position. On success all local state is cleared so no replay is
    /// possible. A `duplicateIP` rejection is fatal: local state is purged
    /// before the error is surfaced so retrying cannot resubmit.
    pub async fn finalize(&mut self) -> Result<(), VoteClientError> {
        self.check_expired().await?;
        if let Some(missing) = self.queue.iter().find(|p| !self.pending.contains_key(p)) {
            return Err(VoteClientError::validation(format!(
                "no recorded vote for {missing}; every position must be voted before completion"
            )));
        }
        let Some(session) = self.session.clone() else {
            self.teardown(WizardPhase::Expired).await;
            return Err(VoteClientError::SessionExpired);
        };

        self.phase = WizardPhase::Finalizing;
        let request = CompleteVotingRequest {
            institutional_email: session.institutional_email.clone(),
            session_token: session.session_token.clone(),
            device_id: session.device_id.clone(),
        };
        let response = self
            .http
            .post(self.endpoint(&["api", "complete-voting"])?)
            .json(&request)
            .send()
            .await
            .map_err(VoteClientError::network)?;
        let status = response.status();
        let body: CompleteVotingResponse =
            response.json().await.map_err(VoteClientError::network)?;

        self.check_expired().await?;

        if body.duplicate_ip {
            let reason = body
                .error
                .unwrap_or_else(|| "duplicate network identity detected".to_string());
            warn!(voter = %session.institutional_email, "completion rejected, purging ballot: {reason}");
            self.teardown(WizardPhase::Idle).await;
            return Err(VoteClientError::fatal_conflict(reason));
        }
        if !status.is_success() || !body.ok {
            // Retryable: buffered votes stay intact and the phase remains
            // Finalizing so the caller can invoke finalize() again.
            let err = classify_rejection(status, body.error);
            if matches!(err, VoteClientError::SessionExpired) {
                self.teardown(WizardPhase::Expired).await;
            }
            return Err(err);
        }

        let cleared = self.store.clear_session().await;
        self.session = None;
        self.pending.clear();
        self.queue.clear();
        self.cursor = 0;
        self.candidates.clear();
        self.phase = WizardPhase::Done;
        info!(voter = %session.institutional_email, "ballot completed");
        cleared.map_err(|err| VoteClientError::storage(format!("{err:#}")))?;
        Ok(())
    }

    /// Discards the session and all buffered votes.
    pub async fn logout(&mut self) {
        self.teardown(WizardPhase::Idle).await;
    }

    async fn rebuild_queue(&mut self) -> Result<(), VoteClientError> {
        let remaining: Vec<Position> = match &self.session {
            Some(session) => session.remaining_positions.clone(),
            None => return Err(VoteClientError::SessionExpired),
        };

        let response = self
            .http
            .get(self.endpoint(&["api", "positions"])?)
            .send()
            .await
            .map_err(VoteClientError::network)?;
        let status = response.status();
        if !status.is_success() {
            return Err(VoteClientError::network(format!(
                "failed to fetch positions ({status})"
            )));
        }
        let ordered: Vec<Position> = response.json().await.map_err(VoteClientError::network)?;

        let remaining: HashSet<Position> = remaining.into_iter().collect();
        self.queue = ordered
            .into_iter()
            .filter(|p| remaining.contains(p) && !self.pending.contains_key(p))
            .collect();
        Ok(())
    }

    fn expired_now(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| self.clock.now() >= s.deadline)
    }

    async fn check_expired(&mut self) -> Result<(), VoteClientError> {
        if self.expired_now() {
            self.teardown(WizardPhase::Expired).await;
            return Err(VoteClientError::SessionExpired);
        }
        Ok(())
    }

    async fn teardown(&mut self, phase: WizardPhase) {
        if let Err(err) = self.store.clear_session().await {
            warn!("failed to clear local session state: {err:#}");
        }
        self.session = None;
        self.pending.clear();
        self.queue.clear();
        self.cursor = 0;
        self.candidates.clear();
        self.phase = phase;
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

/// Maps a backend rejection onto the client error taxonomy. The backend
/// reports duplicates both via dedicated flags and via free-text errors, so
/// the message is inspected as a fallback.
fn classify_rejection(status: StatusCode, error: Option<String>) -> VoteClientError {
    let reason = error.unwrap_or_else(|| format!("server rejected the request ({status})"));
    let lowered = reason.to_ascii_lowercase();
    if status == StatusCode::UNAUTHORIZED {
        return VoteClientError::SessionExpired;
    }
    if status == StatusCode::CONFLICT || lowered.contains("already") || lowered.contains("duplicate")
    {
        return VoteClientError::conflict(reason);
    }
    if status == StatusCode::BAD_REQUEST {
        return VoteClientError::Validation(reason);
    }
    VoteClientError::Network(reason)
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
