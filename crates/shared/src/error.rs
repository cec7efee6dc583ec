use thiserror::Error;

/// Error taxonomy shared by the wizard and the read-only clients.
///
/// `Validation` is recovered locally by re-prompting, `Conflict` is surfaced
/// to the user (fatal conflicts tear the session down first), `Network`
/// failures may be retried without losing buffered progress, and
/// `SessionExpired` always forces a full teardown and re-authentication.
#[derive(Debug, Error)]
pub enum VoteClientError {
    #[error("validation: {0}")]
    Validation(String),
    #[error("conflict: {reason}")]
    Conflict { reason: String, fatal: bool },
    #[error("network: {0}")]
    Network(String),
    #[error("session expired; sign in again to continue")]
    SessionExpired,
    #[error("local storage failure: {0}")]
    Storage(String),
}

impl VoteClientError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict {
            reason: reason.into(),
            fatal: false,
        }
    }

    pub fn fatal_conflict(reason: impl Into<String>) -> Self {
        Self::Conflict {
            reason: reason.into(),
            fatal: true,
        }
    }

    pub fn network(source: impl std::fmt::Display) -> Self {
        Self::Network(source.to_string())
    }

    pub fn storage(source: impl std::fmt::Display) -> Self {
        Self::Storage(source.to_string())
    }

    /// Fatal errors invalidate the current session: retrying the same call
    /// can never succeed and local buffered state has already been purged.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SessionExpired | Self::Conflict { fatal: true, .. }
        )
    }
}
