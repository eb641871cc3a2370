//! Error taxonomy for the bot runtime.
//!
//! Every error the facade can surface is a distinct, comparable variant so
//! the boundary layer can branch on kind rather than message text. Domain
//! preconditions (vacation mode, missing moon, ...) are stable sentinels;
//! decode failures always carry the offending field name.

use thiserror::Error;

/// A field-specific extraction failure.
///
/// Produced when a required field is missing or malformed in a fetched page.
/// A decode error means the upstream markup changed or the wrong extractor
/// version was dispatched — it is never swallowed into a partial snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to decode field `{field}`: {reason}")]
pub struct DecodeError {
    /// Name of the field that could not be decoded.
    pub field: &'static str,
    /// What went wrong (missing element, bad number, invalid JSON, ...).
    pub reason: String,
}

impl DecodeError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }

    /// Shorthand for the common "element/assignment not found" case.
    pub fn missing(field: &'static str) -> Self {
        Self::new(field, "not found in page")
    }
}

/// Everything that can go wrong inside the bot runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BotError {
    /// Network-level failure. Never retried automatically for
    /// state-mutating actions, to avoid duplicate side effects.
    #[error("transport error: {0}")]
    Transport(String),

    /// The upstream rejected the credentials. Terminal — retrying with the
    /// same credentials will not help.
    #[error("bad credentials")]
    BadCredentials,

    /// Login requires an interactive challenge. Recoverable: resolve it via
    /// `solve_challenge` with this id, then log in again.
    #[error("challenge required: {challenge_id}")]
    ChallengeRequired { challenge_id: String },

    /// The challenge answer was rejected.
    #[error("challenge failed: {challenge_id}")]
    ChallengeFailed { challenge_id: String },

    /// The session is not (or no longer) authenticated and the single
    /// automatic re-login did not recover it.
    #[error("not logged in")]
    NotLoggedIn,

    /// The running client version has no registered extractor. Surfaced at
    /// login time; never mapped to a "closest" version.
    #[error("unsupported client version: {0}")]
    UnsupportedVersion(String),

    /// Field-specific extraction failure.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The task was cancelled before the worker reached it.
    #[error("task cancelled")]
    Cancelled,

    /// The scheduler worker is gone; the task can never run.
    #[error("scheduler shut down")]
    SchedulerClosed,

    /// Bad runtime configuration (missing env var, invalid secret, ...).
    #[error("configuration error: {0}")]
    Config(String),

    /// Caller-supplied arguments failed the precondition gate.
    #[error("invalid parameters: {0}")]
    InvalidParameters(&'static str),

    // ── Domain sentinels ─────────────────────────────────────────────────
    // Fixed set of named preconditions from game actions. The routing layer
    // maps these to client-correctable-input responses.
    #[error("invalid planet id")]
    InvalidPlanetId,
    #[error("no ship selected")]
    NoShipSelected,
    #[error("uninhabited planet")]
    UninhabitedPlanet,
    #[error("no debris field")]
    NoDebrisField,
    #[error("player in vacation mode")]
    PlayerInVacationMode,
    #[error("admin or GM")]
    AdminOrGm,
    #[error("noob protection")]
    NoobProtection,
    #[error("player too strong")]
    PlayerTooStrong,
    #[error("no moon available")]
    NoMoonAvailable,
    #[error("no recycler available")]
    NoRecyclerAvailable,
    #[error("no events running")]
    NoEventsRunning,

    /// Invariant violation inside the runtime itself.
    #[error("internal error: {0}")]
    Internal(&'static str),
}

impl BotError {
    /// Whether the error names a caller-correctable domain precondition.
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            BotError::InvalidPlanetId
                | BotError::NoShipSelected
                | BotError::UninhabitedPlanet
                | BotError::NoDebrisField
                | BotError::PlayerInVacationMode
                | BotError::AdminOrGm
                | BotError::NoobProtection
                | BotError::PlayerTooStrong
                | BotError::NoMoonAvailable
                | BotError::NoRecyclerAvailable
                | BotError::NoEventsRunning
        )
    }
}

impl From<reqwest::Error> for BotError {
    fn from(err: reqwest::Error) -> Self {
        BotError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_names_field() {
        let err = DecodeError::missing("multiplier");
        assert_eq!(err.field, "multiplier");
        assert!(err.to_string().contains("multiplier"));
    }

    #[test]
    fn test_sentinels_are_comparable() {
        let err: BotError = DecodeError::missing("token").into();
        assert_eq!(err, BotError::Decode(DecodeError::missing("token")));
        assert_ne!(BotError::BadCredentials, BotError::NotLoggedIn);
        assert!(BotError::PlayerInVacationMode.is_domain());
        assert!(!BotError::BadCredentials.is_domain());
    }
}
