// Engine-level error type: rejections from the pure core, missing games and
// rulesets, and store failures.

use thiserror::Error;

use crate::draft::admission::SelectionRejection;
use crate::draft::trade::TradeRejection;
use crate::draft::{GameId, ParticipantId};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Selection(#[from] SelectionRejection),

    #[error(transparent)]
    Trade(#[from] TradeRejection),

    #[error("game {game_id} not found")]
    GameNotFound { game_id: GameId },

    #[error("ruleset `{ruleset_id}` not found")]
    RulesetNotFound { ruleset_id: String },

    #[error("ruleset `{ruleset_id}` is used by a running draft and cannot be changed")]
    RulesetInUse { ruleset_id: String },

    #[error("'{participant}' has already joined game {game_id}")]
    AlreadyJoined {
        game_id: GameId,
        participant: ParticipantId,
    },

    #[error("invalid rules for `{field}`: must be greater than 0")]
    InvalidRules { field: &'static str },

    /// The transactional store failed. Nothing was written; retrying is safe.
    #[error("store failure: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl EngineError {
    /// Stable reason code for the wire protocol.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Selection(r) => r.code(),
            EngineError::Trade(r) => r.code(),
            EngineError::GameNotFound { .. } => "GAME_NOT_FOUND",
            EngineError::RulesetNotFound { .. } => "RULESET_NOT_FOUND",
            EngineError::RulesetInUse { .. } => "RULESET_IN_USE",
            EngineError::AlreadyJoined { .. } => "ALREADY_JOINED",
            EngineError::InvalidRules { .. } => "INVALID_RULES",
            EngineError::Store(_) => "STORE_UNAVAILABLE",
        }
    }

    /// Store failures are transient; everything else is a deterministic
    /// rejection that will repeat until the input or state changes.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Store(_))
    }
}
