// JSON wire protocol between league clients and the server.

use pokedraft_core::draft::trade::Transaction;
use pokedraft_core::draft::{GameId, ItemId, ParticipantId, TradeId};
use pokedraft_core::engine::NewParticipant;
use pokedraft_core::error::EngineError;
use pokedraft_core::events::DraftEvent;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A request from a client. Every request carries a client-chosen
/// `requestId` that is echoed in the response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum ClientRequest {
    CreateGame {
        request_id: String,
        name: String,
        ruleset_id: String,
        owner: NewParticipant,
    },
    JoinGame {
        request_id: String,
        game_id: GameId,
        participant: NewParticipant,
    },
    ProposeSelection {
        request_id: String,
        game_id: GameId,
        participant_id: ParticipantId,
        item_id: ItemId,
    },
    CurrentDrafter {
        request_id: String,
        game_id: GameId,
    },
    DraftStatus {
        request_id: String,
        game_id: GameId,
    },
    CreateTrade {
        request_id: String,
        game_id: GameId,
        requester_id: ParticipantId,
        transactions: Vec<Transaction>,
    },
    ConfirmTrade {
        request_id: String,
        game_id: GameId,
        trade_id: TradeId,
        participant_id: ParticipantId,
    },
    ExecuteTrade {
        request_id: String,
        game_id: GameId,
        trade_id: TradeId,
    },
    RejectTrade {
        request_id: String,
        game_id: GameId,
        trade_id: TradeId,
        participant_id: ParticipantId,
    },
    ListTrades {
        request_id: String,
        game_id: GameId,
    },
    Rosters {
        request_id: String,
        game_id: GameId,
    },
}

impl ClientRequest {
    pub fn request_id(&self) -> &str {
        match self {
            ClientRequest::CreateGame { request_id, .. }
            | ClientRequest::JoinGame { request_id, .. }
            | ClientRequest::ProposeSelection { request_id, .. }
            | ClientRequest::CurrentDrafter { request_id, .. }
            | ClientRequest::DraftStatus { request_id, .. }
            | ClientRequest::CreateTrade { request_id, .. }
            | ClientRequest::ConfirmTrade { request_id, .. }
            | ClientRequest::ExecuteTrade { request_id, .. }
            | ClientRequest::RejectTrade { request_id, .. }
            | ClientRequest::ListTrades { request_id, .. }
            | ClientRequest::Rosters { request_id, .. } => request_id,
        }
    }
}

/// Everything the server sends: one response per request, plus pushed
/// notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Ok {
        request_id: String,
        result: serde_json::Value,
    },
    /// The request was understood but refused; `reason` is a stable code.
    Rejected {
        request_id: String,
        reason: String,
        message: String,
    },
    /// The request could not be processed. Safe to retry for store failures.
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        message: String,
    },
    Event {
        event: DraftEvent,
    },
}

impl ServerMessage {
    /// Map an engine failure onto the wire: deterministic rejections become
    /// `REJECTED` with their code, store failures become `ERROR`.
    pub fn from_engine_error(request_id: &str, err: &EngineError) -> Self {
        if err.is_transient() {
            ServerMessage::Error {
                request_id: Some(request_id.to_string()),
                message: err.to_string(),
            }
        } else {
            ServerMessage::Rejected {
                request_id: request_id.to_string(),
                reason: err.code().to_string(),
                message: err.to_string(),
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed JSON: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("invalid request: {source}")]
    Invalid {
        /// Present when the payload carried a readable `requestId`.
        request_id: Option<String>,
        #[source]
        source: serde_json::Error,
    },
}

impl ProtocolError {
    pub fn request_id(&self) -> Option<&str> {
        match self {
            ProtocolError::Malformed(_) => None,
            ProtocolError::Invalid { request_id, .. } => request_id.as_deref(),
        }
    }

    pub fn into_response(self) -> ServerMessage {
        ServerMessage::Error {
            request_id: self.request_id().map(str::to_string),
            message: self.to_string(),
        }
    }
}

/// Parse a client request.
///
/// Parsing goes through `serde_json::Value` first so that a well-formed
/// message with an unknown type or missing fields can still be answered
/// with its `requestId`.
pub fn parse_request(text: &str) -> Result<ClientRequest, ProtocolError> {
    let value: serde_json::Value = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;
    let request_id = value
        .get("requestId")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    serde_json::from_value(value).map_err(|source| ProtocolError::Invalid { request_id, source })
}
