// Application event loop: decodes client requests, runs them against the
// draft engine, and routes each response back to the requesting client.

use pokedraft_core::draft::ParticipantId;
use pokedraft_core::engine::DraftEngine;
use pokedraft_core::error::EngineError;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::protocol::{self, ClientRequest, ServerMessage};
use crate::ws_server::WsEvent;

/// Commands from the process itself (signal handling) to the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppCommand {
    Shutdown,
}

pub struct AppState {
    pub engine: DraftEngine,
    /// Currently connected clients.
    pub connections: usize,
}

impl AppState {
    pub fn new(engine: DraftEngine) -> Self {
        Self {
            engine,
            connections: 0,
        }
    }
}

/// Result payload of `CURRENT_DRAFTER`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CurrentDrafterView {
    participant_id: Option<ParticipantId>,
}

/// Run the main application event loop.
///
/// Listens on two channels using `tokio::select!`:
/// 1. WebSocket events from clients
/// 2. Process commands (shutdown)
///
/// Requests are handled one at a time, in arrival order.
pub async fn run(
    mut ws_rx: mpsc::Receiver<WsEvent>,
    mut cmd_rx: mpsc::Receiver<AppCommand>,
    mut state: AppState,
) -> anyhow::Result<()> {
    info!("Application event loop started");

    loop {
        tokio::select! {
            ws_event = ws_rx.recv() => {
                match ws_event {
                    Some(WsEvent::Connected { addr }) => {
                        state.connections += 1;
                        info!("Client connected from {} ({} connected)", addr, state.connections);
                    }
                    Some(WsEvent::Disconnected { addr }) => {
                        state.connections = state.connections.saturating_sub(1);
                        info!("Client {} disconnected ({} connected)", addr, state.connections);
                    }
                    Some(WsEvent::Message { addr, text, reply }) => {
                        let response = handle_message(&state, &text);
                        match serde_json::to_string(&response) {
                            Ok(json) => {
                                if reply.send(json).await.is_err() {
                                    debug!("Client {} went away before its reply was sent", addr);
                                }
                            }
                            Err(e) => warn!("Failed to serialize response for {}: {}", addr, e),
                        }
                    }
                    None => {
                        info!("WebSocket channel closed, shutting down");
                        break;
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(AppCommand::Shutdown) => {
                        info!("Shutdown command received");
                        break;
                    }
                    None => {
                        info!("Command channel closed, shutting down");
                        break;
                    }
                }
            }
        }
    }

    info!("Application event loop exiting");
    Ok(())
}

/// Decode one raw client message and produce its response. Never panics on
/// bad input: undecodable messages get an `ERROR` response.
pub fn handle_message(state: &AppState, text: &str) -> ServerMessage {
    let request = match protocol::parse_request(text) {
        Ok(r) => r,
        Err(e) => {
            warn!("Failed to parse client message: {}", e);
            return e.into_response();
        }
    };

    let request_id = request.request_id().to_string();
    match dispatch(&state.engine, request) {
        Ok(result) => ServerMessage::Ok { request_id, result },
        Err(e) => ServerMessage::from_engine_error(&request_id, &e),
    }
}

/// Run a decoded request against the engine.
pub fn dispatch(engine: &DraftEngine, request: ClientRequest) -> Result<serde_json::Value, EngineError> {
    match request {
        ClientRequest::CreateGame {
            name,
            ruleset_id,
            owner,
            ..
        } => to_json(&engine.create_game(&name, &ruleset_id, owner)?),
        ClientRequest::JoinGame {
            game_id,
            participant,
            ..
        } => to_json(&engine.add_participant(game_id, participant)?),
        ClientRequest::ProposeSelection {
            game_id,
            participant_id,
            item_id,
            ..
        } => to_json(&engine.propose_selection(game_id, &participant_id, &item_id)?),
        ClientRequest::CurrentDrafter { game_id, .. } => to_json(&CurrentDrafterView {
            participant_id: engine.current_drafter(game_id)?,
        }),
        ClientRequest::DraftStatus { game_id, .. } => to_json(&engine.draft_overview(game_id)?),
        ClientRequest::CreateTrade {
            game_id,
            requester_id,
            transactions,
            ..
        } => to_json(&engine.create_trade(game_id, &requester_id, transactions)?),
        ClientRequest::ConfirmTrade {
            game_id,
            trade_id,
            participant_id,
            ..
        } => to_json(&engine.confirm_trade(game_id, trade_id, &participant_id)?),
        ClientRequest::ExecuteTrade {
            game_id, trade_id, ..
        } => to_json(&engine.execute_trade(game_id, trade_id)?),
        ClientRequest::RejectTrade {
            game_id,
            trade_id,
            participant_id,
            ..
        } => {
            engine.reject_trade(game_id, trade_id, &participant_id)?;
            Ok(serde_json::json!({ "tradeId": trade_id }))
        }
        ClientRequest::ListTrades { game_id, .. } => to_json(&engine.trades(game_id)?),
        ClientRequest::Rosters { game_id, .. } => to_json(&engine.rosters(game_id)?),
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, EngineError> {
    serde_json::to_value(value).map_err(|e| EngineError::Store(e.into()))
}
