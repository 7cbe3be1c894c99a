// Change notifications published after each successful mutation.

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::draft::{GameId, ItemId, ParticipantId, SelectionId, TradeId};

/// One notification per committed mutation. Every event names the game it
/// belongs to so listeners can re-fetch just that game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum DraftEvent {
    ParticipantJoined {
        game_id: GameId,
        participant_id: ParticipantId,
    },
    SelectionAdded {
        game_id: GameId,
        selection_id: SelectionId,
        item_id: ItemId,
        owner_id: ParticipantId,
    },
    TradeProposed {
        game_id: GameId,
        trade_id: TradeId,
    },
    TradeConfirmed {
        game_id: GameId,
        trade_id: TradeId,
        participant_id: ParticipantId,
    },
    TradeExecuted {
        game_id: GameId,
        trade_id: TradeId,
    },
    TradeRejected {
        game_id: GameId,
        trade_id: TradeId,
        rejected_by: ParticipantId,
    },
}

impl DraftEvent {
    pub fn game_id(&self) -> GameId {
        match self {
            DraftEvent::ParticipantJoined { game_id, .. }
            | DraftEvent::SelectionAdded { game_id, .. }
            | DraftEvent::TradeProposed { game_id, .. }
            | DraftEvent::TradeConfirmed { game_id, .. }
            | DraftEvent::TradeExecuted { game_id, .. }
            | DraftEvent::TradeRejected { game_id, .. } => *game_id,
        }
    }
}

/// Where the engine publishes events. Publishing is fire-and-forget: a sink
/// must never block and never fail the mutation that produced the event.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: DraftEvent);
}

impl EventSink for broadcast::Sender<DraftEvent> {
    fn publish(&self, event: DraftEvent) {
        if self.send(event).is_err() {
            debug!("No event subscribers; notification dropped");
        }
    }
}

impl EventSink for mpsc::Sender<DraftEvent> {
    fn publish(&self, event: DraftEvent) {
        if let Err(e) = self.try_send(event) {
            warn!("Failed to publish draft event: {}", e);
        }
    }
}

/// Sink for callers that do not care about notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn publish(&self, _event: DraftEvent) {}
}
