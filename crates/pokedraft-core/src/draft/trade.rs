// Trade settlement: proposal, confirmation, execution, and rejection of
// multi-party ownership transfers.
//
// Everything here is a pure check over a snapshot. The engine runs these
// checks and the matching store writes inside one transaction, so a check
// that passes here is still true when the write lands.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::roster::{Participant, RosterLedger, Selection};
use super::ruleset::Ruleset;
use super::{GameId, ParticipantId, SelectionId, TradeId};

/// Move one selection from its expected current owner to a new owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub selection_id: SelectionId,
    /// Owner captured at proposal time; re-checked at execution.
    pub expected_old_owner_id: ParticipantId,
    pub new_owner_id: ParticipantId,
}

/// Stored lifecycle state. "Executable" is derived, and rejected trades are
/// deleted rather than kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Proposed,
    Executed,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Proposed => "proposed",
            TradeStatus::Executed => "executed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "proposed" => Some(TradeStatus::Proposed),
            "executed" => Some(TradeStatus::Executed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: TradeId,
    pub game_id: GameId,
    pub requester_id: ParticipantId,
    pub transactions: Vec<Transaction>,
    pub confirmations: BTreeSet<ParticipantId>,
    pub status: TradeStatus,
    pub created_at: String,
    pub executed_at: Option<String>,
}

impl Trade {
    /// The requester plus every old and new owner named by a transaction.
    pub fn participants(&self) -> BTreeSet<ParticipantId> {
        let mut ids = BTreeSet::new();
        ids.insert(self.requester_id.clone());
        for t in &self.transactions {
            ids.insert(t.expected_old_owner_id.clone());
            ids.insert(t.new_owner_id.clone());
        }
        ids
    }

    pub fn is_participant(&self, participant_id: &str) -> bool {
        self.requester_id == participant_id
            || self
                .transactions
                .iter()
                .any(|t| t.expected_old_owner_id == participant_id || t.new_owner_id == participant_id)
    }

    /// Participants who have not confirmed yet, sorted.
    pub fn pending_confirmations(&self) -> Vec<ParticipantId> {
        self.participants()
            .into_iter()
            .filter(|p| !self.confirmations.contains(p))
            .collect()
    }

    /// Proposed and confirmed by every participant.
    pub fn is_executable(&self) -> bool {
        self.status == TradeStatus::Proposed && self.pending_confirmations().is_empty()
    }
}

/// Why a trade operation was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TradeRejection {
    #[error("a trade needs at least one transaction")]
    EmptyTrade,

    #[error("selection {selection_id} does not exist or is not owned by the expected participant")]
    UnknownSelection { selection_id: SelectionId },

    #[error("selection {selection_id} appears more than once in the trade")]
    DuplicateSelection { selection_id: SelectionId },

    #[error("'{participant}' is not a participant in this game")]
    UnknownParticipant { participant: ParticipantId },

    #[error("'{participant}' is not a participant in this trade")]
    NotAParticipant { participant: ParticipantId },

    #[error("'{participant}' has already confirmed this trade")]
    AlreadyConfirmed { participant: ParticipantId },

    #[error("trade {trade_id} not found")]
    TradeNotFound { trade_id: TradeId },

    #[error("trade is waiting on confirmations from {}", .pending.join(", "))]
    NotExecutable { pending: Vec<ParticipantId> },

    #[error("selection {selection_id} is no longer owned by '{expected}'")]
    OwnershipChanged {
        selection_id: SelectionId,
        expected: ParticipantId,
        actual: Option<ParticipantId>,
    },

    #[error("'{participant}' would hold {point_total} of {max_points} points after the trade")]
    BudgetExceeded {
        participant: ParticipantId,
        point_total: u32,
        max_points: u32,
    },

    #[error("'{participant}' would hold {roster_size} of {max_team_size} roster slots after the trade")]
    RosterFull {
        participant: ParticipantId,
        roster_size: u32,
        max_team_size: u32,
    },

    #[error("'{participant}' may not reject this trade")]
    NotAuthorized { participant: ParticipantId },
}

impl TradeRejection {
    /// Stable reason code for the wire protocol.
    pub fn code(&self) -> &'static str {
        match self {
            TradeRejection::EmptyTrade => "EMPTY_TRADE",
            TradeRejection::UnknownSelection { .. } => "UNKNOWN_SELECTION",
            TradeRejection::DuplicateSelection { .. } => "DUPLICATE_SELECTION",
            TradeRejection::UnknownParticipant { .. } => "UNKNOWN_PARTICIPANT",
            TradeRejection::NotAParticipant { .. } => "NOT_A_PARTICIPANT",
            TradeRejection::AlreadyConfirmed { .. } => "ALREADY_CONFIRMED",
            TradeRejection::TradeNotFound { .. } => "TRADE_NOT_FOUND",
            TradeRejection::NotExecutable { .. } => "NOT_EXECUTABLE",
            TradeRejection::OwnershipChanged { .. } => "OWNERSHIP_CHANGED",
            TradeRejection::BudgetExceeded { .. } => "BUDGET_EXCEEDED",
            TradeRejection::RosterFull { .. } => "ROSTER_FULL",
            TradeRejection::NotAuthorized { .. } => "NOT_AUTHORIZED",
        }
    }
}

/// Validate a new proposal against the game's current selections.
pub fn validate_proposal(
    requester_id: &str,
    transactions: &[Transaction],
    participants: &[Participant],
    selections: &[Selection],
) -> Result<(), TradeRejection> {
    if transactions.is_empty() {
        return Err(TradeRejection::EmptyTrade);
    }

    let is_member = |id: &str| participants.iter().any(|p| p.id == id);
    if !is_member(requester_id) {
        return Err(TradeRejection::NotAParticipant {
            participant: requester_id.to_string(),
        });
    }

    let by_id: HashMap<SelectionId, &Selection> = selections.iter().map(|s| (s.id, s)).collect();
    let mut seen = HashSet::with_capacity(transactions.len());

    for t in transactions {
        if !seen.insert(t.selection_id) {
            return Err(TradeRejection::DuplicateSelection {
                selection_id: t.selection_id,
            });
        }
        match by_id.get(&t.selection_id) {
            Some(sel) if sel.owner_id == t.expected_old_owner_id => {}
            _ => {
                return Err(TradeRejection::UnknownSelection {
                    selection_id: t.selection_id,
                })
            }
        }
        if !is_member(&t.new_owner_id) {
            return Err(TradeRejection::UnknownParticipant {
                participant: t.new_owner_id.clone(),
            });
        }
    }

    Ok(())
}

/// Check that `participant_id` may confirm `trade`.
pub fn check_confirm(
    trade_id: TradeId,
    trade: Option<&Trade>,
    participant_id: &str,
) -> Result<(), TradeRejection> {
    let trade = open_trade(trade_id, trade)?;
    if !trade.is_participant(participant_id) {
        return Err(TradeRejection::NotAParticipant {
            participant: participant_id.to_string(),
        });
    }
    if trade.confirmations.contains(participant_id) {
        return Err(TradeRejection::AlreadyConfirmed {
            participant: participant_id.to_string(),
        });
    }
    Ok(())
}

/// Re-validate `trade` against the current selections and compute the
/// ownership changes to commit.
///
/// Fails without partial results: either every transaction is still valid
/// and the post-trade rosters respect every recipient's limits, or nothing
/// is returned.
pub fn check_execute(
    trade_id: TradeId,
    trade: Option<&Trade>,
    participants: &[Participant],
    selections: &[Selection],
    ruleset: &Ruleset,
) -> Result<Vec<Transaction>, TradeRejection> {
    let trade = open_trade(trade_id, trade)?;

    let pending = trade.pending_confirmations();
    if !pending.is_empty() {
        return Err(TradeRejection::NotExecutable { pending });
    }

    let mut after: Vec<Selection> = selections.to_vec();
    for t in &trade.transactions {
        let sel = after.iter_mut().find(|s| s.id == t.selection_id);
        match sel {
            Some(sel) if sel.owner_id == t.expected_old_owner_id => {
                sel.owner_id = t.new_owner_id.clone();
            }
            other => {
                return Err(TradeRejection::OwnershipChanged {
                    selection_id: t.selection_id,
                    expected: t.expected_old_owner_id.clone(),
                    actual: other.map(|s| s.owner_id.clone()),
                })
            }
        }
    }

    let ledger = RosterLedger::build(participants, &after, ruleset);
    let recipients: BTreeSet<&str> = trade
        .transactions
        .iter()
        .map(|t| t.new_owner_id.as_str())
        .collect();
    for id in recipients {
        let Some(p) = participants.iter().find(|p| p.id == id) else {
            return Err(TradeRejection::UnknownParticipant {
                participant: id.to_string(),
            });
        };
        let point_total = ledger.point_total(id);
        if point_total > p.rules.max_points {
            return Err(TradeRejection::BudgetExceeded {
                participant: id.to_string(),
                point_total,
                max_points: p.rules.max_points,
            });
        }
        let roster_size = ledger.roster_size(id);
        if roster_size > p.rules.max_team_size {
            return Err(TradeRejection::RosterFull {
                participant: id.to_string(),
                roster_size,
                max_team_size: p.rules.max_team_size,
            });
        }
    }

    Ok(trade.transactions.clone())
}

/// Check that `actor` may reject (withdraw) `trade`: the requester, any
/// trade participant, or a game member at or above `override_privilege`.
pub fn check_reject(
    trade_id: TradeId,
    trade: Option<&Trade>,
    actor: &str,
    actor_privilege: Option<u32>,
    override_privilege: u32,
) -> Result<(), TradeRejection> {
    let trade = open_trade(trade_id, trade)?;
    if trade.is_participant(actor) {
        return Ok(());
    }
    match actor_privilege {
        Some(level) if level >= override_privilege => Ok(()),
        _ => Err(TradeRejection::NotAuthorized {
            participant: actor.to_string(),
        }),
    }
}

/// Only proposed trades can be confirmed, executed, or rejected. Executed
/// trades are kept for audit but are no longer addressable.
fn open_trade(trade_id: TradeId, trade: Option<&Trade>) -> Result<&Trade, TradeRejection> {
    match trade {
        Some(t) if t.status == TradeStatus::Proposed => Ok(t),
        _ => Err(TradeRejection::TradeNotFound { trade_id }),
    }
}
