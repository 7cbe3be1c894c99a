// Selection admission control: may this participant claim this item now?

use thiserror::Error;

use super::roster::{Participant, RosterLedger};
use super::ruleset::{normalize_item_id, Ruleset};
use super::scheduler::current_drafter;
use super::{ItemId, ParticipantId};

/// Why a claim was refused. Checks run in declaration order and the first
/// failure wins.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionRejection {
    #[error("item id '{item}' is empty")]
    InvalidItem { item: String },

    #[error("'{participant}' is not a participant in this game")]
    NotAParticipant { participant: ParticipantId },

    #[error("'{item}' is banned under this ruleset")]
    ItemBanned { item: ItemId },

    #[error("'{item}' is already owned by '{owner}'")]
    AlreadyClaimed { item: ItemId, owner: ParticipantId },

    #[error("'{participant}' has {point_total} of {max_points} points; '{item}' costs {value}")]
    BudgetExceeded {
        participant: ParticipantId,
        item: ItemId,
        value: u32,
        point_total: u32,
        max_points: u32,
    },

    #[error("'{participant}' already has {roster_size} of {max_team_size} roster slots filled")]
    RosterFull {
        participant: ParticipantId,
        roster_size: u32,
        max_team_size: u32,
    },

    #[error("it is not '{participant}''s turn")]
    NotYourTurn {
        participant: ParticipantId,
        current: Option<ParticipantId>,
    },
}

impl SelectionRejection {
    /// Stable reason code for the wire protocol.
    pub fn code(&self) -> &'static str {
        match self {
            SelectionRejection::InvalidItem { .. } => "INVALID_ITEM",
            SelectionRejection::NotAParticipant { .. } => "NOT_A_PARTICIPANT",
            SelectionRejection::ItemBanned { .. } => "ITEM_BANNED",
            SelectionRejection::AlreadyClaimed { .. } => "ALREADY_CLAIMED",
            SelectionRejection::BudgetExceeded { .. } => "BUDGET_EXCEEDED",
            SelectionRejection::RosterFull { .. } => "ROSTER_FULL",
            SelectionRejection::NotYourTurn { .. } => "NOT_YOUR_TURN",
        }
    }
}

/// A claim that passed every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admitted {
    /// Canonical item id to record.
    pub item_id: ItemId,
    pub value: u32,
}

/// Decide whether `actor_id` may claim `raw_item_id` right now.
///
/// The item id is normalized first, so every later check (and the recorded
/// selection) sees the same spelling the ruleset uses.
pub fn check_selection(
    actor_id: &str,
    raw_item_id: &str,
    participants: &[Participant],
    ledger: &RosterLedger,
    ruleset: &Ruleset,
) -> Result<Admitted, SelectionRejection> {
    let item_id = normalize_item_id(raw_item_id).ok_or_else(|| SelectionRejection::InvalidItem {
        item: raw_item_id.to_string(),
    })?;
    let item_id = item_id.as_str();

    let actor = participants
        .iter()
        .find(|p| p.id == actor_id)
        .ok_or_else(|| SelectionRejection::NotAParticipant {
            participant: actor_id.to_string(),
        })?;

    let value = ruleset.value_of(item_id);
    if value == 0 {
        return Err(SelectionRejection::ItemBanned {
            item: item_id.to_string(),
        });
    }

    if let Some(owner) = ledger.owner_of(item_id) {
        return Err(SelectionRejection::AlreadyClaimed {
            item: item_id.to_string(),
            owner: owner.to_string(),
        });
    }

    let point_total = ledger.point_total(actor_id);
    if point_total.saturating_add(value) > actor.rules.max_points {
        return Err(SelectionRejection::BudgetExceeded {
            participant: actor_id.to_string(),
            item: item_id.to_string(),
            value,
            point_total,
            max_points: actor.rules.max_points,
        });
    }

    let roster_size = ledger.roster_size(actor_id);
    if roster_size >= actor.rules.max_team_size {
        return Err(SelectionRejection::RosterFull {
            participant: actor_id.to_string(),
            roster_size,
            max_team_size: actor.rules.max_team_size,
        });
    }

    let current = current_drafter(participants, ledger);
    if current.as_deref() != Some(actor_id) {
        return Err(SelectionRejection::NotYourTurn {
            participant: actor_id.to_string(),
            current,
        });
    }

    Ok(Admitted {
        item_id: item_id.to_string(),
        value,
    })
}
