// Turn scheduler: snake-draft pick order derived from roster state.
//
// There is no stored "whose turn" pointer. The order is recomputed from the
// participants and the ledger on every call, so a successful selection
// advances the draft simply by changing the ledger.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::roster::{Participant, RosterLedger};
use super::ParticipantId;

/// Fewest participants needed for a draft to be running.
pub const MIN_PARTICIPANTS: usize = 2;

/// Where a game's draft stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum DraftStatus {
    /// Fewer than two participants have joined.
    NotStarted,
    /// `drafter` is due to pick in round `round` (0-based).
    InProgress { drafter: ParticipantId, round: u32 },
    /// Nobody has room left under their limits.
    Complete,
}

/// The participants still due a pick in the current round, in pick order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundOrder<'a> {
    /// 0-based round: the smallest roster size among eligible participants.
    pub round: u32,
    pub order: Vec<&'a Participant>,
}

/// Descending priority, then ascending id so that ties are deterministic.
fn pick_precedence(a: &Participant, b: &Participant) -> Ordering {
    b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id))
}

/// Compute the remaining pick order for the current round.
///
/// Returns `None` when the draft has not started (fewer than
/// [`MIN_PARTICIPANTS`]) or is complete (no eligible participant).
pub fn round_order<'a>(
    participants: &'a [Participant],
    ledger: &RosterLedger,
) -> Option<RoundOrder<'a>> {
    if participants.len() < MIN_PARTICIPANTS {
        return None;
    }

    let eligible: Vec<&Participant> = participants.iter().filter(|p| ledger.has_room(p)).collect();
    let round = eligible.iter().map(|p| ledger.roster_size(&p.id)).min()?;

    let mut order: Vec<&Participant> = eligible
        .into_iter()
        .filter(|p| ledger.roster_size(&p.id) == round)
        .collect();
    order.sort_by(|a, b| pick_precedence(a, b));

    // Snake: odd rounds run in reverse.
    if round % 2 == 1 {
        order.reverse();
    }

    Some(RoundOrder { round, order })
}

/// The participant whose turn it is, or `None` if the draft has not started
/// or is complete. Use [`draft_status`] to tell those two apart.
pub fn current_drafter(participants: &[Participant], ledger: &RosterLedger) -> Option<ParticipantId> {
    round_order(participants, ledger)
        .and_then(|r| r.order.first().map(|p| p.id.clone()))
}

/// Classify the draft as not started, in progress, or complete.
pub fn draft_status(participants: &[Participant], ledger: &RosterLedger) -> DraftStatus {
    if participants.len() < MIN_PARTICIPANTS {
        return DraftStatus::NotStarted;
    }
    match round_order(participants, ledger) {
        Some(RoundOrder { round, order }) => match order.first() {
            Some(p) => DraftStatus::InProgress {
                drafter: p.id.clone(),
                round,
            },
            None => DraftStatus::Complete,
        },
        None => DraftStatus::Complete,
    }
}
