// Participants, selections, and the derived per-participant roster ledger.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ruleset::Ruleset;
use super::{ItemId, ParticipantId, SelectionId};

/// Per-participant draft limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rules {
    /// Point budget. Must be greater than 0.
    #[serde(alias = "max_points")]
    pub max_points: u32,
    /// Maximum number of selections. Must be greater than 0.
    #[serde(alias = "max_team_size")]
    pub max_team_size: u32,
}

/// A member of a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: ParticipantId,
    /// Pick-order rank: higher priority picks earlier in even rounds.
    pub priority: i64,
    pub rules: Rules,
    pub privilege_level: u32,
}

/// An item claimed by a participant. Trades reassign `owner_id` in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub id: SelectionId,
    pub item_id: ItemId,
    pub owner_id: ParticipantId,
}

/// One line of a participant's roster, with the item's value under the
/// game's ruleset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub selection_id: SelectionId,
    pub item_id: ItemId,
    pub value: u32,
}

/// Everything a participant currently owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Roster {
    pub participant_id: ParticipantId,
    pub entries: Vec<RosterEntry>,
    pub point_total: u32,
}

impl Roster {
    fn empty(participant_id: &str) -> Self {
        Roster {
            participant_id: participant_id.to_string(),
            entries: Vec::new(),
            point_total: 0,
        }
    }

    pub fn size(&self) -> u32 {
        self.entries.len() as u32
    }
}

/// Derived view of a game's ownership: who owns which item, and the size and
/// point total of every participant's roster.
///
/// Never stored. Build a fresh ledger from a consistent store snapshot for
/// every decision.
#[derive(Debug, Clone, Default)]
pub struct RosterLedger {
    rosters: HashMap<ParticipantId, Roster>,
    item_owners: HashMap<ItemId, ParticipantId>,
}

impl RosterLedger {
    /// Build the ledger for `participants` from the game's `selections`.
    ///
    /// Every participant gets a roster, even an empty one. Selections owned
    /// by someone who is not (or no longer) a participant still mark their
    /// item as claimed.
    pub fn build(participants: &[Participant], selections: &[Selection], ruleset: &Ruleset) -> Self {
        let mut rosters: HashMap<ParticipantId, Roster> = participants
            .iter()
            .map(|p| (p.id.clone(), Roster::empty(&p.id)))
            .collect();
        let mut item_owners = HashMap::with_capacity(selections.len());

        for sel in selections {
            item_owners.insert(sel.item_id.clone(), sel.owner_id.clone());

            let Some(roster) = rosters.get_mut(&sel.owner_id) else {
                debug!(
                    "Selection {} ({}) owned by non-participant '{}'",
                    sel.id, sel.item_id, sel.owner_id
                );
                continue;
            };
            let value = ruleset.value_of(&sel.item_id);
            roster.point_total = roster.point_total.saturating_add(value);
            roster.entries.push(RosterEntry {
                selection_id: sel.id,
                item_id: sel.item_id.clone(),
                value,
            });
        }

        for roster in rosters.values_mut() {
            roster.entries.sort_by_key(|e| e.selection_id);
        }

        RosterLedger {
            rosters,
            item_owners,
        }
    }

    pub fn roster(&self, participant_id: &str) -> Option<&Roster> {
        self.rosters.get(participant_id)
    }

    /// Number of selections owned by `participant_id` (0 if unknown).
    pub fn roster_size(&self, participant_id: &str) -> u32 {
        self.rosters.get(participant_id).map_or(0, Roster::size)
    }

    /// Sum of item values owned by `participant_id` (0 if unknown).
    pub fn point_total(&self, participant_id: &str) -> u32 {
        self.rosters
            .get(participant_id)
            .map_or(0, |r| r.point_total)
    }

    /// Current owner of `item_id`, if any participant has claimed it.
    pub fn owner_of(&self, item_id: &str) -> Option<&str> {
        self.item_owners.get(item_id).map(String::as_str)
    }

    /// Whether `participant` still has room under both of their limits.
    pub fn has_room(&self, participant: &Participant) -> bool {
        self.point_total(&participant.id) < participant.rules.max_points
            && self.roster_size(&participant.id) < participant.rules.max_team_size
    }

    /// All rosters, sorted by participant id.
    pub fn rosters(&self) -> Vec<&Roster> {
        let mut all: Vec<&Roster> = self.rosters.values().collect();
        all.sort_by(|a, b| a.participant_id.cmp(&b.participant_id));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(id: &str, max_points: u32, max_team_size: u32) -> Participant {
        Participant {
            id: id.to_string(),
            priority: 0,
            rules: Rules {
                max_points,
                max_team_size,
            },
            privilege_level: 0,
        }
    }

    fn selection(id: SelectionId, item: &str, owner: &str) -> Selection {
        Selection {
            id,
            item_id: item.to_string(),
            owner_id: owner.to_string(),
        }
    }

    fn ruleset() -> Ruleset {
        Ruleset::new("test", 9)
            .with_value("garchomp", 4)
            .with_value("rotom-wash", 3)
    }

    #[test]
    fn empty_ledger_has_roster_per_participant() {
        let participants = vec![participant("ash", 10, 3), participant("misty", 10, 3)];
        let ledger = RosterLedger::build(&participants, &[], &ruleset());
        assert_eq!(ledger.rosters().len(), 2);
        assert_eq!(ledger.roster_size("ash"), 0);
        assert_eq!(ledger.point_total("misty"), 0);
    }

    #[test]
    fn aggregates_size_and_points() {
        let participants = vec![participant("ash", 10, 3), participant("misty", 10, 3)];
        let selections = vec![
            selection(1, "garchomp", "ash"),
            selection(2, "rotom-wash", "misty"),
            selection(3, "pikachu", "ash"),
        ];
        let ledger = RosterLedger::build(&participants, &selections, &ruleset());

        assert_eq!(ledger.roster_size("ash"), 2);
        assert_eq!(ledger.point_total("ash"), 5); // 4 + default 1
        assert_eq!(ledger.roster_size("misty"), 1);
        assert_eq!(ledger.point_total("misty"), 3);

        let ash = ledger.roster("ash").unwrap();
        assert_eq!(ash.entries[0].item_id, "garchomp");
        assert_eq!(ash.entries[1].value, 1);
    }

    #[test]
    fn owner_lookup_by_item() {
        let participants = vec![participant("ash", 10, 3)];
        let selections = vec![selection(1, "garchomp", "ash")];
        let ledger = RosterLedger::build(&participants, &selections, &ruleset());
        assert_eq!(ledger.owner_of("garchomp"), Some("ash"));
        assert_eq!(ledger.owner_of("pikachu"), None);
    }

    #[test]
    fn non_participant_selection_still_claims_item() {
        let participants = vec![participant("ash", 10, 3)];
        let selections = vec![selection(7, "garchomp", "gary")];
        let ledger = RosterLedger::build(&participants, &selections, &ruleset());
        assert_eq!(ledger.owner_of("garchomp"), Some("gary"));
        assert!(ledger.roster("gary").is_none());
        assert_eq!(ledger.roster_size("ash"), 0);
    }

    #[test]
    fn has_room_checks_both_limits() {
        let by_points = participant("ash", 5, 10);
        let by_size = participant("misty", 100, 1);
        let selections = vec![
            selection(1, "garchomp", "ash"),
            selection(2, "pikachu", "ash"),
            selection(3, "psyduck", "misty"),
        ];
        let participants = vec![by_points.clone(), by_size.clone()];
        let ledger = RosterLedger::build(&participants, &selections, &ruleset());

        // ash: 5 points of 5, misty: 1 of 1 slots
        assert!(!ledger.has_room(&by_points));
        assert!(!ledger.has_room(&by_size));

        let fresh = participant("brock", 5, 3);
        assert!(ledger.has_room(&fresh));
    }
}
