// Draft engine: runs every league operation as one store transaction and
// publishes a notification once it has committed.

use tracing::{debug, info, warn};

use crate::config::DraftSettings;
use crate::draft::admission::check_selection;
use crate::draft::roster::{Participant, Roster, RosterLedger, Rules, Selection};
use crate::draft::ruleset::Ruleset;
use crate::draft::scheduler::{self, DraftStatus};
use crate::draft::trade::{self, Trade, TradeRejection, Transaction};
use crate::draft::{GameId, ParticipantId, TradeId};
use crate::error::EngineError;
use crate::events::{DraftEvent, EventSink};
use crate::store::{Database, Game, StoreTx};

/// A participant about to join a game. Missing `rules` fall back to the
/// configured defaults.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewParticipant {
    pub id: ParticipantId,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub rules: Option<Rules>,
}

/// Outcome of registering a ruleset at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RulesetChange {
    Inserted,
    Replaced,
    Unchanged,
}

/// Draft status and the remaining pick order of the current round, taken
/// from the same snapshot.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftOverview {
    #[serde(flatten)]
    pub status: DraftStatus,
    pub pick_order: Vec<ParticipantId>,
}

/// Everything the checks need about one game, read in the same transaction
/// as the write that follows.
struct GameSnapshot {
    ruleset: Ruleset,
    participants: Vec<Participant>,
    selections: Vec<Selection>,
}

impl GameSnapshot {
    fn load(tx: &StoreTx<'_>, game_id: GameId) -> Result<Self, EngineError> {
        let game = tx
            .load_game(game_id)?
            .ok_or(EngineError::GameNotFound { game_id })?;
        let ruleset = tx
            .load_ruleset(&game.ruleset_id)?
            .ok_or_else(|| EngineError::RulesetNotFound {
                ruleset_id: game.ruleset_id.clone(),
            })?;
        let participants = tx.load_participants(game_id)?;
        let selections = tx.load_selections(game_id)?;
        Ok(Self {
            ruleset,
            participants,
            selections,
        })
    }

    fn ledger(&self) -> RosterLedger {
        RosterLedger::build(&self.participants, &self.selections, &self.ruleset)
    }

    fn participant(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    fn pick_order(&self, ledger: &RosterLedger) -> Vec<ParticipantId> {
        scheduler::round_order(&self.participants, ledger)
            .map(|r| r.order.iter().map(|p| p.id.clone()).collect())
            .unwrap_or_default()
    }
}

/// Stateless service over the store. Nothing is cached between calls; every
/// operation reads the current state inside its own transaction.
pub struct DraftEngine {
    db: Database,
    sink: Box<dyn EventSink>,
    settings: DraftSettings,
}

impl DraftEngine {
    pub fn new(db: Database, sink: impl EventSink + 'static, settings: DraftSettings) -> Self {
        Self {
            db,
            sink: Box::new(sink),
            settings,
        }
    }

    pub fn settings(&self) -> &DraftSettings {
        &self.settings
    }

    // ------------------------------------------------------------------
    // Catalog and game administration
    // ------------------------------------------------------------------

    /// Store `ruleset`. A ruleset referenced by a game is frozen: registering
    /// identical values again is a no-op, anything else is `RulesetInUse`.
    pub fn register_ruleset(&self, ruleset: &Ruleset) -> Result<RulesetChange, EngineError> {
        let change = self.db.write(|tx| -> Result<_, EngineError> {
            match tx.load_ruleset(&ruleset.id)? {
                Some(existing) if existing == *ruleset => Ok(RulesetChange::Unchanged),
                Some(_) if tx.ruleset_in_use(&ruleset.id)? => Err(EngineError::RulesetInUse {
                    ruleset_id: ruleset.id.clone(),
                }),
                Some(_) => {
                    tx.replace_ruleset(ruleset)?;
                    Ok(RulesetChange::Replaced)
                }
                None => {
                    tx.replace_ruleset(ruleset)?;
                    Ok(RulesetChange::Inserted)
                }
            }
        })?;
        debug!(
            "Ruleset {} ({} values): {:?}",
            ruleset.id,
            ruleset.values.len(),
            change
        );
        Ok(change)
    }

    /// Create a game on `ruleset_id`. The creator joins immediately with the
    /// owner privilege level.
    pub fn create_game(
        &self,
        name: &str,
        ruleset_id: &str,
        owner: NewParticipant,
    ) -> Result<Game, EngineError> {
        let rules = self.resolve_rules(owner.rules)?;
        let result = self.db.write(|tx| -> Result<_, EngineError> {
            if tx.load_ruleset(ruleset_id)?.is_none() {
                return Err(EngineError::RulesetNotFound {
                    ruleset_id: ruleset_id.to_string(),
                });
            }
            let game_id = tx.insert_game(name, ruleset_id, &owner.id)?;
            tx.insert_participant(
                game_id,
                &Participant {
                    id: owner.id.clone(),
                    priority: owner.priority,
                    rules,
                    privilege_level: self.settings.owner_privilege,
                },
            )?;
            tx.load_game(game_id)?
                .ok_or(EngineError::GameNotFound { game_id })
        });

        let game = result.inspect_err(|e| log_failure("create_game", None, e))?;
        info!(
            "Game {} '{}' created by {} on ruleset {}",
            game.id, game.name, game.owner_id, game.ruleset_id
        );
        self.sink.publish(DraftEvent::ParticipantJoined {
            game_id: game.id,
            participant_id: game.owner_id.clone(),
        });
        Ok(game)
    }

    /// Add a regular (unprivileged) participant to a game.
    pub fn add_participant(
        &self,
        game_id: GameId,
        participant: NewParticipant,
    ) -> Result<Participant, EngineError> {
        let rules = self.resolve_rules(participant.rules)?;
        let joined = Participant {
            id: participant.id,
            priority: participant.priority,
            rules,
            privilege_level: 0,
        };

        self.db
            .write(|tx| -> Result<_, EngineError> {
                if tx.load_game(game_id)?.is_none() {
                    return Err(EngineError::GameNotFound { game_id });
                }
                if !tx.insert_participant(game_id, &joined)? {
                    return Err(EngineError::AlreadyJoined {
                        game_id,
                        participant: joined.id.clone(),
                    });
                }
                Ok(())
            })
            .inspect_err(|e| log_failure("add_participant", Some(game_id), e))?;

        info!(
            "Game {}: {} joined (priority {}, {} points, {} slots)",
            game_id, joined.id, joined.priority, joined.rules.max_points, joined.rules.max_team_size
        );
        self.sink.publish(DraftEvent::ParticipantJoined {
            game_id,
            participant_id: joined.id.clone(),
        });
        Ok(joined)
    }

    pub fn game(&self, game_id: GameId) -> Result<Game, EngineError> {
        self.db.read(|tx| -> Result<_, EngineError> {
            tx.load_game(game_id)?
                .ok_or(EngineError::GameNotFound { game_id })
        })
    }

    pub fn participants(&self, game_id: GameId) -> Result<Vec<Participant>, EngineError> {
        self.db.read(|tx| -> Result<_, EngineError> {
            Ok(GameSnapshot::load(tx, game_id)?.participants)
        })
    }

    // ------------------------------------------------------------------
    // Turn scheduling
    // ------------------------------------------------------------------

    /// Whose turn it is, or `None` if the draft has not started or is over.
    pub fn current_drafter(&self, game_id: GameId) -> Result<Option<ParticipantId>, EngineError> {
        self.db.read(|tx| -> Result<_, EngineError> {
            let snap = GameSnapshot::load(tx, game_id)?;
            Ok(scheduler::current_drafter(&snap.participants, &snap.ledger()))
        })
    }

    pub fn draft_status(&self, game_id: GameId) -> Result<DraftStatus, EngineError> {
        self.db.read(|tx| -> Result<_, EngineError> {
            let snap = GameSnapshot::load(tx, game_id)?;
            Ok(scheduler::draft_status(&snap.participants, &snap.ledger()))
        })
    }

    /// Participants still due a pick in the current round, in pick order.
    pub fn pick_order(&self, game_id: GameId) -> Result<Vec<ParticipantId>, EngineError> {
        self.db.read(|tx| -> Result<_, EngineError> {
            let snap = GameSnapshot::load(tx, game_id)?;
            Ok(snap.pick_order(&snap.ledger()))
        })
    }

    /// [`draft_status`](Self::draft_status) and
    /// [`pick_order`](Self::pick_order) in one read.
    pub fn draft_overview(&self, game_id: GameId) -> Result<DraftOverview, EngineError> {
        self.db.read(|tx| -> Result<_, EngineError> {
            let snap = GameSnapshot::load(tx, game_id)?;
            let ledger = snap.ledger();
            Ok(DraftOverview {
                status: scheduler::draft_status(&snap.participants, &ledger),
                pick_order: snap.pick_order(&ledger),
            })
        })
    }

    /// Every participant's roster, sorted by participant id.
    pub fn rosters(&self, game_id: GameId) -> Result<Vec<Roster>, EngineError> {
        self.db.read(|tx| -> Result<_, EngineError> {
            let snap = GameSnapshot::load(tx, game_id)?;
            Ok(snap.ledger().rosters().into_iter().cloned().collect())
        })
    }

    // ------------------------------------------------------------------
    // Selection admission
    // ------------------------------------------------------------------

    /// Claim `item_id` for `actor_id`. All checks and the insert happen in
    /// one immediate transaction, so two racing claims cannot both pass.
    pub fn propose_selection(
        &self,
        game_id: GameId,
        actor_id: &str,
        item_id: &str,
    ) -> Result<Selection, EngineError> {
        let (selection, value) = self
            .db
            .write(|tx| -> Result<_, EngineError> {
                let snap = GameSnapshot::load(tx, game_id)?;
                let ledger = snap.ledger();
                let admitted =
                    check_selection(actor_id, item_id, &snap.participants, &ledger, &snap.ruleset)?;
                let id = tx.insert_selection(game_id, &admitted.item_id, actor_id)?;
                Ok((
                    Selection {
                        id,
                        item_id: admitted.item_id,
                        owner_id: actor_id.to_string(),
                    },
                    admitted.value,
                ))
            })
            .inspect_err(|e| log_failure("propose_selection", Some(game_id), e))?;

        info!(
            "Game {}: {} selected {} for {} points",
            game_id, actor_id, selection.item_id, value
        );
        self.sink.publish(DraftEvent::SelectionAdded {
            game_id,
            selection_id: selection.id,
            item_id: selection.item_id.clone(),
            owner_id: selection.owner_id.clone(),
        });
        Ok(selection)
    }

    // ------------------------------------------------------------------
    // Trade settlement
    // ------------------------------------------------------------------

    pub fn create_trade(
        &self,
        game_id: GameId,
        requester_id: &str,
        transactions: Vec<Transaction>,
    ) -> Result<Trade, EngineError> {
        let trade = self
            .db
            .write(|tx| -> Result<_, EngineError> {
                let snap = GameSnapshot::load(tx, game_id)?;
                trade::validate_proposal(
                    requester_id,
                    &transactions,
                    &snap.participants,
                    &snap.selections,
                )?;
                let trade_id = tx.insert_trade(game_id, requester_id, &transactions)?;
                load_trade(tx, game_id, trade_id)
            })
            .inspect_err(|e| log_failure("create_trade", Some(game_id), e))?;

        info!(
            "Game {}: trade {} proposed by {} ({} transactions, awaiting {})",
            game_id,
            trade.id,
            requester_id,
            trade.transactions.len(),
            trade.pending_confirmations().join(", ")
        );
        self.sink.publish(DraftEvent::TradeProposed {
            game_id,
            trade_id: trade.id,
        });
        Ok(trade)
    }

    pub fn confirm_trade(
        &self,
        game_id: GameId,
        trade_id: TradeId,
        participant_id: &str,
    ) -> Result<Trade, EngineError> {
        let trade = self
            .db
            .write(|tx| -> Result<_, EngineError> {
                let current = tx.load_trade(game_id, trade_id)?;
                trade::check_confirm(trade_id, current.as_ref(), participant_id)?;
                if !tx.insert_confirmation(trade_id, participant_id)? {
                    return Err(TradeRejection::AlreadyConfirmed {
                        participant: participant_id.to_string(),
                    }
                    .into());
                }
                load_trade(tx, game_id, trade_id)
            })
            .inspect_err(|e| log_failure("confirm_trade", Some(game_id), e))?;

        info!(
            "Game {}: {} confirmed trade {}{}",
            game_id,
            participant_id,
            trade_id,
            if trade.is_executable() {
                " (now executable)"
            } else {
                ""
            }
        );
        self.sink.publish(DraftEvent::TradeConfirmed {
            game_id,
            trade_id,
            participant_id: participant_id.to_string(),
        });
        Ok(trade)
    }

    /// Apply every ownership change of a fully confirmed trade, or none.
    ///
    /// Ownership is re-checked against the current selections and written
    /// with a compare-and-swap per selection. If another trade moved one of
    /// the selections first, this trade fails with `OwnershipChanged` and
    /// stays proposed so its participants can reject it.
    pub fn execute_trade(&self, game_id: GameId, trade_id: TradeId) -> Result<Trade, EngineError> {
        let trade = self
            .db
            .write(|tx| -> Result<_, EngineError> {
                let snap = GameSnapshot::load(tx, game_id)?;
                let current = tx.load_trade(game_id, trade_id)?;
                let moves = trade::check_execute(
                    trade_id,
                    current.as_ref(),
                    &snap.participants,
                    &snap.selections,
                    &snap.ruleset,
                )?;
                if !tx.reassign_owners(game_id, &moves)? {
                    // The snapshot was read in this transaction, so the swap
                    // only misses if the store disagrees with it. Returning
                    // an error rolls back any moves already applied.
                    let first = moves.first().ok_or(TradeRejection::EmptyTrade)?;
                    return Err(TradeRejection::OwnershipChanged {
                        selection_id: first.selection_id,
                        expected: first.expected_old_owner_id.clone(),
                        actual: None,
                    }
                    .into());
                }
                tx.mark_trade_executed(trade_id)?;
                load_trade(tx, game_id, trade_id)
            })
            .inspect_err(|e| log_failure("execute_trade", Some(game_id), e))?;

        info!(
            "Game {}: trade {} executed ({} selections moved)",
            game_id,
            trade_id,
            trade.transactions.len()
        );
        self.sink
            .publish(DraftEvent::TradeExecuted { game_id, trade_id });
        Ok(trade)
    }

    /// Withdraw a proposed trade. Allowed for its participants and for game
    /// members at or above the owner privilege level.
    pub fn reject_trade(
        &self,
        game_id: GameId,
        trade_id: TradeId,
        actor_id: &str,
    ) -> Result<(), EngineError> {
        self.db
            .write(|tx| -> Result<_, EngineError> {
                let snap = GameSnapshot::load(tx, game_id)?;
                let current = tx.load_trade(game_id, trade_id)?;
                let privilege = snap.participant(actor_id).map(|p| p.privilege_level);
                trade::check_reject(
                    trade_id,
                    current.as_ref(),
                    actor_id,
                    privilege,
                    self.settings.owner_privilege,
                )?;
                if !tx.delete_trade(trade_id)? {
                    return Err(TradeRejection::TradeNotFound { trade_id }.into());
                }
                Ok(())
            })
            .inspect_err(|e| log_failure("reject_trade", Some(game_id), e))?;

        info!("Game {}: trade {} rejected by {}", game_id, trade_id, actor_id);
        self.sink.publish(DraftEvent::TradeRejected {
            game_id,
            trade_id,
            rejected_by: actor_id.to_string(),
        });
        Ok(())
    }

    /// All proposed and executed trades of a game, oldest first.
    pub fn trades(&self, game_id: GameId) -> Result<Vec<Trade>, EngineError> {
        self.db.read(|tx| -> Result<_, EngineError> {
            if tx.load_game(game_id)?.is_none() {
                return Err(EngineError::GameNotFound { game_id });
            }
            Ok(tx.load_trades(game_id)?)
        })
    }

    fn resolve_rules(&self, rules: Option<Rules>) -> Result<Rules, EngineError> {
        let rules = rules.unwrap_or(self.settings.default_rules);
        if rules.max_points == 0 {
            return Err(EngineError::InvalidRules {
                field: "maxPoints",
            });
        }
        if rules.max_team_size == 0 {
            return Err(EngineError::InvalidRules {
                field: "maxTeamSize",
            });
        }
        Ok(rules)
    }
}

/// Re-read a trade written earlier in the same transaction.
fn load_trade(tx: &StoreTx<'_>, game_id: GameId, trade_id: TradeId) -> Result<Trade, EngineError> {
    tx.load_trade(game_id, trade_id)?
        .ok_or_else(|| TradeRejection::TradeNotFound { trade_id }.into())
}

fn log_failure(op: &str, game_id: Option<GameId>, err: &EngineError) {
    if err.is_transient() {
        warn!("{} failed (game {:?}): {}", op, game_id, err);
    } else {
        info!("{} rejected (game {:?}): {} [{}]", op, game_id, err, err.code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::trade::TradeStatus;
    use crate::events::NoopSink;
    use tokio::sync::mpsc;

    fn settings() -> DraftSettings {
        DraftSettings {
            generation: 9,
            owner_privilege: 1,
            default_rules: Rules {
                max_points: 20,
                max_team_size: 3,
            },
        }
    }

    fn ruleset() -> Ruleset {
        Ruleset::new("ou", 9)
            .with_value("garchomp", 8)
            .with_value("starmie", 6)
            .with_value("onix", 2)
            .with_value("koraidon", 0)
    }

    fn joiner(id: &str, priority: i64) -> NewParticipant {
        NewParticipant {
            id: id.to_string(),
            priority,
            rules: None,
        }
    }

    /// Helper: engine with an "ou" ruleset and a game where ash (owner,
    /// priority 2) and misty (priority 1) have joined.
    fn engine_with_game() -> (DraftEngine, GameId, mpsc::Receiver<DraftEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let engine = DraftEngine::new(Database::open(":memory:").unwrap(), tx, settings());
        engine.register_ruleset(&ruleset()).unwrap();
        let game = engine
            .create_game("Indigo League", "ou", joiner("ash", 2))
            .unwrap();
        engine.add_participant(game.id, joiner("misty", 1)).unwrap();
        (engine, game.id, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<DraftEvent>) -> Vec<DraftEvent> {
        let mut events = Vec::new();
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        events
    }

    fn mv(selection_id: i64, from: &str, to: &str) -> Transaction {
        Transaction {
            selection_id,
            expected_old_owner_id: from.to_string(),
            new_owner_id: to.to_string(),
        }
    }

    #[test]
    fn register_ruleset_is_frozen_once_used() {
        let (engine, _game_id, _rx) = engine_with_game();
        assert_eq!(
            engine.register_ruleset(&ruleset()).unwrap(),
            RulesetChange::Unchanged
        );
        let err = engine
            .register_ruleset(&ruleset().with_value("onix", 3))
            .unwrap_err();
        assert_eq!(err.code(), "RULESET_IN_USE");

        let unused = Ruleset::new("lc", 9).with_value("pichu", 2);
        assert_eq!(engine.register_ruleset(&unused).unwrap(), RulesetChange::Inserted);
        assert_eq!(
            engine
                .register_ruleset(&unused.clone().with_value("pichu", 3))
                .unwrap(),
            RulesetChange::Replaced
        );
    }

    #[test]
    fn create_game_requires_known_ruleset() {
        let engine = DraftEngine::new(Database::open(":memory:").unwrap(), NoopSink, settings());
        let err = engine
            .create_game("League", "missing", joiner("ash", 0))
            .unwrap_err();
        assert_eq!(err.code(), "RULESET_NOT_FOUND");
    }

    #[test]
    fn selection_records_canonical_item_id() {
        let (engine, game_id, mut rx) = engine_with_game();
        drain(&mut rx);

        let err = engine
            .propose_selection(game_id, "ash", " Koraidon ")
            .unwrap_err();
        assert_eq!(err.code(), "ITEM_BANNED");
        let err = engine.propose_selection(game_id, "ash", "").unwrap_err();
        assert_eq!(err.code(), "INVALID_ITEM");

        let picked = engine
            .propose_selection(game_id, "ash", "GARCHOMP ")
            .unwrap();
        assert_eq!(picked.item_id, "garchomp");
        match drain(&mut rx).as_slice() {
            [DraftEvent::SelectionAdded { item_id, .. }] => assert_eq!(item_id, "garchomp"),
            other => panic!("expected one SelectionAdded, got {other:?}"),
        }

        let err = engine
            .propose_selection(game_id, "misty", "garchomp")
            .unwrap_err();
        assert_eq!(err.code(), "ALREADY_CLAIMED");
    }

    #[test]
    fn owner_gets_privilege_and_default_rules() {
        let (engine, game_id, mut rx) = engine_with_game();
        let participants = engine.participants(game_id).unwrap();
        assert_eq!(participants[0].id, "ash");
        assert_eq!(participants[0].privilege_level, 1);
        assert_eq!(participants[0].rules, settings().default_rules);
        assert_eq!(participants[1].privilege_level, 0);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|e| matches!(e, DraftEvent::ParticipantJoined { .. })));
    }

    #[test]
    fn join_twice_and_invalid_rules_rejected() {
        let (engine, game_id, _rx) = engine_with_game();
        let err = engine.add_participant(game_id, joiner("misty", 5)).unwrap_err();
        assert_eq!(err.code(), "ALREADY_JOINED");

        let err = engine
            .add_participant(
                game_id,
                NewParticipant {
                    id: "brock".into(),
                    priority: 0,
                    rules: Some(Rules {
                        max_points: 10,
                        max_team_size: 0,
                    }),
                },
            )
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_RULES");

        let err = engine.add_participant(99, joiner("brock", 0)).unwrap_err();
        assert_eq!(err.code(), "GAME_NOT_FOUND");
    }

    #[test]
    fn snake_turns_through_engine() {
        let (engine, game_id, mut rx) = engine_with_game();
        assert_eq!(engine.pick_order(game_id).unwrap(), vec!["ash", "misty"]);

        let err = engine
            .propose_selection(game_id, "misty", "starmie")
            .unwrap_err();
        assert_eq!(err.code(), "NOT_YOUR_TURN");

        engine.propose_selection(game_id, "ash", "garchomp").unwrap();
        assert_eq!(engine.current_drafter(game_id).unwrap().as_deref(), Some("misty"));
        engine.propose_selection(game_id, "misty", "starmie").unwrap();

        // Round 1 reverses: misty then ash.
        assert_eq!(engine.pick_order(game_id).unwrap(), vec!["misty", "ash"]);
        assert_eq!(
            engine.draft_overview(game_id).unwrap(),
            DraftOverview {
                status: DraftStatus::InProgress {
                    drafter: "misty".into(),
                    round: 1
                },
                pick_order: vec!["misty".into(), "ash".into()],
            }
        );
        assert_eq!(
            engine.draft_status(game_id).unwrap(),
            DraftStatus::InProgress {
                drafter: "misty".into(),
                round: 1
            }
        );

        let added: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, DraftEvent::SelectionAdded { .. }))
            .collect();
        assert_eq!(added.len(), 2);
    }

    #[test]
    fn rejected_selection_writes_nothing_and_publishes_nothing() {
        let (engine, game_id, mut rx) = engine_with_game();
        drain(&mut rx);

        let err = engine
            .propose_selection(game_id, "ash", "koraidon")
            .unwrap_err();
        assert_eq!(err.code(), "ITEM_BANNED");
        assert!(engine
            .rosters(game_id)
            .unwrap()
            .iter()
            .all(|r| r.entries.is_empty()));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn trade_lifecycle_moves_ownership() {
        let (engine, game_id, mut rx) = engine_with_game();
        let g = engine.propose_selection(game_id, "ash", "garchomp").unwrap();
        let s = engine.propose_selection(game_id, "misty", "starmie").unwrap();

        let trade = engine
            .create_trade(
                game_id,
                "ash",
                vec![mv(g.id, "ash", "misty"), mv(s.id, "misty", "ash")],
            )
            .unwrap();
        assert_eq!(trade.status, TradeStatus::Proposed);

        let err = engine.execute_trade(game_id, trade.id).unwrap_err();
        assert_eq!(err.code(), "NOT_EXECUTABLE");

        engine.confirm_trade(game_id, trade.id, "ash").unwrap();
        let err = engine.confirm_trade(game_id, trade.id, "ash").unwrap_err();
        assert_eq!(err.code(), "ALREADY_CONFIRMED");
        let confirmed = engine.confirm_trade(game_id, trade.id, "misty").unwrap();
        assert!(confirmed.is_executable());

        let executed = engine.execute_trade(game_id, trade.id).unwrap();
        assert_eq!(executed.status, TradeStatus::Executed);

        let rosters = engine.rosters(game_id).unwrap();
        let ash = rosters.iter().find(|r| r.participant_id == "ash").unwrap();
        assert_eq!(ash.entries[0].item_id, "starmie");
        assert_eq!(ash.point_total, 6);

        // Executed trades are retained but no longer addressable.
        assert_eq!(engine.trades(game_id).unwrap().len(), 1);
        let err = engine.reject_trade(game_id, trade.id, "ash").unwrap_err();
        assert_eq!(err.code(), "TRADE_NOT_FOUND");

        let kinds: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                DraftEvent::TradeProposed { .. } => Some("proposed"),
                DraftEvent::TradeConfirmed { .. } => Some("confirmed"),
                DraftEvent::TradeExecuted { .. } => Some("executed"),
                _ => None,
            })
            .collect();
        assert_eq!(kinds, vec!["proposed", "confirmed", "confirmed", "executed"]);
    }

    #[test]
    fn reject_by_outsider_needs_owner_privilege() {
        let (engine, game_id, _rx) = engine_with_game();
        engine.add_participant(game_id, joiner("brock", 0)).unwrap();
        engine.add_participant(game_id, joiner("gary", 0)).unwrap();
        let s = engine.propose_selection(game_id, "ash", "garchomp").unwrap();
        engine.propose_selection(game_id, "misty", "starmie").unwrap();
        engine.propose_selection(game_id, "brock", "onix").unwrap();

        // misty proposes to take garchomp from ash; brock is an outsider.
        let trade = engine
            .create_trade(game_id, "misty", vec![mv(s.id, "ash", "misty")])
            .unwrap();
        let err = engine.reject_trade(game_id, trade.id, "brock").unwrap_err();
        assert_eq!(err.code(), "NOT_AUTHORIZED");

        // ash, the game owner, may reject a trade between brock and gary.
        let onix = engine
            .rosters(game_id)
            .unwrap()
            .into_iter()
            .find(|r| r.participant_id == "brock")
            .unwrap()
            .entries[0]
            .selection_id;
        let other = engine
            .create_trade(game_id, "gary", vec![mv(onix, "brock", "gary")])
            .unwrap();
        engine.reject_trade(game_id, other.id, "ash").unwrap();
        assert_eq!(engine.trades(game_id).unwrap().len(), 1);
    }

    #[test]
    fn stale_trade_fails_after_conflicting_execute() {
        let (engine, game_id, _rx) = engine_with_game();
        engine.add_participant(game_id, joiner("brock", 0)).unwrap();
        let g = engine.propose_selection(game_id, "ash", "garchomp").unwrap();

        let to_misty = engine
            .create_trade(game_id, "ash", vec![mv(g.id, "ash", "misty")])
            .unwrap();
        let to_brock = engine
            .create_trade(game_id, "ash", vec![mv(g.id, "ash", "brock")])
            .unwrap();
        for (trade, other) in [(&to_misty, "misty"), (&to_brock, "brock")] {
            engine.confirm_trade(game_id, trade.id, "ash").unwrap();
            engine.confirm_trade(game_id, trade.id, other).unwrap();
        }

        engine.execute_trade(game_id, to_misty.id).unwrap();
        let err = engine.execute_trade(game_id, to_brock.id).unwrap_err();
        assert_eq!(err.code(), "OWNERSHIP_CHANGED");

        // The stale trade stays proposed until someone rejects it.
        let trades = engine.trades(game_id).unwrap();
        assert_eq!(trades[1].status, TradeStatus::Proposed);
        engine.reject_trade(game_id, to_brock.id, "brock").unwrap();
        assert_eq!(engine.trades(game_id).unwrap().len(), 1);
    }
}
