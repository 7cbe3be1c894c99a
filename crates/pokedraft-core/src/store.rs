// SQLite-backed transactional store for games, rosters, and trades.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::draft::roster::{Participant, Rules, Selection};
use crate::draft::ruleset::Ruleset;
use crate::draft::trade::{Trade, TradeStatus, Transaction};
use crate::draft::{GameId, ParticipantId, SelectionId, TradeId};

/// A draft league instance. All participants, selections, and trades are
/// scoped to one game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub id: GameId,
    pub name: String,
    pub ruleset_id: String,
    pub owner_id: ParticipantId,
    pub created_at: String,
}

/// SQLite persistence for rulesets, games, participants, selections, and
/// trades.
///
/// Every mutation goes through [`Database::write`], which runs the caller's
/// checks and writes inside a single `BEGIN IMMEDIATE` transaction. Writers
/// are serialised, so a check-then-act sequence cannot interleave with
/// another request.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS rulesets (
                id         TEXT PRIMARY KEY,
                generation INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ruleset_values (
                ruleset_id TEXT NOT NULL REFERENCES rulesets(id) ON DELETE CASCADE,
                item_id    TEXT NOT NULL,
                value      INTEGER NOT NULL CHECK (value >= 0),
                PRIMARY KEY (ruleset_id, item_id)
            );

            CREATE TABLE IF NOT EXISTS games (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                name       TEXT NOT NULL,
                ruleset_id TEXT NOT NULL REFERENCES rulesets(id),
                owner_id   TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS participants (
                game_id         INTEGER NOT NULL REFERENCES games(id),
                participant_id  TEXT NOT NULL,
                priority        INTEGER NOT NULL,
                max_points      INTEGER NOT NULL CHECK (max_points > 0),
                max_team_size   INTEGER NOT NULL CHECK (max_team_size > 0),
                privilege_level INTEGER NOT NULL DEFAULT 0,
                joined_at       TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (game_id, participant_id)
            );

            CREATE TABLE IF NOT EXISTS selections (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                game_id    INTEGER NOT NULL,
                item_id    TEXT NOT NULL,
                owner_id   TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                UNIQUE (game_id, item_id),
                FOREIGN KEY (game_id, owner_id) REFERENCES participants(game_id, participant_id)
            );

            CREATE TABLE IF NOT EXISTS trades (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                game_id      INTEGER NOT NULL REFERENCES games(id),
                requester_id TEXT NOT NULL,
                status       TEXT NOT NULL DEFAULT 'proposed',
                created_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                executed_at  TEXT
            );

            CREATE TABLE IF NOT EXISTS trade_transactions (
                trade_id              INTEGER NOT NULL REFERENCES trades(id) ON DELETE CASCADE,
                position              INTEGER NOT NULL,
                selection_id          INTEGER NOT NULL REFERENCES selections(id),
                expected_old_owner_id TEXT NOT NULL,
                new_owner_id          TEXT NOT NULL,
                PRIMARY KEY (trade_id, position)
            );

            CREATE TABLE IF NOT EXISTS trade_confirmations (
                trade_id       INTEGER NOT NULL REFERENCES trades(id) ON DELETE CASCADE,
                participant_id TEXT NOT NULL,
                confirmed_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (trade_id, participant_id)
            );

            CREATE INDEX IF NOT EXISTS idx_selections_game ON selections(game_id);
            CREATE INDEX IF NOT EXISTS idx_trades_game ON trades(game_id);
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    /// Run `f` inside an immediate (write-locking) transaction.
    ///
    /// Commits when `f` returns `Ok`. Any `Err`, from `f` or from the store
    /// itself, rolls the whole transaction back.
    pub fn write<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&StoreTx<'_>) -> std::result::Result<T, E>,
        E: From<anyhow::Error>,
    {
        let mut conn = self.conn();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("failed to begin write transaction")?;
        let store_tx = StoreTx { tx };
        let value = f(&store_tx)?;
        store_tx
            .tx
            .commit()
            .context("failed to commit write transaction")?;
        Ok(value)
    }

    /// Run `f` against a consistent read snapshot.
    pub fn read<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&StoreTx<'_>) -> std::result::Result<T, E>,
        E: From<anyhow::Error>,
    {
        let mut conn = self.conn();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Deferred)
            .context("failed to begin read transaction")?;
        let store_tx = StoreTx { tx };
        let value = f(&store_tx)?;
        store_tx
            .tx
            .commit()
            .context("failed to close read transaction")?;
        Ok(value)
    }
}

/// Store operations available inside a [`Database::write`] or
/// [`Database::read`] transaction.
pub struct StoreTx<'conn> {
    tx: rusqlite::Transaction<'conn>,
}

impl StoreTx<'_> {
    // ------------------------------------------------------------------
    // Rulesets
    // ------------------------------------------------------------------

    pub fn load_ruleset(&self, ruleset_id: &str) -> Result<Option<Ruleset>> {
        let generation: Option<u32> = self
            .tx
            .query_row(
                "SELECT generation FROM rulesets WHERE id = ?1",
                params![ruleset_id],
                |row| row.get(0),
            )
            .optional()
            .context("failed to load ruleset")?;

        let Some(generation) = generation else {
            return Ok(None);
        };

        let mut ruleset = Ruleset::new(ruleset_id, generation);
        let mut stmt = self
            .tx
            .prepare("SELECT item_id, value FROM ruleset_values WHERE ruleset_id = ?1")
            .context("failed to prepare ruleset values query")?;
        let rows = stmt
            .query_map(params![ruleset_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
            })
            .context("failed to query ruleset values")?;
        for row in rows {
            let (item_id, value) = row.context("failed to read ruleset value row")?;
            ruleset.values.insert(item_id, value);
        }

        Ok(Some(ruleset))
    }

    /// Whether any game references `ruleset_id`.
    pub fn ruleset_in_use(&self, ruleset_id: &str) -> Result<bool> {
        let used: bool = self
            .tx
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM games WHERE ruleset_id = ?1)",
                params![ruleset_id],
                |row| row.get(0),
            )
            .context("failed to check ruleset usage")?;
        Ok(used)
    }

    /// Insert `ruleset`, replacing any previous values stored under its id.
    pub fn replace_ruleset(&self, ruleset: &Ruleset) -> Result<()> {
        self.tx
            .execute(
                "INSERT INTO rulesets (id, generation) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET generation = excluded.generation",
                params![ruleset.id, ruleset.generation],
            )
            .context("failed to upsert ruleset")?;
        self.tx
            .execute(
                "DELETE FROM ruleset_values WHERE ruleset_id = ?1",
                params![ruleset.id],
            )
            .context("failed to clear ruleset values")?;

        let mut stmt = self
            .tx
            .prepare("INSERT INTO ruleset_values (ruleset_id, item_id, value) VALUES (?1, ?2, ?3)")
            .context("failed to prepare ruleset value insert")?;
        for (item_id, value) in &ruleset.values {
            stmt.execute(params![ruleset.id, item_id, value])
                .context("failed to insert ruleset value")?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Games and participants
    // ------------------------------------------------------------------

    pub fn insert_game(&self, name: &str, ruleset_id: &str, owner_id: &str) -> Result<GameId> {
        let id: GameId = self
            .tx
            .query_row(
                "INSERT INTO games (name, ruleset_id, owner_id) VALUES (?1, ?2, ?3) RETURNING id",
                params![name, ruleset_id, owner_id],
                |row| row.get(0),
            )
            .context("failed to insert game")?;
        Ok(id)
    }

    pub fn load_game(&self, game_id: GameId) -> Result<Option<Game>> {
        self.tx
            .query_row(
                "SELECT id, name, ruleset_id, owner_id, created_at FROM games WHERE id = ?1",
                params![game_id],
                |row| {
                    Ok(Game {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        ruleset_id: row.get(2)?,
                        owner_id: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                },
            )
            .optional()
            .context("failed to load game")
    }

    /// Add `participant` to the game. Returns `false` if they already joined.
    pub fn insert_participant(&self, game_id: GameId, participant: &Participant) -> Result<bool> {
        let inserted = self
            .tx
            .execute(
                "INSERT OR IGNORE INTO participants
                    (game_id, participant_id, priority, max_points, max_team_size, privilege_level)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    game_id,
                    participant.id,
                    participant.priority,
                    participant.rules.max_points,
                    participant.rules.max_team_size,
                    participant.privilege_level,
                ],
            )
            .context("failed to insert participant")?;
        Ok(inserted == 1)
    }

    /// All participants of a game, sorted by id.
    pub fn load_participants(&self, game_id: GameId) -> Result<Vec<Participant>> {
        let mut stmt = self
            .tx
            .prepare(
                "SELECT participant_id, priority, max_points, max_team_size, privilege_level
                 FROM participants WHERE game_id = ?1 ORDER BY participant_id",
            )
            .context("failed to prepare load_participants query")?;

        let participants = stmt
            .query_map(params![game_id], |row| {
                Ok(Participant {
                    id: row.get(0)?,
                    priority: row.get(1)?,
                    rules: Rules {
                        max_points: row.get(2)?,
                        max_team_size: row.get(3)?,
                    },
                    privilege_level: row.get(4)?,
                })
            })
            .context("failed to query participants")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map participant rows")?;

        Ok(participants)
    }

    // ------------------------------------------------------------------
    // Selections
    // ------------------------------------------------------------------

    /// All selections of a game, in creation order.
    pub fn load_selections(&self, game_id: GameId) -> Result<Vec<Selection>> {
        let mut stmt = self
            .tx
            .prepare("SELECT id, item_id, owner_id FROM selections WHERE game_id = ?1 ORDER BY id")
            .context("failed to prepare load_selections query")?;

        let selections = stmt
            .query_map(params![game_id], |row| {
                Ok(Selection {
                    id: row.get(0)?,
                    item_id: row.get(1)?,
                    owner_id: row.get(2)?,
                })
            })
            .context("failed to query selections")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map selection rows")?;

        Ok(selections)
    }

    /// Record a new selection. The `(game_id, item_id)` uniqueness constraint
    /// backs up the admission check.
    pub fn insert_selection(
        &self,
        game_id: GameId,
        item_id: &str,
        owner_id: &str,
    ) -> Result<SelectionId> {
        let id: SelectionId = self
            .tx
            .query_row(
                "INSERT INTO selections (game_id, item_id, owner_id) VALUES (?1, ?2, ?3) RETURNING id",
                params![game_id, item_id, owner_id],
                |row| row.get(0),
            )
            .context("failed to insert selection")?;
        Ok(id)
    }

    /// Compare-and-swap the owner of every selection in `moves`.
    ///
    /// Returns `false` as soon as one selection is not owned by its expected
    /// owner. Earlier updates in the same call have already been applied at
    /// that point, so the caller must abort the transaction.
    pub fn reassign_owners(&self, game_id: GameId, moves: &[Transaction]) -> Result<bool> {
        let mut stmt = self
            .tx
            .prepare(
                "UPDATE selections SET owner_id = ?1
                 WHERE id = ?2 AND game_id = ?3 AND owner_id = ?4",
            )
            .context("failed to prepare owner update")?;
        for m in moves {
            let changed = stmt
                .execute(params![
                    m.new_owner_id,
                    m.selection_id,
                    game_id,
                    m.expected_old_owner_id
                ])
                .context("failed to update selection owner")?;
            if changed != 1 {
                return Ok(false);
            }
        }
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Trades
    // ------------------------------------------------------------------

    pub fn insert_trade(
        &self,
        game_id: GameId,
        requester_id: &str,
        transactions: &[Transaction],
    ) -> Result<TradeId> {
        let trade_id: TradeId = self
            .tx
            .query_row(
                "INSERT INTO trades (game_id, requester_id, status) VALUES (?1, ?2, ?3) RETURNING id",
                params![game_id, requester_id, TradeStatus::Proposed.as_str()],
                |row| row.get(0),
            )
            .context("failed to insert trade")?;

        let mut stmt = self
            .tx
            .prepare(
                "INSERT INTO trade_transactions
                    (trade_id, position, selection_id, expected_old_owner_id, new_owner_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .context("failed to prepare trade transaction insert")?;
        for (position, t) in transactions.iter().enumerate() {
            stmt.execute(params![
                trade_id,
                position as i64,
                t.selection_id,
                t.expected_old_owner_id,
                t.new_owner_id
            ])
            .context("failed to insert trade transaction")?;
        }

        Ok(trade_id)
    }

    /// Load a trade of `game_id`, proposed or executed.
    pub fn load_trade(&self, game_id: GameId, trade_id: TradeId) -> Result<Option<Trade>> {
        let header = self
            .tx
            .query_row(
                "SELECT id, game_id, requester_id, status, created_at, executed_at
                 FROM trades WHERE id = ?1 AND game_id = ?2",
                params![trade_id, game_id],
                trade_header,
            )
            .optional()
            .context("failed to load trade")?;

        match header {
            Some(header) => Ok(Some(self.hydrate_trade(header)?)),
            None => Ok(None),
        }
    }

    /// All trades of a game (proposed and executed), oldest first.
    pub fn load_trades(&self, game_id: GameId) -> Result<Vec<Trade>> {
        let headers = {
            let mut stmt = self
                .tx
                .prepare(
                    "SELECT id, game_id, requester_id, status, created_at, executed_at
                     FROM trades WHERE game_id = ?1 ORDER BY id",
                )
                .context("failed to prepare load_trades query")?;
            let rows = stmt
                .query_map(params![game_id], trade_header)
                .context("failed to query trades")?
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("failed to map trade rows")?;
            rows
        };

        headers
            .into_iter()
            .map(|header| self.hydrate_trade(header))
            .collect()
    }

    /// Record a confirmation. Returns `false` if it was already recorded.
    pub fn insert_confirmation(&self, trade_id: TradeId, participant_id: &str) -> Result<bool> {
        let inserted = self
            .tx
            .execute(
                "INSERT OR IGNORE INTO trade_confirmations (trade_id, participant_id) VALUES (?1, ?2)",
                params![trade_id, participant_id],
            )
            .context("failed to insert trade confirmation")?;
        Ok(inserted == 1)
    }

    pub fn mark_trade_executed(&self, trade_id: TradeId) -> Result<()> {
        let executed_at = chrono::Utc::now()
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string();
        self.tx
            .execute(
                "UPDATE trades SET status = ?1, executed_at = ?2 WHERE id = ?3",
                params![TradeStatus::Executed.as_str(), executed_at, trade_id],
            )
            .context("failed to mark trade executed")?;
        Ok(())
    }

    /// Delete a trade with its transactions and confirmations. Returns
    /// `false` if no such trade existed.
    pub fn delete_trade(&self, trade_id: TradeId) -> Result<bool> {
        let deleted = self
            .tx
            .execute("DELETE FROM trades WHERE id = ?1", params![trade_id])
            .context("failed to delete trade")?;
        Ok(deleted == 1)
    }

    fn hydrate_trade(&self, header: TradeHeader) -> Result<Trade> {
        let status = TradeStatus::parse(&header.status)
            .with_context(|| format!("unknown trade status `{}`", header.status))?;

        let transactions = {
            let mut stmt = self
                .tx
                .prepare(
                    "SELECT selection_id, expected_old_owner_id, new_owner_id
                     FROM trade_transactions WHERE trade_id = ?1 ORDER BY position",
                )
                .context("failed to prepare trade transactions query")?;
            let rows = stmt
                .query_map(params![header.id], |row| {
                    Ok(Transaction {
                        selection_id: row.get(0)?,
                        expected_old_owner_id: row.get(1)?,
                        new_owner_id: row.get(2)?,
                    })
                })
                .context("failed to query trade transactions")?
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("failed to map trade transaction rows")?;
            rows
        };

        let confirmations = {
            let mut stmt = self
                .tx
                .prepare("SELECT participant_id FROM trade_confirmations WHERE trade_id = ?1")
                .context("failed to prepare trade confirmations query")?;
            let rows = stmt
                .query_map(params![header.id], |row| row.get::<_, String>(0))
                .context("failed to query trade confirmations")?
                .collect::<std::result::Result<BTreeSet<_>, _>>()
                .context("failed to map trade confirmation rows")?;
            rows
        };

        Ok(Trade {
            id: header.id,
            game_id: header.game_id,
            requester_id: header.requester_id,
            transactions,
            confirmations,
            status,
            created_at: header.created_at,
            executed_at: header.executed_at,
        })
    }
}

/// Raw `trades` row before transactions and confirmations are attached.
struct TradeHeader {
    id: TradeId,
    game_id: GameId,
    requester_id: String,
    status: String,
    created_at: String,
    executed_at: Option<String>,
}

fn trade_header(row: &rusqlite::Row<'_>) -> rusqlite::Result<TradeHeader> {
    Ok(TradeHeader {
        id: row.get(0)?,
        game_id: row.get(1)?,
        requester_id: row.get(2)?,
        status: row.get(3)?,
        created_at: row.get(4)?,
        executed_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: create a fresh in-memory database for each test.
    fn test_db() -> Database {
        Database::open(":memory:").expect("in-memory database should open")
    }

    fn player(id: &str, priority: i64) -> Participant {
        Participant {
            id: id.to_string(),
            priority,
            rules: Rules {
                max_points: 20,
                max_team_size: 6,
            },
            privilege_level: 0,
        }
    }

    /// Helper: a game on the "ou" ruleset with ash and misty joined.
    fn seeded_game(db: &Database) -> GameId {
        db.write(|tx| -> Result<GameId> {
            tx.replace_ruleset(&Ruleset::new("ou", 9).with_value("garchomp", 8))?;
            let game_id = tx.insert_game("Indigo League", "ou", "ash")?;
            tx.insert_participant(game_id, &player("ash", 2))?;
            tx.insert_participant(game_id, &player("misty", 1))?;
            Ok(game_id)
        })
        .unwrap()
    }

    fn mv(selection_id: SelectionId, from: &str, to: &str) -> Transaction {
        Transaction {
            selection_id,
            expected_old_owner_id: from.to_string(),
            new_owner_id: to.to_string(),
        }
    }

    // ------------------------------------------------------------------
    // Schema / open
    // ------------------------------------------------------------------

    #[test]
    fn open_creates_tables() {
        let db = test_db();
        let conn = db.conn();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in [
            "games",
            "participants",
            "ruleset_values",
            "rulesets",
            "selections",
            "trade_confirmations",
            "trade_transactions",
            "trades",
        ] {
            assert!(tables.contains(&table.to_string()), "missing table {table}");
        }
    }

    // ------------------------------------------------------------------
    // Rulesets
    // ------------------------------------------------------------------

    #[test]
    fn ruleset_round_trip_and_replace() {
        let db = test_db();
        let rs = Ruleset::new("ou", 9)
            .with_value("garchomp", 18)
            .with_value("koraidon", 0);

        db.write(|tx| tx.replace_ruleset(&rs)).unwrap();
        let loaded = db.read(|tx| tx.load_ruleset("ou")).unwrap();
        assert_eq!(loaded, Some(rs));

        let smaller = Ruleset::new("ou", 9).with_value("garchomp", 12);
        db.write(|tx| tx.replace_ruleset(&smaller)).unwrap();
        let loaded = db.read(|tx| tx.load_ruleset("ou")).unwrap().unwrap();
        assert_eq!(loaded.values.len(), 1);
        assert_eq!(loaded.value_of("garchomp"), 12);
    }

    #[test]
    fn missing_ruleset_is_none() {
        let db = test_db();
        assert!(db.read(|tx| tx.load_ruleset("nope")).unwrap().is_none());
    }

    #[test]
    fn ruleset_in_use_after_game_created() {
        let db = test_db();
        db.write(|tx| tx.replace_ruleset(&Ruleset::new("ou", 9))).unwrap();
        assert!(!db.read(|tx| tx.ruleset_in_use("ou")).unwrap());
        db.write(|tx| tx.insert_game("League", "ou", "ash")).unwrap();
        assert!(db.read(|tx| tx.ruleset_in_use("ou")).unwrap());
    }

    // ------------------------------------------------------------------
    // Games, participants, selections
    // ------------------------------------------------------------------

    #[test]
    fn game_and_participants_round_trip() {
        let db = test_db();
        let game_id = seeded_game(&db);

        let game = db.read(|tx| tx.load_game(game_id)).unwrap().unwrap();
        assert_eq!(game.name, "Indigo League");
        assert_eq!(game.ruleset_id, "ou");
        assert_eq!(game.owner_id, "ash");
        assert!(game.created_at.contains('T'));

        let participants = db.read(|tx| tx.load_participants(game_id)).unwrap();
        assert_eq!(participants, vec![player("ash", 2), player("misty", 1)]);
    }

    #[test]
    fn duplicate_participant_is_ignored() {
        let db = test_db();
        let game_id = seeded_game(&db);
        let inserted = db
            .write(|tx| tx.insert_participant(game_id, &player("ash", 9)))
            .unwrap();
        assert!(!inserted);
        let participants = db.read(|tx| tx.load_participants(game_id)).unwrap();
        assert_eq!(participants[0].priority, 2);
    }

    #[test]
    fn item_unique_within_game_only() {
        let db = test_db();
        let game_a = seeded_game(&db);
        let game_b = seeded_game(&db);

        db.write(|tx| tx.insert_selection(game_a, "garchomp", "ash"))
            .unwrap();
        db.write(|tx| tx.insert_selection(game_b, "garchomp", "misty"))
            .unwrap();

        let dup = db.write(|tx| tx.insert_selection(game_a, "garchomp", "misty"));
        assert!(dup.is_err());

        assert_eq!(db.read(|tx| tx.load_selections(game_a)).unwrap().len(), 1);
        assert_eq!(db.read(|tx| tx.load_selections(game_b)).unwrap().len(), 1);
    }

    #[test]
    fn selection_owner_must_be_participant() {
        let db = test_db();
        let game_id = seeded_game(&db);
        let result = db.write(|tx| tx.insert_selection(game_id, "garchomp", "gary"));
        assert!(result.is_err());
    }

    // ------------------------------------------------------------------
    // Owner compare-and-swap
    // ------------------------------------------------------------------

    #[test]
    fn reassign_owners_applies_all_moves() {
        let db = test_db();
        let game_id = seeded_game(&db);
        let (s1, s2) = db
            .write(|tx| -> Result<_> {
                Ok((
                    tx.insert_selection(game_id, "garchomp", "ash")?,
                    tx.insert_selection(game_id, "starmie", "misty")?,
                ))
            })
            .unwrap();

        let ok = db
            .write(|tx| tx.reassign_owners(game_id, &[mv(s1, "ash", "misty"), mv(s2, "misty", "ash")]))
            .unwrap();
        assert!(ok);

        let selections = db.read(|tx| tx.load_selections(game_id)).unwrap();
        assert_eq!(selections[0].owner_id, "misty");
        assert_eq!(selections[1].owner_id, "ash");
    }

    #[test]
    fn failed_swap_rolls_back_earlier_moves() {
        let db = test_db();
        let game_id = seeded_game(&db);
        let (s1, s2) = db
            .write(|tx| -> Result<_> {
                Ok((
                    tx.insert_selection(game_id, "garchomp", "ash")?,
                    tx.insert_selection(game_id, "starmie", "misty")?,
                ))
            })
            .unwrap();

        // Second move expects the wrong owner; the closure turns `false`
        // into an error so the first move is rolled back.
        let result = db.write(|tx| -> Result<()> {
            let ok = tx.reassign_owners(game_id, &[mv(s1, "ash", "misty"), mv(s2, "ash", "misty")])?;
            anyhow::ensure!(ok, "ownership changed");
            Ok(())
        });
        assert!(result.is_err());

        let selections = db.read(|tx| tx.load_selections(game_id)).unwrap();
        assert_eq!(selections[0].owner_id, "ash");
        assert_eq!(selections[1].owner_id, "misty");
    }

    // ------------------------------------------------------------------
    // Trades
    // ------------------------------------------------------------------

    #[test]
    fn trade_round_trip_with_confirmations() {
        let db = test_db();
        let game_id = seeded_game(&db);
        let s1 = db
            .write(|tx| tx.insert_selection(game_id, "garchomp", "ash"))
            .unwrap();

        let trade_id = db
            .write(|tx| tx.insert_trade(game_id, "ash", &[mv(s1, "ash", "misty")]))
            .unwrap();
        assert!(db.write(|tx| tx.insert_confirmation(trade_id, "misty")).unwrap());
        assert!(!db.write(|tx| tx.insert_confirmation(trade_id, "misty")).unwrap());

        let trade = db.read(|tx| tx.load_trade(game_id, trade_id)).unwrap().unwrap();
        assert_eq!(trade.requester_id, "ash");
        assert_eq!(trade.status, TradeStatus::Proposed);
        assert_eq!(trade.transactions, vec![mv(s1, "ash", "misty")]);
        assert_eq!(trade.confirmations.len(), 1);
        assert!(trade.executed_at.is_none());

        // Trades are scoped to their game.
        assert!(db.read(|tx| tx.load_trade(game_id + 1, trade_id)).unwrap().is_none());
    }

    #[test]
    fn executed_trade_is_retained_with_timestamp() {
        let db = test_db();
        let game_id = seeded_game(&db);
        let s1 = db
            .write(|tx| tx.insert_selection(game_id, "garchomp", "ash"))
            .unwrap();
        let trade_id = db
            .write(|tx| tx.insert_trade(game_id, "ash", &[mv(s1, "ash", "misty")]))
            .unwrap();

        db.write(|tx| tx.mark_trade_executed(trade_id)).unwrap();

        let trades = db.read(|tx| tx.load_trades(game_id)).unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].status, TradeStatus::Executed);
        assert!(trades[0].executed_at.as_deref().unwrap().ends_with('Z'));
    }

    #[test]
    fn delete_trade_cascades() {
        let db = test_db();
        let game_id = seeded_game(&db);
        let s1 = db
            .write(|tx| tx.insert_selection(game_id, "garchomp", "ash"))
            .unwrap();
        let trade_id = db
            .write(|tx| tx.insert_trade(game_id, "ash", &[mv(s1, "ash", "misty")]))
            .unwrap();
        db.write(|tx| tx.insert_confirmation(trade_id, "ash")).unwrap();

        assert!(db.write(|tx| tx.delete_trade(trade_id)).unwrap());
        assert!(!db.write(|tx| tx.delete_trade(trade_id)).unwrap());

        let conn = db.conn();
        let leftovers: i64 = conn
            .query_row(
                "SELECT (SELECT COUNT(*) FROM trade_transactions) + (SELECT COUNT(*) FROM trade_confirmations)",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn on_disk_database_persists_across_open() {
        let db_path = std::env::temp_dir().join(format!("pokedraft_store_{}.db", std::process::id()));
        let db_path_str = db_path.to_str().unwrap();
        let _ = std::fs::remove_file(&db_path);

        let game_id = {
            let db = Database::open(db_path_str).unwrap();
            seeded_game(&db)
        };

        let db = Database::open(db_path_str).expect("reopen should succeed");
        let game = db.read(|tx| tx.load_game(game_id)).unwrap();
        assert!(game.is_some());

        drop(db);
        let _ = std::fs::remove_file(&db_path);
        let _ = std::fs::remove_file(format!("{}-wal", db_path_str));
        let _ = std::fs::remove_file(format!("{}-shm", db_path_str));
    }
}
