// Pure draft logic. Nothing in here touches the store; every function takes
// a snapshot and returns a decision.

pub mod admission;
pub mod roster;
pub mod ruleset;
pub mod scheduler;
pub mod trade;

/// Store-assigned game identifier.
pub type GameId = i64;
/// Participant (user) identifier, unique within a game.
pub type ParticipantId = String;
/// Catalog item identifier (a Pokémon species slug such as "garchomp").
pub type ItemId = String;
/// Store-assigned selection identifier. Preserved across trades.
pub type SelectionId = i64;
/// Store-assigned trade identifier.
pub type TradeId = i64;
