// Library root: the draft core (valuation, roster ledger, turn scheduler,
// admission control, trade settlement) plus the SQLite store and the engine
// that ties them together for request handlers.

pub mod config;
pub mod draft;
pub mod engine;
pub mod error;
pub mod events;
pub mod store;
