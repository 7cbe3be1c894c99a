// Library root: the WebSocket front end for the draft engine. Exposed as a
// library so integration tests can drive the event loop directly.

pub mod app;
pub mod protocol;
pub mod ws_server;
