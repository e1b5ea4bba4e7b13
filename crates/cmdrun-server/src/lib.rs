//! WebSocket front end: routes upgrade requests to command ids and drives
//! one PTY session per connection.

pub mod connection;
pub mod protocol;
pub mod route;
pub mod server;

pub use connection::{handle_connection, ProtocolConfig};
pub use protocol::{CloseKind, Inbound, InboundMessage, OutboundMessage, ProtocolError};
pub use route::{parse_route, CommandRoute};
pub use server::{serve, ServerState};
