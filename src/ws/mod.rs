//! RFC 6455 WebSockets over an upgraded HTTP connection.
//!
//! Only complete text messages reach the application. Fragmented messages
//! are reassembled, pings are answered, and messages larger than
//! [`ServerOptions::max_message_size`](crate::ServerOptions::max_message_size)
//! are skipped without being buffered.

pub mod frame;
mod handshake;
mod socket;

pub use socket::WebSocket;

pub(crate) use handshake::{accept, is_upgrade_request, offered_protocols};
pub(crate) use socket::run;
