//! WebSocket connection and server layer (spec §4.1, §4.2).

pub mod connection;
pub mod frame;
pub mod server;

pub use connection::{Connection, UserData};
pub use frame::{Frame, Opcode};
pub use server::{WsCallbacks, WsServer, WsServerConfig};
