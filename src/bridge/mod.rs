//! WebSocket bridge between local PTY sessions and display surfaces

pub mod protocol;
pub mod server;
pub mod token;

pub use protocol::{ProtocolError, RelayCommand, RelayEvent};
pub use server::{BridgeError, WsBridge};
pub use token::{generate_token, validate_token};
