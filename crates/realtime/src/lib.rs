//! mimir-realtime – Anbindung an die Realtime-Speech-API
//!
//! ## Module
//! - [`state`] – Zustaende einer Session
//! - [`session`] – Handshake-Zustandsautomat mit Handler-Tabelle
//! - [`transport`] – WebSocket-Verbindung (tokio-tungstenite)

pub mod error;
pub mod session;
pub mod state;
pub mod transport;

pub use error::{RealtimeError, RealtimeResult};
pub use session::{AusgangsKanal, RealtimeSession, SessionParameter};
pub use state::SessionState;
pub use transport::{RealtimeTransport, VerbindungsParameter};
