//! mimir-protocol – Protokoll-Definitionen
//!
//! - [`voice`] – RTP-Header, Paketbau und -parsing fuer die Telefonie-Seite
//! - [`realtime`] – JSON-Nachrichten der Realtime-Speech-API

pub mod realtime;
pub mod voice;

pub use realtime::{AudioFormat, ClientNachricht, ServerNachricht, SessionKonfiguration};
pub use voice::{PayloadTyp, RtpFramer, RtpHeader, FRAME_GROESSE, HEADER_GROESSE};
