//! mimir-bridge – Ein Anruf, eine Pipeline
//!
//! Setzt fuer jeden angenommenen Anruf die Bausteine aus `mimir-voice` und
//! `mimir-realtime` zusammen und bindet ihren Lebenszyklus an die
//! Signalisierung.
//!
//! ## Architektur
//!
//! ```text
//! Signalisierung  <--annehmen/beenden--  CallController
//!                                             |
//!                                             v
//!                                       RealtimeBridge
//!                                        |          |
//!           RtpKanal -> JitterBuffer --250ms--> RealtimeTransport (WebSocket)
//!           RtpKanal <- AusgangsPacer <--20ms-- AudioAusgabe <- RealtimeSession
//! ```

pub mod bridge;
pub mod controller;
pub mod error;
pub mod signaling;

pub use bridge::{BridgeConfig, RealtimeBridge, STANDARD_FLUSH_INTERVALL};
pub use controller::{AbwicklungsErgebnis, CallController};
pub use error::{BridgeError, BridgeResult};
pub use signaling::{ExtensionConfig, KonfigQuelle, MedienFluss, MedienSpec, Signalisierung};
