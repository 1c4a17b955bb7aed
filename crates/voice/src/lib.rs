//! mimir-voice – Voice-Pipeline eines Anrufs
//!
//! Alles, was zwischen dem RTP-Socket und der Realtime-Session liegt.
//!
//! ## Module
//! - [`jitter_buffer`] – Sortierender Reassembly-Buffer fuer eingehende Pakete
//! - [`ausgabe`] – Begrenzte Ausgangs-Queue und Frame-Zerlegung
//! - [`timing`] – Timing-Metriken und Timing-Profile
//! - [`ring`] – Ringpuffer fuer den adaptiven Sendemodus
//! - [`pacing`] – Taktgeber und Ausgangs-Pacer
//! - [`udp`] – Lokaler RTP-Socket

pub mod ausgabe;
pub mod error;
pub mod jitter_buffer;
pub mod pacing;
pub mod ring;
pub mod timing;
pub mod udp;

pub use ausgabe::{AudioAusgabe, AusgabeConfig};
pub use error::{VoiceError, VoiceResult};
pub use jitter_buffer::JitterBuffer;
pub use pacing::{
    AusgangsPacer, JitterBeobachter, PacerConfig, PacerStatus, PaketSenke, TaktStrategie, Taktgeber,
};
pub use timing::{RtpTimingConfig, TimingMetrics, TimingPreset};
pub use udp::{RtpKanal, UdpSenke};
