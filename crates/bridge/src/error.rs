//! Fehlertypen fuer den Anruf-Controller

use mimir_realtime::RealtimeError;
use mimir_voice::VoiceError;
use thiserror::Error;

/// Fehler beim Auf- und Abbau einer Anruf-Pipeline
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Medien bereits gestartet")]
    BereitsGestartet,

    #[error("Bridge bereits angehalten")]
    Angehalten,

    #[error("Keine Konfiguration fuer Ziel '{0}'")]
    ZielUnbekannt(String),

    /// Fehler der Signalisierungsschicht (annehmen/beenden)
    #[error("Signalisierung: {0}")]
    Signalisierung(String),

    #[error("Voice-Fehler: {0}")]
    Voice(#[from] VoiceError),

    #[error("Realtime-Fehler: {0}")]
    Realtime(#[from] RealtimeError),
}

impl BridgeError {
    /// Erstellt einen Signalisierungsfehler
    pub fn signalisierung(msg: impl Into<String>) -> Self {
        Self::Signalisierung(msg.into())
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;

impl From<BridgeError> for mimir_core::MimirError {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::Voice(e) => e.into(),
            BridgeError::Realtime(e) => e.into(),
            BridgeError::ZielUnbekannt(ziel) => Self::ZielUnbekannt(ziel),
            BridgeError::Angehalten => Self::AnrufBeendet,
            andere => Self::Intern(andere.to_string()),
        }
    }
}
