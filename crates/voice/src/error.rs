//! Fehlertypen fuer die Voice-Pipeline

use thiserror::Error;

/// Alle moeglichen Fehler der Voice-Pipeline
#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("Senden fehlgeschlagen: {0}")]
    Senden(String),

    #[error("Socket-Puffer voll, Paket verworfen")]
    SocketVoll,

    #[error("Keine Tokio-Laufzeit fuer kooperativen Takt verfuegbar")]
    KeineLaufzeit,

    #[error("Takt-Thread konnte nicht gestartet werden: {0}")]
    TaktThread(String),

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

pub type VoiceResult<T> = Result<T, VoiceError>;

impl From<VoiceError> for mimir_core::MimirError {
    fn from(e: VoiceError) -> Self {
        match e {
            VoiceError::Io(io) => Self::Io(io),
            VoiceError::Konfiguration(msg) => Self::Konfiguration(msg),
            andere => Self::Audio(andere.to_string()),
        }
    }
}
