//! Fehlertypen fuer die Realtime-Session

use thiserror::Error;

/// Alle moeglichen Fehler der Realtime-Anbindung
#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("Verbindung fehlgeschlagen: {0}")]
    Verbindung(String),

    #[error("Transport geschlossen")]
    Geschlossen,

    #[error("Ausgangs-Queue voll, Nachricht verworfen")]
    AusgangVoll,

    #[error("Ungueltige Verbindungsparameter: {0}")]
    Konfiguration(String),

    #[error("JSON-Fehler: {0}")]
    Json(#[from] serde_json::Error),
}

pub type RealtimeResult<T> = Result<T, RealtimeError>;

impl From<RealtimeError> for mimir_core::MimirError {
    fn from(e: RealtimeError) -> Self {
        match e {
            RealtimeError::Verbindung(msg) => Self::Verbindung(msg),
            RealtimeError::Geschlossen => Self::Getrennt("Realtime-Transport".into()),
            RealtimeError::Konfiguration(msg) => Self::Konfiguration(msg),
            RealtimeError::Json(e) => Self::UngueltigeNachricht(e.to_string()),
            andere => Self::Intern(andere.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mimir_core::MimirError;

    #[test]
    fn konvertierung_in_mimir_error() {
        let e: MimirError = RealtimeError::Verbindung("dns".into()).into();
        assert!(e.ist_wiederholbar());
        let e: MimirError = RealtimeError::Geschlossen.into();
        assert!(matches!(e, MimirError::Getrennt(_)));
    }
}
