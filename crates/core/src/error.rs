//! Fehlertypen fuer Mimir
//!
//! Zentraler Fehler-Enum fuer alles, was ueber Crate-Grenzen hinweg
//! gemeldet wird. Untermodule definieren eigene Fehler und konvertieren
//! via `#[from]`.

use thiserror::Error;

/// Globaler Result-Alias fuer Mimir
pub type Result<T> = std::result::Result<T, MimirError>;

/// Alle moeglichen Fehler im Mimir-System
#[derive(Debug, Error)]
pub enum MimirError {
    // --- Verbindung & Netzwerk ---
    #[error("Verbindung fehlgeschlagen: {0}")]
    Verbindung(String),

    #[error("Verbindung getrennt: {0}")]
    Getrennt(String),

    // --- Protokoll ---
    #[error("Ungueltige Nachricht: {0}")]
    UngueltigeNachricht(String),

    // --- Anruf ---
    #[error("Anruf bereits beendet")]
    AnrufBeendet,

    #[error("Keine Konfiguration fuer Ziel '{0}'")]
    ZielUnbekannt(String),

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    // --- Audio ---
    #[error("Audiofehler: {0}")]
    Audio(String),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl MimirError {
    /// Gibt true zurueck wenn der Fehler wiederholbar sein koennte
    pub fn ist_wiederholbar(&self) -> bool {
        matches!(
            self,
            Self::Verbindung(_) | Self::Getrennt(_)
        )
    }
}
