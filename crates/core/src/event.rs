//! Ereignisse einer Realtime-Session
//!
//! Die Session meldet dem Anruf-Controller genau zwei Dinge: dass die
//! Gegenseite Audio liefert, und dass die Session vorbei ist. Beide
//! Ereignisse werden pro Session hoechstens einmal gesendet.

use serde::{Deserialize, Serialize};

/// Benachrichtigung der Session an den Controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEreignis {
    /// Erstes Audio der Gegenseite empfangen – Anruf kann angenommen werden
    AudioBereit,
    /// Transport geschlossen oder fehlgeschlagen
    Beendet {
        /// Kurzbeschreibung fuer das Log
        grund: String,
    },
}

impl SessionEreignis {
    /// Erstellt ein `Beendet`-Ereignis
    pub fn beendet(grund: impl Into<String>) -> Self {
        Self::Beendet { grund: grund.into() }
    }

    /// Gibt true zurueck, wenn die Session mit diesem Ereignis endet
    pub fn ist_ende(&self) -> bool {
        matches!(self, Self::Beendet { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ende_erkennung() {
        assert!(SessionEreignis::beendet("close").ist_ende());
        assert!(!SessionEreignis::AudioBereit.ist_ende());
    }
}
