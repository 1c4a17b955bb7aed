//! Zustand einer Realtime-Session
//!
//! Zustaende sind total geordnet. Uebergaenge gehen nur vorwaerts,
//! `Beendet` ist von ueberall erreichbar und wird nie wieder verlassen.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Noch kein Transport
    Neu,
    /// Transport offen, `session.update` gesendet
    Verbunden,
    /// `session.created` empfangen
    SessionErstellt,
    /// Begruessung angefordert
    Angenommen,
    /// Erstes Audio der Gegenseite empfangen
    AudioEmpfangen,
    Beendet,
}

impl SessionState {
    /// Prueft, ob der Wechsel nach `ziel` erlaubt ist
    pub fn kann_wechseln_zu(&self, ziel: SessionState) -> bool {
        !self.ist_beendet() && ziel > *self
    }

    pub fn ist_beendet(&self) -> bool {
        *self == Self::Beendet
    }

    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Neu => "neu",
            Self::Verbunden => "verbunden",
            Self::SessionErstellt => "session_erstellt",
            Self::Angenommen => "angenommen",
            Self::AudioEmpfangen => "audio_empfangen",
            Self::Beendet => "beendet",
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Neu
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.als_str())
    }
}
