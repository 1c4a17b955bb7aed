//! Identifikationstypen fuer Mimir
//!
//! Newtype-Pattern, damit Anruf-IDs nicht mit anderen UUIDs verwechselt
//! werden koennen.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Eindeutige ID eines Anrufs (eine Bridge-Instanz pro Anruf)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(pub Uuid);

impl CallId {
    /// Erstellt eine neue zufaellige CallId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "call:{}", self.0)
    }
}
