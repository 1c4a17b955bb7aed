//! Ziel-Tabelle (`extensions.toml`)
//!
//! ```toml
//! [extensions."100"]
//! name = "Empfang"
//! voice = "alloy"
//! greeting = "Begruesse den Anrufer"
//! instructions = "Du bist der Empfang von ..."
//! ```
//!
//! Unbekannte Ziele fallen auf den ersten Eintrag (nach Schluessel sortiert)
//! zurueck.

use mimir_bridge::{ExtensionConfig, KonfigQuelle};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Default, Deserialize)]
struct ExtensionDatei {
    #[serde(default)]
    extensions: BTreeMap<String, ExtensionConfig>,
}

/// Alle bekannten Anrufziele
#[derive(Debug, Clone, Default)]
pub struct ExtensionRegistry {
    eintraege: BTreeMap<String, ExtensionConfig>,
}

impl ExtensionRegistry {
    /// Laedt die Tabelle; eine fehlende Datei ergibt eine leere Tabelle
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => Self::aus_toml(&inhalt)
                .map_err(|e| anyhow::anyhow!("Ziel-Tabelle '{pfad}' fehlerhaft: {e}")),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(pfad, "Ziel-Tabelle nicht gefunden, keine Ziele konfiguriert");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!("Ziel-Tabelle '{pfad}' nicht lesbar: {e}")),
        }
    }

    pub fn aus_toml(inhalt: &str) -> Result<Self, toml::de::Error> {
        let datei: ExtensionDatei = toml::from_str(inhalt)?;
        tracing::debug!(anzahl = datei.extensions.len(), "Ziel-Tabelle geladen");
        Ok(Self {
            eintraege: datei.extensions,
        })
    }

    pub fn len(&self) -> usize {
        self.eintraege.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eintraege.is_empty()
    }
}

impl KonfigQuelle for ExtensionRegistry {
    fn aufloesen(&self, ziel: &str) -> Option<ExtensionConfig> {
        if let Some(eintrag) = self.eintraege.get(ziel) {
            return Some(eintrag.clone());
        }
        let (standard_ziel, standard) = self.eintraege.iter().next()?;
        tracing::error!(
            ziel,
            ersatz = %standard_ziel,
            "Keine Konfiguration fuer Ziel, verwende Standard-Eintrag"
        );
        Some(standard.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABELLE: &str = r#"
        [extensions."200"]
        name = "Vertrieb"
        voice = "verse"
        greeting = "Frag nach dem Anliegen"
        instructions = "Du bist der Vertrieb"

        [extensions."100"]
        name = "Empfang"
        voice = "alloy"
        greeting = "Begruesse den Anrufer"
        instructions = "Du bist der Empfang"
    "#;

    #[test]
    fn bekanntes_ziel() {
        let registry = ExtensionRegistry::aus_toml(TABELLE).unwrap();
        assert_eq!(registry.len(), 2);
        let ext = registry.aufloesen("200").unwrap();
        assert_eq!(ext.name, "Vertrieb");
        assert_eq!(ext.stimme, "verse");
    }

    #[test]
    fn unbekanntes_ziel_nimmt_ersten_eintrag() {
        let registry = ExtensionRegistry::aus_toml(TABELLE).unwrap();
        // "100" sortiert vor "200"
        let ext = registry.aufloesen("999").unwrap();
        assert_eq!(ext.name, "Empfang");
    }

    #[test]
    fn leere_tabelle() {
        let registry = ExtensionRegistry::aus_toml("").unwrap();
        assert!(registry.is_empty());
        assert!(registry.aufloesen("100").is_none());
    }

    #[test]
    fn fehlendes_feld_ist_fehler() {
        let toml = r#"
            [extensions."100"]
            name = "Empfang"
        "#;
        assert!(ExtensionRegistry::aus_toml(toml).is_err());
    }

    #[test]
    fn fehlende_datei() {
        let registry = ExtensionRegistry::laden("/nicht/vorhanden/extensions.toml").unwrap();
        assert!(registry.is_empty());
    }
}
