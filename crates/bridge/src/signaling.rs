//! Schnittstellen zur Signalisierung und zur Ziel-Konfiguration
//!
//! Die eigentliche Signalisierung (Anruf annehmen, auflegen) und das
//! Nachschlagen der Ziel-Konfiguration liegen ausserhalb von Mimir. Beide
//! werden hier nur als Traits beschrieben.

use crate::error::BridgeResult;
use mimir_protocol::realtime::AudioFormat;
use mimir_protocol::PayloadTyp;
use mimir_realtime::SessionParameter;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Abtastrate von G.711
pub const ABTASTRATE: u32 = 8000;

// ---------------------------------------------------------------------------
// MedienSpec / MedienFluss
// ---------------------------------------------------------------------------

/// Beschreibung des Medienstroms, die beim Annehmen ausgehandelt wird
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MedienSpec {
    pub payload_typ: PayloadTyp,
    pub abtastrate: u32,
    /// Bytes pro Frame
    pub frame_groesse: usize,
    /// Paketintervall in Millisekunden
    pub ptime_ms: u32,
}

impl MedienSpec {
    pub fn neu(payload_typ: PayloadTyp, frame_groesse: usize, intervall: Duration) -> Self {
        Self {
            payload_typ,
            abtastrate: ABTASTRATE,
            frame_groesse,
            ptime_ms: u32::try_from(intervall.as_millis()).unwrap_or(u32::MAX),
        }
    }

    /// `a=rtpmap`-Wert, z.B. `0 PCMU/8000`
    pub fn rtpmap(&self) -> String {
        format!(
            "{} {}/{}",
            self.payload_typ as u8,
            self.payload_typ.name(),
            self.abtastrate
        )
    }
}

/// Lokale und entfernte RTP-Adresse eines Anrufs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MedienFluss {
    pub lokal: SocketAddr,
    pub gegenstelle: SocketAddr,
}

// ---------------------------------------------------------------------------
// Signalisierung
// ---------------------------------------------------------------------------

/// Signalisierungsseite eines einzelnen Anrufs
///
/// Beide Methoden werden vom Controller pro Anruf hoechstens einmal
/// aufgerufen.
pub trait Signalisierung: Send + Sync {
    /// Nimmt den Anruf mit dem angegebenen Medienformat an
    fn annehmen(&self, spec: &MedienSpec) -> BridgeResult<()>;

    /// Beendet den Anruf
    fn beenden(&self) -> BridgeResult<()>;
}

// ---------------------------------------------------------------------------
// Ziel-Konfiguration
// ---------------------------------------------------------------------------

/// Gespraechsparameter eines Anrufziels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionConfig {
    pub name: String,
    #[serde(rename = "voice")]
    pub stimme: String,
    #[serde(rename = "greeting")]
    pub begruessung: String,
    #[serde(rename = "instructions")]
    pub anweisungen: String,
}

impl ExtensionConfig {
    /// Session-Inhalt fuer das gegebene Audioformat
    pub fn session_parameter(&self, format: AudioFormat) -> SessionParameter {
        SessionParameter {
            anweisungen: self.anweisungen.clone(),
            stimme: self.stimme.clone(),
            begruessung: self.begruessung.clone(),
            format,
        }
    }
}

/// Liefert die Konfiguration fuer ein Anrufziel
pub trait KonfigQuelle: Send + Sync {
    fn aufloesen(&self, ziel: &str) -> Option<ExtensionConfig>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rtpmap_pcmu_und_pcma() {
        let spec = MedienSpec::neu(PayloadTyp::Pcmu, 160, Duration::from_millis(20));
        assert_eq!(spec.rtpmap(), "0 PCMU/8000");
        assert_eq!(spec.ptime_ms, 20);

        let spec = MedienSpec::neu(PayloadTyp::Pcma, 160, Duration::from_millis(20));
        assert_eq!(spec.rtpmap(), "8 PCMA/8000");
    }

    #[test]
    fn extension_in_session_parameter() {
        let ext = ExtensionConfig {
            name: "Empfang".into(),
            stimme: "alloy".into(),
            begruessung: "Begruesse den Anrufer".into(),
            anweisungen: "Du bist der Empfang".into(),
        };
        let p = ext.session_parameter(AudioFormat::G711Alaw);
        assert_eq!(p.stimme, "alloy");
        assert_eq!(p.begruessung, "Begruesse den Anrufer");
        assert_eq!(p.anweisungen, "Du bist der Empfang");
        assert_eq!(p.format, AudioFormat::G711Alaw);
    }
}
