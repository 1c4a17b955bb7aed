//! Realtime-Speech-Protokoll (JSON ueber WebSocket)
//!
//! Gesendete Nachrichten sind getypte serde-Strukturen, empfangene werden
//! nur bis zum `type`-Feld vorsortiert; die Auswertung der restlichen
//! Felder uebernimmt der jeweilige Handler der Session.
//!
//! ## Gesendet
//! - `session.update` – Instruktionen, Stimme, Audioformate, Turn-Detection
//! - `response.create` – Begruessung als Antwort-Instruktion
//! - `input_audio_buffer.append` – Base64-kodiertes Anrufer-Audio
//!
//! ## Empfangen
//! `session.created`, `session.updated`, `response.audio.delta`,
//! `response.audio.done`, `input_audio_buffer.speech_started`, `error`

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Nachrichtentypen der Gegenstelle
pub mod typ {
    pub const SESSION_CREATED: &str = "session.created";
    pub const SESSION_UPDATED: &str = "session.updated";
    pub const AUDIO_DELTA: &str = "response.audio.delta";
    pub const AUDIO_DONE: &str = "response.audio.done";
    pub const SPEECH_STARTED: &str = "input_audio_buffer.speech_started";
    pub const ERROR: &str = "error";
}

// ---------------------------------------------------------------------------
// Audioformat
// ---------------------------------------------------------------------------

/// Audioformat der Realtime-API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioFormat {
    #[serde(rename = "g711_ulaw")]
    G711Ulaw,
    #[serde(rename = "g711_alaw")]
    G711Alaw,
}

impl AudioFormat {
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::G711Ulaw => "g711_ulaw",
            Self::G711Alaw => "g711_alaw",
        }
    }
}

// ---------------------------------------------------------------------------
// Session-Konfiguration
// ---------------------------------------------------------------------------

/// Server-seitige Sprecherkennung
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnDetection {
    #[serde(rename = "type")]
    pub typ: String,
    pub create_response: bool,
    pub interrupt_response: bool,
}

impl TurnDetection {
    /// VAD auf Serverseite, Antwort und Unterbrechung automatisch
    pub fn server_vad() -> Self {
        Self {
            typ: "server_vad".to_string(),
            create_response: true,
            interrupt_response: true,
        }
    }
}

/// Inhalt einer `session.update`-Nachricht
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionKonfiguration {
    pub instructions: String,
    pub voice: String,
    pub input_audio_format: AudioFormat,
    pub output_audio_format: AudioFormat,
    pub turn_detection: TurnDetection,
    pub modalities: Vec<String>,
}

impl SessionKonfiguration {
    /// Erstellt die Konfiguration mit gleichem Format in beide Richtungen
    pub fn neu(instructions: impl Into<String>, voice: impl Into<String>, format: AudioFormat) -> Self {
        Self {
            instructions: instructions.into(),
            voice: voice.into(),
            input_audio_format: format,
            output_audio_format: format,
            turn_detection: TurnDetection::server_vad(),
            modalities: vec!["audio".to_string(), "text".to_string()],
        }
    }
}

/// Inhalt einer `response.create`-Nachricht
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntwortAnweisung {
    pub instructions: String,
}

// ---------------------------------------------------------------------------
// ClientNachricht
// ---------------------------------------------------------------------------

/// Alle Nachrichten, die Mimir an die Realtime-API sendet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientNachricht {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionKonfiguration },

    #[serde(rename = "response.create")]
    AntwortErstellen { response: AntwortAnweisung },

    #[serde(rename = "input_audio_buffer.append")]
    AudioAnhaengen { audio: String },
}

impl ClientNachricht {
    /// `response.create` mit der Begruessung als Instruktion
    pub fn begruessung(text: impl Into<String>) -> Self {
        Self::AntwortErstellen {
            response: AntwortAnweisung {
                instructions: text.into(),
            },
        }
    }

    /// `input_audio_buffer.append` mit Base64-kodierten Rohbytes
    pub fn audio(bytes: &[u8]) -> Self {
        Self::AudioAnhaengen {
            audio: STANDARD.encode(bytes),
        }
    }

    /// Serialisiert als JSON-Text
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// ServerNachricht
// ---------------------------------------------------------------------------

/// Eingehende Nachricht, nur nach `type` vorsortiert
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerNachricht {
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(flatten)]
    pub felder: Map<String, Value>,
}

impl ServerNachricht {
    /// Parst einen JSON-Text; Nachrichten ohne `type` sind ungueltig
    pub fn parsen(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Liest ein String-Feld der obersten Ebene
    pub fn feld_str(&self, name: &str) -> Option<&str> {
        self.felder.get(name).and_then(Value::as_str)
    }

    /// Dekodiert das Base64-Feld `delta` einer `response.audio.delta`
    pub fn audio_delta(&self) -> Result<Vec<u8>, DeltaFehler> {
        let delta = self.feld_str("delta").ok_or(DeltaFehler::FeldFehlt)?;
        STANDARD
            .decode(delta)
            .map_err(|e| DeltaFehler::Base64(e.to_string()))
    }
}

/// Fehler beim Auslesen eines Audio-Deltas
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeltaFehler {
    #[error("Feld 'delta' fehlt")]
    FeldFehlt,
    #[error("Ungueltiges Base64: {0}")]
    Base64(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
