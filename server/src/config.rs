//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use anyhow::{bail, Context};
use mimir_bridge::{BridgeConfig, MedienFluss};
use mimir_observability::MimirMetrics;
use mimir_protocol::PayloadTyp;
use mimir_realtime::transport::{STANDARD_BETA, STANDARD_MODELL, STANDARD_URL};
use mimir_realtime::VerbindungsParameter;
use mimir_voice::{AusgabeConfig, PacerConfig, RtpTimingConfig, TimingPreset};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Umgebungsvariable fuer den Pfad der Konfigurationsdatei
pub const CONFIG_ENV: &str = "MIMIR_CONFIG";

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Verbindung zur Realtime-API
    pub realtime: RealtimeEinstellungen,
    /// Codec und Paketierung
    pub audio: AudioEinstellungen,
    /// Timing-Profil des Ausgangs-Pacers
    pub timing: TimingEinstellungen,
    /// Statischer Medienfluss
    pub medien: MedienEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
    /// Ziel-Tabelle
    pub extensions: ExtensionEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
    /// Zeit bis zur ersten Antwort der Realtime-API, danach wird aufgelegt
    pub anruf_zeitlimit_s: u64,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Mimir".into(),
            anruf_zeitlimit_s: 30,
        }
    }
}

/// Verbindung zur Realtime-API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeEinstellungen {
    /// WebSocket-Endpunkt ohne Query
    pub url: String,
    /// Modellname, wird als `?model=` angehaengt (leer = keiner)
    pub modell: String,
    /// Name der Umgebungsvariable mit dem API-Schluessel
    pub api_schluessel_env: String,
    /// Wert des `OpenAI-Beta`-Headers (leer = kein Header)
    pub beta: String,
    /// Kapazitaet der ausgehenden Nachrichten-Queue
    pub ausgang_kapazitaet: usize,
}

impl Default for RealtimeEinstellungen {
    fn default() -> Self {
        Self {
            url: STANDARD_URL.into(),
            modell: STANDARD_MODELL.into(),
            api_schluessel_env: "OPENAI_API_KEY".into(),
            beta: STANDARD_BETA.into(),
            ausgang_kapazitaet: mimir_realtime::session::AUSGANG_KAPAZITAET,
        }
    }
}

/// Codec und Paketierung
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioEinstellungen {
    /// "pcmu" oder "pcma"
    pub codec: PayloadTyp,
    /// Bytes pro RTP-Paket
    pub frame_groesse: usize,
    /// Paketintervall in Millisekunden
    pub paket_intervall_ms: u64,
    /// Intervall, in dem Anrufer-Audio an die API geht
    pub flush_intervall_ms: u64,
    pub ssrc: u32,
    /// Maximale Anzahl Frames in der Ausgangs-Queue
    pub queue_kapazitaet: usize,
}

impl Default for AudioEinstellungen {
    fn default() -> Self {
        Self {
            codec: PayloadTyp::Pcmu,
            frame_groesse: mimir_protocol::FRAME_GROESSE,
            paket_intervall_ms: 20,
            flush_intervall_ms: 250,
            ssrc: mimir_protocol::voice::STANDARD_SSRC,
            queue_kapazitaet: mimir_voice::ausgabe::STANDARD_KAPAZITAET,
        }
    }
}

/// Timing-Profil plus einzelne Ueberschreibungen
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingEinstellungen {
    pub preset: TimingPreset,
    pub jitter_warn_schwelle_ms: Option<f64>,
    pub jitter_fehler_schwelle_ms: Option<f64>,
    pub ring_tiefe: Option<usize>,
    pub adaptiv_aktiv: Option<bool>,
    pub dedizierter_takt: Option<bool>,
    pub metriken_aktiv: Option<bool>,
    pub bericht_intervall_s: Option<u64>,
}

impl TimingEinstellungen {
    /// Preset mit angewendeten Ueberschreibungen
    pub fn rtp_timing(&self) -> RtpTimingConfig {
        let mut timing = self.preset.config();
        if let Some(wert) = self.jitter_warn_schwelle_ms {
            timing.jitter_warn_schwelle_ms = wert;
        }
        if let Some(wert) = self.jitter_fehler_schwelle_ms {
            timing.jitter_fehler_schwelle_ms = wert;
        }
        if let Some(wert) = self.ring_tiefe {
            timing.ring_tiefe = wert;
        }
        if let Some(wert) = self.adaptiv_aktiv {
            timing.adaptiv_aktiv = wert;
        }
        if let Some(wert) = self.dedizierter_takt {
            timing.dedizierter_takt = wert;
        }
        if let Some(wert) = self.metriken_aktiv {
            timing.metriken_aktiv = wert;
        }
        if let Some(wert) = self.bericht_intervall_s {
            timing.bericht_intervall = Duration::from_secs(wert);
        }
        timing
    }
}

/// Statischer Medienfluss fuer den Anruf-Runner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MedienEinstellungen {
    /// Lokale RTP-Adresse
    pub lokal: String,
    /// RTP-Adresse der Gegenstelle
    pub gegenstelle: String,
    /// Anrufziel fuer die Ziel-Tabelle
    pub ziel: String,
}

impl Default for MedienEinstellungen {
    fn default() -> Self {
        Self {
            lokal: "0.0.0.0:40000".into(),
            gegenstelle: "127.0.0.1:40002".into(),
            ziel: "100".into(),
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level oder Filter-Direktive, z.B. "info" oder "mimir_voice=debug,info"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    pub aktiviert: bool,
    pub bind_adresse: String,
    /// Port fuer Metriken und Health (Standard: 9300)
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            bind_adresse: "127.0.0.1".into(),
            port: 9300,
        }
    }
}

/// Ort der Ziel-Tabelle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionEinstellungen {
    pub datei: String,
}

impl Default for ExtensionEinstellungen {
    fn default() -> Self {
        Self {
            datei: "extensions.toml".into(),
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => toml::from_str::<Self>(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };
        config.pruefen()?;
        Ok(config)
    }

    /// Prueft Werte, die serde nicht abfangen kann
    pub fn pruefen(&self) -> anyhow::Result<()> {
        if self.audio.frame_groesse == 0 {
            bail!("audio.frame_groesse muss groesser als 0 sein");
        }
        if self.audio.paket_intervall_ms == 0 || self.audio.flush_intervall_ms == 0 {
            bail!("audio.paket_intervall_ms und audio.flush_intervall_ms muessen groesser als 0 sein");
        }
        if self.audio.queue_kapazitaet == 0 || self.realtime.ausgang_kapazitaet == 0 {
            bail!("Queue-Kapazitaeten muessen groesser als 0 sein");
        }
        if !mimir_observability::log_level_gueltig(&self.logging.level) {
            bail!("logging.level '{}' ist kein gueltiger Filter", self.logging.level);
        }
        if !mimir_observability::log_format_gueltig(&self.logging.format) {
            bail!("logging.format '{}' ungueltig (erlaubt: text, json)", self.logging.format);
        }
        self.medien_fluss()?;
        Ok(())
    }

    pub fn anruf_zeitlimit(&self) -> Duration {
        Duration::from_secs(self.server.anruf_zeitlimit_s)
    }

    /// Gibt die Bind-Adresse fuer den Observability-Server zurueck
    pub fn observability_bind_adresse(&self) -> String {
        format!(
            "{}:{}",
            self.observability.bind_adresse, self.observability.port
        )
    }

    /// Lokale und entfernte RTP-Adresse
    pub fn medien_fluss(&self) -> anyhow::Result<MedienFluss> {
        let lokal: SocketAddr = self
            .medien
            .lokal
            .parse()
            .with_context(|| format!("medien.lokal '{}' ungueltig", self.medien.lokal))?;
        let gegenstelle: SocketAddr = self.medien.gegenstelle.parse().with_context(|| {
            format!("medien.gegenstelle '{}' ungueltig", self.medien.gegenstelle)
        })?;
        Ok(MedienFluss { lokal, gegenstelle })
    }

    /// Verbindungsparameter inklusive API-Schluessel aus der Umgebung
    pub fn verbindung(&self) -> VerbindungsParameter {
        let schluessel = std::env::var(&self.realtime.api_schluessel_env).ok();
        if schluessel.is_none() {
            tracing::warn!(
                variable = %self.realtime.api_schluessel_env,
                "Kein API-Schluessel gesetzt, verbinde ohne Authorization-Header"
            );
        }
        let mut parameter =
            VerbindungsParameter::neu(&self.realtime.url, &self.realtime.modell, schluessel);
        parameter.beta = Some(self.realtime.beta.clone()).filter(|b| !b.is_empty());
        parameter
    }

    /// Konfiguration fuer eine Anruf-Pipeline
    pub fn bridge_config(&self, metriken: Option<MimirMetrics>) -> BridgeConfig {
        let mut config = BridgeConfig::neu(self.verbindung());
        config.pacer = PacerConfig {
            payload_typ: self.audio.codec,
            ssrc: self.audio.ssrc,
            intervall: Duration::from_millis(self.audio.paket_intervall_ms),
            timing: self.timing.rtp_timing(),
        };
        config.ausgabe = AusgabeConfig {
            frame_groesse: self.audio.frame_groesse,
            kapazitaet: self.audio.queue_kapazitaet,
            stille_byte: self.audio.codec.stille_byte(),
        };
        config.flush_intervall = Duration::from_millis(self.audio.flush_intervall_ms);
        config.ausgang_kapazitaet = self.realtime.ausgang_kapazitaet;
        config.metriken = metriken;
        config
    }
}
