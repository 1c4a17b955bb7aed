//! Timing-Metriken und Timing-Konfiguration des Ausgangs-Pacers
//!
//! [`TimingMetrics`] ist ein unveraenderlicher Snapshot. Jeder Versand
//! erzeugt aus dem vorherigen Snapshot einen neuen; der Jitter eines
//! Intervalls ist `|gemessen - nominal|`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Nominelles Paketintervall: 20 ms pro 160-Byte-Frame
pub const NOMINALES_INTERVALL: Duration = Duration::from_millis(20);

/// Ab diesem mittleren Jitter wird im periodischen Bericht gewarnt
pub const HOHER_JITTER_MS: f64 = 10.0;

/// Mindestanzahl Messungen, bevor in den adaptiven Modus gewechselt wird
pub const ADAPTIV_MIN_MESSUNGEN: u64 = 10;

// ---------------------------------------------------------------------------
// TimingMetrics
// ---------------------------------------------------------------------------

/// Snapshot der Versand-Zeitmessung
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingMetrics {
    /// Anzahl gemessener Intervalle
    pub anzahl: u64,
    /// Laufender Mittelwert der Intervalle (ms)
    pub mittleres_intervall_ms: f64,
    /// Laufender Mittelwert des Jitters (ms)
    pub mittlerer_jitter_ms: f64,
    /// Groesster gemessener Jitter (ms)
    pub max_jitter_ms: f64,
    /// Jitter der letzten Messung (ms)
    pub letzter_jitter_ms: f64,
}

impl TimingMetrics {
    /// Erzeugt den Nachfolge-Snapshot fuer ein gemessenes Intervall
    pub fn aktualisieren(&self, intervall_ms: f64, nominal_ms: f64) -> Self {
        let jitter = (intervall_ms - nominal_ms).abs();
        let alt = self.anzahl as f64;
        let neu = alt + 1.0;

        Self {
            anzahl: self.anzahl + 1,
            mittleres_intervall_ms: (self.mittleres_intervall_ms * alt + intervall_ms) / neu,
            mittlerer_jitter_ms: (self.mittlerer_jitter_ms * alt + jitter) / neu,
            max_jitter_ms: self.max_jitter_ms.max(jitter),
            letzter_jitter_ms: jitter,
        }
    }

    /// Ob die Messung den Wechsel in den adaptiven Modus rechtfertigt
    pub fn adaptiv_noetig(&self, schwelle_ms: f64) -> bool {
        self.anzahl > ADAPTIV_MIN_MESSUNGEN && self.mittlerer_jitter_ms > schwelle_ms
    }
}

impl fmt::Display for TimingMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "messungen={}, intervall={:.2}ms, jitter={:.2}ms, max={:.2}ms",
            self.anzahl, self.mittleres_intervall_ms, self.mittlerer_jitter_ms, self.max_jitter_ms
        )
    }
}

// ---------------------------------------------------------------------------
// RtpTimingConfig
// ---------------------------------------------------------------------------

/// Vordefinierte Timing-Profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingPreset {
    #[default]
    Standard,
    NiedrigeLatenz,
    Robust,
}

impl TimingPreset {
    pub fn config(&self) -> RtpTimingConfig {
        match self {
            Self::Standard => RtpTimingConfig::standard(),
            Self::NiedrigeLatenz => RtpTimingConfig::niedrige_latenz(),
            Self::Robust => RtpTimingConfig::robust(),
        }
    }
}

/// Timing-Parameter des Ausgangs-Pacers
#[derive(Debug, Clone, PartialEq)]
pub struct RtpTimingConfig {
    /// Mittlerer Jitter, ab dem in den adaptiven Modus gewechselt wird
    pub jitter_warn_schwelle_ms: f64,
    /// Jitter einer einzelnen Messung, ab dem pro Takt gewarnt wird
    pub jitter_fehler_schwelle_ms: f64,
    /// Tiefe des Ringpuffers im adaptiven Modus
    pub ring_tiefe: usize,
    /// Adaptiver Modus erlaubt
    pub adaptiv_aktiv: bool,
    /// Eigener Thread statt Tokio-Timer
    pub dedizierter_takt: bool,
    /// Zeitmessung aktiv
    pub metriken_aktiv: bool,
    /// Abstand der periodischen Metrik-Berichte
    pub bericht_intervall: Duration,
}

impl RtpTimingConfig {
    pub fn standard() -> Self {
        Self {
            jitter_warn_schwelle_ms: 5.0,
            jitter_fehler_schwelle_ms: 15.0,
            ring_tiefe: 10,
            adaptiv_aktiv: true,
            dedizierter_takt: true,
            metriken_aktiv: true,
            bericht_intervall: Duration::from_secs(30),
        }
    }

    /// Kleine Puffer, kein adaptiver Modus
    pub fn niedrige_latenz() -> Self {
        Self {
            jitter_warn_schwelle_ms: 2.0,
            jitter_fehler_schwelle_ms: 5.0,
            ring_tiefe: 5,
            adaptiv_aktiv: false,
            dedizierter_takt: true,
            metriken_aktiv: true,
            bericht_intervall: Duration::from_secs(10),
        }
    }

    /// Fuer unzuverlaessige Netze
    pub fn robust() -> Self {
        Self {
            jitter_warn_schwelle_ms: 10.0,
            jitter_fehler_schwelle_ms: 25.0,
            ring_tiefe: 20,
            adaptiv_aktiv: true,
            dedizierter_takt: true,
            metriken_aktiv: true,
            bericht_intervall: Duration::from_secs(60),
        }
    }
}

impl Default for RtpTimingConfig {
    fn default() -> Self {
        Self::standard()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
