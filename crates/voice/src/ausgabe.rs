//! Ausgangs-Queue fuer Audio-Frames
//!
//! Die Realtime-Session legt dekodierte Audio-Deltas hier ab, der
//! Ausgangs-Pacer entnimmt pro Takt hoechstens einen Frame.
//!
//! - Deltas werden sofort in Frames zu hoechstens `frame_groesse` Bytes
//!   zerlegt; der Rest eines Deltas bleibt ein kurzer Frame
//! - Begrenzte Kapazitaet, bei voller Queue wird der neue Frame verworfen
//! - `leeren()` (Barge-in) erhoeht die Epoche, damit auch Frames im
//!   Ringpuffer des Pacers verworfen werden

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// Standard-Kapazitaet: 500 Frames = 10 s Audio
pub const STANDARD_KAPAZITAET: usize = 500;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Konfiguration der Ausgangs-Queue
#[derive(Debug, Clone)]
pub struct AusgabeConfig {
    /// Maximale Frame-Groesse in Bytes
    pub frame_groesse: usize,
    /// Maximale Anzahl Frames in der Queue
    pub kapazitaet: usize,
    /// Fuellbyte fuer den letzten Frame einer Antwort
    pub stille_byte: u8,
}

impl Default for AusgabeConfig {
    fn default() -> Self {
        Self {
            frame_groesse: mimir_protocol::FRAME_GROESSE,
            kapazitaet: STANDARD_KAPAZITAET,
            stille_byte: 0xFF,
        }
    }
}

// ---------------------------------------------------------------------------
// AudioAusgabe
// ---------------------------------------------------------------------------

/// Begrenzte FIFO-Queue fuer ausgehende Audio-Frames
#[derive(Debug)]
pub struct AudioAusgabe {
    config: AusgabeConfig,
    frames: Mutex<VecDeque<Vec<u8>>>,
    epoche: AtomicU64,
    verworfen: AtomicU64,
}

impl AudioAusgabe {
    pub fn neu(config: AusgabeConfig) -> Self {
        let frame_groesse = config.frame_groesse.max(1);
        Self {
            frames: Mutex::new(VecDeque::with_capacity(config.kapazitaet.min(1024))),
            config: AusgabeConfig {
                frame_groesse,
                ..config
            },
            epoche: AtomicU64::new(0),
            verworfen: AtomicU64::new(0),
        }
    }

    /// Zerlegt `daten` in Frames und haengt sie an
    ///
    /// Gibt die Anzahl angenommener Frames zurueck. Frames, die nicht mehr
    /// in die Queue passen, werden verworfen und gezaehlt.
    pub fn audio_anhaengen(&self, daten: &[u8]) -> usize {
        if daten.is_empty() {
            return 0;
        }

        let mut frames = self.frames.lock();
        let mut angenommen = 0;
        let mut abgelehnt = 0u64;

        for chunk in daten.chunks(self.config.frame_groesse) {
            if frames.len() >= self.config.kapazitaet {
                abgelehnt += 1;
                continue;
            }
            frames.push_back(chunk.to_vec());
            angenommen += 1;
        }
        drop(frames);

        if abgelehnt > 0 {
            self.verworfen.fetch_add(abgelehnt, Ordering::Relaxed);
            tracing::debug!(
                abgelehnt,
                kapazitaet = self.config.kapazitaet,
                "Ausgangs-Queue voll, Frames verworfen"
            );
        }
        angenommen
    }

    /// Entnimmt den aeltesten Frame (nicht blockierend)
    pub fn frame_holen(&self) -> Option<Vec<u8>> {
        self.frames.lock().pop_front()
    }

    /// Verwirft alle gepufferten Frames (Barge-in)
    ///
    /// Gibt die Anzahl verworfener Frames zurueck.
    pub fn leeren(&self) -> usize {
        let mut frames = self.frames.lock();
        let anzahl = frames.len();
        frames.clear();
        self.epoche.fetch_add(1, Ordering::AcqRel);
        anzahl
    }

    /// Fuellt den letzten gepufferten Frame mit Stille auf volle Groesse auf
    ///
    /// Gibt true zurueck, wenn ein Frame aufgefuellt wurde.
    pub fn antwort_abschliessen(&self) -> bool {
        let mut frames = self.frames.lock();
        match frames.back_mut() {
            Some(letzter) if letzter.len() < self.config.frame_groesse => {
                letzter.resize(self.config.frame_groesse, self.config.stille_byte);
                true
            }
            _ => false,
        }
    }

    /// Zaehlt bei jedem `leeren()` hoch
    pub fn epoche(&self) -> u64 {
        self.epoche.load(Ordering::Acquire)
    }

    pub fn laenge(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn ist_leer(&self) -> bool {
        self.frames.lock().is_empty()
    }

    /// Wegen voller Queue verworfene Frames gesamt
    pub fn verworfen(&self) -> u64 {
        self.verworfen.load(Ordering::Relaxed)
    }

    pub fn frame_groesse(&self) -> usize {
        self.config.frame_groesse
    }
}

impl Default for AudioAusgabe {
    fn default() -> Self {
        Self::neu(AusgabeConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
