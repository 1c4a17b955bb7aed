//! Pipeline eines einzelnen Anrufs
//!
//! Die Realtime-Verbindung wird sofort aufgebaut, der RTP-Teil erst mit
//! [`RealtimeBridge::starten`], sobald die Signalisierung den Medienfluss
//! kennt. Bis dahin sammelt sich das Audio der Gegenseite in der
//! Ausgangs-Queue.
//!
//! ## Takte
//! - Ausgang: [`AusgangsPacer`] im Paketintervall (Standard 20 ms)
//! - Eingang: Jitter Buffer wird alle 250 ms geleert und als
//!   `input_audio_buffer.append` gesendet

use crate::error::{BridgeError, BridgeResult};
use crate::signaling::MedienFluss;
use mimir_core::{CallId, SessionEreignis};
use mimir_observability::MimirMetrics;
use mimir_realtime::{
    AusgangsKanal, RealtimeError, RealtimeSession, RealtimeTransport, SessionParameter,
    VerbindungsParameter,
};
use mimir_voice::{
    AudioAusgabe, AusgabeConfig, AusgangsPacer, JitterBeobachter, JitterBuffer, PacerConfig,
    PacerStatus, RtpKanal, TaktStrategie, Taktgeber, VoiceError,
};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Intervall, in dem eingehendes Audio an die Realtime-API geht
pub const STANDARD_FLUSH_INTERVALL: Duration = Duration::from_millis(250);

// ---------------------------------------------------------------------------
// BridgeConfig
// ---------------------------------------------------------------------------

/// Konfiguration einer Anruf-Pipeline
#[derive(Clone)]
pub struct BridgeConfig {
    pub pacer: PacerConfig,
    pub ausgabe: AusgabeConfig,
    pub flush_intervall: Duration,
    pub verbindung: VerbindungsParameter,
    pub ausgang_kapazitaet: usize,
    /// Optionales Prometheus-Registry, das beim Anhalten fortgeschrieben wird
    pub metriken: Option<MimirMetrics>,
}

impl BridgeConfig {
    pub fn neu(verbindung: VerbindungsParameter) -> Self {
        Self {
            pacer: PacerConfig::default(),
            ausgabe: AusgabeConfig::default(),
            flush_intervall: STANDARD_FLUSH_INTERVALL,
            verbindung,
            ausgang_kapazitaet: mimir_realtime::session::AUSGANG_KAPAZITAET,
            metriken: None,
        }
    }
}

impl std::fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("pacer", &self.pacer)
            .field("ausgabe", &self.ausgabe)
            .field("flush_intervall", &self.flush_intervall)
            .field("verbindung", &self.verbindung)
            .field("ausgang_kapazitaet", &self.ausgang_kapazitaet)
            .field("metriken", &self.metriken.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// RealtimeBridge
// ---------------------------------------------------------------------------

/// Laufender RTP-Teil
struct Medien {
    kanal: RtpKanal,
    pacer: Taktgeber,
    flush: Taktgeber,
    status: Arc<PacerStatus>,
}

/// Alle Bausteine eines Anrufs
pub struct RealtimeBridge {
    call_id: CallId,
    config: BridgeConfig,
    ausgang: AusgangsKanal,
    audio: Arc<AudioAusgabe>,
    eingang: Arc<JitterBuffer>,
    transport: RealtimeTransport,
    medien: Mutex<Option<Medien>>,
    gestartet: AtomicBool,
    angehalten: AtomicBool,
}

impl RealtimeBridge {
    /// Baut die Realtime-Verbindung auf
    ///
    /// Muss innerhalb einer Tokio-Laufzeit aufgerufen werden. Der Empfaenger
    /// liefert die Ereignisse der Session (`AudioBereit`, `Beendet`).
    pub fn verbinden(
        call_id: CallId,
        config: BridgeConfig,
        parameter: SessionParameter,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEreignis>) {
        let (ausgang, ausgang_rx) = AusgangsKanal::neu(config.ausgang_kapazitaet);
        let (ereignisse_tx, ereignisse_rx) = mpsc::unbounded_channel();
        let audio = Arc::new(AudioAusgabe::neu(config.ausgabe.clone()));

        let session = RealtimeSession::neu(
            call_id,
            parameter,
            ausgang.clone(),
            Arc::clone(&audio),
            ereignisse_tx,
        );
        let transport = RealtimeTransport::starten(config.verbindung.clone(), session, ausgang_rx);
        tracing::debug!(call_id = %call_id, url = %config.verbindung.url, "Realtime-Bridge erstellt");

        let bridge = Self {
            call_id,
            config,
            ausgang,
            audio,
            eingang: Arc::new(JitterBuffer::neu()),
            transport,
            medien: Mutex::new(None),
            gestartet: AtomicBool::new(false),
            angehalten: AtomicBool::new(false),
        };
        (bridge, ereignisse_rx)
    }

    /// Startet den RTP-Teil fuer den ausgehandelten Medienfluss
    ///
    /// Gibt die tatsaechlich gebundene lokale Adresse zurueck.
    pub async fn starten(&self, fluss: MedienFluss) -> BridgeResult<SocketAddr> {
        if self.angehalten.load(Ordering::SeqCst) {
            return Err(BridgeError::Angehalten);
        }
        if self.gestartet.swap(true, Ordering::SeqCst) {
            return Err(BridgeError::BereitsGestartet);
        }

        let kanal = RtpKanal::binden(fluss.lokal, fluss.gegenstelle).await?;
        let lokal = kanal.lokale_adresse()?;
        kanal.empfang_starten(Arc::clone(&self.eingang));

        let mut pacer = AusgangsPacer::neu(
            self.config.pacer.clone(),
            Arc::clone(&self.audio),
            Arc::new(kanal.senke()),
        );
        if let Some(metriken) = &self.config.metriken {
            pacer = pacer.mit_beobachter(Arc::new(JitterMetrik(metriken.clone())));
        }
        let status = pacer.status();
        let pacer = pacer.takt_starten("rtp-ausgang")?;

        let flush = match self.flush_starten() {
            Ok(flush) => flush,
            Err(e) => {
                pacer.stoppen();
                kanal.schliessen();
                return Err(e.into());
            }
        };

        let mut medien = self.medien.lock();
        // anhalten() kann waehrend binden() gelaufen sein
        if self.angehalten.load(Ordering::SeqCst) {
            pacer.stoppen();
            flush.stoppen();
            kanal.schliessen();
            return Err(BridgeError::Angehalten);
        }
        *medien = Some(Medien {
            kanal,
            pacer,
            flush,
            status,
        });

        tracing::info!(
            call_id = %self.call_id,
            lokal = %lokal,
            gegenstelle = %fluss.gegenstelle,
            payload_typ = self.config.pacer.payload_typ.name(),
            "RTP-Medien gestartet"
        );
        Ok(lokal)
    }

    /// Leert den Jitter Buffer periodisch in Richtung Realtime-API
    fn flush_starten(&self) -> Result<Taktgeber, VoiceError> {
        let eingang = Arc::clone(&self.eingang);
        let ausgang = self.ausgang.clone();
        let call_id = self.call_id;

        Taktgeber::starten(
            "rtp-eingang",
            self.config.flush_intervall,
            TaktStrategie::Kooperativ,
            move || {
                let daten = eingang.leeren();
                match ausgang.audio_senden(&daten) {
                    Ok(()) => Ok(()),
                    // Transport ist weg, anhalten() folgt
                    Err(RealtimeError::Geschlossen) => {
                        tracing::trace!(call_id = %call_id, bytes = daten.len(), "Eingangs-Audio verworfen");
                        Ok(())
                    }
                    Err(e) => Err(VoiceError::Senden(e.to_string())),
                }
            },
        )
    }

    /// Haelt die Pipeline an (idempotent)
    ///
    /// Schliesst den Transport, stoppt beide Takte und gibt den Socket frei.
    pub fn anhalten(&self) {
        if self.angehalten.swap(true, Ordering::SeqCst) {
            return;
        }
        self.transport.schliessen();

        let Some(medien) = self.medien.lock().take() else {
            tracing::debug!(call_id = %self.call_id, "Bridge ohne Medien angehalten");
            return;
        };

        medien.pacer.stoppen();
        medien.flush.stoppen();
        medien.kanal.schliessen();

        let timing = medien.status.metriken();
        let eingang = self.eingang.statistik();
        tracing::info!(
            call_id = %self.call_id,
            gesendet = medien.status.gesendet(),
            sendefehler = medien.status.sendefehler(),
            empfangen = medien.kanal.empfangene_pakete(),
            verworfen = eingang.verworfen,
            adaptiv = medien.status.adaptiv_aktiv(),
            "Bridge angehalten: {}",
            timing
        );

        if let Some(metriken) = &self.config.metriken {
            metriken.rtp_pakete_gesendet.inc_by(medien.status.gesendet());
            metriken
                .rtp_pakete_empfangen
                .inc_by(medien.kanal.empfangene_pakete());
            metriken
                .rtp_pakete_verworfen
                .with_label_values(&["zu_kurz"])
                .inc_by(eingang.verworfen);
            metriken
                .rtp_pakete_verworfen
                .with_label_values(&["queue_voll"])
                .inc_by(self.audio.verworfen());
            if medien.status.adaptiv_aktiv() {
                metriken.adaptive_wechsel.inc();
            }
        }
    }

    pub fn call_id(&self) -> CallId {
        self.call_id
    }

    /// Ausgangs-Queue (Audio der Gegenseite)
    pub fn audio(&self) -> &Arc<AudioAusgabe> {
        &self.audio
    }

    /// Sortierpuffer fuer eingehende RTP-Pakete
    pub fn eingang(&self) -> &Arc<JitterBuffer> {
        &self.eingang
    }

    pub fn ist_gestartet(&self) -> bool {
        self.gestartet.load(Ordering::SeqCst)
    }

    pub fn ist_angehalten(&self) -> bool {
        self.angehalten.load(Ordering::SeqCst)
    }

    /// Status des Ausgangs-Pacers, solange die Medien laufen
    pub fn pacer_status(&self) -> Option<Arc<PacerStatus>> {
        self.medien.lock().as_ref().map(|m| Arc::clone(&m.status))
    }

    /// Gebundene lokale RTP-Adresse, solange die Medien laufen
    pub fn lokale_adresse(&self) -> Option<SocketAddr> {
        self.medien
            .lock()
            .as_ref()
            .and_then(|m| m.kanal.lokale_adresse().ok())
    }
}

impl Drop for RealtimeBridge {
    fn drop(&mut self) {
        self.anhalten();
    }
}

/// Leitet jede Jitter-Messung des Pacers ins Histogramm
struct JitterMetrik(MimirMetrics);

impl JitterBeobachter for JitterMetrik {
    fn beobachten(&self, jitter_ms: f64) {
        self.0.sende_jitter_sekunden.observe(jitter_ms / 1000.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mimir_protocol::realtime::AudioFormat;

    fn parameter() -> SessionParameter {
        SessionParameter {
            anweisungen: "test".into(),
            stimme: "alloy".into(),
            begruessung: "hallo".into(),
            format: AudioFormat::G711Ulaw,
        }
    }

    fn fluss() -> MedienFluss {
        let lokal: SocketAddr = "127.0.0.1:0".parse().unwrap();
        MedienFluss {
            lokal,
            gegenstelle: "127.0.0.1:9".parse().unwrap(),
        }
    }

    fn bridge() -> (RealtimeBridge, mpsc::UnboundedReceiver<SessionEreignis>) {
        // Port 9 (discard): Verbindung scheitert, fuer diese Tests unerheblich
        let config = BridgeConfig::neu(VerbindungsParameter::ohne_auth("ws://127.0.0.1:9/"));
        RealtimeBridge::verbinden(CallId::new(), config, parameter())
    }

    #[tokio::test]
    async fn starten_nur_einmal() {
        let (bridge, _rx) = bridge();
        let lokal = bridge.starten(fluss()).await.unwrap();
        assert_ne!(lokal.port(), 0);
        assert_eq!(bridge.lokale_adresse(), Some(lokal));
        assert!(bridge.pacer_status().is_some());

        assert!(matches!(
            bridge.starten(fluss()).await,
            Err(BridgeError::BereitsGestartet)
        ));
        bridge.anhalten();
    }

    #[tokio::test]
    async fn anhalten_ist_idempotent() {
        let (bridge, _rx) = bridge();
        bridge.starten(fluss()).await.unwrap();

        bridge.anhalten();
        bridge.anhalten();
        assert!(bridge.ist_angehalten());
        assert!(bridge.pacer_status().is_none());
        assert!(bridge.lokale_adresse().is_none());
    }

    #[tokio::test]
    async fn starten_nach_anhalten_schlaegt_fehl() {
        let (bridge, _rx) = bridge();
        bridge.anhalten();
        assert!(matches!(
            bridge.starten(fluss()).await,
            Err(BridgeError::Angehalten)
        ));
        assert!(!bridge.ist_gestartet());
    }

    #[tokio::test]
    async fn anhalten_schreibt_metriken_fort() {
        let metriken = MimirMetrics::neu().unwrap();
        let mut config = BridgeConfig::neu(VerbindungsParameter::ohne_auth("ws://127.0.0.1:9/"));
        config.metriken = Some(metriken.clone());
        let (bridge, _rx) = RealtimeBridge::verbinden(CallId::new(), config, parameter());
        bridge.starten(fluss()).await.unwrap();

        // Zwei zu kurze Pakete direkt in den Eingang
        bridge.eingang().anhaengen(&[0x80, 0, 0]);
        bridge.eingang().anhaengen(&[0x80]);
        bridge.anhalten();

        let zu_kurz = metriken
            .rtp_pakete_verworfen
            .with_label_values(&["zu_kurz"])
            .get();
        assert_eq!(zu_kurz, 2);
    }

    #[test]
    fn jitter_metrik_beobachtet_jede_messung() {
        let metriken = MimirMetrics::neu().unwrap();
        let beobachter = JitterMetrik(metriken.clone());
        beobachter.beobachten(5.0);
        beobachter.beobachten(15.0);

        assert_eq!(metriken.sende_jitter_sekunden.get_sample_count(), 2);
        assert!((metriken.sende_jitter_sekunden.get_sample_sum() - 0.02).abs() < 1e-9);
    }
}
