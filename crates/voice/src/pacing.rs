//! Ausgangs-Pacing
//!
//! Sendet pro Takt (nominal 20 ms) hoechstens ein RTP-Paket aus der
//! [`AudioAusgabe`]. Ist kein Frame vorhanden, passiert nichts; es wird
//! keine Stille eingefuegt.
//!
//! ## Aufbau
//!
//! ```text
//! Taktgeber (Tokio-Timer | eigener Thread)
//!     |
//!     v
//! AusgangsPacer::tick()
//!     |  frame_holen()          <- AudioAusgabe (von der Session befuellt)
//!     |  Zeitmessung            -> TimingMetrics, ggf. Wechsel auf Gepuffert
//!     |  SendeStrategie         (Direkt | Gepuffert(Ringpuffer))
//!     v
//! RtpFramer::bauen() -> PaketSenke::senden()
//! ```
//!
//! Fehler und Panics einer Takt-Aufgabe werden abgefangen und geloggt,
//! der Takt laeuft weiter. `stoppen()` ist idempotent.
//!
//! Nach einem Haenger feuern beide Taktarten genau einen Takt sofort und
//! zaehlen das Intervall ab dort neu; verpasste Takte entfallen.

use crate::ausgabe::AudioAusgabe;
use crate::error::{VoiceError, VoiceResult};
use crate::ring::Ringpuffer;
use crate::timing::{RtpTimingConfig, TimingMetrics, HOHER_JITTER_MS, NOMINALES_INTERVALL};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use mimir_protocol::voice::{PayloadTyp, RtpFramer, STANDARD_SSRC};
use parking_lot::{Mutex, RwLock};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Maximale Wartezeit auf das Ende eines Takt-Threads
pub const STOPP_TIMEOUT: Duration = Duration::from_secs(5);

/// Takt-Jitter oberhalb dieser Grenze wird geloggt (ms)
const TAKT_JITTER_LOG_MS: f64 = 5.0;


// ---------------------------------------------------------------------------
// Taktgeber
// ---------------------------------------------------------------------------

/// Ausfuehrungsart des Takts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaktStrategie {
    /// Tokio-Intervall auf der laufenden Runtime
    Kooperativ,
    /// Eigener Thread mit eigener Festraten-Uhr
    Dediziert,
}

/// Zaehler, die der Taktgeber selbst fuehrt
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaktStatistik {
    /// Ausgefuehrte Takte
    pub ticks: u64,
    /// Takte mit Fehler oder Panic
    pub fehler: u64,
    /// Mittlere Abweichung vom Sollintervall (ms)
    pub mittlerer_jitter_ms: f64,
    jitter_messungen: u64,
}

impl TaktStatistik {
    fn erfassen(&mut self, jitter_ms: Option<f64>, fehlgeschlagen: bool) {
        self.ticks += 1;
        if fehlgeschlagen {
            self.fehler += 1;
        }
        if let Some(jitter) = jitter_ms {
            self.jitter_messungen += 1;
            self.mittlerer_jitter_ms +=
                (jitter - self.mittlerer_jitter_ms) / self.jitter_messungen as f64;
        }
    }
}

enum Laeufer {
    Task(tokio::task::JoinHandle<()>),
    Thread {
        stopp_tx: Sender<()>,
        fertig_rx: Receiver<()>,
        handle: thread::JoinHandle<()>,
    },
}

/// Periodischer Ausloeser fuer eine synchrone Takt-Aufgabe
pub struct Taktgeber {
    name: String,
    statistik: Arc<Mutex<TaktStatistik>>,
    laeufer: Mutex<Option<Laeufer>>,
}

impl Taktgeber {
    /// Startet den Takt
    ///
    /// `Kooperativ` braucht eine laufende Tokio-Runtime, `Dediziert` startet
    /// einen eigenen Thread. Der erste Takt feuert sofort.
    pub fn starten<F>(
        name: impl Into<String>,
        intervall: Duration,
        strategie: TaktStrategie,
        mut aufgabe: F,
    ) -> VoiceResult<Self>
    where
        F: FnMut() -> VoiceResult<()> + Send + 'static,
    {
        let name = name.into();
        if intervall.is_zero() {
            return Err(VoiceError::Konfiguration(format!(
                "Taktintervall von '{name}' darf nicht 0 sein"
            )));
        }

        let statistik = Arc::new(Mutex::new(TaktStatistik::default()));

        let laeufer = match strategie {
            TaktStrategie::Kooperativ => {
                let runtime =
                    tokio::runtime::Handle::try_current().map_err(|_| VoiceError::KeineLaufzeit)?;
                let statistik = Arc::clone(&statistik);
                let task_name = name.clone();
                Laeufer::Task(runtime.spawn(async move {
                    let mut takt = tokio::time::interval(intervall);
                    takt.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                    let mut letzter = None;
                    loop {
                        takt.tick().await;
                        takt_ausfuehren(&task_name, intervall, &mut aufgabe, &mut letzter, &statistik);
                    }
                }))
            }
            TaktStrategie::Dediziert => {
                let (stopp_tx, stopp_rx) = bounded::<()>(1);
                let (fertig_tx, fertig_rx) = bounded::<()>(1);
                let statistik = Arc::clone(&statistik);
                let thread_name = name.clone();

                let handle = thread::Builder::new()
                    .name(format!("mimir-{name}"))
                    .spawn(move || {
                        let mut naechster = Instant::now();
                        let mut letzter = None;
                        loop {
                            let jetzt = Instant::now();
                            if naechster > jetzt {
                                match stopp_rx.recv_timeout(naechster - jetzt) {
                                    Err(RecvTimeoutError::Timeout) => {}
                                    _ => break,
                                }
                            } else if !matches!(stopp_rx.try_recv(), Err(TryRecvError::Empty)) {
                                break;
                            }

                            takt_ausfuehren(&thread_name, intervall, &mut aufgabe, &mut letzter, &statistik);

                            naechster += intervall;
                            let jetzt = Instant::now();
                            if jetzt > naechster {
                                // Verpasste Takte werden nicht nachgeholt
                                tracing::debug!(takt = %thread_name, "Takt zurueck, neu synchronisiert");
                                naechster = jetzt;
                            }
                        }
                        let _ = fertig_tx.send(());
                    })
                    .map_err(|e| VoiceError::TaktThread(e.to_string()))?;

                Laeufer::Thread {
                    stopp_tx,
                    fertig_rx,
                    handle,
                }
            }
        };

        tracing::debug!(takt = %name, intervall_ms = intervall.as_millis() as u64, ?strategie, "Taktgeber gestartet");

        Ok(Self {
            name,
            statistik,
            laeufer: Mutex::new(Some(laeufer)),
        })
    }

    /// Stoppt den Takt (idempotent)
    ///
    /// Ein Takt-Thread bekommt [`STOPP_TIMEOUT`] Zeit, sich zu beenden;
    /// danach wird er abgekoppelt.
    pub fn stoppen(&self) {
        let Some(laeufer) = self.laeufer.lock().take() else {
            return;
        };

        match laeufer {
            Laeufer::Task(task) => task.abort(),
            Laeufer::Thread {
                stopp_tx,
                fertig_rx,
                handle,
            } => {
                let _ = stopp_tx.try_send(());
                drop(stopp_tx);
                match fertig_rx.recv_timeout(STOPP_TIMEOUT) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                        if handle.join().is_err() {
                            tracing::warn!(takt = %self.name, "Takt-Thread mit Panic beendet");
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        tracing::warn!(
                            takt = %self.name,
                            timeout_s = STOPP_TIMEOUT.as_secs(),
                            "Takt-Thread reagiert nicht, wird abgekoppelt"
                        );
                    }
                }
            }
        }

        let statistik = self.statistik();
        tracing::info!(
            takt = %self.name,
            ticks = statistik.ticks,
            fehler = statistik.fehler,
            mittlerer_jitter_ms = statistik.mittlerer_jitter_ms,
            "Taktgeber gestoppt"
        );
    }

    pub fn laeuft(&self) -> bool {
        self.laeufer.lock().is_some()
    }

    pub fn statistik(&self) -> TaktStatistik {
        self.statistik.lock().clone()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for Taktgeber {
    fn drop(&mut self) {
        self.stoppen();
    }
}

/// Fuehrt einen Takt aus, faengt Fehler und Panics ab
fn takt_ausfuehren<F>(
    name: &str,
    intervall: Duration,
    aufgabe: &mut F,
    letzter: &mut Option<Instant>,
    statistik: &Mutex<TaktStatistik>,
) where
    F: FnMut() -> VoiceResult<()>,
{
    let jetzt = Instant::now();
    let jitter_ms = letzter.map(|vorher| {
        let ist = jetzt.saturating_duration_since(vorher).as_secs_f64() * 1000.0;
        (ist - intervall.as_secs_f64() * 1000.0).abs()
    });
    *letzter = Some(jetzt);

    if let Some(jitter) = jitter_ms.filter(|j| *j > TAKT_JITTER_LOG_MS) {
        tracing::debug!(takt = name, jitter_ms = jitter, "Takt-Jitter");
    }

    let fehlgeschlagen = match panic::catch_unwind(AssertUnwindSafe(&mut *aufgabe)) {
        Ok(Ok(())) => false,
        Ok(Err(e)) => {
            tracing::warn!(takt = name, fehler = %e, "Takt-Aufgabe fehlgeschlagen");
            true
        }
        Err(_) => {
            tracing::error!(takt = name, "Takt-Aufgabe mit Panic abgebrochen");
            true
        }
    };

    statistik.lock().erfassen(jitter_ms, fehlgeschlagen);
}

// ---------------------------------------------------------------------------
// PaketSenke
// ---------------------------------------------------------------------------

/// Ziel fuer fertige RTP-Pakete
pub trait PaketSenke: Send + Sync {
    fn senden(&self, paket: &[u8]) -> VoiceResult<()>;
}

/// Erhaelt jede einzelne Jitter-Messung des Pacers (ms)
pub trait JitterBeobachter: Send + Sync {
    fn beobachten(&self, jitter_ms: f64);
}

// ---------------------------------------------------------------------------
// AusgangsPacer
// ---------------------------------------------------------------------------

/// Konfiguration des Ausgangs-Pacers
#[derive(Debug, Clone)]
pub struct PacerConfig {
    pub payload_typ: PayloadTyp,
    pub ssrc: u32,
    /// Taktintervall, zugleich Sollwert der Zeitmessung
    pub intervall: Duration,
    pub timing: RtpTimingConfig,
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            payload_typ: PayloadTyp::Pcmu,
            ssrc: STANDARD_SSRC,
            intervall: NOMINALES_INTERVALL,
            timing: RtpTimingConfig::default(),
        }
    }
}

/// Versandweg eines Frames
#[derive(Debug)]
pub enum SendeStrategie {
    /// Frame geht unmittelbar raus
    Direkt,
    /// Frame laeuft durch einen Ringpuffer fester Tiefe
    Gepuffert(Ringpuffer<Vec<u8>>),
}

impl SendeStrategie {
    fn name(&self) -> &'static str {
        match self {
            Self::Direkt => "direkt",
            Self::Gepuffert(_) => "gepuffert",
        }
    }
}

/// Von aussen lesbarer Zustand eines Pacers
#[derive(Debug, Default)]
pub struct PacerStatus {
    gesendet: AtomicU64,
    sendefehler: AtomicU64,
    adaptiv: AtomicBool,
    metriken: RwLock<TimingMetrics>,
}

impl PacerStatus {
    /// Erfolgreich gesendete Pakete
    pub fn gesendet(&self) -> u64 {
        self.gesendet.load(Ordering::Relaxed)
    }

    pub fn sendefehler(&self) -> u64 {
        self.sendefehler.load(Ordering::Relaxed)
    }

    pub fn adaptiv_aktiv(&self) -> bool {
        self.adaptiv.load(Ordering::Acquire)
    }

    pub fn metriken(&self) -> TimingMetrics {
        *self.metriken.read()
    }
}

/// Takt-Logik der Ausgangsrichtung
pub struct AusgangsPacer {
    config: PacerConfig,
    ausgabe: Arc<AudioAusgabe>,
    senke: Arc<dyn PaketSenke>,
    beobachter: Option<Arc<dyn JitterBeobachter>>,
    framer: RtpFramer,
    strategie: SendeStrategie,
    status: Arc<PacerStatus>,
    letzter_versand: Option<Instant>,
    epoche: u64,
    letzter_bericht: Instant,
}

impl AusgangsPacer {
    pub fn neu(config: PacerConfig, ausgabe: Arc<AudioAusgabe>, senke: Arc<dyn PaketSenke>) -> Self {
        let framer = RtpFramer::neu(config.payload_typ, config.ssrc);
        let epoche = ausgabe.epoche();
        Self {
            config,
            ausgabe,
            senke,
            beobachter: None,
            framer,
            strategie: SendeStrategie::Direkt,
            status: Arc::new(PacerStatus::default()),
            letzter_versand: None,
            epoche,
            letzter_bericht: Instant::now(),
        }
    }

    pub fn mit_beobachter(mut self, beobachter: Arc<dyn JitterBeobachter>) -> Self {
        self.beobachter = Some(beobachter);
        self
    }

    /// Geteilter Status, bleibt nach `takt_starten` lesbar
    pub fn status(&self) -> Arc<PacerStatus> {
        Arc::clone(&self.status)
    }

    pub fn strategie(&self) -> &SendeStrategie {
        &self.strategie
    }

    /// Ein Takt zur aktuellen Zeit
    pub fn tick(&mut self) -> VoiceResult<()> {
        self.tick_um(Instant::now())
    }

    /// Ein Takt zu einem vorgegebenen Zeitpunkt
    pub fn tick_um(&mut self, jetzt: Instant) -> VoiceResult<()> {
        let epoche = self.ausgabe.epoche();
        if epoche != self.epoche {
            self.epoche = epoche;
            self.letzter_versand = None;
            if let SendeStrategie::Gepuffert(ring) = &mut self.strategie {
                ring.leeren();
            }
        }

        let frame = match &mut self.strategie {
            SendeStrategie::Direkt => self.ausgabe.frame_holen(),
            SendeStrategie::Gepuffert(ring) => gepuffert_holen(ring, &self.ausgabe),
        };
        let Some(frame) = frame else {
            // Sprechpause zaehlt nicht als Jitter
            self.letzter_versand = None;
            self.bericht_pruefen(jetzt);
            return Ok(());
        };

        if self.config.timing.metriken_aktiv {
            self.messen(jetzt);
        }

        let paket = self.framer.bauen(&frame);
        let ergebnis = self.senke.senden(&paket);
        match &ergebnis {
            Ok(()) => {
                self.status.gesendet.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(
                    sequence = self.framer.naechste_sequence().wrapping_sub(1),
                    bytes = paket.len(),
                    "RTP-Paket gesendet"
                );
            }
            Err(_) => {
                self.status.sendefehler.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.bericht_pruefen(jetzt);
        ergebnis
    }

    /// Startet den Takt fuer diesen Pacer
    ///
    /// Die Strategie folgt `timing.dedizierter_takt`.
    pub fn takt_starten(mut self, name: impl Into<String>) -> VoiceResult<Taktgeber> {
        let strategie = if self.config.timing.dedizierter_takt {
            TaktStrategie::Dediziert
        } else {
            TaktStrategie::Kooperativ
        };
        let intervall = self.config.intervall;
        Taktgeber::starten(name, intervall, strategie, move || self.tick())
    }

    fn messen(&mut self, jetzt: Instant) {
        if let Some(vorher) = self.letzter_versand {
            let intervall_ms = jetzt.saturating_duration_since(vorher).as_secs_f64() * 1000.0;
            let nominal_ms = self.config.intervall.as_secs_f64() * 1000.0;

            let neu = {
                let mut metriken = self.status.metriken.write();
                *metriken = metriken.aktualisieren(intervall_ms, nominal_ms);
                *metriken
            };
            if let Some(beobachter) = &self.beobachter {
                beobachter.beobachten(neu.letzter_jitter_ms);
            }

            if neu.letzter_jitter_ms > self.config.timing.jitter_fehler_schwelle_ms {
                tracing::warn!(
                    jitter_ms = neu.letzter_jitter_ms,
                    intervall_ms,
                    "Hoher Sende-Jitter"
                );
            }

            if self.config.timing.adaptiv_aktiv
                && matches!(self.strategie, SendeStrategie::Direkt)
                && neu.adaptiv_noetig(self.config.timing.jitter_warn_schwelle_ms)
            {
                self.strategie =
                    SendeStrategie::Gepuffert(Ringpuffer::neu(self.config.timing.ring_tiefe));
                self.status.adaptiv.store(true, Ordering::Release);
                tracing::info!(
                    mittlerer_jitter_ms = neu.mittlerer_jitter_ms,
                    ring_tiefe = self.config.timing.ring_tiefe,
                    "Adaptiver Sendemodus aktiviert"
                );
            }
        }
        self.letzter_versand = Some(jetzt);
    }

    fn bericht_pruefen(&mut self, jetzt: Instant) {
        if !self.config.timing.metriken_aktiv
            || jetzt.saturating_duration_since(self.letzter_bericht) < self.config.timing.bericht_intervall
        {
            return;
        }
        self.letzter_bericht = jetzt;

        let metriken = self.status.metriken();
        tracing::info!(
            %metriken,
            gesendet = self.status.gesendet(),
            strategie = self.strategie.name(),
            "RTP-Timing-Bericht"
        );
        if metriken.mittlerer_jitter_ms > HOHER_JITTER_MS {
            tracing::warn!(
                mittlerer_jitter_ms = metriken.mittlerer_jitter_ms,
                "Dauerhaft hoher RTP-Jitter"
            );
        }
    }
}

/// Ein Takt im gepufferten Modus
///
/// Ein leerer Ring wird zuerst bis zur vollen Tiefe aus der Queue gefuellt.
/// Danach kommt pro Takt ein Frame aus der Queue hinzu und der aelteste
/// geht raus, der Versand laeuft also um die Ringtiefe versetzt. Ist die
/// Queue leer, laeuft der Ring Frame fuer Frame aus.
fn gepuffert_holen(ring: &mut Ringpuffer<Vec<u8>>, ausgabe: &AudioAusgabe) -> Option<Vec<u8>> {
    if ring.is_empty() {
        while ring.len() < ring.kapazitaet() {
            let Some(frame) = ausgabe.frame_holen() else {
                break;
            };
            ring.hinzufuegen(frame);
        }
        if !ring.is_empty() {
            tracing::trace!(tiefe = ring.len(), "Ringpuffer vorgefuellt");
        }
    } else if let Some(frame) = ausgabe.frame_holen() {
        // Nach jeder Entnahme ist ein Platz frei, hier wird nichts verdraengt
        ring.hinzufuegen(frame);
    }
    ring.entnehmen()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use mimir_protocol::voice::RtpHeader;

    #[derive(Default)]
    struct Aufnahme {
        pakete: Mutex<Vec<Vec<u8>>>,
        fehlschlagen: AtomicBool,
    }

    impl PaketSenke for Aufnahme {
        fn senden(&self, paket: &[u8]) -> VoiceResult<()> {
            if self.fehlschlagen.load(Ordering::Relaxed) {
                return Err(VoiceError::SocketVoll);
            }
            self.pakete.lock().push(paket.to_vec());
            Ok(())
        }
    }

    fn pacer(timing: RtpTimingConfig) -> (AusgangsPacer, Arc<AudioAusgabe>, Arc<Aufnahme>) {
        let ausgabe = Arc::new(AudioAusgabe::default());
        let senke = Arc::new(Aufnahme::default());
        let config = PacerConfig {
            timing,
            ..Default::default()
        };
        let pacer = AusgangsPacer::neu(config, Arc::clone(&ausgabe), senke.clone());
        (pacer, ausgabe, senke)
    }

    #[test]
    fn leere_queue_sendet_nichts() {
        let (mut pacer, _ausgabe, senke) = pacer(RtpTimingConfig::standard());
        pacer.tick().unwrap();
        pacer.tick().unwrap();
        assert!(senke.pakete.lock().is_empty());
    }

    #[test]
    fn ein_paket_pro_takt() {
        let (mut pacer, ausgabe, senke) = pacer(RtpTimingConfig::standard());
        ausgabe.audio_anhaengen(&[7u8; 480]);

        pacer.tick().unwrap();
        assert_eq!(senke.pakete.lock().len(), 1);
        pacer.tick().unwrap();
        pacer.tick().unwrap();
        pacer.tick().unwrap();

        let pakete = senke.pakete.lock();
        assert_eq!(pakete.len(), 3);
        let sequenzen: Vec<u16> = pakete
            .iter()
            .map(|p| RtpHeader::decode(p).unwrap().sequence)
            .collect();
        assert_eq!(sequenzen, vec![0, 1, 2]);
        assert_eq!(RtpHeader::decode(&pakete[2]).unwrap().timestamp, 320);
        assert_eq!(pakete[0].len(), 12 + 160);
    }

    #[test]
    fn wechsel_in_adaptiven_modus() {
        let (mut pacer, ausgabe, senke) = pacer(RtpTimingConfig::standard());
        ausgabe.audio_anhaengen(&[1u8; 160 * 20]);
        let start = Instant::now();

        // 30 ms Abstand -> 10 ms Jitter pro Messung
        for i in 0..11u32 {
            pacer.tick_um(start + Duration::from_millis(30) * i).unwrap();
        }
        let status = pacer.status();
        assert_eq!(status.metriken().anzahl, 10);
        assert!(!status.adaptiv_aktiv());

        pacer.tick_um(start + Duration::from_millis(30) * 11).unwrap();
        assert!(status.adaptiv_aktiv());
        assert!(matches!(pacer.strategie(), SendeStrategie::Gepuffert(_)));

        // Gepuffert sendet weiterhin einen Frame pro Takt
        pacer.tick_um(start + Duration::from_millis(30) * 12).unwrap();
        assert_eq!(senke.pakete.lock().len(), 13);
        assert_eq!(status.gesendet(), 13);
    }

    fn ring_laenge(pacer: &AusgangsPacer) -> usize {
        match pacer.strategie() {
            SendeStrategie::Gepuffert(ring) => ring.len(),
            SendeStrategie::Direkt => 0,
        }
    }

    #[test]
    fn gepufferter_modus_sendet_versetzt() {
        let (mut pacer, ausgabe, senke) = pacer(RtpTimingConfig::standard());
        for id in 0..40u8 {
            ausgabe.audio_anhaengen(&[id; 160]);
        }
        let start = Instant::now();
        let takt = |i: u32| start + Duration::from_millis(30) * i;

        for i in 0..12u32 {
            pacer.tick_um(takt(i)).unwrap();
        }
        assert!(pacer.status().adaptiv_aktiv());
        assert_eq!(ring_laenge(&pacer), 0);
        assert_eq!(ausgabe.laenge(), 28);

        // Erster gepufferter Takt fuellt den Ring auf Tiefe 10
        pacer.tick_um(takt(12)).unwrap();
        assert_eq!(ausgabe.laenge(), 18);
        assert_eq!(ring_laenge(&pacer), 9);

        pacer.tick_um(takt(13)).unwrap();
        assert_eq!(ausgabe.laenge(), 17);
        assert_eq!(ring_laenge(&pacer), 9);
        // Frame 22 wurde gerade geholt, Frame 13 geht raus
        assert_eq!(senke.pakete.lock().last().unwrap()[12], 13);

        for i in 14..=30u32 {
            pacer.tick_um(takt(i)).unwrap();
            assert!(ring_laenge(&pacer) > 0);
        }
        assert!(ausgabe.ist_leer());

        // Queue leer: Ring laeuft Frame fuer Frame aus
        for i in 31..=40u32 {
            pacer.tick_um(takt(i)).unwrap();
        }
        assert_eq!(ring_laenge(&pacer), 0);

        let ids: Vec<u8> = senke.pakete.lock().iter().map(|p| p[12]).collect();
        assert_eq!(ids, (0..40u8).collect::<Vec<_>>());
    }

    #[test]
    fn barge_in_leert_ring() {
        let (mut pacer, ausgabe, senke) = pacer(RtpTimingConfig::standard());
        for id in 0..30u8 {
            ausgabe.audio_anhaengen(&[id; 160]);
        }
        let start = Instant::now();
        for i in 0..14u32 {
            pacer.tick_um(start + Duration::from_millis(30) * i).unwrap();
        }
        assert!(ring_laenge(&pacer) > 0);

        ausgabe.leeren();
        ausgabe.audio_anhaengen(&[99u8; 160]);
        pacer.tick_um(start + Duration::from_millis(30) * 14).unwrap();

        assert_eq!(ring_laenge(&pacer), 0);
        assert_eq!(senke.pakete.lock().last().unwrap()[12], 99);
    }

    #[derive(Default)]
    struct JitterAufnahme(Mutex<Vec<f64>>);

    impl JitterBeobachter for JitterAufnahme {
        fn beobachten(&self, jitter_ms: f64) {
            self.0.lock().push(jitter_ms);
        }
    }

    #[test]
    fn beobachter_sieht_jede_messung() {
        let (pacer, ausgabe, _senke) = pacer(RtpTimingConfig::standard());
        let aufnahme = Arc::new(JitterAufnahme::default());
        let mut pacer = pacer.mit_beobachter(aufnahme.clone());
        ausgabe.audio_anhaengen(&[1u8; 160 * 5]);

        let start = Instant::now();
        let mut zeitpunkt = start;
        pacer.tick_um(zeitpunkt).unwrap();
        for abstand in [25u64, 35, 22, 50] {
            zeitpunkt += Duration::from_millis(abstand);
            pacer.tick_um(zeitpunkt).unwrap();
        }

        let werte: Vec<f64> = aufnahme.0.lock().iter().map(|j| j.round()).collect();
        assert_eq!(werte, vec![5.0, 15.0, 2.0, 30.0]);
    }

    #[test]
    fn kein_adaptiver_modus_wenn_abgeschaltet() {
        let (mut pacer, ausgabe, _senke) = pacer(RtpTimingConfig::niedrige_latenz());
        ausgabe.audio_anhaengen(&[1u8; 160 * 20]);
        let start = Instant::now();
        for i in 0..20u32 {
            pacer.tick_um(start + Duration::from_millis(50) * i).unwrap();
        }
        assert!(!pacer.status().adaptiv_aktiv());
        assert!(matches!(pacer.strategie(), SendeStrategie::Direkt));
    }

    #[test]
    fn sprechpause_setzt_messung_zurueck() {
        let (mut pacer, ausgabe, _senke) = pacer(RtpTimingConfig::standard());
        let start = Instant::now();

        ausgabe.audio_anhaengen(&[1u8; 160]);
        pacer.tick_um(start).unwrap();
        pacer.tick_um(start + Duration::from_millis(20)).unwrap();

        ausgabe.audio_anhaengen(&[1u8; 320]);
        pacer.tick_um(start + Duration::from_millis(40)).unwrap();
        assert_eq!(pacer.status().metriken().anzahl, 0);

        pacer.tick_um(start + Duration::from_millis(60)).unwrap();
        let metriken = pacer.status().metriken();
        assert_eq!(metriken.anzahl, 1);
        assert_eq!(metriken.mittlerer_jitter_ms, 0.0);
    }

    #[test]
    fn barge_in_setzt_messung_zurueck() {
        let (mut pacer, ausgabe, senke) = pacer(RtpTimingConfig::standard());
        let start = Instant::now();
        ausgabe.audio_anhaengen(&[1u8; 480]);
        pacer.tick_um(start).unwrap();

        ausgabe.leeren();
        ausgabe.audio_anhaengen(&[2u8; 160]);
        pacer.tick_um(start + Duration::from_millis(500)).unwrap();

        assert_eq!(pacer.status().metriken().anzahl, 0);
        let pakete = senke.pakete.lock();
        assert_eq!(pakete.len(), 2);
        assert_eq!(pakete[1][12], 2);
    }

    #[test]
    fn sendefehler_wird_gemeldet_und_gezaehlt() {
        let (mut pacer, ausgabe, senke) = pacer(RtpTimingConfig::standard());
        senke.fehlschlagen.store(true, Ordering::Relaxed);
        ausgabe.audio_anhaengen(&[1u8; 160]);

        assert!(pacer.tick().is_err());
        assert_eq!(pacer.status().sendefehler(), 1);
        assert_eq!(pacer.status().gesendet(), 0);
    }

    #[test]
    fn dedizierter_takt_laeuft_und_stoppt() {
        let zaehler = Arc::new(AtomicU64::new(0));
        let z = Arc::clone(&zaehler);
        let takt = Taktgeber::starten("test", Duration::from_millis(5), TaktStrategie::Dediziert, move || {
            z.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
        .unwrap();

        thread::sleep(Duration::from_millis(100));
        takt.stoppen();
        let nach_stopp = zaehler.load(Ordering::Relaxed);
        assert!(nach_stopp >= 5, "nur {nach_stopp} Takte");
        assert!(!takt.laeuft());

        thread::sleep(Duration::from_millis(30));
        assert_eq!(zaehler.load(Ordering::Relaxed), nach_stopp);
        assert_eq!(takt.statistik().ticks, nach_stopp);

        // Zweites Stoppen ist wirkungslos
        takt.stoppen();
    }

    #[test]
    fn takt_ueberlebt_fehler_und_panics() {
        let zaehler = Arc::new(AtomicU64::new(0));
        let z = Arc::clone(&zaehler);
        let takt = Taktgeber::starten("fehler", Duration::from_millis(5), TaktStrategie::Dediziert, move || {
            let n = z.fetch_add(1, Ordering::Relaxed);
            match n {
                0 => panic!("absichtlich"),
                1 => Err(VoiceError::SocketVoll),
                _ => Ok(()),
            }
        })
        .unwrap();

        thread::sleep(Duration::from_millis(80));
        takt.stoppen();

        let statistik = takt.statistik();
        assert!(statistik.ticks >= 4);
        assert_eq!(statistik.fehler, 2);
    }

    #[test]
    fn kooperativ_ohne_runtime_ist_fehler() {
        let ergebnis = Taktgeber::starten("ohne", Duration::from_millis(20), TaktStrategie::Kooperativ, || Ok(()));
        assert!(matches!(ergebnis, Err(VoiceError::KeineLaufzeit)));
    }

    #[test]
    fn null_intervall_ist_fehler() {
        let ergebnis = Taktgeber::starten("null", Duration::ZERO, TaktStrategie::Dediziert, || Ok(()));
        assert!(matches!(ergebnis, Err(VoiceError::Konfiguration(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn kooperativer_takt_feuert_im_intervall() {
        let zaehler = Arc::new(AtomicU64::new(0));
        let z = Arc::clone(&zaehler);
        let takt = Taktgeber::starten("koop", Duration::from_millis(20), TaktStrategie::Kooperativ, move || {
            z.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
        .unwrap();

        tokio::time::sleep(Duration::from_millis(110)).await;
        takt.stoppen();
        let ticks = zaehler.load(Ordering::Relaxed);
        assert!((5..=7).contains(&ticks), "{ticks} Takte");

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(zaehler.load(Ordering::Relaxed), ticks);
    }

    #[tokio::test(start_paused = true)]
    async fn kooperativer_takt_holt_nicht_nach() {
        let zaehler = Arc::new(AtomicU64::new(0));
        let z = Arc::clone(&zaehler);
        let takt = Taktgeber::starten("haenger", Duration::from_millis(20), TaktStrategie::Kooperativ, move || {
            z.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
        .unwrap();

        tokio::task::yield_now().await;
        assert_eq!(zaehler.load(Ordering::Relaxed), 1);

        // Zehn Intervalle ohne Gelegenheit zum Takten
        tokio::time::advance(Duration::from_millis(200)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(zaehler.load(Ordering::Relaxed), 2);
        takt.stoppen();
    }

    #[test]
    fn dedizierter_takt_holt_nicht_nach() {
        let zeitpunkte = Arc::new(Mutex::new(Vec::new()));
        let z = Arc::clone(&zeitpunkte);
        let takt = Taktgeber::starten("haenger", Duration::from_millis(5), TaktStrategie::Dediziert, move || {
            let mut zeiten = z.lock();
            zeiten.push(Instant::now());
            if zeiten.len() == 2 {
                drop(zeiten);
                thread::sleep(Duration::from_millis(20));
            }
            Ok(())
        })
        .unwrap();

        thread::sleep(Duration::from_millis(120));
        takt.stoppen();

        let zeiten = zeitpunkte.lock();
        assert!(zeiten.len() >= 4, "nur {} Takte", zeiten.len());
        // Nach dem Haenger: ein Takt sofort, der naechste erst ein Intervall spaeter
        let abstand = zeiten[3].duration_since(zeiten[2]);
        assert!(abstand >= Duration::from_millis(4), "Abstand {abstand:?}");
    }

    #[test]
    fn pacer_am_dedizierten_takt() {
        let ausgabe = Arc::new(AudioAusgabe::default());
        let senke = Arc::new(Aufnahme::default());
        let pacer = AusgangsPacer::neu(
            PacerConfig {
                intervall: Duration::from_millis(5),
                ..Default::default()
            },
            Arc::clone(&ausgabe),
            senke.clone(),
        );
        let status = pacer.status();
        ausgabe.audio_anhaengen(&[1u8; 160 * 3]);

        let takt = pacer.takt_starten("ausgang").unwrap();
        thread::sleep(Duration::from_millis(100));
        takt.stoppen();

        assert_eq!(status.gesendet(), 3);
        assert_eq!(senke.pakete.lock().len(), 3);
        assert!(ausgabe.ist_leer());
    }
}
