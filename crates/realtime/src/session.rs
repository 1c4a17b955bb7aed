//! Handshake-Zustandsautomat einer Realtime-Session
//!
//! Die Session kennt keinen Socket. Der Transport ruft `verbunden()`,
//! `text_verarbeiten()` und `transport_beendet()` auf; ausgehende
//! Nachrichten landen im [`AusgangsKanal`], Audio der Gegenseite in der
//! [`AudioAusgabe`] des Anrufs.
//!
//! ## Ablauf
//!
//! ```text
//! Neu --verbunden()--> Verbunden        (sendet session.update)
//!     --session.created--> SessionErstellt
//!     --session.updated--> Angenommen   (sendet response.create)
//!     --erstes Audio-Delta--> AudioEmpfangen  (meldet AudioBereit)
//! jeder Zustand --Transportende--> Beendet    (meldet Beendet)
//! ```

use crate::error::{RealtimeError, RealtimeResult};
use crate::state::SessionState;
use mimir_core::{CallId, SessionEreignis};
use mimir_protocol::realtime::{typ, AudioFormat, ClientNachricht, ServerNachricht, SessionKonfiguration};
use mimir_voice::AudioAusgabe;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;

/// Kapazitaet des Ausgangs-Kanals zum WebSocket-Schreiber
pub const AUSGANG_KAPAZITAET: usize = 256;

// ---------------------------------------------------------------------------
// AusgangsKanal
// ---------------------------------------------------------------------------

/// Sende-Handle fuer JSON-Nachrichten an die Gegenstelle
///
/// Klonbar; nicht blockierend, damit auch Takt-Aufgaben senden koennen.
#[derive(Debug, Clone)]
pub struct AusgangsKanal {
    tx: mpsc::Sender<String>,
}

impl AusgangsKanal {
    /// Erstellt den Kanal; der Empfaenger gehoert dem Transport
    pub fn neu(kapazitaet: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(kapazitaet.max(1));
        (Self { tx }, rx)
    }

    pub fn senden(&self, nachricht: &ClientNachricht) -> RealtimeResult<()> {
        let text = nachricht.to_json()?;
        self.tx.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => RealtimeError::AusgangVoll,
            mpsc::error::TrySendError::Closed(_) => RealtimeError::Geschlossen,
        })
    }

    /// Sendet Anrufer-Audio als `input_audio_buffer.append`
    ///
    /// Leere Puffer werden nicht gesendet.
    pub fn audio_senden(&self, audio: &[u8]) -> RealtimeResult<()> {
        if audio.is_empty() {
            return Ok(());
        }
        self.senden(&ClientNachricht::audio(audio))
    }

    pub fn ist_geschlossen(&self) -> bool {
        self.tx.is_closed()
    }
}

// ---------------------------------------------------------------------------
// SessionParameter
// ---------------------------------------------------------------------------

/// Inhalt der Session pro Anruf
#[derive(Debug, Clone, PartialEq)]
pub struct SessionParameter {
    pub anweisungen: String,
    pub stimme: String,
    pub begruessung: String,
    pub format: AudioFormat,
}

// ---------------------------------------------------------------------------
// Handler-Tabelle
// ---------------------------------------------------------------------------

type Handler = fn(&mut RealtimeSession, &ServerNachricht);

fn handler_tabelle() -> &'static HashMap<&'static str, Handler> {
    static TABELLE: OnceLock<HashMap<&'static str, Handler>> = OnceLock::new();
    TABELLE.get_or_init(|| {
        let mut tabelle: HashMap<&'static str, Handler> = HashMap::new();
        tabelle.insert(typ::SESSION_CREATED, RealtimeSession::session_erstellt);
        tabelle.insert(typ::SESSION_UPDATED, RealtimeSession::session_aktualisiert);
        tabelle.insert(typ::AUDIO_DELTA, RealtimeSession::audio_delta);
        tabelle.insert(typ::AUDIO_DONE, RealtimeSession::audio_fertig);
        tabelle.insert(typ::SPEECH_STARTED, RealtimeSession::sprache_erkannt);
        tabelle.insert(typ::ERROR, RealtimeSession::fehler_gemeldet);
        tabelle
    })
}

// ---------------------------------------------------------------------------
// RealtimeSession
// ---------------------------------------------------------------------------

/// Zustandsautomat einer Realtime-Verbindung (eine Instanz pro Anruf)
pub struct RealtimeSession {
    call_id: CallId,
    zustand: SessionState,
    parameter: SessionParameter,
    ausgang: AusgangsKanal,
    audio: Arc<AudioAusgabe>,
    ereignisse: mpsc::UnboundedSender<SessionEreignis>,
    audio_gemeldet: bool,
    ende_gemeldet: bool,
}

impl RealtimeSession {
    pub fn neu(
        call_id: CallId,
        parameter: SessionParameter,
        ausgang: AusgangsKanal,
        audio: Arc<AudioAusgabe>,
        ereignisse: mpsc::UnboundedSender<SessionEreignis>,
    ) -> Self {
        Self {
            call_id,
            zustand: SessionState::Neu,
            parameter,
            ausgang,
            audio,
            ereignisse,
            audio_gemeldet: false,
            ende_gemeldet: false,
        }
    }

    pub fn zustand(&self) -> SessionState {
        self.zustand
    }

    pub fn call_id(&self) -> CallId {
        self.call_id
    }

    /// Transport ist offen: Session-Konfiguration senden
    pub fn verbunden(&mut self) {
        if !self.wechseln(SessionState::Verbunden) {
            return;
        }
        let konfiguration = SessionKonfiguration::neu(
            self.parameter.anweisungen.clone(),
            self.parameter.stimme.clone(),
            self.parameter.format,
        );
        self.nachricht_senden(&ClientNachricht::SessionUpdate {
            session: konfiguration,
        });
    }

    /// Verarbeitet eine eingehende Textnachricht
    ///
    /// Ungueltiges JSON wird geloggt und verworfen, der Zustand bleibt.
    pub fn text_verarbeiten(&mut self, text: &str) {
        match ServerNachricht::parsen(text) {
            Ok(nachricht) => self.nachricht_verarbeiten(&nachricht),
            Err(e) => {
                tracing::warn!(call_id = %self.call_id, fehler = %e, "Ungueltige Realtime-Nachricht verworfen");
            }
        }
    }

    /// Leitet eine Nachricht an den Handler ihres Typs weiter
    pub fn nachricht_verarbeiten(&mut self, nachricht: &ServerNachricht) {
        if self.zustand.ist_beendet() {
            tracing::trace!(call_id = %self.call_id, typ = %nachricht.typ, "Nachricht nach Sessionende ignoriert");
            return;
        }
        match handler_tabelle().get(nachricht.typ.as_str()) {
            Some(handler) => handler(self, nachricht),
            None => {
                tracing::debug!(call_id = %self.call_id, typ = %nachricht.typ, "Unbehandelter Nachrichtentyp");
            }
        }
    }

    /// Transport geschlossen oder fehlgeschlagen
    pub fn transport_beendet(&mut self, grund: &str) {
        if self.wechseln(SessionState::Beendet) {
            tracing::info!(call_id = %self.call_id, grund, "Realtime-Session beendet");
        }
        if !self.ende_gemeldet {
            self.ende_gemeldet = true;
            let _ = self.ereignisse.send(SessionEreignis::beendet(grund));
        }
    }

    // -----------------------------------------------------------------------
    // Handler
    // -----------------------------------------------------------------------

    fn session_erstellt(&mut self, _nachricht: &ServerNachricht) {
        if !self.wechseln(SessionState::SessionErstellt) {
            tracing::debug!(call_id = %self.call_id, zustand = %self.zustand, "session.created ignoriert");
        }
    }

    fn session_aktualisiert(&mut self, _nachricht: &ServerNachricht) {
        if self.zustand != SessionState::SessionErstellt {
            tracing::warn!(call_id = %self.call_id, zustand = %self.zustand, "session.updated im falschen Zustand");
            return;
        }
        self.wechseln(SessionState::Angenommen);
        let begruessung = ClientNachricht::begruessung(self.parameter.begruessung.clone());
        self.nachricht_senden(&begruessung);
    }

    fn audio_delta(&mut self, nachricht: &ServerNachricht) {
        let audio = match nachricht.audio_delta() {
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!(call_id = %self.call_id, fehler = %e, "Audio-Delta verworfen");
                return;
            }
        };

        if self.zustand < SessionState::AudioEmpfangen {
            self.wechseln(SessionState::AudioEmpfangen);
        }
        if !self.audio_gemeldet {
            self.audio_gemeldet = true;
            tracing::info!(call_id = %self.call_id, "Erstes Audio der Gegenseite empfangen");
            let _ = self.ereignisse.send(SessionEreignis::AudioBereit);
        }

        let frames = self.audio.audio_anhaengen(&audio);
        tracing::trace!(call_id = %self.call_id, bytes = audio.len(), frames, "Audio-Delta eingereiht");
    }

    fn audio_fertig(&mut self, _nachricht: &ServerNachricht) {
        if self.audio.antwort_abschliessen() {
            tracing::trace!(call_id = %self.call_id, "Letzter Frame mit Stille aufgefuellt");
        }
    }

    fn sprache_erkannt(&mut self, _nachricht: &ServerNachricht) {
        let verworfen = self.audio.leeren();
        tracing::debug!(call_id = %self.call_id, verworfen, "Anrufer spricht, Ausgabe geleert");
    }

    fn fehler_gemeldet(&mut self, nachricht: &ServerNachricht) {
        let details = nachricht
            .felder
            .get("error")
            .map(|wert| wert.to_string())
            .unwrap_or_default();
        tracing::error!(call_id = %self.call_id, details = %details, "Fehlermeldung der Realtime-API");
    }

    // -----------------------------------------------------------------------
    // Intern
    // -----------------------------------------------------------------------

    fn wechseln(&mut self, ziel: SessionState) -> bool {
        if !self.zustand.kann_wechseln_zu(ziel) {
            return false;
        }
        tracing::debug!(call_id = %self.call_id, von = %self.zustand, nach = %ziel, "Session-Zustand");
        self.zustand = ziel;
        true
    }

    fn nachricht_senden(&self, nachricht: &ClientNachricht) {
        if let Err(e) = self.ausgang.senden(nachricht) {
            tracing::warn!(call_id = %self.call_id, fehler = %e, "Nachricht an Realtime-API nicht gesendet");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    struct Aufbau {
        session: RealtimeSession,
        ausgang_rx: mpsc::Receiver<String>,
        ereignisse_rx: mpsc::UnboundedReceiver<SessionEreignis>,
        audio: Arc<AudioAusgabe>,
    }

    fn aufbau() -> Aufbau {
        let (ausgang, ausgang_rx) = AusgangsKanal::neu(16);
        let (ereignisse_tx, ereignisse_rx) = mpsc::unbounded_channel();
        let audio = Arc::new(AudioAusgabe::default());
        let parameter = SessionParameter {
            anweisungen: "Du bist ein Telefonassistent".into(),
            stimme: "alloy".into(),
            begruessung: "Begruesse den Anrufer".into(),
            format: AudioFormat::G711Ulaw,
        };
        let session = RealtimeSession::neu(
            CallId::new(),
            parameter,
            ausgang,
            Arc::clone(&audio),
            ereignisse_tx,
        );
        Aufbau {
            session,
            ausgang_rx,
            ereignisse_rx,
            audio,
        }
    }

    fn typ_von(text: &str) -> String {
        let wert: Value = serde_json::from_str(text).unwrap();
        wert["type"].as_str().unwrap().to_string()
    }

    // "/w==" = [0xFF]
    const DELTA: &str = r#"{"type":"response.audio.delta","delta":"/w=="}"#;

    fn bis_angenommen(a: &mut Aufbau) {
        a.session.verbunden();
        a.session.text_verarbeiten(r#"{"type":"session.created"}"#);
        a.session.text_verarbeiten(r#"{"type":"session.updated"}"#);
    }

    #[test]
    fn verbunden_sendet_session_update() {
        let mut a = aufbau();
        a.session.verbunden();
        assert_eq!(a.session.zustand(), SessionState::Verbunden);

        let text = a.ausgang_rx.try_recv().unwrap();
        let wert: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(wert["type"], "session.update");
        assert_eq!(wert["session"]["voice"], "alloy");
        assert_eq!(wert["session"]["instructions"], "Du bist ein Telefonassistent");
    }

    #[test]
    fn vollstaendiger_handshake() {
        let mut a = aufbau();
        bis_angenommen(&mut a);
        assert_eq!(a.session.zustand(), SessionState::Angenommen);

        assert_eq!(typ_von(&a.ausgang_rx.try_recv().unwrap()), "session.update");
        let antwort = a.ausgang_rx.try_recv().unwrap();
        let wert: Value = serde_json::from_str(&antwort).unwrap();
        assert_eq!(wert["type"], "response.create");
        assert_eq!(wert["response"]["instructions"], "Begruesse den Anrufer");
    }

    #[test]
    fn session_updated_ohne_created_wird_ignoriert() {
        let mut a = aufbau();
        a.session.verbunden();
        a.ausgang_rx.try_recv().unwrap();

        a.session.text_verarbeiten(r#"{"type":"session.updated"}"#);
        assert_eq!(a.session.zustand(), SessionState::Verbunden);
        assert!(a.ausgang_rx.try_recv().is_err());
    }

    #[test]
    fn session_created_nach_angenommen_bleibt_angenommen() {
        let mut a = aufbau();
        bis_angenommen(&mut a);
        a.session.text_verarbeiten(r#"{"type":"session.created"}"#);
        assert_eq!(a.session.zustand(), SessionState::Angenommen);
    }

    #[test]
    fn audio_bereit_genau_einmal() {
        let mut a = aufbau();
        bis_angenommen(&mut a);
        for _ in 0..3 {
            a.session.text_verarbeiten(DELTA);
        }

        assert_eq!(a.session.zustand(), SessionState::AudioEmpfangen);
        assert_eq!(a.ereignisse_rx.try_recv().unwrap(), SessionEreignis::AudioBereit);
        assert!(a.ereignisse_rx.try_recv().is_err());
        assert_eq!(a.audio.laenge(), 3);
    }

    #[test]
    fn frische_session_meldet_audio_genau_einmal() {
        let mut a = aufbau();
        assert_eq!(a.session.zustand(), SessionState::Neu);
        for _ in 0..3 {
            a.session.text_verarbeiten(DELTA);
        }

        assert_eq!(a.session.zustand(), SessionState::AudioEmpfangen);
        assert_eq!(a.ereignisse_rx.try_recv().unwrap(), SessionEreignis::AudioBereit);
        assert!(a.ereignisse_rx.try_recv().is_err());
        assert_eq!(a.audio.laenge(), 3);
    }

    #[test]
    fn audio_vor_handshake_wird_eingereiht() {
        let mut a = aufbau();
        a.session.verbunden();
        a.session.text_verarbeiten(DELTA);

        assert_eq!(a.session.zustand(), SessionState::AudioEmpfangen);
        assert_eq!(a.audio.laenge(), 1);
        assert_eq!(a.ereignisse_rx.try_recv().unwrap(), SessionEreignis::AudioBereit);
    }

    #[test]
    fn ungueltiges_delta_aendert_nichts() {
        let mut a = aufbau();
        bis_angenommen(&mut a);
        a.session.text_verarbeiten(r#"{"type":"response.audio.delta","delta":"%%%"}"#);
        a.session.text_verarbeiten(r#"{"type":"response.audio.delta"}"#);

        assert_eq!(a.session.zustand(), SessionState::Angenommen);
        assert!(a.audio.ist_leer());
        assert!(a.ereignisse_rx.try_recv().is_err());
    }

    #[test]
    fn sprache_erkannt_leert_ausgabe() {
        let mut a = aufbau();
        bis_angenommen(&mut a);
        a.session.text_verarbeiten(DELTA);
        a.session.text_verarbeiten(DELTA);

        a.session.text_verarbeiten(r#"{"type":"input_audio_buffer.speech_started"}"#);
        assert!(a.audio.ist_leer());
        assert_eq!(a.audio.epoche(), 1);
        assert_eq!(a.session.zustand(), SessionState::AudioEmpfangen);
    }

    #[test]
    fn audio_done_fuellt_letzten_frame() {
        let mut a = aufbau();
        a.session.text_verarbeiten(DELTA);
        a.session.text_verarbeiten(r#"{"type":"response.audio.done"}"#);

        let frame = a.audio.frame_holen().unwrap();
        assert_eq!(frame.len(), 160);
    }

    #[test]
    fn unbekannte_und_kaputte_nachrichten() {
        let mut a = aufbau();
        a.session.verbunden();
        a.session.text_verarbeiten(r#"{"type":"rate_limits.updated"}"#);
        a.session.text_verarbeiten("{kein json");
        a.session.text_verarbeiten(r#"{"type":"error","error":{"message":"kaputt"}}"#);
        assert_eq!(a.session.zustand(), SessionState::Verbunden);
    }

    #[test]
    fn transportende_meldet_einmal() {
        let mut a = aufbau();
        bis_angenommen(&mut a);
        a.session.transport_beendet("close");
        a.session.transport_beendet("fehler");

        assert_eq!(a.session.zustand(), SessionState::Beendet);
        assert_eq!(a.ereignisse_rx.try_recv().unwrap(), SessionEreignis::beendet("close"));
        assert!(a.ereignisse_rx.try_recv().is_err());
    }

    #[test]
    fn nach_ende_wird_nichts_mehr_verarbeitet() {
        let mut a = aufbau();
        a.session.transport_beendet("close");
        a.session.text_verarbeiten(DELTA);
        a.session.verbunden();

        assert_eq!(a.session.zustand(), SessionState::Beendet);
        assert!(a.audio.ist_leer());
        assert!(a.ausgang_rx.try_recv().is_err());
    }

    #[test]
    fn ausgang_audio_senden() {
        let (ausgang, mut rx) = AusgangsKanal::neu(1);
        ausgang.audio_senden(&[]).unwrap();
        assert!(rx.try_recv().is_err());

        ausgang.audio_senden(&[1, 2, 3]).unwrap();
        assert!(matches!(ausgang.audio_senden(&[4]), Err(RealtimeError::AusgangVoll)));
        assert_eq!(typ_von(&rx.try_recv().unwrap()), "input_audio_buffer.append");

        drop(rx);
        assert!(matches!(ausgang.audio_senden(&[5]), Err(RealtimeError::Geschlossen)));
        assert!(ausgang.ist_geschlossen());
    }
}
