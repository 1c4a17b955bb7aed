//! Anruf-Controller
//!
//! Verbindet die Ereignisse der Realtime-Session mit der Signalisierung:
//!
//! - `AudioBereit` -> Anruf annehmen
//! - `Beendet`     -> Anruf beenden
//! - Zeitlimit in [`CallController::abwicklung_abwarten`] -> Anruf beenden
//!
//! Ueber das Ergebnis entscheidet das erste dieser drei Ereignisse. Das
//! Ergebnis wird ueber einen `watch`-Kanal genau einmal gesetzt, daher wird
//! ein Anruf hoechstens einmal angenommen. Beenden ist separat abgesichert
//! und passiert ebenfalls hoechstens einmal, auch wenn der Anruf zuvor
//! angenommen wurde.

use crate::bridge::{BridgeConfig, RealtimeBridge};
use crate::error::{BridgeError, BridgeResult};
use crate::signaling::{KonfigQuelle, MedienFluss, MedienSpec, Signalisierung};
use mimir_core::{CallId, SessionEreignis};
use mimir_observability::MimirMetrics;
use mimir_realtime::SessionParameter;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::Instrument;

/// Ausgang der Anruf-Abwicklung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbwicklungsErgebnis {
    /// Audio der Gegenseite kam an, der Anruf wurde angenommen
    Angenommen,
    /// Session endete vor dem ersten Audio
    Beendet,
    /// Weder Audio noch Sessionende innerhalb des Zeitlimits
    Zeitlimit,
}

struct Inner {
    call_id: CallId,
    bridge: RealtimeBridge,
    signalisierung: Arc<dyn Signalisierung>,
    medien_spec: MedienSpec,
    ergebnis: watch::Sender<Option<AbwicklungsErgebnis>>,
    beenden_laeuft: AtomicBool,
    /// Wird erst nach Abschluss von `beenden()` gesetzt
    beendet: watch::Sender<bool>,
    metriken: Option<MimirMetrics>,
}

impl Inner {
    /// Setzt das Ergebnis, falls noch keines feststeht
    fn abschliessen(&self, ergebnis: AbwicklungsErgebnis) -> bool {
        self.ergebnis.send_if_modified(|aktuell| {
            if aktuell.is_none() {
                *aktuell = Some(ergebnis);
                true
            } else {
                false
            }
        })
    }

    /// Beendet Anruf und Pipeline (hoechstens einmal)
    fn beenden(&self, grund: &str) {
        if self.beenden_laeuft.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::info!(call_id = %self.call_id, grund, "Anruf wird beendet");
        if let Err(e) = self.signalisierung.beenden() {
            tracing::warn!(call_id = %self.call_id, fehler = %e, "Auflegen fehlgeschlagen");
        }
        self.bridge.anhalten();
        if let Some(metriken) = &self.metriken {
            metriken.aktive_anrufe.dec();
        }
        self.beendet.send_replace(true);
    }

    fn audio_bereit(&self) {
        if !self.abschliessen(AbwicklungsErgebnis::Angenommen) {
            tracing::debug!(call_id = %self.call_id, "Audio nach Abschluss der Abwicklung, nicht angenommen");
            return;
        }
        match self.signalisierung.annehmen(&self.medien_spec) {
            Ok(()) => {
                tracing::info!(call_id = %self.call_id, rtpmap = %self.medien_spec.rtpmap(), "Anruf angenommen");
            }
            Err(e) => {
                tracing::error!(call_id = %self.call_id, fehler = %e, "Annehmen fehlgeschlagen");
                self.beenden("Annehmen fehlgeschlagen");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// CallController
// ---------------------------------------------------------------------------

/// Steuert einen einzelnen Anruf
#[derive(Clone)]
pub struct CallController {
    inner: Arc<Inner>,
}

impl CallController {
    /// Startet die Realtime-Session fuer einen eingehenden Anruf
    ///
    /// Muss innerhalb einer Tokio-Laufzeit aufgerufen werden.
    pub fn neu(
        call_id: CallId,
        config: BridgeConfig,
        parameter: SessionParameter,
        signalisierung: Arc<dyn Signalisierung>,
    ) -> Self {
        let medien_spec = MedienSpec::neu(
            config.pacer.payload_typ,
            config.ausgabe.frame_groesse,
            config.pacer.intervall,
        );
        let metriken = config.metriken.clone();
        if let Some(metriken) = &metriken {
            metriken.anrufe_gesamt.inc();
            metriken.aktive_anrufe.inc();
        }

        let (bridge, ereignisse) = RealtimeBridge::verbinden(call_id, config, parameter);
        let (ergebnis, _) = watch::channel(None);
        let (beendet, _) = watch::channel(false);

        let inner = Arc::new(Inner {
            call_id,
            bridge,
            signalisierung,
            medien_spec,
            ergebnis,
            beenden_laeuft: AtomicBool::new(false),
            beendet,
            metriken,
        });

        let span = tracing::info_span!("call", call_id = %call_id);
        tokio::spawn(ereignisse_verarbeiten(Arc::clone(&inner), ereignisse).instrument(span));
        tracing::info!(call_id = %call_id, "Anruf-Controller gestartet");

        Self { inner }
    }

    /// Wie [`CallController::neu`], mit Konfiguration aus der Ziel-Tabelle
    pub fn fuer_ziel(
        call_id: CallId,
        ziel: &str,
        quelle: &dyn KonfigQuelle,
        config: BridgeConfig,
        signalisierung: Arc<dyn Signalisierung>,
    ) -> BridgeResult<Self> {
        let extension = quelle
            .aufloesen(ziel)
            .ok_or_else(|| BridgeError::ZielUnbekannt(ziel.to_string()))?;
        tracing::debug!(call_id = %call_id, ziel, extension = %extension.name, "Ziel aufgeloest");

        let parameter = extension.session_parameter(config.pacer.payload_typ.audio_format());
        Ok(Self::neu(call_id, config, parameter, signalisierung))
    }

    /// Wartet, bis der Anruf angenommen oder beendet wurde
    ///
    /// Laeuft das Zeitlimit ab, wird der Anruf beendet. Das Zeitlimit ist
    /// ein regulaerer Ausgang, kein Fehler.
    pub async fn abwicklung_abwarten(&self, zeitlimit: Duration) -> AbwicklungsErgebnis {
        let mut rx = self.inner.ergebnis.subscribe();
        let warten = async { rx.wait_for(Option::is_some).await.map(|wert| *wert) };

        match tokio::time::timeout(zeitlimit, warten).await {
            Ok(Ok(Some(ergebnis))) => ergebnis,
            // Sender lebt so lange wie `inner`
            Ok(Ok(None)) | Ok(Err(_)) => AbwicklungsErgebnis::Beendet,
            Err(_) => {
                if self.inner.abschliessen(AbwicklungsErgebnis::Zeitlimit) {
                    tracing::warn!(
                        call_id = %self.inner.call_id,
                        zeitlimit_ms = zeitlimit.as_millis() as u64,
                        "Keine Antwort der Realtime-API, Anruf wird beendet"
                    );
                    if let Some(metriken) = &self.inner.metriken {
                        metriken.anrufe_zeitlimit.inc();
                    }
                    self.inner.beenden("Zeitlimit");
                    AbwicklungsErgebnis::Zeitlimit
                } else {
                    self.ergebnis().unwrap_or(AbwicklungsErgebnis::Beendet)
                }
            }
        }
    }

    /// Wartet, bis der Anruf beendet ist
    pub async fn ende_abwarten(&self) {
        let mut rx = self.inner.beendet.subscribe();
        let _ = rx.wait_for(|beendet| *beendet).await;
    }

    /// Startet den RTP-Teil, sobald die Signalisierung den Medienfluss kennt
    pub async fn medien_starten(&self, fluss: MedienFluss) -> BridgeResult<SocketAddr> {
        self.inner.bridge.starten(fluss).await
    }

    /// Beendet den Anruf von aussen (idempotent)
    pub fn anhalten(&self) {
        self.inner.abschliessen(AbwicklungsErgebnis::Beendet);
        self.inner.beenden("lokal angehalten");
    }

    /// Ergebnis der Abwicklung, falls schon entschieden
    pub fn ergebnis(&self) -> Option<AbwicklungsErgebnis> {
        *self.inner.ergebnis.borrow()
    }

    pub fn ist_beendet(&self) -> bool {
        *self.inner.beendet.borrow()
    }

    pub fn call_id(&self) -> CallId {
        self.inner.call_id
    }

    pub fn medien_spec(&self) -> &MedienSpec {
        &self.inner.medien_spec
    }

    pub fn bridge(&self) -> &RealtimeBridge {
        &self.inner.bridge
    }
}

async fn ereignisse_verarbeiten(
    inner: Arc<Inner>,
    mut ereignisse: mpsc::UnboundedReceiver<SessionEreignis>,
) {
    while let Some(ereignis) = ereignisse.recv().await {
        match ereignis {
            SessionEreignis::AudioBereit => inner.audio_bereit(),
            SessionEreignis::Beendet { grund } => {
                inner.abschliessen(AbwicklungsErgebnis::Beendet);
                inner.beenden(&grund);
            }
        }
    }
    tracing::debug!(call_id = %inner.call_id, "Ereignis-Kanal geschlossen");
}
