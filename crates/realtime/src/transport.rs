//! WebSocket-Transport zur Realtime-API
//!
//! Ein Task pro Session: verbindet, meldet `verbunden()`, leitet
//! eingehende Textnachrichten an die Session und schreibt ausgehende
//! Nachrichten aus dem [`AusgangsKanal`](crate::session::AusgangsKanal).
//! Jedes Ende (Close, Fehler, Verbindungsfehler, lokales Schliessen)
//! endet in `transport_beendet()`.

use crate::error::{RealtimeError, RealtimeResult};
use crate::session::RealtimeSession;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::Instrument;

/// Standard-Endpunkt ohne Modell-Parameter
pub const STANDARD_URL: &str = "wss://api.openai.com/v1/realtime";

/// Standard-Modell
pub const STANDARD_MODELL: &str = "gpt-4o-realtime-preview-2024-12-17";

/// Wert des Beta-Headers
pub const STANDARD_BETA: &str = "realtime=v1";

// ---------------------------------------------------------------------------
// VerbindungsParameter
// ---------------------------------------------------------------------------

/// Ziel und Header der WebSocket-Verbindung
#[derive(Clone, PartialEq)]
pub struct VerbindungsParameter {
    /// Vollstaendige URL inklusive Query
    pub url: String,
    /// API-Schluessel fuer `Authorization: Bearer`
    pub api_schluessel: Option<String>,
    /// Wert fuer `OpenAI-Beta`
    pub beta: Option<String>,
}

impl VerbindungsParameter {
    /// Baut die URL aus Basis und Modell
    pub fn neu(basis_url: &str, modell: &str, api_schluessel: Option<String>) -> Self {
        let url = if modell.is_empty() {
            basis_url.to_string()
        } else {
            format!("{basis_url}?model={modell}")
        };
        Self {
            url,
            api_schluessel,
            beta: Some(STANDARD_BETA.to_string()),
        }
    }

    /// Verbindung ohne Authentifizierung (lokale Gegenstellen, Tests)
    pub fn ohne_auth(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_schluessel: None,
            beta: None,
        }
    }

    /// Erstellt den HTTP-Upgrade-Request
    pub fn anfrage(&self) -> RealtimeResult<Request> {
        let mut anfrage = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| RealtimeError::Konfiguration(format!("URL '{}': {e}", self.url)))?;

        let header = anfrage.headers_mut();
        if let Some(schluessel) = &self.api_schluessel {
            let wert = HeaderValue::from_str(&format!("Bearer {schluessel}"))
                .map_err(|e| RealtimeError::Konfiguration(format!("API-Schluessel: {e}")))?;
            header.insert("Authorization", wert);
        }
        if let Some(beta) = &self.beta {
            let wert = HeaderValue::from_str(beta)
                .map_err(|e| RealtimeError::Konfiguration(format!("Beta-Header: {e}")))?;
            header.insert("OpenAI-Beta", wert);
        }
        Ok(anfrage)
    }
}

impl std::fmt::Debug for VerbindungsParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerbindungsParameter")
            .field("url", &self.url)
            .field("api_schluessel", &self.api_schluessel.as_ref().map(|_| "***"))
            .field("beta", &self.beta)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// RealtimeTransport
// ---------------------------------------------------------------------------

/// Handle auf den laufenden Transport-Task
pub struct RealtimeTransport {
    schliessen_tx: Mutex<Option<oneshot::Sender<()>>>,
    task: tokio::task::JoinHandle<()>,
}

impl RealtimeTransport {
    /// Startet Verbindung und Nachrichtenschleife im Hintergrund
    pub fn starten(
        parameter: VerbindungsParameter,
        session: RealtimeSession,
        ausgang_rx: mpsc::Receiver<String>,
    ) -> Self {
        let (schliessen_tx, schliessen_rx) = oneshot::channel();
        let span = tracing::info_span!("call", call_id = %session.call_id());
        let task = tokio::spawn(
            betreiben(parameter, session, ausgang_rx, schliessen_rx).instrument(span),
        );
        Self {
            schliessen_tx: Mutex::new(Some(schliessen_tx)),
            task,
        }
    }

    /// Schliesst die Verbindung (idempotent)
    pub fn schliessen(&self) {
        if let Some(tx) = self.schliessen_tx.lock().take() {
            let _ = tx.send(());
        }
    }

    /// Ob der Transport-Task beendet ist
    pub fn ist_beendet(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for RealtimeTransport {
    fn drop(&mut self) {
        self.schliessen();
    }
}

async fn betreiben(
    parameter: VerbindungsParameter,
    mut session: RealtimeSession,
    mut ausgang_rx: mpsc::Receiver<String>,
    mut schliessen_rx: oneshot::Receiver<()>,
) {
    let call_id = session.call_id();

    let anfrage = match parameter.anfrage() {
        Ok(anfrage) => anfrage,
        Err(e) => {
            tracing::error!(call_id = %call_id, fehler = %e, "Realtime-Verbindung nicht moeglich");
            session.transport_beendet(&e.to_string());
            return;
        }
    };

    let verbindung = tokio::select! {
        ergebnis = tokio_tungstenite::connect_async(anfrage) => ergebnis,
        _ = &mut schliessen_rx => {
            session.transport_beendet("vor Verbindungsaufbau geschlossen");
            return;
        }
    };

    let (ws_stream, _) = match verbindung {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(call_id = %call_id, url = %parameter.url, fehler = %e, "WebSocket-Verbindung fehlgeschlagen");
            session.transport_beendet(&format!("Verbindung fehlgeschlagen: {e}"));
            return;
        }
    };
    tracing::info!(call_id = %call_id, url = %parameter.url, "WebSocket mit Realtime-API verbunden");

    let (mut schreiber, mut leser) = ws_stream.split();
    session.verbunden();

    let grund = loop {
        tokio::select! {
            eingehend = leser.next() => match eingehend {
                Some(Ok(Message::Text(text))) => session.text_verarbeiten(&text),
                Some(Ok(Message::Close(frame))) => {
                    break match frame {
                        Some(frame) => format!("von Gegenstelle geschlossen ({}: {})", frame.code, frame.reason),
                        None => "von Gegenstelle geschlossen".to_string(),
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::error!(call_id = %call_id, fehler = %e, "WebSocket-Fehler");
                    break format!("WebSocket-Fehler: {e}");
                }
                None => break "Verbindung abgebrochen".to_string(),
            },

            ausgehend = ausgang_rx.recv() => match ausgehend {
                Some(text) => {
                    if let Err(e) = schreiber.send(Message::Text(text)).await {
                        tracing::error!(call_id = %call_id, fehler = %e, "WebSocket-Sendefehler");
                        break format!("Sendefehler: {e}");
                    }
                }
                None => break "Ausgangs-Kanal geschlossen".to_string(),
            },

            _ = &mut schliessen_rx => {
                if let Err(e) = schreiber.send(Message::Close(None)).await {
                    tracing::debug!(call_id = %call_id, fehler = %e, "Close-Frame nicht gesendet");
                }
                break "lokal geschlossen".to_string();
            }
        }
    };

    session.transport_beendet(&grund);
}
