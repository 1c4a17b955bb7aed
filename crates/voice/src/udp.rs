//! Lokaler RTP-Socket eines Anrufs
//!
//! Ein UDP-Socket pro Anruf, gebunden auf den lokalen Medienport.
//!
//! ## Architektur
//!
//! ```text
//! UDP Socket (recv_from)  --Empfangs-Task-->  JitterBuffer::anhaengen()
//!
//! AusgangsPacer --PaketSenke--> UdpSenke::senden() --try_send_to--> Gegenstelle
//! ```
//!
//! Gesendet wird mit `try_send_to`, damit auch der Takt-Thread ohne
//! Tokio-Kontext senden kann. Ein voller Socket-Puffer verwirft das Paket.

use crate::error::{VoiceError, VoiceResult};
use crate::jitter_buffer::JitterBuffer;
use crate::pacing::PaketSenke;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::UdpSocket;

/// Empfangspuffer: 12 Byte Header + grosszuegige Nutzdaten
const UDP_BUFFER_SIZE: usize = 1500;

// ---------------------------------------------------------------------------
// UdpSenke
// ---------------------------------------------------------------------------

/// Sendet fertige RTP-Pakete an die feste Gegenstelle
#[derive(Debug, Clone)]
pub struct UdpSenke {
    socket: Arc<UdpSocket>,
    ziel: SocketAddr,
}

impl PaketSenke for UdpSenke {
    fn senden(&self, paket: &[u8]) -> VoiceResult<()> {
        match self.socket.try_send_to(paket, self.ziel) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(VoiceError::SocketVoll),
            Err(e) => Err(VoiceError::Senden(format!("{} ({e})", self.ziel))),
        }
    }
}

// ---------------------------------------------------------------------------
// RtpKanal
// ---------------------------------------------------------------------------

/// UDP-Medienkanal eines Anrufs
pub struct RtpKanal {
    socket: Arc<UdpSocket>,
    ziel: SocketAddr,
    empfangen: Arc<AtomicU64>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl RtpKanal {
    /// Bindet den lokalen Socket; `ziel` ist die RTP-Adresse der Gegenstelle
    pub async fn binden(lokal: SocketAddr, ziel: SocketAddr) -> VoiceResult<Self> {
        let socket = UdpSocket::bind(lokal).await?;
        tracing::info!(lokal = %socket.local_addr()?, ziel = %ziel, "RTP-Socket gebunden");

        Ok(Self {
            socket: Arc::new(socket),
            ziel,
            empfangen: Arc::new(AtomicU64::new(0)),
            task: Mutex::new(None),
        })
    }

    pub fn lokale_adresse(&self) -> VoiceResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn ziel(&self) -> SocketAddr {
        self.ziel
    }

    /// Senke fuer den Ausgangs-Pacer
    pub fn senke(&self) -> UdpSenke {
        UdpSenke {
            socket: Arc::clone(&self.socket),
            ziel: self.ziel,
        }
    }

    /// Startet den Empfangs-Task, der alle Pakete in `puffer` ablegt
    ///
    /// Ein erneuter Aufruf ersetzt den laufenden Task.
    pub fn empfang_starten(&self, puffer: Arc<JitterBuffer>) {
        let socket = Arc::clone(&self.socket);
        let empfangen = Arc::clone(&self.empfangen);

        let task = tokio::spawn(async move {
            let mut buf = [0u8; UDP_BUFFER_SIZE];
            tracing::debug!("RTP-Empfang gestartet");
            loop {
                match socket.recv_from(&mut buf).await {
                    Ok((len, absender)) => {
                        empfangen.fetch_add(1, Ordering::Relaxed);
                        if !puffer.anhaengen(&buf[..len]) {
                            tracing::trace!(absender = %absender, bytes = len, "RTP-Paket verworfen");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(fehler = %e, "UDP-Empfangsfehler");
                        // Busy-Loop bei dauerhaftem Fehler vermeiden
                        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
                    }
                }
            }
        });

        if let Some(alt) = self.task.lock().replace(task) {
            alt.abort();
        }
    }

    /// Beendet den Empfang (idempotent)
    ///
    /// Der Socket wird freigegeben, sobald auch alle Senken gedroppt sind.
    pub fn schliessen(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            tracing::debug!(
                empfangen = self.empfangene_pakete(),
                "RTP-Empfang beendet"
            );
        }
    }

    /// Empfangene Datagramme gesamt (auch verworfene)
    pub fn empfangene_pakete(&self) -> u64 {
        self.empfangen.load(Ordering::Relaxed)
    }
}

impl Drop for RtpKanal {
    fn drop(&mut self) {
        self.schliessen();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
