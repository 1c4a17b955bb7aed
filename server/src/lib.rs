//! mimir-server – Bibliotheks-Root
//!
//! Deklariert alle Server-Module und stellt den oeffentlichen Einstiegspunkt
//! fuer Integrationstests bereit.

pub mod config;
pub mod extensions;
pub mod signaling;

use anyhow::Result;
use config::ServerConfig;
use extensions::ExtensionRegistry;
use mimir_bridge::{AbwicklungsErgebnis, BridgeError, CallController, MedienFluss};
use mimir_core::CallId;
use mimir_observability::{HealthState, MimirMetrics};
use signaling::StatischeSignalisierung;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Server-Subsysteme und fuehrt einen Anruf aus
    ///
    /// Reihenfolge:
    /// 1. Metriken und Observability-Server
    /// 2. Ziel-Tabelle laden
    /// 3. Anruf fuer den konfigurierten Medienfluss abwickeln
    /// 4. Bei Ctrl-C auflegen und beenden
    pub async fn starten(self) -> Result<()> {
        tracing::info!(
            server_name = %self.config.server.name,
            codec = self.config.audio.codec.name(),
            realtime = %self.config.realtime.url,
            "Server startet"
        );

        let metriken = MimirMetrics::neu()?;
        let health = HealthState::neu(metriken.clone());

        if self.config.observability.aktiviert {
            let addr: SocketAddr = self.config.observability_bind_adresse().parse()?;
            let metriken = metriken.clone();
            let health = health.clone();
            tokio::spawn(async move {
                if let Err(e) =
                    mimir_observability::observability_server_starten(addr, metriken, health).await
                {
                    tracing::error!(fehler = %e, "Observability-Server beendet");
                }
            });
        }

        let registry = ExtensionRegistry::laden(&self.config.extensions.datei)?;
        tracing::info!(ziele = registry.len(), "Ziel-Tabelle bereit");
        health.bereit_setzen(true);

        let ergebnis = self.anruf_ausfuehren(&registry, metriken).await;
        health.bereit_setzen(false);
        if let Err(e) = &ergebnis {
            tracing::error!(fehler = %e, wiederholbar = e.ist_wiederholbar(), "Anruf fehlgeschlagen");
        }
        ergebnis.map_err(anyhow::Error::from)
    }

    /// Wickelt einen Anruf ueber den statischen Medienfluss ab
    async fn anruf_ausfuehren(
        &self,
        registry: &ExtensionRegistry,
        metriken: MimirMetrics,
    ) -> mimir_core::Result<()> {
        let call_id = CallId::new();
        let fluss = self.config.medien_fluss()?;
        let (signalisierung, fluss_rx) = StatischeSignalisierung::neu(call_id, fluss);

        let anruf = CallController::fuer_ziel(
            call_id,
            &self.config.medien.ziel,
            registry,
            self.config.bridge_config(Some(metriken)),
            Arc::new(signalisierung),
        )?;

        let ergebnis = tokio::select! {
            ergebnis = anruf.abwicklung_abwarten(self.config.anruf_zeitlimit()) => ergebnis,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(call_id = %call_id, "Shutdown-Signal empfangen, lege auf");
                anruf.anhalten();
                return Ok(());
            }
        };

        match ergebnis {
            AbwicklungsErgebnis::Angenommen => {}
            AbwicklungsErgebnis::Beendet | AbwicklungsErgebnis::Zeitlimit => {
                tracing::info!(call_id = %call_id, ergebnis = ?ergebnis, "Anruf ohne Gespraech beendet");
                return Ok(());
            }
        }

        gespraech_fuehren(&anruf, fluss_rx).await
    }
}

/// Startet die Medien nach der Annahme und wartet auf das Gespraechsende
///
/// Legt die Gegenseite auf, bevor die Medien laufen, ist das ein regulaeres
/// Ende.
async fn gespraech_fuehren(
    anruf: &CallController,
    fluss_rx: oneshot::Receiver<MedienFluss>,
) -> mimir_core::Result<()> {
    let call_id = anruf.call_id();

    // Der Fluss kommt aus annehmen(); ohne ihn wurde der Anruf bereits beendet
    let Ok(fluss) = fluss_rx.await else {
        tracing::warn!(call_id = %call_id, "Kein Medienfluss nach Annahme");
        return Ok(());
    };
    let lokal = match anruf.medien_starten(fluss).await {
        Ok(lokal) => lokal,
        Err(BridgeError::Angehalten) => {
            tracing::info!(call_id = %call_id, "Gespraech vor Medienstart beendet");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    tracing::info!(call_id = %call_id, lokal = %lokal, "Gespraech laeuft. Warte auf Ende oder Ctrl-C...");

    tokio::select! {
        _ = anruf.ende_abwarten() => {
            tracing::info!(call_id = %call_id, "Gespraech beendet");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(call_id = %call_id, "Shutdown-Signal empfangen, lege auf");
            anruf.anhalten();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mimir_bridge::{BridgeConfig, BridgeResult, MedienSpec, Signalisierung};
    use mimir_protocol::realtime::AudioFormat;
    use mimir_realtime::{SessionParameter, VerbindungsParameter};

    struct Stumm;

    impl Signalisierung for Stumm {
        fn annehmen(&self, _spec: &MedienSpec) -> BridgeResult<()> {
            Ok(())
        }

        fn beenden(&self) -> BridgeResult<()> {
            Ok(())
        }
    }

    fn parameter() -> SessionParameter {
        SessionParameter {
            anweisungen: "test".into(),
            stimme: "alloy".into(),
            begruessung: "hallo".into(),
            format: AudioFormat::G711Ulaw,
        }
    }

    #[tokio::test]
    async fn aufgelegt_vor_medienstart_ist_kein_fehler() {
        // Nicht erreichbare Gegenstelle: die Session endet sofort
        let config = BridgeConfig::neu(VerbindungsParameter::ohne_auth("ws://127.0.0.1:9/"));
        let anruf = CallController::neu(CallId::new(), config, parameter(), Arc::new(Stumm));
        anruf.ende_abwarten().await;

        let lokal: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let (tx, rx) = oneshot::channel();
        tx.send(MedienFluss {
            lokal,
            gegenstelle: lokal,
        })
        .unwrap();

        assert!(gespraech_fuehren(&anruf, rx).await.is_ok());
        assert!(!anruf.bridge().ist_gestartet());
    }

    #[tokio::test]
    async fn fehlender_fluss_ist_kein_fehler() {
        let config = BridgeConfig::neu(VerbindungsParameter::ohne_auth("ws://127.0.0.1:9/"));
        let anruf = CallController::neu(CallId::new(), config, parameter(), Arc::new(Stumm));
        let (tx, rx) = oneshot::channel::<MedienFluss>();
        drop(tx);

        assert!(gespraech_fuehren(&anruf, rx).await.is_ok());
        anruf.anhalten();
    }
}
