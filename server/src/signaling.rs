//! Statische Signalisierung
//!
//! Ersetzt eine echte Signalisierungsschicht durch einen fest konfigurierten
//! Medienfluss. `annehmen` protokolliert die Medienbeschreibung und gibt
//! den Fluss an den Runner weiter, `beenden` protokolliert nur.

use mimir_bridge::{BridgeError, BridgeResult, MedienFluss, MedienSpec, Signalisierung};
use mimir_core::CallId;
use parking_lot::Mutex;
use tokio::sync::oneshot;

pub struct StatischeSignalisierung {
    call_id: CallId,
    fluss: MedienFluss,
    angenommen_tx: Mutex<Option<oneshot::Sender<MedienFluss>>>,
}

impl StatischeSignalisierung {
    /// Gibt zusaetzlich den Empfaenger zurueck, der nach `annehmen` den Fluss liefert
    pub fn neu(call_id: CallId, fluss: MedienFluss) -> (Self, oneshot::Receiver<MedienFluss>) {
        let (tx, rx) = oneshot::channel();
        let signalisierung = Self {
            call_id,
            fluss,
            angenommen_tx: Mutex::new(Some(tx)),
        };
        (signalisierung, rx)
    }
}

impl Signalisierung for StatischeSignalisierung {
    fn annehmen(&self, spec: &MedienSpec) -> BridgeResult<()> {
        let tx = self
            .angenommen_tx
            .lock()
            .take()
            .ok_or_else(|| BridgeError::signalisierung("Anruf bereits angenommen"))?;

        tracing::info!(
            call_id = %self.call_id,
            rtpmap = %spec.rtpmap(),
            ptime = spec.ptime_ms,
            lokal = %self.fluss.lokal,
            gegenstelle = %self.fluss.gegenstelle,
            "200 OK"
        );
        tx.send(self.fluss)
            .map_err(|_| BridgeError::signalisierung("Runner wartet nicht mehr auf den Medienfluss"))
    }

    fn beenden(&self) -> BridgeResult<()> {
        tracing::info!(call_id = %self.call_id, "BYE");
        Ok(())
    }
}
