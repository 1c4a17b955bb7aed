//! Jitter Buffer fuer eingehende RTP-Pakete
//!
//! Sammelt Pakete der Telefonie-Seite und ordnet sie nach RTP-Zeitstempel.
//! Die Bridge leert den Buffer periodisch (250 ms) und schickt den
//! zusammenhaengenden Bytestrom an die Realtime-Session.
//!
//! Kein Playout-Buffer: es gibt keine Zielverzoegerung, keine
//! Verlusterkennung und kein Nachfuellen von Luecken. Wer zum
//! Leerungszeitpunkt da ist, wird sortiert ausgegeben.
//!
//! ## Eigenschaften
//! - O(log n) Einfuegen und Entnehmen (BinaryHeap als Min-Heap)
//! - Gleiche Zeitstempel behalten die Ankunftsreihenfolge
//! - Intern gelockt (parking_lot), Empfangs-Task und Flush-Takt teilen sich
//!   eine Instanz ueber `Arc`

use mimir_protocol::voice::paket_parsen;
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

// ---------------------------------------------------------------------------
// Statistiken
// ---------------------------------------------------------------------------

/// Zaehler des Jitter Buffers (Snapshot)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JitterBufferStatistik {
    /// Angenommene Pakete gesamt
    pub empfangen: u64,
    /// Verworfene Pakete (zu kurz)
    pub verworfen: u64,
    /// Anzahl Leerungen mit Inhalt
    pub leerungen: u64,
}

// ---------------------------------------------------------------------------
// JitterBuffer
// ---------------------------------------------------------------------------

/// Eintrag im Heap, sortiert nach (Zeitstempel, Ankunft)
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Eintrag {
    timestamp: u32,
    ankunft: u64,
    payload: Vec<u8>,
}

#[derive(Debug, Default)]
struct Inneres {
    heap: BinaryHeap<Reverse<Eintrag>>,
    gepufferte_bytes: usize,
    naechste_ankunft: u64,
    statistik: JitterBufferStatistik,
}

/// Nach Zeitstempel sortierender Reassembly-Buffer
#[derive(Debug, Default)]
pub struct JitterBuffer {
    inner: Mutex<Inneres>,
}

impl JitterBuffer {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Parst ein rohes Paket und legt es ab
    ///
    /// Pakete mit hoechstens 12 Bytes werden still verworfen.
    /// Gibt zurueck, ob das Paket angenommen wurde.
    pub fn anhaengen(&self, rohpaket: &[u8]) -> bool {
        let mut inner = self.inner.lock();
        let Some((timestamp, payload)) = paket_parsen(rohpaket) else {
            inner.statistik.verworfen += 1;
            tracing::trace!(bytes = rohpaket.len(), "Zu kurzes RTP-Paket verworfen");
            return false;
        };

        let ankunft = inner.naechste_ankunft;
        inner.naechste_ankunft += 1;
        inner.gepufferte_bytes += payload.len();
        inner.statistik.empfangen += 1;
        inner.heap.push(Reverse(Eintrag {
            timestamp,
            ankunft,
            payload: payload.to_vec(),
        }));
        true
    }

    /// Entnimmt alle Eintraege in aufsteigender Zeitstempel-Reihenfolge
    ///
    /// Die Nutzdaten werden aneinandergehaengt, der Byte-Zaehler wird
    /// zurueckgesetzt. Ein leerer Buffer liefert einen leeren Vektor.
    pub fn leeren(&self) -> Vec<u8> {
        let mut inner = self.inner.lock();
        let mut ausgabe = Vec::with_capacity(inner.gepufferte_bytes);
        while let Some(Reverse(eintrag)) = inner.heap.pop() {
            ausgabe.extend_from_slice(&eintrag.payload);
        }
        inner.gepufferte_bytes = 0;
        if !ausgabe.is_empty() {
            inner.statistik.leerungen += 1;
        }
        ausgabe
    }

    /// Summe der Nutzdaten-Bytes aller gepufferten Eintraege
    pub fn gepufferte_bytes(&self) -> usize {
        self.inner.lock().gepufferte_bytes
    }

    /// Anzahl gepufferter Pakete
    pub fn fuellstand(&self) -> usize {
        self.inner.lock().heap.len()
    }

    pub fn ist_leer(&self) -> bool {
        self.inner.lock().heap.is_empty()
    }

    pub fn statistik(&self) -> JitterBufferStatistik {
        self.inner.lock().statistik.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
