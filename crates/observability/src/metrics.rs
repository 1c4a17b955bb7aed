//! Prometheus-kompatible Metriken fuer Mimir
//!
//! Registrierte Metriken:
//! - `mimir_active_calls` – Gauge: Laufende Anrufe
//! - `mimir_calls_total` – Counter: Angenommene Anrufversuche
//! - `mimir_calls_timed_out_total` – Counter: Anrufe, die ins Zeitlimit liefen
//! - `mimir_rtp_packets_sent_total` – Counter: Gesendete RTP-Pakete
//! - `mimir_rtp_packets_received_total` – Counter: Empfangene RTP-Datagramme
//! - `mimir_rtp_packets_dropped_total` – Counter: Verworfene Pakete/Frames (label `grund`)
//! - `mimir_adaptive_mode_switches_total` – Counter: Wechsel in den adaptiven Sendemodus
//! - `mimir_send_jitter_seconds` – Histogram: Mittlerer Sende-Jitter pro Anruf

use anyhow::Result;
use axum::{response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Alle Mimir-Prometheus-Metriken
#[derive(Clone)]
pub struct MimirMetrics {
    pub registry: Arc<Registry>,

    // Anruf-Metriken
    pub aktive_anrufe: IntGauge,
    pub anrufe_gesamt: IntCounter,
    pub anrufe_zeitlimit: IntCounter,

    // RTP-Metriken
    pub rtp_pakete_gesendet: IntCounter,
    pub rtp_pakete_empfangen: IntCounter,
    pub rtp_pakete_verworfen: IntCounterVec,
    pub adaptive_wechsel: IntCounter,
    pub sende_jitter_sekunden: Histogram,
}

impl MimirMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        // --- Anruf-Metriken ---
        let aktive_anrufe = IntGauge::with_opts(Opts::new(
            "mimir_active_calls",
            "Anzahl laufender Anrufe",
        ))?;
        registry.register(Box::new(aktive_anrufe.clone()))?;

        let anrufe_gesamt = IntCounter::with_opts(Opts::new(
            "mimir_calls_total",
            "Gesamtanzahl bearbeiteter Anrufe",
        ))?;
        registry.register(Box::new(anrufe_gesamt.clone()))?;

        let anrufe_zeitlimit = IntCounter::with_opts(Opts::new(
            "mimir_calls_timed_out_total",
            "Anrufe, die ohne Antwort der Realtime-API ins Zeitlimit liefen",
        ))?;
        registry.register(Box::new(anrufe_zeitlimit.clone()))?;

        // --- RTP-Metriken ---
        let rtp_pakete_gesendet = IntCounter::with_opts(Opts::new(
            "mimir_rtp_packets_sent_total",
            "Gesamtanzahl gesendeter RTP-Pakete",
        ))?;
        registry.register(Box::new(rtp_pakete_gesendet.clone()))?;

        let rtp_pakete_empfangen = IntCounter::with_opts(Opts::new(
            "mimir_rtp_packets_received_total",
            "Gesamtanzahl empfangener RTP-Datagramme",
        ))?;
        registry.register(Box::new(rtp_pakete_empfangen.clone()))?;

        let rtp_pakete_verworfen = IntCounterVec::new(
            Opts::new(
                "mimir_rtp_packets_dropped_total",
                "Verworfene Pakete bzw. Frames",
            ),
            &["grund"],
        )?;
        registry.register(Box::new(rtp_pakete_verworfen.clone()))?;

        let adaptive_wechsel = IntCounter::with_opts(Opts::new(
            "mimir_adaptive_mode_switches_total",
            "Wechsel in den adaptiven Sendemodus",
        ))?;
        registry.register(Box::new(adaptive_wechsel.clone()))?;

        let sende_jitter_sekunden = Histogram::with_opts(
            HistogramOpts::new(
                "mimir_send_jitter_seconds",
                "Sende-Jitter pro RTP-Paket in Sekunden",
            )
            .buckets(vec![0.001, 0.002, 0.005, 0.01, 0.015, 0.025, 0.05, 0.1]),
        )?;
        registry.register(Box::new(sende_jitter_sekunden.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            aktive_anrufe,
            anrufe_gesamt,
            anrufe_zeitlimit,
            rtp_pakete_gesendet,
            rtp_pakete_empfangen,
            rtp_pakete_verworfen,
            adaptive_wechsel,
            sende_jitter_sekunden,
        })
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: MimirMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(
    axum::extract::State(metriken): axum::extract::State<MimirMetrics>,
) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
