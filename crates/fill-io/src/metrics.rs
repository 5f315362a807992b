//! Prometheus metrics for the batch-fill rig.
//!
//! Stage progress, scale health and abort counts. Values are pushed by the
//! runtime's stage observer; nothing here feeds back into control.

use fill_core::tags;
use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::LazyLock;
use std::thread;
use tiny_http::{Header, Response, Server};

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

fn register<M>(metric: M) -> M
where
    M: prometheus::core::Collector + Clone + 'static,
{
    if let Err(e) = REGISTRY.register(Box::new(metric.clone())) {
        tracing::warn!("Failed to register metric: {}", e);
    }
    metric
}

fn gauge(name: &str, help: &str) -> Gauge {
    register(Gauge::new(name, help).expect("static gauge definition"))
}

fn counter_vec(name: &str, help: &str, label: &str) -> IntCounterVec {
    register(IntCounterVec::new(Opts::new(name, help), &[label]).expect("static counter definition"))
}

// ============================================================================
// Scale
// ============================================================================

/// Scale samples by outcome (accepted, out_of_range, timeout)
pub static SAMPLES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    counter_vec(
        tags::SAMPLES.metric,
        "Scale samples by outcome",
        "outcome",
    )
});

/// Last accepted scale weight
pub static SCALE_WEIGHT_KG: LazyLock<Gauge> = LazyLock::new(|| {
    gauge(tags::SCALE_WEIGHT_KG.metric, "Last accepted scale weight in kg")
});

// ============================================================================
// Stages
// ============================================================================

/// Mass added in the running stage
pub static STAGE_DELTA_KG: LazyLock<Gauge> = LazyLock::new(|| {
    gauge(tags::STAGE_DELTA_KG.metric, "Mass added in the current stage in kg")
});

pub static STAGE_TARGET_KG: LazyLock<Gauge> = LazyLock::new(|| {
    gauge(tags::STAGE_TARGET_KG.metric, "Target of the current stage in kg")
});

/// Stage phase (0=none,1=wait_flow,2=active,3=completed,4=aborted)
pub static STAGE_PHASE: LazyLock<Gauge> = LazyLock::new(|| {
    gauge(
        tags::STAGE_PHASE.metric,
        "Stage phase (0=none,1=wait_flow,2=active,3=completed,4=aborted)",
    )
});

/// 1 while a pump/valve pair is energized
pub static ACTUATORS_ENERGIZED: LazyLock<Gauge> = LazyLock::new(|| {
    gauge(
        "batchfill_actuators_energized",
        "Pump/valve pair energized (1=on, 0=off)",
    )
});

pub static STAGES_COMPLETED: LazyLock<IntCounter> = LazyLock::new(|| {
    register(
        IntCounter::new(tags::STAGES_COMPLETED.metric, "Stages filled to target")
            .expect("static counter definition"),
    )
});

/// Flow switch warnings by kind
pub static FLOW_WARNINGS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    counter_vec(
        tags::FLOW_WARNINGS.metric,
        "Non-fatal flow switch warnings",
        "warning",
    )
});

// ============================================================================
// Batches
// ============================================================================

pub static BATCHES_STARTED: LazyLock<IntCounter> = LazyLock::new(|| {
    register(
        IntCounter::new("batchfill_batches_started_total", "Batches started")
            .expect("static counter definition"),
    )
});

/// Batch aborts by kind (tare, interlock, scale_timeout, cancelled)
pub static BATCH_ABORTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    counter_vec(tags::BATCH_ABORTS.metric, "Aborted batches by kind", "kind")
});

pub static BATCH_TOTAL_KG: LazyLock<Gauge> = LazyLock::new(|| {
    gauge(tags::BATCH_TOTAL_KG.metric, "Total mass of the last completed batch in kg")
});

// ============================================================================
// Metrics HTTP Server
// ============================================================================

/// Encode the registry in the Prometheus text format.
pub fn render() -> Result<Vec<u8>, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(buffer)
}

/// Start the metrics HTTP server on the given address.
/// Returns a join handle for the server thread.
pub fn serve_metrics(bind_addr: String) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let server = match Server::http(&bind_addr) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to start metrics server on {}: {}", bind_addr, e);
                return;
            }
        };

        tracing::info!("Metrics server listening on http://{}/metrics", bind_addr);

        for request in server.incoming_requests() {
            let response = match request.url() {
                "/metrics" => match render() {
                    Ok(buffer) => {
                        let response = Response::from_data(buffer);
                        match Header::from_bytes(
                            &b"Content-Type"[..],
                            &b"text/plain; version=0.0.4"[..],
                        ) {
                            Ok(header) => response.with_header(header),
                            Err(()) => response,
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to encode metrics: {}", e);
                        Response::from_string("Internal Server Error")
                            .with_status_code(500)
                    }
                },
                "/health" => Response::from_string("OK"),
                // Ready once a batch has been started against the hardware.
                "/ready" if BATCHES_STARTED.get() > 0 => Response::from_string("Ready"),
                "/ready" => Response::from_string("Not Ready")
                    .with_status_code(503),
                _ => Response::from_string("Not Found")
                    .with_status_code(404),
            };
            let _ = request.respond(response);
        }
    })
}

/// Initialize all metrics (forces lazy initialization)
pub fn init_metrics() {
    let _ = SAMPLES.with_label_values(&["accepted"]).get();
    let _ = SCALE_WEIGHT_KG.get();
    let _ = STAGE_DELTA_KG.get();
    let _ = STAGE_TARGET_KG.get();
    let _ = STAGE_PHASE.get();
    let _ = ACTUATORS_ENERGIZED.get();
    let _ = STAGES_COMPLETED.get();
    let _ = FLOW_WARNINGS.with_label_values(&["flow_dropped"]).get();
    let _ = BATCHES_STARTED.get();
    let _ = BATCH_ABORTS.with_label_values(&["interlock"]).get();
    let _ = BATCH_TOTAL_KG.get();
}
