use crate::infra::audit::{AuditEventType, AuditLogger};
use fill_core::{
    tags, AbortKind, BatchResult, BatchStatus, SampleOutcome, StageObserver, StagePhase,
    StageResult, StageSpec, StageStatus, StageWarning,
};
use fill_io::metrics::{
    init_metrics, serve_metrics, ACTUATORS_ENERGIZED, BATCH_ABORTS, BATCH_TOTAL_KG,
    FLOW_WARNINGS, SAMPLES, SCALE_WEIGHT_KG, STAGES_COMPLETED, STAGE_DELTA_KG, STAGE_PHASE,
    STAGE_TARGET_KG,
};
use std::thread;
use tracing::info;

pub fn init() {
    init_metrics();
}

pub fn start_metrics_server(addr: &Option<String>) -> Option<thread::JoinHandle<()>> {
    addr.as_ref().map(|addr| {
        info!(addr = %addr, "Starting metrics server");
        serve_metrics(addr.clone())
    })
}

pub fn abort_label(kind: AbortKind) -> &'static str {
    match kind {
        AbortKind::Tare => "tare",
        AbortKind::Interlock => "interlock",
        AbortKind::ScaleTimeout => "scale_timeout",
        AbortKind::Cancelled => "cancelled",
    }
}

fn sample_label(outcome: SampleOutcome) -> &'static str {
    match outcome {
        SampleOutcome::Accepted => "accepted",
        SampleOutcome::OutOfRange => "out_of_range",
        SampleOutcome::Timeout => "timeout",
    }
}

/// Mirrors stage progress into Prometheus and the audit trail.
pub struct TelemetryObserver<'a> {
    audit: Option<&'a AuditLogger>,
}

impl<'a> TelemetryObserver<'a> {
    pub fn new(audit: Option<&'a AuditLogger>) -> Self {
        Self { audit }
    }

    fn audit(&self, event: AuditEventType, details: serde_json::Value) {
        if let Some(logger) = self.audit {
            logger.log_event(event, details);
        }
    }

    /// Publish the batch outcome once the orchestrator returns.
    pub fn batch_finished(&self, result: &BatchResult) {
        match result.status {
            BatchStatus::Completed => {
                BATCH_TOTAL_KG.set(result.total_kg);
                self.audit(
                    AuditEventType::BatchCompleted,
                    serde_json::json!({
                        (tags::BATCH_TOTAL_KG.key): result.total_kg,
                        "stages": result
                            .stages
                            .iter()
                            .map(|s| serde_json::json!({ "name": s.name, "achieved_kg": s.achieved_kg }))
                            .collect::<Vec<_>>(),
                    }),
                );
            }
            BatchStatus::Aborted(reason) => {
                let kind = abort_label(reason.kind());
                BATCH_ABORTS.with_label_values(&[kind]).inc();
                if reason.kind() == AbortKind::Cancelled {
                    self.audit(AuditEventType::OperatorCancel, serde_json::json!({}));
                }
                self.audit(
                    AuditEventType::BatchAborted,
                    serde_json::json!({
                        (tags::BATCH_ABORTS.key): kind,
                        "reason": reason.to_string(),
                        "completed_stages": result.stages.iter().filter(|s| s.is_completed()).count(),
                    }),
                );
            }
        }
    }
}

impl StageObserver for TelemetryObserver<'_> {
    fn stage_started(&mut self, spec: &StageSpec) {
        STAGE_TARGET_KG.set(spec.target_kg);
        STAGE_DELTA_KG.set(0.0);
        self.audit(
            AuditEventType::StageStarted,
            serde_json::json!({
                "stage": spec.name,
                (tags::STAGE_TARGET_KG.key): spec.target_kg,
                "pump_pin": spec.actuator.pump_pin,
                "valve_pin": spec.actuator.valve_pin,
                "flow_pin": spec.interlock.own_pin,
                "opposite_flow_pin": spec.interlock.opposite_pin,
                "interlocks": spec.interlock.enabled(),
            }),
        );
    }

    fn phase_changed(&mut self, _stage: &str, phase: StagePhase) {
        STAGE_PHASE.set(f64::from(phase.code()));
        let energized = matches!(phase, StagePhase::WaitFlowStart | StagePhase::Active);
        ACTUATORS_ENERGIZED.set(if energized { 1.0 } else { 0.0 });
    }

    fn sample(&mut self, outcome: SampleOutcome) {
        SAMPLES.with_label_values(&[sample_label(outcome)]).inc();
    }

    fn progress(&mut self, _stage: &str, weight_kg: f64, delta_kg: f64) {
        SCALE_WEIGHT_KG.set(weight_kg);
        STAGE_DELTA_KG.set(delta_kg);
    }

    fn warning(&mut self, stage: &str, warning: StageWarning) {
        let (label, pin) = match warning {
            StageWarning::FlowActiveBeforeStart { pin } => ("flow_active_before_start", pin),
            StageWarning::FlowDropped { pin } => ("flow_dropped", pin),
        };
        FLOW_WARNINGS.with_label_values(&[label]).inc();
        self.audit(
            AuditEventType::FlowWarning,
            serde_json::json!({ "stage": stage, (tags::FLOW_WARNINGS.key): label, "pin": pin }),
        );
    }

    fn stage_finished(&mut self, result: &StageResult) {
        let details = serde_json::json!({
            "stage": result.name,
            (tags::STAGE_TARGET_KG.key): result.target_kg,
            "baseline_kg": result.baseline_kg,
            (tags::SCALE_WEIGHT_KG.key): result.weight_kg,
            (tags::STAGE_DELTA_KG.key): result.achieved_kg,
        });
        match result.status {
            StageStatus::Completed => {
                STAGES_COMPLETED.inc();
                self.audit(AuditEventType::StageCompleted, details);
            }
            StageStatus::Aborted(reason) => {
                let mut details = details;
                details["reason"] = serde_json::Value::from(reason.to_string());
                self.audit(AuditEventType::StageAborted, details);
            }
        }
    }
}
