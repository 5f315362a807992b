//! Two-stage batch sequencing and reporting.

use crate::actuator::ActuatorPair;
use crate::config::RigConfig;
use crate::error::ConfigError;
use crate::hal::{MachineIO, ScaleChannel};
use crate::interlock::FlowInterlock;
use crate::plan::{BatchPlan, Validated};
use crate::stage::{
    AbortReason, StageController, StageObserver, StageResult, StageSpec, StageStatus,
};
use crate::weight::WeightSource;
use std::io;
use std::sync::atomic::AtomicBool;

/// Persists batch outcomes.
pub trait Recorder {
    fn record_success(&mut self, stages: &[StageResult], total_kg: f64) -> io::Result<()>;
    fn record_error(&mut self, reason: &str, weight_kg: f64, stage_delta_kg: f64)
        -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BatchStatus {
    Completed,
    Aborted(AbortReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    pub stages: Vec<StageResult>,
    pub total_kg: f64,
    pub status: BatchStatus,
}

impl BatchResult {
    pub fn is_completed(&self) -> bool {
        matches!(self.status, BatchStatus::Completed)
    }
}

pub struct BatchOrchestrator<IO: MachineIO, S: ScaleChannel, R: Recorder> {
    config: RigConfig,
    io: IO,
    scale: WeightSource<S>,
    recorder: R,
}

impl<IO: MachineIO, S: ScaleChannel, R: Recorder> BatchOrchestrator<IO, S, R> {
    pub fn new(config: RigConfig, io: IO, channel: S, recorder: R) -> Result<Self, ConfigError> {
        config.validate()?;
        let scale = WeightSource::new(channel, config.serial);
        Ok(Self {
            config,
            io,
            scale,
            recorder,
        })
    }

    pub fn config(&self) -> &RigConfig {
        &self.config
    }

    pub fn io(&self) -> &IO {
        &self.io
    }

    pub fn recorder(&self) -> &R {
        &self.recorder
    }

    pub fn scale_mut(&mut self) -> &mut WeightSource<S> {
        &mut self.scale
    }

    /// Stage specs for both components, own/opposite switches swapped.
    pub fn stage_specs(&self, plan: &BatchPlan<Validated>) -> [StageSpec; 2] {
        let [first, second] = &self.config.components;
        let interlock = FlowInterlock::new(
            first.flow_pin,
            second.flow_pin,
            self.config.flow_active_level,
            self.config.ignore_flows,
        );
        [
            StageSpec {
                name: first.name.clone(),
                target_kg: plan.stage_target(0),
                actuator: ActuatorPair::for_component(first),
                interlock,
            },
            StageSpec {
                name: second.name.clone(),
                target_kg: plan.stage_target(1),
                actuator: ActuatorPair::for_component(second),
                interlock: interlock.swapped(),
            },
        ]
    }

    /// Run a full batch. `split` falls back to the configured defaults.
    ///
    /// Returns `Err` only for rejected parameters, before any output is
    /// driven. Stage aborts come back as `Ok` with `BatchStatus::Aborted`.
    pub fn run(
        &mut self,
        target_kg: f64,
        split: Option<[f64; 2]>,
        stop: &AtomicBool,
        observer: &mut dyn StageObserver,
    ) -> Result<BatchResult, ConfigError> {
        let split = split.unwrap_or_else(|| self.config.default_split());
        let plan = BatchPlan::new(target_kg, split).validate(&self.config)?;
        let specs = self.stage_specs(&plan);

        log::info!(
            "Batch target {:.1} kg, split {} {:.3} / {} {:.3}",
            plan.target_kg(),
            specs[0].name,
            split[0],
            specs[1].name,
            split[1]
        );

        self.all_off();
        if self.config.tare_on_start {
            if let Err(e) = self.scale.request_tare() {
                log::warn!("Failed to send tare command: {}", e);
            }
        }

        let mut stages = Vec::with_capacity(specs.len());
        for spec in &specs {
            if spec.target_kg == 0.0 {
                log::info!("Stage {} has no share in this batch, skipping", spec.name);
                continue;
            }

            let result = StageController::new(
                &self.config,
                &mut self.io,
                &mut self.scale,
                observer,
                stop,
            )
            .run(spec);

            if let StageStatus::Aborted(reason) = result.status {
                self.all_off();
                if let Err(e) = self.recorder.record_error(
                    &format!("Stage {}: {}", result.name, reason),
                    result.weight_kg,
                    result.achieved_kg,
                ) {
                    log::warn!("Failed to record batch error: {}", e);
                }
                stages.push(result);
                let total_kg = completed_total(&stages);
                return Ok(BatchResult {
                    stages,
                    total_kg,
                    status: BatchStatus::Aborted(reason),
                });
            }
            stages.push(result);
        }

        self.all_off();
        let total_kg = completed_total(&stages);
        log::info!(
            "Batch finished. {} | Total: {:.1} kg",
            stages
                .iter()
                .map(|s| format!("{}: {:.1} kg", s.name, s.achieved_kg))
                .collect::<Vec<_>>()
                .join(" | "),
            total_kg
        );
        if let Err(e) = self.recorder.record_success(&stages, total_kg) {
            log::warn!("Failed to record batch result: {}", e);
        }

        Ok(BatchResult {
            stages,
            total_kg,
            status: BatchStatus::Completed,
        })
    }

    fn all_off(&mut self) {
        for component in &self.config.components {
            ActuatorPair::for_component(component).set(&mut self.io, false);
        }
    }
}

fn completed_total(stages: &[StageResult]) -> f64 {
    stages
        .iter()
        .filter(|s| s.is_completed())
        .map(|s| s.achieved_kg)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SerialPolicy;
    use crate::hal::Level;
    use crate::stage::NoopObserver;
    use crate::testing::{MemoryRecorder, RecordingIo, ScriptedScale};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn config() -> RigConfig {
        RigConfig {
            serial: SerialPolicy {
                poll_interval_us: 100,
                max_attempts: 50,
            },
            flow_active_level: Level::High,
            flow_start_timeout_ms: 50,
            scale_silence_limit_ms: None,
            ..RigConfig::default()
        }
    }

    fn rig_io() -> RecordingIo {
        RecordingIo::new()
            .link(2, 15, Level::High)
            .link(5, 16, Level::High)
    }

    fn run(
        cfg: RigConfig,
        io: RecordingIo,
        scale: ScriptedScale,
        target: f64,
        split: Option<[f64; 2]>,
        stop: &AtomicBool,
    ) -> (
        Result<BatchResult, ConfigError>,
        BatchOrchestrator<RecordingIo, ScriptedScale, MemoryRecorder>,
    ) {
        let mut batch = BatchOrchestrator::new(cfg, io, scale, MemoryRecorder::default()).unwrap();
        let result = batch.run(target, split, stop, &mut NoopObserver);
        (result, batch)
    }

    #[test]
    fn runs_both_stages_and_records_success() {
        let scale = ScriptedScale::weights(&[0.0, 5.0, 10.0, 14.4, 15.4])
            .weight(15.4)
            .weight(25.0)
            .weight(35.0)
            .weight(40.4);
        let stop = AtomicBool::new(false);

        let (result, batch) = run(config(), rig_io(), scale, 40.0, None, &stop);
        let result = result.unwrap();

        assert!(result.is_completed());
        assert_eq!(result.stages.len(), 2);
        assert_eq!(result.stages[0].target_kg, 15.0);
        assert_eq!(result.stages[1].target_kg, 25.0);
        assert_eq!(result.stages[0].achieved_kg, 15.4);
        assert!((result.stages[1].achieved_kg - 25.0).abs() < 1e-9);
        assert!((result.total_kg - 40.4).abs() < 1e-9);
        assert!(batch.io().all_low());

        let recorder = batch.recorder();
        assert_eq!(recorder.successes.len(), 1);
        assert!(recorder.errors.is_empty());
        assert_eq!(recorder.successes[0].0, vec!["Water".to_string(), "AFS40".to_string()]);
    }

    #[test]
    fn interlock_abort_skips_second_stage() {
        let io = rig_io();
        let scale = ScriptedScale::weights(&[0.0, 5.0])
            .input(&io, 16, Level::High)
            .weight(7.5)
            .weight(15.0);
        let stop = AtomicBool::new(false);

        let (result, batch) = run(config(), io, scale, 40.0, None, &stop);
        let result = result.unwrap();

        assert_eq!(
            result.status,
            BatchStatus::Aborted(AbortReason::OpposingFlow { pin: 16 })
        );
        assert_eq!(result.stages.len(), 1);
        assert_eq!(result.total_kg, 0.0);
        assert_eq!(batch.io().energized_writes(5), 0);
        assert!(batch.io().all_low());

        let recorder = batch.recorder();
        assert!(recorder.successes.is_empty());
        assert_eq!(recorder.errors.len(), 1);
        let (reason, weight, delta) = &recorder.errors[0];
        assert!(reason.contains("opposite pump flow switch 16"));
        assert_eq!(*weight, 7.5);
        assert_eq!(*delta, 7.5);
    }

    #[test]
    fn tare_abort_in_second_stage_keeps_first_result() {
        let scale = ScriptedScale::weights(&[0.0, 15.0])
            .weight(15.0)
            .weight(20.0)
            .weight(0.0);
        let stop = AtomicBool::new(false);

        let (result, batch) = run(config(), rig_io(), scale, 40.0, None, &stop);
        let result = result.unwrap();

        assert_eq!(result.status, BatchStatus::Aborted(AbortReason::Tare));
        assert_eq!(result.stages.len(), 2);
        assert!(result.stages[0].is_completed());
        assert_eq!(result.total_kg, 15.0);
        let (_, weight, delta) = &batch.recorder().errors[0];
        assert_eq!(*weight, 0.0);
        assert_eq!(*delta, -15.0);
    }

    #[test]
    fn bad_split_is_rejected_before_any_output() {
        let stop = AtomicBool::new(false);
        let (result, batch) = run(
            config(),
            rig_io(),
            ScriptedScale::weights(&[0.0]),
            40.0,
            Some([0.5, 0.6]),
            &stop,
        );

        assert!(matches!(result, Err(ConfigError::SplitSum { .. })));
        assert!(batch.io().writes().is_empty());
        assert!(batch.recorder().errors.is_empty());
        assert!(batch.recorder().successes.is_empty());
    }

    #[test]
    fn target_out_of_range_is_rejected() {
        let stop = AtomicBool::new(false);
        let (result, batch) = run(
            config(),
            rig_io(),
            ScriptedScale::silent(),
            1600.0,
            None,
            &stop,
        );

        assert!(matches!(result, Err(ConfigError::TargetOutOfRange { .. })));
        assert!(batch.io().writes().is_empty());
    }

    #[test]
    fn zero_share_stage_is_skipped() {
        let cfg = RigConfig {
            allow_zero_fraction: true,
            ..config()
        };
        let scale = ScriptedScale::weights(&[0.0, 5.0, 10.0]);
        let stop = AtomicBool::new(false);

        let (result, batch) = run(cfg, rig_io(), scale, 10.0, Some([1.0, 0.0]), &stop);
        let result = result.unwrap();

        assert!(result.is_completed());
        assert_eq!(result.stages.len(), 1);
        assert_eq!(result.stages[0].name, "Water");
        assert_eq!(batch.io().energized_writes(5), 0);
        assert_eq!(batch.io().energized_writes(8), 0);
    }

    #[test]
    fn tare_on_start_sends_command() {
        let cfg = RigConfig {
            tare_on_start: true,
            ..config()
        };
        let scale = ScriptedScale::weights(&[0.0, 2.0, 2.0, 4.0]);
        let stop = AtomicBool::new(false);

        let (result, mut batch) = run(cfg, rig_io(), scale, 4.0, Some([0.5, 0.5]), &stop);

        assert!(result.unwrap().is_completed());
        assert_eq!(batch.scale_mut().channel_mut().written(), b"T\r\n");
    }

    #[test]
    fn operator_cancel_is_recorded_as_error() {
        let stop = AtomicBool::new(true);
        let (result, batch) = run(
            config(),
            rig_io(),
            ScriptedScale::weights(&[0.0]),
            40.0,
            None,
            &stop,
        );
        let result = result.unwrap();

        assert_eq!(result.status, BatchStatus::Aborted(AbortReason::Cancelled));
        assert_eq!(batch.io().energized_writes(2), 0);
        assert!(batch.recorder().errors[0].0.contains("cancelled by operator"));
    }

    #[test]
    fn cancel_mid_stage_records_weight_and_delta() {
        let scale = ScriptedScale::weights(&[2.0, 5.0]).silence(Duration::from_secs(2));
        let stop = AtomicBool::new(false);

        let (result, batch) = std::thread::scope(|s| {
            s.spawn(|| {
                std::thread::sleep(Duration::from_millis(30));
                stop.store(true, Ordering::Relaxed);
            });
            run(config(), rig_io(), scale, 40.0, None, &stop)
        });
        let result = result.unwrap();

        assert_eq!(result.status, BatchStatus::Aborted(AbortReason::Cancelled));
        assert_eq!(result.stages.len(), 1);
        assert_eq!(batch.io().energized_writes(2), 1);
        assert_eq!(batch.io().energized_writes(5), 0);
        assert!(batch.io().all_low());

        let recorder = batch.recorder();
        assert!(recorder.successes.is_empty());
        let (reason, weight, delta) = &recorder.errors[0];
        assert_eq!(reason, "Stage Water: cancelled by operator");
        assert_eq!(*weight, 5.0);
        assert_eq!(*delta, 3.0);
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let mut cfg = config();
        cfg.components[1].pump_pin = cfg.components[0].pump_pin;
        let res = BatchOrchestrator::new(
            cfg,
            rig_io(),
            ScriptedScale::silent(),
            MemoryRecorder::default(),
        );
        assert!(matches!(res, Err(ConfigError::PinConflict { pin: 2 })));
    }
}
