//! Closed-loop fill of a single stage.
//!
//! A stage energizes one pump/valve pair, waits for its flow switch, takes a
//! baseline weight and keeps filling until `delta + tolerance >= target`.
//! Every exit path leaves the outputs de-energized.

use crate::actuator::ActuatorPair;
use crate::config::RigConfig;
use crate::hal::{MachineIO, ScaleChannel};
use crate::interlock::FlowInterlock;
use crate::weight::{WeightSample, WeightSource};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub struct StageSpec {
    pub name: String,
    pub target_kg: f64,
    pub actuator: ActuatorPair,
    pub interlock: FlowInterlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagePhase {
    WaitFlowStart,
    Active,
    Completed,
    Aborted,
}

impl StagePhase {
    pub fn code(self) -> u8 {
        match self {
            StagePhase::WaitFlowStart => 1,
            StagePhase::Active => 2,
            StagePhase::Completed => 3,
            StagePhase::Aborted => 4,
        }
    }
}

/// Why a stage stopped before reaching its target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AbortReason {
    /// Fluid delta went negative: the scale was re-tared mid-stage.
    Tare,
    /// The other pump's flow switch went active while this stage was filling.
    OpposingFlow { pin: u8 },
    /// The own flow switch never activated after the pump was energized.
    FlowStartTimeout { pin: u8 },
    /// No scale line for longer than the configured silence limit.
    ScaleSilent,
    /// Operator abort request.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortKind {
    Tare,
    Interlock,
    ScaleTimeout,
    Cancelled,
}

impl AbortReason {
    pub fn kind(&self) -> AbortKind {
        match self {
            AbortReason::Tare => AbortKind::Tare,
            AbortReason::OpposingFlow { .. } | AbortReason::FlowStartTimeout { .. } => {
                AbortKind::Interlock
            }
            AbortReason::ScaleSilent => AbortKind::ScaleTimeout,
            AbortReason::Cancelled => AbortKind::Cancelled,
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Tare => write!(f, "scale tared during the process"),
            AbortReason::OpposingFlow { pin } => {
                write!(f, "opposite pump flow switch {pin} activated during the stage")
            }
            AbortReason::FlowStartTimeout { pin } => {
                write!(f, "flow switch {pin} did not activate after starting the pump")
            }
            AbortReason::ScaleSilent => write!(f, "scale stopped sending readings"),
            AbortReason::Cancelled => write!(f, "cancelled by operator"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StageStatus {
    Completed,
    Aborted(AbortReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageResult {
    pub name: String,
    pub target_kg: f64,
    /// Scale weight when the stage entered `Active`.
    pub baseline_kg: f64,
    /// Last accepted scale weight.
    pub weight_kg: f64,
    /// Mass added during the stage (`weight_kg - baseline_kg`).
    pub achieved_kg: f64,
    pub status: StageStatus,
}

impl StageResult {
    pub fn is_completed(&self) -> bool {
        matches!(self.status, StageStatus::Completed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageWarning {
    FlowActiveBeforeStart { pin: u8 },
    FlowDropped { pin: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    Accepted,
    OutOfRange,
    Timeout,
}

/// Side-channel for observability. Nothing here influences control.
pub trait StageObserver {
    fn stage_started(&mut self, _spec: &StageSpec) {}
    fn phase_changed(&mut self, _stage: &str, _phase: StagePhase) {}
    fn sample(&mut self, _outcome: SampleOutcome) {}
    fn progress(&mut self, _stage: &str, _weight_kg: f64, _delta_kg: f64) {}
    fn warning(&mut self, _stage: &str, _warning: StageWarning) {}
    fn stage_finished(&mut self, _result: &StageResult) {}
}

pub struct NoopObserver;

impl StageObserver for NoopObserver {}

#[derive(Debug, Clone, Copy, Default)]
struct Progress {
    baseline_kg: f64,
    weight_kg: f64,
    delta_kg: f64,
}

pub struct StageController<'a, IO: MachineIO, S: ScaleChannel> {
    config: &'a RigConfig,
    io: &'a mut IO,
    scale: &'a mut WeightSource<S>,
    observer: &'a mut dyn StageObserver,
    stop: &'a AtomicBool,
}

impl<'a, IO: MachineIO, S: ScaleChannel> StageController<'a, IO, S> {
    pub fn new(
        config: &'a RigConfig,
        io: &'a mut IO,
        scale: &'a mut WeightSource<S>,
        observer: &'a mut dyn StageObserver,
        stop: &'a AtomicBool,
    ) -> Self {
        Self {
            config,
            io,
            scale,
            observer,
            stop,
        }
    }

    pub fn run(&mut self, spec: &StageSpec) -> StageResult {
        log::info!(
            "Stage {}: filling {:.1} kg (tolerance {:.1} kg)",
            spec.name,
            spec.target_kg,
            self.config.tolerance_kg
        );
        self.observer.stage_started(spec);

        let mut progress = Progress::default();
        let status = match self.fill(spec, &mut progress) {
            Ok(()) => {
                spec.actuator.set(self.io, false);
                self.enter(spec, StagePhase::Completed);
                log::info!(
                    "Stage {} completed. Current total: {:.1} kg",
                    spec.name,
                    progress.weight_kg
                );
                StageStatus::Completed
            }
            Err(reason) => {
                spec.actuator.set(self.io, false);
                self.all_off();
                self.enter(spec, StagePhase::Aborted);
                log::error!(
                    "Stage {} aborted: {} (weight {:.1} kg, stage {:.1} kg)",
                    spec.name,
                    reason,
                    progress.weight_kg,
                    progress.delta_kg
                );
                StageStatus::Aborted(reason)
            }
        };

        let result = StageResult {
            name: spec.name.clone(),
            target_kg: spec.target_kg,
            baseline_kg: progress.baseline_kg,
            weight_kg: progress.weight_kg,
            achieved_kg: progress.delta_kg,
            status,
        };
        self.observer.stage_finished(&result);
        result
    }

    fn fill(&mut self, spec: &StageSpec, progress: &mut Progress) -> Result<(), AbortReason> {
        let interlock = spec.interlock;
        self.enter(spec, StagePhase::WaitFlowStart);

        if interlock.has_started(self.io) {
            log::warn!(
                "Flow switch {} was already active before the stage started",
                interlock.own_pin
            );
            self.observer.warning(
                &spec.name,
                StageWarning::FlowActiveBeforeStart {
                    pin: interlock.own_pin,
                },
            );
        }

        self.check_cancel()?;
        spec.actuator.set(self.io, true);

        if interlock.enabled() {
            self.wait_for_flow(&interlock)?;
        }

        self.enter(spec, StagePhase::Active);
        let mut own_flowing = interlock.has_started(self.io);
        let mut last_heard = Instant::now();

        let baseline = self.take_baseline(spec, &mut own_flowing, &mut last_heard)?;
        *progress = Progress {
            baseline_kg: baseline,
            weight_kg: baseline,
            delta_kg: 0.0,
        };
        if progress.delta_kg < 0.0 {
            return Err(AbortReason::Tare);
        }

        let mut last_reported = baseline;
        while progress.delta_kg + self.config.tolerance_kg < spec.target_kg {
            self.check_cancel()?;

            match self.scale.sample() {
                WeightSample::NoSample => self.note_silence(&last_heard)?,
                WeightSample::Value(kg) => {
                    last_heard = Instant::now();
                    if self.in_range(kg) {
                        self.observer.sample(SampleOutcome::Accepted);
                        progress.weight_kg = kg;
                        progress.delta_kg = kg - baseline;
                        if progress.delta_kg < 0.0 {
                            return Err(AbortReason::Tare);
                        }
                        if kg != last_reported {
                            log::info!(
                                "Current weight: {:.1} kg (stage: {:.1} kg)",
                                kg,
                                progress.delta_kg
                            );
                            self.observer.progress(&spec.name, kg, progress.delta_kg);
                            last_reported = kg;
                        }
                    } else {
                        log::debug!("Discarding out-of-range reading {kg} kg");
                        self.observer.sample(SampleOutcome::OutOfRange);
                    }
                }
            }

            self.check_interlock(spec, &mut own_flowing)?;
        }

        Ok(())
    }

    fn wait_for_flow(&mut self, interlock: &FlowInterlock) -> Result<(), AbortReason> {
        let poll = self.scale.poll_interval();
        let deadline = Instant::now() + self.config.flow_start_timeout();
        log::info!(
            "Waiting for flow switch {} to activate",
            interlock.own_pin
        );

        loop {
            if interlock.has_started(self.io) {
                log::info!("Flow switch {} active", interlock.own_pin);
                return Ok(());
            }
            self.check_cancel()?;
            if interlock.opposing_active(self.io) {
                return Err(AbortReason::OpposingFlow {
                    pin: interlock.opposite_pin,
                });
            }
            if Instant::now() >= deadline {
                return Err(AbortReason::FlowStartTimeout {
                    pin: interlock.own_pin,
                });
            }
            std::thread::sleep(poll);
        }
    }

    /// First in-range reading of the stage. Glitches and silences are
    /// skipped the same way as inside the fill loop.
    fn take_baseline(
        &mut self,
        spec: &StageSpec,
        own_flowing: &mut bool,
        last_heard: &mut Instant,
    ) -> Result<f64, AbortReason> {
        loop {
            self.check_cancel()?;
            match self.scale.sample() {
                WeightSample::Value(kg) if self.in_range(kg) => {
                    *last_heard = Instant::now();
                    self.observer.sample(SampleOutcome::Accepted);
                    log::info!("Stage {} baseline: {:.1} kg", spec.name, kg);
                    return Ok(kg);
                }
                WeightSample::Value(kg) => {
                    *last_heard = Instant::now();
                    log::debug!("Discarding out-of-range baseline {kg} kg");
                    self.observer.sample(SampleOutcome::OutOfRange);
                }
                WeightSample::NoSample => self.note_silence(last_heard)?,
            }
            self.check_interlock(spec, own_flowing)?;
        }
    }

    fn check_interlock(
        &mut self,
        spec: &StageSpec,
        own_flowing: &mut bool,
    ) -> Result<(), AbortReason> {
        let interlock = spec.interlock;
        if !interlock.enabled() {
            return Ok(());
        }

        if interlock.opposing_active(self.io) {
            return Err(AbortReason::OpposingFlow {
                pin: interlock.opposite_pin,
            });
        }

        let flowing = interlock.has_started(self.io);
        if flowing != *own_flowing {
            if !flowing {
                log::warn!(
                    "Flow switch {} turned off during the stage",
                    interlock.own_pin
                );
                self.observer.warning(
                    &spec.name,
                    StageWarning::FlowDropped {
                        pin: interlock.own_pin,
                    },
                );
            }
            *own_flowing = flowing;
        }
        Ok(())
    }

    fn note_silence(&mut self, last_heard: &Instant) -> Result<(), AbortReason> {
        self.observer.sample(SampleOutcome::Timeout);
        match self.config.scale_silence_limit() {
            Some(limit) if last_heard.elapsed() > limit => Err(AbortReason::ScaleSilent),
            _ => Ok(()),
        }
    }

    fn check_cancel(&self) -> Result<(), AbortReason> {
        if self.stop.load(Ordering::Relaxed) {
            Err(AbortReason::Cancelled)
        } else {
            Ok(())
        }
    }

    fn in_range(&self, kg: f64) -> bool {
        kg >= self.config.weight_min_kg && kg <= self.config.weight_max_kg
    }

    fn all_off(&mut self) {
        for component in &self.config.components {
            ActuatorPair::for_component(component).set(self.io, false);
        }
    }

    fn enter(&mut self, spec: &StageSpec, phase: StagePhase) {
        self.observer.phase_changed(&spec.name, phase);
    }
}
