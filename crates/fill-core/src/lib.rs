pub mod actuator;
pub mod config;
pub mod error;
pub mod hal;
#[cfg(feature = "simulation")]
pub mod hal_sim;
pub mod interlock;
pub mod orchestrator;
pub mod plan;
pub mod stage;
pub mod tags;
#[cfg(test)]
mod testing;
pub mod weight;

pub use actuator::ActuatorPair;
pub use config::{ComponentConfig, RigConfig, SerialPolicy};
pub use error::ConfigError;
pub use hal::{Level, MachineIO, ScaleChannel};
#[cfg(feature = "simulation")]
pub use hal_sim::{SimIo, SimParams, SimScale, SimulatedRig};
pub use interlock::FlowInterlock;
pub use orchestrator::{BatchOrchestrator, BatchResult, BatchStatus, Recorder};
pub use plan::{BatchPlan, Unvalidated, Validated};
pub use stage::{
    AbortKind, AbortReason, NoopObserver, SampleOutcome, StageController, StageObserver,
    StagePhase, StageResult, StageSpec, StageStatus, StageWarning,
};
pub use weight::{parse as parse_weight, LineRead, WeightSample, WeightSource};
