use crate::infra::audit::{AuditEventType, AuditLogger};
use crate::infra::report::FileRecorder;
use crate::runtime::config::{ArgError, RuntimeConfig};
use crate::runtime::logging::init_tracing;
use crate::runtime::shutdown::install_ctrl_c;
use crate::runtime::telemetry::{self, TelemetryObserver};
use fill_core::{
    BatchOrchestrator, BatchPlan, BatchResult, BatchStatus, ConfigError, MachineIO, RigConfig,
    ScaleChannel, SimParams, SimulatedRig,
};
use fill_io::metrics::BATCHES_STARTED;
use fill_io::{ModbusError, ModbusIo, ScaleError, TcpScaleChannel};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{atomic::AtomicBool, Arc};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

pub const EXIT_ABORTED: u8 = 1;
pub const EXIT_CONFIG: u8 = 2;

const MODBUS_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Args(#[from] ArgError),
    #[error("failed to read rig config {path}: {source}")]
    ConfigRead { path: PathBuf, source: io::Error },
    #[error("invalid rig config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("simulated flow rate must be positive, got {0}")]
    InvalidSimFlow(f64),
    #[error("no hardware selected: pass --simulate, or both --modbus and --scale")]
    NoHardware,
    #[error(transparent)]
    Modbus(#[from] ModbusError),
    #[error(transparent)]
    Scale(#[from] ScaleError),
    #[error("failed to prepare report directory {path}: {source}")]
    ReportDir { path: PathBuf, source: io::Error },
    #[error("failed to open audit log {path}: {source}")]
    Audit { path: PathBuf, source: io::Error },
}

impl RunError {
    /// Configuration problems exit with 2, nothing having been actuated.
    /// Unreachable hardware or unwritable files exit with 1.
    pub fn exit_code(&self) -> u8 {
        match self {
            RunError::Args(_)
            | RunError::ConfigRead { .. }
            | RunError::ConfigParse { .. }
            | RunError::Config(_)
            | RunError::InvalidSimFlow(_)
            | RunError::NoHardware => EXIT_CONFIG,
            RunError::Modbus(_)
            | RunError::Scale(_)
            | RunError::ReportDir { .. }
            | RunError::Audit { .. } => EXIT_ABORTED,
        }
    }
}

pub fn run_from_args() -> ExitCode {
    let config = match RuntimeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Run with --help for usage.");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    if config.show_help {
        RuntimeConfig::print_help();
        return ExitCode::SUCCESS;
    }

    let _log_guard = init_tracing(config.json_logs, config.log_dir.as_deref());

    match run(config) {
        Ok(result) if result.is_completed() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(EXIT_ABORTED),
        Err(e) => {
            error!(error = %e, "Batch not run");
            ExitCode::from(e.exit_code())
        }
    }
}

/// Rig configuration from `--config` (or defaults) with command-line
/// overrides applied.
pub fn load_rig_config(config: &RuntimeConfig) -> Result<RigConfig, RunError> {
    let mut rig = match &config.config_path {
        Some(path) => {
            let raw = fs::read_to_string(path).map_err(|source| RunError::ConfigRead {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&raw).map_err(|source| RunError::ConfigParse {
                path: path.clone(),
                source,
            })?
        }
        None => RigConfig::default(),
    };
    if config.ignore_flows {
        rig.ignore_flows = true;
    }
    if config.tare {
        rig.tare_on_start = true;
    }
    rig.validate()?;
    Ok(rig)
}

type Hardware = (Box<dyn MachineIO>, Box<dyn ScaleChannel>);

fn open_hardware(config: &RuntimeConfig, rig: &RigConfig) -> Result<Hardware, RunError> {
    if config.simulate {
        if !(config.sim_flow_kg_s > 0.0) {
            return Err(RunError::InvalidSimFlow(config.sim_flow_kg_s));
        }
        info!(flow_rate_kg_s = config.sim_flow_kg_s, "Using simulated rig");
        let sim = SimulatedRig::new(
            rig,
            SimParams {
                flow_rate_kg_s: config.sim_flow_kg_s,
                ..SimParams::default()
            },
        );
        return Ok((Box::new(sim.io()), Box::new(sim.scale())));
    }

    match (&config.modbus_addr, &config.scale_addr) {
        (Some(modbus), Some(scale)) => {
            info!(addr = %modbus, "Connecting to Modbus I/O");
            let io = ModbusIo::connect(modbus, MODBUS_TIMEOUT)?;
            info!(addr = %scale, "Connecting to scale");
            let channel = TcpScaleChannel::connect(scale)?;
            Ok((Box::new(io), Box::new(channel)))
        }
        _ => Err(RunError::NoHardware),
    }
}

fn init_audit_logger(path: Option<&Path>) -> Result<Option<AuditLogger>, RunError> {
    path.map(|path| {
        AuditLogger::new(path)
            .map(|logger| {
                info!(path = %path.display(), "Audit logging enabled");
                logger
            })
            .map_err(|source| RunError::Audit {
                path: path.to_path_buf(),
                source,
            })
    })
    .transpose()
}

pub fn run(config: RuntimeConfig) -> Result<BatchResult, RunError> {
    let rig = load_rig_config(&config)?;
    let target_kg = config.target_kg.unwrap_or(rig.default_target_kg);
    let split = config.split.unwrap_or_else(|| rig.default_split());
    // Reject a bad batch before any hardware is touched.
    BatchPlan::new(target_kg, split).validate(&rig)?;

    telemetry::init();
    let _metrics_handle = telemetry::start_metrics_server(&config.metrics_addr);
    let audit = init_audit_logger(config.audit_path.as_deref())?;
    if let Some(logger) = &audit {
        logger.log_event(
            AuditEventType::SystemStart,
            serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "simulate": config.simulate,
                "ignore_flows": rig.ignore_flows,
                "components": rig.components.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            }),
        );
    }

    let stop = Arc::new(AtomicBool::new(false));
    if let Err(e) = install_ctrl_c(Arc::clone(&stop)) {
        warn!(error = %e, "Ctrl-C handling unavailable");
    }

    let recorder = FileRecorder::new(&config.report_dir).map_err(|source| RunError::ReportDir {
        path: config.report_dir.clone(),
        source,
    })?;
    let (io, scale) = open_hardware(&config, &rig)?;
    let mut batch = BatchOrchestrator::new(rig, io, scale, recorder)?;

    info!(target_kg, ?split, "Starting batch");
    BATCHES_STARTED.inc();
    if let Some(logger) = &audit {
        logger.log_event(
            AuditEventType::BatchStarted,
            serde_json::json!({ "target_kg": target_kg, "split": split }),
        );
    }

    let mut observer = TelemetryObserver::new(audit.as_ref());
    let result = batch.run(target_kg, Some(split), &stop, &mut observer)?;
    observer.batch_finished(&result);

    match result.status {
        BatchStatus::Completed => info!(
            total_kg = result.total_kg,
            reports = %batch.recorder().dir().display(),
            "Batch completed"
        ),
        BatchStatus::Aborted(reason) => error!(
            reason = %reason,
            kind = telemetry::abort_label(reason.kind()),
            "Batch aborted, all outputs off"
        ),
    }

    if let Some(logger) = &audit {
        logger.log_event(
            AuditEventType::SystemShutdown,
            serde_json::json!({ "completed": result.is_completed() }),
        );
    }
    Ok(result)
}
