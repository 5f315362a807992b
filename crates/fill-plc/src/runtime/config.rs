use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ArgError {
    #[error("{0} requires a value")]
    MissingValue(&'static str),
    #[error("invalid number for {what}: {value:?}")]
    InvalidNumber { what: &'static str, value: String },
    #[error("unknown option {0}")]
    UnknownOption(String),
    #[error("a split needs both fractions, got only one")]
    IncompleteSplit,
    #[error("unexpected argument {0:?}")]
    UnexpectedArgument(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub show_help: bool,
    /// Total batch mass. `None` falls back to the rig default.
    pub target_kg: Option<f64>,
    /// Fractions for the first and second component.
    pub split: Option<[f64; 2]>,
    pub config_path: Option<PathBuf>,
    pub scale_addr: Option<String>,
    pub modbus_addr: Option<String>,
    pub simulate: bool,
    pub sim_flow_kg_s: f64,
    pub report_dir: PathBuf,
    pub ignore_flows: bool,
    pub tare: bool,
    pub json_logs: bool,
    pub log_dir: Option<PathBuf>,
    pub metrics_addr: Option<String>,
    pub audit_path: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            show_help: false,
            target_kg: None,
            split: None,
            config_path: None,
            scale_addr: None,
            modbus_addr: None,
            simulate: false,
            sim_flow_kg_s: 5.0,
            report_dir: PathBuf::from("batches"),
            ignore_flows: false,
            tare: false,
            json_logs: false,
            log_dir: None,
            metrics_addr: None,
            audit_path: None,
        }
    }
}

fn value<'a>(args: &'a [String], i: &mut usize, flag: &'static str) -> Result<&'a str, ArgError> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or(ArgError::MissingValue(flag))
}

fn number(raw: &str, what: &'static str) -> Result<f64, ArgError> {
    raw.parse::<f64>().map_err(|_| ArgError::InvalidNumber {
        what,
        value: raw.to_string(),
    })
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ArgError> {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args)
    }

    pub fn from_args(args: &[String]) -> Result<Self, ArgError> {
        let mut cfg = RuntimeConfig::default();
        let mut positional = Vec::new();
        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--config" => {
                    cfg.config_path = Some(PathBuf::from(value(args, &mut i, "--config")?));
                }
                "--scale" => {
                    cfg.scale_addr = Some(value(args, &mut i, "--scale")?.to_string());
                }
                "--modbus" => {
                    cfg.modbus_addr = Some(value(args, &mut i, "--modbus")?.to_string());
                }
                "--simulate" => {
                    cfg.simulate = true;
                }
                "--sim-flow" => {
                    cfg.sim_flow_kg_s = number(value(args, &mut i, "--sim-flow")?, "--sim-flow")?;
                }
                "--report-dir" => {
                    cfg.report_dir = PathBuf::from(value(args, &mut i, "--report-dir")?);
                }
                "--ignore-flows" => {
                    cfg.ignore_flows = true;
                }
                "--tare" => {
                    cfg.tare = true;
                }
                "--json-logs" => {
                    cfg.json_logs = true;
                }
                "--log-dir" => {
                    cfg.log_dir = Some(PathBuf::from(value(args, &mut i, "--log-dir")?));
                }
                "--metrics-addr" => {
                    cfg.metrics_addr = Some(value(args, &mut i, "--metrics-addr")?.to_string());
                }
                "--audit-log" => {
                    cfg.audit_path = Some(PathBuf::from(value(args, &mut i, "--audit-log")?));
                }
                "--help" | "-h" => {
                    cfg.show_help = true;
                    return Ok(cfg);
                }
                flag if flag.starts_with("--") => {
                    return Err(ArgError::UnknownOption(flag.to_string()));
                }
                other => positional.push(other),
            }
            i += 1;
        }

        match positional.as_slice() {
            [] => {}
            [kg] => cfg.target_kg = Some(number(kg, "target kg")?),
            [_, _] => return Err(ArgError::IncompleteSplit),
            [kg, first, second] => {
                cfg.target_kg = Some(number(kg, "target kg")?);
                cfg.split = Some([
                    number(first, "first fraction")?,
                    number(second, "second fraction")?,
                ]);
            }
            [_, _, _, extra, ..] => return Err(ArgError::UnexpectedArgument(extra.to_string())),
        }
        Ok(cfg)
    }

    pub fn print_help() {
        println!(
            r#"fill-plc - Two-component batch-fill controller

USAGE:
    fill-plc [OPTIONS] [<KG> [<FIRST> <SECOND>]]

ARGS:
    <KG>                    Total batch mass in kg [default: rig default_target_kg]
    <FIRST> <SECOND>        Split fractions, each > 0, summing to 1.0 [default: rig split]

OPTIONS:
    --config <PATH>         Rig configuration (JSON); missing fields take defaults
    --scale <ADDR>          Scale behind a serial-to-TCP server (e.g. 192.168.1.20:4001)
    --modbus <ADDR>         Pumps, valves and flow switches via Modbus TCP (e.g. 192.168.1.10:502)
    --simulate              Run against the in-process simulated rig
    --sim-flow <KG/S>       Simulated flow rate per open pump [default: 5.0]
    --report-dir <PATH>     Directory for batch and error reports [default: batches]
    --ignore-flows          Do not evaluate the flow switch interlocks
    --tare                  Tare the scale before the first stage
    --json-logs             Output logs in JSON format (for log aggregation)
    --log-dir <PATH>        Also write logs to a daily rolling file in this directory
    --metrics-addr <ADDR>   Enable Prometheus metrics server on address (e.g., 0.0.0.0:9090)
    --audit-log <PATH>      Enable audit logging to specified JSONL file
    -h, --help              Print this help message

EXIT CODES:
    0   Batch completed
    1   Batch aborted (tare, interlock, silent scale, operator cancel) or hardware unavailable
    2   Invalid arguments or configuration; nothing was actuated

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log filter (e.g., RUST_LOG=debug,fill_core=trace)

EXAMPLES:
    # Dry run of a 40 kg batch on the simulated rig
    fill-plc --simulate 40

    # 120 kg at 30/70 on the real rig, with metrics and audit trail
    fill-plc --modbus 192.168.1.10:502 --scale 192.168.1.20:4001 \
        --metrics-addr 0.0.0.0:9090 --audit-log /var/log/fill-plc/audit.jsonl 120 0.3 0.7
"#
        );
    }
}
