use crate::error::ConfigError;
use crate::hal::Level;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Wiring and default share of one fluid component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    pub name: String,
    pub pump_pin: u8,
    pub valve_pin: u8,
    pub flow_pin: u8,
    pub default_fraction: f64,
}

/// Serial read policy. The line window is `poll_interval * max_attempts`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialPolicy {
    pub poll_interval_us: u64,
    pub max_attempts: u32,
}

impl Default for SerialPolicy {
    fn default() -> Self {
        Self {
            poll_interval_us: 1_000,
            max_attempts: 5_000,
        }
    }
}

impl SerialPolicy {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_us)
    }

    /// Worst-case wait for one scale line.
    pub fn line_window(&self) -> Duration {
        self.poll_interval() * self.max_attempts
    }
}

/// Rig configuration. Built once at start-up and never mutated during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigConfig {
    /// Stage order: the first component fills first.
    pub components: [ComponentConfig; 2],
    pub tolerance_kg: f64,
    pub weight_min_kg: f64,
    pub weight_max_kg: f64,
    pub max_target_kg: f64,
    /// Batch size used when the operator gives none.
    pub default_target_kg: f64,
    pub split_epsilon: f64,
    pub serial: SerialPolicy,
    pub flow_active_level: Level,
    pub ignore_flows: bool,
    pub flow_start_timeout_ms: u64,
    /// Abort a stage after this long without any scale line. `None` waits forever.
    pub scale_silence_limit_ms: Option<u64>,
    /// Accept a 0.0 fraction and skip that stage instead of rejecting the split.
    pub allow_zero_fraction: bool,
    /// Send the tare command to the scale before the first stage.
    pub tare_on_start: bool,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            components: [
                ComponentConfig {
                    name: "Water".to_string(),
                    pump_pin: 2,
                    valve_pin: 6,
                    flow_pin: 15,
                    default_fraction: 0.375,
                },
                ComponentConfig {
                    name: "AFS40".to_string(),
                    pump_pin: 5,
                    valve_pin: 8,
                    flow_pin: 16,
                    default_fraction: 0.625,
                },
            ],
            tolerance_kg: 0.5,
            weight_min_kg: -100.0,
            weight_max_kg: 2000.0,
            max_target_kg: 1500.0,
            default_target_kg: 40.0,
            split_epsilon: 0.001,
            serial: SerialPolicy::default(),
            flow_active_level: Level::Low,
            ignore_flows: false,
            flow_start_timeout_ms: 10_000,
            scale_silence_limit_ms: Some(30_000),
            allow_zero_fraction: false,
            tare_on_start: false,
        }
    }
}

impl RigConfig {
    pub fn flow_start_timeout(&self) -> Duration {
        Duration::from_millis(self.flow_start_timeout_ms)
    }

    pub fn scale_silence_limit(&self) -> Option<Duration> {
        self.scale_silence_limit_ms.map(Duration::from_millis)
    }

    pub fn default_split(&self) -> [f64; 2] {
        [
            self.components[0].default_fraction,
            self.components[1].default_fraction,
        ]
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for component in &self.components {
            for pin in [component.pump_pin, component.valve_pin, component.flow_pin] {
                if !seen.insert(pin) {
                    return Err(ConfigError::PinConflict { pin });
                }
            }
        }

        if !self.tolerance_kg.is_finite() || self.tolerance_kg < 0.0 {
            return Err(ConfigError::InvalidSetting {
                field: "tolerance_kg",
                reason: format!("must be a non-negative number, got {}", self.tolerance_kg),
            });
        }
        if !(self.weight_min_kg < self.weight_max_kg) {
            return Err(ConfigError::InvalidSetting {
                field: "weight_min_kg",
                reason: format!(
                    "range [{}, {}] is empty",
                    self.weight_min_kg, self.weight_max_kg
                ),
            });
        }
        if !(self.max_target_kg > 0.0) {
            return Err(ConfigError::InvalidSetting {
                field: "max_target_kg",
                reason: format!("must be positive, got {}", self.max_target_kg),
            });
        }
        if !(self.split_epsilon >= 0.0) {
            return Err(ConfigError::InvalidSetting {
                field: "split_epsilon",
                reason: format!("must be non-negative, got {}", self.split_epsilon),
            });
        }
        if self.serial.poll_interval_us == 0 || self.serial.max_attempts == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "serial",
                reason: "poll interval and attempt count must both be non-zero".to_string(),
            });
        }
        Ok(())
    }
}
