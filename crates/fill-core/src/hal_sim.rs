//! In-process rig for dry runs: a vessel on a scale fed by the configured
//! pump/valve pairs.

use crate::config::RigConfig;
use crate::hal::{Level, MachineIO, ScaleChannel};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimParams {
    /// Mass added per second while a pump and its valve are both energized.
    pub flow_rate_kg_s: f64,
    /// Time between scale lines.
    pub line_interval: Duration,
    pub initial_weight_kg: f64,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            flow_rate_kg_s: 5.0,
            line_interval: Duration::from_millis(50),
            initial_weight_kg: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Feed {
    pump_pin: u8,
    valve_pin: u8,
    flow_pin: u8,
}

#[derive(Debug)]
struct RigState {
    outputs: HashMap<u8, Level>,
    gross_kg: f64,
    tare_kg: f64,
    last_step: Instant,
    next_line: Instant,
    pending: VecDeque<u8>,
}

#[derive(Debug)]
struct Shared {
    feeds: Vec<Feed>,
    active_level: Level,
    params: SimParams,
    state: Mutex<RigState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, RigState> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.step(&mut state);
        state
    }

    fn step(&self, state: &mut RigState) {
        let now = Instant::now();
        let dt = now.duration_since(state.last_step).as_secs_f64();
        state.last_step = now;

        let open = self
            .feeds
            .iter()
            .filter(|f| is_high(&state.outputs, f.pump_pin) && is_high(&state.outputs, f.valve_pin))
            .count();
        state.gross_kg += open as f64 * self.params.flow_rate_kg_s * dt;
    }

    fn flow_level(&self, state: &RigState, pin: u8) -> Option<Level> {
        self.feeds.iter().find(|f| f.flow_pin == pin).map(|f| {
            if is_high(&state.outputs, f.pump_pin) {
                self.active_level
            } else {
                Level::from_bool(!self.active_level.is_high())
            }
        })
    }
}

fn is_high(outputs: &HashMap<u8, Level>, pin: u8) -> bool {
    outputs.get(&pin).copied().unwrap_or_default().is_high()
}

/// Shared handle to the simulated rig. [`SimulatedRig::io`] and
/// [`SimulatedRig::scale`] hand out the two hardware sides.
#[derive(Debug, Clone)]
pub struct SimulatedRig {
    shared: Arc<Shared>,
}

impl SimulatedRig {
    pub fn new(config: &RigConfig, params: SimParams) -> Self {
        let feeds = config
            .components
            .iter()
            .map(|c| Feed {
                pump_pin: c.pump_pin,
                valve_pin: c.valve_pin,
                flow_pin: c.flow_pin,
            })
            .collect();
        let now = Instant::now();
        Self {
            shared: Arc::new(Shared {
                feeds,
                active_level: config.flow_active_level,
                params,
                state: Mutex::new(RigState {
                    outputs: HashMap::new(),
                    gross_kg: params.initial_weight_kg,
                    tare_kg: 0.0,
                    last_step: now,
                    next_line: now,
                    pending: VecDeque::new(),
                }),
            }),
        }
    }

    pub fn io(&self) -> SimIo {
        SimIo {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn scale(&self) -> SimScale {
        SimScale {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Weight the scale would display right now.
    pub fn displayed_kg(&self) -> f64 {
        let state = self.shared.lock();
        state.gross_kg - state.tare_kg
    }

    pub fn output(&self, pin: u8) -> Level {
        self.shared.lock().outputs.get(&pin).copied().unwrap_or_default()
    }
}

pub struct SimIo {
    shared: Arc<Shared>,
}

impl MachineIO for SimIo {
    fn write_output(&mut self, pin: u8, level: Level) {
        self.shared.lock().outputs.insert(pin, level);
    }

    fn read_input(&mut self, pin: u8) -> Level {
        let state = self.shared.lock();
        self.shared.flow_level(&state, pin).unwrap_or_default()
    }
}

pub struct SimScale {
    shared: Arc<Shared>,
}

impl ScaleChannel for SimScale {
    fn read_byte(&mut self, wait: Duration) -> io::Result<Option<u8>> {
        let pause = {
            let mut state = self.shared.lock();
            if let Some(b) = state.pending.pop_front() {
                return Ok(Some(b));
            }
            let now = Instant::now();
            if now >= state.next_line {
                let shown = state.gross_kg - state.tare_kg;
                let sign = if shown < 0.0 { '-' } else { '+' };
                let line = format!("ST,GS,{}  {:06.1} kg\r\n", sign, shown.abs());
                state.pending.extend(line.bytes());
                state.next_line = now + self.shared.params.line_interval;
                return Ok(state.pending.pop_front());
            }
            wait.min(state.next_line - now)
        };
        std::thread::sleep(pause);
        Ok(None)
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        if bytes.starts_with(b"T") {
            let mut state = self.shared.lock();
            state.tare_kg = state.gross_kg;
            state.pending.clear();
        }
        Ok(())
    }
}
