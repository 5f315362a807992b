//! Scripted hardware for unit tests.

use crate::hal::{Level, MachineIO, ScaleChannel};
use crate::orchestrator::Recorder;
use crate::stage::StageResult;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::rc::Rc;
use std::time::Duration;

type Inputs = Rc<RefCell<HashMap<u8, Level>>>;

/// Digital I/O that records every write and serves inputs from a shared map.
pub struct RecordingIo {
    inputs: Inputs,
    outputs: HashMap<u8, Level>,
    writes: Vec<(u8, Level)>,
    reads: Vec<u8>,
    links: Vec<(u8, u8, Level)>,
}

impl RecordingIo {
    pub fn new() -> Self {
        Self {
            inputs: Rc::new(RefCell::new(HashMap::new())),
            outputs: HashMap::new(),
            writes: Vec::new(),
            reads: Vec::new(),
            links: Vec::new(),
        }
    }

    /// Make `flow_pin` follow `pump_pin`: active while the pump is on.
    pub fn link(mut self, pump_pin: u8, flow_pin: u8, active: Level) -> Self {
        self.links.push((pump_pin, flow_pin, active));
        self
    }

    pub fn set_input(&mut self, pin: u8, level: Level) {
        self.inputs.borrow_mut().insert(pin, level);
    }

    pub fn shared_inputs(&self) -> Inputs {
        Rc::clone(&self.inputs)
    }

    pub fn output(&self, pin: u8) -> Level {
        self.outputs.get(&pin).copied().unwrap_or_default()
    }

    pub fn writes(&self) -> &[(u8, Level)] {
        &self.writes
    }

    pub fn reads(&self) -> &[u8] {
        &self.reads
    }

    pub fn all_low(&self) -> bool {
        self.outputs.values().all(|l| *l == Level::Low)
    }

    pub fn energized_writes(&self, pin: u8) -> usize {
        self.writes
            .iter()
            .filter(|(p, l)| *p == pin && *l == Level::High)
            .count()
    }
}

impl MachineIO for RecordingIo {
    fn write_output(&mut self, pin: u8, level: Level) {
        self.outputs.insert(pin, level);
        self.writes.push((pin, level));
        for (pump, flow, active) in &self.links {
            if *pump == pin {
                let flow_level = if level.is_high() {
                    *active
                } else {
                    Level::from_bool(!active.is_high())
                };
                self.inputs.borrow_mut().insert(*flow, flow_level);
            }
        }
    }

    fn read_input(&mut self, pin: u8) -> Level {
        self.reads.push(pin);
        self.inputs.borrow().get(&pin).copied().unwrap_or_default()
    }
}

enum Feed {
    Bytes(VecDeque<u8>),
    Silence(Duration),
    Input(u8, Level),
}

/// Scale channel that replays a script of lines, silences and input changes.
///
/// Input changes take effect when the scale reaches them in the script, so a
/// test can flip a flow switch between two weight lines.
pub struct ScriptedScale {
    script: VecDeque<Feed>,
    inputs: Option<Inputs>,
    written: Vec<u8>,
}

impl ScriptedScale {
    pub fn silent() -> Self {
        Self {
            script: VecDeque::new(),
            inputs: None,
            written: Vec::new(),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut scale = Self::silent();
        scale.script.push_back(Feed::Bytes(bytes.iter().copied().collect()));
        scale
    }

    pub fn weights(weights: &[f64]) -> Self {
        let mut scale = Self::silent();
        for w in weights {
            scale = scale.weight(*w);
        }
        scale
    }

    pub fn weight(self, kg: f64) -> Self {
        self.line(&format!("ST,GS,+  {:06.1} kg", kg))
    }

    pub fn line(mut self, line: &str) -> Self {
        let mut bytes: VecDeque<u8> = line.bytes().collect();
        bytes.extend(b"\r\n");
        self.script.push_back(Feed::Bytes(bytes));
        self
    }

    pub fn silence(mut self, window: Duration) -> Self {
        self.script.push_back(Feed::Silence(window));
        self
    }

    /// Set `pin` to `level` on the attached I/O once the script reaches here.
    pub fn input(mut self, io: &RecordingIo, pin: u8, level: Level) -> Self {
        self.inputs = Some(io.shared_inputs());
        self.script.push_back(Feed::Input(pin, level));
        self
    }

    pub fn written(&self) -> &[u8] {
        &self.written
    }

    pub fn exhausted(&self) -> bool {
        self.script.is_empty()
    }
}

impl ScaleChannel for ScriptedScale {
    fn read_byte(&mut self, wait: Duration) -> io::Result<Option<u8>> {
        loop {
            match self.script.front_mut() {
                None => {
                    std::thread::sleep(wait);
                    return Ok(None);
                }
                Some(Feed::Input(pin, level)) => {
                    if let Some(inputs) = &self.inputs {
                        inputs.borrow_mut().insert(*pin, *level);
                    }
                    self.script.pop_front();
                }
                Some(Feed::Bytes(bytes)) => {
                    let next = bytes.pop_front();
                    if bytes.is_empty() {
                        self.script.pop_front();
                    }
                    if let Some(b) = next {
                        return Ok(Some(b));
                    }
                }
                Some(Feed::Silence(remaining)) => {
                    let step = wait.min(*remaining);
                    *remaining -= step;
                    if remaining.is_zero() {
                        self.script.pop_front();
                    }
                    std::thread::sleep(step);
                    return Ok(None);
                }
            }
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.written.extend_from_slice(bytes);
        Ok(())
    }
}

/// Recorder that keeps outcomes in memory.
#[derive(Default)]
pub struct MemoryRecorder {
    /// Stage names and total for each successful batch.
    pub successes: Vec<(Vec<String>, f64)>,
    /// Reason, weight and stage delta for each failed batch.
    pub errors: Vec<(String, f64, f64)>,
}

impl Recorder for MemoryRecorder {
    fn record_success(&mut self, stages: &[StageResult], total_kg: f64) -> io::Result<()> {
        let names = stages.iter().map(|s| s.name.clone()).collect();
        self.successes.push((names, total_kg));
        Ok(())
    }

    fn record_error(&mut self, reason: &str, weight_kg: f64, stage_delta_kg: f64) -> io::Result<()> {
        self.errors.push((reason.to_string(), weight_kg, stage_delta_kg));
        Ok(())
    }
}
