use serde::{Deserialize, Serialize};
use std::io;
use std::time::Duration;

/// Logic level of a digital pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    #[default]
    Low,
    High,
}

impl Level {
    pub fn from_bool(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }

    pub fn is_high(self) -> bool {
        matches!(self, Level::High)
    }
}

/// Digital outputs (pumps, valves) and inputs (flow switches).
///
/// Output writes are assumed to succeed; a transport that can fail is
/// expected to log and carry on. Reads always produce a level.
pub trait MachineIO {
    fn write_output(&mut self, pin: u8, level: Level);
    fn read_input(&mut self, pin: u8) -> Level;
}

/// Byte-level access to the scale's serial line.
pub trait ScaleChannel {
    /// Wait up to `wait` for one byte. `Ok(None)` means nothing arrived.
    fn read_byte(&mut self, wait: Duration) -> io::Result<Option<u8>>;

    /// Send raw bytes to the scale (used for the tare command).
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;
}

impl<T: MachineIO + ?Sized> MachineIO for &mut T {
    fn write_output(&mut self, pin: u8, level: Level) {
        (**self).write_output(pin, level)
    }

    fn read_input(&mut self, pin: u8) -> Level {
        (**self).read_input(pin)
    }
}

impl<T: ScaleChannel + ?Sized> ScaleChannel for Box<T> {
    fn read_byte(&mut self, wait: Duration) -> io::Result<Option<u8>> {
        (**self).read_byte(wait)
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write_all(bytes)
    }
}

impl<T: MachineIO + ?Sized> MachineIO for Box<T> {
    fn write_output(&mut self, pin: u8, level: Level) {
        (**self).write_output(pin, level)
    }

    fn read_input(&mut self, pin: u8) -> Level {
        (**self).read_input(pin)
    }
}
