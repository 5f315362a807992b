use crate::config::ComponentConfig;
use crate::hal::{Level, MachineIO};

/// One pump and its valve, always switched together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorPair {
    pub pump_pin: u8,
    pub valve_pin: u8,
}

impl ActuatorPair {
    pub fn new(pump_pin: u8, valve_pin: u8) -> Self {
        Self {
            pump_pin,
            valve_pin,
        }
    }

    pub fn for_component(component: &ComponentConfig) -> Self {
        Self::new(component.pump_pin, component.valve_pin)
    }

    pub fn set<IO: MachineIO + ?Sized>(&self, io: &mut IO, on: bool) {
        let level = Level::from_bool(on);
        io.write_output(self.pump_pin, level);
        io.write_output(self.valve_pin, level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingIo;

    #[test]
    fn drives_pump_and_valve_together() {
        let mut io = RecordingIo::new();
        let pair = ActuatorPair::new(2, 6);

        pair.set(&mut io, true);
        assert_eq!(io.output(2), Level::High);
        assert_eq!(io.output(6), Level::High);

        pair.set(&mut io, false);
        pair.set(&mut io, false);
        assert_eq!(io.output(2), Level::Low);
        assert_eq!(io.output(6), Level::Low);
        assert_eq!(io.writes().len(), 6);
    }
}
