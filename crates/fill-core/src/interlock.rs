use crate::hal::{Level, MachineIO};

/// Flow-switch interlock for one stage: the stage's own switch and the
/// switch of the other pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowInterlock {
    pub own_pin: u8,
    pub opposite_pin: u8,
    pub active_level: Level,
    pub ignore_flows: bool,
}

impl FlowInterlock {
    pub fn new(own_pin: u8, opposite_pin: u8, active_level: Level, ignore_flows: bool) -> Self {
        Self {
            own_pin,
            opposite_pin,
            active_level,
            ignore_flows,
        }
    }

    pub fn enabled(&self) -> bool {
        !self.ignore_flows
    }

    /// Own switch reads the active level. Always false when flows are ignored.
    pub fn has_started<IO: MachineIO + ?Sized>(&self, io: &mut IO) -> bool {
        self.enabled() && io.read_input(self.own_pin) == self.active_level
    }

    /// The other pump's switch reads the active level.
    pub fn opposing_active<IO: MachineIO + ?Sized>(&self, io: &mut IO) -> bool {
        self.enabled() && io.read_input(self.opposite_pin) == self.active_level
    }

    /// Same pins with the roles swapped, for the other stage.
    pub fn swapped(&self) -> Self {
        Self {
            own_pin: self.opposite_pin,
            opposite_pin: self.own_pin,
            ..*self
        }
    }
}
