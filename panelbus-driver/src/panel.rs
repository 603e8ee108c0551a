//! Discrete panel signals

/// Snapshot of the appliance's discrete signal levels
///
/// All levels are reported in their asserted sense (`true` = present, lit
/// or held), regardless of the electrical polarity on the pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PanelLevels {
    /// Appliance supply rail present.
    pub supply: bool,
    /// Standby indicator currently lit. The indicator blinks; the stack
    /// derives the standby state from the blink cadence, not the level.
    pub standby: bool,
    /// Red display backlight lit.
    pub red: bool,
    /// White display backlight lit.
    pub white: bool,
    /// Power button currently held down.
    pub power_button: bool,
}

/// Panel signal source and outbound digital signals
///
/// The stack polls [`PanelSignals::levels`] on a fixed period and detects
/// edges itself, so a driver only has to report momentary levels. The poll
/// period is short against every signal of interest; a driver does not
/// need to latch pulses.
pub trait PanelSignals {
    /// Samples all discrete inputs.
    fn levels(&mut self) -> PanelLevels;

    /// Drives the power-button actuator output.
    fn set_actuator(&mut self, on: bool);

    /// Drives the new-data notification line.
    fn set_data_ready(&mut self, on: bool);
}

/// Response-activity indicator
pub trait ActivityOutput {
    fn set(&mut self, on: bool);
}
