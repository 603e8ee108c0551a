//! Status detector and poll loop
//!
//! The one place in the engine that runs on a schedule instead of on
//! hardware completions. Each tick samples the discrete levels, latches
//! transitions into the status word exactly once, arbitrates the capture
//! gate, applies pending command writes to the actuator output, completes
//! expired press releases, runs the frame parser and drives the new-data
//! line.
//!
//! Standby needs more than a level: the indicator blinks, so standby is
//! held active by rising edges and declared over when no edge arrives
//! within the blink timeout.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Instant, Timer};
use panelbus_driver::panel::{PanelLevels, PanelSignals};

use crate::config::Config;
use crate::engine::GateSender;
use crate::store::AcquisitionPort;

pub struct PanelRunner<'a, M: RawMutex, P: PanelSignals> {
    panel: P,
    port: AcquisitionPort<'a, M>,
    gate: GateSender<'a, M>,
    last: PanelLevels,
    capturing: bool,
    standby_deadline: Option<Instant>,
    release_deadline: Option<Instant>,
    last_status: u16,
    config: Config,
}

impl<'a, M: RawMutex, P: PanelSignals> PanelRunner<'a, M, P> {
    pub(crate) fn new(
        panel: P,
        port: AcquisitionPort<'a, M>,
        gate: GateSender<'a, M>,
        config: Config,
    ) -> Self {
        Self {
            panel,
            port,
            gate,
            last: PanelLevels::default(),
            capturing: false,
            standby_deadline: None,
            release_deadline: None,
            last_status: 0,
            config,
        }
    }

    pub async fn run(&mut self) -> ! {
        loop {
            Timer::after(self.config.poll_period).await;
            self.tick(Instant::now());
        }
    }

    fn tick(&mut self, now: Instant) {
        let levels = self.panel.levels();
        self.detect(levels, now);
        self.command_update(now);
        self.port.parse_pending(now);
        self.refresh_unread();
        self.panel.set_data_ready(self.port.unread_any());
    }

    fn detect(&mut self, levels: PanelLevels, now: Instant) {
        let last = self.last;

        if levels.supply != last.supply {
            self.port.set_supply_present(levels.supply);
        }
        if levels.red != last.red {
            self.port.set_red_lit(levels.red);
        }
        if levels.white != last.white {
            self.port.set_white_lit(levels.white);
        }

        if levels.standby && !last.standby {
            self.port.set_standby(true);
            self.standby_deadline = Some(now + self.config.standby_timeout);
        }
        if self.standby_deadline.is_some_and(|deadline| now >= deadline) {
            self.standby_deadline = None;
            self.port.set_standby(false);
        }

        if levels.power_button != last.power_button {
            self.port.set_power_button(levels.power_button);
        }

        self.last = levels;

        // sole start/stop authority for the capture paths: run while
        // either display color is lit, full stop otherwise
        let lit = levels.red || levels.white;
        if lit != self.capturing {
            self.capturing = lit;
            debug!("capture gate: {}", lit);
            self.gate.send(lit);
        }
    }

    fn command_update(&mut self, now: Instant) {
        if self.port.write_requested() {
            self.apply_command(now);
            self.port.acknowledge_write();
        }

        if self.release_deadline.is_some_and(|deadline| now >= deadline) {
            self.release_deadline = None;
            self.port.complete_release();
            self.panel.set_actuator(false);
        }
    }

    fn apply_command(&mut self, now: Instant) {
        let command = self.port.command();

        // cannot push buttons through a dead register path
        if command.buttons != 0 && !self.port.status().register_live {
            self.port.set_push_failed();
        }

        self.release_deadline = None;
        self.panel.set_actuator(command.power_button);
        if (command.buttons != 0 || command.power_button) && !command.hold {
            self.release_deadline = Some(now + self.config.release_after);
        }
    }

    fn refresh_unread(&mut self) {
        let status = self.port.status_bits();
        if status != self.last_status {
            self.last_status = status;
            self.port.mark_unread_status();
        }
    }
}
