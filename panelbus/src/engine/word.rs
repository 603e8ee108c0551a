//! Register capture path
//!
//! Each cycle shifts the commanded button byte out to the appliance while
//! sampling the raw input word back. The derived button byte keeps the
//! sticky latches of the previous status word and is compared against the
//! commanded byte; a short run of mismatches is tolerated as transient
//! noise before a fault is classified. Watchdog expiry force-clears the
//! button bits on both words: a request must never stay asserted against a
//! silent interface.

use embassy_futures::join::join;
use embassy_futures::select::select;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Instant;
use panelbus_core::StatusWord;
use panelbus_driver::capture::RegisterLink;

use crate::config::Config;
use crate::engine::{GateReceiver, wait_closed, wait_open};
use crate::store::AcquisitionPort;
use crate::util::Expiry;

pub struct WordRunner<'a, M: RawMutex, L: RegisterLink> {
    link: L,
    port: AcquisitionPort<'a, M>,
    gate: GateReceiver<'a, M>,
    liveness: Expiry,
    config: Config,
}

impl<'a, M: RawMutex, L: RegisterLink> WordRunner<'a, M, L> {
    pub(crate) fn new(
        link: L,
        port: AcquisitionPort<'a, M>,
        gate: GateReceiver<'a, M>,
        config: Config,
    ) -> Self {
        Self {
            link,
            port,
            gate,
            liveness: Expiry::new(config.register_watchdog),
            config,
        }
    }

    pub async fn run(&mut self) -> ! {
        let port = self.port;
        let config = self.config;
        let Self {
            link,
            gate,
            liveness,
            ..
        } = self;

        join(
            exchange_duty(link, port, gate, liveness, &config),
            watchdog_duty(liveness, port),
        )
        .await;
        unreachable!()
    }
}

async fn exchange_duty<M: RawMutex, L: RegisterLink>(
    link: &mut L,
    port: AcquisitionPort<'_, M>,
    gate: &mut GateReceiver<'_, M>,
    liveness: &Expiry,
    config: &Config,
) {
    let mut mismatch_run = 0;
    loop {
        link.reset();
        wait_open(gate).await;
        mismatch_run = 0;
        select(
            exchange_cycles(link, port, liveness, config, &mut mismatch_run),
            wait_closed(gate),
        )
        .await;
        port.clear_button_inputs();
    }
}

async fn exchange_cycles<M: RawMutex, L: RegisterLink>(
    link: &mut L,
    port: AcquisitionPort<'_, M>,
    liveness: &Expiry,
    config: &Config,
    mismatch_run: &mut u32,
) {
    loop {
        let command = port.command().buttons;
        let raw = link.exchange(command).await;
        liveness.arm(Instant::now());
        process_reading(raw, port, mismatch_run, config.mismatch_tolerance);
    }
}

async fn watchdog_duty<M: RawMutex>(liveness: &Expiry, port: AcquisitionPort<'_, M>) {
    loop {
        liveness.expired().await;
        warn!("register path silent, force-clearing button requests");
        port.register_fail_safe();
    }
}

fn process_reading<M: RawMutex>(
    raw: u32,
    port: AcquisitionPort<'_, M>,
    mismatch_run: &mut u32,
    tolerance: u32,
) {
    let status = port.status();
    // active-low device, button byte in the top bits
    let sampled = ((!raw) >> 24) as u8;
    let mut byte = (sampled & StatusWord::BUTTON_MASK)
        | (status.button_byte() & !StatusWord::BUTTON_MASK);

    let requested = port.command().buttons;
    match classify(byte, requested, mismatch_run, tolerance) {
        Verdict::PushFailed => byte |= StatusWord::PUSH_FAILED,
        Verdict::ManualPress => byte |= StatusWord::MANUAL_PRESS,
        Verdict::Matched | Verdict::Tolerated => {}
    }
    port.set_button_inputs(byte);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum Verdict {
    Matched,
    /// Mismatch within the noise tolerance.
    Tolerated,
    /// Buttons were requested but none registered.
    PushFailed,
    /// A button not matching the request is pressed.
    ManualPress,
}

/// Compares the derived button byte (latches overlaid) against the
/// requested one, tracking the consecutive mismatch run.
fn classify(observed: u8, requested: u8, run: &mut u32, tolerance: u32) -> Verdict {
    if observed == requested {
        *run = 0;
        return Verdict::Matched;
    }
    *run = run.saturating_add(1);
    if *run < tolerance {
        return Verdict::Tolerated;
    }
    if observed == 0 && requested != 0 {
        Verdict::PushFailed
    } else {
        Verdict::ManualPress
    }
}
