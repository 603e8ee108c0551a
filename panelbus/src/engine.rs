//! Acquisition engine
//!
//! Three cooperating runners drive the appliance-facing side:
//!
//! * [`FrameRunner`] owns the bulk capture path and its liveness watchdog
//! * [`WordRunner`] owns the shift-register exchange, the mismatch
//!   classifier and the fail-safe watchdog
//! * [`PanelRunner`] polls the discrete levels, latches status flags,
//!   applies command writes and gates the other two paths
//!
//! [`bind`] wires the hardware channels, the store port and the capture
//! gate together. Run all three runners for proper operation; they may
//! share one executor or be distributed, as long as they stay within the
//! acquisition context (the store port is the only thing they share with
//! the bridge).

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::watch::{Receiver, Sender, Watch};
use panelbus_driver::capture::{RegisterLink, StreamCapture};
use panelbus_driver::panel::PanelSignals;

use crate::config::Config;
use crate::store::AcquisitionPort;

pub mod frame;
pub mod panel;
pub mod word;

pub use frame::FrameRunner;
pub use panel::PanelRunner;
pub use word::WordRunner;

/// Capture paths gated by the status detector.
const GATE_CONSUMERS: usize = 2;

pub(crate) type GateSender<'a, M> = Sender<'a, M, bool, GATE_CONSUMERS>;
pub(crate) type GateReceiver<'a, M> = Receiver<'a, M, bool, GATE_CONSUMERS>;

/// Capture-enable gate
///
/// The status detector is the sole authority for starting and stopping the
/// two capture paths: capture runs while either display color is lit.
/// The gate carries that single boolean from the [`PanelRunner`] to the
/// capture runners. Create one per store, typically in the same static.
pub struct CaptureGate<M: RawMutex> {
    inner: Watch<M, bool, GATE_CONSUMERS>,
}

impl<M: RawMutex> CaptureGate<M> {
    pub const fn new() -> Self {
        Self { inner: Watch::new() }
    }

    pub(crate) fn sender(&self) -> GateSender<'_, M> {
        self.inner.sender()
    }

    pub(crate) fn receiver(&self) -> GateReceiver<'_, M> {
        unwrap!(self.inner.receiver())
    }
}

impl<M: RawMutex> Default for CaptureGate<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves once the gate reads open.
pub(crate) async fn wait_open<M: RawMutex>(gate: &mut GateReceiver<'_, M>) {
    if gate.try_get() == Some(true) {
        return;
    }
    while !gate.changed().await {}
}

/// Resolves once the gate closes.
pub(crate) async fn wait_closed<M: RawMutex>(gate: &mut GateReceiver<'_, M>) {
    while gate.changed().await {}
}

/// Connects the hardware channels to the store and produces the three
/// acquisition runners. Spawn every runner for proper operation.
pub fn bind<'a, M, S, L, P>(
    port: AcquisitionPort<'a, M>,
    gate: &'a CaptureGate<M>,
    stream: S,
    link: L,
    panel: P,
    config: Config,
) -> (
    FrameRunner<'a, M, S>,
    WordRunner<'a, M, L>,
    PanelRunner<'a, M, P>,
)
where
    M: RawMutex,
    S: StreamCapture,
    L: RegisterLink,
    P: PanelSignals,
{
    (
        FrameRunner::new(stream, port, gate.receiver(), config),
        WordRunner::new(link, port, gate.receiver(), config),
        PanelRunner::new(panel, port, gate.sender(), config),
    )
}
