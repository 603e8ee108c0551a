//! Panelbus driver interface
//!
//! The crate provides an interface between appliance-facing hardware
//! drivers and the panelbus stack. Limited scope facilitates compatibility
//! across versions. Driver crates should depend on this crate. Panelbus
//! stack users should depend on the `panelbus` crate instead.
//!
//! The stack consumes five hardware channels:
//! * [`capture::StreamCapture`] delivers the fixed-size bulk frames the
//!   appliance clocks out on its display bus
//! * [`capture::RegisterLink`] exchanges one word per cycle with the
//!   appliance's button shift register
//! * [`panel::PanelSignals`] exposes the discrete panel levels and the two
//!   outbound digital signals
//! * [`serial::SerialPort`] carries the fieldbus byte stream
//! * [`panel::ActivityOutput`] drives the response-activity indicator
//!
//! Unlike stacks that own their peripherals, panelbus borrows them through
//! these traits: the integrator constructs the concrete drivers, hands them
//! to the stack's runner objects and spawns the runners on its executors.
//! This keeps pin and peripheral initialization entirely outside the stack
//! and makes every runner drivable by mocks on a host.
//!
//! All async methods must tolerate being dropped before completion. The
//! stack cancels in-flight operations when the capture paths are stopped,
//! so a driver should treat a dropped future as an abort request.

#![no_std]
#![allow(async_fn_in_trait)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod capture;
pub mod panel;
pub mod serial;

pub mod time {
    pub use embassy_time::{Duration, Instant};
}
