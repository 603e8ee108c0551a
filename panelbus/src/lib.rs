//! # Panelbus
//!
//! This library bridges a proprietary appliance's internal electrical
//! signals (a segment-display serial bus and a shift-register button
//! interface) to a Modbus RTU fieldbus client. It targets no_std
//! environments with two independent execution contexts, no allocator and
//! microsecond-scale deadlines; all buffers are fixed-size and owned for
//! the process lifetime.
//!
//! ## Architecture
//!
//! ```text
//!  appliance side                                      fieldbus side
//!
//! ┌───────────────┐   ┌─────────────┐
//! │ StreamCapture ├──►│ FrameRunner ├──┐
//! └───────────────┘   └─────────────┘  │
//! ┌───────────────┐   ┌─────────────┐  │  ┌───────────────┐
//! │ RegisterLink  ├──►│ WordRunner  ├──┼─►│               │   ┌────────┐
//! └───────────────┘   └─────────────┘  │  │ RegisterStore │◄──┤ Bridge │◄─► SerialPort
//! ┌───────────────┐   ┌─────────────┐  │  │               │   └────────┘
//! │ PanelSignals  ├──►│ PanelRunner ├──┘  └───────────────┘
//! └───────────────┘   └──────┬──────┘
//!                            │ capture gate
//!                            ▼
//!                     FrameRunner, WordRunner
//! ```
//!
//! Components:
//! * [`store::RegisterStore`] holds the shared register model: the input
//!   status word, the command word, the five snapshot pages and the
//!   coordination flags. [`store::RegisterStore::split`] yields one
//!   role-typed handle per execution context.
//! * [`engine::FrameRunner`] drives the self-resynchronizing bulk capture
//!   cycle and its liveness watchdog.
//! * [`engine::WordRunner`] drives the periodic shift-register exchange,
//!   the mismatch classifier and the fail-safe watchdog.
//! * [`engine::PanelRunner`] polls the discrete panel levels, owns the
//!   status detector, applies command writes to the actuator output,
//!   invokes the frame parser and is the sole start/stop authority for
//!   both capture paths.
//! * [`bridge::Bridge`] serves the fieldbus: silence-framed request
//!   accumulation, validation, dispatch and the strict multi-page snapshot
//!   read protocol.
//!
//! The runners never call each other. The acquisition side and the bridge
//! interact only through the [`store::RegisterStore`]; within the
//! acquisition side, the capture-enable gate is the single additional
//! channel.
//!
//! ## Concurrency model
//!
//! Every store access is one short blocking-mutex critical section; the
//! mutex flavor is generic, so a single-executor integration can use
//! `NoopRawMutex` while a cross-core or interrupt-mixed integration uses
//! `CriticalSectionRawMutex`. Each store field has exactly one writing
//! role. The two genuine multi-writer points are explicit: the snapshot
//! lock (a deadline the bridge arms and the parser observes) and the write
//! handshake flag (set by the bridge, cleared by the engine). No runner
//! ever blocks inside a completion path; the one blocking operation in the
//! system is the bridge's bounded wait for write acknowledgement.
//!
//! All timeout decisions take `Instant` parameters, so the decision logic
//! runs unmodified under host tests with synthetic time.
//!
//! ## Integration
//!
//! The integrator owns the store, the gate and the concrete drivers, and
//! spawns the four runners on its executors:
//!
//! ```
//! use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
//! use panelbus::bridge::Bridge;
//! use panelbus::config::Config;
//! use panelbus::driver::capture::{RegisterLink, StreamCapture};
//! use panelbus::driver::panel::{ActivityOutput, PanelSignals};
//! use panelbus::driver::serial::SerialPort;
//! use panelbus::engine::{self, CaptureGate};
//! use panelbus::store::RegisterStore;
//!
//! async fn integrate(
//!     stream: impl StreamCapture,
//!     link: impl RegisterLink,
//!     panel: impl PanelSignals,
//!     serial: impl SerialPort,
//!     led: impl ActivityOutput,
//! ) {
//!     let store = Box::leak(Box::new(
//!         RegisterStore::<CriticalSectionRawMutex>::new(),
//!     ));
//!     let gate = Box::leak(Box::new(CaptureGate::new()));
//!     let (acquisition, exchange) = store.split();
//!
//!     let config = Config::default();
//!     let (mut frames, mut words, mut detector) =
//!         engine::bind(acquisition, gate, stream, link, panel, config);
//!     let mut bridge = Bridge::new(exchange, serial, led, config);
//!
//!     // spawn on the acquisition executor:
//!     //   frames.run(), words.run(), detector.run()
//!     // spawn on the protocol executor:
//!     //   bridge.run()
//!     let _ = (frames.run(), words.run(), detector.run(), bridge.run());
//! }
//! ```

#![no_std]

pub use panelbus_core as core;
pub use panelbus_driver as driver;
pub use panelbus_driver::time;

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod bridge;
pub mod config;
pub mod crc;
pub mod engine;
pub mod parse;
pub mod store;
pub mod util;
