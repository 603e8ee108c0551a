//! Bulk capture path
//!
//! A free-running block transfer resynchronized on every frame: the runner
//! waits for the frame-start edge, idles through the settle delay, then
//! receives one full block. Completion publishes the buffer to the store
//! and feeds the liveness watchdog. Watchdog expiry only drops the live
//! flag; the last published frame stays intact so the bridge keeps serving
//! a stable last-known snapshot.

use embassy_futures::join::join;
use embassy_futures::select::select;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Instant, Timer};
use panelbus_driver::capture::{FRAME_BYTES, StreamCapture};

use crate::config::Config;
use crate::engine::{GateReceiver, wait_closed, wait_open};
use crate::store::AcquisitionPort;
use crate::util::Expiry;

pub struct FrameRunner<'a, M: RawMutex, S: StreamCapture> {
    stream: S,
    buf: [u8; FRAME_BYTES],
    port: AcquisitionPort<'a, M>,
    gate: GateReceiver<'a, M>,
    liveness: Expiry,
    config: Config,
}

impl<'a, M: RawMutex, S: StreamCapture> FrameRunner<'a, M, S> {
    pub(crate) fn new(
        stream: S,
        port: AcquisitionPort<'a, M>,
        gate: GateReceiver<'a, M>,
        config: Config,
    ) -> Self {
        Self {
            stream,
            buf: [0; FRAME_BYTES],
            port,
            gate,
            liveness: Expiry::new(config.stream_watchdog),
            config,
        }
    }

    pub async fn run(&mut self) -> ! {
        let port = self.port;
        let config = self.config;
        let Self {
            stream,
            buf,
            gate,
            liveness,
            ..
        } = self;

        join(
            capture_duty(stream, buf, port, gate, liveness, &config),
            watchdog_duty(liveness, port),
        )
        .await;
        unreachable!()
    }
}

async fn capture_duty<M: RawMutex, S: StreamCapture>(
    stream: &mut S,
    buf: &mut [u8; FRAME_BYTES],
    port: AcquisitionPort<'_, M>,
    gate: &mut GateReceiver<'_, M>,
    liveness: &Expiry,
    config: &Config,
) {
    loop {
        stream.reset();
        wait_open(gate).await;
        debug!("stream capture enabled");
        select(
            stream_frames(stream, buf, port, liveness, config),
            wait_closed(gate),
        )
        .await;
        debug!("stream capture disabled");
    }
}

async fn stream_frames<M: RawMutex, S: StreamCapture>(
    stream: &mut S,
    buf: &mut [u8; FRAME_BYTES],
    port: AcquisitionPort<'_, M>,
    liveness: &Expiry,
    config: &Config,
) {
    loop {
        stream.wait_frame_start().await;
        // the source clock can glitch; arming only after the settle delay
        // resynchronizes within one frame period
        Timer::after(config.resync_delay).await;
        stream.read_frame(buf).await;

        liveness.arm(Instant::now());
        port.set_stream_live(true);
        port.offer_frame(buf);
    }
}

async fn watchdog_duty<M: RawMutex>(liveness: &Expiry, port: AcquisitionPort<'_, M>) {
    loop {
        liveness.expired().await;
        warn!("stream capture silent");
        port.set_stream_live(false);
    }
}
