//! Protocol bridge
//!
//! A request/response server for the Modbus RTU subset the deployed
//! clients speak: read holding registers, read input registers and write
//! single register, on one unit address.
//!
//! Framing is silence-based: bytes accumulate until the line is quiet for
//! two character times; exactly eight bytes form a candidate frame and
//! anything longer restarts accumulation. A frame failing length, address
//! or CRC is dropped without a response; that silence is deliberate and
//! distinct from the exception responses given to valid but illegal
//! requests.
//!
//! The snapshot pages must read consistently across all five page
//! requests, so page 1 takes a deadline lock that holds the frame parser
//! off until page 5 or expiry, and a cursor enforces strict page order
//! within the lock session.

use embassy_futures::join::join;
use embassy_futures::yield_now;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Instant, with_timeout};
use heapless::Vec;
use panelbus_core::{
    COMMAND_REGISTER, ExceptionCode, FunctionCode, PAGE_COUNT, PAGE_STRIDE, PAGE_WORDS,
    STATUS_REGISTER, page_number,
};
use panelbus_driver::panel::ActivityOutput;
use panelbus_driver::serial::SerialPort;

use crate::config::Config;
use crate::crc;
use crate::store::BridgePort;
use crate::util::{Expiry, park_once};

/// Request bytes before the trailer: address, function, register, value.
const REQUEST_BYTES: usize = 6;
/// Complete request frame.
const REQUEST_FRAME: usize = REQUEST_BYTES + crc::Crc16::LENGTH;
/// Largest response: header, one page payload, trailer.
const RESPONSE_CAPACITY: usize = 3 + 2 * PAGE_WORDS + crc::Crc16::LENGTH;

type Response = Vec<u8, RESPONSE_CAPACITY>;

/// Decoded request frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
struct Request {
    function: u8,
    register: u16,
    /// Register count for reads, payload for writes.
    value: u16,
}

/// Checks address and CRC; anything wrong drops the frame silently.
fn validate(frame: &[u8; REQUEST_FRAME], address: u8) -> Option<Request> {
    if frame[0] != address {
        return None;
    }
    if !crc::verify(frame) {
        trace!("dropping frame with bad crc");
        return None;
    }
    Some(Request {
        function: frame[1],
        register: u16::from_be_bytes([frame[2], frame[3]]),
        value: u16::from_be_bytes([frame[4], frame[5]]),
    })
}

/// Byte accumulator with silence framing
struct Accumulator {
    buf: [u8; REQUEST_FRAME + 1],
    len: usize,
}

impl Accumulator {
    const fn new() -> Self {
        Self {
            buf: [0; REQUEST_FRAME + 1],
            len: 0,
        }
    }

    fn push(&mut self, byte: u8) {
        self.buf[self.len] = byte;
        self.len += 1;
        // partial or garbled burst grew too long: start over
        if self.len > REQUEST_FRAME {
            self.len = 0;
        }
    }

    /// Ends the current burst; yields a frame only on an exact-length fit.
    fn flush(&mut self) -> Option<[u8; REQUEST_FRAME]> {
        let frame = (self.len == REQUEST_FRAME).then(|| {
            let mut frame = [0; REQUEST_FRAME];
            frame.copy_from_slice(&self.buf[..REQUEST_FRAME]);
            frame
        });
        self.len = 0;
        frame
    }
}

/// Request dispatcher and page-sequence state
struct Handler<'a, M: RawMutex> {
    port: BridgePort<'a, M>,
    config: Config,
    /// Address of the last page served in the current lock session,
    /// 0 when no sequence is in progress.
    cursor: u16,
}

impl<'a, M: RawMutex> Handler<'a, M> {
    fn new(port: BridgePort<'a, M>, config: Config) -> Self {
        Self {
            port,
            config,
            cursor: 0,
        }
    }

    async fn dispatch(&mut self, request: Request, now: Instant) -> Response {
        match FunctionCode::try_from_u8(request.function) {
            Some(FunctionCode::ReadHoldingRegisters) => self.read_holding(&request),
            Some(FunctionCode::ReadInputRegisters) => self.read_input(&request, now),
            Some(FunctionCode::WriteSingleRegister) => self.write_single(&request).await,
            None => {
                warn!("unsupported function code {}", request.function);
                self.exception(request.function, ExceptionCode::IllegalFunction)
            }
        }
    }

    fn read_holding(&mut self, request: &Request) -> Response {
        if request.register != COMMAND_REGISTER || request.value != 1 {
            return self.exception(request.function, ExceptionCode::IllegalDataAddress);
        }
        self.word_response(request.function, self.port.command_value())
    }

    fn read_input(&mut self, request: &Request, now: Instant) -> Response {
        if request.register == STATUS_REGISTER {
            // any status read abandons a page sequence in progress
            self.cursor = 0;
            if request.value != 1 {
                return self.exception(request.function, ExceptionCode::IllegalDataAddress);
            }
            return self.word_response(request.function, self.port.read_status());
        }
        self.read_page(request, now)
    }

    fn read_page(&mut self, request: &Request, now: Instant) -> Response {
        // an expired lock ends the session; only a fresh page 1 restarts it
        if self.cursor != 0 && !self.port.snapshot_locked(now) {
            self.cursor = 0;
        }

        let Some(page) = page_number(request.register) else {
            return self.exception(request.function, ExceptionCode::IllegalDataAddress);
        };
        let in_sequence =
            request.register == PAGE_STRIDE || request.register == self.cursor + PAGE_STRIDE;
        if request.value as usize != PAGE_WORDS || !in_sequence {
            return self.exception(request.function, ExceptionCode::IllegalDataAddress);
        }

        if page == 1 {
            self.port.lock_snapshot(now + self.config.lock_timeout);
        }

        let mut words = [0u16; PAGE_WORDS];
        self.port.copy_page(page, &mut words);

        if page == PAGE_COUNT {
            self.cursor = 0;
            self.port.unlock_snapshot();
        } else {
            self.cursor = request.register;
        }
        self.page_response(request.function, &words)
    }

    async fn write_single(&mut self, request: &Request) -> Response {
        if request.register != COMMAND_REGISTER {
            return self.exception(request.function, ExceptionCode::IllegalDataAddress);
        }
        self.port.write_command(request.value);

        // the engine acknowledges within one poll period; the bound only
        // guards against a dead acquisition context
        let deadline = Instant::now() + self.config.write_timeout;
        while self.port.write_pending() {
            if Instant::now() >= deadline {
                warn!("write handshake not acknowledged");
                return self.exception(request.function, ExceptionCode::ServerBusy);
            }
            yield_now().await;
        }
        self.echo_response(request, self.port.command_value())
    }

    fn exception(&self, function: u8, code: ExceptionCode) -> Response {
        let mut response = Response::new();
        unwrap!(response.push(self.config.address));
        unwrap!(response.push(function | 0x80));
        unwrap!(response.push(code.into_u8()));
        response
    }

    fn word_response(&self, function: u8, value: u16) -> Response {
        let mut response = Response::new();
        unwrap!(response.push(self.config.address));
        unwrap!(response.push(function));
        unwrap!(response.push(2));
        unwrap!(response.extend_from_slice(&value.to_be_bytes()));
        response
    }

    /// Page words travel in stored byte order, low byte first.
    fn page_response(&self, function: u8, words: &[u16; PAGE_WORDS]) -> Response {
        let mut response = Response::new();
        unwrap!(response.push(self.config.address));
        unwrap!(response.push(function));
        unwrap!(response.push((2 * PAGE_WORDS) as u8));
        for word in words {
            unwrap!(response.extend_from_slice(&word.to_le_bytes()));
        }
        response
    }

    fn echo_response(&self, request: &Request, value: u16) -> Response {
        let mut response = Response::new();
        unwrap!(response.push(self.config.address));
        unwrap!(response.push(request.function));
        unwrap!(response.extend_from_slice(&request.register.to_be_bytes()));
        unwrap!(response.extend_from_slice(&value.to_be_bytes()));
        response
    }
}

/// Fieldbus server runner
pub struct Bridge<'a, M: RawMutex, S: SerialPort, A: ActivityOutput> {
    serial: S,
    indicator: A,
    handler: Handler<'a, M>,
    activity: Expiry,
}

impl<'a, M: RawMutex, S: SerialPort, A: ActivityOutput> Bridge<'a, M, S, A> {
    pub fn new(port: BridgePort<'a, M>, serial: S, indicator: A, config: Config) -> Self {
        Self {
            serial,
            indicator,
            handler: Handler::new(port, config),
            activity: Expiry::new(config.activity_time),
        }
    }

    pub async fn run(&mut self) -> ! {
        let Self {
            serial,
            indicator,
            handler,
            activity,
        } = self;

        join(
            serve_duty(serial, handler, activity),
            indicate_duty(indicator, activity),
        )
        .await;
        unreachable!()
    }
}

async fn serve_duty<M: RawMutex, S: SerialPort>(
    serial: &mut S,
    handler: &mut Handler<'_, M>,
    activity: &Expiry,
) {
    let silence = handler.config.byte_silence();
    let mut accumulator = Accumulator::new();

    loop {
        match with_timeout(silence, serial.read()).await {
            Ok(byte) => accumulator.push(byte),
            Err(_) => {
                let Some(frame) = accumulator.flush() else {
                    continue;
                };
                let Some(request) = validate(&frame, handler.config.address) else {
                    continue;
                };
                let mut response = handler.dispatch(request, Instant::now()).await;
                crc::append(&mut response);
                serial.write(&response).await;
                activity.arm(Instant::now());
            }
        }
    }
}

/// Holds the indicator on while the activity deadline is armed; the
/// minimum on-time retriggers with every handled request.
async fn indicate_duty<A: ActivityOutput>(indicator: &mut A, activity: &Expiry) {
    loop {
        if activity.is_armed() {
            indicator.set(true);
            activity.expired().await;
            indicator.set(false);
        } else {
            park_once().await;
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use embassy_time::Duration;
    use futures_executor::block_on;
    use panelbus_core::{StatusWord, page_address};
    use panelbus_driver::capture::FRAME_BYTES;

    use super::*;
    use crate::store::{AcquisitionPort, RegisterStore};

    fn ts(us: u64) -> Instant {
        Instant::MIN + Duration::from_micros(us)
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.write_timeout = Duration::from_micros(500);
        config
    }

    fn read_request(function: u8, register: u16, count: u16) -> Request {
        Request {
            function,
            register,
            value: count,
        }
    }

    fn page_request(page: usize) -> Request {
        read_request(4, page_address(page), PAGE_WORDS as u16)
    }

    fn dispatch<'a, M: RawMutex>(
        handler: &mut Handler<'a, M>,
        request: Request,
        now: Instant,
    ) -> Response {
        block_on(handler.dispatch(request, now))
    }

    fn publish_frame<M: RawMutex>(acq: AcquisitionPort<'_, M>, fill: u8, now: Instant) {
        let mut frame = [fill; FRAME_BYTES];
        frame[0] = fill.wrapping_add(1);
        assert!(acq.offer_frame(&frame));
        assert!(acq.parse_pending(now));
    }

    #[test]
    fn test_validate_and_framing() {
        let mut frame: heapless::Vec<u8, REQUEST_FRAME> = heapless::Vec::new();
        frame
            .extend_from_slice(&[0x02, 0x04, 0x00, 0x00, 0x00, 0x01])
            .unwrap();
        crc::append(&mut frame);
        let frame: [u8; REQUEST_FRAME] = frame.as_slice().try_into().unwrap();

        let request = validate(&frame, 2).unwrap();
        assert_eq!(request, read_request(4, 0, 1));

        // wrong unit address: silence
        assert!(validate(&frame, 9).is_none());

        // bit error: silence
        let mut corrupted = frame;
        corrupted[4] ^= 0x10;
        assert!(validate(&corrupted, 2).is_none());
    }

    #[test]
    fn test_accumulator_restarts_on_overflow() {
        let mut accumulator = Accumulator::new();
        for byte in 0..REQUEST_FRAME as u8 {
            accumulator.push(byte);
        }
        assert!(accumulator.flush().is_some());

        // nine bytes in one burst is not a frame
        for byte in 0..=REQUEST_FRAME as u8 {
            accumulator.push(byte);
        }
        assert!(accumulator.flush().is_none());

        // short burst is not a frame either
        accumulator.push(1);
        assert!(accumulator.flush().is_none());
    }

    #[test]
    fn test_status_read_wire_format() {
        let mut store = RegisterStore::<NoopRawMutex>::new();
        let (_acq, bridge) = store.split();
        let mut handler = Handler::new(bridge, config());

        let mut response = dispatch(&mut handler, read_request(4, 0, 1), ts(0));
        assert_eq!(&response[..], &[0x02, 0x04, 0x02, 0x00, 0x00]);
        crc::append(&mut response);
        assert!(crc::verify(&response));
    }

    #[test]
    fn test_illegal_function() {
        let mut store = RegisterStore::<NoopRawMutex>::new();
        let (_acq, bridge) = store.split();
        let mut handler = Handler::new(bridge, config());

        let response = dispatch(&mut handler, read_request(0x11, 0, 1), ts(0));
        assert_eq!(&response[..], &[0x02, 0x91, 0x01]);
    }

    #[test]
    fn test_status_read_clears_latches_and_validates_count() {
        let mut store = RegisterStore::<NoopRawMutex>::new();
        let (acq, bridge) = store.split();
        let mut handler = Handler::new(bridge, config());

        acq.set_button_inputs(StatusWord::PUSH_FAILED | 0x01);
        let response = dispatch(&mut handler, read_request(4, 0, 1), ts(0));
        let word = u16::from_be_bytes([response[3], response[4]]);
        assert!(StatusWord::unpack(word).push_failed);
        assert!(!acq.status().push_failed);

        // count must still be validated
        let response = dispatch(&mut handler, read_request(4, 0, 2), ts(0));
        assert_eq!(response[1], 0x84);
        assert_eq!(response[2], 2);
    }

    #[test]
    fn test_command_round_trip() {
        let mut store = RegisterStore::<NoopRawMutex>::new();
        let (acq, bridge) = store.split();
        let mut handler = Handler::new(bridge, config());

        let write = Request {
            function: 6,
            register: 0,
            value: 0x0412,
        };
        let response = block_on(async {
            join(handler.dispatch(write, ts(0)), async {
                while !acq.write_requested() {
                    yield_now().await;
                }
                acq.acknowledge_write();
            })
            .await
            .0
        });
        assert_eq!(&response[..], &[0x02, 0x06, 0x00, 0x00, 0x04, 0x12]);

        // reading the holding register returns the written pattern
        let response = dispatch(&mut handler, read_request(3, 0, 1), ts(10));
        assert_eq!(&response[..], &[0x02, 0x03, 0x02, 0x04, 0x12]);
    }

    #[test]
    fn test_write_handshake_timeout() {
        let mut store = RegisterStore::<NoopRawMutex>::new();
        let (_acq, bridge) = store.split();
        let mut handler = Handler::new(bridge, config());

        let write = Request {
            function: 6,
            register: 0,
            value: 0x0001,
        };
        // nobody acknowledges
        let response = dispatch(&mut handler, write, ts(0));
        assert_eq!(
            &response[..],
            &[0x02, 0x86, ExceptionCode::ServerBusy.into_u8()]
        );
    }

    #[test]
    fn test_write_wrong_register() {
        let mut store = RegisterStore::<NoopRawMutex>::new();
        let (_acq, bridge) = store.split();
        let mut handler = Handler::new(bridge, config());

        let write = Request {
            function: 6,
            register: 7,
            value: 0x0001,
        };
        let response = dispatch(&mut handler, write, ts(0));
        assert_eq!(&response[..], &[0x02, 0x86, 0x02]);
    }

    #[test]
    fn test_page_sequence_in_order() {
        let mut store = RegisterStore::<NoopRawMutex>::new();
        let (acq, bridge) = store.split();
        let mut handler = Handler::new(bridge, config());
        publish_frame(acq, 0x10, ts(0));

        for page in 1..=PAGE_COUNT {
            let response = dispatch(&mut handler, page_request(page), ts(10));
            assert_eq!(response[1], 0x04, "page {page} rejected");
            assert_eq!(response[2], (2 * PAGE_WORDS) as u8);
        }
        // sequence complete: snapshot retired and lock released
        assert!(!handler.port.snapshot_locked(ts(11)));
        assert!(!acq.unread_any());
    }

    #[test]
    fn test_page_out_of_order_rejected() {
        let mut store = RegisterStore::<NoopRawMutex>::new();
        let (acq, bridge) = store.split();
        let mut handler = Handler::new(bridge, config());
        publish_frame(acq, 0x22, ts(0));

        // page 3 without a page 1 first
        let response = dispatch(&mut handler, page_request(3), ts(10));
        assert_eq!(&response[..], &[0x02, 0x84, 0x02]);

        dispatch(&mut handler, page_request(1), ts(10));
        dispatch(&mut handler, page_request(2), ts(11));
        // skipping a page breaks the sequence
        let response = dispatch(&mut handler, page_request(4), ts(12));
        assert_eq!(&response[..], &[0x02, 0x84, 0x02]);

        // wrong count breaks it too
        let response = dispatch(&mut handler, read_request(4, 3000, 1), ts(13));
        assert_eq!(&response[..], &[0x02, 0x84, 0x02]);
    }

    #[test]
    fn test_lock_expiry_recovers() {
        let mut store = RegisterStore::<NoopRawMutex>::new();
        let (acq, bridge) = store.split();
        let mut handler = Handler::new(bridge, config());
        let lock_us = handler.config.lock_timeout.as_micros();
        publish_frame(acq, 0x33, ts(0));

        dispatch(&mut handler, page_request(1), ts(10));
        dispatch(&mut handler, page_request(2), ts(20));
        assert!(handler.port.snapshot_locked(ts(30)));

        // client disappears; the parser is released by the deadline alone
        assert!(!handler.port.snapshot_locked(ts(10 + lock_us)));
        publish_frame(acq, 0x44, ts(10 + lock_us));

        // resuming the stale sequence is rejected
        let response = dispatch(&mut handler, page_request(3), ts(20 + lock_us));
        assert_eq!(&response[..], &[0x02, 0x84, 0x02]);

        // a fresh page 1 starts a new session serving the reparsed data
        let response = dispatch(&mut handler, page_request(1), ts(20 + lock_us));
        assert_eq!(response[1], 0x04);
        assert_eq!(response[3], 0x44);
        assert_eq!(response[4], 0x45);
    }

    #[test]
    fn test_status_read_aborts_page_sequence() {
        let mut store = RegisterStore::<NoopRawMutex>::new();
        let (acq, bridge) = store.split();
        let mut handler = Handler::new(bridge, config());
        publish_frame(acq, 0x55, ts(0));

        dispatch(&mut handler, page_request(1), ts(10));
        dispatch(&mut handler, read_request(4, 0, 1), ts(11));
        let response = dispatch(&mut handler, page_request(2), ts(12));
        assert_eq!(&response[..], &[0x02, 0x84, 0x02]);
    }

    #[test]
    fn test_page_payload_byte_order() {
        let mut store = RegisterStore::<NoopRawMutex>::new();
        let (acq, bridge) = store.split();
        let mut handler = Handler::new(bridge, config());

        let mut frame = [0u8; FRAME_BYTES];
        frame[0] = 0xab;
        frame[1] = 0xcd;
        assert!(acq.offer_frame(&frame));
        assert!(acq.parse_pending(ts(0)));

        let response = dispatch(&mut handler, page_request(1), ts(10));
        // device pair [ab, cd] is exported as the word 0xabcd, sent low
        // byte first
        assert_eq!(response[3], 0xcd);
        assert_eq!(response[4], 0xab);
    }
}
