//! Shared register model
//!
//! The store is the only meeting point of the two execution contexts. It
//! owns the status word, the command word, the captured frame, the
//! snapshot pages and the coordination flags, and it hands out one
//! role-typed port per context:
//!
//! * [`AcquisitionPort`] for the engine runners (status writer, command
//!   fail-safe writer, frame publisher and parser trigger)
//! * [`BridgePort`] for the protocol bridge (status/snapshot reader,
//!   command writer, snapshot lock owner)
//!
//! Every access is one short critical section on a blocking mutex; the
//! mutex flavor is generic so the integrator picks the cheapest one that
//! covers its execution contexts. Field ownership is single-writer per
//! role; the snapshot lock and the write-request flag are the two points
//! where the roles deliberately meet.
//!
//! The snapshot lock is a deadline, not a plain flag: the bridge arms it
//! with an expiry instant and both sides observe expiry lazily. This keeps
//! the bounded-unlock guarantee without a timer task.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Instant;
use panelbus_core::{CommandWord, PAGE_COUNT, PAGE_WORDS, StatusWord};
use panelbus_driver::capture::FRAME_BYTES;

use crate::parse;

struct Inner {
    status: StatusWord,
    command: u16,
    frame: [u8; FRAME_BYTES],
    frame_pending: bool,
    pages: [[u16; PAGE_WORDS]; PAGE_COUNT],
    lock_deadline: Option<Instant>,
    unread_status: bool,
    unread_snapshot: bool,
    write_request: bool,
}

impl Inner {
    const fn new() -> Self {
        Self {
            status: StatusWord::unpack(0),
            command: 0,
            frame: [0; FRAME_BYTES],
            frame_pending: false,
            pages: [[0; PAGE_WORDS]; PAGE_COUNT],
            lock_deadline: None,
            unread_status: false,
            unread_snapshot: false,
            write_request: false,
        }
    }

    fn snapshot_locked(&mut self, now: Instant) -> bool {
        match self.lock_deadline {
            None => false,
            Some(deadline) if now < deadline => true,
            Some(_) => {
                // abandoned read sequence; expiry observed lazily
                self.lock_deadline = None;
                false
            }
        }
    }
}

/// Process-wide register store, created once with zeroed defaults.
pub struct RegisterStore<M: RawMutex> {
    inner: Mutex<M, RefCell<Inner>>,
}

impl<M: RawMutex> RegisterStore<M> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Inner::new())),
        }
    }

    /// Splits the store into its two role-typed ports.
    pub fn split(&mut self) -> (AcquisitionPort<'_, M>, BridgePort<'_, M>) {
        (AcquisitionPort { store: self }, BridgePort { store: self })
    }

    fn with<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }
}

impl<M: RawMutex> Default for RegisterStore<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Store handle for the acquisition context
pub struct AcquisitionPort<'a, M: RawMutex> {
    store: &'a RegisterStore<M>,
}

impl<'a, M: RawMutex> Clone for AcquisitionPort<'a, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, M: RawMutex> Copy for AcquisitionPort<'a, M> {}

impl<'a, M: RawMutex> AcquisitionPort<'a, M> {
    pub fn status(&self) -> StatusWord {
        self.store.with(|inner| inner.status)
    }

    pub fn status_bits(&self) -> u16 {
        self.store.with(|inner| inner.status.pack())
    }

    /// Interpreted view of the current command register.
    pub fn command(&self) -> CommandWord {
        self.store.with(|inner| CommandWord::from_raw(inner.command))
    }

    pub fn set_stream_live(&self, live: bool) {
        self.store.with(|inner| inner.status.stream_live = live);
    }

    /// Publishes a freshly derived button byte (latches already overlaid
    /// by the caller) and marks the register path live.
    pub fn set_button_inputs(&self, byte: u8) {
        self.store.with(|inner| {
            inner.status.set_button_byte(byte);
            inner.status.register_live = true;
        });
    }

    /// Path reset: drops the button inputs but keeps the sticky latches.
    pub fn clear_button_inputs(&self) {
        self.store.with(|inner| inner.status.buttons = 0);
    }

    /// Register watchdog expiry. Never keep asserting a button request
    /// against a silent interface: both button bytes are force-cleared.
    /// The sticky latches stay; only a status read clears those.
    pub fn register_fail_safe(&self) {
        self.store.with(|inner| {
            inner.status.register_live = false;
            inner.status.buttons = 0;
            inner.command &= !0x00ff;
        });
    }

    pub fn set_supply_present(&self, present: bool) {
        self.store.with(|inner| inner.status.supply_present = present);
    }

    pub fn set_standby(&self, active: bool) {
        self.store.with(|inner| inner.status.standby = active);
    }

    pub fn set_red_lit(&self, lit: bool) {
        self.store.with(|inner| inner.status.red_lit = lit);
    }

    pub fn set_white_lit(&self, lit: bool) {
        self.store.with(|inner| inner.status.white_lit = lit);
    }

    /// Records a power-button level transition. A press that was not
    /// commanded latches the manual-press flag.
    pub fn set_power_button(&self, held: bool) {
        self.store.with(|inner| {
            inner.status.power_button = held;
            if held && !CommandWord::from_raw(inner.command).power_button {
                inner.status.manual_press = true;
            }
        });
    }

    pub fn set_push_failed(&self) {
        self.store.with(|inner| inner.status.push_failed = true);
    }

    /// Publishes a completed capture buffer. The copy happens only when
    /// the previous frame has been consumed and the content changed;
    /// returns whether the frame was taken.
    pub fn offer_frame(&self, frame: &[u8; FRAME_BYTES]) -> bool {
        self.store.with(|inner| {
            if inner.frame_pending || inner.frame == *frame {
                return false;
            }
            inner.frame = *frame;
            inner.frame_pending = true;
            true
        })
    }

    /// Runs the frame parser if a frame is pending and the snapshot is not
    /// locked. Returns whether the pages were rewritten.
    pub fn parse_pending(&self, now: Instant) -> bool {
        self.store.with(|inner| {
            if !inner.frame_pending || inner.snapshot_locked(now) {
                return false;
            }
            let Inner { frame, pages, .. } = &mut *inner;
            parse::reorganize(frame, pages);
            inner.frame_pending = false;
            inner.unread_snapshot = true;
            true
        })
    }

    pub fn write_requested(&self) -> bool {
        self.store.with(|inner| inner.write_request)
    }

    /// Completes the write handshake; the bridge resumes after this.
    pub fn acknowledge_write(&self) {
        self.store.with(|inner| inner.write_request = false);
    }

    /// Release-timer expiry: a commanded power press that never showed up
    /// on the inputs is a failed push; either way the request bits clear.
    pub fn complete_release(&self) {
        self.store.with(|inner| {
            let command = CommandWord::from_raw(inner.command);
            if command.power_button && !inner.status.power_button {
                inner.status.push_failed = true;
            }
            inner.command &= !CommandWord::RELEASE_MASK;
        });
    }

    pub fn mark_unread_status(&self) {
        self.store.with(|inner| inner.unread_status = true);
    }

    /// Drives the external new-data line: anything unread on either path.
    pub fn unread_any(&self) -> bool {
        self.store
            .with(|inner| inner.unread_status || inner.unread_snapshot)
    }
}

/// Store handle for the protocol context
pub struct BridgePort<'a, M: RawMutex> {
    store: &'a RegisterStore<M>,
}

impl<'a, M: RawMutex> Clone for BridgePort<'a, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, M: RawMutex> Copy for BridgePort<'a, M> {}

impl<'a, M: RawMutex> BridgePort<'a, M> {
    /// A successful status read: returns the packed word and clears the
    /// unread flag together with the two sticky latches.
    pub fn read_status(&self) -> u16 {
        self.store.with(|inner| {
            let word = inner.status.pack();
            inner.unread_status = false;
            inner.status.manual_press = false;
            inner.status.push_failed = false;
            word
        })
    }

    /// Raw command register for holding reads and write echoes.
    pub fn command_value(&self) -> u16 {
        self.store.with(|inner| inner.command)
    }

    /// Stores a written command word and opens the handshake.
    pub fn write_command(&self, raw: u16) {
        self.store.with(|inner| {
            inner.command = raw;
            inner.write_request = true;
        });
    }

    pub fn write_pending(&self) -> bool {
        self.store.with(|inner| inner.write_request)
    }

    /// Arms the snapshot lock; pages stay immutable until
    /// [`BridgePort::unlock_snapshot`] or `until` passes.
    pub fn lock_snapshot(&self, until: Instant) {
        self.store.with(|inner| inner.lock_deadline = Some(until));
    }

    /// Sequence complete: releases the lock and retires the snapshot.
    pub fn unlock_snapshot(&self) {
        self.store.with(|inner| {
            inner.lock_deadline = None;
            inner.unread_snapshot = false;
        });
    }

    pub fn snapshot_locked(&self, now: Instant) -> bool {
        self.store.with(|inner| inner.snapshot_locked(now))
    }

    /// Copies one snapshot page (1-based).
    pub fn copy_page(&self, page: usize, dst: &mut [u16; PAGE_WORDS]) {
        debug_assert!((1..=PAGE_COUNT).contains(&page));
        self.store
            .with(|inner| dst.copy_from_slice(&inner.pages[page - 1]));
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use embassy_time::Duration;

    use super::*;

    fn ts(us: u64) -> Instant {
        Instant::MIN + Duration::from_micros(us)
    }

    fn store() -> RegisterStore<NoopRawMutex> {
        RegisterStore::new()
    }

    #[test]
    fn test_write_handshake() {
        let mut store = store();
        let (acq, bridge) = store.split();

        assert!(!acq.write_requested());
        bridge.write_command(0x0512);
        assert!(bridge.write_pending());
        assert_eq!(acq.command().buttons, 0x12);
        assert!(acq.command().power_button);

        acq.acknowledge_write();
        assert!(!bridge.write_pending());
        assert_eq!(bridge.command_value(), 0x0512);
    }

    #[test]
    fn test_status_read_clears_latches_only() {
        let mut store = store();
        let (acq, bridge) = store.split();

        acq.set_button_inputs(0b0011_0001);
        acq.mark_unread_status();

        let word = bridge.read_status();
        let status = StatusWord::unpack(word);
        assert!(status.manual_press);
        assert!(status.push_failed);
        assert!(status.register_live);

        // latches and unread are gone, inputs stay
        let status = acq.status();
        assert!(!status.manual_press);
        assert!(!status.push_failed);
        assert_eq!(status.buttons, 0b0000_0001);
        assert!(!acq.unread_any());
    }

    #[test]
    fn test_fail_safe_preserves_latches() {
        let mut store = store();
        let (acq, bridge) = store.split();

        bridge.write_command(0x00ff);
        acq.set_button_inputs(0b0010_0111);
        acq.register_fail_safe();

        let status = acq.status();
        assert!(!status.register_live);
        assert_eq!(status.buttons, 0);
        assert!(status.push_failed);
        // command button byte force-cleared, rest untouched
        assert_eq!(bridge.command_value(), 0);

        bridge.write_command(CommandWord::HOLD | 0x03);
        acq.register_fail_safe();
        assert_eq!(bridge.command_value(), CommandWord::HOLD);
    }

    #[test]
    fn test_frame_offer_and_parse() {
        let mut store = store();
        let (acq, bridge) = store.split();

        let zero = [0u8; FRAME_BYTES];
        // identical to the initial contents: not a new frame
        assert!(!acq.offer_frame(&zero));

        let mut frame = [0u8; FRAME_BYTES];
        frame[0] = 0xaa;
        frame[1] = 0x55;
        assert!(acq.offer_frame(&frame));
        // pending frame not yet consumed
        assert!(!acq.offer_frame(&zero));

        assert!(acq.parse_pending(ts(0)));
        assert!(acq.unread_any());
        // nothing pending afterwards
        assert!(!acq.parse_pending(ts(1)));

        let mut page = [0u16; PAGE_WORDS];
        bridge.copy_page(1, &mut page);
        assert_eq!(page[0], 0xaa55);
    }

    #[test]
    fn test_parser_respects_lock_until_expiry() {
        let mut store = store();
        let (acq, bridge) = store.split();

        let mut frame = [0u8; FRAME_BYTES];
        frame[0] = 1;
        assert!(acq.offer_frame(&frame));

        bridge.lock_snapshot(ts(1_000));
        assert!(!acq.parse_pending(ts(500)));
        assert!(bridge.snapshot_locked(ts(999)));

        // deadline passed: lock is gone without anyone releasing it
        assert!(!bridge.snapshot_locked(ts(1_000)));
        assert!(acq.parse_pending(ts(1_000)));
    }

    #[test]
    fn test_unlock_retires_snapshot() {
        let mut store = store();
        let (acq, bridge) = store.split();

        let mut frame = [0u8; FRAME_BYTES];
        frame[2] = 9;
        acq.offer_frame(&frame);
        acq.parse_pending(ts(0));
        assert!(acq.unread_any());

        bridge.lock_snapshot(ts(1_000));
        bridge.unlock_snapshot();
        assert!(!bridge.snapshot_locked(ts(1)));
        assert!(!acq.unread_any());
    }

    #[test]
    fn test_manual_press_only_when_not_commanded() {
        let mut store = store();
        let (acq, bridge) = store.split();

        bridge.write_command(CommandWord::POWER_BUTTON);
        acq.set_power_button(true);
        assert!(!acq.status().manual_press);
        acq.set_power_button(false);

        bridge.write_command(0);
        acq.set_power_button(true);
        assert!(acq.status().manual_press);
    }

    #[test]
    fn test_release_flags_missing_power_press() {
        let mut store = store();
        let (acq, bridge) = store.split();

        // commanded press observed on the inputs: clean release
        bridge.write_command(CommandWord::POWER_BUTTON);
        acq.set_power_button(true);
        acq.complete_release();
        assert!(!acq.status().push_failed);
        assert_eq!(bridge.command_value(), 0);
        acq.set_power_button(false);

        // commanded press never observed
        bridge.write_command(CommandWord::POWER_BUTTON | CommandWord::HOLD);
        acq.complete_release();
        assert!(acq.status().push_failed);
        assert_eq!(bridge.command_value(), CommandWord::HOLD);
    }
}
