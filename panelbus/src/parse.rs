//! Bulk frame reorganization
//!
//! The appliance clocks its display state out as a flat byte stream in
//! device (little-endian) pair order. The fieldbus exports the same data
//! as word registers in swapped pair order, sliced into fixed-size pages.
//! This transform is the only place the two layouts meet.

use panelbus_core::{PAGE_COUNT, PAGE_WORDS};
use panelbus_driver::capture::FRAME_BYTES;

/// Words a frame fills; the final page's tail stays untouched.
pub const FRAME_WORDS: usize = FRAME_BYTES.div_ceil(2);

const _: () = core::assert!(FRAME_WORDS <= PAGE_COUNT * PAGE_WORDS);

/// Rewrites a captured frame into the snapshot pages, swapping each byte
/// pair to export order. The frame's odd tail byte pairs with zero.
///
/// Idempotent for a given frame; does not touch words past [`FRAME_WORDS`].
pub fn reorganize(frame: &[u8; FRAME_BYTES], pages: &mut [[u16; PAGE_WORDS]; PAGE_COUNT]) {
    for word in 0..FRAME_WORDS {
        let lo = frame[2 * word];
        let hi = if 2 * word + 1 < FRAME_BYTES {
            frame[2 * word + 1]
        } else {
            0
        };
        pages[word / PAGE_WORDS][word % PAGE_WORDS] = u16::from_be_bytes([lo, hi]);
    }
}
