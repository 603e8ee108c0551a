//! Capture channels for the two appliance data paths

/// Length of one bulk frame in bytes.
///
/// The appliance clocks out exactly this many bytes per display update
/// cycle. The value is fixed by the observed device and shared between the
/// driver (transfer length) and the stack (parser input).
pub const FRAME_BYTES: usize = 1063;

/// Bulk frame capture channel
///
/// Models a block-transfer peripheral (DMA or equivalent) fed by the
/// appliance's display bus. The stack resynchronizes on every frame: it
/// waits for the frame-start edge, idles through a settle delay, then
/// starts the block transfer. A driver must therefore keep the two phases
/// separate and must not buffer frames across [`StreamCapture::reset`]
/// calls.
///
/// The source clock is known to glitch. A driver should not attempt its
/// own recovery; the stack's per-frame resynchronization bounds recovery
/// to one frame period.
pub trait StreamCapture {
    /// Waits for the falling frame-start edge. Safe to drop.
    async fn wait_frame_start(&mut self);

    /// Receives one full frame into `buf`, completing when the last byte
    /// has been transferred. Safe to drop; a dropped future aborts the
    /// transfer.
    async fn read_frame(&mut self, buf: &mut [u8; FRAME_BYTES]);

    /// Aborts any transfer in progress and returns the capture machinery
    /// to its idle, armed-for-sync state.
    fn reset(&mut self);
}

/// Shift-register word link
///
/// Models the low-rate serial interface to the appliance's button shift
/// register. Each cycle shifts the commanded button byte out while a raw
/// word is shifted in.
///
/// The device reports active-low with the button states in the top eight
/// bits of the raw word; the stack performs the inversion and extraction
/// itself, so the driver must return the word exactly as sampled.
pub trait RegisterLink {
    /// Performs one shift cycle. Safe to drop.
    async fn exchange(&mut self, command: u8) -> u32;

    /// Aborts any cycle in progress and returns the interface to idle.
    fn reset(&mut self);
}
