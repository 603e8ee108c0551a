//! Fieldbus byte-stream transport

/// Byte-stream serial port
///
/// The bridge frames requests by silence, so it needs single-byte
/// granularity on the receive side: [`SerialPort::read`] must resolve as
/// soon as one byte is available, and the future must be safe to drop (the
/// bridge races every read against the inter-frame silence timeout).
///
/// The expected line configuration is fixed-rate, even parity, one stop
/// bit. Bytes failing parity should be discarded by the driver; the
/// stack's CRC check covers whatever slips through.
pub trait SerialPort {
    /// Receives the next byte. Safe to drop.
    async fn read(&mut self) -> u8;

    /// Transmits `bytes` in order, completing once the driver has accepted
    /// all of them.
    async fn write(&mut self, bytes: &[u8]);
}
