use embassy_time::Duration;

/// Bits per serial character: start, 8 data, even parity, stop.
const BITS_PER_CHAR: u32 = 11;

/// Character times of silence that end a request frame.
const SILENCE_CHARS: u32 = 2;

/// Stack configuration
///
/// Defaults match the deployed appliance installation. Integrators adjust
/// individual fields after `Config::default()`; host tests shrink the
/// timeouts to keep scenarios fast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub struct Config {
    /// Fieldbus unit address answered by the bridge.
    pub address: u8,
    /// Fieldbus line rate in bits per second.
    pub baud_rate: u32,
    /// Settle delay between the frame-start edge and arming the block
    /// transfer. Resynchronizes the capture clock on every frame.
    pub resync_delay: Duration,
    /// Bulk path liveness watchdog, about three frame periods.
    pub stream_watchdog: Duration,
    /// Register path liveness watchdog, about three exchange periods.
    pub register_watchdog: Duration,
    /// Longest gap between standby indicator blinks before standby is
    /// declared inactive.
    pub standby_timeout: Duration,
    /// How long a commanded button press stays asserted without the hold
    /// option.
    pub release_after: Duration,
    /// Snapshot lock expiry: longest a client may take to finish the
    /// five-page read sequence.
    pub lock_timeout: Duration,
    /// Minimum on-time of the response-activity indicator.
    pub activity_time: Duration,
    /// Period of the panel poll loop. Bounds the latency of the write
    /// handshake and of status detection.
    pub poll_period: Duration,
    /// Upper bound on the write handshake wait before the bridge answers
    /// server-busy. Must stay well above `poll_period`.
    pub write_timeout: Duration,
    /// Consecutive button mismatches classified as noise. The next one
    /// raises a fault.
    pub mismatch_tolerance: u32,
}

impl Config {
    /// Receive silence that terminates a request frame, derived from the
    /// line rate.
    pub const fn byte_silence(&self) -> Duration {
        let char_us = 1_000_000 / self.baud_rate as u64 * BITS_PER_CHAR as u64;
        Duration::from_micros(char_us * SILENCE_CHARS as u64)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: 2,
            baud_rate: 115_200,
            resync_delay: Duration::from_micros(7_000),
            stream_watchdog: Duration::from_micros(3 * 102_000),
            register_watchdog: Duration::from_micros(3 * 10_000),
            standby_timeout: Duration::from_micros(3_500_000),
            release_after: Duration::from_micros(200_000),
            lock_timeout: Duration::from_micros(200_000),
            activity_time: Duration::from_micros(200_000),
            poll_period: Duration::from_micros(10),
            write_timeout: Duration::from_micros(10_000),
            mismatch_tolerance: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_silence() {
        let config = Config::default();
        // 8 us + a hair per character at 115200 8E1; integer math matches
        // the deployed firmware.
        assert_eq!(config.byte_silence(), Duration::from_micros(176));
    }
}
