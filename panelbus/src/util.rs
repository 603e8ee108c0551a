//! Shared timing utilities

use core::cell::Cell;
use core::future::poll_fn;
use core::task::Poll;

use embassy_time::{Duration, Instant, Timer};

/// Restart-on-activity one-shot deadline
///
/// The uniform watchdog policy object: arming (or re-arming) moves the
/// deadline `width` past the given instant; expiry fires exactly once and
/// disarms. Used for the capture liveness watchdogs, the standby blink
/// timeout and the activity indicator pulse.
///
/// The object is shared by reference between the arming side and the
/// expiry side of a runner. Interior mutability keeps both sides `&self`,
/// so the two can live in sibling arms of the same `join`.
pub struct Expiry {
    width: Duration,
    deadline: Cell<Option<Instant>>,
}

impl Expiry {
    pub const fn new(width: Duration) -> Self {
        Self {
            width,
            deadline: Cell::new(None),
        }
    }

    /// Re-arms the deadline `width` past `now`.
    pub fn arm(&self, now: Instant) {
        self.deadline.set(Some(now + self.width));
    }

    pub fn cancel(&self) {
        self.deadline.set(None);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline.get()
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.get().is_some()
    }

    /// Whether the deadline has passed as of `now`. Does not disarm.
    pub fn elapsed(&self, now: Instant) -> bool {
        self.deadline.get().is_some_and(|deadline| now >= deadline)
    }

    /// Resolves once the armed deadline passes without being re-armed,
    /// then disarms.
    ///
    /// While disarmed the future parks without registering a wake-up: it
    /// relies on the owning task being polled again, which holds whenever
    /// the arming side runs in a sibling arm of the same `join`/`select`.
    pub async fn expired(&self) {
        loop {
            match self.deadline.get() {
                Some(deadline) => {
                    Timer::at(deadline).await;
                    // a re-arm while sleeping moves the deadline forward
                    if self.deadline.get() == Some(deadline) {
                        self.deadline.set(None);
                        return;
                    }
                }
                None => park_once().await,
            }
        }
    }
}

/// Returns `Pending` once without scheduling a wake-up, then `Ready`.
///
/// Deliberately not a yield: the caller is re-polled only when something
/// else wakes its task.
pub(crate) async fn park_once() {
    let mut parked = false;
    poll_fn(move |_cx| {
        if parked {
            Poll::Ready(())
        } else {
            parked = true;
            Poll::Pending
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(us: u64) -> Instant {
        Instant::MIN + Duration::from_micros(us)
    }

    #[test]
    fn test_arm_moves_deadline() {
        let expiry = Expiry::new(Duration::from_micros(100));
        assert!(!expiry.is_armed());

        expiry.arm(ts(0));
        assert_eq!(expiry.deadline(), Some(ts(100)));
        assert!(!expiry.elapsed(ts(99)));
        assert!(expiry.elapsed(ts(100)));

        // re-arm pushes the deadline out
        expiry.arm(ts(50));
        assert!(!expiry.elapsed(ts(100)));
        assert!(expiry.elapsed(ts(150)));
    }

    #[test]
    fn test_cancel_disarms() {
        let expiry = Expiry::new(Duration::from_micros(100));
        expiry.arm(ts(0));
        expiry.cancel();
        assert!(!expiry.is_armed());
        assert!(!expiry.elapsed(ts(1_000)));
    }
}
