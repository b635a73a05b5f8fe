use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Sliding-window counter over sends.
///
/// `reserve` claims a slot before the send goes out, so sends that are in
/// flight at the same time all count. A failed send hands its slot back
/// with `release`; only successes stay in the window.
pub struct SendRateLimiter {
    sent: Mutex<VecDeque<Instant>>,
    max: usize,
    window: Duration,
}

impl SendRateLimiter {
    pub fn new(max: usize, window: Duration) -> Self {
        Self {
            sent: Mutex::new(VecDeque::with_capacity(max)),
            max,
            window,
        }
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Claim a slot. `Err(retry_after_secs)` if the window is full.
    pub fn reserve(&self) -> Result<Instant, u64> {
        self.reserve_at(Instant::now())
    }

    /// Give back a slot taken by `reserve`.
    pub fn release(&self, stamp: Instant) {
        let mut sent = self.sent.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(idx) = sent.iter().rposition(|&at| at == stamp) {
            sent.remove(idx);
        }
    }

    fn reserve_at(&self, now: Instant) -> Result<Instant, u64> {
        let mut sent = self.sent.lock().unwrap_or_else(|e| e.into_inner());
        while let Some(&oldest) = sent.front() {
            if now.duration_since(oldest) >= self.window {
                sent.pop_front();
            } else {
                break;
            }
        }

        if sent.len() < self.max {
            sent.push_back(now);
            return Ok(now);
        }
        let retry_after = sent
            .front()
            .map(|&oldest| (self.window - now.duration_since(oldest)).as_secs() + 1)
            .unwrap_or(1);
        Err(retry_after)
    }
}

impl Default for SendRateLimiter {
    fn default() -> Self {
        Self::new(10, Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_max_then_rejects() {
        let limiter = SendRateLimiter::new(3, Duration::from_secs(60));
        let t0 = Instant::now();
        for _ in 0..3 {
            assert!(limiter.reserve_at(t0).is_ok());
        }
        let retry = limiter.reserve_at(t0 + Duration::from_secs(10)).unwrap_err();
        assert_eq!(retry, 51);
    }

    #[test]
    fn window_slides() {
        let limiter = SendRateLimiter::new(2, Duration::from_secs(60));
        let t0 = Instant::now();
        limiter.reserve_at(t0).unwrap();
        limiter.reserve_at(t0 + Duration::from_secs(30)).unwrap();
        assert!(limiter.reserve_at(t0 + Duration::from_secs(59)).is_err());
        assert!(limiter.reserve_at(t0 + Duration::from_secs(60)).is_ok());
    }

    #[test]
    fn reservations_count_until_released() {
        let limiter = SendRateLimiter::new(1, Duration::from_secs(60));
        let slot = limiter.reserve().unwrap();
        // A second send while the first is still in flight.
        assert!(limiter.reserve().is_err());

        limiter.release(slot);
        let slot = limiter.reserve().unwrap();
        assert!(limiter.reserve().is_err());

        // Releasing twice frees nothing extra.
        limiter.release(slot);
        limiter.release(slot);
        limiter.reserve().unwrap();
        assert!(limiter.reserve().is_err());
    }
}
