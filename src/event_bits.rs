//! A small async bit-group wait primitive standing in for the original
//! firmware's FreeRTOS event-group bits. Two bits are used:
//! `StaConnected` and `StaDisconnected`. A bit survives across waits until
//! explicitly cleared; waiting is bounded, never infinite.

use std::time::Duration;

use async_std::sync::{Condvar, Mutex};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Bit {
    StaConnected,
    StaDisconnected,
}

fn mask(bit: Bit) -> u8 {
    match bit {
        Bit::StaConnected => 0b01,
        Bit::StaDisconnected => 0b10,
    }
}

pub struct EventBits {
    bits: Mutex<u8>,
    cv: Condvar,
}

impl EventBits {
    pub fn new() -> EventBits {
        EventBits {
            bits: Mutex::new(0),
            cv: Condvar::new(),
        }
    }

    pub async fn set(&self, bit: Bit) {
        let mut guard = self.bits.lock().await;
        *guard |= mask(bit);
        drop(guard);
        self.cv.notify_all();
    }

    pub async fn clear(&self, bit: Bit) {
        let mut guard = self.bits.lock().await;
        *guard &= !mask(bit);
    }

    /// Waits up to `timeout` for `bit` to be set. Returns `true` if it was
    /// observed set within the deadline, `false` on timeout. The bit is
    /// left set (callers clear explicitly when they want to re-arm it).
    pub async fn wait_for(&self, bit: Bit, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut guard = self.bits.lock().await;
        loop {
            if *guard & mask(bit) != 0 {
                return true;
            }
            let remaining = match deadline.checked_duration_since(std::time::Instant::now()) {
                Some(d) if !d.is_zero() => d,
                _ => return false,
            };
            let (next_guard, timed_out) = self.cv.wait_timeout(guard, remaining).await;
            guard = next_guard;
            if timed_out.timed_out() && *guard & mask(bit) == 0 {
                return false;
            }
        }
    }
}

impl Default for EventBits {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[async_std::test]
    async fn wait_returns_immediately_once_set() {
        let bits = EventBits::new();
        bits.set(Bit::StaConnected).await;
        let hit = bits.wait_for(Bit::StaConnected, Duration::from_millis(50)).await;
        assert!(hit);
    }

    #[async_std::test]
    async fn wait_times_out_when_never_set() {
        let bits = EventBits::new();
        let hit = bits
            .wait_for(Bit::StaDisconnected, Duration::from_millis(30))
            .await;
        assert!(!hit);
    }

    #[async_std::test]
    async fn set_wakes_a_concurrent_waiter() {
        use async_std::task;
        use std::sync::Arc;

        let bits = Arc::new(EventBits::new());
        let waiter = {
            let bits = bits.clone();
            task::spawn(async move { bits.wait_for(Bit::StaConnected, Duration::from_secs(5)).await })
        };
        task::sleep(Duration::from_millis(20)).await;
        bits.set(Bit::StaConnected).await;
        assert!(waiter.await);
    }

    #[async_std::test]
    async fn clear_then_wait_times_out_again() {
        let bits = EventBits::new();
        bits.set(Bit::StaConnected).await;
        bits.clear(Bit::StaConnected).await;
        let hit = bits.wait_for(Bit::StaConnected, Duration::from_millis(30)).await;
        assert!(!hit);
    }
}
