//! `BridgeContext` — the single shared value replacing a firmware's
//! file-scope `static`/`volatile` globals with one `Arc`-shared struct,
//! constructed once at startup and handed around to every callback, worker
//! task, and the event router.
//!
//! Single-word flags and counters are plain atomics so the rx fastpath can
//! read (and, for `primary_client_mac`, the transaction worker can write)
//! them without ever taking a lock. The MAC-NAT table and the upstream
//! lock get a `std::sync::Mutex` each: touched from the rx fastpath too,
//! but never across an `.await`, so they never become a suspension point.
//! The one genuine suspension point is `transaction_lock`, an
//! `async_std::sync::Mutex` serialising clone/restore transactions.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Mutex;

use async_std::sync::Mutex as AsyncMutex;

use crate::macnat::MacNatTable;
use crate::types::{Mac, RepeaterState};

/// BSSID/channel of the first successful STA association, reused on
/// reconnect to skip a full scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpstreamLock {
    pub bssid: Mac,
    pub channel: u8,
    pub locked: bool,
}

/// Packs a `Mac` into the low 48 bits of a `u64` for lock-free atomic
/// storage. Reads of `primary_client_mac` are safe to leave lock-free
/// because it only ever mutates inside a transaction that has already
/// stopped forwarding.
fn mac_to_u64(mac: Mac) -> u64 {
    let mut bytes = [0u8; 8];
    bytes[2..8].copy_from_slice(&mac.0);
    u64::from_be_bytes(bytes)
}

fn u64_to_mac(v: u64) -> Mac {
    let bytes = v.to_be_bytes();
    Mac::from_slice(&bytes[2..8]).expect("6 bytes")
}

fn state_to_u8(state: RepeaterState) -> u8 {
    match state {
        RepeaterState::Idle => 0,
        RepeaterState::MacChanging => 1,
        RepeaterState::Bridging => 2,
        RepeaterState::MacRestoring => 3,
    }
}

fn u8_to_state(v: u8) -> RepeaterState {
    match v {
        0 => RepeaterState::Idle,
        1 => RepeaterState::MacChanging,
        2 => RepeaterState::Bridging,
        _ => RepeaterState::MacRestoring,
    }
}

pub struct BridgeContext {
    pub original_sta_mac: Mac,
    pub ap_mac: Mac,

    state: AtomicU8,
    sta_connected: AtomicBool,
    forwarding_active: AtomicBool,
    mac_cloned: AtomicBool,
    suppress_auto_reconnect: AtomicBool,
    ap_ip_from_sniff: AtomicBool,
    client_count: AtomicU32,
    primary_client_mac: AtomicU64,

    pub upstream_lock: Mutex<UpstreamLock>,
    pub mac_nat: Mutex<MacNatTable>,

    /// Serialises clone/restore transactions; the only genuine suspension
    /// point guarding shared mutable state.
    pub transaction_lock: AsyncMutex<()>,
}

impl BridgeContext {
    pub fn new(original_sta_mac: Mac, ap_mac: Mac) -> BridgeContext {
        BridgeContext {
            original_sta_mac,
            ap_mac,
            state: AtomicU8::new(state_to_u8(RepeaterState::Idle)),
            sta_connected: AtomicBool::new(false),
            forwarding_active: AtomicBool::new(false),
            mac_cloned: AtomicBool::new(false),
            suppress_auto_reconnect: AtomicBool::new(false),
            ap_ip_from_sniff: AtomicBool::new(false),
            client_count: AtomicU32::new(0),
            primary_client_mac: AtomicU64::new(mac_to_u64(Mac::default())),
            upstream_lock: Mutex::new(UpstreamLock::default()),
            mac_nat: Mutex::new(MacNatTable::new()),
            transaction_lock: AsyncMutex::new(()),
        }
    }

    pub fn state(&self) -> RepeaterState {
        u8_to_state(self.state.load(Ordering::SeqCst))
    }

    pub fn set_state(&self, state: RepeaterState) {
        self.state.store(state_to_u8(state), Ordering::SeqCst);
    }

    pub fn sta_connected(&self) -> bool {
        self.sta_connected.load(Ordering::SeqCst)
    }

    pub fn set_sta_connected(&self, v: bool) {
        self.sta_connected.store(v, Ordering::SeqCst);
    }

    pub fn forwarding_active(&self) -> bool {
        self.forwarding_active.load(Ordering::SeqCst)
    }

    pub fn set_forwarding_active(&self, v: bool) {
        self.forwarding_active.store(v, Ordering::SeqCst);
    }

    pub fn mac_cloned(&self) -> bool {
        self.mac_cloned.load(Ordering::SeqCst)
    }

    pub fn set_mac_cloned(&self, v: bool) {
        self.mac_cloned.store(v, Ordering::SeqCst);
    }

    pub fn suppress_auto_reconnect(&self) -> bool {
        self.suppress_auto_reconnect.load(Ordering::SeqCst)
    }

    pub fn set_suppress_auto_reconnect(&self, v: bool) {
        self.suppress_auto_reconnect.store(v, Ordering::SeqCst);
    }

    pub fn ap_ip_from_sniff(&self) -> bool {
        self.ap_ip_from_sniff.load(Ordering::SeqCst)
    }

    pub fn set_ap_ip_from_sniff(&self, v: bool) {
        self.ap_ip_from_sniff.store(v, Ordering::SeqCst);
    }

    pub fn client_count(&self) -> u32 {
        self.client_count.load(Ordering::SeqCst)
    }

    pub fn increment_client_count(&self) -> u32 {
        self.client_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Saturating decrement, clamped at zero.
    pub fn decrement_client_count(&self) -> u32 {
        let mut current = self.client_count.load(Ordering::SeqCst);
        loop {
            let next = current.saturating_sub(1);
            match self.client_count.compare_exchange_weak(
                current,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return next,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn primary_client_mac(&self) -> Mac {
        u64_to_mac(self.primary_client_mac.load(Ordering::SeqCst))
    }

    pub fn set_primary_client_mac(&self, mac: Mac) {
        self.primary_client_mac
            .store(mac_to_u64(mac), Ordering::SeqCst);
    }

    /// The STA's current MAC: the impersonated client's MAC when cloned,
    /// the factory address otherwise.
    pub fn effective_sta_mac(&self) -> Mac {
        if self.mac_cloned() {
            self.primary_client_mac()
        } else {
            self.original_sta_mac
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_u64_roundtrip() {
        let mac = Mac([0xaa, 0xbb, 0xcc, 0x01, 0x02, 0x03]);
        assert_eq!(u64_to_mac(mac_to_u64(mac)), mac);
    }

    #[test]
    fn effective_sta_mac_tracks_clone_state() {
        let ctx = BridgeContext::new(Mac([1; 6]), Mac([2; 6]));
        assert_eq!(ctx.effective_sta_mac(), Mac([1; 6]));

        ctx.set_primary_client_mac(Mac([9; 6]));
        ctx.set_mac_cloned(true);
        assert_eq!(ctx.effective_sta_mac(), Mac([9; 6]));

        ctx.set_mac_cloned(false);
        assert_eq!(ctx.effective_sta_mac(), Mac([1; 6]));
    }

    #[test]
    fn client_count_clamps_at_zero() {
        let ctx = BridgeContext::new(Mac([1; 6]), Mac([2; 6]));
        assert_eq!(ctx.decrement_client_count(), 0);
        ctx.increment_client_count();
        ctx.increment_client_count();
        assert_eq!(ctx.decrement_client_count(), 1);
        assert_eq!(ctx.decrement_client_count(), 0);
        assert_eq!(ctx.decrement_client_count(), 0);
    }
}
