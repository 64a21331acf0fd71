//! The MAC-NAT table: a bounded IP→real-MAC map, learned from observed
//! traffic and evicted LRU.

use std::time::Instant;

use crate::types::{Ip4, Mac};

/// A const generic would let callers size it
/// differently, but the repeater only ever runs one of these, sized for the
/// rx fastpath, so a fixed array keeps `learn`/`lookup_by_ip` allocation-free.
pub const CAPACITY: usize = 8;

#[derive(Clone, Copy)]
struct Entry {
    ip: Ip4,
    real_mac: Mac,
    last_seen: Instant,
    used: bool,
}

impl Entry {
    fn empty(now: Instant) -> Entry {
        Entry {
            ip: Ip4::ZERO,
            real_mac: Mac::default(),
            last_seen: now,
            used: false,
        }
    }
}

/// Bounded IP→MAC table. Linear scan is deliberate: `CAPACITY` is tiny and
/// lookups happen in the rx fastpath, where the constant factor of a few
/// comparisons beats hash overhead and, more importantly, avoids allocation.
pub struct MacNatTable {
    entries: [Entry; CAPACITY],
}

impl MacNatTable {
    pub fn new() -> MacNatTable {
        let now = Instant::now();
        MacNatTable {
            entries: [Entry::empty(now); CAPACITY],
        }
    }

    /// Learn that `ip` is currently reachable at `real_mac`. No-op for
    /// multicast/broadcast MACs and the zero IP.
    pub fn learn(&mut self, ip: Ip4, real_mac: Mac) {
        if real_mac.is_multicast() || ip.is_zero() {
            return;
        }
        let now = Instant::now();

        if let Some(e) = self.entries.iter_mut().find(|e| e.used && e.ip == ip) {
            e.real_mac = real_mac;
            e.last_seen = now;
            return;
        }

        if let Some(e) = self
            .entries
            .iter_mut()
            .find(|e| e.used && e.real_mac == real_mac)
        {
            e.ip = ip;
            e.last_seen = now;
            return;
        }

        if let Some(free) = self.entries.iter_mut().find(|e| !e.used) {
            free.ip = ip;
            free.real_mac = real_mac;
            free.last_seen = now;
            free.used = true;
            return;
        }

        let oldest = self
            .entries
            .iter_mut()
            .min_by_key(|e| e.last_seen)
            .expect("CAPACITY > 0");
        oldest.ip = ip;
        oldest.real_mac = real_mac;
        oldest.last_seen = now;
        oldest.used = true;
    }

    /// Linear scan lookup, see module docs.
    pub fn lookup_by_ip(&self, ip: Ip4) -> Option<Mac> {
        self.entries
            .iter()
            .find(|e| e.used && e.ip == ip)
            .map(|e| e.real_mac)
    }

    /// Reset all entries to unused. Called whenever a bridging session ends.
    pub fn clear(&mut self) {
        for e in self.entries.iter_mut() {
            e.used = false;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.used).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MacNatTable {
    fn default() -> Self {
        Self::new()
    }
}
