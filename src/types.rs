//! Core identities shared by every component: hardware addresses, IPv4
//! addresses, interface tags and the repeater's coarse state machine.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Error};

/// A six-byte Ethernet hardware address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Mac(pub [u8; 6]);

impl Mac {
    pub const BROADCAST: Mac = Mac([0xff; 6]);

    pub fn from_slice(bytes: &[u8]) -> Option<Mac> {
        if bytes.len() < 6 {
            return None;
        }
        let mut out = [0u8; 6];
        out.copy_from_slice(&bytes[..6]);
        Some(Mac(out))
    }

    /// Multicast and broadcast addresses have the low bit of the first octet set.
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 6]
    }
}

impl fmt::Debug for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl FromStr for Mac {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; 6];
        let mut parts = s.split(':');
        for slot in out.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| anyhow!("mac address '{s}' has fewer than 6 octets"))?;
            *slot = u8::from_str_radix(part, 16)
                .map_err(|_| anyhow!("mac address '{s}' has a non-hex octet '{part}'"))?;
        }
        if parts.next().is_some() {
            return Err(anyhow!("mac address '{s}' has more than 6 octets"));
        }
        Ok(Mac(out))
    }
}

/// An IPv4 address. Kept distinct from `std::net::Ipv4Addr` at the call
/// sites that do bitwise subnet arithmetic, but freely convertible.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Ip4(pub u32);

impl Ip4 {
    pub const ZERO: Ip4 = Ip4(0);

    pub fn from_octets(a: u8, b: u8, c: u8, d: u8) -> Ip4 {
        Ip4(u32::from_be_bytes([a, b, c, d]))
    }

    pub fn from_be_slice(bytes: &[u8]) -> Option<Ip4> {
        if bytes.len() < 4 {
            return None;
        }
        Some(Ip4(u32::from_be_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3],
        ])))
    }

    pub fn to_be_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// 169.254.0.0/16 — the link-local dummy address installed during
    /// MAC-change.
    pub fn is_link_local(&self) -> bool {
        (self.0 >> 16) == ((169u32 << 8) | 254u32)
    }
}

impl From<Ipv4Addr> for Ip4 {
    fn from(ip: Ipv4Addr) -> Self {
        Ip4(u32::from_be_bytes(ip.octets()))
    }
}

impl From<Ip4> for Ipv4Addr {
    fn from(ip: Ip4) -> Self {
        Ipv4Addr::from(ip.0.to_be_bytes())
    }
}

impl fmt::Debug for Ip4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Ip4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Ipv4Addr::from(*self))
    }
}

impl FromStr for Ip4 {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let addr: Ipv4Addr = s.parse().map_err(|_| anyhow!("'{s}' is not an IPv4 address"))?;
        Ok(Ip4::from(addr))
    }
}

/// Which radio interface a frame or callback belongs to.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Iface {
    Sta,
    Ap,
}

impl fmt::Display for Iface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Iface::Sta => write!(f, "sta"),
            Iface::Ap => write!(f, "ap"),
        }
    }
}

/// The repeater's coarse state.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RepeaterState {
    Idle,
    MacChanging,
    Bridging,
    MacRestoring,
}

impl fmt::Display for RepeaterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RepeaterState::Idle => "idle",
            RepeaterState::MacChanging => "mac_changing",
            RepeaterState::Bridging => "bridging",
            RepeaterState::MacRestoring => "mac_restoring",
        };
        write!(f, "{s}")
    }
}

/// Timeouts used throughout the clone/restore state machine.
pub const DISCONNECT_WAIT: Duration = Duration::from_secs(5);
pub const RECONNECT_WAIT: Duration = Duration::from_secs(15);
pub const POST_DISCONNECT_SETTLE: Duration = Duration::from_millis(100);
pub const POST_BSSID_LOCK_SETTLE: Duration = Duration::from_millis(200);
pub const AUTO_RECONNECT_BACKOFF: Duration = Duration::from_secs(1);
pub const TRANSACTION_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

pub const MANAGEMENT_IP: Ip4 = Ip4::from_octets(192, 168, 4, 1);
pub const MANAGEMENT_NETMASK: Ip4 = Ip4::from_octets(255, 255, 255, 0);
pub const DUMMY_STA_IP: Ip4 = Ip4::from_octets(169, 254, 1, 1);
pub const DUMMY_STA_NETMASK: Ip4 = Ip4::from_octets(255, 255, 0, 0);
