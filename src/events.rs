//! Event payloads delivered by the radio driver / IP stack to the event
//! router, via `EventBus`.

use crate::types::{Ip4, Mac};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaConnectedInfo {
    pub bssid: Mac,
    pub channel: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaDisconnectedInfo {
    pub reason: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GotIpInfo {
    pub ip: Ip4,
    pub netmask: Ip4,
    pub gateway: Ip4,
}

/// The union of radio and IP-stack events the router reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeEvent {
    StaStarted,
    StaConnected(StaConnectedInfo),
    StaDisconnected(StaDisconnectedInfo),
    ApClientJoined { mac: Mac },
    ApClientLeft { mac: Mac },
    GotIp(GotIpInfo),
    LostIp,
}
