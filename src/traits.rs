//! The small traits the bridge engine is written against instead of
//! touching ESP-IDF/lwIP directly. A real board-support crate implements
//! `RadioDriver`/`IpStack`/`EventBus`; the `sim` module implements all
//! three in-process for tests and `--simulate`.
//!
//! `RadioDriver` and `IpStack` are deliberately *synchronous* traits: their
//! ESP-IDF counterparts (`esp_wifi_set_mac`, `esp_netif_dhcpc_stop`, ...)
//! are plain non-blocking calls that kick off work and return immediately,
//! the same way they are modelled here. The actual bounded waiting for
//! "did the disconnect/reconnect complete" happens separately, against the
//! `EventBits` primitive (`event_bits.rs`) the event router updates — never
//! by awaiting the driver call itself. This keeps every rx-callback code
//! path free of `.await`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::buffer::RxBuffer;
use crate::events::BridgeEvent;
use crate::types::{Iface, Ip4, Mac};

/// A client currently associated to the AP (`esp_wifi_ap_get_sta_list`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApClientInfo {
    pub mac: Mac,
    pub aid: u16,
    pub rssi: i8,
}

/// The upstream AP record the STA is (or was) associated with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApRecord {
    pub ssid: String,
    pub rssi: i8,
    pub channel: u8,
    pub bssid: Mac,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Open,
    Wpa2Psk,
    Wpa2Wpa3Psk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bandwidth {
    Ht20,
    Ht40,
}

/// Per-interface radio configuration (SSID/password/authmode/BSSID pin/channel).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioConfig {
    pub ssid: String,
    pub password: String,
    pub authmode: AuthMode,
    pub bssid: Option<Mac>,
    pub channel: u8,
}

impl RadioConfig {
    /// Clears the BSSID pin, allowing a full scan on the next connect
    /// (used by the restore transaction, and by the clone transaction's
    /// timeout fallback).
    pub fn clear_bssid_lock(&mut self) {
        self.bssid = None;
        self.channel = 0;
    }
}

/// A registered rx callback: invoked by the driver on its own thread
/// context, must be non-blocking, must not allocate or take locks.
pub type RxCallback = Arc<dyn Fn(RxBuffer) + Send + Sync>;

/// The radio firmware driver. Every method here is a fire-and-forget
/// or instantaneous query, mirroring the underlying ESP-IDF calls; the
/// clone/restore state machine does its own bounded waiting against
/// `EventBits` rather than blocking inside these calls.
pub trait RadioDriver: Send + Sync {
    fn get_mac(&self, iface: Iface) -> Mac;
    fn set_mac(&self, iface: Iface, mac: Mac) -> anyhow::Result<()>;
    fn get_config(&self, iface: Iface) -> RadioConfig;
    fn set_config(&self, iface: Iface, config: RadioConfig) -> anyhow::Result<()>;
    fn connect(&self) -> anyhow::Result<()>;
    fn disconnect(&self) -> anyhow::Result<()>;
    fn set_power_save(&self, enabled: bool);
    fn set_max_tx_power(&self, dbm: u8);
    fn set_bandwidth(&self, iface: Iface, bandwidth: Bandwidth);
    fn ap_client_list(&self) -> Vec<ApClientInfo>;
    fn get_ap_record(&self) -> Option<ApRecord>;

    /// Registers (or, with `None`, unregisters) the single rx callback slot
    /// for `iface`. Registering replaces any previous handler outright.
    fn register_rx(&self, iface: Iface, callback: Option<RxCallback>);

    /// Raw L2 transmit. Does not consume `data`: the forwarder may still
    /// need to hand the same frame to the local IP stack afterwards
    /// (the multicast/broadcast case).
    fn tx(&self, iface: Iface, data: &[u8]) -> anyhow::Result<()>;
}

/// The local IP stack: per-netif DHCP client/server control, IP
/// assignment, and frame injection. Synchronous for the same reason as
/// `RadioDriver` above.
pub trait IpStack: Send + Sync {
    fn dhcpc_stop(&self, iface: Iface);
    fn dhcpc_start(&self, iface: Iface);
    fn dhcps_stop(&self, iface: Iface);
    fn dhcps_start(&self, iface: Iface);
    fn set_ip_info(&self, iface: Iface, ip: Ip4, netmask: Ip4, gateway: Ip4);

    /// Injects a received frame into the stack, taking ownership of the
    /// buffer (ARP/mDNS/management-GUI traffic).
    fn receive(&self, iface: Iface, buffer: RxBuffer);
}

/// Delivers STA/AP/IP events to the router. This is the one trait that is
/// genuinely asynchronous: the event-loop task awaits the next event
/// alongside everything else on the runtime.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn recv(&self) -> Option<BridgeEvent>;
}

/// Startup-time configuration fields the engine and the reference platform
/// consume. Persistence and the HTTP surface are out of scope; only the
/// fields are part of this boundary.
pub trait ConfigStore: Send + Sync {
    fn upstream_ssid(&self) -> &str;
    fn upstream_password(&self) -> &str;
    fn ap_ssid(&self) -> &str;
    fn ap_password(&self) -> &str;
    fn tx_power_dbm(&self) -> u8;
    fn max_clients(&self) -> u8;
}
