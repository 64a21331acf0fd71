//! The in-process reference platform: one concrete implementation of
//! `RadioDriver + IpStack + EventBus`, built on `async-std` so the engine
//! has something real to run end-to-end against in lieu of ESP-IDF/lwIP
//! bindings. This is the harness the test suite and `--simulate` drive the
//! engine through, never a second production backend.

use std::sync::Mutex;
use std::time::Duration;

use async_std::channel::{unbounded, Receiver, Sender};
use async_trait::async_trait;
use log::trace;

use crate::buffer::RxBuffer;
use crate::events::{BridgeEvent, GotIpInfo, StaConnectedInfo, StaDisconnectedInfo};
use crate::traits::{ApClientInfo, ApRecord, AuthMode, Bandwidth, ConfigStore, EventBus, IpStack, RadioConfig, RadioDriver, RxCallback};
use crate::types::{Iface, Ip4, Mac};

struct Inner {
    sta_mac: Mac,
    ap_mac: Mac,
    sta_config: RadioConfig,
    ap_config: RadioConfig,
    power_save: bool,
    tx_power_dbm: u8,
    ap_clients: Vec<ApClientInfo>,
    sta_rx_cb: Option<RxCallback>,
    ap_rx_cb: Option<RxCallback>,
    sta_tx_log: Vec<Vec<u8>>,
    ap_tx_log: Vec<Vec<u8>>,
    sta_dhcpc_running: bool,
    ap_dhcps_running: bool,
    sta_ip: (Ip4, Ip4, Ip4),
    ap_ip: (Ip4, Ip4, Ip4),
    ap_ip_history: Vec<(Ip4, Ip4, Ip4)>,
    stack_rx_log: Vec<(Iface, Vec<u8>)>,
    set_mac_should_fail: bool,
    connect_should_fail: bool,
    connect_delay: Duration,
}

/// The in-process reference platform. Cheap to clone (wraps `Arc`-free
/// internals behind `&self`, same as a real driver handle would be):
/// construct one, wrap it in three `Arc<dyn Trait>` coercions, hand them to
/// the engine.
pub struct SimPlatform {
    inner: Mutex<Inner>,
    event_tx: Sender<BridgeEvent>,
    event_rx: Receiver<BridgeEvent>,
}

impl SimPlatform {
    pub fn new(original_sta_mac: Mac, ap_mac: Mac) -> SimPlatform {
        let (event_tx, event_rx) = unbounded();
        SimPlatform {
            inner: Mutex::new(Inner {
                sta_mac: original_sta_mac,
                ap_mac,
                sta_config: RadioConfig {
                    ssid: String::new(),
                    password: String::new(),
                    authmode: AuthMode::Wpa2Psk,
                    bssid: None,
                    channel: 0,
                },
                ap_config: RadioConfig {
                    ssid: String::new(),
                    password: String::new(),
                    authmode: AuthMode::Wpa2Psk,
                    bssid: None,
                    channel: 6,
                },
                power_save: true,
                tx_power_dbm: 20,
                ap_clients: Vec::new(),
                sta_rx_cb: None,
                ap_rx_cb: None,
                sta_tx_log: Vec::new(),
                ap_tx_log: Vec::new(),
                sta_dhcpc_running: true,
                ap_dhcps_running: false,
                sta_ip: (Ip4::ZERO, Ip4::ZERO, Ip4::ZERO),
                ap_ip: (Ip4::ZERO, Ip4::ZERO, Ip4::ZERO),
                ap_ip_history: Vec::new(),
                stack_rx_log: Vec::new(),
                set_mac_should_fail: false,
                connect_should_fail: false,
                connect_delay: Duration::from_millis(5),
            }),
            event_tx,
            event_rx,
        }
    }

    // --- test/demo controls, not part of any trait boundary ---

    pub fn set_mac_failure(&self, should_fail: bool) {
        self.inner.lock().unwrap().set_mac_should_fail = should_fail;
    }

    pub fn set_connect_failure(&self, should_fail: bool) {
        self.inner.lock().unwrap().connect_should_fail = should_fail;
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().connect_delay = delay;
    }

    pub fn sta_mac(&self) -> Mac {
        self.inner.lock().unwrap().sta_mac
    }

    pub fn sta_tx_log(&self) -> Vec<Vec<u8>> {
        self.inner.lock().unwrap().sta_tx_log.clone()
    }

    pub fn ap_tx_log(&self) -> Vec<Vec<u8>> {
        self.inner.lock().unwrap().ap_tx_log.clone()
    }

    pub fn stack_rx_log(&self) -> Vec<(Iface, Vec<u8>)> {
        self.inner.lock().unwrap().stack_rx_log.clone()
    }

    pub fn ap_ip_history(&self) -> Vec<(Ip4, Ip4, Ip4)> {
        self.inner.lock().unwrap().ap_ip_history.clone()
    }

    pub fn ap_dhcps_running(&self) -> bool {
        self.inner.lock().unwrap().ap_dhcps_running
    }

    pub fn sta_dhcpc_running(&self) -> bool {
        self.inner.lock().unwrap().sta_dhcpc_running
    }

    /// Feed a frame into the STA rx callback, as the driver would on
    /// receiving it off the air.
    pub fn deliver_sta_rx(&self, frame: Vec<u8>) {
        let cb = self.inner.lock().unwrap().sta_rx_cb.clone();
        if let Some(cb) = cb {
            cb(RxBuffer::new(frame));
        }
    }

    /// Feed a frame into the AP rx callback.
    pub fn deliver_ap_rx(&self, frame: Vec<u8>) {
        let cb = self.inner.lock().unwrap().ap_rx_cb.clone();
        if let Some(cb) = cb {
            cb(RxBuffer::new(frame));
        }
    }

    pub fn push_event(&self, event: BridgeEvent) {
        let _ = self.event_tx.try_send(event);
    }

    /// Simulate a client associating to the AP.
    pub fn join_client(&self, mac: Mac, aid: u16) {
        self.inner.lock().unwrap().ap_clients.push(ApClientInfo { mac, aid, rssi: -50 });
        self.push_event(BridgeEvent::ApClientJoined { mac });
    }

    /// Simulate a client disassociating.
    pub fn leave_client(&self, mac: Mac) {
        self.inner.lock().unwrap().ap_clients.retain(|c| c.mac != mac);
        self.push_event(BridgeEvent::ApClientLeft { mac });
    }

    pub fn push_got_ip(&self, ip: Ip4, netmask: Ip4, gateway: Ip4) {
        self.inner.lock().unwrap().sta_ip = (ip, netmask, gateway);
        self.push_event(BridgeEvent::GotIp(GotIpInfo { ip, netmask, gateway }));
    }

    pub fn push_lost_ip(&self) {
        self.inner.lock().unwrap().sta_ip = (Ip4::ZERO, Ip4::ZERO, Ip4::ZERO);
        self.push_event(BridgeEvent::LostIp);
    }
}

impl RadioDriver for SimPlatform {
    fn get_mac(&self, iface: Iface) -> Mac {
        let inner = self.inner.lock().unwrap();
        match iface {
            Iface::Sta => inner.sta_mac,
            Iface::Ap => inner.ap_mac,
        }
    }

    fn set_mac(&self, iface: Iface, mac: Mac) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.set_mac_should_fail {
            bail!("sim: set_mac refused by driver");
        }
        match iface {
            Iface::Sta => inner.sta_mac = mac,
            Iface::Ap => inner.ap_mac = mac,
        }
        Ok(())
    }

    fn get_config(&self, iface: Iface) -> RadioConfig {
        let inner = self.inner.lock().unwrap();
        match iface {
            Iface::Sta => inner.sta_config.clone(),
            Iface::Ap => inner.ap_config.clone(),
        }
    }

    fn set_config(&self, iface: Iface, config: RadioConfig) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        match iface {
            Iface::Sta => inner.sta_config = config,
            Iface::Ap => inner.ap_config = config,
        }
        Ok(())
    }

    fn connect(&self) -> anyhow::Result<()> {
        let (delay, should_fail, bssid, channel) = {
            let inner = self.inner.lock().unwrap();
            let bssid = inner.sta_config.bssid.unwrap_or(Mac([0xde, 0xad, 0xbe, 0xef, 0x00, 0x01]));
            let channel = if inner.sta_config.channel != 0 { inner.sta_config.channel } else { 6 };
            (inner.connect_delay, inner.connect_should_fail, bssid, channel)
        };
        let tx = self.event_tx.clone();
        async_std::task::spawn(async move {
            async_std::task::sleep(delay).await;
            if should_fail {
                trace!("sim: connect attempt did not complete");
                return;
            }
            let _ = tx.send(BridgeEvent::StaConnected(StaConnectedInfo { bssid, channel })).await;
        });
        Ok(())
    }

    fn disconnect(&self) -> anyhow::Result<()> {
        let tx = self.event_tx.clone();
        async_std::task::spawn(async move {
            async_std::task::sleep(Duration::from_millis(5)).await;
            let _ = tx
                .send(BridgeEvent::StaDisconnected(StaDisconnectedInfo { reason: 8 }))
                .await;
        });
        Ok(())
    }

    fn set_power_save(&self, enabled: bool) {
        self.inner.lock().unwrap().power_save = enabled;
    }

    fn set_max_tx_power(&self, dbm: u8) {
        self.inner.lock().unwrap().tx_power_dbm = dbm;
    }

    fn set_bandwidth(&self, _iface: Iface, _bandwidth: Bandwidth) {}

    fn ap_client_list(&self) -> Vec<ApClientInfo> {
        self.inner.lock().unwrap().ap_clients.clone()
    }

    fn get_ap_record(&self) -> Option<ApRecord> {
        let inner = self.inner.lock().unwrap();
        inner.sta_config.bssid.map(|bssid| ApRecord {
            ssid: inner.sta_config.ssid.clone(),
            rssi: -40,
            channel: inner.sta_config.channel,
            bssid,
        })
    }

    fn register_rx(&self, iface: Iface, callback: Option<RxCallback>) {
        let mut inner = self.inner.lock().unwrap();
        match iface {
            Iface::Sta => inner.sta_rx_cb = callback,
            Iface::Ap => inner.ap_rx_cb = callback,
        }
    }

    fn tx(&self, iface: Iface, data: &[u8]) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        match iface {
            Iface::Sta => inner.sta_tx_log.push(data.to_vec()),
            Iface::Ap => inner.ap_tx_log.push(data.to_vec()),
        }
        Ok(())
    }
}

impl IpStack for SimPlatform {
    fn dhcpc_stop(&self, iface: Iface) {
        if iface == Iface::Sta {
            self.inner.lock().unwrap().sta_dhcpc_running = false;
        }
    }

    fn dhcpc_start(&self, iface: Iface) {
        if iface == Iface::Sta {
            self.inner.lock().unwrap().sta_dhcpc_running = true;
        }
    }

    fn dhcps_stop(&self, iface: Iface) {
        if iface == Iface::Ap {
            self.inner.lock().unwrap().ap_dhcps_running = false;
        }
    }

    fn dhcps_start(&self, iface: Iface) {
        if iface == Iface::Ap {
            self.inner.lock().unwrap().ap_dhcps_running = true;
        }
    }

    fn set_ip_info(&self, iface: Iface, ip: Ip4, netmask: Ip4, gateway: Ip4) {
        let mut inner = self.inner.lock().unwrap();
        match iface {
            Iface::Sta => inner.sta_ip = (ip, netmask, gateway),
            Iface::Ap => {
                inner.ap_ip = (ip, netmask, gateway);
                inner.ap_ip_history.push((ip, netmask, gateway));
            }
        }
    }

    fn receive(&self, iface: Iface, buffer: RxBuffer) {
        self.inner
            .lock()
            .unwrap()
            .stack_rx_log
            .push((iface, buffer.into_vec()));
    }
}

#[async_trait]
impl EventBus for SimPlatform {
    async fn recv(&self) -> Option<BridgeEvent> {
        self.event_rx.recv().await.ok()
    }
}

/// A fixed, trivially-satisfiable `ConfigStore` used by `--simulate` and
/// tests that only care about wiring, not configuration-loader behaviour
/// (that is covered directly in `conf.rs`'s own tests).
pub struct SimConfigStore {
    pub upstream_ssid: String,
    pub upstream_password: String,
    pub ap_ssid: String,
    pub ap_password: String,
    pub tx_power_dbm: u8,
    pub max_clients: u8,
}

impl Default for SimConfigStore {
    fn default() -> Self {
        SimConfigStore {
            upstream_ssid: "Home".into(),
            upstream_password: "password123".into(),
            ap_ssid: "repeater".into(),
            ap_password: "repeater123".into(),
            tx_power_dbm: 20,
            max_clients: 4,
        }
    }
}

impl ConfigStore for SimConfigStore {
    fn upstream_ssid(&self) -> &str {
        &self.upstream_ssid
    }

    fn upstream_password(&self) -> &str {
        &self.upstream_password
    }

    fn ap_ssid(&self) -> &str {
        &self.ap_ssid
    }

    fn ap_password(&self) -> &str {
        &self.ap_password
    }

    fn tx_power_dbm(&self) -> u8 {
        self.tx_power_dbm
    }

    fn max_clients(&self) -> u8 {
        self.max_clients
    }
}
