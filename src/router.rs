//! The event router: reacts to radio/IP events, triggers clone/restore,
//! publishes the `StaConnected`/`StaDisconnected` bits the transaction
//! worker waits on.
//!
//! Deliberately a thin, non-blocking dispatcher: it only ever *submits*
//! clone/restore requests by `task::spawn`ing [`mac_clone::run_transaction`]
//! rather than awaiting it inline, so a single slow transaction can never
//! stall the event loop. The one genuinely blocking-looking step, the
//! post-disconnect auto-reconnect backoff, is itself spawned off so the
//! router's own event loop keeps draining the bus.

use std::sync::Arc;

use async_std::task;
use log::{debug, info};

use crate::ap_ip;
use crate::context::BridgeContext;
use crate::event_bits::{Bit, EventBits};
use crate::events::BridgeEvent;
use crate::forwarder;
use crate::mac_clone::{self, CloneRequest, RequestKind, Timeouts};
use crate::traits::{EventBus, IpStack, RadioDriver};
use crate::types::RepeaterState;

pub struct Router {
    ctx: Arc<BridgeContext>,
    driver: Arc<dyn RadioDriver>,
    ip_stack: Arc<dyn IpStack>,
    bits: Arc<EventBits>,
    timeouts: Timeouts,
}

impl Router {
    pub fn new(
        ctx: Arc<BridgeContext>,
        driver: Arc<dyn RadioDriver>,
        ip_stack: Arc<dyn IpStack>,
        bits: Arc<EventBits>,
        timeouts: Timeouts,
    ) -> Router {
        Router {
            ctx,
            driver,
            ip_stack,
            bits,
            timeouts,
        }
    }

    /// Drains `event_bus` until it closes, dispatching each event in turn.
    pub async fn run(&self, event_bus: &dyn EventBus) {
        while let Some(event) = event_bus.recv().await {
            self.handle(event).await;
        }
    }

    pub async fn handle(&self, event: BridgeEvent) {
        match event {
            BridgeEvent::StaStarted => {
                if !self.ctx.suppress_auto_reconnect() {
                    let _ = self.driver.connect();
                }
            }
            BridgeEvent::StaConnected(info) => {
                self.ctx.set_sta_connected(true);
                self.bits.set(Bit::StaConnected).await;
                self.bits.clear(Bit::StaDisconnected).await;

                let mut lock = self.ctx.upstream_lock.lock().unwrap();
                if !lock.locked {
                    lock.bssid = info.bssid;
                    lock.channel = info.channel;
                    lock.locked = true;
                    info!("upstream lock set: bssid={} channel={}", info.bssid, info.channel);
                }
                drop(lock);

                if self.ctx.mac_cloned() {
                    forwarder::forwarding_start(&self.ctx, &self.driver, &self.ip_stack);
                }
            }
            BridgeEvent::StaDisconnected(info) => {
                self.ctx.set_sta_connected(false);
                self.bits.set(Bit::StaDisconnected).await;
                self.bits.clear(Bit::StaConnected).await;
                forwarder::forwarding_stop(&self.ctx, &self.driver);

                debug!("STA disconnected, reason={}", info.reason);
                if !self.ctx.suppress_auto_reconnect() {
                    let driver = self.driver.clone();
                    let backoff = self.timeouts.auto_reconnect_backoff;
                    task::spawn(async move {
                        task::sleep(backoff).await;
                        let _ = driver.connect();
                    });
                }
            }
            BridgeEvent::ApClientJoined { mac } => {
                self.ctx.increment_client_count();
                if self.ctx.state() == RepeaterState::Idle && !self.ctx.mac_cloned() {
                    self.ctx.set_primary_client_mac(mac);
                    self.spawn_transaction(CloneRequest { target_mac: mac, kind: RequestKind::Clone });
                } else {
                    debug!("client {mac} joined; already bridging, handled by MAC-NAT");
                }
            }
            BridgeEvent::ApClientLeft { mac } => {
                self.ctx.decrement_client_count();
                if self.ctx.mac_cloned() && mac == self.ctx.primary_client_mac() {
                    let remaining: Vec<_> = self
                        .driver
                        .ap_client_list()
                        .into_iter()
                        .filter(|c| c.mac != mac)
                        .collect();
                    if remaining.is_empty() {
                        self.spawn_transaction(CloneRequest {
                            target_mac: self.ctx.original_sta_mac,
                            kind: RequestKind::Restore,
                        });
                    } else {
                        let next = remaining[0].mac;
                        self.ctx.set_primary_client_mac(next);
                        self.spawn_transaction(CloneRequest { target_mac: next, kind: RequestKind::Clone });
                    }
                }
            }
            BridgeEvent::GotIp(info) => {
                self.bits.set(Bit::StaConnected).await;
                ap_ip::mirror_sta_ip(&self.ctx, &*self.ip_stack, info.ip, info.netmask);
            }
            BridgeEvent::LostIp => {
                ap_ip::restore_management_ip(&*self.ip_stack);
            }
        }
    }

    fn spawn_transaction(&self, req: CloneRequest) {
        let ctx = self.ctx.clone();
        let driver = self.driver.clone();
        let ip_stack = self.ip_stack.clone();
        let bits = self.bits.clone();
        let timeouts = self.timeouts;
        task::spawn(async move {
            mac_clone::run_transaction(ctx, driver, ip_stack, bits, timeouts, req).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimPlatform;
    use crate::types::Mac;

    fn fast_timeouts() -> Timeouts {
        Timeouts {
            disconnect_wait: std::time::Duration::from_millis(200),
            reconnect_wait: std::time::Duration::from_millis(200),
            post_disconnect_settle: std::time::Duration::from_millis(5),
            post_bssid_lock_settle: std::time::Duration::from_millis(5),
            auto_reconnect_backoff: std::time::Duration::from_millis(5),
            transaction_lock_timeout: std::time::Duration::from_millis(200),
            lock_poll_interval: std::time::Duration::from_millis(5),
        }
    }

    fn setup() -> (Arc<BridgeContext>, Arc<SimPlatform>, Router) {
        let original = Mac([1; 6]);
        let ap_mac = Mac([2; 6]);
        let ctx = Arc::new(BridgeContext::new(original, ap_mac));
        let platform = Arc::new(SimPlatform::new(original, ap_mac));
        let driver: Arc<dyn RadioDriver> = platform.clone();
        let ip_stack: Arc<dyn IpStack> = platform.clone();
        let bits = Arc::new(EventBits::new());
        let router = Router::new(ctx.clone(), driver, ip_stack, bits, fast_timeouts());
        (ctx, platform, router)
    }

    /// Runs the platform's synthesized events through the router for
    /// `rounds` iterations, the way `main.rs` would wire `Router::run`
    /// against a real event bus.
    async fn pump(platform: Arc<SimPlatform>, router: Arc<Router>, rounds: usize) {
        use crate::traits::EventBus;
        for _ in 0..rounds {
            if let Ok(Some(event)) =
                async_std::future::timeout(std::time::Duration::from_millis(80), platform.recv()).await
            {
                router.handle(event).await;
            }
        }
    }

    #[async_std::test]
    async fn client_join_triggers_clone_to_bridging() {
        // Single client joins an idle engine and the clone transaction
        // carries it all the way to bridging.
        let (ctx, platform, router) = setup();
        let router = Arc::new(router);
        let client = Mac([0xaa, 0xbb, 0xcc, 0x01, 0x02, 0x03]);

        platform.join_client(client, 1);
        pump(platform.clone(), router.clone(), 12).await;

        assert_eq!(ctx.state(), RepeaterState::Bridging);
        assert_eq!(ctx.primary_client_mac(), client);
        assert!(!platform.sta_dhcpc_running());
    }

    #[async_std::test]
    async fn last_client_leave_restores_idle() {
        // The only bridged client leaves; the engine restores to idle.
        let (ctx, platform, router) = setup();
        let router = Arc::new(router);
        let client = Mac([0xaa, 0xbb, 0xcc, 0x01, 0x02, 0x03]);

        platform.join_client(client, 1);
        pump(platform.clone(), router.clone(), 12).await;
        assert_eq!(ctx.state(), RepeaterState::Bridging);

        platform.leave_client(client);
        pump(platform.clone(), router.clone(), 12).await;

        assert_eq!(ctx.state(), RepeaterState::Idle);
        assert!(!ctx.mac_cloned());
        assert!(platform.ap_dhcps_running());
    }

    #[async_std::test]
    async fn primary_leaving_with_others_present_repivots() {
        // Primary client leaves while a second client is still present: the
        // engine re-pivots the clone onto the remaining client instead of
        // restoring.
        let (ctx, platform, router) = setup();
        let router = Arc::new(router);
        let primary = Mac([0xaa, 0, 0, 0, 0, 0x03]);
        let second = Mac([0xbb, 0, 0, 0, 0, 0x07]);

        platform.join_client(primary, 1);
        pump(platform.clone(), router.clone(), 12).await;
        assert_eq!(ctx.state(), RepeaterState::Bridging);

        platform.join_client(second, 2);
        pump(platform.clone(), router.clone(), 4).await; // second join is a log-only no-op

        platform.leave_client(primary);
        pump(platform.clone(), router.clone(), 12).await;

        assert_eq!(ctx.state(), RepeaterState::Bridging);
        assert_eq!(ctx.primary_client_mac(), second);
    }

    #[async_std::test]
    async fn got_ip_mirrors_onto_ap_and_lost_ip_restores_management() {
        let (ctx, platform, router) = setup();
        let router = Arc::new(router);
        platform.push_got_ip(
            crate::types::Ip4::from_octets(192, 168, 1, 50),
            crate::types::Ip4::from_octets(255, 255, 255, 0),
            crate::types::Ip4::from_octets(192, 168, 1, 1),
        );
        pump(platform.clone(), router.clone(), 2).await;
        assert_eq!(
            platform.ap_ip_history().last(),
            Some(&(
                crate::types::Ip4::from_octets(192, 168, 1, 50),
                crate::types::Ip4::from_octets(255, 255, 255, 0),
                crate::types::Ip4::ZERO
            ))
        );

        platform.push_lost_ip();
        pump(platform.clone(), router.clone(), 2).await;
        assert_eq!(
            platform.ap_ip_history().last(),
            Some(&(crate::types::MANAGEMENT_IP, crate::types::MANAGEMENT_NETMASK, crate::types::MANAGEMENT_IP))
        );
        let _ = ctx;
    }
}
