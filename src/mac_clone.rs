//! The MAC-clone state machine: serialises disconnect → set-MAC →
//! reconnect sequences and manages the BSSID lock.
//!
//! Requests are carried as a single-slot job: the caller (the event
//! router) never blocks — it `task::spawn`s [`run_transaction`], which
//! itself performs the bounded `try_lock` retry loop before doing any of
//! the actual disconnect/reconnect work. At most one transaction is ever
//! in flight.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::warn;

use crate::ap_ip;
use crate::context::BridgeContext;
use crate::event_bits::{Bit, EventBits};
use crate::forwarder;
use crate::traits::{IpStack, RadioDriver};
use crate::types::{
    Iface, Mac, RepeaterState, AUTO_RECONNECT_BACKOFF, DISCONNECT_WAIT, DUMMY_STA_IP,
    DUMMY_STA_NETMASK, POST_BSSID_LOCK_SETTLE, POST_DISCONNECT_SETTLE, RECONNECT_WAIT,
    TRANSACTION_LOCK_TIMEOUT,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Clone,
    Restore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloneRequest {
    pub target_mac: Mac,
    pub kind: RequestKind,
}

/// Timeouts driving the clone/restore transactions. Tests override these
/// to keep the suite fast without changing semantics.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub disconnect_wait: Duration,
    pub reconnect_wait: Duration,
    pub post_disconnect_settle: Duration,
    pub post_bssid_lock_settle: Duration,
    pub auto_reconnect_backoff: Duration,
    pub transaction_lock_timeout: Duration,
    /// Polling granularity for the `try_lock` retry loop below.
    pub lock_poll_interval: Duration,
}

impl Default for Timeouts {
    fn default() -> Timeouts {
        Timeouts {
            disconnect_wait: DISCONNECT_WAIT,
            reconnect_wait: RECONNECT_WAIT,
            post_disconnect_settle: POST_DISCONNECT_SETTLE,
            post_bssid_lock_settle: POST_BSSID_LOCK_SETTLE,
            auto_reconnect_backoff: AUTO_RECONNECT_BACKOFF,
            transaction_lock_timeout: TRANSACTION_LOCK_TIMEOUT,
            lock_poll_interval: Duration::from_millis(25),
        }
    }
}

/// Entry point the event router spawns as a fire-and-forget task: a
/// bounded single-slot job. Acquires the transaction mutex with a 5 s
/// total deadline across a short retry loop; a request arriving while a
/// transaction is already in flight is dropped with a warning, never
/// queued or merged.
pub async fn run_transaction(
    ctx: Arc<BridgeContext>,
    driver: Arc<dyn RadioDriver>,
    ip_stack: Arc<dyn IpStack>,
    bits: Arc<EventBits>,
    timeouts: Timeouts,
    req: CloneRequest,
) {
    let deadline = Instant::now() + timeouts.transaction_lock_timeout;
    let guard = loop {
        if let Some(guard) = ctx.transaction_lock.try_lock() {
            break guard;
        }
        if Instant::now() >= deadline {
            warn!("mac-change request {:?} dropped: a transaction is already in flight", req.kind);
            return;
        }
        async_std::task::sleep(timeouts.lock_poll_interval).await;
    };

    match req.kind {
        RequestKind::Clone => {
            clone_transaction(&ctx, &driver, &ip_stack, &bits, &timeouts, req.target_mac).await
        }
        RequestKind::Restore => restore_transaction(&ctx, &driver, &ip_stack, &bits, &timeouts).await,
    }

    drop(guard);
}

/// Disconnect → set-MAC → reconnect, pinning the upstream BSSID/channel
/// once known so the reconnect skips a full scan.
async fn clone_transaction(
    ctx: &Arc<BridgeContext>,
    driver: &Arc<dyn RadioDriver>,
    ip_stack: &Arc<dyn IpStack>,
    bits: &EventBits,
    timeouts: &Timeouts,
    target_mac: Mac,
) {
    ctx.set_state(RepeaterState::MacChanging);
    forwarder::forwarding_stop(ctx, driver);

    ctx.set_suppress_auto_reconnect(true);

    bits.clear(Bit::StaDisconnected).await;
    let _ = driver.disconnect();
    bits.wait_for(Bit::StaDisconnected, timeouts.disconnect_wait).await;
    async_std::task::sleep(timeouts.post_disconnect_settle).await;

    ip_stack.dhcpc_stop(Iface::Sta);
    ip_stack.set_ip_info(Iface::Sta, DUMMY_STA_IP, DUMMY_STA_NETMASK, crate::types::Ip4::ZERO);

    if let Err(e) = driver.set_mac(Iface::Sta, target_mac) {
        warn!("clone transaction aborted, set_mac refused: {e}");
        let _ = driver.set_mac(Iface::Sta, ctx.original_sta_mac);
        ctx.set_suppress_auto_reconnect(false);
        let _ = driver.connect();
        ctx.set_state(RepeaterState::Idle);
        return;
    }
    ctx.set_mac_cloned(true);

    let lock = *ctx.upstream_lock.lock().unwrap();
    if lock.locked {
        let mut config = driver.get_config(Iface::Sta);
        config.bssid = Some(lock.bssid);
        config.channel = lock.channel;
        if let Err(e) = driver.set_config(Iface::Sta, config) {
            warn!("failed to pin bssid/channel for reconnect: {e}");
        }
        async_std::task::sleep(timeouts.post_bssid_lock_settle).await;
    }

    ctx.set_suppress_auto_reconnect(false);
    bits.clear(Bit::StaConnected).await;
    let _ = driver.connect();
    let connected = bits.wait_for(Bit::StaConnected, timeouts.reconnect_wait).await;

    if connected {
        ctx.set_state(RepeaterState::Bridging);
        // Forwarding is (re-)installed by the event router on the
        // `StaConnected` event that follows.
        return;
    }

    warn!("clone transaction timed out waiting for reconnect, reverting to original MAC");
    ctx.set_suppress_auto_reconnect(true);
    let _ = driver.disconnect();
    bits.wait_for(Bit::StaDisconnected, timeouts.disconnect_wait).await;

    let _ = driver.set_mac(Iface::Sta, ctx.original_sta_mac);
    ctx.set_mac_cloned(false);
    ip_stack.dhcpc_start(Iface::Sta);

    let mut config = driver.get_config(Iface::Sta);
    config.clear_bssid_lock();
    let _ = driver.set_config(Iface::Sta, config);

    ctx.set_suppress_auto_reconnect(false);
    let _ = driver.connect();
    ctx.set_state(RepeaterState::Idle);
}

/// Disconnect → restore the factory MAC → reconnect, clearing the
/// MAC-NAT table and the discovered AP subnet along the way.
async fn restore_transaction(
    ctx: &Arc<BridgeContext>,
    driver: &Arc<dyn RadioDriver>,
    ip_stack: &Arc<dyn IpStack>,
    bits: &EventBits,
    timeouts: &Timeouts,
) {
    ctx.set_state(RepeaterState::MacRestoring);
    forwarder::forwarding_stop(ctx, driver);
    ctx.set_suppress_auto_reconnect(true);

    bits.clear(Bit::StaDisconnected).await;
    let _ = driver.disconnect();
    bits.wait_for(Bit::StaDisconnected, timeouts.disconnect_wait).await;

    let _ = driver.set_mac(Iface::Sta, ctx.original_sta_mac);
    ctx.set_mac_cloned(false);

    ip_stack.dhcpc_start(Iface::Sta);
    ctx.mac_nat.lock().unwrap().clear();
    ctx.set_ap_ip_from_sniff(false);
    ap_ip::restore_management_ip(ip_stack);

    let mut config = driver.get_config(Iface::Sta);
    config.clear_bssid_lock();
    let _ = driver.set_config(Iface::Sta, config);

    ctx.set_suppress_auto_reconnect(false);
    bits.clear(Bit::StaConnected).await;
    let _ = driver.connect();
    bits.wait_for(Bit::StaConnected, timeouts.reconnect_wait).await;

    // Regardless of outcome: the router's own auto-reconnect handling on
    // `StaDisconnected` takes care of further retries from here.
    ctx.set_state(RepeaterState::Idle);
}
