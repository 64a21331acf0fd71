//! The forwarder: the two rx entry points installed only while
//! `forwarding_active`, classifying every frame and dispatching it to the
//! rewriter, the DHCP sniffer, the peer interface's `tx`, or the local IP
//! stack.
//!
//! Both entry points are synchronous, non-allocating, lock-free (beyond
//! the `std::sync::Mutex` around the MAC-NAT table, which is never held
//! across an `.await`) and never fail: a malformed or too-short frame is
//! simply dropped rather than surfaced as an error.

use std::sync::Arc;

use log::trace;

use crate::buffer::RxBuffer;
use crate::context::BridgeContext;
use crate::dhcp_sniff;
use crate::rewriter;
use crate::traits::{IpStack, RadioDriver, RxCallback};
use crate::types::{Iface, Mac};

const ETH_DST: usize = 0;
const ETH_SRC: usize = 6;
const ETH_HDR_LEN: usize = 14;

fn dst_mac(frame: &[u8]) -> Option<Mac> {
    Mac::from_slice(frame.get(ETH_DST..ETH_DST + 6)?)
}

fn src_mac(frame: &[u8]) -> Option<Mac> {
    Mac::from_slice(frame.get(ETH_SRC..ETH_SRC + 6)?)
}

/// STA rx entry point: a frame arriving off the upstream air interface,
/// bound for the AP side (and, when addressed locally, this device's own
/// IP stack).
pub fn on_sta_rx(ctx: &BridgeContext, driver: &dyn RadioDriver, ip_stack: &dyn IpStack, mut buffer: RxBuffer) {
    if buffer.len() < ETH_HDR_LEN {
        return;
    }
    let frame = buffer.as_mut_slice();
    let Some(dst) = dst_mac(frame) else { return };

    if dhcp_sniff::is_dhcp_ack_candidate(frame) {
        dhcp_sniff::sniff_and_apply(ctx, ip_stack, frame);
    }

    if !dst.is_multicast() && ctx.client_count() > 1 {
        let mut nat = ctx.mac_nat.lock().unwrap();
        rewriter::rewrite_downstream(frame, &nat, ctx.primary_client_mac());
        drop(nat);
    }

    if let Err(e) = driver.tx(Iface::Ap, buffer.as_slice()) {
        trace!("sta->ap tx failed: {e}");
    }

    if dst.is_multicast() {
        ip_stack.receive(Iface::Sta, buffer);
    } else if dst == ctx.original_sta_mac || dst == ctx.primary_client_mac() {
        ip_stack.receive(Iface::Sta, buffer);
    }
    // else: pure forward, buffer drops here and releases back to the driver.
}

/// AP rx entry point: a frame from a bridged client, bound upstream via
/// the STA (and, when addressed to the AP's own MAC, the local
/// management stack).
pub fn on_ap_rx(ctx: &BridgeContext, driver: &dyn RadioDriver, ip_stack: &dyn IpStack, mut buffer: RxBuffer) {
    if buffer.len() < ETH_HDR_LEN {
        return;
    }
    let frame = buffer.as_mut_slice();
    let Some(dst) = dst_mac(frame) else { return };
    let Some(src) = src_mac(frame) else { return };

    // Gated on src, not dst: a non-primary client's DHCPDISCOVER is itself
    // broadcast, and still needs its Ethernet src rewritten to the
    // impersonated primary's MAC (and the broadcast-assist applied) so the
    // upstream only ever sees one hardware address on this link.
    if src != ctx.primary_client_mac() && ctx.client_count() > 1 {
        let mut nat = ctx.mac_nat.lock().unwrap();
        rewriter::rewrite_upstream(frame, &mut nat, ctx.primary_client_mac());
        drop(nat);
    }

    if dst.is_multicast() {
        if ctx.sta_connected() {
            if let Err(e) = driver.tx(Iface::Sta, buffer.as_slice()) {
                trace!("ap->sta tx failed: {e}");
            }
        }
        ip_stack.receive(Iface::Ap, buffer);
    } else if dst == ctx.ap_mac {
        ip_stack.receive(Iface::Ap, buffer);
    } else {
        if let Err(e) = driver.tx(Iface::Sta, buffer.as_slice()) {
            trace!("ap->sta tx failed: {e}");
        }
        // pure forward: buffer drops here.
    }
}

/// Install both rx callbacks and disable power-save for latency. Idempotent.
pub fn forwarding_start(
    ctx: &Arc<BridgeContext>,
    driver: &Arc<dyn RadioDriver>,
    ip_stack: &Arc<dyn IpStack>,
) {
    if ctx.forwarding_active() {
        return;
    }
    driver.set_power_save(false);

    let sta_cb: RxCallback = {
        let ctx = ctx.clone();
        let driver = driver.clone();
        let ip_stack = ip_stack.clone();
        Arc::new(move |buf: RxBuffer| on_sta_rx(&ctx, &*driver, &*ip_stack, buf))
    };
    let ap_cb: RxCallback = {
        let ctx = ctx.clone();
        let driver = driver.clone();
        let ip_stack = ip_stack.clone();
        Arc::new(move |buf: RxBuffer| on_ap_rx(&ctx, &*driver, &*ip_stack, buf))
    };

    driver.register_rx(Iface::Sta, Some(sta_cb));
    driver.register_rx(Iface::Ap, Some(ap_cb));
    ctx.set_forwarding_active(true);
    trace!("forwarding started");
}

/// Uninstall both rx callbacks, re-enable minimum modem sleep. Idempotent.
pub fn forwarding_stop(ctx: &Arc<BridgeContext>, driver: &Arc<dyn RadioDriver>) {
    if !ctx.forwarding_active() {
        return;
    }
    driver.register_rx(Iface::Sta, None);
    driver.register_rx(Iface::Ap, None);
    driver.set_power_save(true);
    ctx.set_forwarding_active(false);
    trace!("forwarding stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimPlatform;
    use crate::types::Ip4;

    fn eth_frame(dst: Mac, src: Mac, ethertype: u16, payload_len: usize) -> Vec<u8> {
        let mut f = vec![0u8; ETH_HDR_LEN + payload_len];
        f[0..6].copy_from_slice(&dst.0);
        f[6..12].copy_from_slice(&src.0);
        f[12..14].copy_from_slice(&ethertype.to_be_bytes());
        f
    }

    fn ctx_with_primary(original: Mac, ap_mac: Mac, primary: Mac) -> BridgeContext {
        let ctx = BridgeContext::new(original, ap_mac);
        ctx.set_mac_cloned(true);
        ctx.set_primary_client_mac(primary);
        ctx
    }

    #[test]
    fn sta_rx_broadcast_is_forwarded_and_handed_to_stack() {
        let original = Mac([1; 6]);
        let ap_mac = Mac([2; 6]);
        let primary = Mac([0xaa, 0, 0, 0, 0, 0x03]);
        let ctx = ctx_with_primary(original, ap_mac, primary);
        let platform = SimPlatform::new(original, ap_mac);

        let frame = eth_frame(Mac::BROADCAST, Mac([9; 6]), 0x0800, 40);
        on_sta_rx(&ctx, &platform, &platform, RxBuffer::new(frame.clone()));

        assert_eq!(platform.ap_tx_log(), vec![frame.clone()]);
        assert_eq!(platform.stack_rx_log(), vec![(Iface::Sta, frame)]);
    }

    #[test]
    fn sta_rx_foreign_unicast_is_pure_forward() {
        let original = Mac([1; 6]);
        let ap_mac = Mac([2; 6]);
        let primary = Mac([0xaa, 0, 0, 0, 0, 0x03]);
        let ctx = ctx_with_primary(original, ap_mac, primary);
        let platform = SimPlatform::new(original, ap_mac);

        let other_client = Mac([0xbb, 0, 0, 0, 0, 0x07]);
        let frame = eth_frame(other_client, Mac([9; 6]), 0x0800, 40);
        on_sta_rx(&ctx, &platform, &platform, RxBuffer::new(frame.clone()));

        assert_eq!(platform.ap_tx_log(), vec![frame]);
        assert!(platform.stack_rx_log().is_empty());
    }

    #[test]
    fn sta_rx_to_primary_client_is_handed_to_stack() {
        let original = Mac([1; 6]);
        let ap_mac = Mac([2; 6]);
        let primary = Mac([0xaa, 0, 0, 0, 0, 0x03]);
        let ctx = ctx_with_primary(original, ap_mac, primary);
        let platform = SimPlatform::new(original, ap_mac);

        let frame = eth_frame(primary, Mac([9; 6]), 0x0800, 40);
        on_sta_rx(&ctx, &platform, &platform, RxBuffer::new(frame.clone()));

        assert_eq!(platform.stack_rx_log(), vec![(Iface::Sta, frame)]);
    }

    #[test]
    fn sta_rx_rewrites_downstream_when_second_client_present() {
        // Once a second client is present, downstream traffic for it is redirected off the primary's MAC.
        let original = Mac([1; 6]);
        let ap_mac = Mac([2; 6]);
        let primary = Mac([0xaa, 0, 0, 0, 0, 0x03]);
        let ctx = ctx_with_primary(original, ap_mac, primary);
        ctx.increment_client_count();
        ctx.increment_client_count();
        let real_client = Mac([0xbb, 0, 0, 0, 0, 0x07]);
        let client_ip = Ip4::from_octets(192, 168, 1, 42);
        ctx.mac_nat.lock().unwrap().learn(client_ip, real_client);

        let platform = SimPlatform::new(original, ap_mac);
        let mut frame = eth_frame(primary, Mac([9; 6]), 0x0800, 40);
        frame[30..34].copy_from_slice(&client_ip.to_be_bytes());
        on_sta_rx(&ctx, &platform, &platform, RxBuffer::new(frame));

        let sent = platform.ap_tx_log();
        assert_eq!(&sent[0][0..6], &real_client.0);
    }

    #[test]
    fn ap_rx_unicast_to_ap_mac_goes_to_local_stack_only() {
        let original = Mac([1; 6]);
        let ap_mac = Mac([2; 6]);
        let primary = Mac([0xaa, 0, 0, 0, 0, 0x03]);
        let ctx = ctx_with_primary(original, ap_mac, primary);
        let platform = SimPlatform::new(original, ap_mac);

        let frame = eth_frame(ap_mac, primary, 0x0800, 40);
        on_ap_rx(&ctx, &platform, &platform, RxBuffer::new(frame.clone()));

        assert!(platform.sta_tx_log().is_empty());
        assert_eq!(platform.stack_rx_log(), vec![(Iface::Ap, frame)]);
    }

    #[test]
    fn ap_rx_unicast_to_other_host_forwards_upstream_rewritten_when_client_count_gt_1() {
        // DHCP broadcast-assist applied end-to-end through the forwarder.
        let original = Mac([1; 6]);
        let ap_mac = Mac([2; 6]);
        let primary = Mac([0xaa, 0, 0, 0, 0, 0x03]);
        let other_client = Mac([0xbb, 0, 0, 0, 0, 0x07]);
        let ctx = ctx_with_primary(original, ap_mac, primary);
        ctx.increment_client_count();
        ctx.increment_client_count();
        let platform = SimPlatform::new(original, ap_mac);

        let external_host = Mac([5, 5, 5, 5, 5, 5]);
        // Long enough that the DHCP flags byte (dhcp_off + 10 = 52) exists.
        let mut frame = eth_frame(external_host, other_client, 0x0800, 20 + 8 + 20);
        frame[14] = 0x45; // version 4, IHL 5
        frame[23] = 17; // proto udp
        frame[34..36].copy_from_slice(&68u16.to_be_bytes());
        frame[36..38].copy_from_slice(&67u16.to_be_bytes());
        on_ap_rx(&ctx, &platform, &platform, RxBuffer::new(frame));

        let sent = platform.sta_tx_log();
        assert_eq!(&sent[0][6..12], &primary.0);
        let dhcp_flags_off = 14 + 20 + 8 + 10;
        assert_eq!(sent[0][dhcp_flags_off] & 0x80, 0x80);
    }

    #[test]
    fn ap_rx_broadcast_dhcp_discover_from_non_primary_still_rewrites_src() {
        // A DHCPDISCOVER is itself Ethernet-broadcast; it still needs the
        // src rewrite and broadcast-assist, not just unicast upstream traffic.
        let original = Mac([1; 6]);
        let ap_mac = Mac([2; 6]);
        let primary = Mac([0xaa, 0, 0, 0, 0, 0x03]);
        let other_client = Mac([0xbb, 0, 0, 0, 0, 0x07]);
        let ctx = ctx_with_primary(original, ap_mac, primary);
        ctx.increment_client_count();
        ctx.increment_client_count();
        ctx.set_sta_connected(true);
        let platform = SimPlatform::new(original, ap_mac);

        // Long enough that the DHCP flags byte (dhcp_off + 10 = 52) exists.
        let mut frame = eth_frame(Mac::BROADCAST, other_client, 0x0800, 20 + 8 + 20);
        frame[14] = 0x45; // version 4, IHL 5
        frame[23] = 17; // proto udp
        frame[34..36].copy_from_slice(&68u16.to_be_bytes());
        frame[36..38].copy_from_slice(&67u16.to_be_bytes());
        on_ap_rx(&ctx, &platform, &platform, RxBuffer::new(frame));

        let sent = platform.sta_tx_log();
        assert_eq!(&sent[0][6..12], &primary.0);
        let dhcp_flags_off = 14 + 20 + 8 + 10;
        assert_eq!(sent[0][dhcp_flags_off] & 0x80, 0x80);
        let udp_csum_off = 14 + 20 + 6;
        assert_eq!(&sent[0][udp_csum_off..udp_csum_off + 2], &[0, 0]);
    }

    #[test]
    fn short_frames_never_panic() {
        let original = Mac([1; 6]);
        let ap_mac = Mac([2; 6]);
        let ctx = BridgeContext::new(original, ap_mac);
        let platform = SimPlatform::new(original, ap_mac);
        for len in 0..14 {
            on_sta_rx(&ctx, &platform, &platform, RxBuffer::new(vec![0u8; len]));
            on_ap_rx(&ctx, &platform, &platform, RxBuffer::new(vec![0u8; len]));
        }
    }

    #[test]
    fn forwarding_start_stop_is_idempotent_and_toggles_power_save() {
        let original = Mac([1; 6]);
        let ap_mac = Mac([2; 6]);
        let ctx = Arc::new(BridgeContext::new(original, ap_mac));
        let platform = Arc::new(SimPlatform::new(original, ap_mac));
        let driver: Arc<dyn RadioDriver> = platform.clone();
        let ip_stack: Arc<dyn IpStack> = platform.clone();

        forwarding_start(&ctx, &driver, &ip_stack);
        assert!(ctx.forwarding_active());
        forwarding_start(&ctx, &driver, &ip_stack); // idempotent
        assert!(ctx.forwarding_active());

        forwarding_stop(&ctx, &driver);
        assert!(!ctx.forwarding_active());
        forwarding_stop(&ctx, &driver); // idempotent
        assert!(!ctx.forwarding_active());
    }
}
