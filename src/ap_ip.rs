//! The AP IP surfacer: keeps the AP netif reachable before any upstream
//! exists and mirrors the STA's address once it has one.

use log::debug;

use crate::context::BridgeContext;
use crate::traits::IpStack;
use crate::types::{Iface, Ip4, MANAGEMENT_IP, MANAGEMENT_NETMASK};

/// Mirror the STA's freshly-leased address onto the AP netif, so a bridged
/// client can reach the management GUI at the same address the STA holds.
/// Ignores the dummy 169.254/16 address installed during MAC-change and a
/// zero IP.
pub fn mirror_sta_ip(ctx: &BridgeContext, ip_stack: &dyn IpStack, ip: Ip4, netmask: Ip4) {
    if ip.is_zero() || ip.is_link_local() {
        return;
    }
    debug!("mirroring STA IP {ip}/{netmask} onto AP netif");
    ip_stack.dhcps_stop(Iface::Ap);
    ip_stack.set_ip_info(Iface::Ap, ip, netmask, Ip4::ZERO);
    let _ = ctx;
}

/// Fall back to the fixed management address, used before the STA ever has
/// an uplink and whenever it loses its lease.
pub fn restore_management_ip(ip_stack: &dyn IpStack) {
    debug!("restoring AP management IP {MANAGEMENT_IP}/{MANAGEMENT_NETMASK}");
    ip_stack.dhcps_stop(Iface::Ap);
    ip_stack.set_ip_info(Iface::Ap, MANAGEMENT_IP, MANAGEMENT_NETMASK, MANAGEMENT_IP);
    ip_stack.dhcps_start(Iface::Ap);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimPlatform;
    use crate::types::Mac;

    #[test]
    fn mirror_ignores_link_local_and_zero() {
        let platform = SimPlatform::new(Mac([1; 6]), Mac([2; 6]));
        let ctx = BridgeContext::new(Mac([1; 6]), Mac([2; 6]));
        mirror_sta_ip(&ctx, &platform, crate::types::DUMMY_STA_IP, crate::types::DUMMY_STA_NETMASK);
        assert!(platform.ap_ip_history().is_empty());
        mirror_sta_ip(&ctx, &platform, Ip4::ZERO, Ip4::ZERO);
        assert!(platform.ap_ip_history().is_empty());
    }

    #[test]
    fn mirror_sets_ap_to_sta_subnet() {
        let platform = SimPlatform::new(Mac([1; 6]), Mac([2; 6]));
        let ctx = BridgeContext::new(Mac([1; 6]), Mac([2; 6]));
        let ip = Ip4::from_octets(192, 168, 1, 42);
        let mask = Ip4::from_octets(255, 255, 255, 0);
        mirror_sta_ip(&ctx, &platform, ip, mask);
        assert_eq!(platform.ap_ip_history().last(), Some(&(ip, mask, Ip4::ZERO)));
    }

    #[test]
    fn restore_sets_management_address_and_restarts_dhcps() {
        let platform = SimPlatform::new(Mac([1; 6]), Mac([2; 6]));
        restore_management_ip(&platform);
        assert_eq!(
            platform.ap_ip_history().last(),
            Some(&(MANAGEMENT_IP, MANAGEMENT_NETMASK, MANAGEMENT_IP))
        );
        assert!(platform.ap_dhcps_running());
    }
}
