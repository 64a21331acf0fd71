//! The packet rewriter: in-place rewriting of Ethernet src/dst, ARP
//! sender/target hardware fields, and the DHCP BROADCAST flag assist.
//! Operates directly on the driver-owned rx buffer, never allocates,
//! never fails.

use crate::macnat::MacNatTable;
use crate::types::{Ip4, Mac};

const ETH_DST: usize = 0;
const ETH_SRC: usize = 6;
const ETH_TYPE: usize = 12;
const ETH_HDR_LEN: usize = 14;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_ARP: u16 = 0x0806;

const ARP_MIN_LEN: usize = 42;
const ARP_SENDER_MAC: usize = 22;
const ARP_SENDER_IP: usize = 28;
const ARP_TARGET_MAC: usize = 32;
const ARP_TARGET_IP: usize = 38;

const IPV4_MIN_LEN: usize = 34;
const IPV4_PROTO: usize = 14 + 9;
const IPV4_SRC: usize = 14 + 12;
const IPV4_DST: usize = 14 + 16;
const UDP_PROTO: u8 = 17;

const DHCP_CLIENT_PORT: u16 = 68;
const DHCP_SERVER_PORT: u16 = 67;

fn ethertype(frame: &[u8]) -> Option<u16> {
    let bytes = frame.get(ETH_TYPE..ETH_TYPE + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn ip_header_len(frame: &[u8]) -> Option<usize> {
    let vihl = *frame.get(ETH_HDR_LEN)?;
    let ihl = usize::from(vihl & 0x0f) * 4;
    if ihl < 20 {
        return None;
    }
    Some(ihl)
}

/// Rewrite a frame received on the AP interface, destined upstream via the
/// STA, for any client other than the currently-impersonated primary.
/// Called only when `client_count > 1` and the frame is unicast.
pub fn rewrite_upstream(frame: &mut [u8], nat: &mut MacNatTable, primary_client_mac: Mac) {
    match ethertype(frame) {
        Some(ETHERTYPE_IPV4) if frame.len() >= IPV4_MIN_LEN => {
            if let Some(src_ip) = Ip4::from_be_slice(&frame[IPV4_SRC..IPV4_SRC + 4]) {
                if let Some(src_mac) = Mac::from_slice(&frame[ETH_SRC..ETH_SRC + 6]) {
                    nat.learn(src_ip, src_mac);
                }
            }
            rewrite_dhcp_broadcast_assist(frame);
        }
        Some(ETHERTYPE_ARP) if frame.len() >= ARP_MIN_LEN => {
            if let (Some(sender_ip), Some(sender_mac)) = (
                Ip4::from_be_slice(&frame[ARP_SENDER_IP..ARP_SENDER_IP + 4]),
                Mac::from_slice(&frame[ARP_SENDER_MAC..ARP_SENDER_MAC + 6]),
            ) {
                nat.learn(sender_ip, sender_mac);
            }
            frame[ARP_SENDER_MAC..ARP_SENDER_MAC + 6].copy_from_slice(&primary_client_mac.0);
        }
        _ => {}
    }

    if let Some(src) = frame.get_mut(ETH_SRC..ETH_SRC + 6) {
        src.copy_from_slice(&primary_client_mac.0);
    }
}

/// If `frame` is a client→server DHCP packet (src port 68, dst port 67),
/// set the BROADCAST flag and zero the UDP checksum so the upstream server's
/// unicast reply to `chaddr` is not silently dropped by radio hardware now
/// filtering on the impersonated MAC (RFC 768 permits a zero UDP checksum
/// over IPv4).
fn rewrite_dhcp_broadcast_assist(frame: &mut [u8]) {
    let Some(ihl) = ip_header_len(frame) else {
        return;
    };
    if *frame.get(IPV4_PROTO).unwrap_or(&0) != UDP_PROTO {
        return;
    }
    let udp_off = ETH_HDR_LEN + ihl;
    let Some(udp) = frame.get(udp_off..udp_off + 8) else {
        return;
    };
    let src_port = u16::from_be_bytes([udp[0], udp[1]]);
    let dst_port = u16::from_be_bytes([udp[2], udp[3]]);
    if src_port != DHCP_CLIENT_PORT || dst_port != DHCP_SERVER_PORT {
        return;
    }

    let dhcp_off = udp_off + 8;
    if let Some(flags_byte) = frame.get_mut(dhcp_off + 10) {
        *flags_byte |= 0x80;
    }
    if let Some(csum) = frame.get_mut(udp_off + 6..udp_off + 8) {
        csum[0] = 0;
        csum[1] = 0;
    }
}

/// Rewrite a frame received on the STA interface, bound for a client behind
/// the AP other than the impersonated primary. Called only when
/// `client_count > 1` and the frame is unicast.
pub fn rewrite_downstream(frame: &mut [u8], nat: &MacNatTable, primary_client_mac: Mac) {
    match ethertype(frame) {
        Some(ETHERTYPE_IPV4) if frame.len() >= IPV4_MIN_LEN => {
            if let Some(dst_ip) = Ip4::from_be_slice(&frame[IPV4_DST..IPV4_DST + 4]) {
                if let Some(real) = nat.lookup_by_ip(dst_ip) {
                    if real != primary_client_mac {
                        frame[ETH_DST..ETH_DST + 6].copy_from_slice(&real.0);
                    }
                }
            }
        }
        Some(ETHERTYPE_ARP) if frame.len() >= ARP_MIN_LEN => {
            if let Some(target_ip) = Ip4::from_be_slice(&frame[ARP_TARGET_IP..ARP_TARGET_IP + 4]) {
                if let Some(real) = nat.lookup_by_ip(target_ip) {
                    if real != primary_client_mac {
                        frame[ETH_DST..ETH_DST + 6].copy_from_slice(&real.0);
                        frame[ARP_TARGET_MAC..ARP_TARGET_MAC + 6].copy_from_slice(&real.0);
                    }
                }
            }
        }
        _ => {}
    }
}
