//! The DHCP ACK sniffer: recognises a server→client BOOTREPLY DHCPACK
//! inside a complete Ethernet frame, without ever blocking or panicking on
//! truncated or adversarial input.
//!
//! The option walk is a hand-rolled, bounds-checked, table-driven loop
//! rather than a full DHCP message decode: this function only needs three
//! option values out of a frame it does not own, and a minimal walker is
//! the piece that has to survive fuzzing on the rx fastpath's untrusted
//! input.

use log::debug;

use crate::context::BridgeContext;
use crate::traits::IpStack;
use crate::types::Iface;
use crate::types::{Ip4, Mac};

const ETHERTYPE_IPV4: u16 = 0x0800;
const UDP_PROTO: u8 = 17;
const DHCP_SERVER_PORT: u16 = 67;
const DHCP_CLIENT_PORT: u16 = 68;
const ETH_HDR_LEN: usize = 14;
const BOOTREPLY: u8 = 2;
const DHCP_MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];
const OPT_SUBNET_MASK: u8 = 1;
const OPT_ROUTER: u8 = 3;
const OPT_MESSAGE_TYPE: u8 = 53;
const DHCPACK: u8 = 5;
const OPT_END: u8 = 0xff;
const OPT_PAD: u8 = 0x00;
const MIN_ACK_FRAME_LEN: usize = 286;

/// The fields this module needs out of a validated DHCPACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DhcpAck {
    pub yiaddr: Ip4,
    pub chaddr: Mac,
    pub subnet_mask: Ip4,
    pub gateway: Ip4,
}

/// Returns the offset of the IPv4 payload's start within `frame`, i.e. just
/// past the Ethernet header, given a frame already known to carry IPv4
/// (ethertype 0x0800). Returns `None` if too short to hold a minimal header.
fn ipv4_header_len(frame: &[u8]) -> Option<usize> {
    let ip = frame.get(ETH_HDR_LEN..)?;
    let vihl = *ip.first()?;
    let ihl = usize::from(vihl & 0x0f) * 4;
    if ihl < 20 {
        return None;
    }
    Some(ihl)
}

fn ethertype(frame: &[u8]) -> Option<u16> {
    let bytes = frame.get(12..14)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Cheap pre-classification the forwarder applies before paying for the
/// full option walk: IPv4/UDP, server→client ports, long enough to
/// possibly be an ACK.
pub fn is_dhcp_ack_candidate(frame: &[u8]) -> bool {
    if frame.len() < MIN_ACK_FRAME_LEN {
        return false;
    }
    if ethertype(frame) != Some(ETHERTYPE_IPV4) {
        return false;
    }
    let Some(ihl) = ipv4_header_len(frame) else {
        return false;
    };
    if frame.get(ETH_HDR_LEN + 9) != Some(&UDP_PROTO) {
        return false;
    }
    let udp_off = ETH_HDR_LEN + ihl;
    let Some(udp) = frame.get(udp_off..udp_off + 4) else {
        return false;
    };
    let src_port = u16::from_be_bytes([udp[0], udp[1]]);
    let dst_port = u16::from_be_bytes([udp[2], udp[3]]);
    src_port == DHCP_SERVER_PORT && dst_port == DHCP_CLIENT_PORT
}

/// Attempt to parse `frame` as a DHCP server→client BOOTREPLY DHCPACK.
/// `frame` must already be known IPv4/UDP src-port-67/dst-port-68 per the
/// caller's own classification; this function re-validates everything it
/// reads and never panics on short or malformed input.
pub fn parse_dhcp_ack(frame: &[u8]) -> Option<DhcpAck> {
    if frame.len() < MIN_ACK_FRAME_LEN {
        return None;
    }
    let ihl = ipv4_header_len(frame)?;
    let dhcp_off = ETH_HDR_LEN + ihl + 8; // + UDP header
    let dhcp = frame.get(dhcp_off..)?;
    if dhcp.len() < 240 {
        return None;
    }

    if dhcp[0] != BOOTREPLY {
        return None;
    }
    if dhcp[236..240] != DHCP_MAGIC_COOKIE {
        return None;
    }

    let yiaddr = Ip4::from_be_slice(&dhcp[16..20])?;
    if yiaddr.is_zero() {
        return None;
    }
    let chaddr = Mac::from_slice(&dhcp[28..34])?;

    let mut msg_type: Option<u8> = None;
    let mut subnet_mask: Option<Ip4> = None;
    let mut gateway: Option<Ip4> = None;

    for opt in DhcpOptions::new(&dhcp[240..]) {
        match opt.code {
            OPT_MESSAGE_TYPE if opt.value.len() == 1 => msg_type = Some(opt.value[0]),
            OPT_SUBNET_MASK if opt.value.len() == 4 => {
                subnet_mask = Ip4::from_be_slice(opt.value)
            }
            OPT_ROUTER if opt.value.len() >= 4 => gateway = Ip4::from_be_slice(&opt.value[..4]),
            _ => {}
        }
    }

    if msg_type != Some(DHCPACK) {
        return None;
    }
    let subnet_mask = subnet_mask?;
    let gateway = gateway?;

    Some(DhcpAck {
        yiaddr,
        chaddr,
        subnet_mask,
        gateway,
    })
}

struct DhcpOption<'a> {
    code: u8,
    value: &'a [u8],
}

/// Table-driven TLV walker over DHCP options: 1-byte code, `0xff` (End)
/// stops iteration, `0x00` (Pad) carries no length byte, everything else
/// is `[code][len][len bytes]`. Every index is bounds-checked; running off
/// the end of `buf` simply ends iteration rather than panicking.
struct DhcpOptions<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> DhcpOptions<'a> {
    fn new(buf: &'a [u8]) -> DhcpOptions<'a> {
        DhcpOptions { buf, pos: 0 }
    }
}

impl<'a> Iterator for DhcpOptions<'a> {
    type Item = DhcpOption<'a>;

    fn next(&mut self) -> Option<DhcpOption<'a>> {
        loop {
            let code = *self.buf.get(self.pos)?;
            if code == OPT_END {
                return None;
            }
            if code == OPT_PAD {
                self.pos = self.pos.saturating_add(1);
                continue;
            }
            let len_pos = self.pos.checked_add(1)?;
            let len = usize::from(*self.buf.get(len_pos)?);
            let val_start = len_pos.checked_add(1)?;
            let val_end = val_start.checked_add(len)?;
            let value = self.buf.get(val_start..val_end)?;
            self.pos = val_end;
            return Some(DhcpOption { code, value });
        }
    }
}

/// Given a sniffed ACK's `(yiaddr, mask, gateway)`, compute the AP's own
/// candidate address in the same subnet: the highest usable host,
/// avoiding `yiaddr` and `gateway`, falling back to `yiaddr ± 1` when the
/// subnet is too packed to offer ten free top-of-range hosts.
pub fn pick_ap_candidate(yiaddr: Ip4, mask: Ip4, gateway: Ip4) -> Option<Ip4> {
    let network = yiaddr.0 & mask.0;
    let broadcast = network | !mask.0;
    if broadcast <= network + 1 {
        // Degenerate /31 or /32 subnet: no room for a second host.
        return None;
    }
    let highest_usable = broadcast - 1;

    for candidate in 0..10u32 {
        let addr = highest_usable.checked_sub(candidate)?;
        if addr <= network {
            break;
        }
        let candidate_ip = Ip4(addr);
        if candidate_ip != yiaddr && candidate_ip != gateway {
            return Some(candidate_ip);
        }
    }

    for delta in [1i64, -1] {
        let addr = (yiaddr.0 as i64) + delta;
        if addr <= network as i64 || addr >= broadcast as i64 {
            continue;
        }
        let candidate_ip = Ip4(addr as u32);
        if candidate_ip != gateway {
            return Some(candidate_ip);
        }
    }

    None
}

/// The forwarder's entry point into the sniffer: classify, parse, learn
/// the client into MAC-NAT, and — the first time — place the AP's own IP
/// in the discovered subnet. Never blocks, never propagates an error; a
/// malformed or uninteresting frame is simply not an ACK.
/// Returns whether a valid ACK was processed, for logging/tests.
pub fn sniff_and_apply(ctx: &BridgeContext, ip_stack: &dyn IpStack, frame: &[u8]) -> bool {
    if !is_dhcp_ack_candidate(frame) {
        return false;
    }
    let Some(ack) = parse_dhcp_ack(frame) else {
        return false;
    };

    ctx.mac_nat.lock().unwrap().learn(ack.yiaddr, ack.chaddr);
    debug!("sniffed DHCPACK: {} -> {}", ack.yiaddr, ack.chaddr);

    if ctx.ap_ip_from_sniff() {
        return true;
    }

    if let Some(candidate) = pick_ap_candidate(ack.yiaddr, ack.subnet_mask, ack.gateway) {
        debug!("placing AP IP {candidate} (mask {}) from sniffed subnet", ack.subnet_mask);
        ip_stack.dhcps_stop(Iface::Ap);
        ip_stack.set_ip_info(Iface::Ap, candidate, ack.subnet_mask, ack.gateway);
        ctx.set_ap_ip_from_sniff(true);
    }

    true
}
