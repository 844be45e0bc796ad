use dnsstat_core::{DnsEvent, Timestamp};
use dnsstat_lib::{ByteBuf, DnsMessage, FromBuf as _};

pub const DNS_PORT: u16 = 53;

const ETHERNET_HEADER_LEN: usize = 14;
const VLAN_TAG_LEN: usize = 4;
const SLL_HEADER_LEN: usize = 16;
const SLL2_HEADER_LEN: usize = 20;
const NULL_HEADER_LEN: usize = 4;
const IPV4_MIN_HEADER_LEN: usize = 20;
const IPV6_HEADER_LEN: usize = 40;
const UDP_HEADER_LEN: usize = 8;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86dd;
const ETHERTYPE_VLAN: u16 = 0x8100;
const ETHERTYPE_QINQ: u16 = 0x88a8;

const IPPROTO_HOPOPTS: u8 = 0;
const IPPROTO_UDP: u8 = 17;
const IPPROTO_ROUTING: u8 = 43;
const IPPROTO_FRAGMENT: u8 = 44;
const IPPROTO_DSTOPTS: u8 = 60;

/// Link-layer framings a trace may use
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LinkType {
    /// BSD loopback, address family in host or network byte order
    Null,
    Ethernet,
    /// Bare IPv4 or IPv6 datagrams
    Raw,
    /// Linux cooked capture
    LinuxSll,
    /// Linux cooked capture v2
    LinuxSll2,
}

impl LinkType {
    /// Maps a libpcap data link type onto a supported framing
    pub fn from_dlt(dlt: i32) -> Option<Self> {
        match dlt {
            0 | 108 => Some(LinkType::Null),
            1 => Some(LinkType::Ethernet),
            // DLT_RAW differs between platforms, LINKTYPE_RAW is 101
            12 | 14 | 101 | 228 | 229 => Some(LinkType::Raw),
            113 => Some(LinkType::LinuxSll),
            276 => Some(LinkType::LinuxSll2),
            _ => None,
        }
    }
}

/// Reasons a captured frame doesn't yield a DNS event
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("truncated {0}")]
    Truncated(&'static str),
    #[error("not an IP packet")]
    NotIp,
    #[error("not a UDP datagram")]
    NotUdp,
    #[error("UDP ports {0} -> {1} aren't DNS")]
    NotDns(u16, u16),
    #[error("non-initial IP fragment")]
    Fragment,
    #[error("malformed DNS message: {0}")]
    MalformedDns(String),
}

impl FrameError {
    /// Whether the frame was DNS traffic that couldn't be decoded
    pub fn is_malformed(&self) -> bool {
        matches!(self, FrameError::MalformedDns(_) | FrameError::Fragment)
    }
}

/// Network-layer view of a frame: address family plus the UDP datagram
struct IpPayload<'a> {
    is_ipv6: bool,
    udp: &'a [u8],
}

/// Decodes one captured frame down to the DNS header and question section
pub fn decode_frame(
    link_type: LinkType,
    data: &[u8],
    timestamp: Timestamp,
) -> Result<DnsEvent, FrameError> {
    let ip = strip_link_layer(link_type, data)?;
    let payload = decode_ip(ip)?;
    let dns = decode_udp(payload.udp)?;

    let mut buf = ByteBuf::new(&dns);
    let message =
        DnsMessage::from_buf(&mut buf).map_err(|e| FrameError::MalformedDns(format!("{:#}", e)))?;

    let question_name = if message.header.is_response {
        None
    } else {
        message.questions.into_iter().next().map(|question| question.qname)
    };

    Ok(DnsEvent {
        transaction_id: message.header.id,
        is_response: message.header.is_response,
        opcode: message.header.opcode,
        timestamp,
        is_ipv6: payload.is_ipv6,
        question_name,
    })
}

fn strip_link_layer(link_type: LinkType, data: &[u8]) -> Result<&[u8], FrameError> {
    match link_type {
        LinkType::Raw => Ok(data),
        LinkType::Null => data
            .get(NULL_HEADER_LEN..)
            .ok_or(FrameError::Truncated("loopback header")),
        LinkType::Ethernet => {
            if data.len() < ETHERNET_HEADER_LEN {
                return Err(FrameError::Truncated("ethernet header"));
            }
            let mut ether_type = read_u16(data, 12);
            let mut offset = ETHERNET_HEADER_LEN;
            // 802.1Q/802.1ad tags push the real EtherType back by four bytes each
            while ether_type == ETHERTYPE_VLAN || ether_type == ETHERTYPE_QINQ {
                if data.len() < offset + VLAN_TAG_LEN {
                    return Err(FrameError::Truncated("VLAN tag"));
                }
                ether_type = read_u16(data, offset + 2);
                offset += VLAN_TAG_LEN;
            }
            ip_after_ether_type(ether_type, &data[offset..])
        }
        LinkType::LinuxSll => {
            if data.len() < SLL_HEADER_LEN {
                return Err(FrameError::Truncated("cooked capture header"));
            }
            ip_after_ether_type(read_u16(data, 14), &data[SLL_HEADER_LEN..])
        }
        LinkType::LinuxSll2 => {
            if data.len() < SLL2_HEADER_LEN {
                return Err(FrameError::Truncated("cooked capture v2 header"));
            }
            ip_after_ether_type(read_u16(data, 0), &data[SLL2_HEADER_LEN..])
        }
    }
}

fn ip_after_ether_type(ether_type: u16, data: &[u8]) -> Result<&[u8], FrameError> {
    match ether_type {
        ETHERTYPE_IPV4 | ETHERTYPE_IPV6 => Ok(data),
        _ => Err(FrameError::NotIp),
    }
}

fn decode_ip(data: &[u8]) -> Result<IpPayload<'_>, FrameError> {
    match data.first().map(|byte| byte >> 4) {
        Some(4) => decode_ipv4(data),
        Some(6) => decode_ipv6(data),
        Some(_) => Err(FrameError::NotIp),
        None => Err(FrameError::Truncated("IP header")),
    }
}

fn decode_ipv4(data: &[u8]) -> Result<IpPayload<'_>, FrameError> {
    if data.len() < IPV4_MIN_HEADER_LEN {
        return Err(FrameError::Truncated("IPv4 header"));
    }
    let header_len = (data[0] & 0x0f) as usize * 4;
    if header_len < IPV4_MIN_HEADER_LEN || data.len() < header_len {
        return Err(FrameError::Truncated("IPv4 header"));
    }
    if data[9] != IPPROTO_UDP {
        return Err(FrameError::NotUdp);
    }
    if read_u16(data, 6) & 0x1fff != 0 {
        return Err(FrameError::Fragment);
    }

    // Total length excludes link-layer padding
    let total_len = (read_u16(data, 2) as usize).clamp(header_len, data.len());

    Ok(IpPayload {
        is_ipv6: false,
        udp: &data[header_len..total_len],
    })
}

fn decode_ipv6(data: &[u8]) -> Result<IpPayload<'_>, FrameError> {
    if data.len() < IPV6_HEADER_LEN {
        return Err(FrameError::Truncated("IPv6 header"));
    }
    let payload_len = read_u16(data, 4) as usize;
    let end = (IPV6_HEADER_LEN + payload_len).min(data.len());
    let mut next_header = data[6];
    let mut offset = IPV6_HEADER_LEN;

    loop {
        match next_header {
            IPPROTO_UDP => break,
            IPPROTO_HOPOPTS | IPPROTO_ROUTING | IPPROTO_DSTOPTS => {
                if end < offset + 2 {
                    return Err(FrameError::Truncated("IPv6 extension header"));
                }
                next_header = data[offset];
                offset += (data[offset + 1] as usize + 1) * 8;
            }
            IPPROTO_FRAGMENT => {
                if end < offset + 8 {
                    return Err(FrameError::Truncated("IPv6 fragment header"));
                }
                if read_u16(data, offset + 2) >> 3 != 0 {
                    return Err(FrameError::Fragment);
                }
                next_header = data[offset];
                offset += 8;
            }
            _ => return Err(FrameError::NotUdp),
        }
        if offset > end {
            return Err(FrameError::Truncated("IPv6 extension header"));
        }
    }

    Ok(IpPayload {
        is_ipv6: true,
        udp: &data[offset..end],
    })
}

fn decode_udp(data: &[u8]) -> Result<&[u8], FrameError> {
    if data.len() < UDP_HEADER_LEN {
        return Err(FrameError::Truncated("UDP header"));
    }
    let src_port = read_u16(data, 0);
    let dst_port = read_u16(data, 2);
    if src_port != DNS_PORT && dst_port != DNS_PORT {
        return Err(FrameError::NotDns(src_port, dst_port));
    }

    // A zero or bogus length falls back to whatever was captured
    let udp_len = match read_u16(data, 4) as usize {
        len if (UDP_HEADER_LEN..=data.len()).contains(&len) => len,
        _ => data.len(),
    };

    Ok(&data[UDP_HEADER_LEN..udp_len])
}

fn read_u16(data: &[u8], pos: usize) -> u16 {
    u16::from_be_bytes([data[pos], data[pos + 1]])
}
