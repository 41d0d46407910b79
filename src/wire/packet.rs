//! IPv4/TCP packet parsing and construction
//!
//! Inbound packets are validated with smoltcp's wire types (length fields,
//! IPv4 header checksum, TCP checksum over the pseudo-header). Outbound
//! packets are assembled by hand: a 20-byte IPv4 header without options,
//! a TCP header (with an MSS option on SYN), and the payload.

use std::fmt;
use std::net::Ipv4Addr;

use bytes::Bytes;
use smoltcp::wire::{IpAddress, IpProtocol, Ipv4Packet, TcpPacket};

use super::error::PacketError;
use super::identity::Identity;
use crate::config::defaults::{IPV4_TTL, TCP_MSS};
use crate::tcp::SequenceNumber;

/// IP protocol number for TCP
const IPPROTO_TCP: u8 = 6;

/// IPv4 header length for packets we build
const IPV4_HEADER_LEN: usize = 20;

/// TCP header length without options
const TCP_HEADER_LEN: usize = 20;

/// TCP header length with the MSS option
const TCP_SYN_HEADER_LEN: usize = 24;

/// TCP flags constants
pub mod tcp_flags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;
}

/// A validated inbound TCP segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpSegment {
    /// Connection the segment belongs to (local = packet source)
    pub identity: Identity,
    /// SEG.SEQ
    pub sequence_number: SequenceNumber,
    /// SEG.ACK (meaningful only with ACK set)
    pub acknowledgement_number: SequenceNumber,
    /// Raw flag bits, see [`tcp_flags`]
    pub flags: u8,
    /// SEG.WND as advertised by the client
    pub window: u16,
    /// Segment payload
    pub payload: Bytes,
}

impl TcpSegment {
    #[must_use]
    pub fn is_syn(&self) -> bool {
        self.flags & tcp_flags::SYN != 0
    }

    #[must_use]
    pub fn is_ack(&self) -> bool {
        self.flags & tcp_flags::ACK != 0
    }

    #[must_use]
    pub fn is_fin(&self) -> bool {
        self.flags & tcp_flags::FIN != 0
    }

    #[must_use]
    pub fn is_rst(&self) -> bool {
        self.flags & tcp_flags::RST != 0
    }

    /// SYN with none of ACK, FIN or RST
    #[must_use]
    pub fn is_bare_syn(&self) -> bool {
        self.is_syn() && !self.is_ack() && !self.is_fin() && !self.is_rst()
    }

    /// SEG.LEN: payload bytes plus one for each of SYN and FIN
    #[must_use]
    pub fn sequence_length(&self) -> u32 {
        // IPv4 total length bounds the payload well below u32::MAX
        let payload = self.payload.len() as u32;
        payload + u32::from(self.is_syn()) + u32::from(self.is_fin())
    }

    /// Human-readable description of the flags
    #[must_use]
    pub fn flags_string(&self) -> String {
        flags_string(self.flags)
    }
}

impl fmt::Display for TcpSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] seq={} ack={} win={} len={}",
            self.identity,
            self.flags_string(),
            self.sequence_number,
            self.acknowledgement_number,
            self.window,
            self.payload.len()
        )
    }
}

/// Human-readable description of TCP flag bits
#[must_use]
pub fn flags_string(flags: u8) -> String {
    let names = [
        (tcp_flags::SYN, "SYN"),
        (tcp_flags::ACK, "ACK"),
        (tcp_flags::FIN, "FIN"),
        (tcp_flags::RST, "RST"),
        (tcp_flags::PSH, "PSH"),
    ];

    let set: Vec<&str> = names
        .iter()
        .filter(|(bit, _)| flags & bit != 0)
        .map(|(_, name)| *name)
        .collect();

    if set.is_empty() {
        "none".to_string()
    } else {
        set.join(",")
    }
}

/// Parse and validate a raw IPv4/TCP packet
///
/// # Errors
///
/// - [`PacketError::BadIpv4Packet`] for truncated, non-IPv4 or fragmented input
/// - [`PacketError::NotTcp`] for other IP protocols
/// - [`PacketError::BadTcpSegment`] for a truncated TCP header
/// - [`PacketError::BadChecksum`] if either checksum fails
pub fn parse_packet(bytes: &[u8]) -> Result<TcpSegment, PacketError> {
    if bytes.first().map(|b| b >> 4) != Some(4) {
        return Err(PacketError::BadIpv4Packet("not IPv4".into()));
    }

    let ip = Ipv4Packet::new_checked(bytes)
        .map_err(|e| PacketError::BadIpv4Packet(e.to_string()))?;

    if !ip.verify_checksum() {
        return Err(PacketError::BadChecksum("IPv4"));
    }

    if ip.more_frags() || ip.frag_offset() != 0 {
        return Err(PacketError::BadIpv4Packet("fragmented packet".into()));
    }

    let protocol = ip.next_header();
    if protocol != IpProtocol::Tcp {
        return Err(PacketError::NotTcp(u8::from(protocol)));
    }

    let source = ip.src_addr();
    let destination = ip.dst_addr();

    let tcp = TcpPacket::new_checked(ip.payload())
        .map_err(|e| PacketError::BadTcpSegment(e.to_string()))?;

    if !tcp.verify_checksum(&IpAddress::Ipv4(source), &IpAddress::Ipv4(destination)) {
        return Err(PacketError::BadChecksum("TCP"));
    }

    let mut flags = 0u8;
    for (set, bit) in [
        (tcp.fin(), tcp_flags::FIN),
        (tcp.syn(), tcp_flags::SYN),
        (tcp.rst(), tcp_flags::RST),
        (tcp.psh(), tcp_flags::PSH),
        (tcp.ack(), tcp_flags::ACK),
    ] {
        if set {
            flags |= bit;
        }
    }

    Ok(TcpSegment {
        identity: Identity::new(
            Ipv4Addr::from(source),
            tcp.src_port(),
            Ipv4Addr::from(destination),
            tcp.dst_port(),
        ),
        sequence_number: SequenceNumber::new(tcp.seq_number().0 as u32),
        acknowledgement_number: SequenceNumber::new(tcp.ack_number().0 as u32),
        flags,
        window: tcp.window_len(),
        payload: Bytes::copy_from_slice(tcp.payload()),
    })
}

/// TCP header fields for an outbound packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHeader {
    pub source_port: u16,
    pub destination_port: u16,
    pub sequence_number: SequenceNumber,
    pub acknowledgement_number: SequenceNumber,
    pub flags: u8,
    pub window: u16,
}

/// Build a complete IPv4/TCP packet
///
/// SYN packets carry an MSS option so the client keeps its segments
/// within the tunnel MTU.
#[must_use]
pub fn build_tcp_packet(
    source: Ipv4Addr,
    destination: Ipv4Addr,
    header: &TcpHeader,
    payload: &[u8],
) -> Bytes {
    let is_syn = header.flags & tcp_flags::SYN != 0;

    let tcp_header_len = if is_syn { TCP_SYN_HEADER_LEN } else { TCP_HEADER_LEN };
    let tcp_len = tcp_header_len + payload.len();
    let total_len = IPV4_HEADER_LEN + tcp_len;

    let mut packet = vec![0u8; total_len];

    // IPv4 header
    packet[0] = 0x45; // Version 4, IHL 5
    packet[1] = 0x00; // DSCP/ECN
    packet[2..4].copy_from_slice(&(total_len as u16).to_be_bytes());
    packet[4..6].copy_from_slice(&rand::random::<u16>().to_be_bytes()); // ID
    packet[6..8].copy_from_slice(&[0x40, 0x00]); // Don't fragment
    packet[8] = IPV4_TTL;
    packet[9] = IPPROTO_TCP;
    packet[12..16].copy_from_slice(&source.octets());
    packet[16..20].copy_from_slice(&destination.octets());

    let ip_checksum = ipv4_header_checksum(&packet[..IPV4_HEADER_LEN]);
    packet[10..12].copy_from_slice(&ip_checksum.to_be_bytes());

    // TCP header
    let tcp = &mut packet[IPV4_HEADER_LEN..];
    tcp[0..2].copy_from_slice(&header.source_port.to_be_bytes());
    tcp[2..4].copy_from_slice(&header.destination_port.to_be_bytes());
    tcp[4..8].copy_from_slice(&header.sequence_number.value().to_be_bytes());
    tcp[8..12].copy_from_slice(&header.acknowledgement_number.value().to_be_bytes());
    tcp[12] = ((tcp_header_len / 4) as u8) << 4; // Data offset
    tcp[13] = header.flags;
    tcp[14..16].copy_from_slice(&header.window.to_be_bytes());
    // Checksum and urgent pointer start at zero

    if is_syn {
        tcp[20] = 0x02; // MSS option kind
        tcp[21] = 0x04; // MSS option length
        tcp[22..24].copy_from_slice(&TCP_MSS.to_be_bytes());
    }

    tcp[tcp_header_len..].copy_from_slice(payload);

    let checksum = tcp_checksum(tcp, source, destination);
    tcp[16..18].copy_from_slice(&checksum.to_be_bytes());

    Bytes::from(packet)
}

/// One's complement sum folded to 16 bits, skipping the checksum field at
/// `skip`
fn ones_complement_sum(mut sum: u32, data: &[u8], skip: usize) -> u32 {
    for i in (0..data.len()).step_by(2) {
        if i == skip {
            continue;
        }
        let word = if i + 1 < data.len() {
            u16::from_be_bytes([data[i], data[i + 1]])
        } else {
            u16::from_be_bytes([data[i], 0])
        };
        sum = sum.wrapping_add(u32::from(word));
    }

    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    sum
}

/// IPv4 header checksum
fn ipv4_header_checksum(header: &[u8]) -> u16 {
    !(ones_complement_sum(0, header, 10) as u16)
}

/// TCP checksum including the IPv4 pseudo-header
fn tcp_checksum(tcp_segment: &[u8], source: Ipv4Addr, destination: Ipv4Addr) -> u16 {
    let mut sum: u32 = 0;

    let src = source.octets();
    let dst = destination.octets();
    sum = sum.wrapping_add(u32::from(u16::from_be_bytes([src[0], src[1]])));
    sum = sum.wrapping_add(u32::from(u16::from_be_bytes([src[2], src[3]])));
    sum = sum.wrapping_add(u32::from(u16::from_be_bytes([dst[0], dst[1]])));
    sum = sum.wrapping_add(u32::from(u16::from_be_bytes([dst[2], dst[3]])));
    sum = sum.wrapping_add(u32::from(IPPROTO_TCP));
    sum = sum.wrapping_add(tcp_segment.len() as u32);

    !(ones_complement_sum(sum, tcp_segment, 16) as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
    const SERVER: Ipv4Addr = Ipv4Addr::new(1, 1, 1, 1);

    fn header(flags: u8) -> TcpHeader {
        TcpHeader {
            source_port: 40_000,
            destination_port: 80,
            sequence_number: SequenceNumber::new(0xDEAD_BEEF),
            acknowledgement_number: SequenceNumber::new(7),
            flags,
            window: 65_535,
        }
    }

    #[test]
    fn test_build_then_parse() {
        let packet = build_tcp_packet(
            CLIENT,
            SERVER,
            &header(tcp_flags::ACK | tcp_flags::PSH),
            b"GET / HTTP/1.1\r\n\r\n",
        );
        assert_eq!(packet.len(), 20 + 20 + 18);

        let segment = parse_packet(&packet).unwrap();
        assert_eq!(segment.identity, Identity::new(CLIENT, 40_000, SERVER, 80));
        assert_eq!(segment.sequence_number, SequenceNumber::new(0xDEAD_BEEF));
        assert_eq!(segment.acknowledgement_number, SequenceNumber::new(7));
        assert!(segment.is_ack());
        assert!(!segment.is_syn());
        assert_eq!(segment.window, 65_535);
        assert_eq!(segment.payload.as_ref(), b"GET / HTTP/1.1\r\n\r\n");
        assert_eq!(segment.sequence_length(), 18);
    }

    #[test]
    fn test_syn_carries_mss_option() {
        let packet = build_tcp_packet(SERVER, CLIENT, &header(tcp_flags::SYN | tcp_flags::ACK), &[]);
        assert_eq!(packet.len(), 44);
        assert_eq!(packet[20 + 12] >> 4, 6);
        assert_eq!(&packet[40..44], &[0x02, 0x04, 0x05, 0x78]);

        let segment = parse_packet(&packet).unwrap();
        assert!(segment.is_syn() && segment.is_ack());
        assert!(!segment.is_bare_syn());
        assert_eq!(segment.sequence_length(), 1);
        assert!(segment.payload.is_empty());
    }

    #[test]
    fn test_ipv4_header_fields() {
        let packet = build_tcp_packet(SERVER, CLIENT, &header(tcp_flags::RST), &[]);
        assert_eq!(packet[0], 0x45);
        assert_eq!(u16::from_be_bytes([packet[2], packet[3]]), 40);
        assert_eq!(packet[8], 64);
        assert_eq!(packet[9], 6);
        assert_eq!(&packet[12..16], &SERVER.octets());
        assert_eq!(&packet[16..20], &CLIENT.octets());
    }

    #[test]
    fn test_corrupted_tcp_checksum_rejected() {
        let mut packet = build_tcp_packet(CLIENT, SERVER, &header(tcp_flags::ACK), b"data").to_vec();
        let last = packet.len() - 1;
        packet[last] ^= 0xFF;
        assert_eq!(parse_packet(&packet), Err(PacketError::BadChecksum("TCP")));
    }

    #[test]
    fn test_corrupted_ip_checksum_rejected() {
        let mut packet = build_tcp_packet(CLIENT, SERVER, &header(tcp_flags::ACK), &[]).to_vec();
        packet[8] = 1; // TTL change without checksum update
        assert_eq!(parse_packet(&packet), Err(PacketError::BadChecksum("IPv4")));
    }

    #[test]
    fn test_non_tcp_rejected() {
        let mut packet = build_tcp_packet(CLIENT, SERVER, &header(tcp_flags::ACK), &[]).to_vec();
        packet[9] = 17;
        let checksum = ipv4_header_checksum(&packet[..20]);
        packet[10..12].copy_from_slice(&checksum.to_be_bytes());
        assert_eq!(parse_packet(&packet), Err(PacketError::NotTcp(17)));
    }

    #[test]
    fn test_truncated_input_rejected() {
        assert!(matches!(parse_packet(&[]), Err(PacketError::BadIpv4Packet(_))));
        assert!(matches!(parse_packet(&[0x45, 0, 0]), Err(PacketError::BadIpv4Packet(_))));
        assert!(matches!(parse_packet(&[0x60; 40]), Err(PacketError::BadIpv4Packet(_))));
    }

    #[test]
    fn test_flags_string() {
        assert_eq!(flags_string(tcp_flags::SYN | tcp_flags::ACK), "SYN,ACK");
        assert_eq!(flags_string(0), "none");
    }

    #[test]
    fn test_fin_counts_in_sequence_length() {
        let packet = build_tcp_packet(CLIENT, SERVER, &header(tcp_flags::FIN | tcp_flags::ACK), b"ab");
        assert_eq!(parse_packet(&packet).unwrap().sequence_length(), 3);
    }
}
