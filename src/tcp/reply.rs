//! Outbound packet construction for connections and resets
//!
//! Replies travel from the destination back to the client, so the packet
//! source is the identity's remote side.

use bytes::Bytes;

use super::sequence::SequenceNumber;
use crate::wire::{build_tcp_packet, tcp_flags, Identity, TcpHeader, TcpSegment};

/// Build a packet from the destination to the client of `identity`
#[must_use]
pub fn make_packet(
    identity: &Identity,
    sequence_number: SequenceNumber,
    acknowledgement_number: SequenceNumber,
    flags: u8,
    window: u16,
    payload: &[u8],
) -> Bytes {
    let header = TcpHeader {
        source_port: identity.remote_port,
        destination_port: identity.local_port,
        sequence_number,
        acknowledgement_number,
        flags,
        window,
    };
    build_tcp_packet(identity.remote_address, identity.local_address, &header, payload)
}

/// Reset answering `segment` when no connection state applies
///
/// RFC 793, CLOSED state:
///
/// ```text
///   RST set:  discard, no reply
///   ACK set:  <SEQ=SEG.ACK><CTL=RST>
///   otherwise <SEQ=0><ACK=SEG.SEQ+SEG.LEN><CTL=RST,ACK>
/// ```
#[must_use]
pub fn reset_for(segment: &TcpSegment) -> Option<Bytes> {
    if segment.is_rst() {
        return None;
    }

    let packet = if segment.is_ack() {
        make_packet(
            &segment.identity,
            segment.acknowledgement_number,
            SequenceNumber::ZERO,
            tcp_flags::RST,
            0,
            &[],
        )
    } else {
        make_packet(
            &segment.identity,
            SequenceNumber::ZERO,
            segment.sequence_number.add(segment.sequence_length()),
            tcp_flags::RST | tcp_flags::ACK,
            0,
            &[],
        )
    };

    Some(packet)
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::wire::parse_packet;

    fn segment(flags: u8, seq: u32, ack: u32, payload: &'static [u8]) -> TcpSegment {
        TcpSegment {
            identity: Identity::new(Ipv4Addr::new(10, 0, 0, 2), 40_000, Ipv4Addr::new(8, 8, 8, 8), 53),
            sequence_number: SequenceNumber::new(seq),
            acknowledgement_number: SequenceNumber::new(ack),
            flags,
            window: 1000,
            payload: Bytes::from_static(payload),
        }
    }

    #[test]
    fn test_make_packet_reverses_direction() {
        let inbound = segment(tcp_flags::ACK, 1, 2, b"");
        let packet = make_packet(
            &inbound.identity,
            SequenceNumber::new(500),
            SequenceNumber::new(1),
            tcp_flags::ACK,
            65_535,
            b"ok",
        );

        let parsed = parse_packet(&packet).unwrap();
        assert_eq!(parsed.identity.local_address, Ipv4Addr::new(8, 8, 8, 8));
        assert_eq!(parsed.identity.local_port, 53);
        assert_eq!(parsed.identity.remote_address, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(parsed.identity.remote_port, 40_000);
        assert_eq!(parsed.sequence_number, SequenceNumber::new(500));
        assert_eq!(parsed.window, 65_535);
        assert_eq!(parsed.payload.as_ref(), b"ok");
    }

    #[test]
    fn test_reset_for_ack_uses_segment_ack() {
        let reply = reset_for(&segment(tcp_flags::ACK, 100, 777, b"")).unwrap();
        let parsed = parse_packet(&reply).unwrap();
        assert!(parsed.is_rst());
        assert!(!parsed.is_ack());
        assert_eq!(parsed.sequence_number, SequenceNumber::new(777));
    }

    #[test]
    fn test_reset_for_syn_acknowledges_it() {
        let reply = reset_for(&segment(tcp_flags::SYN, 100, 0, b"")).unwrap();
        let parsed = parse_packet(&reply).unwrap();
        assert!(parsed.is_rst() && parsed.is_ack());
        assert_eq!(parsed.sequence_number, SequenceNumber::ZERO);
        assert_eq!(parsed.acknowledgement_number, SequenceNumber::new(101));
    }

    #[test]
    fn test_reset_for_data_without_ack() {
        let reply = reset_for(&segment(tcp_flags::FIN, 100, 0, b"abc")).unwrap();
        let parsed = parse_packet(&reply).unwrap();
        assert_eq!(parsed.acknowledgement_number, SequenceNumber::new(104));
    }

    #[test]
    fn test_no_reset_for_reset() {
        assert!(reset_for(&segment(tcp_flags::RST, 1, 0, b"")).is_none());
        assert!(reset_for(&segment(tcp_flags::RST | tcp_flags::ACK, 1, 5, b"")).is_none());
    }
}
