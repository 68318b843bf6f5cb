use super::application::decode_application;
use super::link::decode_link;
use super::network::decode_network;
use super::transport::decode_transport;
use crate::capture::RawFrame;
use crate::domain::DecodedPacket;

/// Decodes raw frames into their layer chain.
///
/// Stateless and pure: the same frame always yields the same packet, and
/// no input can make it fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtocolDecoder;

impl ProtocolDecoder {
    pub fn new() -> Self {
        Self
    }

    pub fn decode(&self, frame: &RawFrame) -> DecodedPacket {
        let link = decode_link(frame);
        let mut packet = DecodedPacket {
            id: 0,
            timestamp: frame.timestamp,
            length: frame.wire_length.max(frame.data.len()),
            captured_length: frame.data.len(),
            link_layer: link.layer,
            network_layer: None,
            transport_layer: None,
            application_layer: None,
            payload: link.payload.to_vec(),
        };

        let Some(ethertype) = link.next else {
            return packet;
        };
        let network = decode_network(ethertype, link.payload);
        packet.network_layer = Some(network.layer);
        packet.payload = network.payload.to_vec();

        let Some(upper) = network.next else {
            return packet;
        };
        let transport = decode_transport(upper, network.payload);
        packet.transport_layer = Some(transport.layer);
        packet.payload = transport.payload.to_vec();

        if let Some(hint) = transport.next {
            packet.application_layer = decode_application(hint, transport.payload);
        }

        tracing::trace!(
            "Decoded {} byte frame as {:?}",
            packet.captured_length,
            packet.protocols()
        );
        packet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::LinkType;
    use crate::decoder::dns::tests::query;
    use crate::domain::{
        ApplicationLayer, LinkLayer, NetworkLayer, Protocol, TransportLayer, ETHERTYPE_IPV4,
    };

    fn ethernet(ethertype: u16, payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![0x00, 0x11, 0x22, 0x33, 0x44, 0x55];
        frame.extend([0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb]);
        frame.extend(ethertype.to_be_bytes());
        frame.extend(payload);
        frame
    }

    fn ipv4(protocol: u8, payload: &[u8]) -> Vec<u8> {
        let mut h = vec![0u8; 20];
        h[0] = 0x45;
        h[2..4].copy_from_slice(&((20 + payload.len()) as u16).to_be_bytes());
        h[8] = 64;
        h[9] = protocol;
        h[12..16].copy_from_slice(&[192, 168, 1, 10]);
        h[16..20].copy_from_slice(&[93, 184, 216, 34]);
        h.extend(payload);
        h
    }

    fn tcp(source_port: u16, destination_port: u16, payload: &[u8]) -> Vec<u8> {
        let mut h = vec![0u8; 20];
        h[0..2].copy_from_slice(&source_port.to_be_bytes());
        h[2..4].copy_from_slice(&destination_port.to_be_bytes());
        h[12] = 5 << 4;
        h[13] = 0x18;
        h.extend(payload);
        h
    }

    fn udp(source_port: u16, destination_port: u16, payload: &[u8]) -> Vec<u8> {
        let mut h = vec![0u8; 8];
        h[0..2].copy_from_slice(&source_port.to_be_bytes());
        h[2..4].copy_from_slice(&destination_port.to_be_bytes());
        h[4..6].copy_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
        h.extend(payload);
        h
    }

    #[test]
    fn test_http_get_decodes_every_layer() {
        let request = b"GET /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let frame = RawFrame::ethernet(ethernet(ETHERTYPE_IPV4, &ipv4(6, &tcp(51000, 80, request))));
        let packet = ProtocolDecoder::new().decode(&frame);

        assert_eq!(
            packet.protocols(),
            vec![Protocol::Ethernet, Protocol::Ipv4, Protocol::Tcp, Protocol::Http]
        );
        let Some(ApplicationLayer::Http(http)) = &packet.application_layer else {
            panic!("expected http");
        };
        assert_eq!(http.method(), Some("GET"));
        assert_eq!(http.header("Host"), Some("example.com"));
        assert_eq!(packet.ports(), Some((51000, 80)));
        assert_eq!(packet.top_layer().info, "GET /index.html HTTP/1.1");
        assert_eq!(packet.payload, request.to_vec());
    }

    #[test]
    fn test_decode_is_deterministic() {
        let frame = RawFrame::ethernet(ethernet(
            ETHERTYPE_IPV4,
            &ipv4(17, &udp(40000, 53, &query(0x1234, "example.com"))),
        ));
        let decoder = ProtocolDecoder::new();
        let first = decoder.decode(&frame);
        let second = decoder.decode(&frame);
        assert_eq!(first, second);
        assert!(first.contains(Protocol::Dns));
    }

    #[test]
    fn test_truncated_ipv4_stops_chain() {
        let mut packet = ipv4(6, &tcp(1, 2, b""));
        packet.truncate(12);
        let frame = RawFrame::ethernet(ethernet(ETHERTYPE_IPV4, &packet));
        let decoded = ProtocolDecoder::new().decode(&frame);

        assert!(matches!(decoded.link_layer, LinkLayer::Ethernet(_)));
        assert!(matches!(decoded.network_layer, Some(NetworkLayer::Malformed(_))));
        assert!(decoded.transport_layer.is_none());
        assert!(decoded.application_layer.is_none());
        assert!(decoded.contains(Protocol::Malformed));
        assert!(!decoded.contains(Protocol::Ipv4));
    }

    #[test]
    fn test_unknown_ethertype_keeps_bytes() {
        let frame = RawFrame::ethernet(ethernet(0x88cc, &[1, 2, 3, 4]));
        let decoded = ProtocolDecoder::new().decode(&frame);
        assert!(matches!(decoded.network_layer, Some(NetworkLayer::Unknown(_))));
        assert_eq!(decoded.payload, vec![1, 2, 3, 4]);
        assert!(decoded.transport_layer.is_none());
    }

    #[test]
    fn test_udp_to_unlisted_port_has_no_application_layer() {
        let frame = RawFrame::ethernet(ethernet(
            ETHERTYPE_IPV4,
            &ipv4(17, &udp(40000, 9999, b"opaque")),
        ));
        let decoded = ProtocolDecoder::new().decode(&frame);
        assert!(matches!(decoded.transport_layer, Some(TransportLayer::Udp(_))));
        assert!(decoded.application_layer.is_none());
        assert_eq!(decoded.payload, b"opaque".to_vec());
    }

    #[test]
    fn test_captured_length_reflects_snapshot() {
        let mut frame = RawFrame::ethernet(ethernet(ETHERTYPE_IPV4, &ipv4(17, &udp(1, 2, b"x"))));
        frame.wire_length = 1500;
        let decoded = ProtocolDecoder::new().decode(&frame);
        assert_eq!(decoded.length, 1500);
        assert_eq!(decoded.captured_length, frame.data.len());

        let other = RawFrame {
            link_type: LinkType::Other(113),
            ..frame
        };
        let decoded = ProtocolDecoder::new().decode(&other);
        assert!(matches!(decoded.link_layer, LinkLayer::Unknown(_)));
        assert!(decoded.network_layer.is_none());
    }
}
