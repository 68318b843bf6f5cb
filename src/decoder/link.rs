//! Link layer decoding.

use macaddr::MacAddr6;
use pnet::packet::ethernet::EthernetPacket;
use pnet::packet::vlan::VlanPacket;

use super::Step;
use crate::capture::{LinkType, RawFrame};
use crate::domain::{
    format_mac, EthernetFrame, Field, LinkLayer, MalformedLayer, Protocol, UnknownLayer,
    ETHERTYPE_VLAN,
};
use crate::error::DecodeError;

const ETHERNET_HEADER_LEN: usize = 14;
const VLAN_TAG_LEN: usize = 4;

/// Decode the link header. Continues with the payload EtherType.
pub(super) fn decode_link(frame: &RawFrame) -> Step<'_, LinkLayer, u16> {
    match frame.link_type {
        LinkType::Ethernet => decode_ethernet(&frame.data),
        LinkType::Other(dlt) => Step::stop(
            LinkLayer::Unknown(UnknownLayer::new(format!("link type {}", dlt), &frame.data)),
            &frame.data,
        ),
    }
}

fn decode_ethernet(data: &[u8]) -> Step<'_, LinkLayer, u16> {
    let Some(eth) = EthernetPacket::new(data) else {
        let err = DecodeError::Truncated {
            layer: Protocol::Ethernet,
            expected: ETHERNET_HEADER_LEN,
            actual: data.len(),
        };
        return Step::stop(
            LinkLayer::Malformed(MalformedLayer::new(Protocol::Ethernet, &err, data)),
            data,
        );
    };

    let source = MacAddr6::from(eth.get_source().octets());
    let destination = MacAddr6::from(eth.get_destination().octets());
    let mut ethertype = eth.get_ethertype().0;
    let mut offset = ETHERNET_HEADER_LEN;
    let mut vlan_id = None;

    if ethertype == ETHERTYPE_VLAN {
        let Some(vlan) = VlanPacket::new(&data[offset..]) else {
            let err = DecodeError::Truncated {
                layer: Protocol::Ethernet,
                expected: offset + VLAN_TAG_LEN,
                actual: data.len(),
            };
            let malformed = MalformedLayer::new(Protocol::Ethernet, &err, data).with_recovered(vec![
                Field::new("Source", format_mac(&source)),
                Field::new("Destination", format_mac(&destination)),
            ]);
            return Step::stop(LinkLayer::Malformed(malformed), data);
        };
        vlan_id = Some(vlan.get_vlan_identifier());
        ethertype = vlan.get_ethertype().0;
        offset += VLAN_TAG_LEN;
    }

    let frame = EthernetFrame {
        source,
        destination,
        ethertype,
        vlan_id,
    };
    Step::next(LinkLayer::Ethernet(frame), &data[offset..], ethertype)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_frame_is_malformed() {
        let frame = RawFrame::ethernet(vec![0xff; 10]);
        let step = decode_link(&frame);
        assert!(matches!(step.layer, LinkLayer::Malformed(_)));
        assert!(step.next.is_none());
        assert_eq!(step.payload.len(), 10);
    }

    #[test]
    fn test_vlan_tag_is_unwrapped() {
        let mut data = vec![0xaa; 6];
        data.extend([0xbb; 6]);
        data.extend([0x81, 0x00, 0x20, 0x64, 0x08, 0x06]);
        data.extend([0u8; 28]);
        let frame = RawFrame::ethernet(data);

        let step = decode_link(&frame);
        let LinkLayer::Ethernet(eth) = step.layer else {
            panic!("expected ethernet");
        };
        assert_eq!(eth.vlan_id, Some(100));
        assert_eq!(eth.ethertype, 0x0806);
        assert_eq!(step.next, Some(0x0806));
        assert_eq!(step.payload.len(), 28);
    }

    #[test]
    fn test_other_link_type_is_unknown() {
        let frame = RawFrame {
            link_type: LinkType::Other(105),
            ..RawFrame::ethernet(vec![1, 2, 3])
        };
        let step = decode_link(&frame);
        assert!(matches!(step.layer, LinkLayer::Unknown(_)));
        assert!(step.next.is_none());
    }
}
