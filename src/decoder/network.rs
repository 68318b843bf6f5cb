//! Network layer decoding: IPv4, IPv6 and ARP.

use std::net::IpAddr;

use macaddr::MacAddr6;
use pnet::packet::arp::ArpPacket;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;

use super::Step;
use crate::domain::{
    ethertype_name, ArpMessage, Field, Ipv4Header, Ipv6Header, MalformedLayer, NetworkLayer,
    Protocol, UnknownLayer, ETHERTYPE_ARP, ETHERTYPE_IPV4, ETHERTYPE_IPV6,
};
use crate::error::DecodeError;

const IPV4_MIN_HEADER_LEN: usize = 20;
const IPV6_HEADER_LEN: usize = 40;
const ARP_ETHERNET_IPV4_LEN: usize = 28;

/// IPv6 extension header types walked to reach the upper layer.
mod ipv6_ext {
    pub const HOP_BY_HOP: u8 = 0;
    pub const ROUTING: u8 = 43;
    pub const FRAGMENT: u8 = 44;
    pub const AUTH: u8 = 51;
    pub const DEST_OPTS: u8 = 60;
}

/// Where the transport decoder should pick up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Upper {
    Protocol(u8),
    /// A non-initial fragment; its payload has no transport header.
    Fragment { offset: u16 },
}

type NetworkStep<'a> = Step<'a, NetworkLayer, Upper>;

pub(super) fn decode_network(ethertype: u16, data: &[u8]) -> NetworkStep<'_> {
    let result = match ethertype {
        ETHERTYPE_IPV4 => decode_ipv4(data),
        ETHERTYPE_IPV6 => decode_ipv6(data),
        ETHERTYPE_ARP => decode_arp(data),
        other => {
            let label = format!("EtherType 0x{:04x} ({})", other, ethertype_name(other));
            return Step::stop(NetworkLayer::Unknown(UnknownLayer::new(label, data)), data);
        }
    };

    result.unwrap_or_else(|malformed| Step::stop(NetworkLayer::Malformed(malformed), data))
}

fn address_fields(source: IpAddr, destination: IpAddr) -> Vec<Field> {
    vec![
        Field::new("Source", source),
        Field::new("Destination", destination),
    ]
}

fn decode_ipv4(data: &[u8]) -> Result<NetworkStep<'_>, MalformedLayer> {
    let malformed = |err: DecodeError, recovered: Vec<Field>| {
        MalformedLayer::new(Protocol::Ipv4, &err, data).with_recovered(recovered)
    };

    let Some(ip) = Ipv4Packet::new(data) else {
        return Err(malformed(
            DecodeError::Truncated {
                layer: Protocol::Ipv4,
                expected: IPV4_MIN_HEADER_LEN,
                actual: data.len(),
            },
            Vec::new(),
        ));
    };

    let addresses = address_fields(ip.get_source().into(), ip.get_destination().into());

    if ip.get_version() != 4 {
        return Err(malformed(
            DecodeError::invalid(Protocol::Ipv4, format!("version {}", ip.get_version())),
            Vec::new(),
        ));
    }

    let header_length = ip.get_header_length() as usize * 4;
    if header_length < IPV4_MIN_HEADER_LEN {
        return Err(malformed(
            DecodeError::invalid(Protocol::Ipv4, format!("header length {}", header_length)),
            addresses,
        ));
    }
    if header_length > data.len() {
        return Err(malformed(
            DecodeError::Truncated {
                layer: Protocol::Ipv4,
                expected: header_length,
                actual: data.len(),
            },
            addresses,
        ));
    }

    let total_length = ip.get_total_length() as usize;
    if total_length < header_length {
        return Err(malformed(
            DecodeError::invalid(Protocol::Ipv4, format!("total length {}", total_length)),
            addresses,
        ));
    }

    // Ethernet pads short frames; a snapshot may cut long ones
    let end = total_length.min(data.len());
    let payload = &data[header_length..end];

    let header = Ipv4Header {
        header_length,
        dscp: ip.get_dscp(),
        ecn: ip.get_ecn(),
        total_length: ip.get_total_length(),
        identification: ip.get_identification(),
        flags: ip.get_flags(),
        fragment_offset: ip.get_fragment_offset(),
        ttl: ip.get_ttl(),
        protocol: ip.get_next_level_protocol().0,
        checksum: ip.get_checksum(),
        source: ip.get_source(),
        destination: ip.get_destination(),
    };

    let upper = if header.fragment_offset != 0 {
        Upper::Fragment {
            offset: header.fragment_offset,
        }
    } else {
        Upper::Protocol(header.protocol)
    };

    Ok(Step::next(NetworkLayer::Ipv4(header), payload, upper))
}

fn decode_ipv6(data: &[u8]) -> Result<NetworkStep<'_>, MalformedLayer> {
    let Some(ip) = Ipv6Packet::new(data) else {
        let err = DecodeError::Truncated {
            layer: Protocol::Ipv6,
            expected: IPV6_HEADER_LEN,
            actual: data.len(),
        };
        return Err(MalformedLayer::new(Protocol::Ipv6, &err, data));
    };

    if ip.get_version() != 6 {
        let err = DecodeError::invalid(Protocol::Ipv6, format!("version {}", ip.get_version()));
        return Err(MalformedLayer::new(Protocol::Ipv6, &err, data));
    }

    let addresses = address_fields(ip.get_source().into(), ip.get_destination().into());

    // A zero payload length means a jumbogram; take what was captured
    let payload_length = ip.get_payload_length() as usize;
    let end = if payload_length == 0 {
        data.len()
    } else {
        (IPV6_HEADER_LEN + payload_length).min(data.len())
    };
    let body = &data[IPV6_HEADER_LEN..end];

    let walked = walk_extension_headers(ip.get_next_header().0, body)
        .map_err(|err| MalformedLayer::new(Protocol::Ipv6, &err, data).with_recovered(addresses))?;

    let header = Ipv6Header {
        traffic_class: ip.get_traffic_class(),
        flow_label: ip.get_flow_label(),
        payload_length: ip.get_payload_length(),
        next_header: walked.next_header,
        extension_headers: walked.extensions,
        hop_limit: ip.get_hop_limit(),
        source: ip.get_source(),
        destination: ip.get_destination(),
    };

    let upper = match walked.fragment_offset {
        Some(offset) if offset != 0 => Upper::Fragment { offset },
        _ => Upper::Protocol(header.next_header),
    };

    Ok(Step::next(
        NetworkLayer::Ipv6(header),
        &body[walked.offset..],
        upper,
    ))
}

struct ExtensionWalk {
    next_header: u8,
    extensions: Vec<u8>,
    offset: usize,
    fragment_offset: Option<u16>,
}

fn walk_extension_headers(first: u8, body: &[u8]) -> Result<ExtensionWalk, DecodeError> {
    let mut walk = ExtensionWalk {
        next_header: first,
        extensions: Vec::new(),
        offset: 0,
        fragment_offset: None,
    };

    loop {
        let ext_len = match walk.next_header {
            ipv6_ext::HOP_BY_HOP | ipv6_ext::ROUTING | ipv6_ext::DEST_OPTS => {
                let len_byte = *body.get(walk.offset + 1).ok_or(DecodeError::Truncated {
                    layer: Protocol::Ipv6,
                    expected: IPV6_HEADER_LEN + walk.offset + 2,
                    actual: IPV6_HEADER_LEN + body.len(),
                })?;
                (len_byte as usize + 1) * 8
            }
            ipv6_ext::AUTH => {
                let len_byte = *body.get(walk.offset + 1).ok_or(DecodeError::Truncated {
                    layer: Protocol::Ipv6,
                    expected: IPV6_HEADER_LEN + walk.offset + 2,
                    actual: IPV6_HEADER_LEN + body.len(),
                })?;
                (len_byte as usize + 2) * 4
            }
            ipv6_ext::FRAGMENT => 8,
            _ => return Ok(walk),
        };

        if walk.offset + ext_len > body.len() {
            return Err(DecodeError::Truncated {
                layer: Protocol::Ipv6,
                expected: IPV6_HEADER_LEN + walk.offset + ext_len,
                actual: IPV6_HEADER_LEN + body.len(),
            });
        }

        let ext = &body[walk.offset..walk.offset + ext_len];
        if walk.next_header == ipv6_ext::FRAGMENT {
            walk.fragment_offset = Some(u16::from_be_bytes([ext[2], ext[3]]) >> 3);
        }
        walk.extensions.push(walk.next_header);
        walk.next_header = ext[0];
        walk.offset += ext_len;
    }
}

fn decode_arp(data: &[u8]) -> Result<NetworkStep<'_>, MalformedLayer> {
    let Some(arp) = ArpPacket::new(data) else {
        let err = DecodeError::Truncated {
            layer: Protocol::Arp,
            expected: ARP_ETHERNET_IPV4_LEN,
            actual: data.len(),
        };
        return Err(MalformedLayer::new(Protocol::Arp, &err, data));
    };

    // Only Ethernet/IPv4 ARP fits the fixed pnet layout
    if arp.get_hw_addr_len() != 6 || arp.get_proto_addr_len() != 4 {
        let err = DecodeError::invalid(
            Protocol::Arp,
            format!(
                "address lengths {}/{}",
                arp.get_hw_addr_len(),
                arp.get_proto_addr_len()
            ),
        );
        return Err(MalformedLayer::new(Protocol::Arp, &err, data).with_recovered(vec![
            Field::new("Operation", arp.get_operation().0),
        ]));
    }

    let message = ArpMessage {
        hardware_type: arp.get_hardware_type().0,
        protocol_type: arp.get_protocol_type().0,
        operation: arp.get_operation().0,
        sender_mac: MacAddr6::from(arp.get_sender_hw_addr().octets()),
        sender_ip: arp.get_sender_proto_addr(),
        target_mac: MacAddr6::from(arp.get_target_hw_addr().octets()),
        target_ip: arp.get_target_proto_addr(),
    };

    Ok(Step::stop(
        NetworkLayer::Arp(message),
        &data[ARP_ETHERNET_IPV4_LEN..],
    ))
}
