//! Network layer variants.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use macaddr::MacAddr6;
use serde::Serialize;

use super::packet::{format_mac, serialize_mac, Describe, Field, LayerSummary, Protocol};
use super::{MalformedLayer, UnknownLayer};

pub const IP_PROTO_ICMP: u8 = 1;
pub const IP_PROTO_TCP: u8 = 6;
pub const IP_PROTO_UDP: u8 = 17;
pub const IP_PROTO_ICMPV6: u8 = 58;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "layer")]
pub enum NetworkLayer {
    Ipv4(Ipv4Header),
    Ipv6(Ipv6Header),
    Arp(ArpMessage),
    Unknown(UnknownLayer),
    Malformed(MalformedLayer),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ipv4Header {
    /// Header length in bytes.
    pub header_length: usize,
    pub dscp: u8,
    pub ecn: u8,
    pub total_length: u16,
    pub identification: u16,
    pub flags: u8,
    pub fragment_offset: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ipv6Header {
    pub traffic_class: u8,
    pub flow_label: u32,
    pub payload_length: u16,
    /// Upper-layer protocol after walking extension headers.
    pub next_header: u8,
    /// Extension header types walked to reach `next_header`.
    pub extension_headers: Vec<u8>,
    pub hop_limit: u8,
    pub source: Ipv6Addr,
    pub destination: Ipv6Addr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArpMessage {
    pub hardware_type: u16,
    pub protocol_type: u16,
    pub operation: u16,
    #[serde(serialize_with = "serialize_mac")]
    pub sender_mac: MacAddr6,
    pub sender_ip: Ipv4Addr,
    #[serde(serialize_with = "serialize_mac")]
    pub target_mac: MacAddr6,
    pub target_ip: Ipv4Addr,
}

impl NetworkLayer {
    /// Source and destination addresses. ARP reports its sender and target
    /// protocol addresses.
    pub fn ip_addresses(&self) -> Option<(IpAddr, IpAddr)> {
        match self {
            Self::Ipv4(h) => Some((h.source.into(), h.destination.into())),
            Self::Ipv6(h) => Some((h.source.into(), h.destination.into())),
            Self::Arp(a) => Some((a.sender_ip.into(), a.target_ip.into())),
            _ => None,
        }
    }
}

pub fn ip_protocol_name(protocol: u8) -> &'static str {
    match protocol {
        IP_PROTO_ICMP => "ICMP",
        2 => "IGMP",
        IP_PROTO_TCP => "TCP",
        IP_PROTO_UDP => "UDP",
        41 => "IPv6-in-IPv4",
        47 => "GRE",
        50 => "ESP",
        51 => "AH",
        IP_PROTO_ICMPV6 => "ICMPv6",
        89 => "OSPF",
        132 => "SCTP",
        _ => "unknown",
    }
}

fn arp_operation_name(operation: u16) -> &'static str {
    match operation {
        1 => "request",
        2 => "reply",
        3 => "RARP request",
        4 => "RARP reply",
        _ => "unknown",
    }
}

impl Describe for NetworkLayer {
    fn protocol(&self) -> Protocol {
        match self {
            Self::Ipv4(_) => Protocol::Ipv4,
            Self::Ipv6(_) => Protocol::Ipv6,
            Self::Arp(_) => Protocol::Arp,
            Self::Unknown(_) => Protocol::Unknown,
            Self::Malformed(_) => Protocol::Malformed,
        }
    }

    fn describe(&self) -> LayerSummary {
        match self {
            Self::Ipv4(h) => LayerSummary {
                protocol: Protocol::Ipv4,
                info: format!("{} → {} ({})", h.source, h.destination, ip_protocol_name(h.protocol)),
                fields: vec![
                    Field::new("Source", h.source),
                    Field::new("Destination", h.destination),
                    Field::new("Header length", h.header_length),
                    Field::new("DSCP", h.dscp),
                    Field::new("ECN", h.ecn),
                    Field::new("Total length", h.total_length),
                    Field::new("Identification", format!("0x{:04x}", h.identification)),
                    Field::new("Flags", format!("0x{:x}", h.flags)),
                    Field::new("Fragment offset", h.fragment_offset),
                    Field::new("TTL", h.ttl),
                    Field::new(
                        "Protocol",
                        format!("{} ({})", ip_protocol_name(h.protocol), h.protocol),
                    ),
                    Field::new("Checksum", format!("0x{:04x}", h.checksum)),
                ],
            },
            Self::Ipv6(h) => {
                let mut fields = vec![
                    Field::new("Source", h.source),
                    Field::new("Destination", h.destination),
                    Field::new("Traffic class", h.traffic_class),
                    Field::new("Flow label", format!("0x{:05x}", h.flow_label)),
                    Field::new("Payload length", h.payload_length),
                    Field::new(
                        "Next header",
                        format!("{} ({})", ip_protocol_name(h.next_header), h.next_header),
                    ),
                    Field::new("Hop limit", h.hop_limit),
                ];
                if !h.extension_headers.is_empty() {
                    let walked: Vec<String> =
                        h.extension_headers.iter().map(|t| t.to_string()).collect();
                    fields.push(Field::new("Extension headers", walked.join(", ")));
                }
                LayerSummary {
                    protocol: Protocol::Ipv6,
                    info: format!(
                        "{} → {} ({})",
                        h.source,
                        h.destination,
                        ip_protocol_name(h.next_header)
                    ),
                    fields,
                }
            }
            Self::Arp(a) => {
                let info = match a.operation {
                    1 => format!("Who has {}? Tell {}", a.target_ip, a.sender_ip),
                    2 => format!("{} is at {}", a.sender_ip, format_mac(&a.sender_mac)),
                    op => format!("ARP {} ({})", arp_operation_name(op), op),
                };
                LayerSummary {
                    protocol: Protocol::Arp,
                    info,
                    fields: vec![
                        Field::new("Hardware type", a.hardware_type),
                        Field::new("Protocol type", format!("0x{:04x}", a.protocol_type)),
                        Field::new(
                            "Operation",
                            format!("{} ({})", arp_operation_name(a.operation), a.operation),
                        ),
                        Field::new("Sender MAC", format_mac(&a.sender_mac)),
                        Field::new("Sender IP", a.sender_ip),
                        Field::new("Target MAC", format_mac(&a.target_mac)),
                        Field::new("Target IP", a.target_ip),
                    ],
                }
            }
            Self::Unknown(layer) => layer.summary(),
            Self::Malformed(layer) => layer.summary(),
        }
    }
}
