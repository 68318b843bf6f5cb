//! Transport layer variants.

use serde::Serialize;

use super::packet::{Describe, Field, LayerSummary, Protocol};
use super::{MalformedLayer, UnknownLayer};

/// TCP flag bits as they appear in byte 13 of the header.
pub mod tcp_flags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;
    pub const URG: u8 = 0x20;
    pub const ECE: u8 = 0x40;
    pub const CWR: u8 = 0x80;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "layer")]
pub enum TransportLayer {
    Tcp(TcpSegment),
    Udp(UdpDatagram),
    Icmp(IcmpMessage),
    Icmpv6(Icmpv6Message),
    Unknown(UnknownLayer),
    Malformed(MalformedLayer),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TcpSegment {
    pub source_port: u16,
    pub destination_port: u16,
    pub sequence: u32,
    pub acknowledgement: u32,
    /// Header length in bytes.
    pub header_length: usize,
    pub flags: u8,
    pub window: u16,
    pub checksum: u16,
    pub urgent_pointer: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UdpDatagram {
    pub source_port: u16,
    pub destination_port: u16,
    pub length: u16,
    pub checksum: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IcmpMessage {
    pub icmp_type: u8,
    pub code: u8,
    pub checksum: u16,
    /// Echo identifier and sequence number, for echo request/reply.
    pub echo: Option<(u16, u16)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Icmpv6Message {
    pub icmpv6_type: u8,
    pub code: u8,
    pub checksum: u16,
}

impl TransportLayer {
    pub fn ports(&self) -> Option<(u16, u16)> {
        match self {
            Self::Tcp(s) => Some((s.source_port, s.destination_port)),
            Self::Udp(d) => Some((d.source_port, d.destination_port)),
            _ => None,
        }
    }
}

impl TcpSegment {
    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    /// Flag names in header order, e.g. "SYN, ACK".
    pub fn flag_names(&self) -> String {
        const NAMES: [(u8, &str); 8] = [
            (tcp_flags::CWR, "CWR"),
            (tcp_flags::ECE, "ECE"),
            (tcp_flags::URG, "URG"),
            (tcp_flags::ACK, "ACK"),
            (tcp_flags::PSH, "PSH"),
            (tcp_flags::RST, "RST"),
            (tcp_flags::SYN, "SYN"),
            (tcp_flags::FIN, "FIN"),
        ];
        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(bit, _)| self.has_flag(*bit))
            .map(|(_, name)| *name)
            .collect();
        names.join(", ")
    }
}

fn icmp_type_name(icmp_type: u8) -> &'static str {
    match icmp_type {
        0 => "Echo reply",
        3 => "Destination unreachable",
        5 => "Redirect",
        8 => "Echo request",
        11 => "Time exceeded",
        12 => "Parameter problem",
        13 => "Timestamp",
        14 => "Timestamp reply",
        _ => "ICMP",
    }
}

fn icmpv6_type_name(icmpv6_type: u8) -> &'static str {
    match icmpv6_type {
        1 => "Destination unreachable",
        2 => "Packet too big",
        3 => "Time exceeded",
        4 => "Parameter problem",
        128 => "Echo request",
        129 => "Echo reply",
        133 => "Router solicitation",
        134 => "Router advertisement",
        135 => "Neighbor solicitation",
        136 => "Neighbor advertisement",
        137 => "Redirect",
        143 => "Multicast listener report v2",
        _ => "ICMPv6",
    }
}

impl Describe for TransportLayer {
    fn protocol(&self) -> Protocol {
        match self {
            Self::Tcp(_) => Protocol::Tcp,
            Self::Udp(_) => Protocol::Udp,
            Self::Icmp(_) => Protocol::Icmp,
            Self::Icmpv6(_) => Protocol::Icmpv6,
            Self::Unknown(_) => Protocol::Unknown,
            Self::Malformed(_) => Protocol::Malformed,
        }
    }

    fn describe(&self) -> LayerSummary {
        match self {
            Self::Tcp(s) => LayerSummary {
                protocol: Protocol::Tcp,
                info: format!(
                    "{} → {} [{}] Seq={} Ack={} Win={}",
                    s.source_port,
                    s.destination_port,
                    s.flag_names(),
                    s.sequence,
                    s.acknowledgement,
                    s.window
                ),
                fields: vec![
                    Field::new("Source port", s.source_port),
                    Field::new("Destination port", s.destination_port),
                    Field::new("Sequence number", s.sequence),
                    Field::new("Acknowledgement number", s.acknowledgement),
                    Field::new("Header length", s.header_length),
                    Field::new("Flags", format!("0x{:02x} ({})", s.flags, s.flag_names())),
                    Field::new("Window", s.window),
                    Field::new("Checksum", format!("0x{:04x}", s.checksum)),
                    Field::new("Urgent pointer", s.urgent_pointer),
                ],
            },
            Self::Udp(d) => LayerSummary {
                protocol: Protocol::Udp,
                info: format!("{} → {} Len={}", d.source_port, d.destination_port, d.length),
                fields: vec![
                    Field::new("Source port", d.source_port),
                    Field::new("Destination port", d.destination_port),
                    Field::new("Length", d.length),
                    Field::new("Checksum", format!("0x{:04x}", d.checksum)),
                ],
            },
            Self::Icmp(m) => {
                let mut info = format!("{} (type {}, code {})", icmp_type_name(m.icmp_type), m.icmp_type, m.code);
                let mut fields = vec![
                    Field::new("Type", format!("{} ({})", icmp_type_name(m.icmp_type), m.icmp_type)),
                    Field::new("Code", m.code),
                    Field::new("Checksum", format!("0x{:04x}", m.checksum)),
                ];
                if let Some((id, seq)) = m.echo {
                    info = format!("{} id=0x{:04x}, seq={}", icmp_type_name(m.icmp_type), id, seq);
                    fields.push(Field::new("Identifier", format!("0x{:04x}", id)));
                    fields.push(Field::new("Sequence number", seq));
                }
                LayerSummary {
                    protocol: Protocol::Icmp,
                    info,
                    fields,
                }
            }
            Self::Icmpv6(m) => LayerSummary {
                protocol: Protocol::Icmpv6,
                info: format!(
                    "{} (type {}, code {})",
                    icmpv6_type_name(m.icmpv6_type),
                    m.icmpv6_type,
                    m.code
                ),
                fields: vec![
                    Field::new(
                        "Type",
                        format!("{} ({})", icmpv6_type_name(m.icmpv6_type), m.icmpv6_type),
                    ),
                    Field::new("Code", m.code),
                    Field::new("Checksum", format!("0x{:04x}", m.checksum)),
                ],
            },
            Self::Unknown(layer) => layer.summary(),
            Self::Malformed(layer) => layer.summary(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(flags: u8) -> TcpSegment {
        TcpSegment {
            source_port: 51000,
            destination_port: 80,
            sequence: 1,
            acknowledgement: 0,
            header_length: 20,
            flags,
            window: 64240,
            checksum: 0,
            urgent_pointer: 0,
        }
    }

    #[test]
    fn test_flag_names_in_header_order() {
        let s = segment(tcp_flags::SYN | tcp_flags::ACK);
        assert_eq!(s.flag_names(), "ACK, SYN");
        assert!(s.has_flag(tcp_flags::SYN));
        assert!(!s.has_flag(tcp_flags::FIN));
    }

    #[test]
    fn test_ports_only_for_tcp_and_udp() {
        assert_eq!(TransportLayer::Tcp(segment(0)).ports(), Some((51000, 80)));
        let icmp = TransportLayer::Icmp(IcmpMessage {
            icmp_type: 8,
            code: 0,
            checksum: 0,
            echo: Some((1, 1)),
        });
        assert_eq!(icmp.ports(), None);
        assert!(icmp.describe().info.starts_with("Echo request"));
    }
}
