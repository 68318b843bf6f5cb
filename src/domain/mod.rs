//! Domain model of a decoded packet.
//!
//! Each layer is a closed enum of the protocols we understand plus
//! `Unknown` and `Malformed`. Rendering goes through the `Describe` trait,
//! so the UI and the report never match on protocol internals.

mod application;
mod link;
mod network;
mod packet;
mod transport;

pub use application::{
    dns_class_name, dns_type_name, tls_content_types, tls_version_name, ApplicationLayer,
    DnsMessage, DnsQuestion, DnsResourceRecord, HttpMessage, HttpStartLine, TlsRecord,
};
pub use link::{
    ethertype_name, EthernetFrame, LinkLayer, ETHERTYPE_ARP, ETHERTYPE_IPV4, ETHERTYPE_IPV6,
    ETHERTYPE_VLAN,
};
pub use network::{
    ip_protocol_name, ArpMessage, Ipv4Header, Ipv6Header, NetworkLayer, IP_PROTO_ICMP,
    IP_PROTO_ICMPV6, IP_PROTO_TCP, IP_PROTO_UDP,
};
pub use packet::{
    format_mac, DecodedPacket, Describe, Field, LayerSummary, MalformedLayer, Protocol,
    UnknownLayer,
};
pub use transport::{
    tcp_flags, IcmpMessage, Icmpv6Message, TcpSegment, TransportLayer, UdpDatagram,
};
