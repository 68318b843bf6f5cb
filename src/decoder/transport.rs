//! Transport layer decoding: TCP, UDP, ICMP and ICMPv6.

use pnet::packet::icmp::IcmpPacket;
use pnet::packet::icmpv6::Icmpv6Packet;
use pnet::packet::tcp::TcpPacket;
use pnet::packet::udp::UdpPacket;
use pnet::packet::Packet;

use super::network::Upper;
use super::Step;
use crate::domain::{
    ip_protocol_name, Field, IcmpMessage, Icmpv6Message, MalformedLayer, Protocol, TcpSegment,
    TransportLayer, UdpDatagram, UnknownLayer, IP_PROTO_ICMP, IP_PROTO_ICMPV6, IP_PROTO_TCP,
    IP_PROTO_UDP,
};
use crate::error::DecodeError;

const TCP_MIN_HEADER_LEN: usize = 20;
const UDP_HEADER_LEN: usize = 8;
const ICMP_HEADER_LEN: usize = 4;
const ICMP_ECHO_HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Carrier {
    Tcp,
    Udp,
}

/// What the application decoder needs to pick a protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct AppHint {
    pub carrier: Carrier,
    pub source_port: u16,
    pub destination_port: u16,
}

impl AppHint {
    pub fn uses_port(&self, ports: &[u16]) -> bool {
        ports.contains(&self.source_port) || ports.contains(&self.destination_port)
    }
}

type TransportStep<'a> = Step<'a, TransportLayer, AppHint>;

pub(super) fn decode_transport(upper: Upper, data: &[u8]) -> TransportStep<'_> {
    let protocol = match upper {
        Upper::Fragment { offset } => {
            let label = format!("IP fragment at offset {}", offset as usize * 8);
            return Step::stop(TransportLayer::Unknown(UnknownLayer::new(label, data)), data);
        }
        Upper::Protocol(protocol) => protocol,
    };

    let result = match protocol {
        IP_PROTO_TCP => decode_tcp(data),
        IP_PROTO_UDP => decode_udp(data),
        IP_PROTO_ICMP => decode_icmp(data),
        IP_PROTO_ICMPV6 => decode_icmpv6(data),
        other => {
            let label = format!("IP protocol {} ({})", other, ip_protocol_name(other));
            return Step::stop(TransportLayer::Unknown(UnknownLayer::new(label, data)), data);
        }
    };

    result.unwrap_or_else(|malformed| Step::stop(TransportLayer::Malformed(malformed), data))
}

fn port_fields(source_port: u16, destination_port: u16) -> Vec<Field> {
    vec![
        Field::new("Source port", source_port),
        Field::new("Destination port", destination_port),
    ]
}

fn decode_tcp(data: &[u8]) -> Result<TransportStep<'_>, MalformedLayer> {
    let Some(tcp) = TcpPacket::new(data) else {
        let err = DecodeError::Truncated {
            layer: Protocol::Tcp,
            expected: TCP_MIN_HEADER_LEN,
            actual: data.len(),
        };
        // Ports are in the first four bytes; keep them when present
        let recovered = if data.len() >= 4 {
            port_fields(
                u16::from_be_bytes([data[0], data[1]]),
                u16::from_be_bytes([data[2], data[3]]),
            )
        } else {
            Vec::new()
        };
        return Err(MalformedLayer::new(Protocol::Tcp, &err, data).with_recovered(recovered));
    };

    let source_port = tcp.get_source();
    let destination_port = tcp.get_destination();
    let header_length = tcp.get_data_offset() as usize * 4;

    if header_length < TCP_MIN_HEADER_LEN {
        let err = DecodeError::invalid(Protocol::Tcp, format!("data offset {}", header_length));
        return Err(MalformedLayer::new(Protocol::Tcp, &err, data)
            .with_recovered(port_fields(source_port, destination_port)));
    }
    if header_length > data.len() {
        let err = DecodeError::Truncated {
            layer: Protocol::Tcp,
            expected: header_length,
            actual: data.len(),
        };
        return Err(MalformedLayer::new(Protocol::Tcp, &err, data)
            .with_recovered(port_fields(source_port, destination_port)));
    }

    let segment = TcpSegment {
        source_port,
        destination_port,
        sequence: tcp.get_sequence(),
        acknowledgement: tcp.get_acknowledgement(),
        header_length,
        flags: tcp.packet()[13],
        window: tcp.get_window(),
        checksum: tcp.get_checksum(),
        urgent_pointer: tcp.get_urgent_ptr(),
    };

    let hint = AppHint {
        carrier: Carrier::Tcp,
        source_port,
        destination_port,
    };
    Ok(Step::next(
        TransportLayer::Tcp(segment),
        &data[header_length..],
        hint,
    ))
}

fn decode_udp(data: &[u8]) -> Result<TransportStep<'_>, MalformedLayer> {
    let Some(udp) = UdpPacket::new(data) else {
        let err = DecodeError::Truncated {
            layer: Protocol::Udp,
            expected: UDP_HEADER_LEN,
            actual: data.len(),
        };
        return Err(MalformedLayer::new(Protocol::Udp, &err, data));
    };

    let source_port = udp.get_source();
    let destination_port = udp.get_destination();
    let length = udp.get_length();

    if (length as usize) < UDP_HEADER_LEN {
        let err = DecodeError::invalid(Protocol::Udp, format!("length {}", length));
        return Err(MalformedLayer::new(Protocol::Udp, &err, data)
            .with_recovered(port_fields(source_port, destination_port)));
    }

    let end = (length as usize).min(data.len());
    let datagram = UdpDatagram {
        source_port,
        destination_port,
        length,
        checksum: udp.get_checksum(),
    };

    let hint = AppHint {
        carrier: Carrier::Udp,
        source_port,
        destination_port,
    };
    Ok(Step::next(
        TransportLayer::Udp(datagram),
        &data[UDP_HEADER_LEN..end],
        hint,
    ))
}

fn decode_icmp(data: &[u8]) -> Result<TransportStep<'_>, MalformedLayer> {
    let Some(icmp) = IcmpPacket::new(data) else {
        let err = DecodeError::Truncated {
            layer: Protocol::Icmp,
            expected: ICMP_HEADER_LEN,
            actual: data.len(),
        };
        return Err(MalformedLayer::new(Protocol::Icmp, &err, data));
    };

    let icmp_type = icmp.get_icmp_type().0;
    let is_echo = matches!(icmp_type, 0 | 8);

    let (echo, header_length) = if is_echo && data.len() >= ICMP_ECHO_HEADER_LEN {
        let identifier = u16::from_be_bytes([data[4], data[5]]);
        let sequence = u16::from_be_bytes([data[6], data[7]]);
        (Some((identifier, sequence)), ICMP_ECHO_HEADER_LEN)
    } else {
        (None, ICMP_HEADER_LEN)
    };

    let message = IcmpMessage {
        icmp_type,
        code: icmp.get_icmp_code().0,
        checksum: icmp.get_checksum(),
        echo,
    };
    Ok(Step::stop(
        TransportLayer::Icmp(message),
        &data[header_length..],
    ))
}

fn decode_icmpv6(data: &[u8]) -> Result<TransportStep<'_>, MalformedLayer> {
    let Some(icmp) = Icmpv6Packet::new(data) else {
        let err = DecodeError::Truncated {
            layer: Protocol::Icmpv6,
            expected: ICMP_HEADER_LEN,
            actual: data.len(),
        };
        return Err(MalformedLayer::new(Protocol::Icmpv6, &err, data));
    };

    let message = Icmpv6Message {
        icmpv6_type: icmp.get_icmpv6_type().0,
        code: icmp.get_icmpv6_code().0,
        checksum: icmp.get_checksum(),
    };
    Ok(Step::stop(
        TransportLayer::Icmpv6(message),
        &data[ICMP_HEADER_LEN..],
    ))
}
