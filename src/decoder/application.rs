//! Application protocol selection.
//!
//! Traffic on a well-known port is decoded as that port's protocol, and a
//! payload that does not parse becomes `Unknown` or `Malformed`. Other
//! ports are sniffed: a protocol is reported only when its parser accepts
//! the payload outright.

use super::transport::{AppHint, Carrier};
use super::{dns, http, tls};
use crate::domain::{ApplicationLayer, MalformedLayer, Protocol, UnknownLayer};
use crate::error::DecodeError;

const HTTP_PORTS: [u16; 3] = [80, 8080, 8000];
const TLS_PORTS: [u16; 6] = [443, 8443, 465, 993, 995, 636];
const DNS_PORTS: [u16; 1] = [53];
const DNS_UDP_PORTS: [u16; 2] = [53, 5353];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Service {
    Http,
    Tls,
    Dns,
    DnsOverTcp,
}

fn service_for(carrier: Carrier, port: u16) -> Option<Service> {
    match carrier {
        Carrier::Tcp if HTTP_PORTS.contains(&port) => Some(Service::Http),
        Carrier::Tcp if TLS_PORTS.contains(&port) => Some(Service::Tls),
        Carrier::Tcp if DNS_PORTS.contains(&port) => Some(Service::DnsOverTcp),
        Carrier::Udp if DNS_UDP_PORTS.contains(&port) => Some(Service::Dns),
        _ => None,
    }
}

/// The server side of a conversation is usually the destination of a
/// request, so the destination port is tried first.
fn well_known_service(hint: &AppHint) -> Option<(Service, u16)> {
    [hint.destination_port, hint.source_port]
        .into_iter()
        .find_map(|port| service_for(hint.carrier, port).map(|service| (service, port)))
}

pub(super) fn decode_application(hint: AppHint, data: &[u8]) -> Option<ApplicationLayer> {
    if data.is_empty() {
        return None;
    }

    match well_known_service(&hint) {
        Some((service, port)) => Some(decode_service(service, port, hint.carrier, data)),
        None => sniff(hint.carrier, data),
    }
}

fn decode_service(service: Service, port: u16, carrier: Carrier, data: &[u8]) -> ApplicationLayer {
    let (protocol, result) = match service {
        Service::Http => (Protocol::Http, http::parse(data).map(ApplicationLayer::Http)),
        Service::Tls => (Protocol::Tls, tls::parse(data).map(ApplicationLayer::Tls)),
        Service::Dns => (Protocol::Dns, dns::parse(data).map(ApplicationLayer::Dns)),
        Service::DnsOverTcp => (Protocol::Dns, parse_dns_over_tcp(data)),
    };

    match result {
        Ok(layer) => layer,
        Err(DecodeError::Unrecognized(_)) => {
            let carrier = match carrier {
                Carrier::Tcp => "TCP",
                Carrier::Udp => "UDP",
            };
            ApplicationLayer::Unknown(UnknownLayer::new(
                format!("{} port {} payload", carrier, port),
                data,
            ))
        }
        Err(err) => ApplicationLayer::Malformed(MalformedLayer::new(protocol, &err, data)),
    }
}

/// DNS over TCP prefixes each message with its length.
fn parse_dns_over_tcp(data: &[u8]) -> Result<ApplicationLayer, DecodeError> {
    if data.len() < 2 {
        return Err(DecodeError::Truncated {
            layer: Protocol::Dns,
            expected: 2,
            actual: data.len(),
        });
    }
    let length = u16::from_be_bytes([data[0], data[1]]) as usize;
    let message = data.get(2..2 + length).ok_or(DecodeError::Truncated {
        layer: Protocol::Dns,
        expected: 2 + length,
        actual: data.len(),
    })?;
    dns::parse(message).map(ApplicationLayer::Dns)
}

fn sniff(carrier: Carrier, data: &[u8]) -> Option<ApplicationLayer> {
    match carrier {
        Carrier::Tcp => {
            if tls::looks_like_tls(data) {
                if let Ok(record) = tls::parse(data) {
                    return Some(ApplicationLayer::Tls(record));
                }
            }
            if http::looks_like_http(data) {
                if let Ok(message) = http::parse(data) {
                    return Some(ApplicationLayer::Http(message));
                }
            }
            None
        }
        Carrier::Udp => dns::sniff(data).map(ApplicationLayer::Dns),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::dns::tests::query;
    use crate::decoder::tls::tests::client_hello;

    fn tcp(source_port: u16, destination_port: u16) -> AppHint {
        AppHint {
            carrier: Carrier::Tcp,
            source_port,
            destination_port,
        }
    }

    fn udp(source_port: u16, destination_port: u16) -> AppHint {
        AppHint {
            carrier: Carrier::Udp,
            source_port,
            destination_port,
        }
    }

    #[test]
    fn test_empty_payload_has_no_application_layer() {
        assert_eq!(decode_application(tcp(51000, 80), &[]), None);
    }

    #[test]
    fn test_well_known_port_dispatch() {
        let layer = decode_application(tcp(51000, 80), b"GET / HTTP/1.1\r\n\r\n");
        assert!(matches!(layer, Some(ApplicationLayer::Http(_))));

        let layer = decode_application(tcp(51000, 443), &client_hello("a.example"));
        assert!(matches!(layer, Some(ApplicationLayer::Tls(_))));

        let layer = decode_application(udp(53, 40000), &query(9, "example.com"));
        assert!(matches!(layer, Some(ApplicationLayer::Dns(_))));
    }

    #[test]
    fn test_unrecognized_payload_on_http_port_is_unknown() {
        let layer = decode_application(tcp(80, 51000), b"\x00\x01binary body chunk");
        let Some(ApplicationLayer::Unknown(u)) = layer else {
            panic!("expected unknown, got {:?}", layer);
        };
        assert_eq!(u.label, "TCP port 80 payload");
    }

    #[test]
    fn test_broken_dns_on_port_53_is_malformed() {
        let data = query(9, "example.com");
        let layer = decode_application(udp(40000, 53), &data[..14]);
        assert!(matches!(
            layer,
            Some(ApplicationLayer::Malformed(MalformedLayer { protocol: Protocol::Dns, .. }))
        ));
    }

    #[test]
    fn test_dns_over_tcp_length_prefix() {
        let message = query(3, "example.net");
        let mut data = (message.len() as u16).to_be_bytes().to_vec();
        data.extend(&message);
        let layer = decode_application(tcp(40000, 53), &data);
        assert!(matches!(layer, Some(ApplicationLayer::Dns(_))));
    }

    #[test]
    fn test_sniffing_on_other_ports() {
        let layer = decode_application(tcp(40000, 9000), &client_hello("b.example"));
        assert!(matches!(layer, Some(ApplicationLayer::Tls(_))));

        let layer = decode_application(tcp(40000, 9000), b"POST /x HTTP/1.1\r\n\r\n");
        assert!(matches!(layer, Some(ApplicationLayer::Http(_))));

        assert_eq!(decode_application(tcp(40000, 9000), b"ssh-2.0 banner"), None);
        assert_eq!(decode_application(udp(40000, 9999), &[0u8; 20]), None);
    }
}
