//! Application layer variants.
//!
//! These types carry handshake and header metadata only; message bodies and
//! encrypted content are never interpreted.

use serde::Serialize;

use super::packet::{Describe, Field, LayerSummary, Protocol};
use super::{MalformedLayer, UnknownLayer};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "layer")]
pub enum ApplicationLayer {
    Http(HttpMessage),
    Tls(TlsRecord),
    Dns(DnsMessage),
    Unknown(UnknownLayer),
    Malformed(MalformedLayer),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum HttpStartLine {
    Request {
        method: String,
        target: String,
        version: String,
    },
    Response {
        version: String,
        status: u16,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HttpMessage {
    pub start_line: HttpStartLine,
    pub headers: Vec<(String, String)>,
    /// Bytes after the header block present in this segment.
    pub body_length: usize,
}

impl HttpMessage {
    pub fn method(&self) -> Option<&str> {
        match &self.start_line {
            HttpStartLine::Request { method, .. } => Some(method),
            HttpStartLine::Response { .. } => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match &self.start_line {
            HttpStartLine::Request { .. } => None,
            HttpStartLine::Response { status, .. } => Some(*status),
        }
    }

    /// Case-insensitive header lookup; first match wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub mod tls_content_types {
    pub const CHANGE_CIPHER_SPEC: u8 = 20;
    pub const ALERT: u8 = 21;
    pub const HANDSHAKE: u8 = 22;
    pub const APPLICATION_DATA: u8 = 23;
    pub const HEARTBEAT: u8 = 24;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TlsRecord {
    /// Content type of the first record in the segment.
    pub content_type: u8,
    /// Record-layer version of the first record.
    pub version: u16,
    pub length: u16,
    pub handshake_type: Option<u8>,
    /// Version carried in a ClientHello/ServerHello body.
    pub handshake_version: Option<u16>,
    pub server_name: Option<String>,
    /// Number of complete or partial records in the segment.
    pub record_count: usize,
}

pub fn tls_version_name(version: u16) -> &'static str {
    match version {
        0x0300 => "SSL 3.0",
        0x0301 => "TLS 1.0",
        0x0302 => "TLS 1.1",
        0x0303 => "TLS 1.2",
        0x0304 => "TLS 1.3",
        _ => "TLS",
    }
}

fn tls_content_type_name(content_type: u8) -> &'static str {
    match content_type {
        tls_content_types::CHANGE_CIPHER_SPEC => "Change Cipher Spec",
        tls_content_types::ALERT => "Alert",
        tls_content_types::HANDSHAKE => "Handshake",
        tls_content_types::APPLICATION_DATA => "Application Data",
        tls_content_types::HEARTBEAT => "Heartbeat",
        _ => "Unknown",
    }
}

fn tls_handshake_name(handshake_type: u8) -> &'static str {
    match handshake_type {
        0 => "Hello Request",
        1 => "Client Hello",
        2 => "Server Hello",
        4 => "New Session Ticket",
        8 => "Encrypted Extensions",
        11 => "Certificate",
        12 => "Server Key Exchange",
        13 => "Certificate Request",
        14 => "Server Hello Done",
        15 => "Certificate Verify",
        16 => "Client Key Exchange",
        20 => "Finished",
        _ => "Handshake",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DnsQuestion {
    pub name: String,
    pub record_type: u16,
    pub class: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DnsResourceRecord {
    pub name: String,
    pub record_type: u16,
    pub class: u16,
    pub ttl: u32,
    /// Rendered RDATA (address, name, or byte count).
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DnsMessage {
    pub id: u16,
    pub is_response: bool,
    pub opcode: u8,
    pub authoritative: bool,
    pub truncated: bool,
    pub recursion_desired: bool,
    pub recursion_available: bool,
    pub rcode: u8,
    pub questions: Vec<DnsQuestion>,
    pub answers: Vec<DnsResourceRecord>,
    pub authority_count: u16,
    pub additional_count: u16,
}

pub fn dns_type_name(record_type: u16) -> String {
    match record_type {
        1 => "A".to_string(),
        2 => "NS".to_string(),
        5 => "CNAME".to_string(),
        6 => "SOA".to_string(),
        12 => "PTR".to_string(),
        15 => "MX".to_string(),
        16 => "TXT".to_string(),
        28 => "AAAA".to_string(),
        33 => "SRV".to_string(),
        41 => "OPT".to_string(),
        65 => "HTTPS".to_string(),
        255 => "ANY".to_string(),
        other => format!("TYPE{}", other),
    }
}

pub fn dns_class_name(class: u16) -> String {
    // mDNS sets the top bit for unicast-response / cache-flush.
    match class & 0x7FFF {
        1 => "IN".to_string(),
        3 => "CH".to_string(),
        4 => "HS".to_string(),
        255 => "ANY".to_string(),
        other => format!("CLASS{}", other),
    }
}

fn dns_rcode_name(rcode: u8) -> &'static str {
    match rcode {
        0 => "No error",
        1 => "Format error",
        2 => "Server failure",
        3 => "No such name",
        4 => "Not implemented",
        5 => "Refused",
        _ => "Unknown rcode",
    }
}

impl DnsMessage {
    fn info(&self) -> String {
        let mut info = if self.is_response {
            format!("Standard query response 0x{:04x}", self.id)
        } else {
            format!("Standard query 0x{:04x}", self.id)
        };
        if self.opcode != 0 {
            info = format!("DNS opcode {} 0x{:04x}", self.opcode, self.id);
        }
        if self.is_response && self.rcode != 0 {
            info.push_str(&format!(" {}", dns_rcode_name(self.rcode)));
        }
        for q in &self.questions {
            info.push_str(&format!(" {} {}", dns_type_name(q.record_type), q.name));
        }
        for a in &self.answers {
            info.push_str(&format!(" {} {}", dns_type_name(a.record_type), a.data));
        }
        info
    }
}

impl Describe for ApplicationLayer {
    fn protocol(&self) -> Protocol {
        match self {
            Self::Http(_) => Protocol::Http,
            Self::Tls(_) => Protocol::Tls,
            Self::Dns(_) => Protocol::Dns,
            Self::Unknown(_) => Protocol::Unknown,
            Self::Malformed(_) => Protocol::Malformed,
        }
    }

    fn describe(&self) -> LayerSummary {
        match self {
            Self::Http(m) => {
                let (info, mut fields) = match &m.start_line {
                    HttpStartLine::Request {
                        method,
                        target,
                        version,
                    } => (
                        format!("{} {} {}", method, target, version),
                        vec![
                            Field::new("Method", method),
                            Field::new("Target", target),
                            Field::new("Version", version),
                        ],
                    ),
                    HttpStartLine::Response {
                        version,
                        status,
                        reason,
                    } => (
                        format!("{} {} {}", version, status, reason),
                        vec![
                            Field::new("Version", version),
                            Field::new("Status", status),
                            Field::new("Reason", reason),
                        ],
                    ),
                };
                fields.extend(m.headers.iter().map(|(k, v)| Field::new(k.clone(), v)));
                fields.push(Field::new("Body length", m.body_length));
                LayerSummary {
                    protocol: Protocol::Http,
                    info,
                    fields,
                }
            }
            Self::Tls(r) => {
                let version = tls_version_name(r.handshake_version.unwrap_or(r.version));
                let mut info = match r.handshake_type {
                    Some(t) => format!("{} {}", version, tls_handshake_name(t)),
                    None => format!("{} {}", version, tls_content_type_name(r.content_type)),
                };
                let mut fields = vec![
                    Field::new(
                        "Content type",
                        format!("{} ({})", tls_content_type_name(r.content_type), r.content_type),
                    ),
                    Field::new(
                        "Record version",
                        format!("{} (0x{:04x})", tls_version_name(r.version), r.version),
                    ),
                    Field::new("Record length", r.length),
                    Field::new("Records in segment", r.record_count),
                ];
                if let Some(t) = r.handshake_type {
                    fields.push(Field::new(
                        "Handshake type",
                        format!("{} ({})", tls_handshake_name(t), t),
                    ));
                }
                if let Some(v) = r.handshake_version {
                    fields.push(Field::new(
                        "Handshake version",
                        format!("{} (0x{:04x})", tls_version_name(v), v),
                    ));
                }
                if let Some(sni) = &r.server_name {
                    info.push_str(&format!(", SNI={}", sni));
                    fields.push(Field::new("Server name", sni));
                }
                LayerSummary {
                    protocol: Protocol::Tls,
                    info,
                    fields,
                }
            }
            Self::Dns(m) => {
                let mut fields = vec![
                    Field::new("Transaction ID", format!("0x{:04x}", m.id)),
                    Field::new("Response", m.is_response),
                    Field::new("Opcode", m.opcode),
                    Field::new("Authoritative", m.authoritative),
                    Field::new("Truncated", m.truncated),
                    Field::new("Recursion desired", m.recursion_desired),
                    Field::new("Recursion available", m.recursion_available),
                    Field::new("Rcode", format!("{} ({})", dns_rcode_name(m.rcode), m.rcode)),
                    Field::new("Questions", m.questions.len()),
                    Field::new("Answer RRs", m.answers.len()),
                    Field::new("Authority RRs", m.authority_count),
                    Field::new("Additional RRs", m.additional_count),
                ];
                for q in &m.questions {
                    fields.push(Field::new(
                        "Query",
                        format!(
                            "{}: type {}, class {}",
                            q.name,
                            dns_type_name(q.record_type),
                            dns_class_name(q.class)
                        ),
                    ));
                }
                for a in &m.answers {
                    fields.push(Field::new(
                        "Answer",
                        format!(
                            "{}: type {}, class {}, ttl {}, {}",
                            a.name,
                            dns_type_name(a.record_type),
                            dns_class_name(a.class),
                            a.ttl,
                            a.data
                        ),
                    ));
                }
                LayerSummary {
                    protocol: Protocol::Dns,
                    info: m.info(),
                    fields,
                }
            }
            Self::Unknown(layer) => layer.summary(),
            Self::Malformed(layer) => layer.summary(),
        }
    }
}
