//! The decoded packet and the pieces shared by every layer.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use macaddr::MacAddr6;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use super::{ApplicationLayer, LinkLayer, NetworkLayer, TransportLayer};
use crate::error::{DecodeError, FilterError};

/// Protocol tags a layer chain can carry. Also the vocabulary of
/// protocol filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Ethernet,
    Ipv4,
    Ipv6,
    Arp,
    Tcp,
    Udp,
    Icmp,
    Icmpv6,
    Http,
    Tls,
    Dns,
    Unknown,
    Malformed,
}

impl Protocol {
    pub const ALL: [Protocol; 13] = [
        Protocol::Ethernet,
        Protocol::Ipv4,
        Protocol::Ipv6,
        Protocol::Arp,
        Protocol::Tcp,
        Protocol::Udp,
        Protocol::Icmp,
        Protocol::Icmpv6,
        Protocol::Http,
        Protocol::Tls,
        Protocol::Dns,
        Protocol::Unknown,
        Protocol::Malformed,
    ];

    /// Display name, as used in the report `type` column.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ethernet => "Ethernet",
            Self::Ipv4 => "IPv4",
            Self::Ipv6 => "IPv6",
            Self::Arp => "ARP",
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
            Self::Icmp => "ICMP",
            Self::Icmpv6 => "ICMPv6",
            Self::Http => "HTTP",
            Self::Tls => "TLS",
            Self::Dns => "DNS",
            Self::Unknown => "Unknown",
            Self::Malformed => "Malformed",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Protocol {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_lowercase();
        match tag.as_str() {
            "icmp6" => return Ok(Self::Icmpv6),
            "ssl" => return Ok(Self::Tls),
            _ => {}
        }
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(&tag))
            .ok_or_else(|| FilterError::UnknownProtocol(s.to_string()))
    }
}

/// One (label, value) row of a layer's detail view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub label: String,
    pub value: String,
}

impl Field {
    pub fn new(label: impl Into<String>, value: impl fmt::Display) -> Self {
        Self {
            label: label.into(),
            value: value.to_string(),
        }
    }
}

/// Uniform rendering of one layer: its tag, a one-line info label and the
/// ordered detail fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerSummary {
    pub protocol: Protocol,
    pub info: String,
    pub fields: Vec<Field>,
}

/// Implemented by each closed layer enum.
pub trait Describe {
    fn protocol(&self) -> Protocol;
    fn describe(&self) -> LayerSummary;
}

/// A layer whose protocol identifier is not one we decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnknownLayer {
    /// What identified the layer, e.g. "EtherType 0x88cc".
    pub label: String,
    pub payload: Vec<u8>,
}

impl UnknownLayer {
    pub fn new(label: impl Into<String>, payload: &[u8]) -> Self {
        Self {
            label: label.into(),
            payload: payload.to_vec(),
        }
    }

    pub(crate) fn summary(&self) -> LayerSummary {
        LayerSummary {
            protocol: Protocol::Unknown,
            info: format!("Unknown ({})", self.label),
            fields: vec![
                Field::new("Identifier", &self.label),
                Field::new("Payload length", self.payload.len()),
            ],
        }
    }
}

/// A layer that started to decode but could not be completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MalformedLayer {
    /// Protocol the decoder was attempting.
    pub protocol: Protocol,
    pub reason: String,
    /// Fields decoded before the failure.
    pub recovered: Vec<Field>,
    /// The undecoded bytes, starting at this layer's header.
    pub remainder: Vec<u8>,
}

impl MalformedLayer {
    pub fn new(protocol: Protocol, error: &DecodeError, remainder: &[u8]) -> Self {
        Self {
            protocol,
            reason: error.to_string(),
            recovered: Vec::new(),
            remainder: remainder.to_vec(),
        }
    }

    pub fn with_recovered(mut self, recovered: Vec<Field>) -> Self {
        self.recovered = recovered;
        self
    }

    pub(crate) fn summary(&self) -> LayerSummary {
        let mut fields = vec![
            Field::new("Attempted protocol", self.protocol),
            Field::new("Reason", &self.reason),
        ];
        fields.extend(self.recovered.iter().cloned());
        fields.push(Field::new("Undecoded bytes", self.remainder.len()));
        LayerSummary {
            protocol: Protocol::Malformed,
            info: format!("Malformed {} ({})", self.protocol, self.reason),
            fields,
        }
    }
}

/// One frame decoded into its layer chain.
///
/// Serializes with the structured layers plus the rendered `info` of the
/// innermost layer and every layer's summary, so a UI can draw the list and
/// detail views without decoding anything itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPacket {
    /// Assigned by the store on append; 0 until then.
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    /// Length on the wire.
    pub length: usize,
    /// Bytes actually captured (may be less than `length`).
    pub captured_length: usize,
    pub link_layer: LinkLayer,
    pub network_layer: Option<NetworkLayer>,
    pub transport_layer: Option<TransportLayer>,
    pub application_layer: Option<ApplicationLayer>,
    /// Bytes carried above the innermost link, network or transport header.
    pub payload: Vec<u8>,
}

impl DecodedPacket {
    /// Protocol tags of every present layer, link first.
    pub fn protocols(&self) -> Vec<Protocol> {
        let mut tags = vec![self.link_layer.protocol()];
        if let Some(layer) = &self.network_layer {
            tags.push(layer.protocol());
        }
        if let Some(layer) = &self.transport_layer {
            tags.push(layer.protocol());
        }
        if let Some(layer) = &self.application_layer {
            tags.push(layer.protocol());
        }
        tags
    }

    pub fn contains(&self, protocol: Protocol) -> bool {
        self.protocols().contains(&protocol)
    }

    /// Descriptions of all present layers, link first.
    pub fn layers(&self) -> Vec<LayerSummary> {
        let mut layers = vec![self.link_layer.describe()];
        layers.extend(self.network_layer.as_ref().map(|l| l.describe()));
        layers.extend(self.transport_layer.as_ref().map(|l| l.describe()));
        layers.extend(self.application_layer.as_ref().map(|l| l.describe()));
        layers
    }

    /// Description of the innermost layer; drives the list view and report.
    pub fn top_layer(&self) -> LayerSummary {
        if let Some(layer) = &self.application_layer {
            return layer.describe();
        }
        if let Some(layer) = &self.transport_layer {
            return layer.describe();
        }
        if let Some(layer) = &self.network_layer {
            return layer.describe();
        }
        self.link_layer.describe()
    }

    pub fn mac_addresses(&self) -> Option<(MacAddr6, MacAddr6)> {
        self.link_layer.mac_addresses()
    }

    pub fn ip_addresses(&self) -> Option<(IpAddr, IpAddr)> {
        self.network_layer.as_ref()?.ip_addresses()
    }

    pub fn ports(&self) -> Option<(u16, u16)> {
        self.transport_layer.as_ref()?.ports()
    }
}

impl Serialize for DecodedPacket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("DecodedPacket", 11)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("timestamp", &self.timestamp)?;
        state.serialize_field("length", &self.length)?;
        state.serialize_field("captured_length", &self.captured_length)?;
        state.serialize_field("info", &self.top_layer().info)?;
        state.serialize_field("link_layer", &self.link_layer)?;
        state.serialize_field("network_layer", &self.network_layer)?;
        state.serialize_field("transport_layer", &self.transport_layer)?;
        state.serialize_field("application_layer", &self.application_layer)?;
        state.serialize_field("payload", &self.payload)?;
        state.serialize_field("layers", &self.layers())?;
        state.end()
    }
}

/// Lowercase colon-separated rendering used throughout the UI and report.
pub fn format_mac(mac: &MacAddr6) -> String {
    mac.as_bytes()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

pub(crate) fn serialize_mac<S: Serializer>(mac: &MacAddr6, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_mac(mac))
}
