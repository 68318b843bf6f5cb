//! Query-time packet filters.

use std::collections::HashSet;
use std::net::IpAddr;

use macaddr::MacAddr6;

use crate::domain::{format_mac, DecodedPacket, Protocol};
use crate::error::FilterError;

/// An equality constraint on one addressing field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPredicate {
    SrcIp(IpAddr),
    DstIp(IpAddr),
    SrcMac(MacAddr6),
    DstMac(MacAddr6),
    SrcPort(u16),
    DstPort(u16),
}

impl FieldPredicate {
    /// Parse a `field=value` pair as given by the UI.
    pub fn parse(field: &str, value: &str) -> Result<Self, FilterError> {
        let invalid = || FilterError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        };
        let value = value.trim();

        match field.trim().to_ascii_lowercase().as_str() {
            "src_ip" => value.parse().map(Self::SrcIp).map_err(|_| invalid()),
            "dst_ip" => value.parse().map(Self::DstIp).map_err(|_| invalid()),
            "src_mac" => value.parse().map(Self::SrcMac).map_err(|_| invalid()),
            "dst_mac" => value.parse().map(Self::DstMac).map_err(|_| invalid()),
            "src_port" => value.parse().map(Self::SrcPort).map_err(|_| invalid()),
            "dst_port" => value.parse().map(Self::DstPort).map_err(|_| invalid()),
            _ => Err(FilterError::UnknownField(field.to_string())),
        }
    }

    /// A packet without the layer the field lives on never matches.
    pub fn matches(&self, packet: &DecodedPacket) -> bool {
        match self {
            Self::SrcIp(ip) => packet.ip_addresses().is_some_and(|(src, _)| src == *ip),
            Self::DstIp(ip) => packet.ip_addresses().is_some_and(|(_, dst)| dst == *ip),
            Self::SrcMac(mac) => packet.mac_addresses().is_some_and(|(src, _)| src == *mac),
            Self::DstMac(mac) => packet.mac_addresses().is_some_and(|(_, dst)| dst == *mac),
            Self::SrcPort(port) => packet.ports().is_some_and(|(src, _)| src == *port),
            Self::DstPort(port) => packet.ports().is_some_and(|(_, dst)| dst == *port),
        }
    }

    pub fn field_name(&self) -> &'static str {
        match self {
            Self::SrcIp(_) => "src_ip",
            Self::DstIp(_) => "dst_ip",
            Self::SrcMac(_) => "src_mac",
            Self::DstMac(_) => "dst_mac",
            Self::SrcPort(_) => "src_port",
            Self::DstPort(_) => "dst_port",
        }
    }

    pub fn value_string(&self) -> String {
        match self {
            Self::SrcIp(ip) | Self::DstIp(ip) => ip.to_string(),
            Self::SrcMac(mac) | Self::DstMac(mac) => format_mac(mac),
            Self::SrcPort(port) | Self::DstPort(port) => port.to_string(),
        }
    }
}

/// Protocol tags (any of) ANDed with field predicates (all of).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    protocols: HashSet<Protocol>,
    predicates: Vec<FieldPredicate>,
}

impl FilterSpec {
    /// Matches every packet.
    pub fn all() -> Self {
        Self::default()
    }

    /// Build a filter from UI input. Every tag and pair is validated, so
    /// an invalid filter never reaches the store.
    pub fn parse<T, F>(tags: &[T], fields: &[(F, F)]) -> Result<Self, FilterError>
    where
        T: AsRef<str>,
        F: AsRef<str>,
    {
        let protocols = tags
            .iter()
            .map(|tag| tag.as_ref().parse::<Protocol>())
            .collect::<Result<HashSet<_>, _>>()?;
        let predicates = fields
            .iter()
            .map(|(field, value)| FieldPredicate::parse(field.as_ref(), value.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            protocols,
            predicates,
        })
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocols.insert(protocol);
        self
    }

    pub fn with_predicate(mut self, predicate: FieldPredicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn protocols(&self) -> &HashSet<Protocol> {
        &self.protocols
    }

    pub fn predicates(&self) -> &[FieldPredicate] {
        &self.predicates
    }

    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty() && self.predicates.is_empty()
    }

    pub fn matches(&self, packet: &DecodedPacket) -> bool {
        let protocol_match = self.protocols.is_empty()
            || packet
                .protocols()
                .iter()
                .any(|tag| self.protocols.contains(tag));
        protocol_match && self.predicates.iter().all(|p| p.matches(packet))
    }
}
