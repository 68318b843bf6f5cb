//! Link layer variants.

use macaddr::MacAddr6;
use serde::Serialize;

use super::packet::{format_mac, serialize_mac, Describe, Field, LayerSummary, Protocol};
use super::{MalformedLayer, UnknownLayer};

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_ARP: u16 = 0x0806;
pub const ETHERTYPE_VLAN: u16 = 0x8100;
pub const ETHERTYPE_IPV6: u16 = 0x86DD;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "layer")]
pub enum LinkLayer {
    Ethernet(EthernetFrame),
    Unknown(UnknownLayer),
    Malformed(MalformedLayer),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EthernetFrame {
    #[serde(serialize_with = "serialize_mac")]
    pub source: MacAddr6,
    #[serde(serialize_with = "serialize_mac")]
    pub destination: MacAddr6,
    /// EtherType of the payload, after any 802.1Q tag.
    pub ethertype: u16,
    pub vlan_id: Option<u16>,
}

impl LinkLayer {
    pub fn mac_addresses(&self) -> Option<(MacAddr6, MacAddr6)> {
        match self {
            Self::Ethernet(frame) => Some((frame.source, frame.destination)),
            _ => None,
        }
    }
}

/// Human name of an EtherType.
pub fn ethertype_name(ethertype: u16) -> &'static str {
    match ethertype {
        ETHERTYPE_IPV4 => "IPv4",
        ETHERTYPE_ARP => "ARP",
        ETHERTYPE_VLAN => "802.1Q",
        ETHERTYPE_IPV6 => "IPv6",
        0x88CC => "LLDP",
        0x888E => "EAPOL",
        0x8863 | 0x8864 => "PPPoE",
        _ => "unknown",
    }
}

impl Describe for LinkLayer {
    fn protocol(&self) -> Protocol {
        match self {
            Self::Ethernet(_) => Protocol::Ethernet,
            Self::Unknown(_) => Protocol::Unknown,
            Self::Malformed(_) => Protocol::Malformed,
        }
    }

    fn describe(&self) -> LayerSummary {
        match self {
            Self::Ethernet(frame) => {
                let mut fields = vec![
                    Field::new("Source", format_mac(&frame.source)),
                    Field::new("Destination", format_mac(&frame.destination)),
                ];
                if let Some(vlan) = frame.vlan_id {
                    fields.push(Field::new("VLAN", vlan));
                }
                fields.push(Field::new(
                    "Type",
                    format!("{} (0x{:04x})", ethertype_name(frame.ethertype), frame.ethertype),
                ));
                LayerSummary {
                    protocol: Protocol::Ethernet,
                    info: format!(
                        "{} → {}",
                        format_mac(&frame.source),
                        format_mac(&frame.destination)
                    ),
                    fields,
                }
            }
            Self::Unknown(layer) => layer.summary(),
            Self::Malformed(layer) => layer.summary(),
        }
    }
}
