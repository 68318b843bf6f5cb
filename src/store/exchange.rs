//! Per-conversation totals: which endpoints talked, over which protocols,
//! how much and when.

use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{format_mac, DecodedPacket, Protocol};

/// Directed endpoint pair. Endpoints are `ip:port` when the packet has
/// ports, the bare address for other IP traffic, and the MAC address for
/// everything below IP.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ExchangeKey {
    pub source: String,
    pub destination: String,
}

impl ExchangeKey {
    pub fn of(packet: &DecodedPacket) -> Option<Self> {
        if let Some((src_ip, dst_ip)) = packet.ip_addresses() {
            let (source, destination) = match packet.ports() {
                Some((src_port, dst_port)) => (
                    SocketAddr::new(src_ip, src_port).to_string(),
                    SocketAddr::new(dst_ip, dst_port).to_string(),
                ),
                None => (src_ip.to_string(), dst_ip.to_string()),
            };
            return Some(Self {
                source,
                destination,
            });
        }

        packet.mac_addresses().map(|(src, dst)| Self {
            source: format_mac(&src),
            destination: format_mac(&dst),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exchange {
    pub source: String,
    pub destination: String,
    pub protocols: BTreeSet<Protocol>,
    pub packets: u64,
    /// Wire bytes, link header included.
    pub bytes: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Exchange {
    fn new(key: ExchangeKey, packet: &DecodedPacket) -> Self {
        Self {
            source: key.source,
            destination: key.destination,
            protocols: packet.protocols().into_iter().collect(),
            packets: 1,
            bytes: packet.length as u64,
            first_seen: packet.timestamp,
            last_seen: packet.timestamp,
        }
    }

    fn add(&mut self, packet: &DecodedPacket) {
        self.protocols.extend(packet.protocols());
        self.packets += 1;
        self.bytes += packet.length as u64;
        self.first_seen = self.first_seen.min(packet.timestamp);
        self.last_seen = self.last_seen.max(packet.timestamp);
    }
}

/// Exchanges of the current run, updated on every append.
#[derive(Debug, Default)]
pub(crate) struct ExchangeTable {
    exchanges: HashMap<ExchangeKey, Exchange>,
}

impl ExchangeTable {
    pub fn record(&mut self, packet: &DecodedPacket) {
        let Some(key) = ExchangeKey::of(packet) else {
            return;
        };
        match self.exchanges.get_mut(&key) {
            Some(exchange) => exchange.add(packet),
            None => {
                let exchange = Exchange::new(key.clone(), packet);
                self.exchanges.insert(key, exchange);
            }
        }
    }

    /// Every exchange, oldest first.
    pub fn summaries(&self) -> Vec<Exchange> {
        let mut all: Vec<Exchange> = self.exchanges.values().cloned().collect();
        all.sort_by(|a, b| {
            (a.first_seen, &a.source, &a.destination).cmp(&(b.first_seen, &b.source, &b.destination))
        });
        all
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }
}
