//! Append-only packet store.
//!
//! Packets are kept in capture order behind a `RwLock`; readers get shared
//! `Arc` handles so a snapshot never copies packet data and never blocks
//! the capture path for longer than a vector clone. Conversation totals
//! are kept alongside and updated under the same lock.

mod exchange;
mod filter;

pub use exchange::{Exchange, ExchangeKey};
pub use filter::{FieldPredicate, FilterSpec};

use exchange::ExchangeTable;

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::domain::DecodedPacket;

struct StoreInner {
    packets: Vec<Arc<DecodedPacket>>,
    exchanges: ExchangeTable,
    next_id: u64,
}

impl StoreInner {
    fn empty() -> Self {
        Self {
            packets: Vec::new(),
            exchanges: ExchangeTable::default(),
            next_id: 1,
        }
    }
}

pub struct PacketStore {
    inner: RwLock<StoreInner>,
}

impl PacketStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner::empty()),
        }
    }

    // A writer panicking mid-append cannot leave the vector half-updated,
    // so a poisoned lock is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Assign the next id to `packet` and store it. Returns the id.
    pub fn append(&self, mut packet: DecodedPacket) -> u64 {
        let mut inner = self.write();
        let id = inner.next_id;
        inner.next_id += 1;
        packet.id = id;
        inner.exchanges.record(&packet);
        inner.packets.push(Arc::new(packet));
        id
    }

    /// Packets matching `filter` in ascending id order, skipping the first
    /// `offset` matches and returning at most `limit`.
    pub fn query(&self, offset: usize, limit: usize, filter: &FilterSpec) -> Vec<Arc<DecodedPacket>> {
        let inner = self.read();
        if filter.is_empty() {
            return inner
                .packets
                .iter()
                .skip(offset)
                .take(limit)
                .cloned()
                .collect();
        }
        inner
            .packets
            .iter()
            .filter(|p| filter.matches(p))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Look up one packet by id.
    pub fn get(&self, id: u64) -> Option<Arc<DecodedPacket>> {
        let inner = self.read();
        // Ids are dense and ascending from 1 until the next clear
        let index = usize::try_from(id.checked_sub(1)?).ok()?;
        inner.packets.get(index).cloned()
    }

    /// Every stored packet, in id order.
    pub fn snapshot(&self) -> Vec<Arc<DecodedPacket>> {
        self.read().packets.clone()
    }

    /// Per source/destination totals for the packets currently stored,
    /// oldest exchange first.
    pub fn exchanges(&self) -> Vec<Exchange> {
        self.read().exchanges.summaries()
    }

    pub fn size(&self) -> usize {
        self.read().packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Drop every packet and restart ids at 1. The session only calls this
    /// while no capture is running.
    pub fn clear(&self) {
        let mut inner = self.write();
        let dropped = inner.packets.len();
        let exchanges = inner.exchanges.len();
        *inner = StoreInner::empty();
        tracing::debug!(
            "Packet store cleared ({} packets, {} exchanges dropped)",
            dropped,
            exchanges
        );
    }
}

impl Default for PacketStore {
    fn default() -> Self {
        Self::new()
    }
}
