//! CSV reports of the packet store.
//!
//! Every write serializes the whole store. The first write of a session
//! truncates the destination and emits the header; later writes append, so
//! the file stays valid CSV while a capture is running. The exchange report
//! is a point-in-time summary and always replaces its destination.

mod scheduler;

pub use scheduler::ReportScheduler;

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::domain::{format_mac, DecodedPacket};
use crate::error::ReportError;
use crate::store::Exchange;

pub const REPORT_COLUMNS: [&str; 8] = [
    "id",
    "type",
    "source_mac",
    "destination_mac",
    "source_ip",
    "destination_ip",
    "length",
    "info",
];

pub const EXCHANGE_COLUMNS: [&str; 7] = [
    "source",
    "destination",
    "protocols",
    "packets",
    "bytes",
    "first_seen",
    "last_seen",
];

/// A periodic report owned by the session and lent to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportJob {
    pub interval: Duration,
    pub destination: PathBuf,
    /// The next write truncates and emits the header.
    pub is_first_write: bool,
    pub next_fire_deadline: Option<Instant>,
}

impl ReportJob {
    pub fn new(destination: impl Into<PathBuf>, interval: Duration) -> Result<Self, ReportError> {
        if interval < Duration::from_secs(1) {
            return Err(ReportError::InvalidInterval);
        }
        Ok(Self {
            interval,
            destination: destination.into(),
            is_first_write: true,
            next_fire_deadline: None,
        })
    }
}

#[derive(Debug, Serialize)]
struct ReportRow<'a> {
    id: u64,
    #[serde(rename = "type")]
    protocol: &'static str,
    source_mac: String,
    destination_mac: String,
    source_ip: String,
    destination_ip: String,
    length: usize,
    info: &'a str,
}

/// Write `packets` to `path`. Returns the number of data rows written.
pub fn write_report(
    packets: &[Arc<DecodedPacket>],
    path: &Path,
    is_first: bool,
) -> Result<usize, ReportError> {
    let io_error = |source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    };
    let csv_error = |source| ReportError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let file = if is_first {
        File::create(path).map_err(io_error)?
    } else {
        OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .map_err(io_error)?
    };

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);

    if is_first {
        writer.write_record(REPORT_COLUMNS).map_err(csv_error)?;
    }

    for packet in packets {
        let top = packet.top_layer();
        let (source_mac, destination_mac) = packet
            .mac_addresses()
            .map(|(src, dst)| (format_mac(&src), format_mac(&dst)))
            .unwrap_or_default();
        let (source_ip, destination_ip) = packet
            .ip_addresses()
            .map(|(src, dst)| (src.to_string(), dst.to_string()))
            .unwrap_or_default();

        writer
            .serialize(ReportRow {
                id: packet.id,
                protocol: top.protocol.name(),
                source_mac,
                destination_mac,
                source_ip,
                destination_ip,
                length: packet.length,
                info: &top.info,
            })
            .map_err(csv_error)?;
    }

    writer.flush().map_err(io_error)?;
    Ok(packets.len())
}

#[derive(Debug, Serialize)]
struct ExchangeRow<'a> {
    source: &'a str,
    destination: &'a str,
    protocols: String,
    packets: u64,
    bytes: u64,
    first_seen: String,
    last_seen: String,
}

/// Write one row per exchange to `path`, replacing any previous content.
pub fn write_exchange_report(exchanges: &[Exchange], path: &Path) -> Result<usize, ReportError> {
    let csv_error = |source| ReportError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    writer.write_record(EXCHANGE_COLUMNS).map_err(csv_error)?;

    for exchange in exchanges {
        let protocols: Vec<&str> = exchange.protocols.iter().map(|p| p.name()).collect();
        writer
            .serialize(ExchangeRow {
                source: &exchange.source,
                destination: &exchange.destination,
                protocols: protocols.join(" "),
                packets: exchange.packets,
                bytes: exchange.bytes,
                first_seen: exchange.first_seen.to_rfc3339(),
                last_seen: exchange.last_seen.to_rfc3339(),
            })
            .map_err(csv_error)?;
    }

    writer.flush().map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(exchanges.len())
}
