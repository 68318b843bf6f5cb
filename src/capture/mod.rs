//! Packet capture abstraction.
//!
//! `CaptureBackend` opens interfaces and `FrameSource` yields raw frames
//! from one open handle. The pnet backend reads live traffic; the replay
//! backend serves prepared frames, so sessions can be driven without a
//! capture device.

mod pnet_capture;
mod replay_capture;

pub use pnet_capture::{CaptureSettings, PnetCapture};
pub use replay_capture::ReplayCapture;

use chrono::{DateTime, Utc};

use crate::error::CaptureError;

/// Link type of the captured bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Ethernet,
    /// Any other DLT value; decoded as an unknown link layer.
    Other(u16),
}

/// A raw frame as delivered by the capture device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub data: Vec<u8>,
    pub timestamp: DateTime<Utc>,
    /// Length on the wire; may exceed `data.len()` when the snapshot was cut.
    pub wire_length: usize,
    pub link_type: LinkType,
}

impl RawFrame {
    /// An Ethernet frame captured now, with nothing truncated.
    pub fn ethernet(data: Vec<u8>) -> Self {
        Self {
            wire_length: data.len(),
            data,
            timestamp: Utc::now(),
            link_type: LinkType::Ethernet,
        }
    }
}

/// One open capture handle.
///
/// Dropping the source releases the underlying device; `close` does the same
/// eagerly.
pub trait FrameSource: Send {
    /// Wait for the next frame.
    ///
    /// Returns `Ok(None)` when the read timed out without traffic, so the
    /// caller can check for cancellation. Malformed link data is never an
    /// error here; only device failures are.
    fn next_frame(&mut self) -> Result<Option<RawFrame>, CaptureError>;

    /// Name of the interface this handle reads from.
    fn interface_name(&self) -> &str;

    /// Release the device.
    fn close(&mut self);
}

/// Factory for capture handles.
pub trait CaptureBackend: Send + Sync {
    /// Names of the interfaces that can be opened, in OS order.
    fn list_interfaces(&self) -> Result<Vec<String>, CaptureError>;

    /// Open a handle on `interface`.
    fn open(&self, interface: &str) -> Result<Box<dyn FrameSource>, CaptureError>;
}
