use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use super::EventNotifier;
use crate::error::{CaptureError, ReportError};
use crate::session::SessionState;

/// Owned form of a notification, for delivery across tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    PacketReceived { id: u64 },
    StateChanged { state: SessionState },
    ReportWritten { path: PathBuf, rows: usize },
    ReportFailed { path: PathBuf, message: String },
    CaptureFailed { interface: String, message: String },
}

/// Newest packet id and whether a packet event is waiting unread.
#[derive(Debug, Default)]
struct PacketSlot {
    queued: AtomicBool,
    latest: AtomicU64,
}

/// Forwards events into a channel read through `SessionEvents`.
///
/// The sender never blocks, so the capture pipeline cannot stall on a slow
/// consumer. Packet arrivals are coalesced: while a `PacketReceived` waits
/// unread, later arrivals only move the id it will carry, so at most one
/// packet event is queued. Other events are queued one by one. Events sent
/// after the receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<SessionEvent>,
    packets: Arc<PacketSlot>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, SessionEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        let packets = Arc::new(PacketSlot::default());
        (
            Self {
                tx,
                packets: Arc::clone(&packets),
            },
            SessionEvents { rx, packets },
        )
    }

    fn send(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }
}

/// Receiving end of a `ChannelNotifier`.
#[derive(Debug)]
pub struct SessionEvents {
    rx: mpsc::UnboundedReceiver<SessionEvent>,
    packets: Arc<PacketSlot>,
}

impl SessionEvents {
    /// Wait for the next event; `None` once every notifier is gone.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        let event = self.rx.recv().await?;
        Some(self.settle(event))
    }

    pub fn try_recv(&mut self) -> Result<SessionEvent, TryRecvError> {
        self.rx.try_recv().map(|event| self.settle(event))
    }

    /// A packet event reports the newest id at the time it is read.
    fn settle(&self, event: SessionEvent) -> SessionEvent {
        match event {
            SessionEvent::PacketReceived { .. } => {
                self.packets.queued.store(false, Ordering::SeqCst);
                SessionEvent::PacketReceived {
                    id: self.packets.latest.load(Ordering::SeqCst),
                }
            }
            other => other,
        }
    }
}

impl EventNotifier for ChannelNotifier {
    fn packet_received(&self, id: u64) {
        self.packets.latest.store(id, Ordering::SeqCst);
        if !self.packets.queued.swap(true, Ordering::SeqCst) {
            self.send(SessionEvent::PacketReceived { id });
        }
    }

    fn state_changed(&self, state: SessionState) {
        self.send(SessionEvent::StateChanged { state });
    }

    fn report_written(&self, path: &Path, rows: usize) {
        self.send(SessionEvent::ReportWritten {
            path: path.to_path_buf(),
            rows,
        });
    }

    fn report_failed(&self, path: &Path, error: &ReportError) {
        self.send(SessionEvent::ReportFailed {
            path: path.to_path_buf(),
            message: error.to_string(),
        });
    }

    fn capture_failed(&self, interface: &str, error: &CaptureError) {
        self.send(SessionEvent::CaptureFailed {
            interface: interface.to_string(),
            message: error.to_string(),
        });
    }
}
