use std::path::Path;

use super::EventNotifier;
use crate::error::{CaptureError, ReportError};
use crate::session::SessionState;

/// Writes session events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl EventNotifier for LogNotifier {
    fn packet_received(&self, id: u64) {
        tracing::trace!("Packet {} stored", id);
    }

    fn state_changed(&self, state: SessionState) {
        tracing::info!("Session is now {}", state);
    }

    fn report_written(&self, path: &Path, rows: usize) {
        tracing::info!("Report written to {} ({} packets)", path.display(), rows);
    }

    fn report_failed(&self, path: &Path, error: &ReportError) {
        tracing::error!("Report to {} failed: {}", path.display(), error);
    }

    fn capture_failed(&self, interface: &str, error: &CaptureError) {
        tracing::error!("[{}] Capture stopped: {}", interface, error);
    }
}
