//! Outbound session events.
//!
//! `EventNotifier` is the only way the engine talks to whatever sits on top
//! of it. Events carry ids and paths, never packet content; consumers
//! re-query the store for that.

mod channel_notifier;
mod log_notifier;

pub use channel_notifier::{ChannelNotifier, SessionEvent, SessionEvents};
pub use log_notifier::LogNotifier;

use std::path::Path;

use crate::error::{CaptureError, ReportError};
use crate::session::SessionState;

pub trait EventNotifier: Send + Sync {
    /// A packet was appended to the store.
    fn packet_received(&self, id: u64);

    /// The session completed a transition.
    fn state_changed(&self, state: SessionState);

    fn report_written(&self, path: &Path, rows: usize);

    /// A report write failed. The schedule keeps running.
    fn report_failed(&self, path: &Path, error: &ReportError);

    /// The capture pipeline died; the session is already `Inactive`.
    fn capture_failed(&self, interface: &str, error: &CaptureError);
}
