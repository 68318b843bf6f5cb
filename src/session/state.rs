//! Session state, its transition table, and active-time bookkeeping.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Inactive,
    Active,
    Paused,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Inactive => "inactive",
            Self::Active => "active",
            Self::Paused => "paused",
        })
    }
}

/// Control events accepted by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Start,
    Stop,
    Pause,
    Resume,
}

impl SessionState {
    pub const ALL: [SessionState; 3] = [Self::Inactive, Self::Active, Self::Paused];

    /// The state `control` leads to, or `None` when there is no such edge.
    pub fn next(self, control: Control) -> Option<SessionState> {
        match (self, control) {
            (Self::Inactive, Control::Start) => Some(Self::Active),
            (Self::Active, Control::Stop) => Some(Self::Inactive),
            (Self::Active, Control::Pause) => Some(Self::Paused),
            (Self::Paused, Control::Resume) => Some(Self::Active),
            (Self::Paused, Control::Stop) => Some(Self::Inactive),
            _ => None,
        }
    }
}

/// Outcome of a control call. Calls without a matching edge, or whose
/// guard fails, are ignored rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum Transition {
    Applied { state: SessionState },
    Ignored { state: SessionState, reason: String },
}

impl Transition {
    pub(crate) fn ignored(state: SessionState, reason: impl Into<String>) -> Self {
        Self::Ignored {
            state,
            reason: reason.into(),
        }
    }

    pub fn applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    /// State after the call.
    pub fn state(&self) -> SessionState {
        match self {
            Self::Applied { state } | Self::Ignored { state, .. } => *state,
        }
    }
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub selected_interface: Option<String>,
    /// Interface of the current run, while Active or Paused.
    pub capture_interface: Option<String>,
    pub report_destination: Option<PathBuf>,
    /// Active capture time of the current run, excluding pauses.
    pub elapsed: Duration,
    pub packets: usize,
}

/// Tracks active capture time across pause/resume cycles.
///
/// `elapsed_before_pause` plus the time since `capture_epoch` is the total
/// active time of the run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveClock {
    capture_epoch: Option<Instant>,
    elapsed_before_pause: Duration,
}

impl ActiveClock {
    pub fn start(&mut self, now: Instant) {
        self.capture_epoch = Some(now);
        self.elapsed_before_pause = Duration::ZERO;
    }

    pub fn pause(&mut self, now: Instant) {
        if let Some(epoch) = self.capture_epoch.take() {
            self.elapsed_before_pause += now.saturating_duration_since(epoch);
        }
    }

    pub fn resume(&mut self, now: Instant) {
        self.capture_epoch = Some(now);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_running(&self) -> bool {
        self.capture_epoch.is_some()
    }

    pub fn elapsed_before_pause(&self) -> Duration {
        self.elapsed_before_pause
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        let current = self
            .capture_epoch
            .map_or(Duration::ZERO, |epoch| now.saturating_duration_since(epoch));
        self.elapsed_before_pause + current
    }

    /// Time left until the next report after a resume:
    /// `interval - (elapsed_before_pause mod interval)`.
    pub fn resume_delay(&self, interval: Duration) -> Duration {
        let interval_nanos = interval.as_nanos();
        if interval_nanos == 0 {
            return Duration::ZERO;
        }
        let into_window = self.elapsed_before_pause.as_nanos() % interval_nanos;
        // into_window < interval, so the difference fits the interval's range
        Duration::from_nanos((interval_nanos - into_window) as u64)
    }
}
