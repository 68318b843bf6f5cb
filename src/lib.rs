//! Wirefish - live packet capture and protocol decoding.
//!
//! Frames read from an interface are decoded layer by layer (link, network,
//! transport, application), kept in an append-only store that can be
//! filtered and paged, and periodically written out as CSV reports while a
//! session is active.

pub mod capture;
pub mod commands;
pub mod config;
pub mod decoder;
pub mod domain;
pub mod error;
pub mod notifier;
pub mod report;
pub mod session;
pub mod store;

pub use capture::{CaptureBackend, FrameSource, PnetCapture, RawFrame, ReplayCapture};
pub use commands::SnifferService;
pub use config::SnifferConfig;
pub use decoder::ProtocolDecoder;
pub use domain::{DecodedPacket, Protocol};
pub use error::{CaptureError, CommandError, ConfigError, FilterError, ReportError};
pub use notifier::{ChannelNotifier, EventNotifier, LogNotifier, SessionEvent, SessionEvents};
pub use report::{write_exchange_report, write_report, ReportJob, ReportScheduler};
pub use session::{SessionState, SessionStatus, SniffingSession, Transition};
pub use store::{Exchange, FilterSpec, PacketStore};
