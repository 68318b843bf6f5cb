//! pnet-based live capture.

use std::io::ErrorKind;
use std::time::Duration;

use chrono::Utc;
use pnet::datalink::{self, Channel, Config, DataLinkReceiver, NetworkInterface};

use super::{CaptureBackend, FrameSource, LinkType, RawFrame};
use crate::error::CaptureError;

/// Tunables for live capture channels.
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// How long a read blocks before returning control to the pipeline.
    pub read_timeout: Duration,
    pub promiscuous: bool,
    pub read_buffer_size: usize,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(100),
            promiscuous: true,
            read_buffer_size: 65536,
        }
    }
}

/// Live capture using the pnet datalink layer.
pub struct PnetCapture {
    settings: CaptureSettings,
}

impl PnetCapture {
    pub fn new(settings: CaptureSettings) -> Self {
        Self { settings }
    }

    /// The name the UI knows an interface by. Windows exposes GUID names,
    /// so the description is used there instead.
    fn display_name(iface: &NetworkInterface) -> &str {
        if cfg!(target_os = "windows") {
            &iface.description
        } else {
            &iface.name
        }
    }

    fn find_interface(name: &str) -> Result<NetworkInterface, CaptureError> {
        datalink::interfaces()
            .into_iter()
            .find(|iface| Self::display_name(iface) == name)
            .ok_or_else(|| CaptureError::NoSuchInterface(name.to_string()))
    }

    /// One line per interface with status and addresses, for terminal listings.
    pub fn describe_interfaces() -> Vec<String> {
        datalink::interfaces()
            .into_iter()
            .map(|iface| {
                let status = if iface.is_up() { "UP" } else { "DOWN" };
                let ips: Vec<_> = iface.ips.iter().map(|ip| ip.to_string()).collect();
                format!(
                    "{}: {} [{}]",
                    Self::display_name(&iface),
                    status,
                    if ips.is_empty() {
                        "no IP".to_string()
                    } else {
                        ips.join(", ")
                    }
                )
            })
            .collect()
    }
}

impl Default for PnetCapture {
    fn default() -> Self {
        Self::new(CaptureSettings::default())
    }
}

impl CaptureBackend for PnetCapture {
    fn list_interfaces(&self) -> Result<Vec<String>, CaptureError> {
        let names: Vec<String> = datalink::interfaces()
            .iter()
            .map(|iface| Self::display_name(iface).to_string())
            .collect();
        tracing::debug!("Interfaces available: {:?}", names);
        Ok(names)
    }

    fn open(&self, interface: &str) -> Result<Box<dyn FrameSource>, CaptureError> {
        let iface = Self::find_interface(interface)?;

        let config = Config {
            read_timeout: Some(self.settings.read_timeout),
            read_buffer_size: self.settings.read_buffer_size,
            promiscuous: self.settings.promiscuous,
            ..Config::default()
        };

        let rx = match datalink::channel(&iface, config) {
            Ok(Channel::Ethernet(_tx, rx)) => rx,
            Ok(_) => return Err(CaptureError::UnsupportedChannel(interface.to_string())),
            Err(e) => return Err(CaptureError::from_open_error(interface, e)),
        };

        tracing::info!("[{}] Capture channel opened", interface);

        Ok(Box::new(PnetSource {
            name: interface.to_string(),
            rx: Some(rx),
        }))
    }
}

/// An open pnet receive channel.
struct PnetSource {
    name: String,
    rx: Option<Box<dyn DataLinkReceiver>>,
}

impl FrameSource for PnetSource {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, CaptureError> {
        let Some(rx) = self.rx.as_mut() else {
            return Ok(None);
        };

        match rx.next() {
            Ok(bytes) => Ok(Some(RawFrame {
                data: bytes.to_vec(),
                timestamp: Utc::now(),
                wire_length: bytes.len(),
                link_type: LinkType::Ethernet,
            })),
            // Timeout is expected, it lets the pipeline observe cancellation
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(None),
            Err(e) if e.kind() == ErrorKind::Interrupted => {
                tracing::debug!("[{}] Capture read interrupted", self.name);
                Ok(None)
            }
            Err(e) => Err(CaptureError::Io(e)),
        }
    }

    fn interface_name(&self) -> &str {
        &self.name
    }

    fn close(&mut self) {
        if self.rx.take().is_some() {
            tracing::info!("[{}] Capture channel closed", self.name);
        }
    }
}

impl Drop for PnetSource {
    fn drop(&mut self) {
        self.close();
    }
}
