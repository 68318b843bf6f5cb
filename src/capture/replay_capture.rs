//! In-memory replay capture.
//!
//! Each interface owns a queue of prepared frames shared by every handle
//! opened on it, so a handle reopened after a pause continues where the
//! previous one stopped.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{CaptureBackend, FrameSource, RawFrame};
use crate::error::CaptureError;

#[derive(Default)]
struct ReplayInterface {
    frames: VecDeque<RawFrame>,
    deny_access: bool,
    /// Report a device failure once the queue is drained.
    fail_when_drained: bool,
    opens: usize,
    open_handles: usize,
}

pub struct ReplayCapture {
    interfaces: Arc<Mutex<HashMap<String, ReplayInterface>>>,
    /// Emulated read timeout while the queue is empty.
    idle_wait: Duration,
}

fn lock(
    interfaces: &Mutex<HashMap<String, ReplayInterface>>,
) -> MutexGuard<'_, HashMap<String, ReplayInterface>> {
    interfaces.lock().unwrap_or_else(|e| e.into_inner())
}

impl ReplayCapture {
    pub fn new() -> Self {
        Self {
            interfaces: Arc::new(Mutex::new(HashMap::new())),
            idle_wait: Duration::from_millis(5),
        }
    }

    /// Register `name` with an initial frame queue.
    pub fn with_interface(self, name: &str, frames: Vec<RawFrame>) -> Self {
        lock(&self.interfaces)
            .entry(name.to_string())
            .or_default()
            .frames
            .extend(frames);
        self
    }

    /// Opening `name` fails with `PermissionDenied`.
    pub fn with_denied_access(self, name: &str) -> Self {
        lock(&self.interfaces)
            .entry(name.to_string())
            .or_default()
            .deny_access = true;
        self
    }

    /// Reads on `name` fail with an I/O error once its frames are consumed.
    pub fn with_failure_when_drained(self, name: &str) -> Self {
        lock(&self.interfaces)
            .entry(name.to_string())
            .or_default()
            .fail_when_drained = true;
        self
    }

    pub fn with_idle_wait(mut self, idle_wait: Duration) -> Self {
        self.idle_wait = idle_wait;
        self
    }

    /// Queue more frames on an already registered interface.
    pub fn push_frames(&self, name: &str, frames: Vec<RawFrame>) {
        if let Some(iface) = lock(&self.interfaces).get_mut(name) {
            iface.frames.extend(frames);
        }
    }

    /// Toggle access denial on a registered interface.
    pub fn set_denied(&self, name: &str, denied: bool) {
        if let Some(iface) = lock(&self.interfaces).get_mut(name) {
            iface.deny_access = denied;
        }
    }

    /// Frames not yet delivered on `name`.
    pub fn pending(&self, name: &str) -> usize {
        lock(&self.interfaces)
            .get(name)
            .map_or(0, |iface| iface.frames.len())
    }

    /// How many times `name` has been opened.
    pub fn open_count(&self, name: &str) -> usize {
        lock(&self.interfaces).get(name).map_or(0, |iface| iface.opens)
    }

    /// Handles on `name` that have not been closed yet.
    pub fn open_handles(&self, name: &str) -> usize {
        lock(&self.interfaces)
            .get(name)
            .map_or(0, |iface| iface.open_handles)
    }
}

impl Default for ReplayCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for ReplayCapture {
    fn list_interfaces(&self) -> Result<Vec<String>, CaptureError> {
        let mut names: Vec<String> = lock(&self.interfaces).keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn open(&self, interface: &str) -> Result<Box<dyn FrameSource>, CaptureError> {
        let mut interfaces = lock(&self.interfaces);
        let iface = interfaces
            .get_mut(interface)
            .ok_or_else(|| CaptureError::NoSuchInterface(interface.to_string()))?;

        if iface.deny_access {
            return Err(CaptureError::PermissionDenied(interface.to_string()));
        }

        iface.opens += 1;
        iface.open_handles += 1;

        Ok(Box::new(ReplaySource {
            name: interface.to_string(),
            interfaces: Arc::clone(&self.interfaces),
            idle_wait: self.idle_wait,
            open: true,
        }))
    }
}

struct ReplaySource {
    name: String,
    interfaces: Arc<Mutex<HashMap<String, ReplayInterface>>>,
    idle_wait: Duration,
    open: bool,
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, CaptureError> {
        if !self.open {
            return Ok(None);
        }

        {
            let mut interfaces = lock(&self.interfaces);
            let Some(iface) = interfaces.get_mut(&self.name) else {
                return Err(CaptureError::NoSuchInterface(self.name.clone()));
            };
            if let Some(frame) = iface.frames.pop_front() {
                return Ok(Some(frame));
            }
            if iface.fail_when_drained {
                return Err(CaptureError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "replay device failure",
                )));
            }
        }

        std::thread::sleep(self.idle_wait);
        Ok(None)
    }

    fn interface_name(&self) -> &str {
        &self.name
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        if let Some(iface) = lock(&self.interfaces).get_mut(&self.name) {
            iface.open_handles = iface.open_handles.saturating_sub(1);
        }
    }
}

impl Drop for ReplaySource {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(byte: u8) -> RawFrame {
        RawFrame::ethernet(vec![byte; 60])
    }

    #[test]
    fn test_reopen_continues_after_last_frame() {
        let capture = ReplayCapture::new().with_interface("eth0", vec![frame(1), frame(2), frame(3)]);

        let mut first = capture.open("eth0").unwrap();
        assert_eq!(first.next_frame().unwrap().unwrap().data[0], 1);
        first.close();

        let mut second = capture.open("eth0").unwrap();
        assert_eq!(second.next_frame().unwrap().unwrap().data[0], 2);
        assert_eq!(capture.open_count("eth0"), 2);
        assert_eq!(capture.pending("eth0"), 1);
    }

    #[test]
    fn test_drained_queue_times_out() {
        let capture = ReplayCapture::new()
            .with_interface("eth0", Vec::new())
            .with_idle_wait(Duration::from_millis(1));
        let mut source = capture.open("eth0").unwrap();
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_open_errors() {
        let capture = ReplayCapture::new().with_denied_access("eth1");
        assert!(matches!(
            capture.open("eth1"),
            Err(CaptureError::PermissionDenied(_))
        ));
        assert!(matches!(
            capture.open("wlan9"),
            Err(CaptureError::NoSuchInterface(_))
        ));
    }

    #[test]
    fn test_drop_releases_handle() {
        let capture = ReplayCapture::new().with_interface("eth0", Vec::new());
        let source = capture.open("eth0").unwrap();
        assert_eq!(capture.open_handles("eth0"), 1);
        drop(source);
        assert_eq!(capture.open_handles("eth0"), 0);
    }

    #[test]
    fn test_failure_when_drained() {
        let capture = ReplayCapture::new()
            .with_interface("eth0", vec![frame(7)])
            .with_failure_when_drained("eth0");
        let mut source = capture.open("eth0").unwrap();
        assert!(source.next_frame().unwrap().is_some());
        assert!(matches!(source.next_frame(), Err(CaptureError::Io(_))));
    }
}
