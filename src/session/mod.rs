//! The sniffing session: lifecycle of one capture at a time.
//!
//! `SniffingSession` owns the packet store, the capture pipeline and the
//! report scheduler. Every control call takes the session lock for its
//! whole duration, so transitions never overlap; calls that have no edge
//! from the current state are ignored.

mod pipeline;
mod state;

pub use state::{ActiveClock, Control, SessionState, SessionStatus, Transition};

use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::capture::{CaptureBackend, FrameSource};
use crate::decoder::ProtocolDecoder;
use crate::error::{CaptureError, ReportError};
use crate::notifier::EventNotifier;
use crate::report::{ReportJob, ReportScheduler};
use crate::store::PacketStore;
use pipeline::Pipeline;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
struct ReportSettings {
    destination: PathBuf,
    interval: Duration,
}

struct SessionInner {
    state: SessionState,
    selected_interface: Option<String>,
    /// Interface opened by the current run; resume reopens this one.
    run_interface: Option<String>,
    report: Option<ReportSettings>,
    clock: ActiveClock,
    /// Report job frozen by a pause.
    paused_job: Option<ReportJob>,
    pipeline: Option<Pipeline>,
    scheduler: ReportScheduler,
    /// Incremented on every start; stale failure reports are ignored.
    run_id: u64,
}

struct Shared {
    backend: Arc<dyn CaptureBackend>,
    decoder: ProtocolDecoder,
    store: Arc<PacketStore>,
    notifier: Arc<dyn EventNotifier>,
    channel_capacity: usize,
    inner: Mutex<SessionInner>,
}

#[derive(Clone)]
pub struct SniffingSession {
    shared: Arc<Shared>,
}

impl SniffingSession {
    pub fn new(backend: Arc<dyn CaptureBackend>, notifier: Arc<dyn EventNotifier>) -> Self {
        Self::with_capacity(backend, notifier, DEFAULT_CHANNEL_CAPACITY)
    }

    /// `channel_capacity` bounds the frames buffered between capture and
    /// decode.
    pub fn with_capacity(
        backend: Arc<dyn CaptureBackend>,
        notifier: Arc<dyn EventNotifier>,
        channel_capacity: usize,
    ) -> Self {
        let store = Arc::new(PacketStore::new());
        let scheduler = ReportScheduler::new(Arc::clone(&store), Arc::clone(&notifier));
        Self {
            shared: Arc::new(Shared {
                backend,
                decoder: ProtocolDecoder::new(),
                store,
                notifier,
                channel_capacity,
                inner: Mutex::new(SessionInner {
                    state: SessionState::Inactive,
                    selected_interface: None,
                    run_interface: None,
                    report: None,
                    clock: ActiveClock::default(),
                    paused_job: None,
                    pipeline: None,
                    scheduler,
                    run_id: 0,
                }),
            }),
        }
    }

    pub fn store(&self) -> Arc<PacketStore> {
        Arc::clone(&self.shared.store)
    }

    pub fn notifier(&self) -> Arc<dyn EventNotifier> {
        Arc::clone(&self.shared.notifier)
    }

    pub fn list_interfaces(&self) -> Result<Vec<String>, CaptureError> {
        self.shared.backend.list_interfaces()
    }

    /// Choose the interface the next `start` opens.
    pub async fn select_interface(&self, name: &str) -> Result<(), CaptureError> {
        let available = self.shared.backend.list_interfaces()?;
        if !available.iter().any(|iface| iface == name) {
            return Err(CaptureError::NoSuchInterface(name.to_string()));
        }

        let mut inner = self.shared.inner.lock().await;
        inner.selected_interface = Some(name.to_string());
        tracing::info!("Interface selected: {}", name);
        Ok(())
    }

    /// Set the periodic report used by the next `start`.
    pub async fn configure_report(
        &self,
        destination: impl Into<PathBuf>,
        interval: Duration,
    ) -> Result<(), ReportError> {
        let job = ReportJob::new(destination, interval)?;
        let mut inner = self.shared.inner.lock().await;
        tracing::info!(
            "Report configured: {} every {:?}",
            job.destination.display(),
            job.interval
        );
        inner.report = Some(ReportSettings {
            destination: job.destination,
            interval: job.interval,
        });
        Ok(())
    }

    pub async fn state(&self) -> SessionState {
        self.shared.inner.lock().await.state
    }

    pub async fn status(&self) -> SessionStatus {
        let inner = self.shared.inner.lock().await;
        SessionStatus {
            state: inner.state,
            selected_interface: inner.selected_interface.clone(),
            capture_interface: inner.run_interface.clone(),
            report_destination: inner.report.as_ref().map(|r| r.destination.clone()),
            elapsed: inner.clock.elapsed(Instant::now()),
            packets: self.shared.store.size(),
        }
    }

    /// Begin a new run: clear the store, open the selected interface and
    /// schedule the report at the full interval.
    ///
    /// If the interface cannot be opened the session stays `Inactive` and
    /// the store is untouched.
    pub async fn start(&self) -> Result<Transition, CaptureError> {
        let mut inner = self.shared.inner.lock().await;
        if inner.state.next(Control::Start).is_none() {
            return Ok(self.ignore(&inner, Control::Start, "no start edge"));
        }
        let Some(interface) = inner.selected_interface.clone() else {
            return Ok(self.ignore(&inner, Control::Start, "no interface selected"));
        };
        let Some(report) = inner.report.clone() else {
            return Ok(self.ignore(&inner, Control::Start, "no report destination configured"));
        };

        let source = self.shared.backend.open(&interface)?;

        self.shared.store.clear();
        inner.run_id += 1;
        let pipeline = self.launch_pipeline(source, inner.run_id, &interface);
        inner.pipeline = Some(pipeline);
        inner.clock.start(Instant::now());

        let job = ReportJob {
            interval: report.interval,
            destination: report.destination,
            is_first_write: true,
            next_fire_deadline: None,
        };
        inner.scheduler.schedule(job, report.interval);
        inner.paused_job = None;
        inner.run_interface = Some(interface.clone());

        tracing::info!("[{}] Sniffing started", interface);
        Ok(self.enter(&mut inner, SessionState::Active))
    }

    /// Suspend capture, keeping the store and the report countdown.
    pub async fn pause(&self) -> Transition {
        let mut inner = self.shared.inner.lock().await;
        if inner.state.next(Control::Pause).is_none() {
            return self.ignore(&inner, Control::Pause, "not capturing");
        }

        if let Some(pipeline) = inner.pipeline.take() {
            pipeline.halt().await;
        }
        inner.clock.pause(Instant::now());
        inner.paused_job = inner.scheduler.cancel().await;

        tracing::info!(
            "Sniffing paused after {:?} of capture",
            inner.clock.elapsed_before_pause()
        );
        self.enter(&mut inner, SessionState::Paused)
    }

    /// Reopen the run's interface and continue the report countdown where
    /// the pause left it.
    pub async fn resume(&self) -> Result<Transition, CaptureError> {
        let mut inner = self.shared.inner.lock().await;
        if inner.state.next(Control::Resume).is_none() {
            return Ok(self.ignore(&inner, Control::Resume, "not paused"));
        }
        let Some(interface) = inner.run_interface.clone() else {
            return Ok(self.ignore(&inner, Control::Resume, "no interface for this run"));
        };
        let job = inner.paused_job.take().or_else(|| {
            inner.report.as_ref().map(|r| ReportJob {
                interval: r.interval,
                destination: r.destination.clone(),
                is_first_write: false,
                next_fire_deadline: None,
            })
        });
        let Some(job) = job else {
            return Ok(self.ignore(&inner, Control::Resume, "no report destination configured"));
        };

        let source = match self.shared.backend.open(&interface) {
            Ok(source) => source,
            Err(e) => {
                inner.paused_job = Some(job);
                return Err(e);
            }
        };

        let pipeline = self.launch_pipeline(source, inner.run_id, &interface);
        inner.pipeline = Some(pipeline);
        inner.clock.resume(Instant::now());
        let delay = inner.clock.resume_delay(job.interval);
        inner.scheduler.schedule(job, delay);

        tracing::info!("[{}] Sniffing resumed, next report in {:?}", interface, delay);
        Ok(self.enter(&mut inner, SessionState::Active))
    }

    /// End the run. The store is kept for a final report until the next
    /// `start`.
    pub async fn stop(&self) -> Transition {
        let mut inner = self.shared.inner.lock().await;
        if inner.state.next(Control::Stop).is_none() {
            return self.ignore(&inner, Control::Stop, "no run in progress");
        }

        if let Some(pipeline) = inner.pipeline.take() {
            pipeline.halt().await;
        }
        inner.scheduler.cancel().await;
        inner.paused_job = None;
        inner.clock.reset();
        inner.run_interface = None;

        tracing::info!(
            "Sniffing stopped with {} packets stored",
            self.shared.store.size()
        );
        self.enter(&mut inner, SessionState::Inactive)
    }

    fn enter(&self, inner: &mut SessionInner, state: SessionState) -> Transition {
        inner.state = state;
        self.shared.notifier.state_changed(state);
        Transition::Applied { state }
    }

    fn ignore(&self, inner: &SessionInner, control: Control, reason: &str) -> Transition {
        tracing::debug!("{:?} ignored while {}: {}", control, inner.state, reason);
        Transition::ignored(inner.state, reason)
    }

    fn launch_pipeline(
        &self,
        source: Box<dyn FrameSource>,
        run_id: u64,
        interface: &str,
    ) -> Pipeline {
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let runtime = tokio::runtime::Handle::current();
        let interface = interface.to_string();

        Pipeline::launch(
            source,
            self.shared.decoder,
            Arc::clone(&self.shared.store),
            Arc::clone(&self.shared.notifier),
            self.shared.channel_capacity,
            move |error| {
                runtime.spawn(async move {
                    if let Some(shared) = weak.upgrade() {
                        shared.fail_run(run_id, &interface, error).await;
                    }
                });
            },
        )
    }
}

impl Shared {
    /// Tear down a run whose capture device failed.
    async fn fail_run(&self, run_id: u64, interface: &str, error: CaptureError) {
        let mut inner = self.inner.lock().await;
        if inner.run_id != run_id || inner.state != SessionState::Active {
            tracing::debug!("[{}] Ignoring failure of a finished run: {}", interface, error);
            return;
        }

        tracing::warn!("[{}] Capture failed, ending run: {}", interface, error);
        if let Some(pipeline) = inner.pipeline.take() {
            pipeline.halt().await;
        }
        inner.scheduler.cancel().await;
        inner.paused_job = None;
        inner.clock.reset();
        inner.run_interface = None;
        inner.state = SessionState::Inactive;

        self.notifier.capture_failed(interface, &error);
        self.notifier.state_changed(SessionState::Inactive);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{RawFrame, ReplayCapture};
    use crate::domain::Protocol;
    use crate::notifier::{ChannelNotifier, SessionEvent, SessionEvents};
    use crate::store::FilterSpec;
    use tempfile::TempDir;

    /// Ethernet/IPv4/TCP frame carrying an HTTP GET.
    fn http_get_frame() -> RawFrame {
        let request = b"GET /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let mut tcp = vec![0u8; 20];
        tcp[0..2].copy_from_slice(&51000u16.to_be_bytes());
        tcp[2..4].copy_from_slice(&80u16.to_be_bytes());
        tcp[12] = 5 << 4;
        tcp[13] = 0x18;
        tcp.extend(request);

        let mut ip = vec![0u8; 20];
        ip[0] = 0x45;
        ip[2..4].copy_from_slice(&((20 + tcp.len()) as u16).to_be_bytes());
        ip[8] = 64;
        ip[9] = 6;
        ip[12..16].copy_from_slice(&[192, 168, 1, 10]);
        ip[16..20].copy_from_slice(&[93, 184, 216, 34]);
        ip.extend(tcp);

        let mut frame = vec![0x00, 0x11, 0x22, 0x33, 0x44, 0x55];
        frame.extend([0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0x08, 0x00]);
        frame.extend(ip);
        RawFrame::ethernet(frame)
    }

    fn frames(count: usize) -> Vec<RawFrame> {
        (0..count).map(|_| http_get_frame()).collect()
    }

    struct Fixture {
        session: SniffingSession,
        capture: Arc<ReplayCapture>,
        events: SessionEvents,
        dir: TempDir,
    }

    async fn fixture(capture: ReplayCapture) -> Fixture {
        let capture = Arc::new(capture);
        let (notifier, events) = ChannelNotifier::new();
        let session = SniffingSession::with_capacity(
            Arc::clone(&capture) as Arc<dyn CaptureBackend>,
            Arc::new(notifier),
            16,
        );
        let dir = TempDir::new().unwrap();
        Fixture {
            session,
            capture,
            events,
            dir,
        }
    }

    async fn ready(capture: ReplayCapture) -> Fixture {
        let f = fixture(capture).await;
        f.session.select_interface("eth0").await.unwrap();
        f.session
            .configure_report(f.dir.path().join("report.csv"), Duration::from_secs(30))
            .await
            .unwrap();
        f
    }

    async fn wait_until<F: Fn() -> bool>(what: &str, cond: F) {
        for _ in 0..400 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {}", what);
    }

    #[tokio::test]
    async fn test_first_packet_of_fresh_session_is_decoded_with_id_one() {
        let f = ready(ReplayCapture::new().with_interface("eth0", frames(1))).await;
        let started = f.session.start().await.unwrap();
        assert_eq!(
            started,
            Transition::Applied {
                state: SessionState::Active
            }
        );

        let store = f.session.store();
        wait_until("first packet", || store.size() == 1).await;
        let packet = store.get(1).unwrap();
        assert_eq!(packet.id, 1);
        assert_eq!(
            packet.protocols(),
            vec![Protocol::Ethernet, Protocol::Ipv4, Protocol::Tcp, Protocol::Http]
        );
        f.session.stop().await;
    }

    #[tokio::test]
    async fn test_start_is_guarded() {
        let f = fixture(ReplayCapture::new().with_interface("eth0", Vec::new())).await;

        let t = f.session.start().await.unwrap();
        assert_eq!(t, Transition::ignored(SessionState::Inactive, "no interface selected"));

        f.session.select_interface("eth0").await.unwrap();
        let t = f.session.start().await.unwrap();
        assert!(!t.applied());
        assert_eq!(f.capture.open_count("eth0"), 0);
    }

    #[tokio::test]
    async fn test_select_unknown_interface_fails() {
        let f = fixture(ReplayCapture::new().with_interface("eth0", Vec::new())).await;
        assert!(matches!(
            f.session.select_interface("wlan7").await,
            Err(CaptureError::NoSuchInterface(_))
        ));
        assert_eq!(f.session.status().await.selected_interface, None);
    }

    #[tokio::test]
    async fn test_open_failure_leaves_state_and_store_unchanged() {
        let f = ready(ReplayCapture::new().with_interface("eth0", frames(2))).await;
        let store = f.session.store();
        f.session.start().await.unwrap();
        wait_until("two packets", || store.size() == 2).await;
        f.session.stop().await;

        f.capture.set_denied("eth0", true);
        assert!(matches!(
            f.session.start().await,
            Err(CaptureError::PermissionDenied(_))
        ));
        assert_eq!(f.session.state().await, SessionState::Inactive);
        assert_eq!(store.size(), 2);
    }

    #[tokio::test]
    async fn test_resume_failure_stays_paused() {
        let f = ready(ReplayCapture::new().with_interface("eth0", Vec::new())).await;
        f.session.start().await.unwrap();
        f.session.pause().await;

        f.capture.set_denied("eth0", true);
        assert!(f.session.resume().await.is_err());
        assert_eq!(f.session.state().await, SessionState::Paused);

        f.capture.set_denied("eth0", false);
        assert!(f.session.resume().await.unwrap().applied());
        f.session.stop().await;
    }

    #[tokio::test]
    async fn test_invalid_transitions_are_noops() {
        let f = ready(ReplayCapture::new().with_interface("eth0", Vec::new())).await;

        assert_eq!(f.session.stop().await.state(), SessionState::Inactive);
        assert!(!f.session.pause().await.applied());
        assert!(!f.session.resume().await.unwrap().applied());

        f.session.start().await.unwrap();
        assert!(!f.session.start().await.unwrap().applied());
        assert!(!f.session.resume().await.unwrap().applied());
        assert_eq!(f.capture.open_count("eth0"), 1);

        f.session.pause().await;
        assert!(!f.session.pause().await.applied());
        assert!(!f.session.start().await.unwrap().applied());
        assert_eq!(f.session.state().await, SessionState::Paused);

        f.session.stop().await;
        assert_eq!(f.session.state().await, SessionState::Inactive);
    }

    #[tokio::test]
    async fn test_pause_releases_device_and_resume_reopens_it() {
        let f = ready(ReplayCapture::new().with_interface("eth0", frames(3))).await;
        let store = f.session.store();

        f.session.start().await.unwrap();
        wait_until("first batch", || store.size() == 3).await;

        assert!(f.session.pause().await.applied());
        assert_eq!(f.capture.open_handles("eth0"), 0);

        // Traffic while paused is not captured until resume
        f.capture.push_frames("eth0", frames(2));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.size(), 3);

        assert!(f.session.resume().await.unwrap().applied());
        assert_eq!(f.capture.open_count("eth0"), 2);
        wait_until("second batch", || store.size() == 5).await;

        let ids: Vec<u64> = store.snapshot().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        f.session.stop().await;
        assert_eq!(f.capture.open_handles("eth0"), 0);
    }

    /// Next `ReportWritten`, polled without sleeping on the paused clock.
    /// Capture threads hold back auto-advance, so virtual time stands still
    /// while this waits.
    async fn next_report_written(events: &mut SessionEvents) -> Instant {
        for _ in 0..2000 {
            match events.try_recv() {
                Ok(SessionEvent::ReportWritten { .. }) => return Instant::now(),
                Ok(_) => continue,
                Err(_) => {
                    tokio::task::yield_now().await;
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
        }
        panic!("no report written");
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_fires_report_after_remaining_interval() {
        let mut f = ready(ReplayCapture::new().with_interface("eth0", Vec::new())).await;
        let t0 = Instant::now();

        f.session.start().await.unwrap();
        tokio::time::advance(Duration::from_secs(12)).await;
        f.session.pause().await;
        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(f.session.resume().await.unwrap().applied());

        // 12 s of the 30 s window were used before the pause
        tokio::time::advance(Duration::from_secs(17)).await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
            std::thread::sleep(Duration::from_millis(1));
        }
        while let Ok(event) = f.events.try_recv() {
            assert!(
                !matches!(event, SessionEvent::ReportWritten { .. }),
                "report written before the remaining interval elapsed"
            );
        }

        tokio::time::advance(Duration::from_secs(1)).await;
        let first = next_report_written(&mut f.events).await;
        assert_eq!(first - t0, Duration::from_secs(38));

        tokio::time::advance(Duration::from_secs(30)).await;
        let second = next_report_written(&mut f.events).await;
        assert_eq!(second - t0, Duration::from_secs(68));

        f.session.stop().await;
    }

    #[tokio::test]
    async fn test_new_start_clears_store_and_restarts_ids() {
        let f = ready(ReplayCapture::new().with_interface("eth0", frames(4))).await;
        let store = f.session.store();

        f.session.start().await.unwrap();
        wait_until("first run", || store.size() == 4).await;
        f.session.stop().await;
        // Stop keeps the packets for a final report
        assert_eq!(store.size(), 4);

        f.capture.push_frames("eth0", frames(1));
        f.session.start().await.unwrap();
        wait_until("second run", || store.get(1).is_some()).await;
        assert_eq!(store.size(), 1);
        f.session.stop().await;
    }

    #[tokio::test]
    async fn test_backpressure_keeps_every_frame() {
        let capture = ReplayCapture::new().with_interface("eth0", frames(250));
        let capture = Arc::new(capture);
        let (notifier, _events) = ChannelNotifier::new();
        let session = SniffingSession::with_capacity(
            Arc::clone(&capture) as Arc<dyn CaptureBackend>,
            Arc::new(notifier),
            1,
        );
        let dir = TempDir::new().unwrap();
        session.select_interface("eth0").await.unwrap();
        session
            .configure_report(dir.path().join("r.csv"), Duration::from_secs(30))
            .await
            .unwrap();

        session.start().await.unwrap();
        let store = session.store();
        wait_until("all frames", || store.size() == 250).await;
        session.stop().await;

        assert_eq!(capture.pending("eth0"), 0);
        let http = store.query(0, 1000, &FilterSpec::all().with_protocol(Protocol::Http));
        assert_eq!(http.len(), 250);
    }

    #[tokio::test]
    async fn test_device_failure_ends_run() {
        let capture = ReplayCapture::new()
            .with_interface("eth0", frames(2))
            .with_failure_when_drained("eth0");
        let mut f = ready(capture).await;

        f.session.start().await.unwrap();
        let mut saw_failure = false;
        while let Some(event) = f.events.recv().await {
            match event {
                SessionEvent::CaptureFailed { interface, .. } => {
                    assert_eq!(interface, "eth0");
                    saw_failure = true;
                }
                SessionEvent::StateChanged {
                    state: SessionState::Inactive,
                } => break,
                _ => {}
            }
        }

        assert!(saw_failure);
        let status = f.session.status().await;
        assert_eq!(status.state, SessionState::Inactive);
        assert_eq!(status.packets, 2);
        assert_eq!(f.capture.open_handles("eth0"), 0);
        // A later start is a fresh run
        assert!(f.session.start().await.is_ok());
        f.session.stop().await;
    }

    #[tokio::test]
    async fn test_events_follow_transitions() {
        let mut f = ready(ReplayCapture::new().with_interface("eth0", frames(1))).await;
        f.session.start().await.unwrap();

        let mut packet_ids = Vec::new();
        while packet_ids.is_empty() {
            match f.events.recv().await {
                Some(SessionEvent::PacketReceived { id }) => packet_ids.push(id),
                Some(_) => {}
                None => break,
            }
        }
        assert_eq!(packet_ids, vec![1]);

        f.session.pause().await;
        f.session.stop().await;

        let mut states = Vec::new();
        while let Ok(event) = f.events.try_recv() {
            if let SessionEvent::StateChanged { state } = event {
                states.push(state);
            }
        }
        assert_eq!(states, vec![SessionState::Paused, SessionState::Inactive]);
    }

    #[tokio::test]
    async fn test_status_reports_run_details() {
        let f = ready(ReplayCapture::new().with_interface("eth0", Vec::new())).await;
        let status = f.session.status().await;
        assert_eq!(status.state, SessionState::Inactive);
        assert_eq!(status.selected_interface.as_deref(), Some("eth0"));
        assert_eq!(status.capture_interface, None);
        assert_eq!(status.elapsed, Duration::ZERO);

        f.session.start().await.unwrap();
        let status = f.session.status().await;
        assert_eq!(status.capture_interface.as_deref(), Some("eth0"));
        assert_eq!(
            status.report_destination,
            Some(f.dir.path().join("report.csv"))
        );
        f.session.stop().await;
    }

    #[tokio::test]
    async fn test_configure_report_rejects_zero_interval() {
        let f = fixture(ReplayCapture::new()).await;
        assert!(matches!(
            f.session.configure_report("r.csv", Duration::ZERO).await,
            Err(ReportError::InvalidInterval)
        ));
    }
}
