//! Request/response surface for a UI layer.
//!
//! Each operation maps one UI call onto the session. No call ordering is
//! assumed beyond what the session tolerates: control calls that do not
//! apply come back as ignored transitions.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::DecodedPacket;
use crate::error::CommandError;
use crate::report::{write_exchange_report, write_report};
use crate::session::{SessionStatus, SniffingSession, Transition};
use crate::store::{Exchange, FilterSpec};

#[derive(Clone)]
pub struct SnifferService {
    session: SniffingSession,
}

impl SnifferService {
    pub fn new(session: SniffingSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SniffingSession {
        &self.session
    }

    pub fn list_interfaces(&self) -> Result<Vec<String>, CommandError> {
        Ok(self.session.list_interfaces()?)
    }

    pub async fn select_interface(&self, name: &str) -> Result<(), CommandError> {
        Ok(self.session.select_interface(name).await?)
    }

    pub async fn configure_report(
        &self,
        destination: &Path,
        interval: Duration,
    ) -> Result<(), CommandError> {
        Ok(self.session.configure_report(destination, interval).await?)
    }

    /// `resume = false` starts a new run; `resume = true` continues a
    /// paused one.
    pub async fn start_sniffing(&self, resume: bool) -> Result<Transition, CommandError> {
        let transition = if resume {
            self.session.resume().await?
        } else {
            self.session.start().await?
        };
        Ok(transition)
    }

    /// `clear_after = true` ends the run; `clear_after = false` pauses it.
    pub async fn stop_sniffing(&self, clear_after: bool) -> Result<Transition, CommandError> {
        let transition = if clear_after {
            self.session.stop().await
        } else {
            self.session.pause().await
        };
        Ok(transition)
    }

    /// One page of the filtered packet list. Tags and field literals are
    /// validated before the store is read.
    pub fn get_packets<T, F>(
        &self,
        offset: usize,
        limit: usize,
        tags: &[T],
        fields: &[(F, F)],
    ) -> Result<Vec<Arc<DecodedPacket>>, CommandError>
    where
        T: AsRef<str>,
        F: AsRef<str>,
    {
        let filter = FilterSpec::parse(tags, fields)?;
        Ok(self.session.store().query(offset, limit, &filter))
    }

    /// Write the current store to `path` right away. Returns the number of
    /// packets written.
    pub fn generate_report(&self, path: &Path, is_first: bool) -> Result<usize, CommandError> {
        let notifier = self.session.notifier();
        let packets = self.session.store().snapshot();
        match write_report(&packets, path, is_first) {
            Ok(rows) => {
                notifier.report_written(path, rows);
                Ok(rows)
            }
            Err(e) => {
                notifier.report_failed(path, &e);
                Err(e.into())
            }
        }
    }

    /// Per source/destination totals of the current run.
    pub fn get_exchanges(&self) -> Vec<Exchange> {
        self.session.store().exchanges()
    }

    /// Write the exchange summary to `path`, replacing its content. Returns
    /// the number of exchanges written.
    pub fn generate_exchange_report(&self, path: &Path) -> Result<usize, CommandError> {
        let notifier = self.session.notifier();
        match write_exchange_report(&self.get_exchanges(), path) {
            Ok(rows) => {
                notifier.report_written(path, rows);
                Ok(rows)
            }
            Err(e) => {
                notifier.report_failed(path, &e);
                Err(e.into())
            }
        }
    }

    pub async fn status(&self) -> SessionStatus {
        self.session.status().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureBackend, RawFrame, ReplayCapture};
    use crate::error::{CaptureError, FilterError, ReportError};
    use crate::notifier::LogNotifier;
    use crate::session::SessionState;
    use tempfile::TempDir;

    fn arp_frame(sender: [u8; 4]) -> RawFrame {
        let mut frame = vec![0xff; 6];
        frame.extend([0x02, 0x00, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06]);
        frame.extend([0x00, 0x01, 0x08, 0x00, 6, 4, 0x00, 0x01]);
        frame.extend([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
        frame.extend(sender);
        frame.extend([0u8; 6]);
        frame.extend([10, 0, 0, 254]);
        RawFrame::ethernet(frame)
    }

    fn service(frames: Vec<RawFrame>) -> SnifferService {
        let capture = ReplayCapture::new()
            .with_interface("eth0", frames)
            .with_interface("lo", Vec::new());
        SnifferService::new(SniffingSession::new(
            Arc::new(capture) as Arc<dyn CaptureBackend>,
            Arc::new(LogNotifier::new()),
        ))
    }

    async fn wait_for_packets(service: &SnifferService, count: usize) {
        let store = service.session().store();
        for _ in 0..400 {
            if store.size() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("only {} packets arrived", store.size());
    }

    #[tokio::test]
    async fn test_capture_query_and_report_flow() {
        let frames = vec![
            arp_frame([10, 0, 0, 1]),
            arp_frame([10, 0, 0, 2]),
            arp_frame([10, 0, 0, 1]),
        ];
        let service = service(frames);
        let dir = TempDir::new().unwrap();
        let report = dir.path().join("capture.csv");

        assert_eq!(service.list_interfaces().unwrap(), vec!["eth0", "lo"]);
        service.select_interface("eth0").await.unwrap();
        service
            .configure_report(&report, Duration::from_secs(30))
            .await
            .unwrap();

        assert!(service.start_sniffing(false).await.unwrap().applied());
        wait_for_packets(&service, 3).await;

        let page = service
            .get_packets(0, 10, &["arp"], &[("src_ip", "10.0.0.1")])
            .unwrap();
        let ids: Vec<u64> = page.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 3]);

        // The page goes to the UI as-is
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json[1]["id"], 3);
        assert_eq!(json[1]["info"], "Who has 10.0.0.254? Tell 10.0.0.1");
        assert_eq!(json[1]["link_layer"]["layer"]["source"], "02:00:00:00:00:01");

        let paused = service.stop_sniffing(false).await.unwrap();
        assert_eq!(paused.state(), SessionState::Paused);
        let resumed = service.start_sniffing(true).await.unwrap();
        assert_eq!(resumed.state(), SessionState::Active);
        let stopped = service.stop_sniffing(true).await.unwrap();
        assert_eq!(stopped.state(), SessionState::Inactive);

        assert_eq!(service.generate_report(&report, true).unwrap(), 3);
        assert_eq!(service.generate_report(&report, false).unwrap(), 3);
        let content = std::fs::read_to_string(&report).unwrap();
        assert_eq!(content.lines().count(), 1 + 3 + 3);

        // Two senders towards 10.0.0.254
        let exchanges = service.get_exchanges();
        let totals: Vec<(&str, u64)> = exchanges
            .iter()
            .map(|e| (e.source.as_str(), e.packets))
            .collect();
        assert_eq!(totals, vec![("10.0.0.1", 2), ("10.0.0.2", 1)]);
        assert!(exchanges.iter().all(|e| e.destination == "10.0.0.254"));

        let summary = dir.path().join("exchanges.csv");
        assert_eq!(service.generate_exchange_report(&summary).unwrap(), 2);
        let content = std::fs::read_to_string(&summary).unwrap();
        assert_eq!(content.lines().count(), 1 + 2);
    }

    #[tokio::test]
    async fn test_new_run_starts_empty_exchange_table() {
        let service = service(vec![arp_frame([10, 0, 0, 1])]);
        let dir = TempDir::new().unwrap();
        service
            .configure_report(&dir.path().join("r.csv"), Duration::from_secs(30))
            .await
            .unwrap();
        service.select_interface("eth0").await.unwrap();
        assert!(service.start_sniffing(false).await.unwrap().applied());
        wait_for_packets(&service, 1).await;
        service.stop_sniffing(true).await.unwrap();
        assert_eq!(service.get_exchanges().len(), 1);

        service.select_interface("lo").await.unwrap();
        assert!(service.start_sniffing(false).await.unwrap().applied());
        assert!(service.get_exchanges().is_empty());
        service.stop_sniffing(true).await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_filter_is_rejected() {
        let service = service(Vec::new());
        let err = service
            .get_packets::<&str, &str>(0, 10, &[], &[("src_port", "http")])
            .unwrap_err();
        assert!(matches!(
            err,
            CommandError::Filter(FilterError::InvalidValue { .. })
        ));
        let err = service.get_packets::<&str, &str>(0, 10, &["smtp"], &[]).unwrap_err();
        assert!(matches!(
            err,
            CommandError::Filter(FilterError::UnknownProtocol(_))
        ));
    }

    #[tokio::test]
    async fn test_errors_surface_through_command_error() {
        let service = service(Vec::new());
        assert!(matches!(
            service.select_interface("wlan0").await,
            Err(CommandError::Capture(CaptureError::NoSuchInterface(_)))
        ));

        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope").join("r.csv");
        assert!(matches!(
            service.generate_report(&missing, true),
            Err(CommandError::Report(ReportError::Io { .. }))
        ));
    }

    #[tokio::test]
    async fn test_stop_without_run_is_acknowledged() {
        let service = service(Vec::new());
        let t = service.stop_sniffing(true).await.unwrap();
        assert!(!t.applied());
        assert_eq!(t.state(), SessionState::Inactive);
        assert_eq!(service.status().await.state, SessionState::Inactive);
    }
}
