//! The capture → decode → append pipeline of one Active stretch.
//!
//! Capture reads run on a blocking thread and hand frames to the writer
//! task over a bounded channel. A full channel blocks the capture read, so
//! a slow decoder delays capture instead of dropping frames.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::capture::{FrameSource, RawFrame};
use crate::decoder::ProtocolDecoder;
use crate::error::CaptureError;
use crate::notifier::EventNotifier;
use crate::store::PacketStore;

pub(crate) struct Pipeline {
    running: Arc<AtomicBool>,
    capture: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl Pipeline {
    /// Start reading from `source`. `on_fatal` is called once, from the
    /// capture thread, if the device fails; the source is closed by then.
    pub fn launch<F>(
        mut source: Box<dyn FrameSource>,
        decoder: ProtocolDecoder,
        store: Arc<PacketStore>,
        notifier: Arc<dyn EventNotifier>,
        capacity: usize,
        on_fatal: F,
    ) -> Self
    where
        F: FnOnce(CaptureError) + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let (tx, mut rx) = mpsc::channel::<RawFrame>(capacity.max(1));

        let capture_running = Arc::clone(&running);
        let capture = tokio::task::spawn_blocking(move || {
            let interface = source.interface_name().to_string();
            tracing::debug!("[{}] Capture loop started", interface);

            while capture_running.load(Ordering::Acquire) {
                match source.next_frame() {
                    Ok(Some(frame)) => {
                        // Blocks while the writer is behind
                        if tx.blocking_send(frame).is_err() {
                            break;
                        }
                    }
                    Ok(None) => continue,
                    Err(e) => {
                        capture_running.store(false, Ordering::Release);
                        source.close();
                        drop(tx);
                        on_fatal(e);
                        return;
                    }
                }
            }

            source.close();
            tracing::debug!("[{}] Capture loop stopped", interface);
        });

        let writer = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                let packet = decoder.decode(&frame);
                let id = store.append(packet);
                notifier.packet_received(id);
            }
        });

        Self {
            running,
            capture: Some(capture),
            writer: Some(writer),
        }
    }

    /// Stop capturing, release the device and wait until every frame
    /// already read has been stored.
    pub async fn halt(mut self) {
        self.running.store(false, Ordering::Release);

        if let Some(capture) = self.capture.take() {
            if let Err(e) = capture.await {
                tracing::error!("Capture thread panicked: {}", e);
            }
        }
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.await {
                tracing::error!("Packet writer failed: {}", e);
            }
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        // A pipeline dropped without halt still lets its thread exit
        self.running.store(false, Ordering::Release);
    }
}
