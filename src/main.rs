//! Wirefish - live packet capture and decoding.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

use wirefish::capture::{CaptureBackend, PnetCapture, RawFrame};
use wirefish::notifier::{EventNotifier, LogNotifier};
use wirefish::{ProtocolDecoder, SnifferConfig, SnifferService, SniffingSession, Transition};

#[derive(Parser)]
#[command(name = "wirefish")]
#[command(about = "Live packet capture and protocol decoder")]
struct Cli {
    /// Config file (defaults to $WIREFISH_CONFIG or /etc/wirefish.conf)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List capture interfaces
    Interfaces,
    /// Capture on an interface and write periodic CSV reports
    Capture {
        /// Network interface to capture on (e.g., eth0)
        #[arg(short, long)]
        interface: Option<String>,
        /// CSV report destination
        #[arg(short, long)]
        report: Option<PathBuf>,
        /// Seconds between reports
        #[arg(long)]
        interval: Option<u64>,
        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(short, long)]
        duration: Option<u64>,
        /// Also write per-conversation totals to this CSV on exit
        #[arg(long)]
        exchanges: Option<PathBuf>,
    },
    /// Decode one Ethernet frame given as hex
    Decode {
        /// Frame bytes, e.g. "ff ff ff ff ff ff 02 00 ..." or "ffffffffffff0200..."
        hex: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SnifferConfig::load_from(path),
        None => SnifferConfig::load(),
    }
    .context("Failed to load configuration")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.tracing_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Interfaces => {
            for line in PnetCapture::describe_interfaces() {
                println!("{}", line);
            }
            Ok(())
        }
        Commands::Decode { hex } => decode_hex(&hex),
        Commands::Capture {
            interface,
            report,
            interval,
            duration,
            exchanges,
        } => {
            let interface = interface
                .or_else(|| config.interface.clone())
                .ok_or_else(|| anyhow!("No interface given; use --interface or WIREFISH_INTERFACE"))?;
            let report = report
                .or_else(|| config.report_path.clone())
                .ok_or_else(|| anyhow!("No report path given; use --report or WIREFISH_REPORT_PATH"))?;
            let interval = interval
                .map(Duration::from_secs)
                .unwrap_or(config.report_interval);

            let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
            runtime
                .block_on(run_capture(
                    &config,
                    &interface,
                    &report,
                    interval,
                    duration.map(Duration::from_secs),
                    exchanges.as_deref(),
                ))
                .context("Failed to run capture")
        }
    }
}

async fn run_capture(
    config: &SnifferConfig,
    interface: &str,
    report: &Path,
    interval: Duration,
    duration: Option<Duration>,
    exchanges: Option<&Path>,
) -> Result<()> {
    let backend: Arc<dyn CaptureBackend> = Arc::new(PnetCapture::new(config.capture_settings()));
    let notifier: Arc<dyn EventNotifier> = Arc::new(LogNotifier::new());
    let service = SnifferService::new(SniffingSession::with_capacity(
        backend,
        notifier,
        config.channel_capacity,
    ));

    service
        .select_interface(interface)
        .await
        .with_context(|| format!("Cannot capture on '{}'", interface))?;
    service.configure_report(report, interval).await?;

    if let Transition::Ignored { reason, .. } = service.start_sniffing(false).await? {
        bail!("Capture did not start: {}", reason);
    }
    tracing::info!(
        "Capturing on {}, reporting to {} every {:?}",
        interface,
        report.display(),
        interval
    );

    let shutdown = Arc::new(Notify::new());
    let on_signal = Arc::clone(&shutdown);
    ctrlc::set_handler(move || on_signal.notify_one())
        .context("Failed to install Ctrl-C handler")?;

    match duration {
        Some(limit) => {
            tokio::select! {
                _ = shutdown.notified() => tracing::info!("Interrupted, stopping capture"),
                _ = tokio::time::sleep(limit) => tracing::info!("Capture time elapsed"),
            }
        }
        None => shutdown.notified().await,
    }

    service.stop_sniffing(true).await?;

    // Final snapshot so the last partial interval is not lost
    let rows = service.generate_report(report, !report.exists())?;
    println!("Captured {} packets, report written to {}", rows, report.display());

    if let Some(path) = exchanges {
        let count = service.generate_exchange_report(path)?;
        println!("{} exchanges written to {}", count, path.display());
    }
    Ok(())
}

fn decode_hex(hex: &str) -> Result<()> {
    let data = parse_hex(hex)?;
    let packet = ProtocolDecoder::new().decode(&RawFrame::ethernet(data));

    println!("{} bytes", packet.length);
    for layer in packet.layers() {
        println!("{}: {}", layer.protocol, layer.info);
        for field in &layer.fields {
            println!("    {}: {}", field.label, field.value);
        }
    }
    if !packet.payload.is_empty() {
        println!("payload: {} bytes", packet.payload.len());
    }
    Ok(())
}

/// Accepts hex digits with optional whitespace, `:` or `-` separators.
fn parse_hex(input: &str) -> Result<Vec<u8>> {
    let digits: Vec<u8> = input
        .bytes()
        .filter(|b| !b.is_ascii_whitespace() && *b != b':' && *b != b'-')
        .collect();
    if digits.len() % 2 != 0 {
        bail!("Odd number of hex digits");
    }

    digits
        .chunks(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair).context("Invalid hex input")?;
            u8::from_str_radix(text, 16).with_context(|| format!("Invalid hex byte '{}'", text))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_accepts_separators() {
        assert_eq!(parse_hex("ff:00 1a-2B").unwrap(), vec![0xff, 0x00, 0x1a, 0x2b]);
        assert_eq!(parse_hex("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_parse_hex_rejects_bad_input() {
        assert!(parse_hex("abc").is_err());
        assert!(parse_hex("zz").is_err());
    }

    #[test]
    fn test_cli_parses_capture_flags() {
        let cli = Cli::try_parse_from([
            "wirefish", "capture", "-i", "eth0", "-r", "out.csv", "--interval", "5",
            "--exchanges", "pairs.csv",
        ])
        .unwrap();
        match cli.command {
            Commands::Capture {
                interface,
                report,
                interval,
                duration,
                exchanges,
            } => {
                assert_eq!(interface.as_deref(), Some("eth0"));
                assert_eq!(report, Some(PathBuf::from("out.csv")));
                assert_eq!(interval, Some(5));
                assert!(duration.is_none());
                assert_eq!(exchanges, Some(PathBuf::from("pairs.csv")));
            }
            _ => panic!("expected capture"),
        }
    }
}
