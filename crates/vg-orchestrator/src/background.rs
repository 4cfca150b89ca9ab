//! Periodic background scanning
//!
//! The scanner is an actor: it owns its security provider, receives
//! [`LoopControl`] messages and posts one [`LoopResult`] per scan. It runs on
//! a dedicated OS thread with its own runtime so a hanging probe can never
//! stall command handling, and it shares nothing with the orchestrator.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use vg_core::time::current_time_millis;
use vg_core::traits::SecurityProvider;
use vg_core::{ProviderError, SignatureSet, SignatureStore};
use vg_protocol::{names, Detection, SystemReport};

use crate::bus::EventBus;

/// Mailbox message for the scanner
#[derive(Debug, Clone)]
pub enum LoopControl {
    /// Scan now, then every `interval`, with the given signatures
    Start {
        interval: Duration,
        signatures: Arc<SignatureSet>,
    },
    /// Stop scanning; an in-flight scan finishes and its result is stale
    Stop,
}

/// Output of one successful background scan
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundReport {
    pub system: SystemReport,
    pub threats: Vec<Detection>,
    pub scanned_at: u64,
}

/// One scan result, tagged with the run that produced it
#[derive(Debug, Clone)]
pub struct LoopResult {
    pub generation: u64,
    pub payload: Result<BackgroundReport, String>,
}

impl LoopResult {
    pub fn is_ok(&self) -> bool {
        self.payload.is_ok()
    }
}

struct Envelope {
    generation: u64,
    control: LoopControl,
}

struct ActiveRun {
    generation: u64,
    ticker: Interval,
    signatures: Arc<SignatureSet>,
}

enum Wake {
    Control(Option<Envelope>),
    Tick,
}

/// Build a scanner and the two halves used to drive it
pub fn channel(
    security: Arc<dyn SecurityProvider>,
    scan_timeout: Duration,
) -> (BackgroundScanner, BackgroundHandle, BackgroundResults) {
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let (result_tx, result_rx) = mpsc::unbounded_channel();
    let active = Arc::new(AtomicU64::new(0));

    let scanner = BackgroundScanner {
        security,
        scan_timeout,
        control_rx,
        result_tx,
    };
    let handle = BackgroundHandle {
        control_tx,
        active: Arc::clone(&active),
        next_generation: Arc::new(AtomicU64::new(1)),
    };
    let results = BackgroundResults { result_rx, active };
    (scanner, handle, results)
}

/// The scan actor
pub struct BackgroundScanner {
    security: Arc<dyn SecurityProvider>,
    scan_timeout: Duration,
    control_rx: mpsc::UnboundedReceiver<Envelope>,
    result_tx: mpsc::UnboundedSender<LoopResult>,
}

impl BackgroundScanner {
    /// Run the actor on the current runtime until every handle is dropped
    pub async fn run(mut self) {
        let mut active: Option<ActiveRun> = None;

        loop {
            let wake = tokio::select! {
                control = self.control_rx.recv() => Wake::Control(control),
                _ = next_tick(&mut active) => Wake::Tick,
            };

            match wake {
                Wake::Control(Some(Envelope {
                    generation,
                    control: LoopControl::Start {
                        interval,
                        signatures,
                    },
                })) => {
                    tracing::info!(
                        "Background scanning every {:?} ({} signatures, run {})",
                        interval,
                        signatures.len(),
                        generation
                    );
                    let mut ticker = tokio::time::interval(interval);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    active = Some(ActiveRun {
                        generation,
                        ticker,
                        signatures,
                    });
                }
                Wake::Control(Some(Envelope {
                    control: LoopControl::Stop,
                    ..
                })) => {
                    if active.take().is_some() {
                        tracing::info!("Background scanning stopped");
                    }
                }
                Wake::Control(None) => break,
                Wake::Tick => {
                    let Some(run) = active.as_ref() else {
                        continue;
                    };
                    let result = self.scan_once(run).await;
                    if self.result_tx.send(result).is_err() {
                        break;
                    }
                }
            }
        }

        tracing::debug!("Background scanner exited");
    }

    /// Run the actor on a dedicated thread with a single-threaded runtime
    pub fn spawn_thread(self) -> std::io::Result<std::thread::JoinHandle<()>> {
        std::thread::Builder::new()
            .name("vigil-background".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        tracing::error!("Failed to build background runtime: {}", e);
                        return;
                    }
                };
                runtime.block_on(self.run());
            })
    }

    async fn scan_once(&self, run: &ActiveRun) -> LoopResult {
        let scan = async {
            let (system, threats) = tokio::try_join!(
                self.security.system_snapshot(),
                self.security.scan_threats(&run.signatures),
            )?;
            Ok::<_, ProviderError>(BackgroundReport {
                system,
                threats,
                scanned_at: current_time_millis(),
            })
        };

        let payload = match tokio::time::timeout(self.scan_timeout, scan).await {
            Ok(Ok(report)) => {
                tracing::debug!(
                    "Background scan found {} threats across {} processes",
                    report.threats.len(),
                    report.system.process_count
                );
                Ok(report)
            }
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(ProviderError::Timeout {
                provider: "security",
                timeout: self.scan_timeout,
            }
            .to_string()),
        };

        LoopResult {
            generation: run.generation,
            payload,
        }
    }
}

async fn next_tick(active: &mut Option<ActiveRun>) {
    match active.as_mut() {
        Some(run) => {
            run.ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Sends control messages to the scanner
#[derive(Clone)]
pub struct BackgroundHandle {
    control_tx: mpsc::UnboundedSender<Envelope>,
    active: Arc<AtomicU64>,
    next_generation: Arc<AtomicU64>,
}

impl BackgroundHandle {
    /// Start (or restart with new settings); returns the run's generation
    pub fn start(&self, interval: Duration, signatures: Arc<SignatureSet>) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        self.active.store(generation, Ordering::SeqCst);
        self.send(Envelope {
            generation,
            control: LoopControl::Start {
                interval,
                signatures,
            },
        });
        generation
    }

    /// Stop scanning; results still in flight will be discarded
    pub fn stop(&self) {
        self.active.store(0, Ordering::SeqCst);
        self.send(Envelope {
            generation: 0,
            control: LoopControl::Stop,
        });
    }

    /// Whether a run is active
    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst) != 0
    }

    fn send(&self, envelope: Envelope) {
        if self.control_tx.send(envelope).is_err() {
            tracing::warn!("Background scanner is no longer running");
        }
    }
}

/// Receives results from the scanner, dropping stale ones
pub struct BackgroundResults {
    result_rx: mpsc::UnboundedReceiver<LoopResult>,
    active: Arc<AtomicU64>,
}

impl BackgroundResults {
    /// Next result from the current run; `None` once the scanner exits
    pub async fn recv(&mut self) -> Option<LoopResult> {
        while let Some(result) = self.result_rx.recv().await {
            if self.is_current(&result) {
                return Some(result);
            }
        }
        None
    }

    /// Non-blocking variant of [`recv`](Self::recv)
    pub fn try_recv(&mut self) -> Option<LoopResult> {
        while let Ok(result) = self.result_rx.try_recv() {
            if self.is_current(&result) {
                return Some(result);
            }
        }
        None
    }

    fn is_current(&self, result: &LoopResult) -> bool {
        let current = self.active.load(Ordering::SeqCst);
        if current != 0 && result.generation == current {
            return true;
        }
        tracing::debug!(
            "Discarding background result from run {} (current {})",
            result.generation,
            current
        );
        false
    }
}

/// Drive the scanner from the daemon until shutdown
///
/// Starts scanning with the current signatures, restarts whenever the
/// signature set changes and publishes `DETECTED_UNWANTED_APPS` for every
/// result that found threats.
pub async fn supervise(
    handle: BackgroundHandle,
    mut results: BackgroundResults,
    signatures: Arc<SignatureStore>,
    bus: Arc<EventBus>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut revisions = signatures.subscribe();
    handle.start(interval, signatures.snapshot());

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,

            changed = revisions.changed() => {
                if changed.is_err() {
                    break;
                }
                tracing::info!("Signatures changed, restarting background scans");
                handle.start(interval, signatures.snapshot());
            }

            result = results.recv() => match result {
                Some(result) => publish_result(&bus, result),
                None => {
                    tracing::warn!("Background scanner exited unexpectedly");
                    break;
                }
            },
        }
    }

    handle.stop();
}

fn publish_result(bus: &EventBus, result: LoopResult) {
    match result.payload {
        Ok(report) if report.threats.is_empty() => {
            tracing::debug!("Background scan clean");
        }
        Ok(report) => {
            tracing::info!("Background scan found {} threats", report.threats.len());
            bus.publish_event(
                names::DETECTED_UNWANTED_APPS,
                Some(json!({
                    "source": "background_scan",
                    "detections": report.threats,
                    "systemReport": report.system,
                    "scannedAt": report.scanned_at,
                })),
            );
        }
        Err(e) => tracing::warn!("Background scan failed: {}", e),
    }
}
