//! Heartbeat sender - keeps one service instance registered
//!
//! Sends an immediate registration, then re-registers on every tick of a
//! fixed-period timer. The first transport failure is terminal: it is logged
//! and the loop stops without retrying. Callers that need resilience restart
//! the sender themselves.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::RegistryError;
use crate::registry::{encode_header, DEFAULT_TIMEOUT, SERVERS_HEADER};

/// Interval used when none is configured: one minute inside the default timeout
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(DEFAULT_TIMEOUT.as_secs() - 60);

/// Per-request deadline applied by the default HTTP client
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle of a heartbeat sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatState {
    /// Created, nothing sent yet
    Idle,
    /// A registration request is in flight
    Sending { initial: bool },
    /// Sleeping until the next tick
    Waiting,
    /// Terminal
    Stopped(StopReason),
}

impl HeartbeatState {
    pub fn is_stopped(&self) -> bool {
        matches!(self, HeartbeatState::Stopped(_))
    }
}

/// Why a heartbeat sender stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// A registration request failed at the transport level
    Failed(String),
    /// [`HeartbeatHandle::stop`] was called
    Cancelled,
}

/// Send a single registration for `address` to `registry_url`.
///
/// Any HTTP response counts as delivered; only transport errors fail.
pub async fn send_heartbeat(
    client: &reqwest::Client,
    registry_url: &str,
    address: &str,
) -> Result<(), RegistryError> {
    debug!("{} send heart beat to registry {}", address, registry_url);

    let value = encode_header(address)?;
    let response = client
        .post(registry_url)
        .header(SERVERS_HEADER, value)
        .send()
        .await
        .map_err(|e| {
            error!("rpc server: heart beat err: {}", e);
            RegistryError::from(e)
        })?;

    if !response.status().is_success() {
        warn!(
            status = %response.status(),
            registry = registry_url,
            "Registry answered heartbeat with non-success status"
        );
    }

    Ok(())
}

/// Configured heartbeat for one service address
#[derive(Debug, Clone)]
pub struct HeartbeatSender {
    client: reqwest::Client,
    registry_url: String,
    address: String,
    interval: Duration,
}

impl HeartbeatSender {
    /// Create a sender. A zero `interval` selects [`DEFAULT_INTERVAL`].
    pub fn new(
        registry_url: impl Into<String>,
        address: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            client: default_client(DEFAULT_REQUEST_TIMEOUT),
            registry_url: registry_url.into(),
            address: address.into(),
            interval: if interval.is_zero() {
                DEFAULT_INTERVAL
            } else {
                interval
            },
        }
    }

    /// Use a custom per-request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.client = default_client(timeout);
        self
    }

    /// Use a caller-provided HTTP client
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn registry_url(&self) -> &str {
        &self.registry_url
    }

    /// Send one registration request
    pub async fn send(&self) -> Result<(), RegistryError> {
        send_heartbeat(&self.client, &self.registry_url, &self.address).await
    }

    /// Spawn the heartbeat loop on the current tokio runtime.
    pub fn start(self) -> HeartbeatHandle {
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(HeartbeatState::Idle);
        let attempts = Arc::new(AtomicU64::new(0));

        info!(
            "Starting heartbeat for {} to {} (interval: {:?})",
            self.address, self.registry_url, self.interval
        );

        let task = tokio::spawn(self.run(state_tx, Arc::clone(&attempts), cancel.clone()));

        HeartbeatHandle {
            cancel,
            state: state_rx,
            attempts,
            task,
        }
    }

    async fn run(
        self,
        state: watch::Sender<HeartbeatState>,
        attempts: Arc<AtomicU64>,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut initial = true;
        loop {
            state.send_replace(HeartbeatState::Sending { initial });
            attempts.fetch_add(1, Ordering::SeqCst);

            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    self.stopped(&state, StopReason::Cancelled);
                    return;
                }
                result = self.send() => result,
            };

            if let Err(e) = result {
                self.stopped(&state, StopReason::Failed(e.to_string()));
                return;
            }

            initial = false;
            state.send_replace(HeartbeatState::Waiting);

            tokio::select! {
                _ = cancel.cancelled() => {
                    self.stopped(&state, StopReason::Cancelled);
                    return;
                }
                _ = ticker.tick() => {}
            }
        }
    }

    fn stopped(&self, state: &watch::Sender<HeartbeatState>, reason: StopReason) {
        match &reason {
            StopReason::Failed(e) => {
                warn!(address = %self.address, error = %e, "Heartbeat stopped after failure")
            }
            StopReason::Cancelled => info!(address = %self.address, "Heartbeat stopped"),
        }
        state.send_replace(HeartbeatState::Stopped(reason));
    }
}

/// Handle to a running heartbeat loop
#[derive(Debug)]
pub struct HeartbeatHandle {
    cancel: CancellationToken,
    state: watch::Receiver<HeartbeatState>,
    attempts: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl HeartbeatHandle {
    /// Ask the loop to stop; an in-flight request is abandoned.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Current state
    pub fn state(&self) -> HeartbeatState {
        self.state.borrow().clone()
    }

    /// Registration requests started so far
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait until the loop reaches `Stopped`, keeping the handle usable.
    pub async fn wait_stopped(&mut self) -> HeartbeatState {
        // Err means the task is gone; the last published state is final
        let _ = self.state.wait_for(HeartbeatState::is_stopped).await;
        let state = self.state.borrow().clone();
        state
    }

    /// Wait for the loop to end and return its final state.
    pub async fn join(self) -> HeartbeatState {
        if let Err(e) = self.task.await {
            error!(error = %e, "Heartbeat task panicked");
        }
        let state = self.state.borrow().clone();
        state
    }
}

// Builder only fails when the TLS backend cannot initialise
fn default_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}
