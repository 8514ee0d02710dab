//! Watch controller: at most one streaming subscription per handle.
//!
//! ```text
//! Idle ──start──▶ Starting ──connected──▶ Streaming ──stop──▶ Stopping ──joined──▶ Idle
//!                    │                        │
//!                    └──error──▶ Idle         └──error / cancel / auth_revoked──▶ Failed ──▶ Idle
//! ```
//!
//! The state lock is only held to check or flip state, never across I/O.

use crate::client::timeout::TimeoutCoordinator;
use crate::error::{FireError, Result};
use crate::protocol::EventStream;
use crate::types::{Event, Mirror, StreamEvent};
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Sending half of a watch channel.
pub type WatchSender = async_channel::Sender<Result<Event>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchPhase {
    Idle,
    Starting,
    Streaming,
    Stopping,
    /// A terminal error was reported; the pump is shutting down.
    Failed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Keep a local copy of the watched value and attach it to every event.
    pub mirror: bool,
}

impl WatchOptions {
    pub fn mirrored() -> Self {
        WatchOptions { mirror: true }
    }
}

struct WatchState {
    phase: WatchPhase,
    /// Bumped on every start so a stale pump cannot touch a newer watch.
    generation: u64,
    cancel: Option<CancellationToken>,
    worker: Option<JoinHandle<()>>,
    /// Join of the pump being stopped; every concurrent stopper awaits it.
    stopping: Option<Shared<BoxFuture<'static, ()>>>,
}

impl std::fmt::Debug for WatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchState")
            .field("phase", &self.phase)
            .field("generation", &self.generation)
            .field("worker", &self.worker.is_some())
            .finish()
    }
}

impl WatchState {
    fn reset(&mut self) {
        self.phase = WatchPhase::Idle;
        self.cancel = None;
        self.worker = None;
        self.stopping = None;
    }
}

#[derive(Debug)]
pub(crate) struct WatchController {
    state: Arc<Mutex<WatchState>>,
}

impl WatchController {
    pub(crate) fn new() -> Self {
        WatchController {
            state: Arc::new(Mutex::new(WatchState {
                phase: WatchPhase::Idle,
                generation: 0,
                cancel: None,
                worker: None,
                stopping: None,
            })),
        }
    }

    pub(crate) fn phase(&self) -> WatchPhase {
        self.state.lock().phase
    }

    /// Open the stream and spawn the pump. Returns once the server answered
    /// with headers, or with the error that prevented it.
    pub(crate) async fn start(
        &self,
        coordinator: &TimeoutCoordinator,
        request: reqwest::Request,
        sender: WatchSender,
        options: WatchOptions,
    ) -> Result<()> {
        let (generation, cancel) = {
            let mut state = self.state.lock();
            if state.phase != WatchPhase::Idle {
                return Err(FireError::AlreadyWatching);
            }
            state.phase = WatchPhase::Starting;
            state.generation += 1;
            let token = CancellationToken::new();
            state.cancel = Some(token.clone());
            (state.generation, token)
        };

        let url = request.url().to_string();
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = coordinator.send(request) => Some(result),
        };

        let response = match opened {
            Some(Ok(response)) => response,
            Some(Err(e)) => {
                tracing::warn!("[watch] failed to open stream for {}: {}", url, e);
                self.settle(generation);
                return Err(e);
            }
            None => {
                self.settle(generation);
                return Err(FireError::Stopped);
            }
        };

        let mut state = self.state.lock();
        if state.generation != generation || state.phase != WatchPhase::Starting {
            return Err(FireError::Stopped);
        }
        tracing::info!("[watch] streaming {}", url);
        state.phase = WatchPhase::Streaming;
        state.worker = Some(tokio::spawn(pump(
            EventStream::new(response),
            sender,
            cancel,
            options,
            self.state.clone(),
            generation,
        )));
        Ok(())
    }

    /// Cancel the active watch and wait for its pump to exit. Safe to call
    /// any number of times, also concurrently; every caller returns only
    /// once the watch is idle.
    pub(crate) async fn stop(&self) {
        let (generation, joined) = {
            let mut state = self.state.lock();
            match state.phase {
                WatchPhase::Idle => return,
                WatchPhase::Stopping => (state.generation, state.stopping.clone()),
                WatchPhase::Starting | WatchPhase::Streaming | WatchPhase::Failed => {
                    state.phase = WatchPhase::Stopping;
                    if let Some(cancel) = state.cancel.take() {
                        cancel.cancel();
                    }
                    let joined = join_worker(state.worker.take());
                    state.stopping = Some(joined.clone());
                    (state.generation, Some(joined))
                }
            }
        };

        if let Some(joined) = joined {
            joined.await;
        }

        let mut state = self.state.lock();
        if state.generation == generation && state.phase == WatchPhase::Stopping {
            state.reset();
            tracing::info!("[watch] stopped");
        }
    }

    fn settle(&self, generation: u64) {
        settle(&self.state, generation);
    }
}

impl Drop for WatchController {
    fn drop(&mut self) {
        if let Some(cancel) = self.state.lock().cancel.take() {
            cancel.cancel();
        }
    }
}

fn join_worker(worker: Option<JoinHandle<()>>) -> Shared<BoxFuture<'static, ()>> {
    async move {
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::error!("[watch] pump task ended abnormally: {}", e);
            }
        }
    }
    .boxed()
    .shared()
}

/// Return to `Idle` unless a stop or a newer watch owns the state.
fn settle(state: &Mutex<WatchState>, generation: u64) {
    let mut state = state.lock();
    if state.generation != generation {
        return;
    }
    match state.phase {
        WatchPhase::Starting | WatchPhase::Streaming | WatchPhase::Failed => state.reset(),
        WatchPhase::Idle | WatchPhase::Stopping => {}
    }
}

fn mark_failed(state: &Mutex<WatchState>, generation: u64) {
    let mut state = state.lock();
    if state.generation == generation && state.phase == WatchPhase::Streaming {
        state.phase = WatchPhase::Failed;
    }
}

enum PumpExit {
    Stopped,
    Closed,
    ReceiverGone,
    Failed(FireError),
}

async fn pump(
    mut events: EventStream,
    sender: WatchSender,
    cancel: CancellationToken,
    options: WatchOptions,
    state: Arc<Mutex<WatchState>>,
    generation: u64,
) {
    let mut mirror = options.mirror.then(Mirror::new);

    let exit = loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break PumpExit::Stopped,
            next = events.next() => next,
        };

        let mut event = match next {
            None => break PumpExit::Closed,
            Some(Err(e)) => break PumpExit::Failed(e),
            Some(Ok(StreamEvent::KeepAlive)) => {
                tracing::trace!("[watch] keep-alive");
                continue;
            }
            Some(Ok(StreamEvent::Put(change))) => Event::put(change),
            Some(Ok(StreamEvent::Patch(change))) => Event::patch(change),
            Some(Ok(StreamEvent::Cancel(reason))) => {
                break PumpExit::Failed(FireError::StreamCancelled(reason))
            }
            Some(Ok(StreamEvent::AuthRevoked(reason))) => {
                break PumpExit::Failed(FireError::AuthRevoked(reason))
            }
        };

        if let Some(mirror) = mirror.as_mut() {
            mirror.apply(&event);
            event.snapshot = Some(mirror.value().clone());
        }

        let delivered = tokio::select! {
            biased;
            _ = cancel.cancelled() => break PumpExit::Stopped,
            sent = sender.send(Ok(event)) => sent.is_ok(),
        };
        if !delivered {
            break PumpExit::ReceiverGone;
        }
    };

    match exit {
        PumpExit::Stopped => tracing::debug!("[watch] pump cancelled"),
        PumpExit::Closed => tracing::info!("[watch] server closed the stream"),
        PumpExit::ReceiverGone => tracing::debug!("[watch] receiver dropped, ending watch"),
        PumpExit::Failed(e) => {
            tracing::warn!("[watch] stream ended with error: {}", e);
            mark_failed(&state, generation);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                _ = sender.send(Err(e)) => {}
            }
        }
    }

    drop(events);
    settle(&state, generation);
    drop(sender);
}
