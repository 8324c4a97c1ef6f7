//! Fail-safe event delivery
//!
//! [`EventSender`] turns captured records into paired events and hands them to
//! the [`DeliveryClient`]. Nothing here ever returns an error to the caller:
//! delivery failures, panics and shutdown races are logged and dropped.
//!
//! Two modes, fixed at construction:
//!
//! - **async**: `start()` spawns one `agentlens-sender` thread that drives a
//!   current-thread tokio runtime over an unbounded FIFO channel. `send()` only
//!   enqueues.
//! - **sync**: `send()` delivers on the caller's thread. No thread is spawned.
//!
//! ```text
//! Created --start--> Running (async) --stop--> Stopped
//!         --start--> Inline  (sync)
//! ```

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{mpsc, Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::events::{build_llm_call_events, now_timestamp, EventBatch, EventSource};
use crate::record::CapturedCallRecord;
use crate::state::InstrumentationState;

/// How long the worker waits on the queue before polling again
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How long `stop()` waits for the worker to exit
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

const WORKER_NAME: &str = "agentlens-sender";

/// One unit of work for the worker
pub enum QueueItem {
    /// Deliver a record using the session it was captured under
    Deliver(Arc<InstrumentationState>, CapturedCallRecord),
    /// Exit the worker loop
    Stop,
}

/// Lifecycle state of an [`EventSender`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Created,
    Running,
    Inline,
    Stopped,
}

impl SenderState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SenderState::Running,
            2 => SenderState::Inline,
            3 => SenderState::Stopped,
            _ => SenderState::Created,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            SenderState::Created => 0,
            SenderState::Running => 1,
            SenderState::Inline => 2,
            SenderState::Stopped => 3,
        }
    }
}

/// Count of enqueued items not yet processed
#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    drained: Condvar,
}

impl Pending {
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn done(&self) {
        let mut count = self.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.drained.notify_all();
        }
    }

    fn is_empty(&self) -> bool {
        *self.lock() == 0
    }

    /// Wait until the count reaches zero; false on timeout
    fn wait(&self, timeout: Duration) -> bool {
        let count = self.lock();
        let (count, _) = self
            .drained
            .wait_timeout_while(count, timeout, |c| *c > 0)
            .unwrap_or_else(PoisonError::into_inner);
        *count == 0
    }
}

/// Worker bookkeeping, touched only by `start` and `stop`
#[derive(Default)]
struct Lifecycle {
    rx: Option<UnboundedReceiver<QueueItem>>,
    worker: Option<JoinHandle<()>>,
    done: Option<mpsc::Receiver<()>>,
}

/// Delivers captured records, inline or from a background worker
pub struct EventSender {
    sync_mode: bool,
    state: AtomicU8,
    tx: UnboundedSender<QueueItem>,
    pending: Arc<Pending>,
    lifecycle: Mutex<Lifecycle>,
    /// Drives inline delivery in sync mode
    runtime: Option<Runtime>,
}

impl EventSender {
    /// Create a sender. In sync mode this builds the runtime used for inline
    /// delivery.
    pub fn new(sync_mode: bool) -> std::io::Result<Self> {
        let (tx, rx) = unbounded_channel();
        let runtime = if sync_mode {
            Some(Builder::new_current_thread().enable_all().build()?)
        } else {
            None
        };

        Ok(Self {
            sync_mode,
            state: AtomicU8::new(SenderState::Created.as_u8()),
            tx,
            pending: Arc::new(Pending::default()),
            lifecycle: Mutex::new(Lifecycle {
                rx: Some(rx),
                ..Lifecycle::default()
            }),
            runtime,
        })
    }

    pub fn is_sync(&self) -> bool {
        self.sync_mode
    }

    pub fn state(&self) -> SenderState {
        SenderState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: SenderState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start delivering. Spawns the worker in async mode; idempotent.
    pub fn start(&self) {
        let mut lifecycle = self.lifecycle();
        if self.state() != SenderState::Created {
            return;
        }

        if self.sync_mode {
            self.set_state(SenderState::Inline);
            return;
        }

        let Some(rx) = lifecycle.rx.take() else {
            return;
        };
        let runtime = match Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!("AgentLens: failed to build sender runtime: {}", e);
                lifecycle.rx = Some(rx);
                return;
            }
        };

        let (done_tx, done_rx) = mpsc::channel();
        let pending = Arc::clone(&self.pending);
        let spawned = std::thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || {
                runtime.block_on(run_worker(rx, pending));
                let _ = done_tx.send(());
            });

        match spawned {
            Ok(handle) => {
                lifecycle.worker = Some(handle);
                lifecycle.done = Some(done_rx);
                self.set_state(SenderState::Running);
            }
            Err(e) => warn!("AgentLens: failed to spawn sender thread: {}", e),
        }
    }

    /// Deliver `record` under `state`. Never fails and never blocks in async
    /// mode.
    pub fn send(&self, state: Arc<InstrumentationState>, record: CapturedCallRecord) {
        if self.state() == SenderState::Stopped {
            debug!("AgentLens: sender stopped, dropping record");
            return;
        }

        match &self.runtime {
            Some(runtime) => deliver_inline(runtime, &state, &record),
            None => self.enqueue(QueueItem::Deliver(state, record)),
        }
    }

    /// Queue an item unless stopped. Runs under the pending lock, which `stop`
    /// also holds while queueing the sentinel, so nothing lands behind it.
    fn enqueue(&self, item: QueueItem) {
        let mut count = self.pending.lock();
        if self.state() == SenderState::Stopped {
            debug!("AgentLens: sender stopped, dropping record");
            return;
        }
        if self.tx.send(item).is_err() {
            debug!("AgentLens: sender queue closed, dropping record");
            return;
        }
        *count += 1;
    }

    /// Block until every queued item has been processed or `timeout` elapses.
    ///
    /// Returns whether the queue drained. Always true in sync mode.
    pub fn flush(&self, timeout: Duration) -> bool {
        match self.state() {
            SenderState::Running => self.pending.wait(timeout),
            SenderState::Inline => true,
            _ => self.sync_mode || self.pending.is_empty(),
        }
    }

    /// Stop the worker after it drains everything enqueued before this call.
    ///
    /// No-op unless running. Waits at most five seconds for the worker.
    pub fn stop(&self) {
        let (worker, done) = {
            let mut lifecycle = self.lifecycle();
            if self.state() != SenderState::Running {
                return;
            }
            {
                let _count = self.pending.lock();
                self.set_state(SenderState::Stopped);
                let _ = self.tx.send(QueueItem::Stop);
            }
            (lifecycle.worker.take(), lifecycle.done.take())
        };

        let exited = match done {
            Some(done) => !matches!(
                done.recv_timeout(STOP_TIMEOUT),
                Err(mpsc::RecvTimeoutError::Timeout)
            ),
            None => true,
        };

        match worker {
            Some(handle) if exited => {
                if handle.join().is_err() {
                    debug!("AgentLens: sender thread panicked");
                }
            }
            Some(_) => warn!(
                "AgentLens: sender thread did not stop within {:?}",
                STOP_TIMEOUT
            ),
            None => {}
        }
    }
}

impl std::fmt::Debug for EventSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSender")
            .field("sync_mode", &self.sync_mode)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for EventSender {
    fn drop(&mut self) {
        // A runtime may not be dropped from inside another runtime
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

async fn run_worker(mut rx: UnboundedReceiver<QueueItem>, pending: Arc<Pending>) {
    loop {
        match tokio::time::timeout(POLL_INTERVAL, rx.recv()).await {
            Err(_) => continue,
            Ok(None) | Ok(Some(QueueItem::Stop)) => break,
            Ok(Some(QueueItem::Deliver(state, record))) => {
                deliver(&state, &record).await;
                pending.done();
            }
        }
    }
    debug!("AgentLens: sender worker exiting");
}

fn deliver_inline(runtime: &Runtime, state: &InstrumentationState, record: &CapturedCallRecord) {
    if Handle::try_current().is_err() {
        runtime.block_on(deliver(state, record));
        return;
    }

    // Already inside a runtime: block_on must run on a thread without one
    std::thread::scope(|scope| {
        let handle = scope.spawn(|| runtime.block_on(deliver(state, record)));
        if handle.join().is_err() {
            debug!("AgentLens: inline delivery thread panicked");
        }
    });
}

/// Build and post the paired events for one record, swallowing every failure
async fn deliver(state: &InstrumentationState, record: &CapturedCallRecord) {
    let started = Instant::now();
    let attempt = AssertUnwindSafe(async {
        let call_id = Uuid::new_v4().to_string();
        let events = build_llm_call_events(
            state.session_id(),
            state.agent_id(),
            record,
            state.redaction(),
            &call_id,
            &now_timestamp(),
            EventSource::AutoInstrumentation,
        );
        state.client().send_events(&EventBatch { events }).await
    })
    .catch_unwind()
    .await;

    match attempt {
        Ok(Ok(_)) => debug!(
            "AgentLens: delivered {} call in {:?}",
            record.provider,
            started.elapsed()
        ),
        Ok(Err(e)) => debug!("AgentLens: failed to deliver events: {}", e),
        Err(_) => debug!("AgentLens: event delivery panicked"),
    }
}
