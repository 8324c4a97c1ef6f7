//! Process-wide active session
//!
//! At most one session is active. It is published as an `Arc` snapshot:
//! `init` and `shutdown` replace it wholesale while holding the lifecycle
//! lock, and interceptors only load the current snapshot, without locking.

use agentlens_telemetry::{EventSender, InstrumentationState};
use arc_swap::ArcSwapOption;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The active session: settings plus the sender that delivers for it
#[derive(Debug)]
pub struct ActiveSession {
    pub state: Arc<InstrumentationState>,
    pub sender: EventSender,
}

static ACTIVE: ArcSwapOption<ActiveSession> = ArcSwapOption::const_empty();

/// Serialises init/shutdown and provider activation
static LIFECYCLE: Mutex<()> = Mutex::new(());

/// Snapshot of the active session, if any
pub fn active() -> Option<Arc<ActiveSession>> {
    ACTIVE.load_full()
}

pub(crate) fn lifecycle_lock() -> MutexGuard<'static, ()> {
    LIFECYCLE.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn install(session: ActiveSession) {
    ACTIVE.store(Some(Arc::new(session)));
}

pub(crate) fn take() -> Option<Arc<ActiveSession>> {
    ACTIVE.swap(None)
}
