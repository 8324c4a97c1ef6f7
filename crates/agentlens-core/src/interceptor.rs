//! Reversible interception of provider call sites
//!
//! A provider describes *where* to intercept ([`PatchTarget`]s) and *how* to
//! read a response ([`Interceptor`]). [`LifecycleManager`] does the rest:
//! resolves each target in the [`CallSites`] directory, swaps in a wrapper,
//! and puts the exact original back on `uninstrument`.
//!
//! Every wrapper, sync or async, follows the same contract:
//!
//! 1. No active session: call the original, return its result untouched.
//! 2. Streaming call: same.
//! 3. Otherwise time the original. Its errors propagate unchanged.
//! 4. On success extract a record and send it. Extraction or send failures
//!    (including panics) are logged at debug and the original result is
//!    returned regardless.

use agentlens_telemetry::CapturedCallRecord;
use anyhow::Result;
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::callsite::{AsyncFn, CallSites, DispatchTable, Handler, ResolveError, SyncFn};
use crate::state::{self, ActiveSession};

/// One interception point
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatchTarget {
    pub module: String,
    pub class: Option<String>,
    pub attr: String,
    pub is_async: bool,
}

impl PatchTarget {
    pub fn new(module: &str, class: Option<&str>, attr: &str, is_async: bool) -> Self {
        Self {
            module: module.to_string(),
            class: class.map(str::to_string),
            attr: attr.to_string(),
            is_async,
        }
    }

    /// `module.class.attr` (or `module.attr`)
    pub fn key(&self) -> String {
        match &self.class {
            Some(class) => format!("{}.{}.{}", self.module, class, self.attr),
            None => format!("{}.{}", self.module, self.attr),
        }
    }
}

/// Provider-specific half of interception
pub trait Interceptor: Send + Sync + 'static {
    /// Provider id recorded on every captured call
    fn provider(&self) -> &str;

    /// Call sites this provider intercepts
    fn targets(&self) -> Vec<PatchTarget>;

    /// Streaming calls are passed through uncaptured
    fn is_streaming(&self, args: &Value) -> bool {
        args.get("stream").and_then(Value::as_bool).unwrap_or(false)
    }

    /// Build a record from a completed call
    fn extract(&self, response: &Value, args: &Value, latency_ms: f64) -> Result<CapturedCallRecord>;
}

/// Saved state for one installed wrapper
#[derive(Debug)]
pub struct PatchRecord {
    pub owner: Arc<DispatchTable>,
    pub attr: String,
    pub original: Handler,
}

/// Installs and removes one provider's wrappers
pub struct LifecycleManager {
    interceptor: Arc<dyn Interceptor>,
    call_sites: Arc<CallSites>,
    records: HashMap<String, PatchRecord>,
    instrumented: bool,
}

impl LifecycleManager {
    /// Manage `interceptor` against the process-wide call-site directory
    pub fn new(interceptor: Arc<dyn Interceptor>) -> Self {
        Self::with_call_sites(interceptor, CallSites::global())
    }

    pub fn with_call_sites(interceptor: Arc<dyn Interceptor>, call_sites: Arc<CallSites>) -> Self {
        Self {
            interceptor,
            call_sites,
            records: HashMap::new(),
            instrumented: false,
        }
    }

    pub fn provider(&self) -> &str {
        self.interceptor.provider()
    }

    pub fn is_instrumented(&self) -> bool {
        self.instrumented
    }

    /// Active patch records, keyed by `module.class.attr`
    pub fn records(&self) -> &HashMap<String, PatchRecord> {
        &self.records
    }

    /// Install wrappers for every resolvable target. Idempotent.
    ///
    /// Targets that fail to resolve are logged and skipped.
    pub fn instrument(&mut self) {
        if self.instrumented {
            return;
        }

        for target in self.interceptor.targets() {
            let key = target.key();
            if self.records.contains_key(&key) {
                continue;
            }
            match self.patch(&target) {
                Ok(record) => {
                    self.records.insert(key, record);
                }
                Err(e) => debug!("AgentLens: skipping {}: {}", key, e),
            }
        }

        self.instrumented = true;
        info!(
            "AgentLens: instrumented {} ({} call sites)",
            self.provider(),
            self.records.len()
        );
    }

    /// Reinstall every saved original. Idempotent.
    pub fn uninstrument(&mut self) {
        if !self.instrumented {
            return;
        }

        for (_, record) in self.records.drain() {
            record.owner.set(&record.attr, record.original);
        }

        self.instrumented = false;
        info!("AgentLens: uninstrumented {}", self.interceptor.provider());
    }

    fn patch(&self, target: &PatchTarget) -> Result<PatchRecord, ResolveError> {
        let owner = self
            .call_sites
            .resolve(&target.module, target.class.as_deref())?;
        let original = owner.resolve(&target.attr)?;

        let wrapper = match (&original, target.is_async) {
            (Handler::Sync(f), false) => wrap_sync(Arc::clone(&self.interceptor), Arc::clone(f)),
            (Handler::Async(f), true) => wrap_async(Arc::clone(&self.interceptor), Arc::clone(f)),
            (found, expected_async) => {
                return Err(ResolveError::KindMismatch {
                    owner: owner.name().to_string(),
                    attr: target.attr.clone(),
                    expected: kind(expected_async),
                    found: kind(found.is_async()),
                })
            }
        };

        owner.set(&target.attr, wrapper);
        Ok(PatchRecord {
            owner,
            attr: target.attr.clone(),
            original,
        })
    }
}

impl Drop for LifecycleManager {
    fn drop(&mut self) {
        self.uninstrument();
    }
}

fn kind(is_async: bool) -> &'static str {
    if is_async {
        "async"
    } else {
        "sync"
    }
}

fn wrap_sync(interceptor: Arc<dyn Interceptor>, original: SyncFn) -> Handler {
    Handler::Sync(Arc::new(move |args: &Value| {
        let Some(session) = state::active() else {
            return original(args);
        };
        if interceptor.is_streaming(args) {
            return original(args);
        }

        let started = Instant::now();
        let response = original(args)?;
        capture(interceptor.as_ref(), &session, &response, args, elapsed_ms(started));
        Ok(response)
    }))
}

fn wrap_async(interceptor: Arc<dyn Interceptor>, original: AsyncFn) -> Handler {
    Handler::Async(Arc::new(move |args: Value| {
        let interceptor = Arc::clone(&interceptor);
        let original = Arc::clone(&original);
        async move {
            let Some(session) = state::active() else {
                return original(args).await;
            };
            if interceptor.is_streaming(&args) {
                return original(args).await;
            }

            let started = Instant::now();
            let response = original(args.clone()).await?;
            capture(interceptor.as_ref(), &session, &response, &args, elapsed_ms(started));
            Ok(response)
        }
        .boxed()
    }))
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Extract and send; never fails
fn capture(
    interceptor: &dyn Interceptor,
    session: &ActiveSession,
    response: &Value,
    args: &Value,
    latency_ms: f64,
) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Result<()> {
        let record = interceptor.extract(response, args, latency_ms)?;
        session.sender.send(Arc::clone(&session.state), record);
        Ok(())
    }));

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(
            "AgentLens: failed to capture {} call: {:#}",
            interceptor.provider(),
            e
        ),
        Err(_) => debug!(
            "AgentLens: capture panicked for {} call",
            interceptor.provider()
        ),
    }
}
