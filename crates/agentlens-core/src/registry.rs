//! Named directory of provider lifecycle managers

use anyhow::{bail, Result};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tracing::{debug, info, warn};

use crate::callsite::CallSites;
use crate::interceptor::{Interceptor, LifecycleManager};
use crate::providers::{anthropic, openai, AnthropicInterceptor, OpenAiInterceptor};

/// Builds a lifecycle manager for one provider. Fails when the provider's
/// call sites are unavailable.
pub type ProviderFactory = Arc<dyn Fn() -> Result<LifecycleManager> + Send + Sync>;

#[derive(Default)]
struct Inner {
    factories: BTreeMap<String, ProviderFactory>,
    active: BTreeMap<String, LifecycleManager>,
}

/// Provider name -> factory, plus the set of currently instrumented providers
#[derive(Default)]
pub struct ProviderRegistry {
    inner: Mutex<Inner>,
}

static GLOBAL: OnceLock<ProviderRegistry> = OnceLock::new();

impl ProviderRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in providers bound to `call_sites`
    pub fn with_builtins(call_sites: Arc<CallSites>) -> Self {
        let registry = Self::new();
        registry.register(
            openai::PROVIDER,
            builtin(Arc::clone(&call_sites), openai::MODULE, || -> Arc<dyn Interceptor> {
                Arc::new(OpenAiInterceptor)
            }),
        );
        registry.register(
            anthropic::PROVIDER,
            builtin(call_sites, anthropic::MODULE, || -> Arc<dyn Interceptor> {
                Arc::new(AnthropicInterceptor)
            }),
        );
        registry
    }

    /// Process-wide registry used by `init`/`shutdown`
    pub fn global() -> &'static ProviderRegistry {
        GLOBAL.get_or_init(|| Self::with_builtins(CallSites::global()))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register (or replace) a provider factory
    pub fn register(&self, name: &str, factory: ProviderFactory) {
        self.lock().factories.insert(name.to_string(), factory);
    }

    /// Names of all registered providers
    pub fn registered(&self) -> Vec<String> {
        self.lock().factories.keys().cloned().collect()
    }

    /// Names of currently instrumented providers
    pub fn active(&self) -> Vec<String> {
        self.lock().active.keys().cloned().collect()
    }

    /// Instrument `names` (all registered when `None`).
    ///
    /// Returns every requested provider that is instrumented afterwards,
    /// including ones that already were. Unknown names and failing
    /// factories are logged and skipped.
    pub fn activate(&self, names: Option<&[&str]>) -> Vec<String> {
        let mut inner = self.lock();
        let targets: Vec<String> = match names {
            Some(names) => names.iter().map(|n| n.to_string()).collect(),
            None => inner.factories.keys().cloned().collect(),
        };

        let mut activated = Vec::new();
        for name in targets {
            if inner.active.contains_key(&name) {
                activated.push(name);
                continue;
            }

            let Some(factory) = inner.factories.get(&name).cloned() else {
                warn!("AgentLens: unknown provider '{}'", name);
                continue;
            };

            let built = panic::catch_unwind(AssertUnwindSafe(|| -> Result<LifecycleManager> {
                let mut manager = factory()?;
                manager.instrument();
                Ok(manager)
            }));

            match built {
                Ok(Ok(manager)) => {
                    info!("AgentLens: {} instrumented", name);
                    inner.active.insert(name.clone(), manager);
                    activated.push(name);
                }
                Ok(Err(e)) => debug!("AgentLens: {} unavailable, skipping: {:#}", name, e),
                Err(_) => debug!("AgentLens: instrumenting {} panicked", name),
            }
        }

        activated
    }

    /// Uninstrument `names` (all active when `None`). Idempotent.
    pub fn deactivate(&self, names: Option<&[&str]>) {
        let mut inner = self.lock();
        let targets: Vec<String> = match names {
            Some(names) => names.iter().map(|n| n.to_string()).collect(),
            None => inner.active.keys().cloned().collect(),
        };

        for name in targets {
            if let Some(mut manager) = inner.active.remove(&name) {
                manager.uninstrument();
            }
        }
    }
}

fn builtin(
    call_sites: Arc<CallSites>,
    module: &'static str,
    make: fn() -> Arc<dyn Interceptor>,
) -> ProviderFactory {
    Arc::new(move || {
        if !call_sites.has_module(module) {
            bail!("no call sites registered for '{}'", module);
        }
        Ok(LifecycleManager::with_call_sites(make(), Arc::clone(&call_sites)))
    })
}
