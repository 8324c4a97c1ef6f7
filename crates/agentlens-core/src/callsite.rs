//! Host call-site directory
//!
//! Provider calls are routed through named dispatch tables that the host
//! application registers up front. A table plays the role of a module or class
//! namespace: it maps attribute names (`"create"`) to the [`Handler`]
//! currently installed there. Interception swaps the handler; callers holding
//! a [`CallSite`] always dispatch through whatever is installed now.
//!
//! ```text
//! CallSites
//! └── "openai.resources.chat.completions"      (module)
//!     ├── functions: DispatchTable
//!     └── classes
//!         ├── "Completions":      { "create": Handler::Sync  }
//!         └── "AsyncCompletions": { "create": Handler::Async }
//! ```

use anyhow::Result;
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use thiserror::Error;

pub type SyncFn = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;
pub type AsyncFn = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// A callable installed at a call site
#[derive(Clone)]
pub enum Handler {
    Sync(SyncFn),
    Async(AsyncFn),
}

impl Handler {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        Handler::Sync(Arc::new(f))
    }

    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Handler::Async(Arc::new(move |args| f(args).boxed()))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Handler::Async(_))
    }

    /// True if both handlers are the same installed callable
    pub fn ptr_eq(&self, other: &Handler) -> bool {
        match (self, other) {
            (Handler::Sync(a), Handler::Sync(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
            (Handler::Async(a), Handler::Async(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            _ => false,
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Handler::Sync(_) => f.write_str("Handler::Sync"),
            Handler::Async(_) => f.write_str("Handler::Async"),
        }
    }
}

/// Lookup failures while resolving an interception point
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("module '{module}' is not registered")]
    ModuleNotFound { module: String },

    #[error("class '{class}' not found in module '{module}'")]
    ClassNotFound { module: String, class: String },

    #[error("attribute '{attr}' not found on '{owner}'")]
    AttributeNotFound { owner: String, attr: String },

    #[error("'{owner}.{attr}' is {found}, expected {expected}")]
    KindMismatch {
        owner: String,
        attr: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Attribute table of one module or class
#[derive(Debug)]
pub struct DispatchTable {
    name: String,
    entries: RwLock<HashMap<String, Handler>>,
}

impl DispatchTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Qualified name, e.g. `openai.resources.chat.completions.Completions`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Currently installed handler for `attr`
    pub fn get(&self, attr: &str) -> Option<Handler> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(attr)
            .cloned()
    }

    /// Install `handler` at `attr`, returning what was there before
    pub fn set(&self, attr: &str, handler: Handler) -> Option<Handler> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(attr.to_string(), handler)
    }

    pub fn contains(&self, attr: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(attr)
    }

    /// Handler at `attr`, or [`ResolveError::AttributeNotFound`]
    pub fn resolve(&self, attr: &str) -> Result<Handler, ResolveError> {
        self.get(attr).ok_or_else(|| ResolveError::AttributeNotFound {
            owner: self.name.clone(),
            attr: attr.to_string(),
        })
    }
}

#[derive(Debug)]
struct ModuleEntry {
    functions: Arc<DispatchTable>,
    classes: HashMap<String, Arc<DispatchTable>>,
}

/// Directory of every registered module
#[derive(Debug, Default)]
pub struct CallSites {
    modules: RwLock<HashMap<String, ModuleEntry>>,
}

static GLOBAL: OnceLock<Arc<CallSites>> = OnceLock::new();

impl CallSites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide directory used by the built-in providers
    pub fn global() -> Arc<CallSites> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(CallSites::new())))
    }

    /// Register a callable under `(module, class, attr)` and return a handle
    /// that dispatches through whatever is installed there.
    pub fn register(
        &self,
        module: &str,
        class: Option<&str>,
        attr: &str,
        handler: Handler,
    ) -> CallSite {
        let table = {
            let mut modules = self.modules.write().unwrap_or_else(PoisonError::into_inner);
            let entry = modules
                .entry(module.to_string())
                .or_insert_with(|| ModuleEntry {
                    functions: Arc::new(DispatchTable::new(module)),
                    classes: HashMap::new(),
                });
            match class {
                Some(class) => Arc::clone(
                    entry
                        .classes
                        .entry(class.to_string())
                        .or_insert_with(|| Arc::new(DispatchTable::new(format!("{module}.{class}")))),
                ),
                None => Arc::clone(&entry.functions),
            }
        };

        table.set(attr, handler);
        CallSite {
            table,
            attr: attr.to_string(),
        }
    }

    pub fn has_module(&self, module: &str) -> bool {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(module)
    }

    /// Find the table owning attributes of `module` (or `module.class`)
    pub fn resolve(
        &self,
        module: &str,
        class: Option<&str>,
    ) -> Result<Arc<DispatchTable>, ResolveError> {
        let modules = self.modules.read().unwrap_or_else(PoisonError::into_inner);
        let entry = modules.get(module).ok_or_else(|| ResolveError::ModuleNotFound {
            module: module.to_string(),
        })?;

        match class {
            Some(class) => entry.classes.get(class).cloned().ok_or_else(|| {
                ResolveError::ClassNotFound {
                    module: module.to_string(),
                    class: class.to_string(),
                }
            }),
            None => Ok(Arc::clone(&entry.functions)),
        }
    }

    /// Handle for an already registered attribute
    pub fn call_site(
        &self,
        module: &str,
        class: Option<&str>,
        attr: &str,
    ) -> Result<CallSite, ResolveError> {
        let table = self.resolve(module, class)?;
        table.resolve(attr)?;
        Ok(CallSite {
            table,
            attr: attr.to_string(),
        })
    }

    /// Forget a module and all its classes
    pub fn unregister_module(&self, module: &str) -> bool {
        self.modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(module)
            .is_some()
    }
}

/// Host-side handle to one registered attribute
#[derive(Debug, Clone)]
pub struct CallSite {
    table: Arc<DispatchTable>,
    attr: String,
}

impl CallSite {
    /// The handler installed right now
    pub fn handler(&self) -> Result<Handler, ResolveError> {
        self.table.resolve(&self.attr)
    }

    /// Invoke a synchronous call site
    pub fn call(&self, args: &Value) -> Result<Value> {
        match self.handler()? {
            Handler::Sync(f) => f(args),
            Handler::Async(_) => Err(ResolveError::KindMismatch {
                owner: self.table.name().to_string(),
                attr: self.attr.clone(),
                expected: "sync",
                found: "async",
            }
            .into()),
        }
    }

    /// Invoke an asynchronous call site
    pub async fn call_async(&self, args: Value) -> Result<Value> {
        match self.handler()? {
            Handler::Async(f) => f(args).await,
            Handler::Sync(_) => Err(ResolveError::KindMismatch {
                owner: self.table.name().to_string(),
                attr: self.attr.clone(),
                expected: "async",
                found: "sync",
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo() -> Handler {
        Handler::sync(|args| Ok(args.clone()))
    }

    #[test]
    fn test_register_and_call() {
        let sites = CallSites::new();
        let site = sites.register("mod.a", Some("Client"), "create", echo());

        assert_eq!(site.call(&json!({"x": 1})).unwrap(), json!({"x": 1}));
        assert!(sites.has_module("mod.a"));
    }

    #[test]
    fn test_call_site_follows_swapped_handler() {
        let sites = CallSites::new();
        let site = sites.register("mod.a", None, "create", echo());
        let table = sites.resolve("mod.a", None).unwrap();

        table.set("create", Handler::sync(|_| Ok(json!("swapped"))));

        assert_eq!(site.call(&json!(null)).unwrap(), json!("swapped"));
    }

    #[test]
    fn test_resolve_errors() {
        let sites = CallSites::new();
        sites.register("mod.a", Some("Client"), "create", echo());

        assert_eq!(
            sites.resolve("mod.missing", None).unwrap_err(),
            ResolveError::ModuleNotFound {
                module: "mod.missing".to_string()
            }
        );
        assert!(matches!(
            sites.resolve("mod.a", Some("Other")),
            Err(ResolveError::ClassNotFound { .. })
        ));
        assert_eq!(
            sites.call_site("mod.a", Some("Client"), "delete").unwrap_err(),
            ResolveError::AttributeNotFound {
                owner: "mod.a.Client".to_string(),
                attr: "delete".to_string()
            }
        );
    }

    #[test]
    fn test_ptr_eq_tracks_identity() {
        let a = echo();
        let b = echo();
        assert!(a.ptr_eq(&a.clone()));
        assert!(!a.ptr_eq(&b));
    }

    #[tokio::test]
    async fn test_async_call_site() {
        let sites = CallSites::new();
        let site = sites.register(
            "mod.b",
            Some("AsyncClient"),
            "create",
            Handler::from_async(|args: Value| async move { Ok(json!({"echo": args})) }),
        );

        let result = site.call_async(json!(1)).await.unwrap();
        assert_eq!(result, json!({"echo": 1}));
        assert!(site.call(&json!(1)).is_err());
    }
}
