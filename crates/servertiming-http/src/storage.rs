//! Context storage: which metric collection belongs to the running request.
//!
//! Two strategies hold the active [`Scope`]:
//! - [`ThreadScopes`]: one slot per OS thread (`thread_local!`), for blocking
//!   handlers and worker threads.
//! - [`TaskScopes`]: one slot per tokio task context (`task_local!`), for
//!   requests interleaved on an async runtime.
//!
//! Lifecycle per execution context: `bind(mode)` -> `collection()` ... ->
//! `cleanup()`. Lookups outside a bound scope fail with `UnboundContext`;
//! nothing is ever created implicitly.
//!
//! A task-local scope does not follow work that leaves the task. Use
//! [`spawn`], [`spawn_blocking`], [`spawn_thread`] or [`Scope::enter`] so the
//! other side resolves to the same collection.

use std::cell::RefCell;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::task::JoinHandle;

use servertiming_core::error::{Result, TimingsError};
use servertiming_core::MetricCollection;

/// Which strategy a scope is bound with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    /// Keyed by the calling OS thread.
    Sync,
    /// Keyed by the calling tokio task context.
    Async,
}

impl BindMode {
    pub fn as_str(self) -> &'static str {
        match self {
            BindMode::Sync => "sync",
            BindMode::Async => "async",
        }
    }
}

static SCOPE_SEQ: AtomicU64 = AtomicU64::new(1);

struct ScopeInner {
    id: u64,
    mode: BindMode,
    // the "instance" slot, filled on first access
    instance: OnceLock<MetricCollection>,
}

/// Storage record for one logical request.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    fn new(mode: BindMode) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                id: SCOPE_SEQ.fetch_add(1, Ordering::Relaxed),
                mode,
                instance: OnceLock::new(),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn mode(&self) -> BindMode {
        self.inner.mode
    }

    /// The scope's collection, created on first call.
    pub fn collection(&self) -> MetricCollection {
        self.inner
            .instance
            .get_or_init(MetricCollection::new)
            .clone()
    }

    pub fn same_as(&self, other: &Scope) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Bind this same scope on the current thread until the binding drops.
    ///
    /// Used to hand a request's scope to a worker thread. Whatever the thread
    /// slot held before is restored on drop, so pooled threads do not carry
    /// the scope into unrelated work.
    pub fn enter(&self) -> ThreadBinding {
        let previous = ThreadScopes.swap(Some(self.clone()));
        tracing::trace!(scope = self.id(), "scope entered on thread");
        ThreadBinding {
            previous,
            _not_send: PhantomData,
        }
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.inner.id)
            .field("mode", &self.inner.mode)
            .field("collection", &self.inner.instance.get())
            .finish()
    }
}

/// Thread binding created by [`Scope::enter`]. Not `Send`: it must be
/// released on the thread it was created on.
#[must_use = "the scope is unbound from the thread as soon as the binding is dropped"]
pub struct ThreadBinding {
    previous: Option<Scope>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ThreadBinding {
    fn drop(&mut self) {
        ThreadScopes.swap(self.previous.take());
    }
}

thread_local! {
    static THREAD_SLOT: RefCell<Option<Scope>> = const { RefCell::new(None) };
}

tokio::task_local! {
    static TASK_SLOT: RefCell<Option<Scope>>;
}

/// Where a bound scope lives for the calling execution context.
pub trait ScopeStrategy {
    fn mode(&self) -> BindMode;

    /// Whether the calling context can hold a scope with this strategy.
    fn available(&self) -> bool;

    /// Install `scope` (or clear with `None`), returning what was there.
    fn replace(&self, scope: Option<Scope>) -> Result<Option<Scope>>;

    fn current(&self) -> Option<Scope>;
}

/// Thread-scoped strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadScopes;

impl ThreadScopes {
    fn swap(&self, scope: Option<Scope>) -> Option<Scope> {
        THREAD_SLOT
            .try_with(|slot| slot.replace(scope))
            .ok()
            .flatten()
    }
}

impl ScopeStrategy for ThreadScopes {
    fn mode(&self) -> BindMode {
        BindMode::Sync
    }

    fn available(&self) -> bool {
        THREAD_SLOT.try_with(|_| ()).is_ok()
    }

    fn replace(&self, scope: Option<Scope>) -> Result<Option<Scope>> {
        THREAD_SLOT
            .try_with(|slot| slot.replace(scope))
            .map_err(|_| TimingsError::Internal("thread storage already torn down".into()))
    }

    fn current(&self) -> Option<Scope> {
        THREAD_SLOT
            .try_with(|slot| slot.borrow().clone())
            .ok()
            .flatten()
    }
}

/// Cooperative-task-scoped strategy. Only usable inside
/// [`with_task_context`] (or a future spawned through [`spawn`]).
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskScopes;

impl ScopeStrategy for TaskScopes {
    fn mode(&self) -> BindMode {
        BindMode::Async
    }

    fn available(&self) -> bool {
        TASK_SLOT.try_with(|_| ()).is_ok()
    }

    fn replace(&self, scope: Option<Scope>) -> Result<Option<Scope>> {
        TASK_SLOT
            .try_with(|slot| slot.replace(scope))
            .map_err(|_| TimingsError::InvalidState("async bind requires a task context"))
    }

    fn current(&self) -> Option<Scope> {
        TASK_SLOT
            .try_with(|slot| slot.borrow().clone())
            .ok()
            .flatten()
    }
}

fn strategy(mode: BindMode) -> &'static dyn ScopeStrategy {
    match mode {
        BindMode::Sync => &ThreadScopes,
        BindMode::Async => &TaskScopes,
    }
}

/// Strategy that answers lookups for the caller. Inside a task context only
/// the task slot counts; the worker thread's slot belongs to whatever else
/// runs on that thread.
fn active_strategy() -> &'static dyn ScopeStrategy {
    if TaskScopes.available() {
        &TaskScopes
    } else {
        &ThreadScopes
    }
}

/// Bind a fresh, empty scope for the calling execution context.
///
/// Re-binding a context that is still bound drops the stale scope and logs a
/// warning; a missed `cleanup()` never leaks metrics into the next request.
pub fn bind(mode: BindMode) -> Result<Scope> {
    let strategy = strategy(mode);
    if mode == BindMode::Sync && TaskScopes.available() {
        tracing::warn!(
            mode = mode.as_str(),
            "sync bind inside a task context is not visible to lookups there"
        );
    }
    let scope = Scope::new(mode);
    if let Some(stale) = strategy.replace(Some(scope.clone()))? {
        tracing::warn!(
            mode = mode.as_str(),
            stale_scope = stale.id(),
            scope = scope.id(),
            "context was still bound; stale timing scope replaced"
        );
    }
    tracing::trace!(mode = mode.as_str(), scope = scope.id(), "timing scope bound");
    Ok(scope)
}

/// Strategy currently holding a scope for the caller.
pub fn active_mode() -> Option<BindMode> {
    let strategy = active_strategy();
    strategy.current().map(|_| strategy.mode())
}

/// Scope bound for the calling context.
pub fn current() -> Result<Scope> {
    active_strategy()
        .current()
        .ok_or(TimingsError::UnboundContext)
}

/// Collection of the bound scope, created lazily.
///
/// Outside a bound scope this logs a warning and returns `UnboundContext`.
pub fn collection() -> Result<MetricCollection> {
    match current() {
        Ok(scope) => Ok(scope.collection()),
        Err(e) => {
            tracing::warn!(code = e.code().as_str(), "timing storage used outside of a bound scope");
            Err(e)
        }
    }
}

/// Release the scope of the calling context. Never fails, safe to repeat.
pub fn cleanup() {
    let released = active_strategy().replace(None).ok().flatten();
    if let Some(scope) = released {
        tracing::trace!(mode = scope.mode().as_str(), scope = scope.id(), "timing scope released");
    }
}

/// Run `fut` with an empty task context, so `bind(BindMode::Async)` works
/// inside it. The slot is released when the future completes or is dropped.
pub async fn with_task_context<F: Future>(fut: F) -> F::Output {
    TASK_SLOT.scope(RefCell::new(None), fut).await
}

/// Run `fut` as one logical request: task context, async bind, cleanup.
pub async fn scoped<F: Future>(fut: F) -> F::Output {
    with_task_context(async move {
        if let Err(e) = bind(BindMode::Async) {
            tracing::error!(code = e.code().as_str(), error = %e, "failed to bind timing scope");
        }
        let out = fut.await;
        cleanup();
        out
    })
    .await
}

/// Run `f` as one logical request on the calling thread.
///
/// The previous thread slot is restored afterwards, on unwinding too.
pub fn scoped_sync<T>(f: impl FnOnce(&Scope) -> T) -> T {
    let scope = Scope::new(BindMode::Sync);
    let _binding = scope.enter();
    f(&scope)
}

/// `tokio::spawn` with the caller's scope handed to the new task.
pub fn spawn<F>(fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let scope = current().ok();
    tokio::spawn(TASK_SLOT.scope(RefCell::new(scope), fut))
}

/// `tokio::task::spawn_blocking` with the caller's scope entered on the
/// blocking thread for the duration of `f`.
pub fn spawn_blocking<F, R>(f: F) -> JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let scope = current().ok();
    tokio::task::spawn_blocking(move || {
        let _binding = scope.as_ref().map(Scope::enter);
        f()
    })
}

/// `std::thread::spawn` with the caller's scope entered on the new thread.
pub fn spawn_thread<F, R>(f: F) -> std::thread::JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let scope = current().ok();
    std::thread::spawn(move || {
        let _binding = scope.as_ref().map(Scope::enter);
        f()
    })
}
