//! The tokio runtime which drives connection attempts.
//!
//! An [`Engine`] either borrows a runtime owned by the caller, or owns a
//! dedicated single-worker runtime created for the client. An owned engine must
//! be shut down exactly once before it is dropped: dropping an owned engine which
//! was never shut down aborts the process, since in-flight attempts would
//! otherwise be silently torn down.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::{Handle, Runtime};

const NOT_SHUTDOWN: u8 = 0;
const SHUTDOWN: u8 = 1;

/// How long an owned runtime is given to drain its tasks during shutdown.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(5);

/// Error returned when an owned engine is shut down a second time.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("engine already shut down")]
pub struct AlreadyShutdown;

/// Where the client's runtime comes from.
#[derive(Debug, Clone, Default)]
pub enum EngineProvider {
    /// Use a runtime owned by the caller. The client never shuts it down.
    Shared(Handle),

    /// Create a dedicated runtime, owned and shut down by the client.
    #[default]
    CreateNew,
}

impl EngineProvider {
    /// Share the runtime of the current context, if there is one.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(EngineProvider::Shared)
    }
}

/// The runtime used to drive connection attempts.
pub struct Engine {
    inner: Inner,
}

enum Inner {
    Borrowed(Handle),
    Owned(OwnedEngine),
}

struct OwnedEngine {
    handle: Handle,
    runtime: Mutex<Option<Runtime>>,
    state: AtomicU8,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Inner::Borrowed(_) => f.debug_struct("Engine").field("mode", &"borrowed").finish(),
            Inner::Owned(owned) => f
                .debug_struct("Engine")
                .field("mode", &"owned")
                .field("shutdown", &owned.is_shutdown())
                .finish(),
        }
    }
}

impl Engine {
    /// Create an engine from a provider.
    pub fn new(provider: EngineProvider) -> io::Result<Self> {
        match provider {
            EngineProvider::Shared(handle) => Ok(Self::borrowed(handle)),
            EngineProvider::CreateNew => Self::owned(),
        }
    }

    /// Borrow a runtime owned by the caller.
    pub fn borrowed(handle: Handle) -> Self {
        Self {
            inner: Inner::Borrowed(handle),
        }
    }

    /// Create a dedicated single-worker runtime.
    pub fn owned() -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("wsdriver-engine")
            .enable_all()
            .build()?;

        tracing::trace!("owned engine started");

        Ok(Self {
            inner: Inner::Owned(OwnedEngine {
                handle: runtime.handle().clone(),
                runtime: Mutex::new(Some(runtime)),
                state: AtomicU8::new(NOT_SHUTDOWN),
            }),
        })
    }

    /// A handle to the runtime, used to spawn connection attempts.
    pub fn handle(&self) -> &Handle {
        match &self.inner {
            Inner::Borrowed(handle) => handle,
            Inner::Owned(owned) => &owned.handle,
        }
    }

    /// Whether this engine owns its runtime.
    pub fn is_owned(&self) -> bool {
        matches!(self.inner, Inner::Owned(_))
    }

    /// Whether this engine has been shut down. Borrowed engines never are.
    pub fn is_shutdown(&self) -> bool {
        match &self.inner {
            Inner::Borrowed(_) => false,
            Inner::Owned(owned) => owned.is_shutdown(),
        }
    }

    /// Shut the engine down.
    ///
    /// A borrowed engine is left untouched and this always succeeds. An owned
    /// engine is shut down on the first call, draining its runtime; every later
    /// call returns [`AlreadyShutdown`].
    ///
    /// This may be called from any thread. Inside an async context the runtime
    /// is shut down in the background instead of being drained in place.
    pub fn shutdown(&self) -> Result<(), AlreadyShutdown> {
        match &self.inner {
            Inner::Borrowed(_) => Ok(()),
            Inner::Owned(owned) => owned.shutdown(),
        }
    }

    /// Panics if this is an owned engine which has not been shut down.
    ///
    /// Dropping such an engine aborts the process; this exposes the same
    /// check without the abort.
    #[track_caller]
    pub fn assert_shut_down(&self) {
        assert!(
            !self.is_owned() || self.is_shutdown(),
            "owned engine was not shut down"
        );
    }
}

impl OwnedEngine {
    fn is_shutdown(&self) -> bool {
        self.state.load(Ordering::Acquire) == SHUTDOWN
    }

    fn shutdown(&self) -> Result<(), AlreadyShutdown> {
        self.state
            .compare_exchange(NOT_SHUTDOWN, SHUTDOWN, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| AlreadyShutdown)?;

        let Some(runtime) = self.runtime.lock().take() else {
            return Ok(());
        };

        if Handle::try_current().is_ok() {
            tracing::trace!("owned engine shutting down in the background");
            runtime.shutdown_background();
        } else {
            tracing::trace!(drain = ?SHUTDOWN_DRAIN, "owned engine shutting down");
            runtime.shutdown_timeout(SHUTDOWN_DRAIN);
        }

        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Inner::Owned(owned) = &self.inner {
            if !owned.is_shutdown() && !std::thread::panicking() {
                tracing::error!("owned engine dropped without being shut down");
                std::process::abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use static_assertions::assert_impl_all;

    assert_impl_all!(Engine: Send, Sync, fmt::Debug);
    assert_impl_all!(AlreadyShutdown: std::error::Error, Send, Sync);

    #[test]
    fn owned_shutdown_once() {
        let engine = Engine::owned().unwrap();
        assert!(engine.is_owned());
        assert!(!engine.is_shutdown());

        assert_eq!(engine.shutdown(), Ok(()));
        assert!(engine.is_shutdown());
        assert_eq!(engine.shutdown(), Err(AlreadyShutdown));
        assert_eq!(engine.shutdown(), Err(AlreadyShutdown));
        engine.assert_shut_down();
    }

    #[test]
    fn owned_runs_tasks() {
        let engine = Engine::owned().unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        engine.handle().spawn(async move {
            let name = std::thread::current().name().map(String::from);
            tx.send(name).unwrap();
        });

        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("wsdriver-engine"));
        engine.shutdown().unwrap();
    }

    #[test]
    #[should_panic(expected = "owned engine was not shut down")]
    fn assert_unshut_owned_engine() {
        let engine = Engine::owned().unwrap();
        engine.assert_shut_down();
    }

    #[tokio::test]
    async fn borrowed_shutdown_is_noop() {
        let engine = Engine::new(EngineProvider::current().unwrap()).unwrap();
        assert!(!engine.is_owned());

        assert_eq!(engine.shutdown(), Ok(()));
        assert_eq!(engine.shutdown(), Ok(()));
        assert!(!engine.is_shutdown());

        let value = engine.handle().spawn(async { 7 }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn owned_shutdown_inside_async_context() {
        let engine = Engine::owned().unwrap();
        assert_eq!(engine.shutdown(), Ok(()));
        assert_eq!(engine.shutdown(), Err(AlreadyShutdown));
    }
}
