//! Runtime management for request tasks.
//!
//! Requests run on the caller's tokio runtime when there is one. Callers on a
//! plain thread get a small shared runtime instead, created on first use.

use std::future::Future;
use std::sync::OnceLock;

use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Initialize the fallback runtime.
///
/// Only needed when requests are issued outside a tokio runtime; calling it
/// early just moves the start-up cost.
pub fn init() -> &'static Runtime {
    RUNTIME.get_or_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("courier-worker")
            .enable_all()
            .build()
            .expect("Failed to create tokio runtime")
    })
}

/// Spawn a future on the current runtime, or on the fallback runtime.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) => handle.spawn(future),
        Err(_) => init().spawn(future),
    }
}

/// Block on a future using the fallback runtime.
///
/// # Warning
///
/// Do not call this from within an async context; it will panic.
pub fn block_on<F: Future>(future: F) -> F::Output {
    init().block_on(future)
}
