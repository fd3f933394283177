//! Tokio runtime spawner implementation.

use std::future::Future;

use tokio::runtime::{Handle, Runtime};

use crate::core::Spawn;

/// Tokio-based spawner for the coordinator loop and processing tasks.
///
/// Holds only a [`Handle`]; clones travel into spawned tasks, so they must
/// never own the runtime they run on.
#[derive(Clone, Debug)]
pub struct TokioSpawner {
    handle: Handle,
}

impl TokioSpawner {
    /// Spawner over an existing runtime handle.
    #[must_use]
    pub const fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Spawner over the runtime the caller is running on.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    #[must_use]
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Handle to the underlying runtime.
    #[must_use]
    pub const fn handle(&self) -> &Handle {
        &self.handle
    }
}

impl Spawn for TokioSpawner {
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(fut);
    }
}

/// A dedicated multi-threaded runtime for a kitchen.
///
/// The owner keeps the runtime alive and hands out [`TokioSpawner`]s.
/// Dropping it shuts the runtime down in the background, which is allowed
/// from any context, including inside another runtime.
#[derive(Debug)]
pub struct KitchenRuntime {
    handle: Handle,
    runtime: Option<Runtime>,
}

impl KitchenRuntime {
    /// Runtime with `worker_threads` threads (at least one).
    ///
    /// # Errors
    ///
    /// Runtime construction failure.
    pub fn with_worker_threads(worker_threads: usize) -> Result<Self, std::io::Error> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .thread_name("kitchen-worker")
            .enable_all()
            .build()?;
        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
        })
    }

    /// Runtime with one thread per CPU.
    ///
    /// # Errors
    ///
    /// Runtime construction failure.
    pub fn with_default_threads() -> Result<Self, std::io::Error> {
        Self::with_worker_threads(num_cpus::get())
    }

    /// Spawner onto this runtime.
    #[must_use]
    pub fn spawner(&self) -> TokioSpawner {
        TokioSpawner::new(self.handle.clone())
    }

    /// Run `fut` to completion on this runtime from synchronous code.
    ///
    /// # Panics
    ///
    /// Panics when called from inside an async context.
    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.handle.block_on(fut)
    }
}

impl Drop for KitchenRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
