//! Runtime abstraction layer for async operations
//!
//! Tile loads are plain futures. This module decides where they run: on the
//! ambient Tokio runtime (or a lazily started background one) natively, or on
//! the browser's microtask queue under WASM.

use crate::prelude::{Future, Pin};
use crate::Result;
use once_cell::sync::OnceCell;

/// A trait for spawning async tasks (object-safe version)
pub trait AsyncSpawner: Send + Sync + 'static {
    /// Spawn a future and return a handle to it. An error means the future
    /// was dropped without running.
    fn spawn_boxed(
        &self,
        future: Pin<Box<dyn Future<Output = ()> + Send + 'static>>,
    ) -> Result<Box<dyn AsyncHandle>>;
}

/// Handle to a spawned async task
pub trait AsyncHandle: Send + Sync {
    /// Check if the task is finished
    fn is_finished(&self) -> bool;

    /// Cancel the task
    fn cancel(&self);
}

/// Spawns a future on the process-wide spawner
pub fn spawn<F>(future: F) -> Result<Box<dyn AsyncHandle>>
where
    F: Future<Output = ()> + Send + 'static,
{
    runtime().spawn_boxed(Box::pin(future))
}

/// Default spawner implementations
pub mod spawners {
    use super::*;

    #[cfg(feature = "tokio-runtime")]
    pub mod tokio_impl {
        use super::*;
        use ::tokio::runtime::{Builder, Handle, Runtime};
        use ::tokio::task::JoinHandle;
        use crate::MapError;

        /// Runtime used when spawning from a thread that has no Tokio context,
        /// e.g. a native render loop.
        static FALLBACK: OnceCell<Runtime> = OnceCell::new();

        fn fallback_handle() -> Option<Handle> {
            FALLBACK
                .get_or_try_init(|| {
                    Builder::new_multi_thread()
                        .worker_threads(2)
                        .thread_name("gtmap-loader")
                        .enable_all()
                        .build()
                })
                .map(|rt| rt.handle().clone())
                .map_err(|e| log::error!("failed to start loader runtime: {}", e))
                .ok()
        }

        /// Tokio-based async spawner
        pub struct TokioSpawner;

        impl AsyncSpawner for TokioSpawner {
            fn spawn_boxed(
                &self,
                future: Pin<Box<dyn Future<Output = ()> + Send + 'static>>,
            ) -> Result<Box<dyn AsyncHandle>> {
                let handle = Handle::try_current()
                    .ok()
                    .or_else(fallback_handle)
                    .ok_or_else(|| MapError::Runtime("no tokio runtime to spawn on".into()))?;
                Ok(Box::new(TokioHandle(handle.spawn(future))))
            }
        }

        struct TokioHandle(JoinHandle<()>);

        impl AsyncHandle for TokioHandle {
            fn is_finished(&self) -> bool {
                self.0.is_finished()
            }

            fn cancel(&self) {
                self.0.abort();
            }
        }
    }

    #[cfg(feature = "wasm")]
    pub mod wasm {
        use super::*;
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        /// WASM-compatible async spawner
        pub struct WasmSpawner;

        impl AsyncSpawner for WasmSpawner {
            fn spawn_boxed(
                &self,
                future: Pin<Box<dyn Future<Output = ()> + Send + 'static>>,
            ) -> Result<Box<dyn AsyncHandle>> {
                let finished = Arc::new(AtomicBool::new(false));
                let flag = finished.clone();
                wasm_bindgen_futures::spawn_local(async move {
                    future.await;
                    flag.store(true, Ordering::Release);
                });
                Ok(Box::new(WasmHandle { finished }))
            }
        }

        struct WasmHandle {
            finished: Arc<AtomicBool>,
        }

        impl AsyncHandle for WasmHandle {
            fn is_finished(&self) -> bool {
                self.finished.load(Ordering::Acquire)
            }

            fn cancel(&self) {
                // spawn_local tasks cannot be aborted; the result is discarded
                // by the generation check instead
                self.finished.store(true, Ordering::Release);
            }
        }
    }
}

static RUNTIME: OnceCell<Box<dyn AsyncSpawner>> = OnceCell::new();

/// Installs a custom spawner. Must be called before the first load;
/// later calls are ignored.
pub fn init_runtime(spawner: Box<dyn AsyncSpawner>) {
    if RUNTIME.set(spawner).is_err() {
        log::warn!("async runtime already initialised, keeping the existing spawner");
    }
}

/// Get the global runtime spawner
pub fn runtime() -> &'static dyn AsyncSpawner {
    RUNTIME
        .get_or_init(|| {
            #[cfg(feature = "tokio-runtime")]
            {
                Box::new(spawners::tokio_impl::TokioSpawner)
            }

            #[cfg(all(feature = "wasm", not(feature = "tokio-runtime")))]
            {
                Box::new(spawners::wasm::WasmSpawner)
            }

            #[cfg(not(any(feature = "tokio-runtime", feature = "wasm")))]
            {
                Box::new(InlineSpawner)
            }
        })
        .as_ref()
}

/// Drives each future to completion on the calling thread. Only used when no
/// async runtime feature is enabled.
#[cfg(not(any(feature = "tokio-runtime", feature = "wasm")))]
struct InlineSpawner;

#[cfg(not(any(feature = "tokio-runtime", feature = "wasm")))]
impl AsyncSpawner for InlineSpawner {
    fn spawn_boxed(
        &self,
        future: Pin<Box<dyn Future<Output = ()> + Send + 'static>>,
    ) -> Result<Box<dyn AsyncHandle>> {
        futures::executor::block_on(future);
        Ok(Box::new(Completed))
    }
}

#[cfg(not(any(feature = "tokio-runtime", feature = "wasm")))]
struct Completed;

#[cfg(not(any(feature = "tokio-runtime", feature = "wasm")))]
impl AsyncHandle for Completed {
    fn is_finished(&self) -> bool {
        true
    }

    fn cancel(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "tokio-runtime")]
    #[::tokio::test]
    async fn test_tokio_spawner() {
        let handle = spawn(async {
            ::tokio::time::sleep(::tokio::time::Duration::from_millis(10)).await;
        })
        .unwrap();

        assert!(!handle.is_finished());

        ::tokio::time::sleep(::tokio::time::Duration::from_millis(50)).await;
        assert!(handle.is_finished());
    }

    #[cfg(feature = "tokio-runtime")]
    #[test]
    fn test_spawn_without_ambient_runtime() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let _handle = spawn(async move {
            let _ = tx.send(42);
        })
        .unwrap();
        let value = rx.recv_timeout(std::time::Duration::from_secs(2)).unwrap();
        assert_eq!(value, 42);
    }
}
