//! Task spawning.
//!
//! Spawned tasks run on the ambient Tokio runtime and may move between worker
//! threads, so futures must be `Send + 'static`.

pub use tokio::task::{spawn_blocking, yield_now, JoinError, JoinHandle, JoinSet};

/// Spawns a future onto the current Tokio runtime.
///
/// Must be called from within a runtime context; the returned handle can be
/// awaited for the task's output or aborted.
///
/// ```rust
/// use core_async::task::spawn;
///
/// # async fn example() {
/// let handle = spawn(async { 42 });
/// assert_eq!(handle.await.ok(), Some(42));
/// # }
/// ```
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::task::spawn(future)
}
