//! Synchronization primitives.
//!
//! All primitives are async-aware (`tokio::sync`) and `Send + Sync`, so they can
//! be held across `.await` points and shared between spawned tasks.
//!
//! `CancellationToken` comes from `tokio_util` and is the cooperative
//! cancellation signal threaded through every suspending fetch operation.
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::{watch, Mutex};
//!
//! async fn example() {
//!     let mutex = Mutex::new(42);
//!     *mutex.lock().await += 1;
//!
//!     let (tx, mut rx) = watch::channel("pending");
//!     tx.send("done").ok();
//!     rx.changed().await.ok();
//!     assert_eq!(*rx.borrow(), "done");
//! }
//! ```

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, Mutex, MutexGuard, Notify, OwnedSemaphorePermit, RwLock,
    RwLockReadGuard, RwLockWriteGuard, Semaphore, SemaphorePermit,
};

pub use tokio_util::sync::{CancellationToken, DropGuard, WaitForCancellationFuture};
