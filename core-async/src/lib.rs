//! Async runtime facade for the feed prefetch core.
//!
//! Every core-* and bridge-* crate reaches Tokio through this crate instead of
//! depending on it directly, so the executor surface the core relies on is
//! spelled out in one place.
//!
//! # Modules
//!
//! - `task`: task spawning and join handles
//! - `time`: sleep, timeouts and instants
//! - `sync`: locks, channels, semaphores and cancellation tokens
//! - `io`: async read/write traits used by streaming bodies
//! - `runtime`: runtime construction for hosts that own no executor
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::CancellationToken;
//! use core_async::task;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let token = CancellationToken::new();
//!     let child = token.clone();
//!     let handle = task::spawn(async move {
//!         core_async::select! {
//!             _ = child.cancelled() => None,
//!             _ = sleep(Duration::from_secs(1)) => Some(42),
//!         }
//!     });
//!     token.cancel();
//!     assert_eq!(handle.await.ok().flatten(), None);
//! }
//! ```

pub mod io;
pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use task::spawn;
pub use tokio::select;
pub use time::{sleep, Duration, Instant};
