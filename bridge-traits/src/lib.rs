//! # Host Bridge Traits
//!
//! Capability traits the prefetch core needs from its host platform.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - streaming HTTP with byte-range requests
//! - [`FileSystemAccess`](storage::FileSystemAccess) - file I/O under the cache directory
//! - [`Clock`](time::Clock) - injectable time source, drives cache recency
//! - [`LoggerSink`](time::LoggerSink) - forwards structured logs to the host
//!
//! Desktop adapters live in `bridge-desktop`. Other hosts inject their own
//! implementations through `core_runtime::config::CoreConfig`, and the core
//! fails fast with a descriptive error when a required capability is missing.
//!
//! All bridge traits are `Send + Sync` so a single adapter can be shared by
//! every prefetch task.
//!
//! ## Errors
//!
//! Implementations convert platform failures into
//! [`BridgeError`](error::BridgeError). Timeouts get their own variant so the
//! core can classify them as transient network failures.
//!
//! ## Example
//!
//! ```ignore
//! use bridge_traits::http::{HttpClient, HttpRequest};
//!
//! async fn first_kilobyte(client: &dyn HttpClient, url: &str) -> bridge_traits::error::Result<u16> {
//!     let response = client.execute_streaming(HttpRequest::get(url).range(0, 1024)).await?;
//!     Ok(response.status)
//! }
//! ```

pub mod error;
pub mod http;
pub mod storage;
pub mod time;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use error::BridgeError;

pub use http::{ContentRange, DynAsyncRead, HttpClient, HttpMethod, HttpRequest, StreamingResponse};
pub use storage::{FileMetadata, FileSystemAccess};
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, SystemClock};
