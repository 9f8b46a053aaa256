//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the prefetch core:
//! - Logging and tracing setup (`logging`)
//! - Validated configuration with desktop defaults (`config`)
//! - Event bus for prefetch and cache notifications (`events`)

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder};
pub use error::{Error, Result};
pub use events::{CacheEvent, CoreEvent, EventBus, PrefetchEvent};
