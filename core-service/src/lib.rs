//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, filesystem,
//! clock) into the prefetch core and hands the UI a [`PlaybackSession`] per
//! playlist. Desktop apps enable the `desktop-shims` feature, which injects
//! the `bridge-desktop` adapters through [`CoreConfig`].

pub mod error;
pub mod session;

pub use error::{CoreError, Result};
pub use session::PlaybackSession;

#[cfg(feature = "desktop-shims")]
use std::path::PathBuf;
use std::sync::Arc;

use bridge_traits::{http::HttpClient, storage::FileSystemAccess, time::Clock};
use core_playback::Playlist;
use core_runtime::config::CoreConfig;
use core_runtime::events::{EventBus, Receiver, DEFAULT_EVENT_BUFFER_SIZE};
use core_runtime::CoreEvent;
use tracing::info;

/// Aggregated handle to all bridge dependencies the core requires.
pub struct CoreDependencies {
    pub http_client: Arc<dyn HttpClient>,
    pub filesystem: Arc<dyn FileSystemAccess>,
    pub clock: Arc<dyn Clock>,
}

impl CoreDependencies {
    /// Construct a dependency bundle from explicit bridge handles.
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        filesystem: Arc<dyn FileSystemAccess>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            http_client,
            filesystem,
            clock,
        }
    }
}

impl From<&CoreConfig> for CoreDependencies {
    fn from(config: &CoreConfig) -> Self {
        Self {
            http_client: Arc::clone(&config.http_client),
            filesystem: Arc::clone(&config.file_system),
            clock: Arc::clone(&config.clock),
        }
    }
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    config: CoreConfig,
    deps: Arc<CoreDependencies>,
    event_bus: EventBus,
}

impl CoreService {
    /// Create a new service from a validated configuration.
    pub fn new(config: CoreConfig) -> Self {
        let deps = Arc::new(CoreDependencies::from(&config));
        Self {
            config,
            deps,
            event_bus: EventBus::new(DEFAULT_EVENT_BUFFER_SIZE),
        }
    }

    /// Access the bridge dependencies being used by the service.
    pub fn dependencies(&self) -> Arc<CoreDependencies> {
        Arc::clone(&self.deps)
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Subscribe to prefetch and cache events of every session.
    pub fn subscribe_events(&self) -> Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    /// Open a session over `playlist`.
    ///
    /// Opening wipes range files left by an earlier session, so a host keeps
    /// at most one session alive per cache directory.
    pub async fn open_session(&self, playlist: Playlist) -> Result<PlaybackSession> {
        info!(items = playlist.len(), "Opening playback session");
        PlaybackSession::open(&self.config, &self.deps, self.event_bus.clone(), playlist).await
    }
}

/// Convenience bootstrapper for desktop hosts.
///
/// Uses `ReqwestHttpClient` and `TokioFileSystem`; ranges are stored below
/// `cache_dir` when given, otherwise below the platform cache directory.
///
/// ```no_run
/// # async fn example() -> core_service::Result<()> {
/// use core_service::bootstrap_desktop;
///
/// let core = bootstrap_desktop(None)?;
/// let http = core.dependencies().http_client.clone();
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "desktop-shims")]
pub fn bootstrap_desktop(cache_dir: Option<PathBuf>) -> Result<CoreService> {
    let mut builder = CoreConfig::builder();
    if let Some(dir) = cache_dir {
        builder = builder.cache_dir(dir);
    }
    let config = builder
        .build()
        .map_err(|err| CoreError::InitializationFailed(err.to_string()))?;
    Ok(CoreService::new(config))
}

/// Build a service from a caller-populated builder.
///
/// Missing bridges surface as [`CoreError::CapabilityMissing`].
pub fn bootstrap_with(builder: core_runtime::CoreConfigBuilder) -> Result<CoreService> {
    Ok(CoreService::new(builder.build()?))
}
