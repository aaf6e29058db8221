//! Runtime configuration for the session and the resolver.
//!
//! Library callers build these directly; the binary fills them from CLI
//! flags and environment variables.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";
pub const DEFAULT_USER_AGENT: &str = concat!("Meetpoint/", env!("CARGO_PKG_VERSION"), " (meeting-point-engine)");

/// Pause between two network-bound forward lookups.
pub const DEFAULT_PACING: Duration = Duration::from_millis(300);

/// How the session drives its resolution queue.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub pacing: Duration,
    /// Capacity of the presentation event channel.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pacing: DEFAULT_PACING,
            event_capacity: 256,
        }
    }
}

/// Nominatim endpoint settings.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub base_url: String,
    /// Sent on every request; Nominatim's usage policy requires one.
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_NOMINATIM_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Default snapshot directory (~/.meetpoint).
pub fn default_store_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".meetpoint")
}
