//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Generative client constants
pub mod client {
    /// Maximum attempts per logical call (throttling gets the full budget)
    pub const MAX_ATTEMPTS: u32 = 3;

    /// Extra attempts granted to generic transient errors
    pub const TRANSIENT_RETRIES: u32 = 1;

    /// Base backoff after a throttling signal (seconds), multiplied by the attempt index
    pub const THROTTLE_BACKOFF_SECS: u64 = 15;

    /// Backoff before the transient retry (seconds)
    pub const TRANSIENT_BACKOFF_SECS: u64 = 15;

    /// Pause after every successful call to stay under steady-state rate limits (ms)
    pub const POST_CALL_DELAY_MS: u64 = 5000;

    /// Default text model
    pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";

    /// Default media model
    pub const DEFAULT_MEDIA_MODEL: &str = "gemini-3-pro-image-preview";

    /// Default service endpoint
    pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
}

/// HTTP/Network constants
pub mod network {
    /// Default request timeout (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

    /// Connection timeout (seconds)
    pub const CONNECTION_TIMEOUT_SECS: u64 = 30;
}

/// Pipeline constants
pub mod pipeline {
    /// Worker ceiling for wave 1 (independent subcalls)
    pub const WAVE1_WORKERS: usize = 19;

    /// Worker ceiling for wave 2 (one synthesis per chapter)
    pub const WAVE2_WORKERS: usize = 7;

    /// Cached fragments at or below this size are regenerated on resume
    pub const MIN_CACHED_CHARS: usize = 50;

    /// Token the synthesis output uses between introduction and closing assessment
    pub const SYNTHESIS_SEPARATOR: &str = "---SEPARATOR---";

    /// Heading the closing assessment starts with (separator fallback)
    pub const ASSESSMENT_HEADING: &str = "### Closing Assessment";

    /// Events per step (start + complete)
    pub const EVENTS_PER_STEP: usize = 2;

    /// Slack added to the event channel bound (terminal event, wave tags)
    pub const EVENT_CHANNEL_SLACK: usize = 32;
}

/// Cache constants
pub mod cache {
    /// File extension of cached fragments
    pub const FRAGMENT_EXTENSION: &str = "md";

    /// Default cache directory (relative to the project)
    pub const DEFAULT_CACHE_DIR: &str = ".reportforge/cache";
}
