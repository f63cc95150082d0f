//! Structured debug logging setup

use std::sync::OnceLock;
use tracing::debug;
use tracing_subscriber::EnvFilter;

static INSTALLED: OnceLock<bool> = OnceLock::new();

/// Installs the global `tracing` subscriber
#[derive(Debug, Clone, Default)]
pub struct DebugLogger {
    debug: bool,
    directives: Option<String>,
}

impl DebugLogger {
    /// Create a logger at `info` level
    pub fn new() -> Self {
        Self::default()
    }

    /// Log at `debug` level instead of `info`
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Use explicit filter directives, e.g. `facelens_media=debug`
    pub fn with_directives(mut self, directives: &str) -> Self {
        self.directives = Some(directives.to_string());
        self
    }

    /// Filter this logger would install
    ///
    /// `RUST_LOG` wins over the configured level when set.
    pub fn filter(&self) -> EnvFilter {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return filter;
        }
        match &self.directives {
            Some(directives) => EnvFilter::new(directives),
            None if self.debug => EnvFilter::new("debug"),
            None => EnvFilter::new("info"),
        }
    }

    /// Install the subscriber. Later calls are no-ops.
    ///
    /// Returns whether this process-wide subscriber was installed by
    /// FaceLens; `false` means another subscriber was already in place.
    pub fn init(&self) -> bool {
        *INSTALLED.get_or_init(|| {
            let installed = tracing_subscriber::fmt()
                .with_env_filter(self.filter())
                .try_init()
                .is_ok();
            if !installed {
                debug!("A global tracing subscriber is already installed");
            }
            installed
        })
    }
}

/// Initialize logging at `info`, or `debug` when `debug` is set
pub fn init_logging(debug: bool) -> bool {
    DebugLogger::new().with_debug(debug).init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let first = init_logging(true);
        let second = init_logging(false);
        assert_eq!(first, second);
    }
}
