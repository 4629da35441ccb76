//! Log routing.
//!
//! Everything is logged through the `log` facade. Messages that concern a
//! particular client are additionally routed to that client's sink (only in
//! diagnostic builds) and, when the process-wide mirror flag is set, echoed to
//! stdout regardless of sinks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::handle::ClientId;

/// Per-client log sink.
pub type LoggerSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Whether client sinks are invoked in this build.
pub const DIAGNOSTICS_ENABLED: bool = cfg!(any(debug_assertions, feature = "diagnostics"));

/// Installs `env_logger` as the global logger.
///
/// Safe to call more than once; later calls are ignored.
#[cfg(not(target_arch = "wasm32"))]
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .is_test(cfg!(test))
        .try_init();
}

/// Routes client-scoped messages to the facade, the client sink and stdout.
#[derive(Debug, Default)]
pub struct LogRouter {
    mirror_to_stdout: AtomicBool,
}

impl LogRouter {
    /// Creates a router with the given stdout mirroring state.
    pub fn new(mirror_to_stdout: bool) -> Self {
        Self {
            mirror_to_stdout: AtomicBool::new(mirror_to_stdout),
        }
    }

    /// Enables or disables stdout mirroring for every client.
    pub fn set_mirror_to_stdout(&self, enabled: bool) {
        self.mirror_to_stdout.store(enabled, Ordering::Relaxed);
    }

    /// Whether stdout mirroring is on.
    pub fn mirrors_to_stdout(&self) -> bool {
        self.mirror_to_stdout.load(Ordering::Relaxed)
    }

    /// Emits `message` for `client`.
    pub fn route(
        &self,
        client: ClientId,
        sink: Option<&LoggerSink>,
        level: log::Level,
        message: &str,
    ) {
        log::log!(level, "[{client}] {message}");
        if self.mirrors_to_stdout() {
            println!("[{client}] {message}");
        }
        if DIAGNOSTICS_ENABLED {
            if let Some(sink) = sink {
                sink(message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_sink_receives_messages() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink: LoggerSink = {
            let seen = Arc::clone(&seen);
            Arc::new(move |msg: &str| seen.lock().push(msg.to_string()))
        };

        let router = LogRouter::new(false);
        router.route(ClientId(3), Some(&sink), log::Level::Warn, "hello");
        router.route(ClientId(3), None, log::Level::Warn, "dropped");

        if DIAGNOSTICS_ENABLED {
            assert_eq!(*seen.lock(), vec!["hello".to_string()]);
        } else {
            assert!(seen.lock().is_empty());
        }
    }

    #[test]
    fn test_mirror_toggle() {
        let router = LogRouter::new(false);
        assert!(!router.mirrors_to_stdout());
        router.set_mirror_to_stdout(true);
        assert!(router.mirrors_to_stdout());
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        init_logging();
    }
}
