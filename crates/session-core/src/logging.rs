//! Tracing/logging bootstrap for binaries embedding the orchestrator.

use std::env;

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,session_core=debug,session_matrix=debug";

/// Initialize the global tracing subscriber with severity gating from environment.
///
/// Precedence:
/// 1) `RUST_LOG`
/// 2) `SESSION_LIFECYCLE_LOG`
/// 3) internal default filter
///
/// Calling it more than once is harmless; later calls are ignored.
pub fn init() {
    let env_filter = filter_from_lookup(|key| env::var(key).ok());
    let _ = tracing_subscriber::fmt()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_env_filter(env_filter)
        .try_init();
}

fn filter_from_lookup<F>(mut lookup: F) -> EnvFilter
where
    F: FnMut(&str) -> Option<String>,
{
    for key in [EnvFilter::DEFAULT_ENV, "SESSION_LIFECYCLE_LOG"] {
        if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty())
            && let Ok(filter) = EnvFilter::try_new(value)
        {
            return filter;
        }
    }

    EnvFilter::new(DEFAULT_FILTER)
}
