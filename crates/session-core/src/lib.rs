//! Session lifecycle core shared by the platform and Matrix adapters.
//!
//! This crate defines the session state machine, deferred user intents, the
//! background sync scheduler, the orchestrator runtime that ties them
//! together, and the collaborator contracts it drives.

/// Background-task and periodic refresh scheduling.
pub mod background;
/// Orchestrator channel primitives.
pub mod channel;
/// Environment-backed orchestrator configuration.
pub mod config;
/// One-shot storage for intents that arrive before a session exists.
pub mod deferred;
/// Stable error types and HTTP classification helpers.
pub mod error;
/// Tracing subscriber bootstrap.
pub mod logging;
/// The orchestrator task and its handle.
pub mod orchestrator;
/// Backoff policy used by retry loops.
pub mod retry;
/// Collaborator traits.
pub mod services;
/// Session lifecycle transition table.
pub mod state_machine;
/// Routes, identities, notices and lifecycle events.
pub mod types;
/// Application version parsing and ordering.
pub mod version;

#[cfg(test)]
mod testing;

pub use background::BackgroundSyncScheduler;
pub use channel::{EventStream, LifecycleChannelError};
pub use config::{ConfigError, OrchestratorConfig};
pub use deferred::{Consumable, DeferredIntents, PendingIntents};
pub use error::{
    PlatformError, SessionError, SessionErrorCategory, TransitionError, classify_http_status,
};
pub use orchestrator::{Collaborators, OrchestratorHandle, spawn_orchestrator};
pub use retry::RetryPolicy;
pub use services::{
    AppLock, BackgroundTaskId, BackgroundTaskPlatform, ExpirationHandler, LiveSession,
    NotificationCenter, RefreshCompletion, RefreshLauncher, RefreshTask, SessionSettings,
    SessionStore, UiFlow, UserIndicators,
};
pub use state_machine::{SessionEvent, SessionState, SessionStateMachine, Transition, transition};
pub use types::{
    AppState, IndicatorKind, InlineReply, LifecycleEvent, Route, SessionIdentity, SessionNotice,
    UserIndicator,
};
pub use version::{AppVersion, ParseVersionError};
