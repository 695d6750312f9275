use serde::{Deserialize, Serialize};

use crate::state_machine::{SessionEvent, SessionState};

/// Navigation target inside the signed-in UI flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Route {
    /// The room list / home screen.
    RoomList,
    /// A room by ID, with optional routing servers.
    Room {
        /// Matrix room ID.
        room_id: String,
        /// Servers to route a join through.
        via: Vec<String>,
    },
    /// A room by alias.
    RoomAlias {
        /// Room alias, for example `#room:example.org`.
        alias: String,
    },
    /// A single event inside a room.
    Event {
        /// Event ID.
        event_id: String,
        /// Room containing the event.
        room_id: String,
        /// Servers to route a join through.
        via: Vec<String>,
    },
    /// A user profile.
    UserProfile {
        /// Matrix user ID.
        user_id: String,
    },
    /// A call in a room.
    Call {
        /// Matrix room ID.
        room_id: String,
    },
    /// Application settings.
    Settings,
}

impl Route {
    /// Room route without routing servers.
    pub fn room(room_id: impl Into<String>) -> Self {
        Self::Room {
            room_id: room_id.into(),
            via: Vec::new(),
        }
    }
}

/// Text composed in a notification reply action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InlineReply {
    /// Target room ID.
    pub room_id: String,
    /// Message body.
    pub body: String,
}

/// Read-only identity snapshot of a live session, used to pre-fill soft logout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionIdentity {
    /// Matrix user ID.
    pub user_id: String,
    /// Homeserver base URL.
    pub homeserver: String,
    /// Device ID when known.
    pub device_id: Option<String>,
    /// Display name when known.
    pub display_name: Option<String>,
}

/// Notices published by a live session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionNotice {
    /// The homeserver rejected the session's access token.
    AuthError {
        /// `true` when local data may be kept for re-authentication.
        is_soft: bool,
    },
    /// One sync round completed.
    SyncUpdate,
}

/// Foreground state reported by the host platform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AppState {
    /// In the foreground and receiving input.
    Active,
    /// Visible but not receiving input, for example while transitioning.
    Inactive,
    /// Not visible.
    Background,
}

/// Presentation style of a user indicator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum IndicatorKind {
    /// Transient, non-blocking message.
    Toast,
    /// Blocking progress overlay.
    Modal,
}

/// Toast or progress overlay submitted to the user-indicator collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserIndicator {
    /// Identifier used to retract the indicator.
    pub id: String,
    /// Presentation style.
    pub kind: IndicatorKind,
    /// Displayed title.
    pub title: String,
    /// Persistent indicators stay until retracted.
    pub persistent: bool,
}

/// Events broadcast by the orchestrator to observers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A transition table row was applied.
    StateChanged {
        /// State before the event.
        from: SessionState,
        /// Event that was applied.
        event: SessionEvent,
        /// State after the event.
        to: SessionState,
    },
    /// An event had no row in the transition table (release builds only).
    TransitionRejected {
        /// State the machine stayed in.
        state: SessionState,
        /// Rejected event.
        event: SessionEvent,
    },
    /// A route was handed to the UI flow.
    RouteDelivered {
        /// Delivered route.
        route: Route,
        /// `true` when the route was replayed from the deferred store.
        deferred: bool,
    },
}
