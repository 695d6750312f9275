//! Pure session lifecycle transition table.
//!
//! [`transition`] maps a `(state, event)` pair onto the [`Transition`] row it
//! matches. Handlers dispatch on `Transition` with an exhaustive `match`, so a
//! missing handler is a compile error rather than a runtime default case.

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::TransitionError;

/// Top-level session state. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Process just started, nothing decided yet.
    Initial,
    /// No credentials; the authentication flow owns the screen.
    SignedOut,
    /// Attempting to resume a previously stored session.
    RestoringSession,
    /// Stored sessions exist but the mandatory app lock has not been set up.
    MandatoryAppLockSetup,
    /// A live session exists and owns the screen.
    SignedIn,
    /// Credentials were invalidated server-side; local data is retained.
    SoftLogout,
    /// Teardown work is running.
    SigningOut {
        is_soft: bool,
        disable_app_lock: bool,
    },
}

impl SessionState {
    /// States in which the orchestrator is expected to own a live session.
    pub fn holds_live_session(self) -> bool {
        matches!(
            self,
            Self::SignedIn | Self::SoftLogout | Self::SigningOut { .. }
        )
    }
}

/// Inputs accepted by the state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SessionEvent {
    StartWithAuthentication,
    StartWithExistingSession,
    StartWithAppLockSetup,
    AppLockSetupComplete,
    FailedRestoringSession,
    CreatedUserSession,
    SignOut {
        is_soft: bool,
        disable_app_lock: bool,
    },
    ShowSoftLogout,
    CompletedSigningOut,
    ClearCache,
}

/// A matched row of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// `Initial --StartWithAuthentication--> SignedOut`
    StartAuthentication,
    /// `Initial --StartWithAppLockSetup--> MandatoryAppLockSetup`
    StartAppLockSetup,
    /// `Initial --StartWithExistingSession--> RestoringSession` and
    /// `MandatoryAppLockSetup --AppLockSetupComplete--> RestoringSession`
    RestoreSession,
    /// `RestoringSession --FailedRestoringSession--> SignedOut`
    RestoreFailed,
    /// `{RestoringSession, SignedOut, SoftLogout} --CreatedUserSession--> SignedIn`
    SignIn { is_new_login: bool },
    /// `any except SigningOut --SignOut--> SigningOut`
    BeginSignOut { is_soft: bool, disable_app_lock: bool },
    /// `SigningOut --SignOut--> SigningOut`, keeping the first flags.
    IgnoreSignOut { is_soft: bool, disable_app_lock: bool },
    /// `SigningOut{is_soft: false} --CompletedSigningOut--> SignedOut`
    CompleteSignOut { disable_app_lock: bool },
    /// `SigningOut{is_soft: true} --ShowSoftLogout--> SoftLogout`
    ShowSoftLogout { disable_app_lock: bool },
    /// `SignedIn --ClearCache--> Initial`
    ClearCache,
}

impl Transition {
    /// State the machine is in after this row is applied.
    pub fn target(self) -> SessionState {
        match self {
            Self::StartAuthentication | Self::RestoreFailed | Self::CompleteSignOut { .. } => {
                SessionState::SignedOut
            }
            Self::StartAppLockSetup => SessionState::MandatoryAppLockSetup,
            Self::RestoreSession => SessionState::RestoringSession,
            Self::SignIn { .. } => SessionState::SignedIn,
            Self::BeginSignOut {
                is_soft,
                disable_app_lock,
            }
            | Self::IgnoreSignOut {
                is_soft,
                disable_app_lock,
            } => SessionState::SigningOut {
                is_soft,
                disable_app_lock,
            },
            Self::ShowSoftLogout { .. } => SessionState::SoftLogout,
            Self::ClearCache => SessionState::Initial,
        }
    }
}

/// Look up the transition table row for `(state, event)`.
pub fn transition(state: SessionState, event: SessionEvent) -> Result<Transition, TransitionError> {
    use SessionEvent as E;
    use SessionState as S;

    let row = match (state, event) {
        (S::Initial, E::StartWithAuthentication) => Transition::StartAuthentication,
        (S::Initial, E::StartWithExistingSession) => Transition::RestoreSession,
        (S::Initial, E::StartWithAppLockSetup) => Transition::StartAppLockSetup,
        (S::MandatoryAppLockSetup, E::AppLockSetupComplete) => Transition::RestoreSession,
        (S::RestoringSession, E::CreatedUserSession) => Transition::SignIn {
            is_new_login: false,
        },
        (S::RestoringSession, E::FailedRestoringSession) => Transition::RestoreFailed,
        (S::SignedOut | S::SoftLogout, E::CreatedUserSession) => Transition::SignIn {
            is_new_login: true,
        },
        (
            S::SigningOut {
                is_soft,
                disable_app_lock,
            },
            E::SignOut { .. },
        ) => Transition::IgnoreSignOut {
            is_soft,
            disable_app_lock,
        },
        (
            _,
            E::SignOut {
                is_soft,
                disable_app_lock,
            },
        ) => Transition::BeginSignOut {
            is_soft,
            disable_app_lock,
        },
        (
            S::SigningOut {
                is_soft: false,
                disable_app_lock,
            },
            E::CompletedSigningOut,
        ) => Transition::CompleteSignOut { disable_app_lock },
        (
            S::SigningOut {
                is_soft: true,
                disable_app_lock,
            },
            E::ShowSoftLogout,
        ) => Transition::ShowSoftLogout { disable_app_lock },
        (S::SignedIn, E::ClearCache) => Transition::ClearCache,
        _ => return Err(TransitionError { state, event }),
    };

    Ok(row)
}

/// Stateful wrapper around [`transition`].
#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    state: SessionState,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self {
            state: SessionState::Initial,
        }
    }
}

impl SessionStateMachine {
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Check that `event` is legal without moving the machine.
    pub fn validate(&self, event: SessionEvent) -> Result<Transition, TransitionError> {
        transition(self.state, event)
    }

    /// Move the machine to the target of a previously validated row.
    pub fn commit(&mut self, row: Transition) {
        self.state = row.target();
    }

    /// Validate and commit in one step.
    pub fn process(&mut self, event: SessionEvent) -> Result<Transition, TransitionError> {
        let row = self.validate(event)?;
        self.commit(row);
        Ok(row)
    }

    /// Like [`Self::process`], but treats a missing row as fatal.
    ///
    /// Debug builds panic. Release builds log the violation and leave the
    /// state untouched.
    pub fn process_or_report(&mut self, event: SessionEvent) -> Option<Transition> {
        match self.process(event) {
            Ok(row) => Some(row),
            Err(err) => {
                report_unhandled_transition(err);
                None
            }
        }
    }
}

/// Fatal handling for a `(state, event)` pair outside the table.
pub fn report_unhandled_transition(err: TransitionError) {
    error!(state = ?err.state, event = ?err.event, "unhandled session transition");
    if cfg!(debug_assertions) {
        panic!("unhandled session transition: {err}");
    }
}
