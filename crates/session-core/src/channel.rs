use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};

use crate::{orchestrator::Trigger, state_machine::SessionState, types::LifecycleEvent};

/// Broadcast event stream type used by lifecycle observers.
pub type EventStream = broadcast::Receiver<LifecycleEvent>;

/// Errors returned by orchestrator channel operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleChannelError {
    /// The orchestrator task is gone.
    #[error("orchestrator command channel is closed")]
    CommandChannelClosed,
}

/// Trigger queue, event fan-out and current-state cell of one orchestrator.
#[derive(Clone, Debug)]
pub(crate) struct LifecycleChannels {
    command_tx: mpsc::Sender<Trigger>,
    event_tx: broadcast::Sender<LifecycleEvent>,
    state_tx: Arc<watch::Sender<SessionState>>,
}

impl LifecycleChannels {
    /// Create a new channel set and return it with the trigger receiver.
    pub(crate) fn new(
        command_buffer: usize,
        event_buffer: usize,
    ) -> (Self, mpsc::Receiver<Trigger>) {
        let (command_tx, command_rx) = mpsc::channel(command_buffer.max(1));
        let (event_tx, _) = broadcast::channel(event_buffer.max(1));
        let (state_tx, _) = watch::channel(SessionState::Initial);

        (
            Self {
                command_tx,
                event_tx,
                state_tx: Arc::new(state_tx),
            },
            command_rx,
        )
    }

    pub(crate) fn command_sender(&self) -> mpsc::Sender<Trigger> {
        self.command_tx.clone()
    }

    pub(crate) fn subscribe(&self) -> EventStream {
        self.event_tx.subscribe()
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    pub(crate) fn state_receiver(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Queue one trigger for the orchestrator.
    pub(crate) async fn send(&self, trigger: Trigger) -> Result<(), LifecycleChannelError> {
        self.command_tx
            .send(trigger)
            .await
            .map_err(|_| LifecycleChannelError::CommandChannelClosed)
    }

    /// Emit an event to all subscribers.
    ///
    /// Emission is best-effort; lagged subscribers are handled by `broadcast`.
    pub(crate) fn emit(&self, event: LifecycleEvent) {
        let _ = self.event_tx.send(event);
    }

    pub(crate) fn publish_state(&self, state: SessionState) {
        self.state_tx.send_replace(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::SessionEvent;

    #[tokio::test]
    async fn sends_triggers_to_receiver() {
        let (channels, mut rx) = LifecycleChannels::new(8, 8);
        channels
            .send(Trigger::Start)
            .await
            .expect("trigger send should work");

        let trigger = rx.recv().await.expect("receiver should have a trigger");
        assert_eq!(trigger.kind(), "start");
    }

    #[tokio::test]
    async fn send_fails_once_receiver_is_dropped() {
        let (channels, rx) = LifecycleChannels::new(1, 1);
        drop(rx);
        assert_eq!(
            channels.send(Trigger::ClearCache).await,
            Err(LifecycleChannelError::CommandChannelClosed)
        );
    }

    #[tokio::test]
    async fn fans_out_events_to_subscribers() {
        let (channels, _) = LifecycleChannels::new(4, 16);
        let mut a = channels.subscribe();
        let mut b = channels.subscribe();

        channels.emit(LifecycleEvent::StateChanged {
            from: SessionState::Initial,
            event: SessionEvent::StartWithAuthentication,
            to: SessionState::SignedOut,
        });

        let event_a = a.recv().await.expect("subscriber a should receive event");
        let event_b = b.recv().await.expect("subscriber b should receive event");
        assert_eq!(event_a, event_b);
    }

    #[tokio::test]
    async fn publishes_current_state() {
        let (channels, _) = LifecycleChannels::new(4, 4);
        let mut rx = channels.state_receiver();
        assert_eq!(channels.state(), SessionState::Initial);

        channels.publish_state(SessionState::SignedOut);

        rx.changed().await.expect("state sender alive");
        assert_eq!(*rx.borrow(), SessionState::SignedOut);
        assert_eq!(channels.state(), SessionState::SignedOut);
    }
}
