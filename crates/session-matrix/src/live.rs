use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use matrix_sdk::{
    Client,
    config::SyncSettings,
    ruma::{OwnedRoomId, events::room::message::RoomMessageEventContent},
};
use session_core::{
    LiveSession, RetryPolicy, SessionError, SessionErrorCategory, SessionIdentity, SessionNotice,
};
use tokio::{runtime::Handle, sync::broadcast, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{map_matrix_error, unknown_token};

const NOTICE_BUFFER: usize = 64;

#[derive(Debug)]
struct RunningSync {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

type AwaitedRooms = Arc<Mutex<HashSet<OwnedRoomId>>>;

/// A restored or freshly logged-in Matrix client.
pub struct MatrixLiveSession {
    client: Client,
    identity: SessionIdentity,
    notices: broadcast::Sender<SessionNotice>,
    sync: Mutex<Option<RunningSync>>,
    awaited_rooms: AwaitedRooms,
    retry_policy: RetryPolicy,
    runtime: Handle,
}

impl MatrixLiveSession {
    /// Wrap an authenticated client. Must be called inside a tokio runtime.
    pub fn new(client: Client) -> Result<Self, SessionError> {
        let user_id = client.user_id().ok_or_else(|| {
            SessionError::new(
                SessionErrorCategory::Auth,
                "session_unavailable",
                "matrix client has no authenticated user",
            )
        })?;
        let identity = SessionIdentity {
            user_id: user_id.to_string(),
            homeserver: client.homeserver().to_string(),
            device_id: client.device_id().map(ToString::to_string),
            display_name: None,
        };
        let (notices, _) = broadcast::channel(NOTICE_BUFFER);

        Ok(Self {
            client,
            identity,
            notices,
            sync: Mutex::new(None),
            awaited_rooms: Arc::new(Mutex::new(HashSet::new())),
            retry_policy: RetryPolicy::default(),
            runtime: Handle::current(),
        })
    }
}

/// Drop every awaited room the client now knows about.
fn resolve_awaited_rooms(client: &Client, awaited: &AwaitedRooms) {
    let mut awaited = awaited.lock().unwrap_or_else(PoisonError::into_inner);
    awaited.retain(|room_id| {
        let known = client.get_room(room_id).is_some();
        if known {
            debug!(room_id = %room_id, "awaited room membership settled");
        }
        !known
    });
}

async fn run_sync_loop(
    client: Client,
    notices: broadcast::Sender<SessionNotice>,
    awaited: AwaitedRooms,
    retry_policy: RetryPolicy,
    stop: CancellationToken,
) {
    let mut attempt: u32 = 0;
    let mut settings = SyncSettings::default();
    info!("sync loop started");

    loop {
        let result = tokio::select! {
            _ = stop.cancelled() => break,
            result = client.sync_once(settings.clone()) => result,
        };

        match result {
            Ok(response) => {
                attempt = 0;
                settings = settings.token(response.next_batch);
                resolve_awaited_rooms(&client, &awaited);
                let _ = notices.send(SessionNotice::SyncUpdate);
            }
            Err(err) => {
                if let Some(is_soft) = unknown_token(&err) {
                    warn!(is_soft, "access token rejected, stopping sync");
                    let _ = notices.send(SessionNotice::AuthError { is_soft });
                    break;
                }

                let mapped = map_matrix_error(err);
                if !mapped.is_recoverable() {
                    warn!(code = %mapped.code, error = %mapped.message, "sync failed permanently");
                    break;
                }

                let delay = retry_policy.delay_for_attempt(attempt, mapped.retry_after());
                attempt = attempt.saturating_add(1);
                debug!(
                    code = %mapped.code,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "sync failed, backing off"
                );
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
    info!("sync loop stopped");
}

#[async_trait]
impl LiveSession for MatrixLiveSession {
    fn identity(&self) -> SessionIdentity {
        self.identity.clone()
    }

    fn start_sync(&self) {
        let mut sync = self.sync.lock().unwrap_or_else(PoisonError::into_inner);
        if sync
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
        {
            debug!("sync already running");
            return;
        }

        let stop = CancellationToken::new();
        let task = self.runtime.spawn(run_sync_loop(
            self.client.clone(),
            self.notices.clone(),
            Arc::clone(&self.awaited_rooms),
            self.retry_policy,
            stop.clone(),
        ));
        *sync = Some(RunningSync { stop, task });
    }

    async fn stop_sync(&self) {
        let running = self
            .sync
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(running) = running else {
            return;
        };
        running.stop.cancel();
        if let Err(err) = running.task.await {
            warn!(error = %err, "sync task ended abnormally");
        }
    }

    async fn logout(&self) -> Result<(), SessionError> {
        self.client.logout().await.map_err(map_matrix_error)
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionNotice> {
        self.notices.subscribe()
    }

    fn await_room_memberships(&self, room_ids: HashSet<String>) {
        {
            let mut awaited = self
                .awaited_rooms
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            for raw in room_ids {
                match raw.parse::<OwnedRoomId>() {
                    Ok(room_id) => {
                        awaited.insert(room_id);
                    }
                    Err(err) => warn!(room_id = %raw, error = %err, "ignoring invalid room id"),
                }
            }
        }
        resolve_awaited_rooms(&self.client, &self.awaited_rooms);
    }

    async fn send_text(&self, room_id: &str, body: &str) -> Result<(), SessionError> {
        let parsed = room_id.parse::<OwnedRoomId>().map_err(|err| {
            SessionError::new(
                SessionErrorCategory::Config,
                "invalid_room_id",
                format!("invalid room id '{room_id}': {err}"),
            )
        })?;
        let room = self.client.get_room(&parsed).ok_or_else(|| {
            SessionError::new(
                SessionErrorCategory::Config,
                "room_not_found",
                format!("room not found: {room_id}"),
            )
        })?;

        room.send(RoomMessageEventContent::text_plain(body))
            .await
            .map(|_| ())
            .map_err(map_matrix_error)
    }

    fn set_send_queue_enabled(&self, enabled: bool) {
        let client = self.client.clone();
        self.runtime.spawn(async move {
            client.send_queue().set_enabled(enabled).await;
            debug!(enabled, "send queue toggled");
        });
    }
}
