use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::gateway::{PeerHints, RoomGateway};
use game_core::ThreadRngDice;
use game_types::{GameAction, GameError, GameState, Room, RoomReply};

/// Taps within this window collapse into one SET_HOLD_BATCH call.
const HOLD_DEBOUNCE: Duration = Duration::from_millis(250);

/// Poll cadence: tight on my turn while pushes are degraded, relaxed when
/// waiting, slow heartbeat when pushes are healthy.
const POLL_MY_TURN: Duration = Duration::from_millis(1_500);
const POLL_WAITING: Duration = Duration::from_millis(2_500);
const POLL_HEALTHY: Duration = Duration::from_secs(10);
const POLL_BACKOFF_CAP: Duration = Duration::from_secs(30);

const ACTION_QUEUE_CAPACITY: usize = 32;

/// What the coordinator surfaces to the UI layer.
#[derive(Debug)]
pub enum SyncEvent {
    /// Authoritative room adopted (action reply or reconcile pull).
    RoomReplaced(Box<Room>),
    /// Optimistic local state, rendered ahead of the server reply.
    StateApplied(Box<GameState>),
    /// Server rejected an action; local state was rolled back.
    ActionFailed(GameError),
    /// The room no longer exists; return to the lobby.
    RoomDismissed,
}

type Rollback = Box<dyn FnOnce(&mut SyncState) + Send>;

/// Everything guarded by the one coordinator lock. Never held across an
/// await.
struct SyncState {
    room: Option<Room>,
    local_version: i64,
    /// Millis of the last authoritative adoption, the staleness fallback
    /// for version-less notices.
    last_sync_at_ms: i64,
    /// While an optimistic action is in flight, remote versions at or
    /// below this are our own echo and must not clobber the local state.
    expected_version_min: Option<i64>,
    rollbacks: Vec<Rollback>,
    my_seat_index: i32,
}

impl SyncState {
    fn adopt(&mut self, room: Room, seat_index: Option<i32>) {
        self.local_version = room.game_version;
        self.last_sync_at_ms = parse_ms(&room.updated_at).unwrap_or_else(now_ms);
        self.room = Some(room);
        self.expected_version_min = None;
        self.rollbacks.clear();
        if let Some(idx) = seat_index {
            self.my_seat_index = idx;
        }
    }

    fn roll_back(&mut self) {
        while let Some(rollback) = self.rollbacks.pop() {
            rollback(self);
        }
        self.expected_version_min = None;
    }

    fn is_my_turn(&self) -> bool {
        self.room
            .as_ref()
            .and_then(|r| r.game_state.as_ref())
            .map(|s| s.current_player_index as i32 == self.my_seat_index)
            .unwrap_or(false)
    }
}

struct Shared {
    room_id: String,
    client_id: String,
    gateway: Arc<dyn RoomGateway>,
    hints: Arc<dyn PeerHints>,
    events: mpsc::UnboundedSender<SyncEvent>,
    state: Mutex<SyncState>,
    /// Wakes the poll loop for an immediate reconcile pull.
    refresh: Notify,
    push_healthy: AtomicBool,
    hold_generation: AtomicU64,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn parse_ms(rfc3339: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc3339(rfc3339)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

/// One per joined room: serializes local actions, renders optimistically,
/// reconciles against pushes and polls, and never lets a stale frame
/// overwrite a newer one.
pub struct SyncCoordinator {
    shared: Arc<Shared>,
    action_tx: mpsc::Sender<GameAction>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncCoordinator {
    pub fn new(
        room_id: impl Into<String>,
        client_id: impl Into<String>,
        initial: RoomReply,
        gateway: Arc<dyn RoomGateway>,
        hints: Arc<dyn PeerHints>,
    ) -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (action_tx, action_rx) = mpsc::channel(ACTION_QUEUE_CAPACITY);

        let mut state = SyncState {
            room: None,
            local_version: 0,
            last_sync_at_ms: 0,
            expected_version_min: None,
            rollbacks: Vec::new(),
            my_seat_index: initial.self_info.seat_index,
        };
        state.adopt(initial.room, Some(initial.self_info.seat_index));

        let shared = Arc::new(Shared {
            room_id: room_id.into(),
            client_id: client_id.into(),
            gateway,
            hints,
            events: event_tx,
            state: Mutex::new(state),
            refresh: Notify::new(),
            push_healthy: AtomicBool::new(false),
            hold_generation: AtomicU64::new(0),
        });

        let worker = tokio::spawn(run_action_worker(shared.clone(), action_rx));
        let poller = tokio::spawn(run_poll_loop(shared.clone()));

        (
            Self {
                shared,
                action_tx,
                tasks: Mutex::new(vec![worker, poller]),
            },
            event_rx,
        )
    }

    /// Queues an action behind any already-pending ones. Dropping on a full
    /// queue beats wedging the UI thread.
    pub fn submit(&self, action: GameAction) {
        if let Err(e) = self.action_tx.try_send(action) {
            warn!("dropping queued action: {}", e);
        }
    }

    /// A hold tap: flip the die locally right away, tell the peer, and
    /// settle with the server once the tapping pauses.
    pub fn tap_hold(&self, index: usize) {
        let held = {
            let mut st = self.shared.state.lock().unwrap();
            let Some(state) = st.room.as_mut().and_then(|r| r.game_state.as_mut()) else {
                return;
            };
            if index >= state.turn.held.len() {
                return;
            }
            state.turn.held[index] = !state.turn.held[index];
            let snapshot = state.clone();
            let held = state.turn.held;
            // A rejected flush must undo every tap, not just the batch.
            st.rollbacks.push(Box::new(move |st: &mut SyncState| {
                if let Some(state) = st.room.as_mut().and_then(|r| r.game_state.as_mut()) {
                    state.turn.held[index] = !state.turn.held[index];
                }
            }));
            let _ = self
                .shared
                .events
                .send(SyncEvent::StateApplied(Box::new(snapshot)));
            held
        };

        self.shared.hints.send_hint(
            &self.shared.room_id,
            "HOLD_PREVIEW",
            Some(json!({ "held": held })),
        );

        // Only the newest tap's timer is allowed to flush.
        let generation = self.shared.hold_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let shared = self.shared.clone();
        let action_tx = self.action_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(HOLD_DEBOUNCE).await;
            if shared.hold_generation.load(Ordering::SeqCst) != generation {
                return;
            }
            let held = {
                let st = shared.state.lock().unwrap();
                st.room
                    .as_ref()
                    .and_then(|r| r.game_state.as_ref())
                    .map(|s| s.turn.held.to_vec())
            };
            if let Some(held) = held {
                if let Err(e) = action_tx.try_send(GameAction::SetHoldBatch { held }) {
                    warn!("dropping hold flush: {}", e);
                }
            }
        });
    }

    /// Feed of `roomUpdated` pushes from the relay subscription.
    pub fn handle_room_updated(
        &self,
        version: Option<i64>,
        updated_at: Option<i64>,
        state: Option<GameState>,
    ) {
        let needs_pull = {
            let mut st = self.shared.state.lock().unwrap();
            match version {
                Some(v) if v <= st.local_version => {
                    debug!(v, local = st.local_version, "discarding stale push");
                    false
                }
                Some(v)
                    if st
                        .expected_version_min
                        .is_some_and(|guard| v <= guard) =>
                {
                    // Our own action echoing back while its reply is in
                    // flight.
                    false
                }
                Some(v) => match state {
                    Some(next) => {
                        if let Some(room) = st.room.as_mut() {
                            room.game_state = Some(next.clone());
                            room.game_version = v;
                            st.local_version = v;
                            if let Some(ts) = updated_at {
                                st.last_sync_at_ms = ts;
                            }
                            let _ = self
                                .shared
                                .events
                                .send(SyncEvent::StateApplied(Box::new(next)));
                            false
                        } else {
                            true
                        }
                    }
                    None => true,
                },
                None => {
                    // Version-less nudge; the timestamp is the only
                    // staleness signal we have.
                    match updated_at {
                        Some(ts) if ts <= st.last_sync_at_ms => false,
                        _ => true,
                    }
                }
            }
        };
        if needs_pull {
            self.shared.refresh.notify_one();
        }
    }

    /// The relay connection came up (or went down); healthy pushes slow
    /// the poll heartbeat.
    pub fn set_push_healthy(&self, healthy: bool) {
        self.shared.push_healthy.store(healthy, Ordering::SeqCst);
    }

    /// One immediate reconcile pull, used on resume.
    pub fn refresh(&self) {
        self.shared.refresh.notify_one();
    }

    pub fn shutdown(&self) {
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_action_worker(shared: Arc<Shared>, mut rx: mpsc::Receiver<GameAction>) {
    while let Some(action) = rx.recv().await {
        process_action(&shared, action).await;
    }
}

async fn process_action(shared: &Arc<Shared>, action: GameAction) {
    // Optimistic apply with an inverse command for the failure path. Local
    // rejection skips the render but still defers to the server.
    {
        let mut st = shared.state.lock().unwrap();
        let prior_version = st.local_version;
        if let Some(room) = st.room.as_mut() {
            if let Some(state) = room.game_state.as_ref() {
                let mut dice = ThreadRngDice;
                match game_core::reduce(state, &action, &mut dice, now_ms()) {
                    Ok(next) => {
                        let prior_room = Box::new(room.clone());
                        room.game_state = Some(next.clone());
                        st.rollbacks.push(Box::new(move |st: &mut SyncState| {
                            st.room = Some(*prior_room);
                            st.local_version = prior_version;
                        }));
                        st.expected_version_min = Some(prior_version + 1);
                        let _ = shared.events.send(SyncEvent::StateApplied(Box::new(next)));
                    }
                    Err(e) => {
                        debug!("optimistic apply skipped: {}", e);
                    }
                }
            }
        }
    }

    // Best-effort preview for the peer; the authoritative notice follows
    // from the server.
    shared.hints.send_hint(
        &shared.room_id,
        action.name(),
        serde_json::to_value(&action).ok(),
    );

    let result = shared
        .gateway
        .perform_action(&shared.room_id, &shared.client_id, &action)
        .await;

    match result {
        Ok(reply) => {
            let room = reply.room.clone();
            {
                let mut st = shared.state.lock().unwrap();
                st.adopt(reply.room, Some(reply.self_info.seat_index));
            }
            let _ = shared.events.send(SyncEvent::RoomReplaced(Box::new(room)));
        }
        Err(err) => {
            {
                let mut st = shared.state.lock().unwrap();
                st.roll_back();
            }
            if err == GameError::RoomNotFound {
                let _ = shared.events.send(SyncEvent::RoomDismissed);
            } else {
                let _ = shared.events.send(SyncEvent::ActionFailed(err));
            }
        }
    }
}

async fn run_poll_loop(shared: Arc<Shared>) {
    let mut failures: u32 = 0;
    loop {
        let interval = poll_interval(&shared, failures);
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shared.refresh.notified() => {}
        }

        match shared
            .gateway
            .get_room_state(&shared.room_id, Some(&shared.client_id))
            .await
        {
            Ok(reply) => {
                failures = 0;
                let adopted = {
                    let mut st = shared.state.lock().unwrap();
                    let v = reply.room.game_version;
                    let stale = v <= st.local_version
                        || st.expected_version_min.is_some_and(|guard| v <= guard);
                    if stale {
                        None
                    } else {
                        let room = reply.room.clone();
                        st.adopt(reply.room, Some(reply.self_info.seat_index));
                        Some(room)
                    }
                };
                if let Some(room) = adopted {
                    let _ = shared.events.send(SyncEvent::RoomReplaced(Box::new(room)));
                }
            }
            Err(GameError::RoomNotFound) => {
                let _ = shared.events.send(SyncEvent::RoomDismissed);
                return;
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                warn!("reconcile pull failed ({} in a row): {}", failures, e);
            }
        }
    }
}

fn poll_interval(shared: &Shared, failures: u32) -> Duration {
    let base = if shared.push_healthy.load(Ordering::SeqCst) {
        POLL_HEALTHY
    } else if shared.state.lock().unwrap().is_my_turn() {
        POLL_MY_TURN
    } else {
        POLL_WAITING
    };
    if failures == 0 {
        return base;
    }
    let backed_off = base.saturating_mul(2u32.saturating_pow(failures));
    backed_off.min(POLL_BACKOFF_CAP)
}
