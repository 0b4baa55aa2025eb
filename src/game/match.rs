//! Arena tick task and the handle the gateway talks to

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::GameSettings;
use crate::util::time::{clamp_delta, unix_millis, Timer, TICK_DURATION_MICROS};
use crate::ws::protocol::ServerMsg;
use crate::ws::session::SessionRegistry;

use super::snapshot::SnapshotBuilder;
use super::world::{MatchPhase, World};
use super::{Outbound, PlayerInput};

/// Intent queue depth shared by every connection
const INPUT_QUEUE_DEPTH: usize = 1024;
/// Broadcast backlog before slow clients start lagging
const BROADCAST_DEPTH: usize = 128;
/// Intents older than this when applied are worth a log line
const STALE_INTENT_MS: u64 = 500;

/// Counters published after every tick for the HTTP side
#[derive(Debug, Default)]
pub struct MatchStatus {
    players: AtomicUsize,
    bots: AtomicUsize,
    running: AtomicBool,
}

impl MatchStatus {
    pub fn player_count(&self) -> usize {
        self.players.load(Ordering::Relaxed)
    }

    pub fn bot_count(&self) -> usize {
        self.bots.load(Ordering::Relaxed)
    }

    pub fn phase(&self) -> MatchPhase {
        if self.running.load(Ordering::Relaxed) {
            MatchPhase::Running
        } else {
            MatchPhase::Ended
        }
    }
}

/// Handle to the running arena
#[derive(Clone)]
pub struct MatchHandle {
    pub input_tx: mpsc::Sender<PlayerInput>,
    pub snapshot_tx: broadcast::Sender<ServerMsg>,
    pub status: Arc<MatchStatus>,
}

impl MatchHandle {
    pub fn player_count(&self) -> usize {
        self.status.player_count()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMsg> {
        self.snapshot_tx.subscribe()
    }
}

/// The authoritative arena
pub struct GameMatch {
    world: World,
    input_rx: mpsc::Receiver<PlayerInput>,
    snapshot_tx: broadcast::Sender<ServerMsg>,
    snapshot_builder: SnapshotBuilder,
    sessions: SessionRegistry,
    status: Arc<MatchStatus>,
}

impl GameMatch {
    pub fn new(settings: &GameSettings, seed: u64, sessions: SessionRegistry) -> (Self, MatchHandle) {
        let (input_tx, input_rx) = mpsc::channel(INPUT_QUEUE_DEPTH);
        let (snapshot_tx, _) = broadcast::channel(BROADCAST_DEPTH);
        let status = Arc::new(MatchStatus::default());

        let handle = MatchHandle {
            input_tx,
            snapshot_tx: snapshot_tx.clone(),
            status: status.clone(),
        };

        let game_match = Self {
            world: World::new(settings, seed, unix_millis()),
            input_rx,
            snapshot_tx,
            snapshot_builder: SnapshotBuilder::new(),
            sessions,
            status,
        };
        game_match.publish_status();

        (game_match, handle)
    }

    /// Run the authoritative tick loop until every handle is dropped
    pub async fn run(mut self) {
        info!(walls = self.world.arena.walls.len(), "Arena simulation started");

        let mut tick_interval = interval(Duration::from_micros(TICK_DURATION_MICROS));
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut frame = Timer::new();

        loop {
            tick_interval.tick().await;

            let dt = clamp_delta(frame.elapsed());
            frame.reset();
            let work = Timer::new();

            if !self.step(dt, unix_millis()) {
                info!("Input channel closed, stopping arena");
                break;
            }

            let spent = work.elapsed_micros();
            if spent > TICK_DURATION_MICROS {
                warn!(spent_us = spent, budget_us = TICK_DURATION_MICROS, "Slow tick");
            }
        }
    }

    /// Drain intents, advance the world, deliver its events and maybe a
    /// snapshot. Returns false once no sender is left.
    pub fn step(&mut self, dt: f32, now: u64) -> bool {
        self.world.set_clock(now);
        let open = self.process_inputs();

        self.world.tick(dt);
        self.flush_events();
        self.publish_status();

        if self.snapshot_builder.should_send(self.world.now_ms, self.world.has_active()) {
            // No receivers is fine
            let _ = self.snapshot_tx.send(self.snapshot_builder.build(&self.world));
        }

        open
    }

    /// Apply every queued intent in arrival order
    fn process_inputs(&mut self) -> bool {
        loop {
            match self.input_rx.try_recv() {
                Ok(input) => {
                    let lag = self.world.now_ms.saturating_sub(input.received_at);
                    if lag > STALE_INTENT_MS {
                        debug!(conn_id = %input.conn_id, lag_ms = lag, "Stale intent");
                    }
                    self.world.apply(input);
                }
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn flush_events(&mut self) {
        for event in self.world.drain_events() {
            match event {
                Outbound::Broadcast(msg) => {
                    if matches!(msg, ServerMsg::MatchReset { .. }) {
                        self.snapshot_builder.force_next();
                    }
                    let _ = self.snapshot_tx.send(msg);
                }
                Outbound::Direct(conn_id, msg) => {
                    if let Err(e) = self.sessions.send(conn_id, msg) {
                        debug!(conn_id = %conn_id, error = %e, "Direct message dropped");
                    }
                }
            }
        }
    }

    fn publish_status(&self) {
        self.status
            .players
            .store(self.world.player_count(), Ordering::Relaxed);
        self.status
            .bots
            .store(self.world.live_bot_count(), Ordering::Relaxed);
        self.status
            .running
            .store(self.world.phase == MatchPhase::Running, Ordering::Relaxed);
    }
}
