//! Lobby controller: the lifecycle and worker orchestration of one lobby
//!
//! The controller is plain synchronous state. It is owned by exactly one
//! [`LobbyRuntime`](crate::lobby::runtime::LobbyRuntime) task, which serializes
//! joins, leaves, client messages, worker notifications and ticks onto it.

use crate::config::{LobbyOptions, LobbySettings, WorkerSettings};
use crate::error::{LobbyError, Result};
use crate::lobby::election::ManagerElection;
use crate::lobby::members::MemberSet;
use crate::lobby::registry::LobbyRegistry;
use crate::metrics::MetricsCollector;
use crate::transport::LobbyTransport;
use crate::types::{
    ClientMessage, JoinOptions, LifecycleState, LobbyId, LobbyInfo, LobbySnapshot, Member,
    SessionId, WorkerState,
};
use crate::utils::duration_to_millis;
use crate::worker::{WorkerCommand, WorkerExit, WorkerExitSender, WorkerHandle, WorkerLauncher};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Events broadcast to lobby members
pub mod events {
    pub const PLAYER_JOIN: &str = "playerJoin";
    pub const PLAYER_LEAVE: &str = "playerLeave";
    pub const MANAGER_CHANGED: &str = "managerChanged";
    pub const GAME_SERVER_READY: &str = "game-server-ready";
    pub const GAME_SERVER_EXITED: &str = "game-server-exited";
    pub const GAME_SERVER_UNHEALTHY: &str = "game-server-unhealthy";
}

/// Shared collaborators handed to every lobby
#[derive(Clone)]
pub struct LobbyContext {
    pub registry: Arc<LobbyRegistry>,
    pub transport: Arc<dyn LobbyTransport>,
    pub launcher: Arc<dyn WorkerLauncher>,
    pub metrics: Arc<MetricsCollector>,
    pub lobby_settings: LobbySettings,
    pub worker_settings: WorkerSettings,
}

/// Observable results of a tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LobbyEvent {
    LifecycleChanged {
        from: LifecycleState,
        to: LifecycleState,
    },
    /// The running worker missed its health deadline
    WorkerUnhealthy { launch_id: Option<u64> },
    /// The lobby left the registry
    Disposed,
}

/// What a start-game command did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartGameOutcome {
    Launched { launch_id: u64, port: u16 },
    /// Sender is not the current manager; dropped silently
    NotManager,
    /// A worker is already starting or running
    WorkerActive(WorkerState),
    PortUnavailable,
    LobbyClosed,
}

#[derive(Debug, Default)]
struct WorkerSlot {
    state: WorkerState,
    health_countdown_ms: i64,
    handle: Option<WorkerHandle>,
    unhealthy_reported: bool,
}

pub struct LobbyController {
    id: LobbyId,
    options: LobbyOptions,
    members: MemberSet,
    election: ManagerElection,
    login_tokens: HashMap<SessionId, String>,
    lifecycle: LifecycleState,
    dispose_countdown_ms: i64,
    disposed: bool,
    worker: WorkerSlot,
    next_launch_id: u64,
    worker_exits: WorkerExitSender,
    context: LobbyContext,
}

impl LobbyController {
    pub fn new(
        id: LobbyId,
        options: LobbyOptions,
        context: LobbyContext,
        worker_exits: WorkerExitSender,
    ) -> Self {
        let dispose_countdown_ms =
            duration_to_millis(context.lobby_settings.no_manager_dispose_delay());
        Self {
            id,
            options,
            members: MemberSet::new(),
            election: ManagerElection::new(),
            login_tokens: HashMap::new(),
            lifecycle: LifecycleState::Running,
            dispose_countdown_ms,
            disposed: false,
            worker: WorkerSlot::default(),
            next_launch_id: 0,
            worker_exits,
            context,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.lifecycle
    }

    pub fn worker_state(&self) -> WorkerState {
        self.worker.state
    }

    pub fn manager(&self) -> Option<&str> {
        self.election.current()
    }

    pub fn members(&self) -> &MemberSet {
        &self.members
    }

    pub fn dispose_countdown_ms(&self) -> i64 {
        self.dispose_countdown_ms
    }

    pub fn health_countdown_ms(&self) -> i64 {
        self.worker.health_countdown_ms
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Token recorded at join, for external login validation
    pub fn login_token(&self, session_id: &str) -> Option<&str> {
        self.login_tokens.get(session_id).map(String::as_str)
    }

    pub fn info(&self) -> LobbyInfo {
        self.options.info(&self.id)
    }

    pub fn snapshot(&self) -> LobbySnapshot {
        LobbySnapshot {
            lobby_id: self.id.clone(),
            members: self.members.iter().cloned().collect(),
            manager_session_id: self.election.current().map(str::to_string),
            lifecycle: self.lifecycle,
            worker_state: self.worker.state,
            worker_pid: self.worker.handle.as_ref().and_then(WorkerHandle::pid),
        }
    }

    fn broadcast(&self, event: &str, payload: Value) {
        self.context.transport.broadcast(&self.id, event, payload);
    }

    fn broadcast_manager(&self) {
        self.broadcast(
            events::MANAGER_CHANGED,
            json!({ "managerSessionId": self.election.current() }),
        );
    }

    fn reject_join(&self, error: LobbyError) -> Result<()> {
        warn!(
            "Join rejected in lobby {} - reason: {}",
            self.id,
            error.kind()
        );
        self.context.metrics.record_join_rejected(error.kind());
        Err(error.into())
    }

    /// Admit a validated session as a member
    pub fn join(&mut self, session_id: &str, options: JoinOptions) -> Result<()> {
        if self.lifecycle == LifecycleState::Stopped {
            return self.reject_join(LobbyError::LobbyClosed {
                lobby_id: self.id.clone(),
            });
        }
        if self.members.contains(session_id) {
            return self.reject_join(LobbyError::InvalidJoin {
                reason: format!("session {} already joined", session_id),
            });
        }
        if self.members.len() >= self.options.max_clients {
            return self.reject_join(LobbyError::LobbyFull {
                lobby_id: self.id.clone(),
            });
        }

        if let Some(token) = &options.login_token {
            self.login_tokens
                .insert(session_id.to_string(), token.clone());
        }

        let member = Member::new(session_id, &options);
        self.members.insert(member.clone());
        self.context.metrics.record_member_joined();
        self.broadcast(events::PLAYER_JOIN, json!(member));

        if self.election.assign_if_vacant(session_id) {
            info!("Session {} is now manager of lobby {}", session_id, self.id);
            self.broadcast_manager();
        }

        info!(
            "Session {} joined lobby {} - members: {}/{}",
            session_id,
            self.id,
            self.members.len(),
            self.options.max_clients
        );
        Ok(())
    }

    /// Remove a session; safe to call for sessions that already left.
    /// Returns whether a member was removed.
    pub fn leave(&mut self, session_id: &str, consented: bool) -> bool {
        let removed = self.members.remove(session_id).is_some();
        self.login_tokens.remove(session_id);

        if removed {
            self.context.metrics.record_member_left();
            self.broadcast(events::PLAYER_LEAVE, json!(session_id));
            info!(
                "Session {} left lobby {} - consented: {}, members: {}",
                session_id,
                self.id,
                consented,
                self.members.len()
            );
        }

        if self.election.reassign_after_departure(&self.members) {
            match self.election.current() {
                Some(manager) => info!("Manager of lobby {} handed to {}", self.id, manager),
                None => info!("Lobby {} has no manager", self.id),
            }
            self.broadcast_manager();
        }

        removed
    }

    pub fn handle_message(&mut self, session_id: &str, message: ClientMessage) -> StartGameOutcome {
        match message {
            ClientMessage::StartGame { payload } => self.handle_start_game(session_id, payload),
        }
    }

    /// Launch the lobby's worker on behalf of the manager
    pub fn handle_start_game(&mut self, session_id: &str, payload: Value) -> StartGameOutcome {
        if self.lifecycle == LifecycleState::Stopped {
            return StartGameOutcome::LobbyClosed;
        }

        if !self.members.contains(session_id) || !self.election.is_manager(session_id) {
            debug!(
                "Ignoring start game from non-manager {} in lobby {}",
                session_id, self.id
            );
            self.context
                .metrics
                .record_start_game_rejected("not_manager");
            return StartGameOutcome::NotManager;
        }

        if self.worker.state != WorkerState::None {
            info!(
                "Ignoring start game in lobby {} - worker already {}",
                self.id, self.worker.state
            );
            self.context
                .metrics
                .record_start_game_rejected("worker_active");
            return StartGameOutcome::WorkerActive(self.worker.state);
        }

        let port = match self.context.registry.allocate_port() {
            Ok(port) => port,
            Err(e) => {
                error!("No worker port for lobby {}: {}", self.id, e);
                self.context
                    .metrics
                    .record_start_game_rejected("port_unavailable");
                return StartGameOutcome::PortUnavailable;
            }
        };

        self.next_launch_id += 1;
        let launch_id = self.next_launch_id;
        let command = WorkerCommand::build(&self.context.worker_settings, &self.id, port);

        info!(
            "Manager {} started the game in lobby {} - launching worker on port {}",
            session_id, self.id, port
        );
        debug!("Start game payload for lobby {}: {}", self.id, payload);

        let handle = self
            .context
            .launcher
            .launch(launch_id, command, self.worker_exits.clone());

        self.worker.state = WorkerState::Starting;
        self.worker.handle = Some(handle);
        self.worker.unhealthy_reported = false;
        self.context.metrics.record_worker_launched();

        StartGameOutcome::Launched { launch_id, port }
    }

    /// The launched worker ended (or never started)
    pub fn handle_worker_exit(&mut self, exit: WorkerExit) {
        let current = self.worker.handle.as_ref().map(WorkerHandle::launch_id);
        if current != Some(exit.launch_id) {
            debug!(
                "Ignoring stale exit of launch {} in lobby {}",
                exit.launch_id, self.id
            );
            return;
        }

        let was_running = self.worker.state == WorkerState::Running;
        self.worker = WorkerSlot::default();
        self.context
            .metrics
            .record_worker_exit(exit.status_label(), was_running);

        if exit.is_failure() {
            warn!(
                "Worker of lobby {} ended - code: {:?}, signal: {:?}, error: {:?}",
                self.id, exit.code, exit.signal, exit.error
            );
        } else {
            info!("Worker of lobby {} exited cleanly", self.id);
        }

        self.broadcast(
            events::GAME_SERVER_EXITED,
            json!({
                "code": exit.code,
                "signal": exit.signal,
                "error": exit.error,
            }),
        );
    }

    /// The worker reported it is ready to accept players
    pub fn handle_worker_ready(&mut self, payload: Value) {
        let was_running = self.worker.state == WorkerState::Running;
        self.broadcast(events::GAME_SERVER_READY, payload);
        self.worker.state = WorkerState::Running;
        self.reset_health_countdown();
        self.context.metrics.record_worker_ready(was_running);
        info!("Worker of lobby {} is ready", self.id);
    }

    /// The worker is alive; restart the health countdown
    pub fn handle_worker_ping(&mut self) {
        self.reset_health_countdown();
        self.context.metrics.record_worker_ping();
        debug!("Health ping for lobby {}", self.id);
    }

    fn reset_health_countdown(&mut self) {
        self.worker.health_countdown_ms =
            duration_to_millis(self.context.lobby_settings.worker_health_timeout());
        self.worker.unhealthy_reported = false;
    }

    /// Advance both state machines by `elapsed`
    pub fn tick(&mut self, elapsed: Duration) -> Vec<LobbyEvent> {
        let elapsed_ms = duration_to_millis(elapsed);
        let mut events = Vec::new();
        self.advance_lifecycle(elapsed_ms, &mut events);
        self.advance_worker_health(elapsed_ms, &mut events);
        events
    }

    fn transition(&mut self, to: LifecycleState, events: &mut Vec<LobbyEvent>) {
        let from = self.lifecycle;
        self.lifecycle = to;
        info!("Lobby {} lifecycle {} -> {}", self.id, from, to);
        self.context
            .metrics
            .record_lifecycle_transition(&to.to_string());
        events.push(LobbyEvent::LifecycleChanged { from, to });
    }

    fn advance_lifecycle(&mut self, elapsed_ms: i64, events: &mut Vec<LobbyEvent>) {
        match self.lifecycle {
            LifecycleState::Running => {
                if !self.election.is_valid(&self.members) {
                    self.transition(LifecycleState::Stopping, events);
                    self.dispose_countdown_ms = duration_to_millis(
                        self.context.lobby_settings.no_manager_dispose_delay(),
                    );
                }
            }
            LifecycleState::Stopping => {
                if self.election.is_valid(&self.members) {
                    self.transition(LifecycleState::Running, events);
                    return;
                }
                self.dispose_countdown_ms -= elapsed_ms;
                if self.dispose_countdown_ms <= 0 {
                    self.transition(LifecycleState::Stopped, events);
                    self.context.transport.disconnect_all(&self.id);
                    if self.dispose() {
                        events.push(LobbyEvent::Disposed);
                    }
                }
            }
            LifecycleState::Stopped => {}
        }
    }

    fn advance_worker_health(&mut self, elapsed_ms: i64, events: &mut Vec<LobbyEvent>) {
        if self.worker.state != WorkerState::Running {
            return;
        }
        self.worker.health_countdown_ms -= elapsed_ms;
        if self.worker.health_countdown_ms <= 0 && !self.worker.unhealthy_reported {
            self.worker.unhealthy_reported = true;
            let launch_id = self.worker.handle.as_ref().map(WorkerHandle::launch_id);
            warn!(
                "Worker of lobby {} presumed unhealthy - no ping for {:?}",
                self.id,
                self.context.lobby_settings.worker_health_timeout()
            );
            self.context.metrics.record_worker_unhealthy();
            self.broadcast(events::GAME_SERVER_UNHEALTHY, json!({ "launchId": launch_id }));
            events.push(LobbyEvent::WorkerUnhealthy { launch_id });
        }
    }

    /// Remove the lobby from the registry. Irreversible; returns false if it
    /// was already disposed.
    pub fn dispose(&mut self) -> bool {
        if self.disposed {
            return false;
        }
        self.disposed = true;

        info!("Lobby {} disposing...", self.id);
        if let Err(e) = self.context.registry.remove(&self.id) {
            error!("Failed to remove lobby {} from registry: {}", self.id, e);
        }

        let worker_running = self.worker.state == WorkerState::Running;
        if self.context.lobby_settings.terminate_workers_on_dispose {
            if let Some(handle) = self.worker.handle.as_mut() {
                handle.terminate();
            }
        }
        self.context
            .metrics
            .record_lobby_disposed(self.members.len(), worker_running);
        true
    }

    /// Stop the lobby right away (service shutdown)
    pub fn shutdown(&mut self) {
        if self.lifecycle == LifecycleState::Stopped {
            return;
        }
        let mut events = Vec::new();
        self.transition(LifecycleState::Stopped, &mut events);
        self.context.transport.disconnect_all(&self.id);
        self.dispose();
    }
}
