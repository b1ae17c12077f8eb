//! Per-lobby task
//!
//! Each lobby runs as one tokio task that owns its [`LobbyController`]. Client
//! commands, worker exits and the periodic tick all arrive on that task, so the
//! controller never needs a lock. Callers talk to it through a cloneable
//! [`LobbyHandle`].

use crate::config::LobbyOptions;
use crate::error::{LobbyError, Result};
use crate::lobby::controller::{LobbyContext, LobbyController, LobbyEvent, StartGameOutcome};
use crate::metrics::MetricsCollector;
use crate::types::{ClientMessage, JoinOptions, LifecycleState, LobbyId, LobbyInfo, LobbySnapshot, SessionId};
use crate::utils::generate_lobby_id;
use crate::worker::WorkerExitReceiver;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Requests queued on a lobby's timeline
#[derive(Debug)]
pub enum LobbyCommand {
    Join {
        session_id: SessionId,
        options: JoinOptions,
        reply: oneshot::Sender<Result<()>>,
    },
    Leave {
        session_id: SessionId,
        consented: bool,
        reply: oneshot::Sender<bool>,
    },
    Message {
        session_id: SessionId,
        message: ClientMessage,
        reply: oneshot::Sender<StartGameOutcome>,
    },
    WorkerReady {
        payload: Value,
    },
    WorkerPing,
    LoginToken {
        session_id: SessionId,
        reply: oneshot::Sender<Option<String>>,
    },
    Snapshot {
        reply: oneshot::Sender<LobbySnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

impl LobbyCommand {
    fn name(&self) -> &'static str {
        match self {
            LobbyCommand::Join { .. } => "join",
            LobbyCommand::Leave { .. } => "leave",
            LobbyCommand::Message { .. } => "message",
            LobbyCommand::WorkerReady { .. } => "worker_ready",
            LobbyCommand::WorkerPing => "worker_ping",
            LobbyCommand::LoginToken { .. } => "login_token",
            LobbyCommand::Snapshot { .. } => "snapshot",
            LobbyCommand::Shutdown { .. } => "shutdown",
        }
    }
}

/// Address of a running lobby. Every call fails with
/// [`LobbyError::LobbyClosed`] once the lobby task has ended.
#[derive(Debug, Clone)]
pub struct LobbyHandle {
    id: LobbyId,
    info: Arc<LobbyInfo>,
    commands: mpsc::Sender<LobbyCommand>,
}

impl LobbyHandle {
    /// Handle with no task behind it
    #[cfg(test)]
    pub(crate) fn detached(id: &str, options: &LobbyOptions) -> Self {
        let (commands, _) = mpsc::channel(1);
        Self {
            id: id.to_string(),
            info: Arc::new(options.info(&id.to_string())),
            commands,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Creation-time description; never changes
    pub fn info(&self) -> &LobbyInfo {
        &self.info
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    fn closed(&self) -> anyhow::Error {
        LobbyError::LobbyClosed {
            lobby_id: self.id.clone(),
        }
        .into()
    }

    async fn send(&self, command: LobbyCommand) -> Result<()> {
        self.commands.send(command).await.map_err(|_| self.closed())
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> LobbyCommand,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.send(command(reply)).await?;
        response.await.map_err(|_| self.closed())
    }

    pub async fn join(&self, session_id: &str, options: JoinOptions) -> Result<()> {
        self.request(|reply| LobbyCommand::Join {
            session_id: session_id.to_string(),
            options,
            reply,
        })
        .await?
    }

    /// Returns whether the session was a member
    pub async fn leave(&self, session_id: &str, consented: bool) -> Result<bool> {
        self.request(|reply| LobbyCommand::Leave {
            session_id: session_id.to_string(),
            consented,
            reply,
        })
        .await
    }

    pub async fn send_message(
        &self,
        session_id: &str,
        message: ClientMessage,
    ) -> Result<StartGameOutcome> {
        self.request(|reply| LobbyCommand::Message {
            session_id: session_id.to_string(),
            message,
            reply,
        })
        .await
    }

    /// Queue a readiness notification; returns once the lobby accepted it
    pub async fn worker_ready(&self, payload: Value) -> Result<()> {
        self.send(LobbyCommand::WorkerReady { payload }).await
    }

    pub async fn worker_ping(&self) -> Result<()> {
        self.send(LobbyCommand::WorkerPing).await
    }

    pub async fn login_token(&self, session_id: &str) -> Result<Option<String>> {
        self.request(|reply| LobbyCommand::LoginToken {
            session_id: session_id.to_string(),
            reply,
        })
        .await
    }

    pub async fn snapshot(&self) -> Result<LobbySnapshot> {
        self.request(|reply| LobbyCommand::Snapshot { reply }).await
    }

    /// Stop and dispose the lobby right away
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| LobbyCommand::Shutdown { reply }).await
    }
}

pub struct LobbyRuntime {
    controller: LobbyController,
    commands: mpsc::Receiver<LobbyCommand>,
    worker_exits: WorkerExitReceiver,
    tick_interval: Duration,
    metrics: Arc<MetricsCollector>,
}

impl LobbyRuntime {
    /// Create a lobby with a fresh id, register it and start its task
    pub fn create(options: LobbyOptions, context: LobbyContext) -> Result<LobbyHandle> {
        Self::create_with_id(generate_lobby_id(), options, context)
    }

    pub fn create_with_id(
        id: LobbyId,
        options: LobbyOptions,
        context: LobbyContext,
    ) -> Result<LobbyHandle> {
        options.validate()?;

        let (command_tx, command_rx) = mpsc::channel(context.lobby_settings.command_buffer);
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();

        let handle = LobbyHandle {
            id: id.clone(),
            info: Arc::new(options.info(&id)),
            commands: command_tx,
        };

        context.transport.set_metadata(&id, options.metadata());
        context.registry.add(handle.clone())?;
        context.metrics.record_lobby_created();

        info!(
            "Lobby {} created - title: {:?}, max clients: {}, password: {}",
            id,
            options.title,
            options.max_clients,
            options.has_password()
        );

        let runtime = LobbyRuntime {
            tick_interval: context.lobby_settings.tick_interval(),
            metrics: context.metrics.clone(),
            controller: LobbyController::new(id, options, context, exit_tx),
            commands: command_rx,
            worker_exits: exit_rx,
        };
        tokio::spawn(runtime.run());

        Ok(handle)
    }

    async fn run(mut self) {
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;
        let mut last_tick = Instant::now();

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("All handles of lobby {} dropped", self.controller.id());
                        self.controller.shutdown();
                    }
                },
                Some(exit) = self.worker_exits.recv() => {
                    self.controller.handle_worker_exit(exit);
                }
                _ = ticker.tick() => {
                    let now = Instant::now();
                    let elapsed = now - last_tick;
                    last_tick = now;

                    let timer = self.metrics.start_timer();
                    let events = self.controller.tick(elapsed);
                    self.metrics.record_tick(timer.stop());
                    for event in events {
                        if let LobbyEvent::WorkerUnhealthy { launch_id } = event {
                            warn!(
                                "Lobby {} keeps an unresponsive worker (launch {:?})",
                                self.controller.id(),
                                launch_id
                            );
                        }
                    }
                }
            }

            if self.controller.lifecycle() == LifecycleState::Stopped {
                break;
            }
        }

        info!("Lobby {} task finished", self.controller.id());
    }

    fn handle_command(&mut self, command: LobbyCommand) {
        let name = command.name();
        let timer = self.metrics.start_timer();

        match command {
            LobbyCommand::Join {
                session_id,
                options,
                reply,
            } => {
                let _ = reply.send(self.controller.join(&session_id, options));
            }
            LobbyCommand::Leave {
                session_id,
                consented,
                reply,
            } => {
                let _ = reply.send(self.controller.leave(&session_id, consented));
            }
            LobbyCommand::Message {
                session_id,
                message,
                reply,
            } => {
                let _ = reply.send(self.controller.handle_message(&session_id, message));
            }
            LobbyCommand::WorkerReady { payload } => self.controller.handle_worker_ready(payload),
            LobbyCommand::WorkerPing => self.controller.handle_worker_ping(),
            LobbyCommand::LoginToken { session_id, reply } => {
                let token = self.controller.login_token(&session_id).map(str::to_string);
                let _ = reply.send(token);
            }
            LobbyCommand::Snapshot { reply } => {
                let _ = reply.send(self.controller.snapshot());
            }
            LobbyCommand::Shutdown { reply } => {
                self.controller.shutdown();
                let _ = reply.send(());
            }
        }

        self.metrics.record_command(name, timer.stop());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LobbySettings, WorkerSettings};
    use crate::lobby::registry::LobbyRegistry;
    use crate::transport::ChannelTransport;
    use crate::types::WorkerState;
    use crate::worker::{WorkerCommand, WorkerExit, WorkerExitSender, WorkerHandle, WorkerLauncher};
    use std::sync::Mutex;
    use tokio::time::sleep;

    /// Launcher that reports an immediate exit when asked to
    #[derive(Default)]
    struct ScriptedLauncher {
        exits: Mutex<Vec<(u64, WorkerExitSender)>>,
    }

    impl ScriptedLauncher {
        fn finish(&self, code: i32) {
            for (launch_id, exits) in self.exits.lock().unwrap().drain(..) {
                let _ = exits.send(WorkerExit {
                    launch_id,
                    code: Some(code),
                    signal: None,
                    error: None,
                });
            }
        }
    }

    impl WorkerLauncher for ScriptedLauncher {
        fn launch(
            &self,
            launch_id: u64,
            _command: WorkerCommand,
            exits: WorkerExitSender,
        ) -> WorkerHandle {
            self.exits.lock().unwrap().push((launch_id, exits));
            WorkerHandle::detached(launch_id)
        }
    }

    fn context(launcher: Arc<ScriptedLauncher>) -> LobbyContext {
        LobbyContext {
            registry: Arc::new(LobbyRegistry::new(7770)),
            transport: Arc::new(ChannelTransport::default()),
            launcher,
            metrics: Arc::new(MetricsCollector::new().unwrap()),
            lobby_settings: LobbySettings {
                no_manager_dispose_delay_ms: 1000,
                ..LobbySettings::default()
            },
            worker_settings: WorkerSettings::default(),
        }
    }

    fn player(name: &str) -> JoinOptions {
        JoinOptions {
            id: name.to_string(),
            name: name.to_string(),
            login_token: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_registers_lobby() {
        let ctx = context(Arc::default());
        let handle = LobbyRuntime::create(LobbyOptions::default(), ctx.clone()).unwrap();

        assert_eq!(handle.id().len(), 32);
        assert!(ctx.registry.has(handle.id()).unwrap());
        assert_eq!(handle.info().lobby_id, handle.id());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_options_rejected() {
        let ctx = context(Arc::default());
        let options = LobbyOptions {
            max_clients: 0,
            ..Default::default()
        };
        assert!(LobbyRuntime::create(options, ctx.clone()).is_err());
        assert_eq!(ctx.registry.count().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_lobby_disposed_after_delay() {
        let ctx = context(Arc::default());
        let handle =
            LobbyRuntime::create_with_id("l1".to_string(), LobbyOptions::default(), ctx.clone())
                .unwrap();

        sleep(Duration::from_millis(500)).await;
        assert_eq!(handle.snapshot().await.unwrap().lifecycle, LifecycleState::Stopping);

        sleep(Duration::from_millis(1000)).await;
        assert!(!ctx.registry.has("l1").unwrap());

        let err = handle.join("s1", player("a")).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LobbyError>(),
            Some(LobbyError::LobbyClosed { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_exit_arrives_on_lobby_timeline() {
        let launcher = Arc::new(ScriptedLauncher::default());
        let ctx = context(launcher.clone());
        let handle = LobbyRuntime::create(LobbyOptions::default(), ctx).unwrap();

        handle.join("s1", player("a")).await.unwrap();
        let outcome = handle
            .send_message("s1", ClientMessage::StartGame { payload: Value::Null })
            .await
            .unwrap();
        assert!(matches!(outcome, StartGameOutcome::Launched { port: 7770, .. }));

        handle.worker_ready(Value::Null).await.unwrap();
        assert_eq!(handle.snapshot().await.unwrap().worker_state, WorkerState::Running);

        launcher.finish(0);
        sleep(Duration::from_millis(100)).await;
        assert_eq!(handle.snapshot().await.unwrap().worker_state, WorkerState::None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_handle() {
        let ctx = context(Arc::default());
        let handle = LobbyRuntime::create(LobbyOptions::default(), ctx.clone()).unwrap();
        handle.join("s1", player("a")).await.unwrap();

        handle.shutdown().await.unwrap();
        assert_eq!(ctx.registry.count().unwrap(), 0);

        sleep(Duration::from_millis(10)).await;
        assert!(handle.is_closed());
        assert!(handle.leave("s1", true).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_token_lookup() {
        let ctx = context(Arc::default());
        let handle = LobbyRuntime::create(LobbyOptions::default(), ctx).unwrap();
        let options = JoinOptions {
            login_token: Some("secret".to_string()),
            ..player("a")
        };
        handle.join("s1", options).await.unwrap();

        assert_eq!(handle.login_token("s1").await.unwrap().as_deref(), Some("secret"));
        assert_eq!(handle.login_token("s2").await.unwrap(), None);
    }
}
