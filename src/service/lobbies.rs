//! Entry points for everything that addresses lobbies from outside
//!
//! A transport gateway forwards session joins, leaves and messages here; the
//! HTTP front door forwards lookups and worker callbacks. Each call resolves the
//! lobby through the registry and queues the work on that lobby's task.

use crate::auth::{AcceptAllValidator, LoginValidator};
use crate::config::LobbyOptions;
use crate::error::{LobbyError, Result};
use crate::lobby::{LobbyContext, LobbyHandle, LobbyRegistry, LobbyRuntime, StartGameOutcome};
use crate::metrics::MetricsCollector;
use crate::types::{ClientMessage, JoinOptions, LobbyInfo, WorkerState};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Aggregate view over all live lobbies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyStats {
    pub active_lobbies: usize,
    pub members: usize,
    pub starting_workers: usize,
    pub running_workers: usize,
}

#[derive(Clone)]
pub struct LobbyService {
    context: LobbyContext,
    validator: Arc<dyn LoginValidator>,
}

impl LobbyService {
    pub fn new(context: LobbyContext) -> Self {
        Self {
            context,
            validator: Arc::new(AcceptAllValidator),
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn LoginValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn registry(&self) -> &Arc<LobbyRegistry> {
        &self.context.registry
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.context.metrics
    }

    fn lobby(&self, lobby_id: &str) -> Result<LobbyHandle> {
        self.context.registry.require(lobby_id)
    }

    /// Create a lobby and return its public description
    pub fn create_lobby(&self, options: LobbyOptions) -> Result<LobbyInfo> {
        let handle = LobbyRuntime::create(options, self.context.clone())?;
        Ok(handle.info().clone())
    }

    /// Validate the session's login, then queue the join on the lobby
    pub async fn join_lobby(
        &self,
        lobby_id: &str,
        session_id: &str,
        options: JoinOptions,
    ) -> Result<()> {
        let lobby = self.lobby(lobby_id)?;

        if !self
            .validator
            .validate(lobby_id, session_id, &options)
            .await?
        {
            warn!("Login rejected for session {} in lobby {}", session_id, lobby_id);
            let error = LobbyError::LoginRejected {
                session_id: session_id.to_string(),
            };
            self.context.metrics.record_join_rejected(error.kind());
            return Err(error.into());
        }

        lobby.join(session_id, options).await
    }

    pub async fn leave_lobby(&self, lobby_id: &str, session_id: &str, consented: bool) -> Result<bool> {
        self.lobby(lobby_id)?.leave(session_id, consented).await
    }

    /// Forward a client message by its type tag. Unknown tags are ignored and
    /// yield `None`.
    pub async fn send_message(
        &self,
        lobby_id: &str,
        session_id: &str,
        kind: &str,
        payload: Value,
    ) -> Result<Option<StartGameOutcome>> {
        let lobby = self.lobby(lobby_id)?;
        match ClientMessage::parse(kind, payload) {
            Some(message) => Ok(Some(lobby.send_message(session_id, message).await?)),
            None => {
                debug!(
                    "Ignoring unknown message type {:?} from {} in lobby {}",
                    kind, session_id, lobby_id
                );
                Ok(None)
            }
        }
    }

    pub async fn worker_ready(&self, lobby_id: &str, payload: Value) -> Result<()> {
        self.lobby(lobby_id)?.worker_ready(payload).await
    }

    pub async fn worker_ping(&self, lobby_id: &str) -> Result<()> {
        self.lobby(lobby_id)?.worker_ping().await
    }

    /// Creation-time description of a registered lobby
    pub fn info(&self, lobby_id: &str) -> Result<LobbyInfo> {
        Ok(self.lobby(lobby_id)?.info().clone())
    }

    pub fn lobby_count(&self) -> Result<usize> {
        self.context.registry.count()
    }

    pub async fn stats(&self) -> Result<LobbyStats> {
        let mut stats = LobbyStats::default();
        for handle in self.context.registry.handles()? {
            // Lobbies that close while we iterate are skipped
            let Ok(snapshot) = handle.snapshot().await else {
                continue;
            };
            stats.active_lobbies += 1;
            stats.members += snapshot.members.len();
            match snapshot.worker_state {
                WorkerState::Starting => stats.starting_workers += 1,
                WorkerState::Running => stats.running_workers += 1,
                WorkerState::None => {}
            }
        }
        Ok(stats)
    }

    /// Stop every lobby; returns how many were shut down
    pub async fn shutdown_all(&self) -> Result<usize> {
        let handles = self.context.registry.handles()?;
        let mut stopped = 0;
        for handle in handles {
            match handle.shutdown().await {
                Ok(()) => stopped += 1,
                Err(e) => debug!("Lobby {} already closed: {}", handle.id(), e),
            }
        }
        info!("Shut down {} lobbies", stopped);
        Ok(stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MockLoginValidator;
    use crate::config::{LobbySettings, WorkerSettings};
    use crate::transport::ChannelTransport;
    use crate::worker::{WorkerCommand, WorkerExitSender, WorkerHandle, WorkerLauncher};

    struct NoopLauncher;

    impl WorkerLauncher for NoopLauncher {
        fn launch(&self, launch_id: u64, _: WorkerCommand, _: WorkerExitSender) -> WorkerHandle {
            WorkerHandle::detached(launch_id)
        }
    }

    fn service() -> LobbyService {
        LobbyService::new(LobbyContext {
            registry: Arc::new(LobbyRegistry::new(7770)),
            transport: Arc::new(ChannelTransport::default()),
            launcher: Arc::new(NoopLauncher),
            metrics: Arc::new(MetricsCollector::new().unwrap()),
            lobby_settings: LobbySettings::default(),
            worker_settings: WorkerSettings::default(),
        })
    }

    fn player(name: &str) -> JoinOptions {
        JoinOptions {
            id: name.to_string(),
            name: name.to_string(),
            login_token: Some("token".to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let service = service();
        let info = service
            .create_lobby(LobbyOptions {
                title: "Friday".to_string(),
                ..Default::default()
            })
            .unwrap();

        let found = service.info(&info.lobby_id).unwrap();
        assert_eq!(found, info);
        assert_eq!(found.name, "Friday");
        assert_eq!(service.lobby_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_lobby() {
        let service = service();
        let err = service.info("nope").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LobbyError>(),
            Some(LobbyError::LobbyNotFound { .. })
        ));
        assert!(service.worker_ping("nope").await.is_err());
    }

    #[tokio::test]
    async fn test_join_start_and_stats() {
        let service = service();
        let info = service.create_lobby(LobbyOptions::default()).unwrap();

        service.join_lobby(&info.lobby_id, "s1", player("a")).await.unwrap();
        service.join_lobby(&info.lobby_id, "s2", player("b")).await.unwrap();

        let outcome = service
            .send_message(&info.lobby_id, "s1", ClientMessage::START_GAME, Value::Null)
            .await
            .unwrap();
        assert!(matches!(outcome, Some(StartGameOutcome::Launched { .. })));

        let ignored = service
            .send_message(&info.lobby_id, "s1", "chat", Value::Null)
            .await
            .unwrap();
        assert!(ignored.is_none());

        let stats = service.stats().await.unwrap();
        assert_eq!(
            stats,
            LobbyStats {
                active_lobbies: 1,
                members: 2,
                starting_workers: 1,
                running_workers: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_login_rejected_before_join() {
        let mut validator = MockLoginValidator::new();
        validator
            .expect_validate()
            .times(1)
            .returning(|_, _, _| Ok(false));

        let service = service().with_validator(Arc::new(validator));
        let info = service.create_lobby(LobbyOptions::default()).unwrap();

        let err = service
            .join_lobby(&info.lobby_id, "s1", player("a"))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LobbyError>(),
            Some(LobbyError::LoginRejected { .. })
        ));

        let stats = service.stats().await.unwrap();
        assert_eq!(stats.members, 0);
    }

    #[tokio::test]
    async fn test_shutdown_all() {
        let service = service();
        service.create_lobby(LobbyOptions::default()).unwrap();
        service.create_lobby(LobbyOptions::default()).unwrap();

        assert_eq!(service.shutdown_all().await.unwrap(), 2);
        assert_eq!(service.lobby_count().unwrap(), 0);
    }
}
