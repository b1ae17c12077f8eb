//! Test fixtures and mock implementations for integration testing

#![allow(dead_code)]

use arena_lobby::config::{LobbySettings, WorkerSettings};
use arena_lobby::lobby::{LobbyContext, LobbyRegistry};
use arena_lobby::metrics::MetricsCollector;
use arena_lobby::transport::{LobbyTransport, TransportEvent};
use arena_lobby::types::{JoinOptions, LobbyMetadata};
use arena_lobby::worker::{WorkerCommand, WorkerExit, WorkerExitSender, WorkerHandle, WorkerLauncher};
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Transport that captures every outward call for assertions
#[derive(Debug, Default)]
pub struct RecordingTransport {
    events: Mutex<Vec<TransportEvent>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TransportEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Names of the events broadcast to one lobby, in order
    pub fn broadcasts(&self, lobby_id: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                TransportEvent::Broadcast {
                    lobby_id: id,
                    event,
                    ..
                } if id == lobby_id => Some(event),
                _ => None,
            })
            .collect()
    }

    /// Payloads of one kind of broadcast
    pub fn payloads(&self, lobby_id: &str, name: &str) -> Vec<Value> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                TransportEvent::Broadcast {
                    lobby_id: id,
                    event,
                    payload,
                } if id == lobby_id && event == name => Some(payload),
                _ => None,
            })
            .collect()
    }

    pub fn count_broadcasts(&self, lobby_id: &str, name: &str) -> usize {
        self.payloads(lobby_id, name).len()
    }

    pub fn disconnects(&self, lobby_id: &str) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, TransportEvent::DisconnectAll { lobby_id: id } if id == lobby_id))
            .count()
    }

    pub fn metadata(&self, lobby_id: &str) -> Option<LobbyMetadata> {
        self.events().into_iter().find_map(|event| match event {
            TransportEvent::Metadata {
                lobby_id: id,
                metadata,
            } if id == lobby_id => Some(metadata),
            _ => None,
        })
    }

    fn record(&self, event: TransportEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl LobbyTransport for RecordingTransport {
    fn set_metadata(&self, lobby_id: &str, metadata: LobbyMetadata) {
        self.record(TransportEvent::Metadata {
            lobby_id: lobby_id.to_string(),
            metadata,
        });
    }

    fn broadcast(&self, lobby_id: &str, event: &str, payload: Value) {
        self.record(TransportEvent::Broadcast {
            lobby_id: lobby_id.to_string(),
            event: event.to_string(),
            payload,
        });
    }

    fn disconnect_all(&self, lobby_id: &str) {
        self.record(TransportEvent::DisconnectAll {
            lobby_id: lobby_id.to_string(),
        });
    }
}

/// One launch seen by [`MockLauncher`]
#[derive(Debug, Clone)]
pub struct Launch {
    pub launch_id: u64,
    pub command: WorkerCommand,
    exits: WorkerExitSender,
}

impl Launch {
    /// Report that the worker ended with `code`
    pub fn exit(&self, code: i32) {
        let _ = self.exits.send(WorkerExit {
            launch_id: self.launch_id,
            code: Some(code),
            signal: None,
            error: None,
        });
    }
}

/// Launcher that never starts a process; tests end workers by hand
#[derive(Debug, Default)]
pub struct MockLauncher {
    launches: Mutex<Vec<Launch>>,
    fail_spawn: bool,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every launch fails as if the executable were missing
    pub fn failing() -> Self {
        Self {
            launches: Mutex::new(Vec::new()),
            fail_spawn: true,
        }
    }

    pub fn launches(&self) -> Vec<Launch> {
        self.launches
            .lock()
            .map(|launches| launches.clone())
            .unwrap_or_default()
    }

    pub fn launch_count(&self) -> usize {
        self.launches().len()
    }

    pub fn last(&self) -> Option<Launch> {
        self.launches().pop()
    }
}

impl WorkerLauncher for MockLauncher {
    fn launch(&self, launch_id: u64, command: WorkerCommand, exits: WorkerExitSender) -> WorkerHandle {
        if self.fail_spawn {
            let _ = exits.send(WorkerExit::failed(launch_id, "No such file or directory"));
        }
        if let Ok(mut launches) = self.launches.lock() {
            launches.push(Launch {
                launch_id,
                command,
                exits,
            });
        }
        WorkerHandle::detached(launch_id)
    }
}

/// Everything a test needs to drive lobbies directly
pub struct TestSystem {
    pub context: LobbyContext,
    pub transport: Arc<RecordingTransport>,
    pub launcher: Arc<MockLauncher>,
}

pub fn test_settings() -> LobbySettings {
    LobbySettings {
        no_manager_dispose_delay_ms: 5000,
        tick_interval_ms: 50,
        worker_health_timeout_ms: 30_000,
        ..LobbySettings::default()
    }
}

pub fn create_test_system_with(launcher: MockLauncher) -> TestSystem {
    let transport = Arc::new(RecordingTransport::new());
    let launcher = Arc::new(launcher);
    let context = LobbyContext {
        registry: Arc::new(LobbyRegistry::new(7770)),
        transport: transport.clone(),
        launcher: launcher.clone(),
        metrics: Arc::new(MetricsCollector::new().expect("Failed to create collector")),
        lobby_settings: test_settings(),
        worker_settings: WorkerSettings::default(),
    };

    TestSystem {
        context,
        transport,
        launcher,
    }
}

pub fn create_test_system() -> TestSystem {
    create_test_system_with(MockLauncher::new())
}

pub fn player(name: &str) -> JoinOptions {
    JoinOptions {
        id: format!("user-{}", name),
        name: name.to_string(),
        login_token: Some(format!("token-{}", name)),
    }
}
