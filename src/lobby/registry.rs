//! Process-wide table of live lobbies and the worker port allocator
//!
//! One registry is built at startup and shared (`Arc`) with every lobby.
//! Ports are handed out monotonically and never reused within a process.

use crate::error::{LobbyError, Result};
use crate::lobby::runtime::LobbyHandle;
use crate::types::LobbyId;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use tracing::debug;

#[derive(Debug)]
pub struct LobbyRegistry {
    lobbies: RwLock<HashMap<LobbyId, LobbyHandle>>,
    next_port: Mutex<u32>,
}

impl LobbyRegistry {
    pub fn new(starting_port: u16) -> Self {
        Self {
            lobbies: RwLock::new(HashMap::new()),
            next_port: Mutex::new(u32::from(starting_port)),
        }
    }

    /// Insert a lobby under its id, replacing any previous entry
    pub fn add(&self, handle: LobbyHandle) -> Result<()> {
        let mut lobbies = self
            .lobbies
            .write()
            .map_err(|_| LobbyError::InternalError {
                message: "Failed to acquire lobbies lock".to_string(),
            })?;
        debug!("Registering lobby {}", handle.id());
        lobbies.insert(handle.id().to_string(), handle);
        Ok(())
    }

    /// Remove a lobby; returns whether an entry was present
    pub fn remove(&self, lobby_id: &str) -> Result<bool> {
        let mut lobbies = self
            .lobbies
            .write()
            .map_err(|_| LobbyError::InternalError {
                message: "Failed to acquire lobbies lock".to_string(),
            })?;
        Ok(lobbies.remove(lobby_id).is_some())
    }

    pub fn has(&self, lobby_id: &str) -> Result<bool> {
        let lobbies = self
            .lobbies
            .read()
            .map_err(|_| LobbyError::InternalError {
                message: "Failed to acquire lobbies lock".to_string(),
            })?;
        Ok(lobbies.contains_key(lobby_id))
    }

    pub fn get(&self, lobby_id: &str) -> Result<Option<LobbyHandle>> {
        let lobbies = self
            .lobbies
            .read()
            .map_err(|_| LobbyError::InternalError {
                message: "Failed to acquire lobbies lock".to_string(),
            })?;
        Ok(lobbies.get(lobby_id).cloned())
    }

    /// Like [`get`](Self::get), but a missing lobby is an error
    pub fn require(&self, lobby_id: &str) -> Result<LobbyHandle> {
        self.get(lobby_id)?.ok_or_else(|| {
            LobbyError::LobbyNotFound {
                lobby_id: lobby_id.to_string(),
            }
            .into()
        })
    }

    pub fn count(&self) -> Result<usize> {
        let lobbies = self
            .lobbies
            .read()
            .map_err(|_| LobbyError::InternalError {
                message: "Failed to acquire lobbies lock".to_string(),
            })?;
        Ok(lobbies.len())
    }

    pub fn handles(&self) -> Result<Vec<LobbyHandle>> {
        let lobbies = self
            .lobbies
            .read()
            .map_err(|_| LobbyError::InternalError {
                message: "Failed to acquire lobbies lock".to_string(),
            })?;
        Ok(lobbies.values().cloned().collect())
    }

    /// Return the current port and advance the counter
    pub fn allocate_port(&self) -> Result<u16> {
        let mut next_port = self
            .next_port
            .lock()
            .map_err(|_| LobbyError::InternalError {
                message: "Failed to acquire port counter lock".to_string(),
            })?;
        let port = u16::try_from(*next_port).map_err(|_| LobbyError::PortsExhausted {
            next_port: *next_port,
        })?;
        *next_port += 1;
        Ok(port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LobbyOptions;
    use std::sync::Arc;

    #[test]
    fn test_allocate_port_is_monotonic() {
        let registry = LobbyRegistry::new(7000);
        assert_eq!(registry.allocate_port().unwrap(), 7000);
        assert_eq!(registry.allocate_port().unwrap(), 7001);
        assert_eq!(registry.allocate_port().unwrap(), 7002);
    }

    #[test]
    fn test_port_range_exhaustion() {
        let registry = LobbyRegistry::new(u16::MAX - 1);
        assert_eq!(registry.allocate_port().unwrap(), u16::MAX - 1);
        assert_eq!(registry.allocate_port().unwrap(), u16::MAX);

        let err = registry.allocate_port().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LobbyError>(),
            Some(LobbyError::PortsExhausted { .. })
        ));
        // Still exhausted, never wraps
        assert!(registry.allocate_port().is_err());
    }

    #[test]
    fn test_add_get_remove() {
        let registry = LobbyRegistry::new(7000);
        let handle = LobbyHandle::detached("lobby-a", &LobbyOptions::default());

        assert!(!registry.has("lobby-a").unwrap());
        registry.add(handle).unwrap();
        assert!(registry.has("lobby-a").unwrap());
        assert_eq!(registry.count().unwrap(), 1);
        assert_eq!(registry.get("lobby-a").unwrap().unwrap().id(), "lobby-a");

        assert!(registry.remove("lobby-a").unwrap());
        assert!(!registry.remove("lobby-a").unwrap());
        assert!(registry.get("lobby-a").unwrap().is_none());
        assert_eq!(registry.count().unwrap(), 0);
    }

    #[test]
    fn test_add_overwrites_same_id() {
        let registry = LobbyRegistry::new(7000);
        registry
            .add(LobbyHandle::detached("dup", &LobbyOptions::default()))
            .unwrap();
        let second = LobbyOptions {
            title: "second".to_string(),
            ..Default::default()
        };
        registry.add(LobbyHandle::detached("dup", &second)).unwrap();

        assert_eq!(registry.count().unwrap(), 1);
        assert_eq!(registry.get("dup").unwrap().unwrap().info().name, "second");
    }

    #[test]
    fn test_require_missing_lobby() {
        let registry = LobbyRegistry::new(7000);
        let err = registry.require("missing").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LobbyError>(),
            Some(LobbyError::LobbyNotFound { .. })
        ));
    }

    #[test]
    fn test_concurrent_allocation_is_distinct() {
        let registry = Arc::new(LobbyRegistry::new(10_000));
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    (0..100)
                        .map(|_| registry.allocate_port().unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ports: Vec<u16> = threads
            .into_iter()
            .flat_map(|t| t.join().unwrap())
            .collect();
        ports.sort_unstable();
        ports.dedup();
        assert_eq!(ports.len(), 800);
        assert_eq!(ports.first(), Some(&10_000));
        assert_eq!(ports.last(), Some(&10_799));
    }
}
