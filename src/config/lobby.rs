//! Per-lobby creation options

use crate::error::{LobbyError, Result};
use crate::types::{LobbyId, LobbyInfo, LobbyMetadata};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const MAX_TITLE_LEN: usize = 128;

/// Options supplied when a lobby is created; immutable afterwards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LobbyOptions {
    pub title: String,
    pub password: Option<String>,
    pub max_clients: usize,
    pub max_teams: u8,
    pub annotations: BTreeMap<String, String>,
}

impl Default for LobbyOptions {
    fn default() -> Self {
        Self {
            title: String::new(),
            password: None,
            max_clients: 16,
            max_teams: 1,
            annotations: BTreeMap::new(),
        }
    }
}

impl LobbyOptions {
    /// Check the options once, at creation time
    pub fn validate(&self) -> Result<()> {
        if self.max_clients == 0 {
            return Err(LobbyError::InvalidLobbyOptions {
                reason: "maxClients must be at least 1".to_string(),
            }
            .into());
        }
        if self.max_teams == 0 {
            return Err(LobbyError::InvalidLobbyOptions {
                reason: "maxTeams must be at least 1".to_string(),
            }
            .into());
        }
        if self.title.chars().count() > MAX_TITLE_LEN {
            return Err(LobbyError::InvalidLobbyOptions {
                reason: format!("title longer than {} characters", MAX_TITLE_LEN),
            }
            .into());
        }
        Ok(())
    }

    pub fn has_password(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty())
    }

    pub fn metadata(&self) -> LobbyMetadata {
        LobbyMetadata {
            title: self.title.clone(),
            annotations: self.annotations.clone(),
            has_password: self.has_password(),
        }
    }

    pub fn info(&self, lobby_id: &LobbyId) -> LobbyInfo {
        LobbyInfo {
            lobby_id: lobby_id.clone(),
            name: self.title.clone(),
            max_clients: self.max_clients,
            max_teams: self.max_teams,
            annotations: self.annotations.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(LobbyOptions::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let options = LobbyOptions {
            max_clients: 0,
            ..Default::default()
        };
        let err = options.validate().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LobbyError>(),
            Some(LobbyError::InvalidLobbyOptions { .. })
        ));

        let options = LobbyOptions {
            max_teams: 0,
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_password_presence() {
        let mut options = LobbyOptions::default();
        assert!(!options.metadata().has_password);

        options.password = Some(String::new());
        assert!(!options.has_password());

        options.password = Some("hunter2".to_string());
        assert!(options.metadata().has_password);
    }

    #[test]
    fn test_deserialize_camel_case() {
        let options: LobbyOptions = serde_json::from_str(
            r#"{"title": "Scrims", "maxClients": 10, "maxTeams": 2, "annotations": {"mode": "ctf"}}"#,
        )
        .unwrap();

        assert_eq!(options.max_clients, 10);
        assert_eq!(options.max_teams, 2);
        assert_eq!(options.annotations.get("mode").map(String::as_str), Some("ctf"));
        assert!(options.password.is_none());
    }
}
