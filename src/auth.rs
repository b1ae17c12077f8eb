//! Login validation for joining sessions
//!
//! Validation runs before a join is queued on the lobby, so a slow validator
//! never stalls the lobby's timeline.

use crate::error::Result;
use crate::types::JoinOptions;
use async_trait::async_trait;

/// Decides whether a session may join a lobby
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LoginValidator: Send + Sync {
    /// `Ok(false)` rejects the join; `Err` is reported as-is
    async fn validate(&self, lobby_id: &str, session_id: &str, options: &JoinOptions)
        -> Result<bool>;
}

/// Admits everyone
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllValidator;

#[async_trait]
impl LoginValidator for AcceptAllValidator {
    async fn validate(
        &self,
        _lobby_id: &str,
        _session_id: &str,
        _options: &JoinOptions,
    ) -> Result<bool> {
        Ok(true)
    }
}

/// Admits only sessions that present a non-empty login token
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenRequiredValidator;

#[async_trait]
impl LoginValidator for TokenRequiredValidator {
    async fn validate(
        &self,
        _lobby_id: &str,
        _session_id: &str,
        options: &JoinOptions,
    ) -> Result<bool> {
        Ok(options
            .login_token
            .as_deref()
            .is_some_and(|token| !token.is_empty()))
    }
}
