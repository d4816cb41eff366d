//! Marshal accounts and login sessions.

use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{now, AppState};
use crate::error::{CoreError, CoreResult};
use crate::protocol::LiveEvent;
use crate::store::{self, keys};
use crate::types::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub marshal_name: String,
    pub game_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// Session token for the marshal WebSocket and REST calls
    pub token: String,
    pub profile: MarshalProfile,
}

fn validate_username(username: &str) -> CoreResult<()> {
    let valid_chars = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '@' | '-'));
    if username.is_empty() || username.len() > 64 || !valid_chars {
        return Err(CoreError::validation(
            "username must be 1-64 characters of letters, digits, '.', '_', '@' or '-'",
        ));
    }
    if username.chars().all(|c| c == '.') {
        return Err(CoreError::validation("username must not be only dots"));
    }
    Ok(())
}

fn validate_password(password: &str) -> CoreResult<()> {
    if password.is_empty() {
        return Err(CoreError::validation("password must not be empty"));
    }
    Ok(())
}

/// `salt$sha256(salt:password)`, both hex
fn hash_password(password: &str) -> String {
    let salt: [u8; 16] = rand::rng().random();
    let salt = hex::encode(salt);
    format!("{salt}${}", digest(&salt, password))
}

fn verify_password(stored: &str, password: &str) -> bool {
    let Some((salt, expected)) = stored.split_once('$') else {
        return false;
    };
    crate::auth::constant_time_eq(digest(salt, password).as_bytes(), expected.as_bytes())
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

impl AppState {
    async fn get_account(&self, username: &str) -> CoreResult<Option<MarshalAccount>> {
        let key = keys::user(username);
        match self.store.get(&key).await? {
            Some(raw) => store::from_record(&key, raw)
                .map(Some)
                .map_err(CoreError::Validation),
            None => Ok(None),
        }
    }

    /// Create the account and its team with five placeholder games.
    ///
    /// The team is written first and removed again if the account write
    /// fails, so a failed registration leaves nothing behind.
    pub async fn register_marshal(&self, request: RegisterRequest) -> CoreResult<MarshalProfile> {
        let username = request.username.trim();
        validate_username(username)?;
        validate_password(&request.password)?;
        if !self.validate_game_code(&request.game_code).await? {
            return Err(CoreError::Unauthorized("invalid game code".to_string()));
        }
        if self.get_account(username).await?.is_some() {
            return Err(CoreError::AlreadyExists(format!("user {username}")));
        }

        let marshal_name = match request.marshal_name.trim() {
            "" => username.to_string(),
            name => name.to_string(),
        };
        let timestamp = now();
        let account = MarshalAccount {
            username: username.to_string(),
            password_hash: hash_password(&request.password),
            marshal_name: marshal_name.clone(),
            created_at: timestamp.clone(),
        };
        let account_record = store::to_record(&account)?;
        self.save_team(&TeamRecord::new(username, &marshal_name, timestamp.clone()))
            .await?;
        if let Err(e) = self.store.put(&keys::user(username), account_record).await {
            tracing::error!("Registering {} failed, removing its team: {}", username, e);
            if let Err(cleanup) = self.delete_team(username).await {
                tracing::error!("Could not remove team for {}: {}", username, cleanup);
            }
            return Err(e.into());
        }

        tracing::info!("Registered marshal {}", username);
        self.publish(LiveEvent::NewMarshal {
            message: format!("{marshal_name} joined"),
            time: timestamp,
        });
        Ok(MarshalProfile::from(&account))
    }

    pub async fn login(
        &self,
        username: &str,
        password: &str,
        game_code: &str,
    ) -> CoreResult<LoginResponse> {
        if !self.validate_game_code(game_code).await? {
            return Err(CoreError::Unauthorized("invalid game code".to_string()));
        }
        let account = self
            .get_account(username.trim())
            .await?
            .filter(|a| verify_password(&a.password_hash, password))
            .ok_or_else(|| CoreError::Unauthorized("invalid username or password".to_string()))?;

        let token = ulid::Ulid::new().to_string();
        self.sessions
            .write()
            .await
            .insert(token.clone(), account.username.clone());
        tracing::info!("Marshal {} logged in", account.username);
        Ok(LoginResponse {
            token,
            profile: MarshalProfile::from(&account),
        })
    }

    pub async fn logout(&self, token: &str) {
        self.sessions.write().await.remove(token);
    }

    /// Username behind a session token
    pub async fn resolve_session(&self, token: &str) -> Option<Username> {
        self.sessions.read().await.get(token).cloned()
    }

    pub(crate) async fn clear_sessions(&self) {
        self.sessions.write().await.clear();
    }

    /// Every marshal, oldest first, without password material
    pub async fn list_marshals(&self) -> CoreResult<Vec<MarshalProfile>> {
        let mut profiles = Vec::new();
        for key in self.store.list_keys(keys::USER_PREFIX).await? {
            let Some(username) = keys::suffix(&key, keys::USER_PREFIX) else {
                continue;
            };
            match self.get_account(username).await {
                Ok(Some(account)) => profiles.push(MarshalProfile::from(&account)),
                Ok(None) => {}
                Err(CoreError::Validation(e)) => tracing::warn!("Skipping {}: {}", key, e),
                Err(e) => return Err(e),
            }
        }
        profiles.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.username.cmp(&b.username))
        });
        Ok(profiles)
    }

    pub async fn reset_password(&self, username: &str, new_password: &str) -> CoreResult<()> {
        validate_password(new_password)?;
        let mut account = self
            .get_account(username)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("user {username}")))?;
        account.password_hash = hash_password(new_password);
        self.store
            .put(&keys::user(username), store::to_record(&account)?)
            .await?;
        tracing::info!("Password reset for {}", username);
        Ok(())
    }

    /// Remove the account and team. The marshal's sessions end.
    pub async fn delete_marshal(&self, username: &str) -> CoreResult<()> {
        let had_user = self.store.delete(&keys::user(username)).await?;
        let had_team = self.delete_team(username).await?;
        if !had_user && !had_team {
            return Err(CoreError::NotFound(format!("user {username}")));
        }
        self.sessions.write().await.retain(|_, u| u != username);

        tracing::warn!("Deleted marshal {}", username);
        self.publish(LiveEvent::MarshalDeleted {
            username: username.to_string(),
            message: "Your account has been removed".to_string(),
        });
        self.publish(LiveEvent::LiveUpdate {
            team_id: Some(username.to_string()),
            completed_games: None,
            message: format!("{username} was removed"),
        });
        Ok(())
    }
}
