use rand::Rng;

use super::{now, AppState};
use crate::error::{CoreError, CoreResult};
use crate::protocol::LiveEvent;
use crate::store::{self, keys};
use crate::types::*;

/// Characters for generated game codes (no ambiguous 0/O, 1/I/L)
const CODE_CHARS: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const GENERATED_CODE_LEN: usize = 6;

fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..GENERATED_CODE_LEN)
        .map(|_| CODE_CHARS[rng.random_range(0..CODE_CHARS.len())] as char)
        .collect()
}

/// Normalize a code typed by an admin: 6-12 ASCII alphanumerics, uppercased.
pub fn normalize_code(code: &str) -> CoreResult<String> {
    let code = code.trim();
    if !(6..=12).contains(&code.len()) || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(CoreError::validation(
            "game code must be 6-12 letters or digits",
        ));
    }
    Ok(code.to_ascii_uppercase())
}

impl AppState {
    /// Current settings; a missing record means defaults.
    pub async fn get_settings(&self) -> CoreResult<AdminSettings> {
        match self.store.get(keys::ADMIN_SETTINGS).await? {
            Some(raw) => store::from_record(keys::ADMIN_SETTINGS, raw).map_err(CoreError::Validation),
            None => Ok(AdminSettings::default()),
        }
    }

    pub async fn save_settings(&self, results_revealed: bool) -> CoreResult<AdminSettings> {
        let settings = AdminSettings {
            results_revealed,
            updated_at: Some(now()),
        };
        self.write_settings(settings).await
    }

    pub async fn reset_settings(&self) -> CoreResult<AdminSettings> {
        let settings = AdminSettings {
            updated_at: Some(now()),
            ..AdminSettings::default()
        };
        self.write_settings(settings).await
    }

    async fn write_settings(&self, settings: AdminSettings) -> CoreResult<AdminSettings> {
        self.store
            .put(keys::ADMIN_SETTINGS, store::to_record(&settings)?)
            .await?;
        tracing::info!("Admin settings saved: resultsRevealed={}", settings.results_revealed);
        self.publish(LiveEvent::AdminSettingsUpdate {
            results_revealed: settings.results_revealed,
        });
        Ok(settings)
    }

    /// Set the event's game code, generating one if none is given.
    pub async fn create_game_code(&self, code: Option<&str>) -> CoreResult<GameCode> {
        let code = match code.map(str::trim).filter(|c| !c.is_empty()) {
            Some(c) => normalize_code(c)?,
            None => generate_code(),
        };
        let timestamp = now();
        let created_at = match self.get_game_code().await? {
            Some(existing) => existing.created_at,
            None => timestamp.clone(),
        };
        let game_code = GameCode {
            code,
            created_at,
            updated_at: timestamp,
            active: true,
        };
        self.store
            .put(keys::GAME_CODE, store::to_record(&game_code)?)
            .await?;
        tracing::info!("Game code set to {}", game_code.code);
        Ok(game_code)
    }

    pub async fn get_game_code(&self) -> CoreResult<Option<GameCode>> {
        match self.store.get(keys::GAME_CODE).await? {
            Some(raw) => store::from_record(keys::GAME_CODE, raw)
                .map(Some)
                .map_err(CoreError::Validation),
            None => Ok(None),
        }
    }

    /// Case-insensitive match against the active code. No code set means
    /// nothing validates.
    pub async fn validate_game_code(&self, input: &str) -> CoreResult<bool> {
        Ok(self
            .get_game_code()
            .await?
            .is_some_and(|c| c.active && c.code.eq_ignore_ascii_case(input.trim())))
    }
}
