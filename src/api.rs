//! HTTP API endpoints and the application router.
//!
//! Marshal endpoints authenticate with `Authorization: Bearer <token>` from
//! `/api/login`. Everything under `/api/admin` sits behind Basic auth.

use axum::{
    body::Bytes,
    extract::{FromRequestParts, Path, State},
    http::{header, request::Parts, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::Path as FsPath;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::auth::{self, AdminAuthConfig};
use crate::error::{CoreError, CoreResult};
use crate::state::{
    AppState, Dashboard, GameResult, LoginResponse, RankedTeam, RegisterRequest, Standings,
    TeamSummary,
};
use crate::types::{AdminSettings, GameCode, GameIndex, MarshalProfile, TeamRecord, Username};
use crate::ws;

/// A marshal authenticated by session token
#[derive(Debug, Clone)]
pub struct MarshalSession {
    pub token: String,
    pub username: Username,
}

impl FromRequestParts<Arc<AppState>> for MarshalSession {
    type Rejection = CoreError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CoreError::Unauthorized("missing bearer token".to_string()))?;

        let username = state
            .resolve_session(token)
            .await
            .ok_or_else(|| CoreError::Unauthorized("session expired".to_string()))?;
        Ok(Self {
            token: token.to_string(),
            username,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub game_code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamNameRequest {
    pub team_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsRequest {
    pub results_revealed: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct GameCodeRequest {
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PasswordRequest {
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetResponse {
    pub teams_reset: usize,
}

fn team_json(team: TeamRecord) -> CoreResult<Json<TeamSummary>> {
    Ok(Json(TeamSummary::try_from(&team)?))
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// POST /api/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> CoreResult<impl IntoResponse> {
    let profile = state.register_marshal(request).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

/// POST /api/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> CoreResult<Json<LoginResponse>> {
    let response = state
        .login(&request.username, &request.password, &request.game_code)
        .await?;
    Ok(Json(response))
}

/// POST /api/logout
pub async fn logout(State(state): State<Arc<AppState>>, session: MarshalSession) -> StatusCode {
    state.logout(&session.token).await;
    StatusCode::NO_CONTENT
}

/// GET /api/leaderboard
///
/// Ranking of complete teams, for polling clients.
pub async fn leaderboard(
    State(state): State<Arc<AppState>>,
) -> CoreResult<Json<Vec<RankedTeam>>> {
    Ok(Json(state.leaderboard().await?))
}

/// GET /api/standings
pub async fn standings(State(state): State<Arc<AppState>>) -> CoreResult<Json<Standings>> {
    Ok(Json(state.standings().await?))
}

/// GET /api/team
pub async fn get_team(
    State(state): State<Arc<AppState>>,
    session: MarshalSession,
) -> CoreResult<Json<TeamSummary>> {
    Ok(Json(state.team_summary(&session.username).await?))
}

/// POST /api/team/name
pub async fn set_team_name(
    State(state): State<Arc<AppState>>,
    session: MarshalSession,
    Json(request): Json<TeamNameRequest>,
) -> CoreResult<Json<TeamSummary>> {
    team_json(
        state
            .set_team_name(&session.username, &request.team_name)
            .await?,
    )
}

/// POST /api/games/{index}/complete
pub async fn complete_game(
    State(state): State<Arc<AppState>>,
    session: MarshalSession,
    Path(game_index): Path<GameIndex>,
    Json(result): Json<GameResult>,
) -> CoreResult<Json<TeamSummary>> {
    team_json(
        state
            .complete_game(&session.username, game_index, result)
            .await?,
    )
}

/// POST /api/games/{index}/edit-request
pub async fn request_edit(
    State(state): State<Arc<AppState>>,
    session: MarshalSession,
    Path(game_index): Path<GameIndex>,
) -> CoreResult<Json<TeamSummary>> {
    team_json(state.request_edit(&session.username, game_index).await?)
}

/// POST /api/games/{index}/edit
pub async fn submit_edit(
    State(state): State<Arc<AppState>>,
    session: MarshalSession,
    Path(game_index): Path<GameIndex>,
    Json(result): Json<GameResult>,
) -> CoreResult<Json<TeamSummary>> {
    team_json(
        state
            .submit_edit(&session.username, game_index, result)
            .await?,
    )
}

/// GET /api/admin/dashboard
pub async fn dashboard(State(state): State<Arc<AppState>>) -> CoreResult<Json<Dashboard>> {
    Ok(Json(state.dashboard().await?))
}

/// GET /api/admin/settings
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
) -> CoreResult<Json<AdminSettings>> {
    Ok(Json(state.get_settings().await?))
}

/// POST /api/admin/settings
pub async fn save_settings(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SettingsRequest>,
) -> CoreResult<Json<AdminSettings>> {
    Ok(Json(state.save_settings(request.results_revealed).await?))
}

/// POST /api/admin/settings/reset
pub async fn reset_settings(
    State(state): State<Arc<AppState>>,
) -> CoreResult<Json<AdminSettings>> {
    Ok(Json(state.reset_settings().await?))
}

/// GET /api/admin/game-code
pub async fn get_game_code(
    State(state): State<Arc<AppState>>,
) -> CoreResult<Json<GameCode>> {
    state
        .get_game_code()
        .await?
        .map(Json)
        .ok_or_else(|| CoreError::NotFound("game code".to_string()))
}

/// POST /api/admin/game-code
///
/// An empty body or missing `code` generates a fresh one.
pub async fn create_game_code(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> CoreResult<Json<GameCode>> {
    let request: GameCodeRequest = if body.iter().all(u8::is_ascii_whitespace) {
        GameCodeRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| CoreError::validation(format!("invalid body: {e}")))?
    };
    Ok(Json(state.create_game_code(request.code.as_deref()).await?))
}

/// GET /api/admin/marshals
pub async fn list_marshals(
    State(state): State<Arc<AppState>>,
) -> CoreResult<Json<Vec<MarshalProfile>>> {
    Ok(Json(state.list_marshals().await?))
}

/// POST /api/admin/marshals/{username}/password
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Path(username): Path<Username>,
    Json(request): Json<PasswordRequest>,
) -> CoreResult<StatusCode> {
    state.reset_password(&username, &request.password).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/admin/marshals/{username}
pub async fn delete_marshal(
    State(state): State<Arc<AppState>>,
    Path(username): Path<Username>,
) -> CoreResult<StatusCode> {
    state.delete_marshal(&username).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/admin/teams/{username}/games/{index}/allow-edit
pub async fn allow_edit(
    State(state): State<Arc<AppState>>,
    Path((username, game_index)): Path<(Username, GameIndex)>,
) -> CoreResult<Json<TeamSummary>> {
    team_json(state.allow_edit(&username, game_index).await?)
}

/// POST /api/admin/teams/{username}/games/{index}/accept-edit
pub async fn accept_edit(
    State(state): State<Arc<AppState>>,
    Path((username, game_index)): Path<(Username, GameIndex)>,
) -> CoreResult<Json<TeamSummary>> {
    team_json(state.accept_edit(&username, game_index).await?)
}

/// POST /api/admin/reset-games
pub async fn reset_games(State(state): State<Arc<AppState>>) -> CoreResult<Json<ResetResponse>> {
    let teams_reset = state.reset_all_games().await?;
    Ok(Json(ResetResponse { teams_reset }))
}

/// Full application router: REST, WebSocket and static files.
pub fn router(
    state: Arc<AppState>,
    auth_config: Arc<AdminAuthConfig>,
    static_dir: impl AsRef<FsPath>,
) -> Router {
    let public_routes = Router::new()
        .route("/api/health", get(health))
        .route("/api/register", post(register))
        .route("/api/login", post(login))
        .route("/api/logout", post(logout))
        .route("/api/leaderboard", get(leaderboard))
        .route("/api/standings", get(standings));

    let marshal_routes = Router::new()
        .route("/api/team", get(get_team))
        .route("/api/team/name", post(set_team_name))
        .route("/api/games/{index}/complete", post(complete_game))
        .route("/api/games/{index}/edit-request", post(request_edit))
        .route("/api/games/{index}/edit", post(submit_edit));

    // Protected admin routes (with HTTP Basic Auth)
    let admin_routes = Router::new()
        .route("/api/admin/dashboard", get(dashboard))
        .route("/api/admin/settings", get(get_settings).post(save_settings))
        .route("/api/admin/settings/reset", post(reset_settings))
        .route(
            "/api/admin/game-code",
            get(get_game_code).post(create_game_code),
        )
        .route("/api/admin/marshals", get(list_marshals))
        .route(
            "/api/admin/marshals/{username}",
            axum::routing::delete(delete_marshal),
        )
        .route(
            "/api/admin/marshals/{username}/password",
            post(reset_password),
        )
        .route(
            "/api/admin/teams/{username}/games/{index}/allow-edit",
            post(allow_edit),
        )
        .route(
            "/api/admin/teams/{username}/games/{index}/accept-edit",
            post(accept_edit),
        )
        .route("/api/admin/reset-games", post(reset_games))
        .layer(middleware::from_fn_with_state(
            auth_config.clone(),
            auth::admin_auth_middleware,
        ));

    // Admin WebSocket upgrades need the same credentials
    let ws_routes = Router::new()
        .route("/ws", get(ws::ws_handler))
        .layer(middleware::from_fn_with_state(
            auth_config,
            auth::admin_ws_auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(marshal_routes)
        .merge(admin_routes)
        .merge(ws_routes)
        .fallback_service(ServeDir::new(static_dir.as_ref()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
