use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use rallyboard::api;
use rallyboard::auth::AdminAuthConfig;
use rallyboard::state::AppState;
use rallyboard::store::MemoryStore;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt; // for `oneshot`

// "admin:secret"
const ADMIN_BASIC: &str = "Basic YWRtaW46c2VjcmV0";

fn app_with(state: Arc<AppState>) -> Router {
    let auth = Arc::new(AdminAuthConfig {
        username: Some("admin".to_string()),
        password: Some("secret".to_string()),
    });
    api::router(state, auth, "static-does-not-exist")
}

fn app() -> (Arc<AppState>, Router) {
    let state = Arc::new(AppState::in_memory());
    (state.clone(), app_with(state))
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    auth: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

/// Create the game code, register and log in; returns the bearer header
async fn onboard(app: &Router, username: &str) -> String {
    let (status, _) = send(
        app,
        "POST",
        "/api/admin/game-code",
        Some(ADMIN_BASIC),
        Some(json!({ "code": "rally42" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, profile) = send(
        app,
        "POST",
        "/api/register",
        None,
        Some(json!({
            "username": username,
            "password": "pw",
            "marshalName": "Sam",
            "gameCode": "RALLY42",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(profile["username"], username);
    assert!(profile.get("passwordHash").is_none());

    let (status, login) = send(
        app,
        "POST",
        "/api/login",
        None,
        Some(json!({ "username": username, "password": "pw", "gameCode": "rally42" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    format!("Bearer {}", login["token"].as_str().unwrap())
}

#[tokio::test]
async fn test_health() {
    let (_, app) = app();
    let (status, body) = send(&app, "GET", "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_admin_routes_require_basic_auth() {
    let (_, app) = app();

    let (status, _) = send(&app, "GET", "/api/admin/dashboard", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        "GET",
        "/api/admin/dashboard",
        Some("Basic YWRtaW46d3Jvbmc="), // admin:wrong
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, "GET", "/api/admin/dashboard", Some(ADMIN_BASIC), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["teams"], json!([]));
    assert_eq!(body["revealAvailable"], false);
}

#[tokio::test]
async fn test_admin_websocket_requires_basic_auth() {
    let (_, app) = app();
    let (status, _) = send(&app, "GET", "/ws?role=admin", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_marshal_flow_over_http() {
    let (_, app) = app();
    let bearer = onboard(&app, "sam").await;

    let (status, team) = send(&app, "GET", "/api/team", Some(&bearer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(team["games"].as_array().unwrap().len(), 5);
    assert_eq!(team["teamName"], "Sam");

    let (status, team) = send(
        &app,
        "POST",
        "/api/team/name",
        Some(&bearer),
        Some(json!({ "teamName": "  Speed Demons " })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(team["teamName"], "Speed Demons");

    let (status, team) = send(
        &app,
        "POST",
        "/api/games/0/complete",
        Some(&bearer),
        Some(json!({ "placement": "second" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(team["completedGames"], 1);
    assert_eq!(team["totalTime"], 75);

    // Office Chair Race: 50s plus two infractions
    let (status, team) = send(
        &app,
        "POST",
        "/api/games/1/complete",
        Some(&bearer),
        Some(json!({ "timeSeconds": 50, "penaltyCount": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(team["totalTime"], 75 + 60);

    // Skipping ahead is a validation error
    let (status, body) = send(
        &app,
        "POST",
        "/api/games/3/complete",
        Some(&bearer),
        Some(json!({ "timeSeconds": 30 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");

    // Edit request then a premature submit
    let (status, team) = send(
        &app,
        "POST",
        "/api/games/1/edit-request",
        Some(&bearer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(team["games"][1]["edit"], "editRequested");

    let (status, body) = send(
        &app,
        "POST",
        "/api/games/1/edit",
        Some(&bearer),
        Some(json!({ "timeSeconds": 45 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INVALID_TRANSITION");

    // Admin allows, marshal submits, admin accepts
    let (status, _) = send(
        &app,
        "POST",
        "/api/admin/teams/sam/games/1/allow-edit",
        Some(ADMIN_BASIC),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, team) = send(
        &app,
        "POST",
        "/api/games/1/edit",
        Some(&bearer),
        Some(json!({ "timeSeconds": 45 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(team["games"][1]["edit"], "editPending");
    assert_eq!(team["totalTime"], 75 + 45);

    let (status, team) = send(
        &app,
        "POST",
        "/api/admin/teams/sam/games/1/accept-edit",
        Some(ADMIN_BASIC),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(team["games"][1]["edit"], "normal");

    // Logging out ends the session
    let (status, _) = send(&app, "POST", "/api/logout", Some(&bearer), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = send(&app, "GET", "/api/team", Some(&bearer), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_register_rejects_bad_game_code_and_duplicates() {
    let (_, app) = app();
    onboard(&app, "kim").await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/register",
        None,
        Some(json!({ "username": "lee", "password": "pw", "gameCode": "WRONG1" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, body) = send(
        &app,
        "POST",
        "/api/register",
        None,
        Some(json!({ "username": "kim", "password": "pw", "gameCode": "RALLY42" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "ALREADY_EXISTS");

    let (status, _) = send(
        &app,
        "POST",
        "/api/login",
        None,
        Some(json!({ "username": "kim", "password": "nope", "gameCode": "RALLY42" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_standings_and_leaderboard_for_polling_clients() {
    let (_, app) = app();
    let (status, body) = send(&app, "GET", "/api/standings", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "status": "inProgress", "completed": 0, "registered": 0 })
    );

    onboard(&app, "max").await;
    let (status, body) = send(&app, "GET", "/api/leaderboard", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_admin_marshal_management() {
    let (state, app) = app();
    let bearer = onboard(&app, "nia").await;

    let (status, marshals) =
        send(&app, "GET", "/api/admin/marshals", Some(ADMIN_BASIC), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(marshals.as_array().unwrap().len(), 1);
    assert_eq!(marshals[0]["username"], "nia");

    let (status, _) = send(
        &app,
        "POST",
        "/api/admin/marshals/nia/password",
        Some(ADMIN_BASIC),
        Some(json!({ "password": "fresh" })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(state.login("nia", "fresh", "RALLY42").await.is_ok());
    assert!(state.login("nia", "pw", "RALLY42").await.is_err());

    let (status, _) = send(
        &app,
        "DELETE",
        "/api/admin/marshals/nia",
        Some(ADMIN_BASIC),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, "GET", "/api/team", Some(&bearer), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &app,
        "DELETE",
        "/api/admin/marshals/nia",
        Some(ADMIN_BASIC),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_settings_and_game_code_endpoints() {
    let (_, app) = app();

    let (status, body) = send(&app, "GET", "/api/admin/game-code", Some(ADMIN_BASIC), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    // Empty body generates a code
    let (status, code) = send(&app, "POST", "/api/admin/game-code", Some(ADMIN_BASIC), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(code["code"].as_str().unwrap().len(), 6);
    assert_eq!(code["active"], true);

    let (status, body) = send(
        &app,
        "POST",
        "/api/admin/game-code",
        Some(ADMIN_BASIC),
        Some(json!({ "code": "no!" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");

    let (status, settings) = send(
        &app,
        "POST",
        "/api/admin/settings",
        Some(ADMIN_BASIC),
        Some(json!({ "resultsRevealed": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settings["resultsRevealed"], true);

    let (status, settings) = send(
        &app,
        "POST",
        "/api/admin/settings/reset",
        Some(ADMIN_BASIC),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settings["resultsRevealed"], false);

    let (status, body) = send(
        &app,
        "POST",
        "/api/admin/reset-games",
        Some(ADMIN_BASIC),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["teamsReset"], 0);
}

#[tokio::test]
async fn test_storage_outage_is_service_unavailable() {
    let store = Arc::new(MemoryStore::new());
    let state = Arc::new(AppState::with_store(store.clone()));
    let app = app_with(state);

    store.set_offline(true);
    let (status, body) = send(&app, "GET", "/api/standings", None, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "STORAGE_UNAVAILABLE");

    store.set_offline(false);
    let (status, _) = send(&app, "GET", "/api/standings", None, None).await;
    assert_eq!(status, StatusCode::OK);
}
