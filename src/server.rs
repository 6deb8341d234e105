//! HTTP front end for the RPC dispatcher.
//!
//! `POST /rpc/{procedure}` with a JSON body and `Authorization: Bearer <token>`
//! answers `{"ok": true, "result": ...}` or `{"ok": false, "error", "message"}`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    routing::{get, post},
};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::build_info;
use crate::config::Config;
use crate::error::{Result, TasklaneError};
use crate::rpc::{self, Context};
use crate::store::Db;
use crate::store::lock::acquire_lock;
use crate::store::workspace::Workspace;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Db>>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: Db, config: Config) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            config: Arc::new(config),
        }
    }
}

pub fn status_for(err: &TasklaneError) -> StatusCode {
    use TasklaneError::*;
    match err {
        Unauthorized | SessionExpired | InvalidCredentials => StatusCode::UNAUTHORIZED,
        Forbidden(_) | AccountDisabled | RegistrationClosed => StatusCode::FORBIDDEN,
        UserNotFound(_)
        | ProjectNotFound(_)
        | TaskNotFound(_)
        | MilestoneNotFound(_)
        | CommentNotFound(_)
        | AttachmentNotFound(_)
        | TimeEntryNotFound(_)
        | UnknownProcedure(_) => StatusCode::NOT_FOUND,
        EmailTaken(_)
        | InvalidTransition(_, _)
        | NotProjectMember(_, _)
        | AlreadyMember(_, _)
        | TimerRunning(_)
        | NoRunningTimer
        | LastAdmin
        | UserOwnsProjects(_)
        | Locked(_) => StatusCode::CONFLICT,
        InvalidInput(_) | Json(_) => StatusCode::BAD_REQUEST,
        NotInitialized | AlreadyInitialized | Config(_) | Io(_) | Db(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// An empty body is the same as `null`.
fn parse_body(body: &[u8]) -> Result<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_slice(body)?)
}

fn failure(procedure: &str, err: TasklaneError) -> (StatusCode, Json<Value>) {
    let status = status_for(&err);
    if status.is_server_error() {
        warn!(procedure, error = %err, "procedure failed");
    } else {
        debug!(procedure, code = err.code(), "procedure rejected");
    }
    (
        status,
        Json(json!({ "ok": false, "error": err.code(), "message": err.to_string() })),
    )
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/rpc/{procedure}", post(rpc_call))
        .with_state(state)
}

pub async fn healthz() -> Json<Value> {
    let mut body = json!({ "ok": true, "version": build_info::version() });
    if let Some(sha) = build_info::git_sha() {
        body["git_sha"] = json!(sha);
    }
    Json(body)
}

pub async fn rpc_call(
    State(state): State<AppState>,
    Path(procedure): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let input = match parse_body(&body) {
        Ok(input) => input,
        Err(err) => return failure(&procedure, err),
    };
    let db = state.db.lock().await;
    let ctx = Context {
        db: &db,
        config: &state.config,
        token: bearer_token(&headers),
    };
    match rpc::dispatch(&ctx, &procedure, input) {
        Ok(result) => (StatusCode::OK, Json(json!({ "ok": true, "result": result }))),
        Err(err) => failure(&procedure, err),
    }
}

/// Serve the workspace until ctrl-c. Only one server may hold a workspace.
pub async fn serve(workspace: Workspace, bind: &str, port: u16) -> Result<()> {
    let _lock = acquire_lock(&workspace.lock_path())?;
    let addr: SocketAddr = format!("{bind}:{port}")
        .parse()
        .map_err(|_| TasklaneError::invalid(format!("bad bind address {bind}:{port}")))?;

    let Workspace { dir, config, db } = workspace;
    let app = build_router(AppState::new(db, config));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, workspace = %dir.display(), version = %build_info::version_line(), "tasklane listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    info!("tasklane stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procedures::testing;
    use axum::http::HeaderValue;

    fn state() -> AppState {
        AppState::new(Db::open_memory().unwrap(), testing::config())
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    async fn call(
        state: &AppState,
        procedure: &str,
        headers: HeaderMap,
        body: &str,
    ) -> (StatusCode, Value) {
        let (status, Json(body)) = rpc_call(
            State(state.clone()),
            Path(procedure.to_string()),
            headers,
            Bytes::from(body.to_string()),
        )
        .await;
        (status, body)
    }

    async fn register_and_login(state: &AppState) -> String {
        let (status, _) = call(
            state,
            "auth.register",
            HeaderMap::new(),
            r#"{"email":"ada@example.com","name":"Ada","password":"correct horse"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = call(
            state,
            "auth.login",
            HeaderMap::new(),
            r#"{"email":"ada@example.com","password":"correct horse"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["result"]["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn healthz_reports_version() {
        let Json(body) = healthz().await;
        assert_eq!(body["ok"], true);
        assert_eq!(body["version"], build_info::version());
    }

    #[tokio::test]
    async fn session_round_trip_over_http() {
        let state = state();
        let token = register_and_login(&state).await;

        let (status, body) = call(&state, "auth.me", bearer(&token), "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["result"]["email"], "ada@example.com");
        assert_eq!(body["result"]["role"], "admin");

        let (status, body) = call(
            &state,
            "project.create",
            bearer(&token),
            r#"{"name":"Apollo"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["name"], "Apollo");
    }

    #[tokio::test]
    async fn errors_map_to_status_codes() {
        let state = state();

        let (status, body) = call(&state, "auth.me", HeaderMap::new(), "").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"], "unauthorized");

        let (status, body) = call(&state, "nope.nothing", HeaderMap::new(), "{}").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "unknown_procedure");

        let (status, body) = call(&state, "auth.login", HeaderMap::new(), "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "json_error");

        let token = register_and_login(&state).await;
        let (status, body) = call(
            &state,
            "project.get",
            bearer(&token),
            r#"{"project_id":999}"#,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "project_not_found");
    }

    #[test]
    fn bearer_header_parsing() {
        assert_eq!(bearer_token(&bearer("abc")), Some("abc"));
        assert_eq!(bearer_token(&HeaderMap::new()), None);

        let mut basic = HeaderMap::new();
        basic.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert_eq!(bearer_token(&basic), None);
    }

    #[test]
    fn status_mapping() {
        assert_eq!(status_for(&TasklaneError::LastAdmin), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&TasklaneError::forbidden("edit task 3")),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for(&TasklaneError::invalid("empty title")),
            StatusCode::BAD_REQUEST
        );
    }
}
