//! Shared server state, WebSocket upgrade handlers and server startup.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;

use taskboard_proto::task::ProjectId;

use crate::hub::{self, Hub, Room};
use crate::store::ProjectStore;

/// Username given to requests with an unknown token when auth is not
/// required.
pub const ANONYMOUS: &str = "anonymous";

/// Everything the handlers share.
#[derive(Debug, Default)]
pub struct StubState {
    /// Project data.
    pub store: Arc<ProjectStore>,
    /// Live sockets.
    pub hub: Arc<Hub>,
    users: HashMap<String, String>,
    require_auth: bool,
}

impl StubState {
    /// State with no known users that accepts any request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `token` as belonging to `username`, creating the account
    /// so it can be invited to projects.
    #[must_use]
    pub fn with_user(mut self, token: impl Into<String>, username: impl Into<String>) -> Self {
        let username = username.into();
        self.store.register_account(&username);
        self.users.insert(token.into(), username);
        self
    }

    /// Adds every `token -> username` pair.
    #[must_use]
    pub fn with_users(self, users: HashMap<String, String>) -> Self {
        users
            .into_iter()
            .fold(self, |state, (token, username)| state.with_user(token, username))
    }

    /// Rejects requests whose token is not registered.
    #[must_use]
    pub const fn requiring_auth(mut self, require: bool) -> Self {
        self.require_auth = require;
        self
    }

    /// Username for the request's bearer token.
    ///
    /// Unknown or missing tokens map to [`ANONYMOUS`], or to `None` when
    /// auth is required.
    #[must_use]
    pub fn user_for(&self, headers: &HeaderMap) -> Option<String> {
        let known = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .and_then(|token| self.users.get(token.trim()));
        match known {
            Some(user) => Some(user.clone()),
            None if self.require_auth => None,
            None => Some(ANONYMOUS.to_string()),
        }
    }
}

/// Starts the stub on `addr` with empty state.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(StubState::new())).await
}

/// Starts the stub with pre-built [`StubState`].
///
/// Keep a clone of the `Arc` to seed data or sever sockets from tests.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<StubState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .nest("/api", crate::api::router())
        .route("/ws/projects/{project}/tasks/", get(tasks_ws))
        .route("/ws/chat/{project}/", get(chat_ws))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "stub server error");
        }
    });

    Ok((bound_addr, handle))
}

async fn tasks_ws(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<Arc<StubState>>,
    Path(project): Path<ProjectId>,
) -> Response {
    upgrade(ws, &headers, &state, Room::Tasks(project))
}

async fn chat_ws(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<Arc<StubState>>,
    Path(project): Path<ProjectId>,
) -> Response {
    upgrade(ws, &headers, &state, Room::Chat(project))
}

fn upgrade(ws: WebSocketUpgrade, headers: &HeaderMap, state: &StubState, room: Room) -> Response {
    let Some(user) = state.user_for(headers) else {
        tracing::warn!(%room, "rejecting socket with unknown token");
        return StatusCode::UNAUTHORIZED.into_response();
    };
    let hub = Arc::clone(&state.hub);
    let store = Arc::clone(&state.store);
    ws.on_upgrade(move |socket| hub::handle_socket(socket, room, user, hub, store))
}
