//! A bird's-eye web view of what the agent is doing.
//!
//! `GET /` serves a page that draws the player, its current target and the
//! blocks it already collected. The page follows `GET /ws`, which sends the
//! latest [`ViewerSnapshot`] as JSON on connect and after every change.
//! `GET /api/state` returns the same snapshot once.

use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State as AxumState;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{Json, Router};
use nalgebra::Point3;
use serde::Serialize;
use snafu::{ResultExt, Snafu};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::state::State;

static VIEWER_HTML: &str = include_str!("../static/viewer.html");

/// Collected positions kept for drawing; older ones are dropped first.
const MAX_COLLECTED: usize = 4096;

#[derive(Debug, Snafu)]
pub enum ViewerError {
    #[snafu(display("Failed to bind the viewer to {addr}: {source}"))]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[snafu(display("Failed to read the viewer address: {source}"))]
    LocalAddr { source: std::io::Error },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewerSnapshot {
    pub username: String,
    pub state: State,
    /// Always `false`: the page is a top-down view.
    pub first_person: bool,
    pub player: Option<[i32; 3]>,
    pub target: Option<[i32; 3]>,
    pub collected: Vec<[i32; 3]>,
    pub collected_count: usize,
}

impl ViewerSnapshot {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            state: State::Connecting,
            first_person: false,
            player: None,
            target: None,
            collected: Vec::new(),
            collected_count: 0,
        }
    }

    pub fn set_player(&mut self, position: Point3<i32>) {
        self.player = Some(position.into());
    }

    pub fn set_target(&mut self, target: Point3<i32>) {
        self.target = Some(target.into());
    }

    /// Records a collected block. The player is left standing next to it.
    pub fn record_collected(&mut self, position: Point3<i32>) {
        if self.collected.len() == MAX_COLLECTED {
            self.collected.remove(0);
        }
        self.collected.push(position.into());
        self.collected_count += 1;
        self.target = None;
    }
}

/// The publishing side of the viewer.
///
/// Snapshots can be published before the HTTP endpoint is opened, and keep
/// flowing to the same endpoint across reconnects.
#[derive(Debug, Clone)]
pub struct Viewer {
    snapshots: watch::Sender<ViewerSnapshot>,
}

impl Viewer {
    pub fn new(username: impl Into<String>) -> Self {
        let (snapshots, _) = watch::channel(ViewerSnapshot::new(username));
        Self { snapshots }
    }

    /// Changes the current snapshot and notifies every open page.
    pub fn update(&self, change: impl FnOnce(&mut ViewerSnapshot)) {
        self.snapshots.send_modify(change);
    }

    pub fn snapshot(&self) -> ViewerSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewerSnapshot> {
        self.snapshots.subscribe()
    }

    /// Binds the HTTP endpoint and serves it in the background. Returns the
    /// address actually bound.
    pub async fn open(&self, addr: SocketAddr) -> Result<SocketAddr, ViewerError> {
        let listener = TcpListener::bind(addr).await.context(BindSnafu { addr })?;
        let local_addr = listener.local_addr().context(LocalAddrSnafu)?;

        let app = router(self.subscribe());
        tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                error!("viewer stopped: {err}");
            }
        });

        info!("viewer listening on http://{local_addr}");
        Ok(local_addr)
    }
}

fn router(snapshots: watch::Receiver<ViewerSnapshot>) -> Router {
    Router::new()
        .route("/", get(page))
        .route("/api/state", get(api_state))
        .route("/ws", get(ws_upgrade))
        .with_state(snapshots)
}

async fn page() -> Html<&'static str> {
    Html(VIEWER_HTML)
}

async fn api_state(
    AxumState(snapshots): AxumState<watch::Receiver<ViewerSnapshot>>,
) -> Json<ViewerSnapshot> {
    let snapshot = snapshots.borrow().clone();
    Json(snapshot)
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    AxumState(snapshots): AxumState<watch::Receiver<ViewerSnapshot>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_snapshots(socket, snapshots))
}

async fn stream_snapshots(mut socket: WebSocket, mut snapshots: watch::Receiver<ViewerSnapshot>) {
    loop {
        let json = serde_json::to_string(&*snapshots.borrow_and_update());
        let json = match json {
            Ok(json) => json,
            Err(err) => {
                error!("failed to encode viewer snapshot: {err}");
                return;
            }
        };
        if socket.send(Message::Text(json.into())).await.is_err() {
            debug!("viewer client went away");
            return;
        }

        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            message = socket.recv() => {
                match message {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}
