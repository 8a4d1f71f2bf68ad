//! A scripted stand-in for the video provider, served on a random local port.

use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path as UrlPath, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use mediagen::{MediaGenError, video::VideoConfig};
use serde_json::{Value, json};

pub const VIDEO_PATH: &str = "/files/video.mp4";
pub const HOP_PATH: &str = "/files/hop";

#[derive(Debug, Clone)]
pub enum Content {
    Direct(Vec<u8>),
    /// One 302 to [`VIDEO_PATH`].
    Redirect(Vec<u8>),
    /// 302 to [`HOP_PATH`], which redirects again.
    DoubleRedirect(Vec<u8>),
    Status(u16),
}

#[derive(Debug, Clone)]
pub struct CreateCall {
    pub content_type: String,
    pub authorization: Option<String>,
    pub body: Vec<u8>,
}

impl CreateCall {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug)]
pub struct ProviderState {
    pub create_status: u16,
    pub job_id: String,
    /// Scripted poll replies, consumed in order; the last one repeats.
    pub statuses: VecDeque<(u16, Value)>,
    pub content: Content,
    pub creates: Vec<CreateCall>,
    pub polls: usize,
    pub content_authorization: Option<String>,
    pub file_authorization: Option<String>,
}

impl Default for ProviderState {
    fn default() -> Self {
        Self {
            create_status: 200,
            job_id: "abc123".into(),
            statuses: VecDeque::from([(200, json!({ "status": "completed" }))]),
            content: Content::Direct(b"video".to_vec()),
            creates: vec![],
            polls: 0,
            content_authorization: None,
            file_authorization: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeProvider {
    state: Arc<Mutex<ProviderState>>,
}

impl FakeProvider {
    pub fn new(state: ProviderState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, ProviderState> {
        self.state.lock().unwrap()
    }

    /// Serves the provider and returns its base URL.
    pub async fn spawn(&self) -> String {
        let app = Router::new()
            .route("/v1/videos", post(create))
            .route("/v1/videos/{id}", get(status))
            .route("/v1/videos/{id}/content", get(content))
            .route(VIDEO_PATH, get(file))
            .route(HOP_PATH, get(hop))
            .with_state(self.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }
}

fn authorization(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn code(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap()
}

async fn create(State(p): State<FakeProvider>, headers: HeaderMap, body: Bytes) -> Response {
    let mut state = p.state();
    state.creates.push(CreateCall {
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string(),
        authorization: authorization(&headers),
        body: body.to_vec(),
    });

    if state.create_status >= 400 {
        return (code(state.create_status), Json(json!({ "error": "boom" }))).into_response();
    }
    let reply = json!({ "id": state.job_id, "status": "queued" });
    (code(state.create_status), Json(reply)).into_response()
}

async fn status(State(p): State<FakeProvider>, UrlPath(id): UrlPath<String>) -> Response {
    let mut state = p.state();
    state.polls += 1;
    if id != state.job_id {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "no such job" }))).into_response();
    }

    let (status, body) = if state.statuses.len() > 1 {
        state.statuses.pop_front().unwrap()
    } else {
        state.statuses.front().cloned().unwrap()
    };
    (code(status), Json(body)).into_response()
}

async fn content(State(p): State<FakeProvider>, headers: HeaderMap) -> Response {
    let mut state = p.state();
    state.content_authorization = authorization(&headers);
    match &state.content {
        Content::Direct(bytes) => (StatusCode::OK, bytes.clone()).into_response(),
        Content::Redirect(_) => (StatusCode::FOUND, [(header::LOCATION, VIDEO_PATH)]).into_response(),
        Content::DoubleRedirect(_) => {
            (StatusCode::FOUND, [(header::LOCATION, HOP_PATH)]).into_response()
        }
        Content::Status(s) => code(*s).into_response(),
    }
}

async fn file(State(p): State<FakeProvider>, headers: HeaderMap) -> Response {
    let mut state = p.state();
    state.file_authorization = authorization(&headers);
    match &state.content {
        Content::Direct(bytes) | Content::Redirect(bytes) | Content::DoubleRedirect(bytes) => {
            (StatusCode::OK, bytes.clone()).into_response()
        }
        Content::Status(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn hop() -> Response {
    (StatusCode::FOUND, [(header::LOCATION, VIDEO_PATH)]).into_response()
}

/// Fast-polling config pointed at a fake provider.
pub fn test_config(base_url: &str, output_dir: &Path) -> VideoConfig {
    VideoConfig {
        base_url: base_url.to_string(),
        output_dir: output_dir.to_path_buf(),
        poll_interval: Duration::from_millis(10),
        timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

pub fn error_kind(err: &color_eyre::Report) -> &MediaGenError {
    err.downcast_ref::<MediaGenError>()
        .unwrap_or_else(|| panic!("not a MediaGenError: {err:?}"))
}

pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect()
}
