//! HTTP front-end: the editor page, its form endpoints and a JSON view of the
//! comment feed.
//!
//! Page state (comment feed and thumbnail selection) lives in one
//! [`Session`] behind a mutex. Handlers never hold the lock across a platform
//! call or image decoding: they take what they need, run the blocking work on
//! the blocking pool, then lock again to apply the result.
//!
//! The server is meant for a single operator. Every client shares the one
//! session, so opening a second video in another tab switches the feed and
//! drops the thumbnail selection made for the first one.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Form, Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path as AxumPath, Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use mime_guess::{MimeGuess, mime::Mime};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::{fs::File, signal, sync::broadcast, task};
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use url::form_urlencoded;

use crate::client::VideoPlatform;
use crate::config::Settings;
use crate::editor::VideoEditForm;
use crate::feed::{CommentFeed, FeedError, FeedStatus, FetchTicket, fetch_page};
use crate::model::CommentThread;
use crate::page::{PageQuery, load_page};
use crate::thumbnail::{ThumbnailCandidate, ThumbnailFile, ThumbnailSlot, UploadError};
use crate::view::render_page;

/// Room for a thumbnail over the size limit plus multipart framing, so
/// oversized files reach the validator instead of being cut off.
const MAX_REQUEST_BODY: usize = 16 * 1024 * 1024;

/// State of the page a user is working on.
pub struct Session {
    pub feed: CommentFeed,
    pub thumbnail: ThumbnailSlot,
}

impl Session {
    pub fn new() -> Self {
        Self {
            feed: CommentFeed::new(None),
            thumbnail: ThumbnailSlot::new(),
        }
    }

    /// Switches to `video_id`, dropping the comments and thumbnail selection
    /// of the previous video.
    fn focus(&mut self, video_id: Option<&str>) {
        if self.feed.video_id() != video_id {
            self.feed.set_video(video_id.map(str::to_string));
            self.thumbnail.clear();
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct AppState {
    platform: Arc<dyn VideoPlatform>,
    session: Arc<Mutex<Session>>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn bad_gateway(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

impl AppState {
    pub fn new(platform: Arc<dyn VideoPlatform>) -> Self {
        Self {
            platform,
            session: Arc::new(Mutex::new(Session::new())),
        }
    }

    /// Runs a platform call on the blocking pool.
    async fn blocking<F, T>(&self, job: F) -> ApiResult<T>
    where
        F: FnOnce(&dyn VideoPlatform) -> T + Send + 'static,
        T: Send + 'static,
    {
        let platform = self.platform.clone();
        task::spawn_blocking(move || job(platform.as_ref()))
            .await
            .map_err(|err| ApiError::internal(format!("task join error: {err}")))
    }

    /// Fetches the page described by `ticket` and hands it to the feed, which
    /// drops it if the ticket went stale meanwhile.
    ///
    /// The fetch runs in its own task, so it still lands in the feed when the
    /// request that started it is dropped. If that task dies the ticket is
    /// abandoned instead of leaving the feed loading forever.
    async fn fetch_into_feed(&self, ticket: FetchTicket) -> ApiResult<()> {
        let platform = self.platform.clone();
        let session = self.session.clone();
        let owned = ticket.clone();
        let worker = tokio::spawn(async move {
            let request = owned.clone();
            let fetched =
                task::spawn_blocking(move || fetch_page(platform.as_ref(), &request)).await;
            let mut session = session.lock();
            match fetched {
                Ok(result) => {
                    session.feed.complete_load(&owned, result);
                    Ok(())
                }
                Err(err) => {
                    session.feed.abandon(&owned);
                    Err(err)
                }
            }
        });
        match worker.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(ApiError::internal(format!("task join error: {err}"))),
            Err(err) => {
                self.session.lock().feed.abandon(&ticket);
                Err(ApiError::internal(format!("task join error: {err}")))
            }
        }
    }

    async fn reload_comments(&self) -> ApiResult<()> {
        let ticket = self.session.lock().feed.begin_reload();
        if let Some(ticket) = ticket {
            self.fetch_into_feed(ticket).await?;
        }
        Ok(())
    }

    /// Logs feed events until the feed goes away.
    fn spawn_event_log(&self) {
        let mut events = self.session.lock().feed.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => debug!(?event, "comment feed event"),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "comment feed events dropped")
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/videos/{id}", post(update_video))
        .route("/videos/{id}/thumbnail", post(select_thumbnail))
        .route("/videos/{id}/thumbnail/preview", get(thumbnail_preview))
        .route("/videos/{id}/thumbnail/upload", post(upload_thumbnail))
        .route("/videos/{id}/thumbnail/clear", post(clear_thumbnail))
        .route("/videos/{id}/comments", post(post_comment))
        .route("/videos/{id}/comments/more", post(more_comments))
        .route("/videos/{id}/comments/{thread}/replies", post(post_reply))
        .route("/videos/{id}/comments/{thread}/toggle", post(toggle_replies))
        .route("/api/videos/{id}/comments", get(comments_snapshot))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(settings: &Settings, platform: Arc<dyn VideoPlatform>) -> Result<()> {
    let state = AppState::new(platform);
    state.spawn_event_log();
    let app = router(state);

    let addr = format!("{}:{}", settings.host, settings.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    info!(%addr, "tubedesk listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running web server")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(error = %err, "failed to install Ctrl+C handler");
    }
}

/// `/?videoId=..` plus an optional outcome banner, then an optional anchor.
fn page_location(video_id: &str, outcome: Option<(bool, String)>, anchor: &str) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    query.append_pair("videoId", video_id);
    if let Some((success, message)) = outcome {
        query.append_pair("success", if success { "true" } else { "false" });
        query.append_pair("message", &message);
    }
    format!("/?{}{anchor}", query.finish())
}

fn back_to_page(video_id: &str, outcome: Option<(bool, String)>, anchor: &str) -> Redirect {
    Redirect::to(&page_location(video_id, outcome, anchor))
}

/// Remote comment failures already show in the feed; only local validation
/// problems need a banner.
fn comment_outcome(result: Result<(), FeedError>) -> Option<(bool, String)> {
    match result {
        Ok(()) | Err(FeedError::Remote(_)) => None,
        Err(err) => Some((false, err.to_string())),
    }
}

async fn index(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Html<String>> {
    let data = state
        .blocking(move |platform| load_page(platform, &query))
        .await?
        .map_err(|err| ApiError::bad_gateway(err.to_string()))?;

    let ticket = {
        let mut session = state.session.lock();
        if data.has_token {
            session.focus(data.video_id.as_deref());
        }
        let wants_comments =
            data.video.is_some() && session.feed.status() == &FeedStatus::Empty;
        if wants_comments {
            session.feed.begin_load().unwrap_or(None)
        } else {
            None
        }
    };
    if let Some(ticket) = ticket {
        state.fetch_into_feed(ticket).await?;
    }

    let session = state.session.lock();
    let html = render_page(&data, &session.feed, &session.thumbnail)
        .map_err(|err| ApiError::internal(format!("rendering page: {err}")))?;
    Ok(Html(html))
}

async fn update_video(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Form(form): Form<VideoEditForm>,
) -> ApiResult<Redirect> {
    let video_id = id.clone();
    let result = state
        .blocking(move |platform| form.submit(platform, Some(&video_id)))
        .await?;
    let outcome = match result {
        Ok(()) => {
            info!(video_id = %id, "video metadata updated");
            (true, "Video updated successfully".to_string())
        }
        Err(err) => {
            warn!(video_id = %id, error = %err, "video update failed");
            (false, err.to_string())
        }
    };
    Ok(back_to_page(&id, Some(outcome), ""))
}

async fn select_thumbnail(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    mut multipart: Multipart,
) -> ApiResult<Redirect> {
    let mut selected = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::bad_request(err.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let declared = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|err| ApiError::bad_request(err.to_string()))?;
        let media_type = declared
            .filter(|media_type| !media_type.is_empty())
            .or_else(|| {
                let name = file_name.as_deref()?;
                MimeGuess::from_path(name).first_raw().map(str::to_string)
            })
            .unwrap_or_else(|| "application/octet-stream".to_string());
        selected = Some(ThumbnailFile {
            file_name,
            media_type,
            bytes: bytes.to_vec(),
        });
        break;
    }
    let file = selected.ok_or_else(|| ApiError::bad_request("no file uploaded"))?;

    let candidate = task::spawn_blocking(move || -> std::io::Result<ThumbnailCandidate> {
        let mut candidate = ThumbnailCandidate::new(file);
        candidate.evaluate()?;
        Ok(candidate)
    })
    .await
    .map_err(|err| ApiError::internal(format!("task join error: {err}")))?
    .map_err(|err| ApiError::internal(format!("writing thumbnail preview: {err}")))?;

    {
        let mut session = state.session.lock();
        session.focus(Some(&id));
        session.thumbnail.install(candidate);
    }
    Ok(back_to_page(&id, None, "#thumbnail"))
}

async fn thumbnail_preview(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Response> {
    let preview = {
        let session = state.session.lock();
        if session.feed.video_id() == Some(id.as_str()) {
            session
                .thumbnail
                .candidate()
                .and_then(|candidate| candidate.preview())
                .map(|preview| (preview.path().to_path_buf(), preview.media_type().to_string()))
        } else {
            None
        }
    };
    let (path, media_type) = preview.ok_or_else(|| ApiError::not_found("no thumbnail preview"))?;
    stream_file(path, media_type.parse().ok()).await
}

async fn upload_thumbnail(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Redirect> {
    let prepared = {
        let mut session = state.session.lock();
        session.focus(Some(&id));
        session.thumbnail.prepare_upload(Some(&id))
    };
    let update = match prepared {
        Ok(update) => update,
        Err(err) => return Ok(back_to_page(&id, Some((false, err.to_string())), "#thumbnail")),
    };
    let result = state
        .blocking(move |platform| platform.update_thumbnail(&update))
        .await?;
    let outcome = match result {
        Ok(()) => {
            info!(video_id = %id, "thumbnail updated");
            state.session.lock().thumbnail.clear();
            (true, "Thumbnail updated successfully".to_string())
        }
        Err(err) => {
            warn!(video_id = %id, error = %err, "thumbnail upload failed");
            (false, UploadError::from(err).to_string())
        }
    };
    Ok(back_to_page(&id, Some(outcome), "#thumbnail"))
}

async fn clear_thumbnail(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Redirect {
    state.session.lock().thumbnail.clear();
    back_to_page(&id, None, "#thumbnail")
}

#[derive(Debug, Deserialize)]
struct TextForm {
    #[serde(default)]
    text: String,
}

async fn post_comment(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Form(form): Form<TextForm>,
) -> ApiResult<Redirect> {
    let prepared = {
        let mut session = state.session.lock();
        session.focus(Some(&id));
        session.feed.prepare_post(&form.text)
    };
    let video_id = match prepared {
        Ok(video_id) => video_id,
        Err(err) => return Ok(back_to_page(&id, comment_outcome(Err(err)), "#comments")),
    };

    let target = video_id.clone();
    let text = form.text;
    let sent = state
        .blocking(move |platform| platform.send_comment(&target, &text))
        .await?;
    let finished = state.session.lock().feed.finish_comment(&video_id, sent);
    if finished.is_ok() {
        info!(video_id = %video_id, "comment posted");
        state.reload_comments().await?;
    }
    Ok(back_to_page(&id, comment_outcome(finished), "#comments"))
}

async fn post_reply(
    State(state): State<AppState>,
    AxumPath((id, thread)): AxumPath<(String, String)>,
    Form(form): Form<TextForm>,
) -> ApiResult<Redirect> {
    let prepared = {
        let mut session = state.session.lock();
        session.focus(Some(&id));
        session.feed.prepare_post(&form.text)
    };
    let video_id = match prepared {
        Ok(video_id) => video_id,
        Err(err) => return Ok(back_to_page(&id, comment_outcome(Err(err)), "#comments")),
    };

    let parent = thread.clone();
    let text = form.text;
    let sent = state
        .blocking(move |platform| platform.reply_comment(&parent, &text))
        .await?;
    let finished = state
        .session
        .lock()
        .feed
        .finish_reply(&video_id, &thread, sent);
    if finished.is_ok() {
        info!(video_id = %video_id, thread_id = %thread, "reply posted");
        state.reload_comments().await?;
    }
    Ok(back_to_page(&id, comment_outcome(finished), "#comments"))
}

async fn more_comments(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Redirect> {
    let started = {
        let mut session = state.session.lock();
        session.focus(Some(&id));
        session.feed.begin_load()
    };
    match started {
        Ok(Some(ticket)) => state.fetch_into_feed(ticket).await?,
        Ok(None) => {}
        Err(err) => debug!(video_id = %id, error = %err, "load more ignored"),
    }
    Ok(back_to_page(&id, None, "#comments"))
}

async fn toggle_replies(
    State(state): State<AppState>,
    AxumPath((id, thread)): AxumPath<(String, String)>,
) -> Redirect {
    {
        let mut session = state.session.lock();
        session.focus(Some(&id));
        session.feed.toggle_replies(&thread);
    }
    back_to_page(&id, None, "#comments")
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CommentsSnapshot {
    video_id: String,
    items: Vec<CommentThread>,
    next_page_token: Option<String>,
    loading: bool,
    error: Option<String>,
    expanded: Vec<String>,
}

async fn comments_snapshot(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<CommentsSnapshot>> {
    let ticket = {
        let mut session = state.session.lock();
        session.focus(Some(&id));
        if session.feed.status() == &FeedStatus::Empty {
            session.feed.begin_load().unwrap_or(None)
        } else {
            None
        }
    };
    if let Some(ticket) = ticket {
        state.fetch_into_feed(ticket).await?;
    }

    let session = state.session.lock();
    let feed = &session.feed;
    let mut expanded: Vec<String> = feed
        .expanded()
        .iter()
        .filter(|(_, open)| **open)
        .map(|(thread_id, _)| thread_id.clone())
        .collect();
    expanded.sort();
    Ok(Json(CommentsSnapshot {
        video_id: id,
        items: feed.threads().to_vec(),
        next_page_token: feed.cursor().map(str::to_string),
        loading: feed.is_loading(),
        error: feed.error().map(str::to_string),
        expanded,
    }))
}

async fn stream_file(path: PathBuf, mime: Option<Mime>) -> ApiResult<Response> {
    let file = File::open(&path)
        .await
        .map_err(|_| ApiError::not_found("file not found"))?;

    let guessed = mime.or_else(|| MimeGuess::from_path(&path).first());
    let body = Body::from_stream(ReaderStream::new(file));
    let mut response = body.into_response();
    if let Some(value) = guessed.and_then(|mime| mime.to_string().parse().ok()) {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    Ok(response)
}
